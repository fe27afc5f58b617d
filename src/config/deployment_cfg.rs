use super::{deployment_cfg_types::*, EnvVar};
use crate::err::FatalErr;

#[derive(Debug, Default)]
pub struct Deployment {
    pub env: Env,
    pub log_level: LogLevel,
    pub address: BindAddr,
    pub port: Port,
    pub unix_socket: Socket,
    pub trusted_proxy_ip: TrustedProxyIp,
    pub cors: Cors,
    pub sse_interval: SseInterval,
    pub ws_interval: WsInterval,
    pub whitelist_mode: WhitelistMode,
    pub limited_federation_mode: LimitedFederationMode,
    pub authorized_fetch: AuthorizedFetch,
    pub cluster_num: ClusterNum,
}

impl Deployment {
    pub fn from_env(env: &EnvVar) -> Result<Self, FatalErr> {
        let mut cfg = Self {
            env: Env::from_env(env)?,
            log_level: LogLevel::from_first_of(env, &["LOG_LEVEL", "RUST_LOG"])?,
            address: BindAddr::from_env(env)?,
            port: Port::default(),
            unix_socket: Socket::from_env(env)?,
            trusted_proxy_ip: TrustedProxyIp::from_env(env)?,
            cors: Cors::default(),
            sse_interval: SseInterval::from_env(env)?,
            ws_interval: WsInterval::from_env(env)?,
            whitelist_mode: WhitelistMode::from_env(env)?,
            limited_federation_mode: LimitedFederationMode::from_env(env)?,
            authorized_fetch: AuthorizedFetch::from_env(env)?,
            cluster_num: ClusterNum::from_env(env)?,
        };

        // A non-numeric PORT is a unix socket path, matching the upstream server
        match env.get("PORT") {
            Some(port) if port.parse::<u16>().is_ok() => {
                cfg.port = Port::from_env(env)?;
            }
            Some(path) if !path.is_empty() && cfg.unix_socket.is_none() => {
                cfg.unix_socket = Socket::of(Some(path.clone()));
            }
            _ => (),
        }

        log::info!("Using deployment configuration:\n {:#?}", &cfg);
        Ok(cfg)
    }

    /// Whether otherwise-public streams require a signed-in viewer.
    pub fn require_auth(&self) -> bool {
        *self.whitelist_mode || *self.limited_federation_mode || *self.authorized_fetch
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hashbrown::HashMap;

    fn env_of(vars: &[(&str, &str)]) -> EnvVar {
        EnvVar::new(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<String, String>>(),
        )
    }

    #[test]
    fn numeric_port_is_a_port() {
        let cfg = Deployment::from_env(&env_of(&[("PORT", "9999")])).expect("in test");
        assert_eq!(*cfg.port, 9999);
        assert!(cfg.unix_socket.is_none());
    }

    #[test]
    fn non_numeric_port_is_a_socket_path() {
        let cfg = Deployment::from_env(&env_of(&[("PORT", "/run/streaming.sock")])).expect("in test");
        assert_eq!(*cfg.port, 4000);
        assert_eq!(&*cfg.unix_socket, &Some("/run/streaming.sock".to_string()));
    }

    #[test]
    fn explicit_socket_wins_over_port() {
        let cfg = Deployment::from_env(&env_of(&[("SOCKET", "a.sock"), ("PORT", "b.sock")]))
            .expect("in test");
        assert_eq!(&*cfg.unix_socket, &Some("a.sock".to_string()));
    }

    #[test]
    fn any_federation_flag_requires_auth() {
        for flag in ["WHITELIST_MODE", "LIMITED_FEDERATION_MODE", "AUTHORIZED_FETCH"] {
            let cfg = Deployment::from_env(&env_of(&[(flag, "true")])).expect("in test");
            assert!(cfg.require_auth(), "{} should force auth", flag);
        }
        let cfg = Deployment::from_env(&env_of(&[])).expect("in test");
        assert!(!cfg.require_auth());
    }

    #[test]
    fn invalid_value_is_fatal() {
        assert!(Deployment::from_env(&env_of(&[("WHITELIST_MODE", "yes please")])).is_err());
    }
}
