use super::{redis_cfg_types::*, EnvVar};
use crate::err::FatalErr;

use url::Url;

#[derive(Debug, Default)]
pub struct Redis {
    pub user: RedisUser,
    pub password: RedisPass,
    pub port: RedisPort,
    pub host: RedisHost,
    pub db: RedisDb,
    pub namespace: RedisNamespace,
}

impl EnvVar {
    fn update_with_redis_url(mut self, url_str: &str) -> Result<Self, FatalErr> {
        let url = Url::parse(url_str)
            .map_err(|e| FatalErr::config("REDIS_URL", url_str, format!("a valid URL ({})", e)))?;
        let none_if_empty = |s: String| if s.is_empty() { None } else { Some(s) };

        self.maybe_add_env_var("REDIS_PORT", url.port());
        self.maybe_add_env_var("REDIS_PASSWORD", url.password());
        self.maybe_add_env_var("REDIS_USER", none_if_empty(url.username().to_string()));
        let db = url.path().get(1..).map(str::to_string).and_then(none_if_empty);
        self.maybe_add_env_var("REDIS_DB", db);
        for (k, v) in url.query_pairs().into_owned() {
            match k.as_str() {
                "password" => self.maybe_add_env_var("REDIS_PASSWORD", Some(v.to_string())),
                "db" => self.maybe_add_env_var("REDIS_DB", Some(v.to_string())),
                _ => Err(FatalErr::config(
                    "REDIS_URL",
                    &k,
                    "a supported parameter (password, db)",
                ))?,
            }
        }
        Ok(self)
    }
}

impl Redis {
    const USER_SET_WARNING: &'static str =
        "Redis user specified, but Redis did not ask for a username.  Ignoring it.";
    const DB_SET_WARNING: &'static str =
        r"Redis database specified, but PubSub connections do not use databases.
For similar functionality, you may wish to set a REDIS_NAMESPACE";

    pub fn from_env(env: EnvVar) -> Result<Self, FatalErr> {
        let env = match env.get("REDIS_URL").cloned() {
            Some(url_str) => env.update_with_redis_url(&url_str)?,
            None => env,
        };

        let cfg = Self {
            user: RedisUser::from_env(&env)?,
            password: RedisPass::from_env(&env)?,
            port: RedisPort::from_env(&env)?,
            host: RedisHost::from_env(&env)?,
            db: RedisDb::from_env(&env)?,
            namespace: RedisNamespace::from_env(&env)?,
        };

        if cfg.db.is_some() {
            log::warn!("{}", Self::DB_SET_WARNING);
        }
        if cfg.user.is_some() {
            log::warn!("{}", Self::USER_SET_WARNING);
        }
        log::info!("Redis configuration:\n{:#?}", &cfg);
        Ok(cfg)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hashbrown::HashMap;

    #[test]
    fn redis_url_overrides_parts() {
        let mut vars = HashMap::new();
        vars.insert(
            "REDIS_URL".to_string(),
            "redis://:open_sesame@redis.example.com:6380".to_string(),
        );
        let cfg = Redis::from_env(EnvVar::new(vars)).expect("in test");

        assert_eq!(&*cfg.host, "redis.example.com");
        assert_eq!(*cfg.port, 6380);
        assert_eq!(&*cfg.password, &Some("open_sesame".to_string()));
    }
}
