use super::environmental_variables::{EnvDef, Setting};

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use strum::VariantNames;
use strum_macros::{EnumString, EnumVariantNames};

/// The current environment, which controls what file to read other ENV vars
/// from.
pub struct NodeEnvVar;
impl EnvDef for NodeEnvVar {
    type Value = EnvInner;
    const VAR: &'static str = "NODE_ENV";
    fn default() -> EnvInner {
        EnvInner::Development
    }
    fn parse(input: &str) -> Option<EnvInner> {
        EnvInner::from_str(input).ok()
    }
    fn allowed() -> String {
        format!("one of: {:?}", EnvInner::VARIANTS)
    }
}
pub type Env = Setting<NodeEnvVar>;

/// How verbosely to log.
pub struct LogLevelVar;
impl EnvDef for LogLevelVar {
    type Value = LogLevelInner;
    const VAR: &'static str = "LOG_LEVEL";
    fn default() -> LogLevelInner {
        LogLevelInner::Warn
    }
    fn parse(input: &str) -> Option<LogLevelInner> {
        LogLevelInner::from_str(input).ok()
    }
    fn allowed() -> String {
        format!("one of: {:?}", LogLevelInner::VARIANTS)
    }
}
pub type LogLevel = Setting<LogLevelVar>;

/// The address to listen on.
pub struct BindVar;
impl EnvDef for BindVar {
    type Value = IpAddr;
    const VAR: &'static str = "BIND";
    fn default() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }
    fn parse(input: &str) -> Option<IpAddr> {
        match input {
            "localhost" => Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            _ => input.parse().ok(),
        }
    }
    fn allowed() -> String {
        "a valid address (e.g., 127.0.0.1)".to_string()
    }
}
pub type BindAddr = Setting<BindVar>;

/// The port to listen on.
pub struct PortVar;
impl EnvDef for PortVar {
    type Value = u16;
    const VAR: &'static str = "PORT";
    fn default() -> u16 {
        4000
    }
    fn parse(input: &str) -> Option<u16> {
        input.parse().ok()
    }
    fn allowed() -> String {
        "a number between 0 and 65535".to_string()
    }
}
pub type Port = Setting<PortVar>;

/// A Unix Socket to listen on in place of a TCP address.
pub struct SocketVar;
impl EnvDef for SocketVar {
    type Value = Option<String>;
    const VAR: &'static str = "SOCKET";
    fn default() -> Option<String> {
        None
    }
    fn parse(input: &str) -> Option<Option<String>> {
        Some(Some(input.to_string()))
    }
    fn allowed() -> String {
        "any string".to_string()
    }
}
pub type Socket = Setting<SocketVar>;

/// The reverse proxy (if any) whose X-Forwarded-For header can be trusted.
pub struct TrustedProxyVar;
impl EnvDef for TrustedProxyVar {
    type Value = Option<String>;
    const VAR: &'static str = "TRUSTED_PROXY_IP";
    fn default() -> Option<String> {
        None
    }
    fn parse(input: &str) -> Option<Option<String>> {
        Some(Some(input.to_string()))
    }
    fn allowed() -> String {
        "an IP address or comma-separated list".to_string()
    }
}
pub type TrustedProxyIp = Setting<TrustedProxyVar>;

/// Seconds between keep-alive comments on a Server-Sent Events response.
pub struct SseIntervalVar;
impl EnvDef for SseIntervalVar {
    type Value = u64;
    const VAR: &'static str = "SSE_FREQ";
    fn default() -> u64 {
        15
    }
    fn parse(input: &str) -> Option<u64> {
        input.parse().ok()
    }
    fn allowed() -> String {
        "a number of seconds".to_string()
    }
}
pub type SseInterval = Setting<SseIntervalVar>;

/// Seconds between pings on a WebSocket connection.
pub struct WsIntervalVar;
impl EnvDef for WsIntervalVar {
    type Value = u64;
    const VAR: &'static str = "WS_FREQ";
    fn default() -> u64 {
        30
    }
    fn parse(input: &str) -> Option<u64> {
        input.parse().ok()
    }
    fn allowed() -> String {
        "a number of seconds".to_string()
    }
}
pub type WsInterval = Setting<WsIntervalVar>;

fn parse_bool(input: &str) -> Option<bool> {
    input.parse().ok()
}

/// Enables [WHITELIST_MODE](https://docs.joinmastodon.org/admin/config/#whitelist_mode)
///
/// This mode prevents non-logged-in users from subscribing to any timelines
/// (including otherwise public timelines).
pub struct WhitelistVar;
impl EnvDef for WhitelistVar {
    type Value = bool;
    const VAR: &'static str = "WHITELIST_MODE";
    fn default() -> bool {
        false
    }
    fn parse(input: &str) -> Option<bool> {
        parse_bool(input)
    }
    fn allowed() -> String {
        "true or false".to_string()
    }
}
pub type WhitelistMode = Setting<WhitelistVar>;

/// The newer spelling of `WHITELIST_MODE`.
pub struct FederationVar;
impl EnvDef for FederationVar {
    type Value = bool;
    const VAR: &'static str = "LIMITED_FEDERATION_MODE";
    fn default() -> bool {
        false
    }
    fn parse(input: &str) -> Option<bool> {
        parse_bool(input)
    }
    fn allowed() -> String {
        "true or false".to_string()
    }
}
pub type LimitedFederationMode = Setting<FederationVar>;

/// Enables secure mode, which also makes otherwise-public streams require
/// auth.
pub struct AuthorizedFetchVar;
impl EnvDef for AuthorizedFetchVar {
    type Value = bool;
    const VAR: &'static str = "AUTHORIZED_FETCH";
    fn default() -> bool {
        false
    }
    fn parse(input: &str) -> Option<bool> {
        parse_bool(input)
    }
    fn allowed() -> String {
        "true or false".to_string()
    }
}
pub type AuthorizedFetch = Setting<AuthorizedFetchVar>;

/// Accepted for compatibility with the Node server's cluster mode; one
/// worker per process here, so this is informational only.
pub struct ClusterVar;
impl EnvDef for ClusterVar {
    type Value = usize;
    const VAR: &'static str = "STREAMING_CLUSTER_NUM";
    fn default() -> usize {
        1
    }
    fn parse(input: &str) -> Option<usize> {
        input.parse().ok()
    }
    fn allowed() -> String {
        "a number of workers".to_string()
    }
}
pub type ClusterNum = Setting<ClusterVar>;

/// Permissions for Cross Origin Resource Sharing (CORS)
pub struct Cors {
    pub allowed_headers: Vec<&'static str>,
    pub allowed_methods: Vec<&'static str>,
}

impl std::default::Default for Cors {
    fn default() -> Self {
        Self {
            allowed_methods: vec!["GET", "OPTIONS"],
            allowed_headers: vec!["Authorization", "Accept", "Cache-Control"],
        }
    }
}

impl fmt::Debug for Cors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allowed headers: {:?}\n      allowed methods: {:?}",
            self.allowed_headers, self.allowed_methods
        )
    }
}

#[derive(EnumString, EnumVariantNames, Debug, Clone)]
#[strum(serialize_all = "snake_case")]
pub enum LogLevelInner {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(EnumString, EnumVariantNames, Debug, Clone)]
#[strum(serialize_all = "snake_case")]
pub enum EnvInner {
    Production,
    Development,
}
