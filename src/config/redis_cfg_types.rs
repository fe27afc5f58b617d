use super::environmental_variables::{EnvDef, Setting};

pub struct RedisHostVar;
impl EnvDef for RedisHostVar {
    type Value = String;
    const VAR: &'static str = "REDIS_HOST";
    fn default() -> String {
        "127.0.0.1".to_string()
    }
    fn parse(input: &str) -> Option<String> {
        Some(input.to_string())
    }
    fn allowed() -> String {
        "any string".to_string()
    }
}
pub type RedisHost = Setting<RedisHostVar>;

pub struct RedisPortVar;
impl EnvDef for RedisPortVar {
    type Value = u16;
    const VAR: &'static str = "REDIS_PORT";
    fn default() -> u16 {
        6379
    }
    fn parse(input: &str) -> Option<u16> {
        input.parse().ok()
    }
    fn allowed() -> String {
        "a number between 0 and 65535".to_string()
    }
}
pub type RedisPort = Setting<RedisPortVar>;

pub struct RedisUserVar;
impl EnvDef for RedisUserVar {
    type Value = Option<String>;
    const VAR: &'static str = "REDIS_USER";
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
pub type RedisUser = Setting<RedisUserVar>;

pub struct RedisPassVar;
impl EnvDef for RedisPassVar {
    type Value = Option<String>;
    const VAR: &'static str = "REDIS_PASSWORD";
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
pub type RedisPass = Setting<RedisPassVar>;

pub struct RedisDbVar;
impl EnvDef for RedisDbVar {
    type Value = Option<String>;
    const VAR: &'static str = "REDIS_DB";
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
pub type RedisDb = Setting<RedisDbVar>;

/// A prefix for every channel and key this server touches, so one Redis can
/// serve several installations.
pub struct RedisNamespaceVar;
impl EnvDef for RedisNamespaceVar {
    type Value = Option<String>;
    const VAR: &'static str = "REDIS_NAMESPACE";
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
pub type RedisNamespace = Setting<RedisNamespaceVar>;
