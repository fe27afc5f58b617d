use super::environmental_variables::{EnvDef, Setting};

use std::str::FromStr;
use strum::VariantNames;
use strum_macros::{EnumString, EnumVariantNames};

pub struct DbUserVar;
impl EnvDef for DbUserVar {
    type Value = String;
    const VAR: &'static str = "DB_USER";
    fn default() -> String {
        "postgres".to_string()
    }
    fn parse(input: &str) -> Option<String> {
        Some(input.to_string())
    }
    fn allowed() -> String {
        "any string".to_string()
    }
}
pub type PgUser = Setting<DbUserVar>;

pub struct DbHostVar;
impl EnvDef for DbHostVar {
    type Value = String;
    const VAR: &'static str = "DB_HOST";
    fn default() -> String {
        "localhost".to_string()
    }
    fn parse(input: &str) -> Option<String> {
        Some(input.to_string())
    }
    fn allowed() -> String {
        "any string".to_string()
    }
}
pub type PgHost = Setting<DbHostVar>;

pub struct DbPassVar;
impl EnvDef for DbPassVar {
    type Value = Option<String>;
    const VAR: &'static str = "DB_PASS";
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
pub type PgPass = Setting<DbPassVar>;

pub struct DbNameVar;
impl EnvDef for DbNameVar {
    type Value = String;
    const VAR: &'static str = "DB_NAME";
    fn default() -> String {
        "mastodon_development".to_string()
    }
    fn parse(input: &str) -> Option<String> {
        Some(input.to_string())
    }
    fn allowed() -> String {
        "any string".to_string()
    }
}
pub type PgDatabase = Setting<DbNameVar>;

pub struct DbPortVar;
impl EnvDef for DbPortVar {
    type Value = u16;
    const VAR: &'static str = "DB_PORT";
    fn default() -> u16 {
        5432
    }
    fn parse(input: &str) -> Option<u16> {
        input.parse().ok()
    }
    fn allowed() -> String {
        "a number between 0 and 65535".to_string()
    }
}
pub type PgPort = Setting<DbPortVar>;

pub struct DbSslVar;
impl EnvDef for DbSslVar {
    type Value = PgSslInner;
    const VAR: &'static str = "DB_SSLMODE";
    fn default() -> PgSslInner {
        PgSslInner::Prefer
    }
    fn parse(input: &str) -> Option<PgSslInner> {
        PgSslInner::from_str(input).ok()
    }
    fn allowed() -> String {
        format!("one of: {:?}", PgSslInner::VARIANTS)
    }
}
pub type PgSslMode = Setting<DbSslVar>;

#[derive(EnumString, EnumVariantNames, Debug, Clone)]
#[strum(serialize_all = "snake_case")]
pub enum PgSslInner {
    Prefer,
    Require,
    Disable,
}
