use crate::err::FatalErr;

use hashbrown::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Environment variables this server recognizes (shown back to the operator
/// at startup; everything else in the environment is ignored).
const RECOGNIZED: &[&str] = &[
    "NODE_ENV",
    "LOG_LEVEL",
    "RUST_LOG",
    "BIND",
    "PORT",
    "SOCKET",
    "TRUSTED_PROXY_IP",
    "SSE_FREQ",
    "WS_FREQ",
    "DATABASE_URL",
    "DB_USER",
    "DB_PORT",
    "DB_HOST",
    "DB_PASS",
    "DB_NAME",
    "DB_SSLMODE",
    "REDIS_URL",
    "REDIS_HOST",
    "REDIS_PORT",
    "REDIS_PASSWORD",
    "REDIS_DB",
    "REDIS_NAMESPACE",
    "LIMITED_FEDERATION_MODE",
    "WHITELIST_MODE",
    "AUTHORIZED_FETCH",
    "STREAMING_CLUSTER_NUM",
];

/// The environment, snapshotted into a map so URL-style variables can be
/// exploded into their parts before the typed settings read them.
#[derive(Debug, Clone)]
pub struct EnvVar(pub HashMap<String, String>);

impl std::ops::Deref for EnvVar {
    type Target = HashMap<String, String>;
    fn deref(&self) -> &HashMap<String, String> {
        &self.0
    }
}

impl EnvVar {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self(vars)
    }

    pub(crate) fn maybe_add_env_var(&mut self, key: &str, maybe_value: Option<impl ToString>) {
        if let Some(value) = maybe_value {
            self.0.insert(key.to_string(), value.to_string());
        }
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut shown: Vec<(&str, &str)> = self
            .0
            .iter()
            .filter(|(name, _)| RECOGNIZED.contains(&name.as_str()))
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        shown.sort_unstable();
        for (name, value) in shown {
            write!(f, "\n    {}: {}", name, value)?;
        }
        Ok(())
    }
}

/// The definition of one environment variable: its name, the type it parses
/// to, its default, and what values it accepts.  Implementors are zero-sized
/// markers; the parsed value lives in a [`Setting`].
pub trait EnvDef {
    type Value: Clone + fmt::Debug;
    const VAR: &'static str;

    fn default() -> Self::Value;
    fn parse(input: &str) -> Option<Self::Value>;
    /// Human description of the accepted values, for the fatal config error.
    fn allowed() -> String;
}

/// The parsed value of one environment variable, tagged by its definition so
/// every setting shares a single read/parse/default/error path.
pub struct Setting<D: EnvDef>(pub D::Value, PhantomData<D>);

impl<D: EnvDef> Setting<D> {
    pub(crate) fn of(value: D::Value) -> Self {
        Self(value, PhantomData)
    }

    /// Read and parse `D::VAR`; unset or empty falls back to the default,
    /// anything unparseable is a fatal configuration error.
    pub(crate) fn from_env(env: &EnvVar) -> Result<Self, FatalErr> {
        Self::from_first_of(env, &[D::VAR])
    }

    /// Like `from_env` for settings with more than one accepted spelling;
    /// earlier names win.
    pub(crate) fn from_first_of(env: &EnvVar, vars: &[&str]) -> Result<Self, FatalErr> {
        for var in vars {
            match env.get(*var).map(String::as_str) {
                None | Some("") => continue,
                Some(input) => {
                    return D::parse(input)
                        .map(Self::of)
                        .ok_or_else(|| FatalErr::config(var, input, D::allowed()))
                }
            }
        }
        Ok(Self::default())
    }
}

impl<D: EnvDef> std::ops::Deref for Setting<D> {
    type Target = D::Value;
    fn deref(&self) -> &D::Value {
        &self.0
    }
}

impl<D: EnvDef> Default for Setting<D> {
    fn default() -> Self {
        Self(D::default(), PhantomData)
    }
}

impl<D: EnvDef> Clone for Setting<D> {
    fn clone(&self) -> Self {
        Self(self.0.clone(), PhantomData)
    }
}

impl<D: EnvDef> fmt::Debug for Setting<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
