//! Errors that should down the whole worker.
use crate::request;
use crate::response::redis;

use std::fmt;

pub fn die_with_msg(msg: impl fmt::Display) -> ! {
    eprintln!("FATAL ERROR: {}", msg);
    std::process::exit(1);
}

#[derive(Debug)]
pub enum FatalErr {
    Config {
        var: String,
        value: String,
        allowed: String,
    },
    Io(std::io::Error),
    Postgres(request::Error),
    Redis(redis::RedisConnErr),
}

impl FatalErr {
    pub fn config(
        var: impl fmt::Display,
        value: impl fmt::Display,
        allowed: impl fmt::Display,
    ) -> Self {
        Self::Config {
            var: var.to_string(),
            value: value.to_string(),
            allowed: allowed.to_string(),
        }
    }
}

impl std::error::Error for FatalErr {}

impl fmt::Display for FatalErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use FatalErr::*;
        match self {
            Config { var, value, allowed } => write!(
                f,
                "{0} is set to `{1}`, which is invalid.\n{0} must be {2}.",
                var, value, allowed
            ),
            Io(e) => write!(f, "{}", e),
            Postgres(e) => write!(f, "could not reach Postgres: {}", e),
            Redis(e) => write!(f, "could not reach Redis: {}", e),
        }
    }
}

impl From<request::Error> for FatalErr {
    fn from(e: request::Error) -> Self {
        Self::Postgres(e)
    }
}

impl From<redis::RedisConnErr> for FatalErr {
    fn from(e: redis::RedisConnErr) -> Self {
        Self::Redis(e)
    }
}

impl From<std::io::Error> for FatalErr {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
