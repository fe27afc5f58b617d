//! Configuration from environment variables, with sensible defaults.
pub use deployment_cfg::Deployment;
pub use postgres_cfg::Postgres;
pub use redis_cfg::Redis;

pub use environmental_variables::EnvVar;

use crate::err::FatalErr;
use hashbrown::HashMap;
use std::env;

mod deployment_cfg;
mod deployment_cfg_types;
mod environmental_variables;
mod postgres_cfg;
mod postgres_cfg_types;
mod redis_cfg;
mod redis_cfg_types;

type Result<T> = std::result::Result<T, FatalErr>;

pub fn merge_dotenv() -> Result<()> {
    let env_file = match env::var("NODE_ENV").or_else(|_| env::var("ENV")).ok().as_deref() {
        Some("production") => ".env.production",
        Some("development") | None => ".env",
        Some(unsupported) => Err(FatalErr::config(
            "NODE_ENV",
            unsupported,
            "`production` or `development`",
        ))?,
    };
    // Not finding the file is fine; plain environment variables work too
    let _ = dotenv::from_filename(env_file);
    Ok(())
}

pub fn from_env(env_vars: HashMap<String, String>) -> Result<(Postgres, Redis, Deployment)> {
    let env_vars = EnvVar::new(env_vars);
    log::info!(
        "Environmental variables the streaming server received:{}",
        &env_vars
    );

    let pg_cfg = Postgres::from_env(env_vars.clone())?;
    let redis_cfg = Redis::from_env(env_vars.clone())?;
    let deployment_cfg = Deployment::from_env(&env_vars)?;

    Ok((pg_cfg, redis_cfg, deployment_cfg))
}
