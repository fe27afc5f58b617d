//! Postgres queries
use super::err::Error;
use super::timeline::{Scope, UserData};
use crate::config;
use crate::event::Id;

use ::postgres::NoTls;
use hashbrown::HashSet;
use r2d2_postgres::PostgresConnectionManager;
use std::convert::TryFrom;

type Result<T> = std::result::Result<T, Error>;

/// A bounded pool of Postgres connections.  Every query below is synchronous;
/// callers on the async side hop through `spawn_blocking`.
#[derive(Clone)]
pub struct PgPool {
    conn: r2d2::Pool<PostgresConnectionManager<NoTls>>,
}

impl PgPool {
    const POOL_SIZE: u32 = 10;

    pub fn new(pg_cfg: &config::Postgres) -> Result<Self> {
        let mut cfg = ::postgres::Config::new();
        cfg.user(&pg_cfg.user)
            .host(&*pg_cfg.host)
            .port(*pg_cfg.port)
            .dbname(&pg_cfg.database);
        if let Some(password) = &*pg_cfg.password {
            cfg.password(password);
        };

        let manager = PostgresConnectionManager::new(cfg, NoTls);
        let pool = r2d2::Pool::builder()
            .max_size(Self::POOL_SIZE)
            .build(manager)?;
        Ok(Self { conn: pool })
    }

    /// Resolve a bearer token against the OAuth tables.
    ///
    /// With no token and no required scopes the viewer is anonymous; with no
    /// token and required scopes the request fails.  A token that resolves
    /// must grant at least one of the required scopes.
    pub(crate) fn select_user(
        &self,
        token: Option<String>,
        required_scopes: Option<&[Scope]>,
    ) -> Result<UserData> {
        let token = match token {
            Some(token) => token,
            None if required_scopes.is_none() => return Ok(UserData::public()),
            None => return Err(Error::MissingToken),
        };

        let mut conn = self.conn.get()?;
        let rows = conn.query(
            "SELECT users.account_id, users.chosen_languages, oauth_access_tokens.scopes,
                    devices.device_id
               FROM oauth_access_tokens
              INNER JOIN users ON oauth_access_tokens.resource_owner_id = users.id
               LEFT OUTER JOIN devices ON oauth_access_tokens.id = devices.access_token_id
              WHERE oauth_access_tokens.token = $1
                AND oauth_access_tokens.revoked_at IS NULL
              LIMIT 1",
            &[&token],
        )?;
        let row = rows.get(0).ok_or(Error::InvalidToken)?;

        let scopes: HashSet<Scope> = row
            .get::<_, String>(2)
            .split(' ')
            .filter_map(|scope| Scope::try_from(scope).ok())
            .collect();
        if let Some(required) = required_scopes {
            if !scopes.iter().any(|scope| required.contains(scope)) {
                return Err(Error::InsufficientScope);
            }
        }

        Ok(UserData {
            id: Id(row.get(0)),
            allowed_langs: row
                .try_get::<_, Vec<String>>(1)
                .unwrap_or_default()
                .into_iter()
                .collect(),
            scopes,
            device_id: row.try_get::<_, Option<String>>(3).ok().flatten(),
        })
    }

    /// Test whether a user owns a list.  Callers treat a query failure as
    /// "does not own".
    pub(crate) fn user_owns_list(&self, user_id: Id, list_id: i64) -> Result<bool> {
        let mut conn = self.conn.get()?;
        let rows = conn.query(
            "SELECT account_id FROM lists WHERE id = $1 LIMIT 1",
            &[&list_id],
        )?;
        Ok(rows.get(0).map_or(false, |row| Id(row.get(0)) == user_id))
    }

    /// Whether policy rows bar delivery of a status to this viewer: a block in
    /// either direction, a mute of anyone involved, or a domain block of the
    /// author's instance.  One combined query, plus the domain lookup when the
    /// status is remote.
    pub(crate) fn status_barred(
        &self,
        viewer: Id,
        author: Id,
        targets: Vec<i64>,
        domain: Option<String>,
    ) -> Result<bool> {
        let mut conn = self.conn.get()?;
        let rows = conn.query(
            "SELECT 1 FROM blocks
              WHERE (account_id = $1 AND target_account_id = ANY($2))
                 OR (account_id = $3 AND target_account_id = $1)
              UNION
             SELECT 1 FROM mutes
              WHERE account_id = $1 AND target_account_id = ANY($2)",
            &[&*viewer, &targets, &*author],
        )?;
        if !rows.is_empty() {
            return Ok(true);
        }

        if let Some(domain) = domain {
            let rows = conn.query(
                "SELECT 1 FROM account_domain_blocks WHERE account_id = $1 AND domain = $2",
                &[&*viewer, &domain],
            )?;
            if !rows.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
