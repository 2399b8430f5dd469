//! Wires `queue::webhook::SecretResolver` onto `db::repository::secrets`.
//! Lives here rather than in `db` so `db` doesn't pick up a dependency on
//! `queue` purely for this one trait impl — `api` already depends on both.

use async_trait::async_trait;
use db::DbPool;
use queue::SecretResolver;

pub struct PgSecretResolver {
    pool: DbPool,
}

impl PgSecretResolver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecretResolver for PgSecretResolver {
    async fn resolve(&self, secret_ref: &str) -> anyhow::Result<Option<String>> {
        Ok(db::repository::secrets::get_secret(&self.pool, secret_ref).await?)
    }
}
