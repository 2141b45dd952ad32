pub mod fired;
pub mod kv;
pub mod preferences;

use crate::config::Settings;
use anyhow::Context;
use kv::{FileKvStore, KvStore, PgKvStore};
use std::sync::Arc;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Postgres when `DATABASE_URL` is set, otherwise the JSON state file.
pub async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn KvStore>> {
    let Some(db_url) = settings.database_url.as_deref() else {
        tracing::info!(path = %settings.state_path.display(), "using file state store");
        return Ok(Arc::new(FileKvStore::new(&settings.state_path)));
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;
    migrate(&pool).await?;

    tracing::info!("using postgres state store");
    Ok(Arc::new(PgKvStore::new(pool)))
}
