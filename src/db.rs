use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str, max_connections: u32) -> Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to DATABASE_URL")?;
    // crate-relative path for sqlx migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    Ok(pool)
}
