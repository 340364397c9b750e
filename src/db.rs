use sqlx::sqlite::SqlitePool;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// # Errors
///
/// Will return `Err` if function cannot create db file
pub async fn init(db_location: &str) -> crate::error::Result<SqlitePool> {
    let db_url = format!("sqlite:{db_location}");
    let db_path = Path::new(db_location);
    if db_path.exists() {
        info!("opening db {}", db_url);
    } else {
        info!("creating db {}", db_url);
        File::create(db_location)?;
    }

    let pool = SqlitePool::connect(&db_url).await?;
    Ok(pool)
}

/// # Errors
///
/// Will return `Err` if function cannot create db table
pub async fn create_table(pool: &SqlitePool) -> crate::error::Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        );
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}
