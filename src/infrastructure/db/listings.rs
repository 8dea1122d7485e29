use crate::domain::error::{AppError, Result};
use crate::domain::listing::{Listing, NewListing};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Writable handle on the listings table. Used for bootstrap and seeding;
/// questions are answered through [`super::SqliteRowSource`].
pub struct ListingStore {
    pool: SqlitePool,
    table: String,
}

impl ListingStore {
    pub async fn connect(db_path: &Path, table: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect listings DB: {e}")))?;

        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.create_table().await?;

        info!(path = %db_path.display(), table = %table, "listings store ready");
        Ok(store)
    }

    async fn create_table(&self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                price REAL,
                description TEXT,
                location TEXT,
                type TEXT,
                size REAL,
                bedrooms INTEGER,
                bathrooms INTEGER,
                available_from TEXT,
                available_year INTEGER,
                available_month INTEGER,
                available_day INTEGER
            )",
            self.table
        );

        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create table: {e}")))?;

        Ok(())
    }

    pub async fn insert(&self, listing: &NewListing) -> Result<i64> {
        let date = listing.available_date();
        let sql = format!(
            "INSERT INTO {} (price, description, location, type, size, bedrooms, bathrooms,
                available_from, available_year, available_month, available_day)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.table
        );

        let result = sqlx::query(&sql)
            .bind(listing.price)
            .bind(&listing.description)
            .bind(&listing.location)
            .bind(&listing.listing_type)
            .bind(listing.size)
            .bind(listing.bedrooms)
            .bind(listing.bathrooms)
            .bind(&listing.available_from)
            .bind(date.map(|d| d.year))
            .bind(date.map(|d| d.month))
            .bind(date.map(|d| d.day))
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to insert listing: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    pub async fn count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count listings: {e}")))
    }

    pub async fn get(&self, id: i64) -> Result<Option<Listing>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.table);
        sqlx::query_as::<_, Listing>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch listing {id}: {e}")))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
