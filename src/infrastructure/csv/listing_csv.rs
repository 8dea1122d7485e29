// ============================================================
// LISTING CSV
// ============================================================
// Headered CSV -> NewListing records -> listings table

use std::collections::BTreeSet;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{info, warn};

use crate::domain::error::{AppError, Result};
use crate::domain::listing::NewListing;
use crate::infrastructure::db::ListingStore;

pub const REQUIRED_COLUMNS: &[&str] = &[
    "price",
    "description",
    "location",
    "type",
    "size",
    "bedrooms",
    "bathrooms",
    "available_from",
];

/// Parse CSV text into listings. Extra columns are ignored and rows that
/// repeat the header are skipped.
pub fn parse_listings(content: &str) -> Result<Vec<NewListing>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let headers: StringRecord = reader
        .headers()
        .map_err(|e| AppError::ValidationError(format!("Failed to read CSV headers: {}", e)))?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();

    check_columns(&headers)?;

    let mut listings = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            AppError::ValidationError(format!("Failed to parse CSV row {}: {}", index + 1, e))
        })?;

        if is_header_repeat(&headers, &record) {
            continue;
        }

        let listing: NewListing = record.deserialize(Some(&headers)).map_err(|e| {
            AppError::ValidationError(format!("Invalid listing in CSV row {}: {}", index + 1, e))
        })?;
        listings.push(listing);
    }

    Ok(listings)
}

fn check_columns(headers: &StringRecord) -> Result<()> {
    let present: BTreeSet<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let missing: BTreeSet<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !present.contains(*column))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "CSV is missing required columns: {}",
            missing.into_iter().collect::<Vec<_>>().join(", ")
        )))
    }
}

fn is_header_repeat(headers: &StringRecord, record: &StringRecord) -> bool {
    headers.len() == record.len()
        && headers
            .iter()
            .zip(record.iter())
            .all(|(h, v)| h.eq_ignore_ascii_case(v))
}

pub async fn import_listings_csv(store: &ListingStore, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    let listings = parse_listings(&content)?;

    for listing in &listings {
        store.insert(listing).await?;
    }

    info!(path = %path.display(), rows = listings.len(), "imported listings CSV");
    Ok(listings.len())
}

/// Import `path` only when the table has no rows yet.
pub async fn seed_listings_if_empty(store: &ListingStore, path: &Path) -> Result<usize> {
    let existing = store.count().await?;
    if existing > 0 {
        info!(existing, "listings table already populated, skipping seed");
        return Ok(0);
    }
    if !path.exists() {
        warn!(path = %path.display(), "seed CSV not found");
        return Ok(0);
    }
    import_listings_csv(store, path).await
}
