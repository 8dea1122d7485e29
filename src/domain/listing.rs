use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// One row returned by the executor. Column order follows the statement.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Rows in the order the statement produced them.
pub type ResultSet = Vec<Row>;

/// A stored listing, as read back from the `listings` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Listing {
    pub id: i64,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub listing_type: Option<String>,
    pub size: Option<f64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub available_from: Option<String>,
    pub available_year: Option<i64>,
    pub available_month: Option<i64>,
    pub available_day: Option<i64>,
}

/// Input for seeding a listing. The decomposed date columns are derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewListing {
    pub price: Option<f64>,
    pub description: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "type")]
    pub listing_type: Option<String>,
    pub size: Option<f64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,
    pub available_from: Option<String>,
}

/// Year, month and day of an availability date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailableDate {
    pub year: i64,
    pub month: i64,
    pub day: i64,
}

impl NewListing {
    pub fn available_date(&self) -> Option<AvailableDate> {
        let raw = self.available_from.as_deref()?.trim();
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
        Some(AvailableDate {
            year: i64::from(date.year()),
            month: i64::from(date.month()),
            day: i64::from(date.day()),
        })
    }
}
