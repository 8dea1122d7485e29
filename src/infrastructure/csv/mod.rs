// ============================================================
// CSV INFRASTRUCTURE LAYER
// ============================================================
// Listing seed import

mod listing_csv;

pub use listing_csv::{import_listings_csv, parse_listings, seed_listings_if_empty, REQUIRED_COLUMNS};
