use serde::{Deserialize, Serialize};

use super::listing::ResultSet;

/// Statistics computed locally over the rows sent to the answer model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_price: Option<f64>,
}

/// Result of `analyzeQuestion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    /// The statement that was executed, after guarding and limiting.
    pub sql: String,
    pub rows: ResultSet,
    pub answer: String,
    pub summary: NumericSummary,
}
