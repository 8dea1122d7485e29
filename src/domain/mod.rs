pub mod analysis;
pub mod error;
pub mod listing;
pub mod llm_config;
pub mod pipeline_state;
