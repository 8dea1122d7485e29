pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;

mod app;

pub use app::run;
pub use application::use_cases::qa_pipeline::{PipelineRun, QaPipeline};
pub use domain::analysis::{Analysis, NumericSummary};
pub use domain::error::{AppError, Result};
