pub mod use_cases;

pub use use_cases::answer_synthesizer::AnswerSynthesizer;
pub use use_cases::qa_pipeline::QaPipeline;
pub use use_cases::sql_guard::{SafeQuery, SqlGuard};
pub use use_cases::sql_prompt::SqlPromptBuilder;
