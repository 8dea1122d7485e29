pub mod answer_synthesizer;
pub mod qa_pipeline;
pub mod sql_guard;
pub mod sql_prompt;
