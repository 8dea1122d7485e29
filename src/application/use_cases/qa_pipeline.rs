//! Question -> SQL -> rows -> answer, as an explicit state machine.
//!
//! Every step depends on the previous one, so a run is strictly sequential.
//! The first error ends the run in `Failed(reason)`; nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::answer_synthesizer::AnswerSynthesizer;
use super::sql_guard::SqlGuard;
use super::sql_prompt::SqlPromptBuilder;
use crate::domain::analysis::Analysis;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{ChatMessage, CompletionOptions};
use crate::domain::pipeline_state::{FailureReason, PipelineState};
use crate::infrastructure::config::PipelineConfig;
use crate::infrastructure::db::RowSource;
use crate::infrastructure::llm_clients::ChatClient;

/// Outcome of one question together with every state it passed through.
#[derive(Debug)]
pub struct PipelineRun {
    pub request_id: Uuid,
    pub states: Vec<PipelineState>,
    pub outcome: Result<Analysis>,
}

impl PipelineRun {
    pub fn final_state(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self.final_state() {
            PipelineState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

struct StateLog {
    states: Vec<PipelineState>,
}

impl StateLog {
    fn new() -> Self {
        Self {
            states: vec![PipelineState::Received],
        }
    }

    fn current(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    fn advance(&mut self) {
        let from = self.current();
        let to = from.next();
        debug!(from = ?from, to = ?to, "pipeline transition");
        self.states.push(to);
    }

    fn fail(&mut self, reason: FailureReason) {
        let from = self.current();
        warn!(from = ?from, reason = %reason, "pipeline failed");
        self.states.push(PipelineState::Failed(reason));
    }
}

pub struct QaPipeline {
    chat: Arc<dyn ChatClient>,
    rows: Arc<dyn RowSource>,
    guard: SqlGuard,
    prompts: SqlPromptBuilder,
    answers: AnswerSynthesizer,
    sql_options: CompletionOptions,
    answer_options: CompletionOptions,
    llm_timeout: Duration,
}

impl QaPipeline {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        rows: Arc<dyn RowSource>,
        config: &PipelineConfig,
        llm_timeout: Duration,
    ) -> Self {
        Self {
            chat,
            rows,
            guard: SqlGuard::new(config.table_name.clone(), config.limit_policy()),
            prompts: SqlPromptBuilder::new(config.table_name.clone(), config.default_limit),
            answers: AnswerSynthesizer::new(config.answer_sample_rows, config.recommendation_count),
            sql_options: config.sql_options.clone(),
            answer_options: config.answer_options.clone(),
            llm_timeout,
        }
    }

    /// `analyzeQuestion`: the analysis, or the error that ended the run.
    pub async fn analyze(&self, question: &str) -> Result<Analysis> {
        self.run(question).await.outcome
    }

    pub async fn run(&self, question: &str) -> PipelineRun {
        let request_id = Uuid::new_v4();
        let question = question.trim();
        let span = info_span!(
            "qa_pipeline",
            request_id = %request_id,
            question_hash = %question_hash(question)
        );

        async move {
            let mut log = StateLog::new();
            let outcome = self.drive(question, &mut log).await;

            match &outcome {
                Ok(analysis) => info!(
                    rows = analysis.rows.len(),
                    answer_chars = analysis.answer.chars().count(),
                    "question answered"
                ),
                Err(err) => {
                    let reason = err
                        .failure_reason()
                        .unwrap_or(FailureReason::ExecutionError);
                    log.fail(reason);
                }
            }

            PipelineRun {
                request_id,
                states: log.states,
                outcome,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, question: &str, log: &mut StateLog) -> Result<Analysis> {
        if question.is_empty() {
            return Err(AppError::EmptyQuestion);
        }

        log.advance(); // SqlRequested
        let messages = self.prompts.build_messages(question);
        let raw = self
            .complete(&messages, &self.sql_options, "text-to-SQL")
            .await?;
        debug!(raw_chars = raw.len(), "model returned SQL candidate");

        let normalized = self.guard.normalize(&raw)?;
        log.advance(); // SqlNormalized

        let validated = self.guard.validate(normalized, &raw)?;
        log.advance(); // SqlValidated

        let query = self.guard.limit(validated, &raw)?;
        log.advance(); // SqlLimited
        info!(sql = %query, "executing guarded query");

        let rows = self.rows.query_rows(&query).await?;
        log.advance(); // Executed

        let request = self.answers.build_request(question, &rows);
        log.advance(); // AnswerRequested
        let answer = self
            .complete(&request.messages, &self.answer_options, "answer")
            .await?;
        log.advance(); // Completed

        Ok(Analysis {
            sql: query.into_string(),
            rows,
            answer,
            summary: request.summary,
        })
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        purpose: &str,
    ) -> Result<String> {
        match timeout(self.llm_timeout, self.chat.complete(messages, options)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Transport {
                status: None,
                body: format!(
                    "{} call timed out after {}ms",
                    purpose,
                    self.llm_timeout.as_millis()
                ),
            }),
        }
    }
}

/// Short digest so questions can be correlated in logs without being stored.
pub fn question_hash(question: &str) -> String {
    let digest = Sha256::digest(question.trim().to_lowercase().as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::sql_guard::SafeQuery;
    use crate::domain::listing::{NewListing, ResultSet};
    use crate::infrastructure::db::listings::tests::seeded_store;
    use crate::infrastructure::db::SqliteRowSource;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedChat {
        replies: Mutex<VecDeque<Result<String>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedChat {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedChat {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<String> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    struct SlowChat;

    #[async_trait]
    impl ChatClient for SlowChat {
        async fn complete(&self, _: &[ChatMessage], _: &CompletionOptions) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("SELECT * FROM listings".to_string())
        }
    }

    struct FixedRows {
        rows: ResultSet,
        queries: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl FixedRows {
        fn new(rows: ResultSet) -> Arc<Self> {
            Arc::new(Self {
                rows,
                queries: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RowSource for FixedRows {
        async fn query_rows(&self, query: &SafeQuery) -> Result<ResultSet> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.rows.clone())
        }
    }

    struct FailingRows;

    #[async_trait]
    impl RowSource for FailingRows {
        async fn query_rows(&self, _: &SafeQuery) -> Result<ResultSet> {
            Err(AppError::ExecutionError("no such column: colour".to_string()))
        }
    }

    fn pipeline(chat: Arc<dyn ChatClient>, rows: Arc<dyn RowSource>) -> QaPipeline {
        QaPipeline::new(chat, rows, &PipelineConfig::default(), Duration::from_secs(5))
    }

    fn ok(text: &str) -> Result<String> {
        Ok(text.to_string())
    }

    const SUCCESS_STATES: [PipelineState; 8] = [
        PipelineState::Received,
        PipelineState::SqlRequested,
        PipelineState::SqlNormalized,
        PipelineState::SqlValidated,
        PipelineState::SqlLimited,
        PipelineState::Executed,
        PipelineState::AnswerRequested,
        PipelineState::Completed,
    ];

    #[tokio::test]
    async fn test_thai_question_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        seeded_store(dir.path()).await;
        let source = SqliteRowSource::connect(&dir.path().join("listings.db"), 2, 5)
            .await
            .unwrap();

        let chat = ScriptedChat::new(vec![
            ok("นี่คือคำสั่ง SQL ครับ\n```sql\nSELECT *\nFROM listings\nWHERE size > 150 AND bathrooms >= 2;\n```"),
            ok("พบ 2 รายการที่ตรงกับเงื่อนไข"),
        ]);
        let qa = pipeline(chat.clone(), Arc::new(source));

        let run = qa
            .run("มีรายการใดบ้างที่มีขนาดมากกว่า 150 ตร.ม. และมีอย่างน้อย 2 ห้องน้ำ")
            .await;
        assert_eq!(run.states, SUCCESS_STATES);
        assert_eq!(run.failure_reason(), None);

        let analysis = run.outcome.unwrap();
        assert_eq!(
            analysis.sql,
            "SELECT * FROM listings WHERE size > 150 AND bathrooms >= 2 LIMIT 50"
        );
        assert_eq!(analysis.rows.len(), 2);
        assert_eq!(analysis.answer, "พบ 2 รายการที่ตรงกับเงื่อนไข");
        assert_eq!(analysis.summary.count, 2);
        assert_eq!(analysis.summary.min_price, Some(6_500_000.0));
        assert_eq!(analysis.summary.max_price, Some(15_000_000.0));
        assert_eq!(analysis.summary.avg_price, Some(10_750_000.0));

        assert_eq!(chat.calls(), 2);
        let seen = chat.seen.lock().unwrap();
        assert!(seen[1][1].content.contains("Seaview duplex"));
    }

    #[tokio::test]
    async fn test_budget_question_returns_only_matching_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path()).await;
        store
            .insert(&NewListing {
                price: Some(1_850_000.0),
                description: Some("2BR near university".to_string()),
                location: Some("Giza".to_string()),
                listing_type: Some("apartment".to_string()),
                size: Some(95.0),
                bedrooms: Some(2),
                bathrooms: Some(1),
                available_from: Some("2025-10-15".to_string()),
            })
            .await
            .unwrap();
        let source = SqliteRowSource::connect(&dir.path().join("listings.db"), 2, 5)
            .await
            .unwrap();

        let chat = ScriptedChat::new(vec![
            ok("```sql\nSELECT * FROM listings WHERE price < 2000000 AND bedrooms >= 2\n```"),
            ok("มี 1 รายการในงบประมาณ"),
        ]);
        let analysis = pipeline(chat, Arc::new(source))
            .analyze("ราคาต่ำกว่า 2000000 อย่างน้อย 2 ห้องนอน")
            .await
            .unwrap();

        assert!(analysis.sql.ends_with("LIMIT 50"), "{}", analysis.sql);
        assert!(!analysis.rows.is_empty());
        for row in &analysis.rows {
            assert!(row["price"].as_f64().unwrap() < 2_000_000.0, "{row:?}");
            assert!(row["bedrooms"].as_i64().unwrap() >= 2, "{row:?}");
        }
        assert_eq!(analysis.rows[0]["location"], "Giza");
        assert_eq!(analysis.summary.count, 1);
    }

    #[tokio::test]
    async fn test_delete_prose_never_reaches_executor() {
        let chat = ScriptedChat::new(vec![ok("DELETE FROM listings")]);
        let rows = FixedRows::new(Vec::new());
        let qa = pipeline(chat.clone(), rows.clone());

        let run = qa.run("ลบข้อมูลทั้งหมด").await;
        assert_eq!(
            run.final_state(),
            PipelineState::Failed(FailureReason::UnsafeSql)
        );
        assert!(matches!(run.outcome, Err(AppError::ExtractionFailure { .. })));
        assert_eq!(rows.calls.load(Ordering::SeqCst), 0);
        assert_eq!(chat.calls(), 1);
    }

    #[tokio::test]
    async fn test_chained_statement_is_unsafe() {
        let chat = ScriptedChat::new(vec![ok("SELECT * FROM listings; DROP TABLE listings")]);
        let rows = FixedRows::new(Vec::new());
        let run = pipeline(chat, rows.clone()).run("q").await;

        assert_eq!(
            run.states,
            [
                PipelineState::Received,
                PipelineState::SqlRequested,
                PipelineState::SqlNormalized,
                PipelineState::Failed(FailureReason::UnsafeSql),
            ]
        );
        match run.outcome {
            Err(AppError::UnsafeSql { raw, .. }) => {
                assert_eq!(raw, "SELECT * FROM listings; DROP TABLE listings")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(rows.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_question_makes_no_calls() {
        let chat = ScriptedChat::new(Vec::new());
        let rows = FixedRows::new(Vec::new());
        let run = pipeline(chat.clone(), rows.clone()).run("   \n ").await;

        assert_eq!(
            run.states,
            [
                PipelineState::Received,
                PipelineState::Failed(FailureReason::EmptyQuestion)
            ]
        );
        assert_eq!(chat.calls(), 0);
        assert_eq!(rows.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_errors_are_surfaced_as_is() {
        let chat = ScriptedChat::new(vec![Err(AppError::CredentialMissing)]);
        let run = pipeline(chat, FixedRows::new(Vec::new())).run("q").await;
        assert_eq!(run.failure_reason(), Some(FailureReason::CredentialMissing));

        let chat = ScriptedChat::new(vec![Err(AppError::Transport {
            status: Some(429),
            body: "rate limited".to_string(),
        })]);
        let err = pipeline(chat, FixedRows::new(Vec::new()))
            .analyze("q")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transport { status: Some(429), .. }));
    }

    #[tokio::test]
    async fn test_execution_error_stops_before_answer() {
        let chat = ScriptedChat::new(vec![ok("SELECT colour FROM listings")]);
        let run = pipeline(chat.clone(), Arc::new(FailingRows)).run("q").await;

        assert_eq!(
            run.final_state(),
            PipelineState::Failed(FailureReason::ExecutionError)
        );
        assert_eq!(run.states[run.states.len() - 2], PipelineState::SqlLimited);
        assert_eq!(chat.calls(), 1);
    }

    #[tokio::test]
    async fn test_executor_receives_limited_query() {
        let chat = ScriptedChat::new(vec![
            ok("SELECT * FROM listings ORDER BY price LIMIT 5000"),
            ok("คำตอบ"),
        ]);
        let rows = FixedRows::new(vec![json!({ "price": 100 }).as_object().cloned().unwrap()]);
        let analysis = pipeline(chat, rows.clone()).analyze("q").await.unwrap();

        assert_eq!(
            rows.queries.lock().unwrap().as_slice(),
            ["SELECT * FROM listings ORDER BY price LIMIT 200"]
        );
        assert_eq!(analysis.sql, "SELECT * FROM listings ORDER BY price LIMIT 200");
        assert_eq!(analysis.summary.avg_price, Some(100.0));
    }

    #[tokio::test]
    async fn test_empty_result_still_asks_for_an_answer() {
        let chat = ScriptedChat::new(vec![
            ok("SELECT * FROM listings WHERE price < 0"),
            ok("ไม่มีข้อมูลเพียงพอ"),
        ]);
        let analysis = pipeline(chat.clone(), FixedRows::new(Vec::new()))
            .analyze("q")
            .await
            .unwrap();

        assert!(analysis.rows.is_empty());
        assert_eq!(analysis.summary.count, 0);
        assert_eq!(analysis.answer, "ไม่มีข้อมูลเพียงพอ");
        assert_eq!(chat.calls(), 2);
    }

    #[tokio::test]
    async fn test_slow_model_times_out_as_transport_error() {
        let qa = QaPipeline::new(
            Arc::new(SlowChat),
            FixedRows::new(Vec::new()),
            &PipelineConfig::default(),
            Duration::from_millis(20),
        );
        let run = qa.run("q").await;
        assert_eq!(run.failure_reason(), Some(FailureReason::TransportError));
    }

    #[test]
    fn test_question_hash_is_stable_and_short() {
        assert_eq!(question_hash("  Hello "), question_hash("hello"));
        assert_eq!(question_hash("hello").len(), 12);
        assert_ne!(question_hash("hello"), question_hash("bye"));
    }
}
