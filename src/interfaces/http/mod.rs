use crate::application::use_cases::qa_pipeline::QaPipeline;
use crate::domain::analysis::NumericSummary;
use crate::domain::error::AppError;
use crate::domain::listing::ResultSet;
use crate::infrastructure::db::ListingStore;
use actix_cors::Cors;
use actix_web::{dev::Server, get, http::StatusCode, post, web, App, HttpResponse, HttpServer, Responder};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use validator::Validate;

const LOG_CAPACITY: usize = 100;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub source: String,
    pub message: String,
}

pub struct HttpState {
    pub pipeline: Arc<QaPipeline>,
    pub store: Arc<ListingStore>,
    pub logs: Arc<Mutex<Vec<LogEntry>>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeRequest {
    #[serde(default, alias = "question")]
    #[validate(length(max = 2000))]
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub prompt: String,
    pub sql: String,
    pub rows: ResultSet,
    pub answer: String,
    pub summary: NumericSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub reason: Option<String>,
}

fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::EmptyQuestion | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
        AppError::ExtractionFailure { .. } | AppError::UnsafeSql { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AppError::Transport { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &AppError) -> HttpResponse {
    HttpResponse::build(status_for(err)).json(ErrorBody {
        error: err.to_string(),
        reason: err.failure_reason().map(|r| r.as_str().to_string()),
    })
}

#[post("/qa/analyze")]
async fn analyze(data: web::Data<HttpState>, req: web::Json<AnalyzeRequest>) -> impl Responder {
    let req = req.into_inner();
    if let Err(e) = req.validate() {
        return error_response(&AppError::ValidationError(e.to_string()));
    }

    add_log(
        &data.logs,
        "INFO",
        "QA",
        &format!("Analyzing question ({} chars)", req.prompt.chars().count()),
    );

    let run = data.pipeline.run(&req.prompt).await;
    match run.outcome {
        Ok(analysis) => {
            add_log(
                &data.logs,
                "INFO",
                "QA",
                &format!(
                    "Request {} completed: {} rows via `{}`",
                    run.request_id,
                    analysis.rows.len(),
                    analysis.sql
                ),
            );
            HttpResponse::Ok().json(AnalyzeResponse {
                prompt: req.prompt,
                sql: analysis.sql,
                rows: analysis.rows,
                answer: analysis.answer,
                summary: analysis.summary,
            })
        }
        Err(e) => {
            add_log(
                &data.logs,
                "ERROR",
                "QA",
                &format!("Request {} failed: {}", run.request_id, e),
            );
            error_response(&e)
        }
    }
}

#[get("/health")]
async fn health(data: web::Data<HttpState>) -> impl Responder {
    match data.store.count().await {
        Ok(count) => HttpResponse::Ok().json(serde_json::json!({ "status": "ok", "listings": count })),
        Err(e) => {
            add_log(&data.logs, "ERROR", "Health", &e.to_string());
            error_response(&e)
        }
    }
}

#[get("/logs")]
async fn get_logs(data: web::Data<HttpState>) -> impl Responder {
    let logs = lock_logs(&data.logs);
    HttpResponse::Ok().json(&*logs)
}

fn lock_logs(logs: &Mutex<Vec<LogEntry>>) -> MutexGuard<'_, Vec<LogEntry>> {
    logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn add_log(logs: &Mutex<Vec<LogEntry>>, level: &str, source: &str, message: &str) {
    let entry = LogEntry {
        time: Local::now().format("%H:%M:%S").to_string(),
        level: level.to_string(),
        source: source.to_string(),
        message: message.to_string(),
    };
    let mut logs = lock_logs(logs);
    logs.push(entry);
    if logs.len() > LOG_CAPACITY {
        logs.remove(0);
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(analyze)
            .service(health)
            .service(get_logs),
    );
}

pub fn start_server(state: HttpState, address: &str) -> std::io::Result<Server> {
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure)
    })
    .bind(address)?
    .run();

    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::sql_guard::SafeQuery;
    use crate::domain::error::Result;
    use crate::domain::llm_config::{ChatMessage, CompletionOptions};
    use crate::infrastructure::config::PipelineConfig;
    use crate::infrastructure::db::listings::tests::seeded_store;
    use crate::infrastructure::db::RowSource;
    use crate::infrastructure::llm_clients::ChatClient;
    use actix_web::test as actix_test;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Replies with the same text to every call.
    struct EchoChat(&'static str);

    #[async_trait]
    impl ChatClient for EchoChat {
        async fn complete(&self, _: &[ChatMessage], _: &CompletionOptions) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct NoRows;

    #[async_trait]
    impl RowSource for NoRows {
        async fn query_rows(&self, _: &SafeQuery) -> Result<ResultSet> {
            Ok(Vec::new())
        }
    }

    async fn state(dir: &std::path::Path, reply: &'static str) -> web::Data<HttpState> {
        let store = seeded_store(dir).await;
        let pipeline = QaPipeline::new(
            Arc::new(EchoChat(reply)),
            Arc::new(NoRows),
            &PipelineConfig::default(),
            Duration::from_secs(5),
        );
        web::Data::new(HttpState {
            pipeline: Arc::new(pipeline),
            store: Arc::new(store),
            logs: Arc::new(Mutex::new(Vec::new())),
        })
    }

    #[actix_web::test]
    async fn test_analyze_success() {
        let dir = tempfile::tempdir().unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(state(dir.path(), "SELECT * FROM listings").await)
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/qa/analyze")
            .set_json(serde_json::json!({ "question": "ทั้งหมด" }))
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["prompt"], "ทั้งหมด");
        assert_eq!(body["sql"], "SELECT * FROM listings LIMIT 50");
        assert_eq!(body["summary"]["count"], 0);
        assert_eq!(body["answer"], "SELECT * FROM listings");
    }

    #[actix_web::test]
    async fn test_unsafe_sql_is_422_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(state(dir.path(), "SELECT * FROM users").await)
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/qa/analyze")
            .set_json(serde_json::json!({ "prompt": "q" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: ErrorBody = actix_test::read_body_json(resp).await;
        assert_eq!(body.reason.as_deref(), Some("unsafe_sql"));
    }

    #[actix_web::test]
    async fn test_empty_and_oversized_prompts_are_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(state(dir.path(), "SELECT * FROM listings").await)
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/qa/analyze")
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = actix_test::read_body_json(resp).await;
        assert_eq!(body.reason.as_deref(), Some("empty_question"));

        let req = actix_test::TestRequest::post()
            .uri("/api/qa/analyze")
            .set_json(serde_json::json!({ "prompt": "x".repeat(2001) }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_health_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let data = state(dir.path(), "SELECT * FROM listings").await;
        let app = actix_test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = actix_test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["listings"], 4);

        let req = actix_test::TestRequest::post()
            .uri("/api/qa/analyze")
            .set_json(serde_json::json!({ "prompt": "q" }))
            .to_request();
        actix_test::call_service(&app, req).await;

        let req = actix_test::TestRequest::get().uri("/api/logs").to_request();
        let logs: Vec<LogEntry> = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.source == "QA"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&AppError::EmptyQuestion), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&AppError::ExtractionFailure { raw: String::new() }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&AppError::Transport { status: Some(500), body: String::new() }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&AppError::CredentialMissing),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&AppError::ExecutionError(String::new())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_log_ring_is_bounded() {
        let logs = Mutex::new(Vec::new());
        for i in 0..(LOG_CAPACITY + 5) {
            add_log(&logs, "INFO", "test", &i.to_string());
        }
        let logs = logs.lock().unwrap();
        assert_eq!(logs.len(), LOG_CAPACITY);
        assert_eq!(logs[0].message, "5");
    }
}
