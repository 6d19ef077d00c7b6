mod clients;
mod handlers;
mod middleware;
mod models;
mod services;
mod utils;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    clients::{
        llm::{ChatCompletionClient, LlmInterviewer},
        pdf::PdfReportRenderer,
        resume::{PdfResumeExtractor, PgResumeIndex},
        scoring::{LlmPlanner, LlmScorer},
        speech::HttpSpeechSynthesizer,
        vision::HttpFaceDetector,
    },
    handlers::{auth, interviews, proctor, reports},
    middleware::auth::auth_middleware,
    services::{
        session::{Collaborators, SessionService, SessionSettings},
        store::PgStore,
    },
    utils::{config::Config, database::create_pool},
};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub sessions: SessionService,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interview_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    for dir in [&config.upload_dir, &config.audio_dir, &config.report_dir] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!("Failed to create storage directory {}: {}", dir.display(), e);
        }
    }

    let db = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("failed to connect to the database")?;

    sqlx::migrate!("./migrations").run(&db).await?;

    let collaborators = build_collaborators(&config, &db)?;
    let sessions = SessionService::new(
        Arc::new(PgStore::new(db.clone())),
        collaborators,
        SessionSettings::from_config(&config),
    );

    if config.llm.api_key.is_none() {
        tracing::warn!("LLM_API_KEY is not set; interviews will use fallback questions and scores");
    }

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        db,
        sessions,
        config: Arc::new(config),
    };

    let app = app(state)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn build_collaborators(config: &Config, db: &PgPool) -> anyhow::Result<Collaborators> {
    let timeout = config.collaborator_timeout_secs;
    let llm = Arc::new(
        ChatCompletionClient::new(&config.llm, timeout).context("failed to build LLM client")?,
    );

    Ok(Collaborators {
        generator: Arc::new(LlmInterviewer::new(llm.clone(), &config.llm.interview_model)),
        speech: Arc::new(
            HttpSpeechSynthesizer::new(config.tts_api_url.clone(), config.audio_dir.clone(), timeout)
                .context("failed to build speech client")?,
        ),
        extractor: Arc::new(PdfResumeExtractor),
        resume_index: Arc::new(PgResumeIndex::new(db.clone())),
        scorer: Arc::new(LlmScorer::new(llm.clone(), &config.llm.scoring_model)),
        planner: Arc::new(LlmPlanner::new(llm, &config.llm.scoring_model)),
        renderer: Arc::new(PdfReportRenderer::new(config.report_dir.clone())),
        face_detector: Arc::new(
            HttpFaceDetector::new(config.vision_api_url.clone(), timeout)
                .context("failed to build face detection client")?,
        ),
    })
}

/// Span for one request. Only the path is recorded; the query string can
/// carry the websocket bearer token.
fn request_span(request: &Request) -> Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path()
    )
}

fn app(state: AppState) -> anyhow::Result<Router> {
    let cors_origin = state.config.cors_origin.clone();

    let cors = if cors_origin == "*" {
        CorsLayer::new()
            .allow_origin(HeaderValue::from_static("*"))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
    } else {
        CorsLayer::new()
            .allow_origin(cors_origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
            .allow_credentials(true)
    };

    let protected_routes = Router::new()
        .route(
            "/interviews",
            get(interviews::get_history).post(interviews::create_interview),
        )
        .route("/interviews/:id", get(interviews::get_interview))
        .route("/interviews/:id/start", post(interviews::start_interview))
        .route("/interviews/:id/chat", post(interviews::chat))
        .route("/interviews/:id/warning", post(interviews::record_warning))
        .route("/interviews/:id/end", post(interviews::end_interview))
        .route("/reports/:id", get(reports::get_report))
        .route("/reports/:id/download", get(reports::download_report))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let body_limit = state.config.max_request_body_mb * 1024 * 1024;

    Ok(Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/ws/proctor/:id", get(proctor::proctor_ws))
        .merge(protected_routes)
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::session::testing::harness;
    use crate::utils::{config::LlmSettings, jwt::create_jwt};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/unused".to_string(),
            database_max_connections: 1,
            jwt_secret: SECRET.to_string(),
            jwt_ttl_hours: 1,
            bind_addr: "127.0.0.1:0".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
            max_request_body_mb: 1,
            upload_dir: "./storage/uploads".into(),
            audio_dir: "./storage/audio".into(),
            report_dir: "./storage/reports".into(),
            public_base_url: "http://localhost:8000".to_string(),
            llm: LlmSettings {
                api_url: "http://localhost:9".to_string(),
                api_key: None,
                interview_model: "m".to_string(),
                scoring_model: "m".to_string(),
            },
            tts_api_url: None,
            vision_api_url: None,
            collaborator_timeout_secs: 1,
            proctor_warning_limit: 3,
            resume_context_top_k: 3,
        }
    }

    /// Router over the in-memory session store. The lazy pool is never
    /// touched by the routes exercised here.
    fn test_app() -> (Router, crate::services::session::testing::Harness) {
        let h = harness(false);
        let db = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let state = AppState {
            db,
            sessions: h.service.clone(),
            config: Arc::new(test_config()),
        };
        (app(state).unwrap(), h)
    }

    fn bearer(user_id: i32) -> String {
        format!("Bearer {}", create_jwt(user_id, SECRET, 1).unwrap())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_post(uri: &str, user_id: i32, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", bearer(user_id))
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_resume(uri: &str, user_id: i32, content: &str) -> Request<Body> {
        let boundary = "resume-boundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"resume.txt\"\r\n\
Content-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
            b = boundary,
            c = content
        );
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", bearer(user_id))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[derive(Clone, Default)]
    struct SpanFields(Arc<std::sync::Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanFields {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            struct Collect<'a>(&'a mut Vec<String>);

            impl tracing::field::Visit for Collect<'_> {
                fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                    self.0.push(format!("{}={:?}", field.name(), value));
                }
            }

            let mut fields = self.0.lock().unwrap();
            attrs.record(&mut Collect(&mut fields));
        }
    }

    #[test]
    fn request_span_leaves_out_the_token_query() {
        let fields = SpanFields::default();
        let subscriber = tracing_subscriber::registry().with(fields.clone());

        tracing::subscriber::with_default(subscriber, || {
            let request = Request::builder()
                .uri("/ws/proctor/5?token=header.payload.signature")
                .body(Body::empty())
                .unwrap();
            let _span = request_span(&request);
        });

        let recorded = fields.0.lock().unwrap().join(" ");
        assert!(recorded.contains("path=/ws/proctor/5"));
        assert!(recorded.contains("method=GET"));
        assert!(!recorded.contains("token"));
        assert!(!recorded.contains("signature"));
    }

    #[tokio::test]
    async fn health_is_public() {
        let (app, _h) = test_app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_require_a_valid_token() {
        let (app, _h) = test_app();
        let missing = app
            .clone()
            .oneshot(Request::builder().uri("/interviews").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let forged = app
            .oneshot(
                Request::builder()
                    .uri("/interviews")
                    .header("Authorization", "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn session_flow_maps_statuses() {
        let (app, _h) = test_app();

        let bad = app
            .clone()
            .oneshot(json_post(
                "/interviews",
                7,
                serde_json::json!({"interview_type": "panel", "duration_minutes": 10}),
            ))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let created = app
            .clone()
            .oneshot(json_post(
                "/interviews",
                7,
                serde_json::json!({"interview_type": "technical", "skills": "Go,SQL", "duration_minutes": 10}),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let id = body_json(created).await["interview_id"].as_i64().unwrap();

        let foreign = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/interviews/{}", id))
                    .header("Authorization", bearer(8))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

        let early = app
            .clone()
            .oneshot(json_post(
                &format!("/interviews/{}/chat", id),
                7,
                serde_json::json!({"user_answer": "hi", "elapsed_seconds": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(early.status(), StatusCode::CONFLICT);

        let started = app
            .clone()
            .oneshot(multipart_resume(
                &format!("/interviews/{}/start", id),
                7,
                "Go and SQL at Acme",
            ))
            .await
            .unwrap();
        assert_eq!(started.status(), StatusCode::OK);
        let opening = body_json(started).await;
        assert_eq!(opening["round"], 1);
        assert_eq!(opening["is_finished"], false);
        assert_eq!(opening["interview_id"], id);

        let turn = app
            .clone()
            .oneshot(json_post(
                &format!("/interviews/{}/chat", id),
                7,
                serde_json::json!({"user_answer": "I tune queries.", "elapsed_seconds": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(turn.status(), StatusCode::OK);
        let turn = body_json(turn).await;
        assert_eq!(turn["round"], 2);
        assert_eq!(turn["time_warning"], false);

        let ended = app
            .clone()
            .oneshot(json_post(&format!("/interviews/{}/end", id), 7, serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(ended.status(), StatusCode::OK);
        assert!(body_json(ended).await["report_id"].as_i64().is_some());

        let report = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/reports/{}", id))
                    .header("Authorization", bearer(7))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(report.status(), StatusCode::OK);
        let report = body_json(report).await;
        assert_eq!(report["interview"]["status"], "completed");
        assert_eq!(report["transcript"].as_array().unwrap().len(), 3);

        let history = app
            .oneshot(
                Request::builder()
                    .uri("/interviews")
                    .header("Authorization", bearer(7))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let history = body_json(history).await;
        assert_eq!(history["interviews"].as_array().unwrap().len(), 1);
        assert!(history["interviews"][0]["report_id"].is_number());
    }

    #[tokio::test]
    async fn empty_answers_fail_validation() {
        let (app, _h) = test_app();
        let response = app
            .oneshot(json_post(
                "/interviews/1/chat",
                7,
                serde_json::json!({"user_answer": "", "elapsed_seconds": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
