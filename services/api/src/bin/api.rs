//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, embeddings::OpenAiEmbeddingAdapter, pdf::PdfTextConverter},
    config::Config,
    error::ApiError,
    web::{
        require_user, rest::ApiDoc, state::{AppState, RunRegistry}, upload_syllabus_handler,
        ws_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use syllabus_core::{
    ports::{NullSimilarity, SemanticSimilarity},
    PipelinePorts, SyllabusPipeline,
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let similarity: Arc<dyn SemanticSimilarity> = match &config.openai_api_key {
        Some(key) => {
            let client = Client::with_config(OpenAIConfig::new().with_api_key(key));
            info!(model = %config.embedding_model, "Semantic tie-break enabled");
            Arc::new(OpenAiEmbeddingAdapter::new(client, config.embedding_model.clone()))
        }
        None => {
            warn!("OPENAI_API_KEY not set; semantic tie-break disabled");
            Arc::new(NullSimilarity)
        }
    };

    // --- 4. Build the Pipeline ---
    let ports = PipelinePorts {
        storage: db_adapter.clone(),
        rate_limits: db_adapter.clone(),
        converter: Arc::new(PdfTextConverter::new()),
        similarity,
        tasks: db_adapter.clone(),
    };
    let pipeline = Arc::new(SyllabusPipeline::new(Arc::new(config.pipeline.clone()), ports)?);

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        pipeline,
        classes: db_adapter,
        runs: RunRegistry::default(),
    });

    let allowed_origin = "http://localhost:3000"
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS origin: {e}")))?;
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, HeaderName::from_static("x-user-id")]);

    // --- 6. Create the Web Router ---
    // Oversized files must reach the validation gate so the user gets its message.
    let body_limit = usize::try_from(config.pipeline.max_file_bytes.saturating_mul(2)).unwrap_or(usize::MAX);

    let api_router = Router::new()
        .route("/classes/{class_id}/syllabus", post(upload_syllabus_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn(require_user))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
