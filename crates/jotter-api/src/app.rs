//! Router assembly: routes, OpenAPI docs and middleware.

use std::any::Any as PanicPayload;
use std::path::PathBuf;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::{AllowedOrigins, ServerConfig, StorageSettings, DEFAULT_MAX_UPLOAD_BYTES};
use crate::error::ApiError;
use crate::handlers::{health, notes};
use crate::state::AppState;

/// Request ID generator producing UUIDv7 values.
#[derive(Clone, Copy)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Jotter API",
        description = "Personal notes with a single file attachment per note"
    ),
    paths(
        health::health_check,
        notes::list_notes,
        notes::get_note,
        notes::create_note,
        notes::upload_attachment,
    ),
    components(schemas(jotter_core::Note, jotter_core::NewNote, health::HealthResponse)),
    modifiers(&BearerSecurity),
    tags(
        (name = "Notes", description = "Note operations for the authenticated user"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;

/// Router settings that do not live in [`AppState`].
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub allowed_origins: AllowedOrigins,
    pub max_upload_bytes: usize,
    /// Serve this directory under `/files` (filesystem storage backend).
    pub files_dir: Option<PathBuf>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::List(vec![
                crate::config::DEFAULT_ALLOWED_ORIGINS.to_string(),
            ]),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            files_dir: None,
        }
    }
}

impl RouterOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        let files_dir = match &config.storage {
            StorageSettings::Filesystem { path, .. } => Some(path.clone()),
            StorageSettings::S3(_) => None,
        };
        Self {
            allowed_origins: config.allowed_origins.clone(),
            max_upload_bytes: config.max_upload_bytes,
            files_dir,
        }
    }
}

fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600));

    match origins {
        AllowedOrigins::Any => layer.allow_origin(Any),
        AllowedOrigins::List(list) => {
            let values: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(v) => Some(v),
                    Err(e) => {
                        tracing::warn!("Invalid CORS origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect();
            layer
                .allow_origin(AllowOrigin::list(values))
                .allow_credentials(true)
        }
    }
}

/// Turn a handler panic into the regular JSON 500.
fn handle_panic(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    tracing::error!(subsystem = "api", panic = %detail, "Handler panicked");
    ApiError::Internal("Internal server error".to_string()).into_response()
}

/// Build the application router.
pub fn build_router(state: AppState, options: &RouterOptions) -> Router {
    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .route("/notes", get(notes::list_notes).post(notes::create_note))
        .route("/notes/:id", get(notes::get_note))
        .route("/notes/:id/upload", post(notes::upload_attachment))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // uploads are user content: never render them in the API's origin
    if let Some(dir) = &options.files_dir {
        let files = ServiceBuilder::new()
            .layer(SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment"),
            ))
            .service(ServeDir::new(dir));
        router = router.nest_service("/files", files);
    }

    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors_layer(&options.allowed_origins))
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(options.max_upload_bytes))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn explode() -> &'static str {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_json_500() {
        let router: Router = Router::new()
            .route("/boom", get(explode))
            .layer(CatchPanicLayer::custom(handle_panic));

        let response = router
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({"error": "Internal server error"}));
    }

    #[test]
    fn test_openapi_document_lists_note_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in ["/health", "/notes", "/notes/{id}", "/notes/{id}/upload"] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {}",
                expected
            );
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }

    #[test]
    fn test_router_options_follow_storage_backend() {
        let config = ServerConfig::from_lookup(|name| match name {
            "STORAGE_BACKEND" => Some("filesystem".to_string()),
            "FILE_STORAGE_PATH" => Some("/tmp/jotter-files".to_string()),
            "AUTH_JWT_SECRET" => Some("dev".to_string()),
            _ => None,
        })
        .unwrap();

        let options = RouterOptions::from_config(&config);
        assert_eq!(options.files_dir, Some(PathBuf::from("/tmp/jotter-files")));
    }
}
