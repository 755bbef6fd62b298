//! HTTP router. Every route is nested under `/api/`.
//!
//! NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7). Static
//! segments such as `/appointments/pending` win over `/appointments/:id`.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::api::endpoints;
use crate::api::types::AppState;

/// Largest accepted request body (PDF uploads).
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn api_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/appointments/add", post(endpoints::appointments::add))
        .route("/appointments/pending", get(endpoints::appointments::pending))
        .route("/appointments/history", get(endpoints::appointments::history))
        .route("/appointments/search", get(endpoints::appointments::search))
        .route(
            "/appointments/dashboardStats",
            get(endpoints::appointments::dashboard_stats),
        )
        .route(
            "/appointments/prescription",
            post(endpoints::documents::upload_prescription),
        )
        .route("/appointments/lab", post(endpoints::documents::upload_lab))
        .route(
            "/appointments/openPrescription/:mrn",
            get(endpoints::documents::open_prescription),
        )
        .route("/appointments/openLab/:mrn", get(endpoints::documents::open_lab))
        .route("/appointments/delete", post(endpoints::documents::delete))
        .route("/appointments/:id", get(endpoints::appointments::get_one))
        .route("/appointments/:id/time", put(endpoints::appointments::update_time))
        .route("/appointments/:id/lab", put(endpoints::appointments::update_lab))
        .route("/files/:storage_id", get(endpoints::files::serve))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::test_support::{body_json, TestApp};

    #[tokio::test]
    async fn health_reports_version() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["version"], crate::config::APP_VERSION);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(Request::builder().uri("/api/nonexistent/route").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/appointments/add")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().contains_key("access-control-allow-origin"));
    }
}
