#![allow(clippy::missing_docs_in_private_items)]

use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    company_profile::{get_profile, put_profile},
    documents::{delete_document, get_document, list_documents, upload_document},
    liveness::live,
    readiness::ready,
    sessions::{
        archive_session, complete_session, create_session, evaluate_session, get_session,
        post_message,
    },
    talk_points::{delete_talk_point, generate_talk_points, get_talk_point, list_talk_points},
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

pub mod api_state;
pub mod error;
pub mod middleware_api_auth;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    // Protected endpoints: everything below is tenant-scoped.
    let protected = Router::new()
        .route(
            "/documents",
            post(upload_document)
                .get(list_documents)
                .layer(DefaultBodyLimit::max(app_state.config.doc.max_bytes)),
        )
        .route(
            "/documents/{id}",
            get(get_document).delete(delete_document),
        )
        .route("/sessions", post(create_session))
        .route(
            "/sessions/{id}",
            get(get_session).delete(archive_session),
        )
        .route("/sessions/{id}/messages", post(post_message))
        .route("/sessions/{id}/complete", post(complete_session))
        .route("/sessions/{id}/evaluate", post(evaluate_session))
        .route("/talk-points/generate", post(generate_talk_points))
        .route("/talk-points", get(list_talk_points))
        .route(
            "/talk-points/{id}",
            get(get_talk_point).delete(delete_talk_point),
        )
        .route("/company-profile", get(get_profile).put(put_profile))
        .route_layer(from_fn(api_auth));

    public
        .merge(protected)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
