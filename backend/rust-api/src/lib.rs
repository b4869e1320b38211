use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod offline;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    // The quiz client is served from other origins and may run offline-first
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1", public_routes(app_state.clone()).layer(cors))
        .nest(
            "/admin",
            admin_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn public_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let results = Router::new()
        .route("/results", post(handlers::content::submit_result))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::optional_auth_middleware,
        ));

    Router::new()
        .route("/hierarchy", get(handlers::content::get_hierarchy))
        .route(
            "/subjects/{id}/lectures",
            get(handlers::content::list_subject_lectures),
        )
        .route("/lectures/{id}", get(handlers::content::get_quiz_lecture))
        .merge(results)
}

fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Years
        .route(
            "/years",
            get(handlers::admin::list_years).post(handlers::admin::create_year),
        )
        .route(
            "/years/{id}",
            get(handlers::admin::get_year)
                .put(handlers::admin::update_year)
                .delete(handlers::admin::delete_year),
        )
        .route("/years/{id}/rename", post(handlers::admin::rename_year))
        // Modules
        .route(
            "/modules",
            get(handlers::admin::list_modules).post(handlers::admin::create_module),
        )
        .route(
            "/modules/{id}",
            get(handlers::admin::get_module)
                .put(handlers::admin::update_module)
                .delete(handlers::admin::delete_module),
        )
        .route("/modules/{id}/rename", post(handlers::admin::rename_module))
        // Subjects
        .route(
            "/subjects",
            get(handlers::admin::list_subjects).post(handlers::admin::create_subject),
        )
        .route(
            "/subjects/{id}",
            get(handlers::admin::get_subject)
                .put(handlers::admin::update_subject)
                .delete(handlers::admin::delete_subject),
        )
        .route(
            "/subjects/{id}/rename",
            post(handlers::admin::rename_subject),
        )
        // Lectures
        .route(
            "/lectures",
            get(handlers::admin::list_lectures).post(handlers::admin::create_lecture),
        )
        .route(
            "/lectures/{id}",
            get(handlers::admin::get_lecture)
                .put(handlers::admin::update_lecture)
                .delete(handlers::admin::delete_lecture),
        )
        .route(
            "/lectures/{id}/rename",
            post(handlers::admin::rename_lecture),
        )
        .route(
            "/lectures/{id}/questions",
            post(handlers::admin::add_question),
        )
        .route(
            "/lectures/{id}/questions/{question_id}",
            delete(handlers::admin::remove_question),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
}
