use axum::{routing::get, Router};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;

use crate::handler::{
    delete_reservation, health_check, show_form, show_reservations, submit_reservation,
};
use crate::registry::AppRegistry;

pub fn build_routers(registry: AppRegistry) -> Router {
    Router::new()
        .route("/", get(show_form).post(submit_reservation))
        .route("/reservations", get(show_reservations))
        .route("/delete/:id", get(delete_reservation))
        .route("/health", get(health_check))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .with_state(registry)
}
