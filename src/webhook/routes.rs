//! HTTP surface: webhook verification and delivery, health, catalog status.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::{Catalog, Product};
use crate::conversation::ConversationState;
use crate::store::Database;

use super::dispatcher::Dispatcher;
use super::payload::WebhookEnvelope;

/// Catalogs listed in a user's history, newest first.
const HISTORY_LIMIT: usize = 10;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<dyn Database>,
    pub verify_token: Arc<SecretString>,
}

/// First present value among `keys`.
fn query_value<'a>(params: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| params.get(*k)).map(String::as_str)
}

/// GET <webhook path>
///
/// Meta's subscription handshake. Echoes `hub.challenge` when the mode is
/// `subscribe` and the token matches.
async fn verify(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = query_value(&params, &["hub.mode", "mode"]);
    let token = query_value(&params, &["hub.verify_token", "verify_token"]);
    let challenge = query_value(&params, &["hub.challenge", "challenge"]).unwrap_or_default();

    if mode == Some("subscribe") && token == Some(state.verify_token.expose_secret()) {
        info!("Webhook verified");
        return (StatusCode::OK, challenge.to_string()).into_response();
    }
    warn!(mode = ?mode, "Webhook verification failed");
    StatusCode::FORBIDDEN.into_response()
}

/// POST <webhook path>
///
/// Acknowledges as soon as the envelope parses; message handling runs on
/// the dispatcher's pools.
async fn receive(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Rejecting malformed webhook body");
            return StatusCode::BAD_REQUEST;
        }
    };
    let scheduled = state.dispatcher.dispatch(&envelope);
    if scheduled > 0 {
        info!(scheduled, "Webhook accepted");
    }
    StatusCode::OK
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "healthy"}))
}

#[derive(Debug, Serialize)]
struct CatalogView {
    phone_number: String,
    name: String,
    state: ConversationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog: Option<Catalog>,
    products: Vec<Product>,
    /// Recent ingestion attempts, including failed and unfinished ones.
    history: Vec<Catalog>,
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    error!(error = %e, "Catalog lookup failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "internal error"})),
    )
        .into_response()
}

/// GET /api/users/{phone}/catalog
///
/// The user's conversation state, the active catalog with its products, and
/// recent catalog history.
async fn user_catalog(State(state): State<AppState>, Path(phone): Path<String>) -> Response {
    let user = match state.store.get_user_by_phone(&phone).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "Unknown user"})),
            )
                .into_response();
        }
        Err(e) => return internal_error(e),
    };

    let active = user
        .state
        .active_catalog_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok());

    let (catalog, products) = match active {
        Some(id) => {
            let catalog = match state.store.get_catalog(id).await {
                Ok(catalog) => catalog,
                Err(e) => return internal_error(e),
            };
            let products = match state.store.list_products(id).await {
                Ok(products) => products,
                Err(e) => return internal_error(e),
            };
            (catalog, products)
        }
        None => (None, Vec::new()),
    };

    let history = match state.store.list_catalogs_for_user(user.id, HISTORY_LIMIT).await {
        Ok(history) => history,
        Err(e) => return internal_error(e),
    };

    Json(CatalogView {
        phone_number: user.phone_number,
        name: user.name,
        state: user.state,
        catalog,
        products,
        history,
    })
    .into_response()
}

/// Build the service router. `webhook_path` must start with `/`.
pub fn router(state: AppState, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, get(verify).post(receive))
        .route("/health", get(health))
        .route("/api/users/{phone}/catalog", get(user_catalog))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
