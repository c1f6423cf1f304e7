//! Shared plumbing for the JSON API: state, caller resolution and the
//! mapping from application errors onto HTTP responses.

use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, StatusCode},
    Json, Router,
};
use fabmarket_core::audit::{AuditSink, RequestContext};
use fabmarket_core::domain::actor::ActorId;
use fabmarket_core::errors::{ApplicationError, InterfaceError};
use fabmarket_core::lifecycle::QuoteLifecycle;
use fabmarket_core::pricing::DeterministicPricingEngine;
use fabmarket_core::reviews::ReviewService;
use fabmarket_core::store::MarketplaceStore;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::{quotes, reviews};

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn MarketplaceStore>,
    pub quotes: Arc<QuoteLifecycle>,
    pub reviews: Arc<ReviewService>,
}

impl ApiState {
    pub fn new(store: Arc<dyn MarketplaceStore>, audit: Arc<dyn AuditSink>) -> Self {
        let quotes = QuoteLifecycle::new(
            Arc::clone(&store),
            Arc::new(DeterministicPricingEngine),
            Arc::clone(&audit),
        );
        let reviews = ReviewService::new(Arc::clone(&store), audit);
        Self { store, quotes: Arc::new(quotes), reviews: Arc::new(reviews) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub detail: String,
    pub correlation_id: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(state: ApiState) -> Router {
    Router::new().merge(quotes::routes()).merge(reviews::routes()).with_state(state)
}

pub fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(error: InterfaceError) -> ApiError {
    let status = status_for(&error);
    if status.is_server_error() {
        error!(
            event_name = "api.request_failed",
            correlation_id = %error.correlation_id(),
            status = status.as_u16(),
            error = %error,
            "request failed"
        );
    }
    let body = ErrorBody {
        detail: error.detail().to_owned(),
        correlation_id: error.correlation_id().to_owned(),
    };
    (status, Json(body))
}

/// Maps a failed application call onto the response for `context`.
pub fn reject(context: &RequestContext, error: ApplicationError) -> ApiError {
    error_response(error.into_interface(context.correlation_id.clone()))
}

pub fn reject_body(context: &RequestContext, rejection: JsonRejection) -> ApiError {
    error_response(InterfaceError::BadRequest {
        message: rejection.body_text(),
        correlation_id: context.correlation_id.clone(),
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Resolves the caller from the actor header. A missing header is an
/// anonymous caller; an id the directory does not know is rejected.
pub async fn request_context(
    state: &ApiState,
    headers: &HeaderMap,
) -> Result<RequestContext, ApiError> {
    let correlation_id = header_value(headers, CORRELATION_HEADER)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    let Some(actor_id) = header_value(headers, ACTOR_HEADER) else {
        return Ok(RequestContext::anonymous(correlation_id));
    };

    match state.store.find_actor(&ActorId(actor_id.clone())).await {
        Ok(Some(actor)) => Ok(RequestContext::new(actor, correlation_id)),
        Ok(None) => {
            warn!(
                event_name = "api.unknown_actor",
                correlation_id = %correlation_id,
                actor_id = %actor_id,
                "request carried an unknown actor id"
            );
            Err(error_response(InterfaceError::Unauthorized {
                message: "Invalid authentication credentials.".to_owned(),
                correlation_id,
            }))
        }
        Err(store_error) => Err(error_response(
            ApplicationError::from(store_error).into_interface(correlation_id),
        )),
    }
}
