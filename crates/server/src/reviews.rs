//! Manufacturer review endpoints. Reads are public.
//!
//! - `GET    /manufacturers/{manufacturer_id}/reviews`
//! - `POST   /manufacturers/{manufacturer_id}/reviews`
//! - `GET    /reviews/{review_id}`
//! - `PATCH  /reviews/{review_id}`
//! - `DELETE /reviews/{review_id}`

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use fabmarket_core::domain::actor::ActorId;
use fabmarket_core::domain::order::OrderId;
use fabmarket_core::domain::review::ReviewId;
use fabmarket_core::reviews::{ReviewChange, ReviewDraft, ReviewView};
use serde::Deserialize;

use crate::api::{reject, reject_body, request_context, ApiError, ApiState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewBody {
    pub rating: i64,
    pub comment: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReviewBody {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/manufacturers/{manufacturer_id}/reviews", get(list_reviews).post(create_review))
        .route("/reviews/{review_id}", get(get_review).patch(update_review).delete(delete_review))
}

async fn list_reviews(
    State(state): State<ApiState>,
    Path(manufacturer_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<ReviewView>>, ApiError> {
    let context = request_context(&state, &headers).await?;
    let reviews = state
        .reviews
        .list_reviews(&ActorId(manufacturer_id))
        .await
        .map_err(|error| reject(&context, error))?;
    Ok(Json(reviews))
}

async fn create_review(
    State(state): State<ApiState>,
    Path(manufacturer_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<CreateReviewBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ReviewView>), ApiError> {
    let context = request_context(&state, &headers).await?;
    let Json(body) = payload.map_err(|rejection| reject_body(&context, rejection))?;
    let draft = ReviewDraft {
        rating: body.rating,
        comment: body.comment,
        order_id: body.order_id.filter(|id| !id.trim().is_empty()).map(OrderId),
    };

    let review = state
        .reviews
        .create_review(&context, &ActorId(manufacturer_id), draft)
        .await
        .map_err(|error| reject(&context, error))?;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn get_review(
    State(state): State<ApiState>,
    Path(review_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ReviewView>, ApiError> {
    let context = request_context(&state, &headers).await?;
    let review = state
        .reviews
        .get_review(&ReviewId(review_id))
        .await
        .map_err(|error| reject(&context, error))?;
    Ok(Json(review))
}

async fn update_review(
    State(state): State<ApiState>,
    Path(review_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<UpdateReviewBody>, JsonRejection>,
) -> Result<Json<ReviewView>, ApiError> {
    let context = request_context(&state, &headers).await?;
    let Json(body) = payload.map_err(|rejection| reject_body(&context, rejection))?;
    let change = ReviewChange { rating: body.rating, comment: body.comment };

    let review = state
        .reviews
        .update_review(&context, &ReviewId(review_id), change)
        .await
        .map_err(|error| reject(&context, error))?;
    Ok(Json(review))
}

async fn delete_review(
    State(state): State<ApiState>,
    Path(review_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let context = request_context(&state, &headers).await?;
    state
        .reviews
        .delete_review(&context, &ReviewId(review_id))
        .await
        .map_err(|error| reject(&context, error))?;
    Ok(StatusCode::NO_CONTENT)
}
