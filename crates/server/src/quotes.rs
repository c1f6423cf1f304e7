//! Quote, price-estimate and order endpoints.
//!
//! - `POST   /designs/{design_id}/quotes`         submit a quote
//! - `GET    /designs/{design_id}/quotes`         quotes visible to the caller
//! - `GET    /designs/{design_id}/price-estimate` price the design for the calling manufacturer
//! - `GET    /designs/{design_id}/order`          order created from the accepted quote
//! - `GET    /quotes/{quote_id}`
//! - `PATCH  /quotes/{quote_id}`                  partial update, acceptance included
//! - `DELETE /quotes/{quote_id}`

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use fabmarket_core::domain::design::DesignId;
use fabmarket_core::domain::quote::{validate_lead_time, QuoteChange, QuoteId, QuoteStatus};
use fabmarket_core::errors::ApplicationError;
use fabmarket_core::lifecycle::{CreateQuoteRequest, OrderView, QuoteView};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::{reject, reject_body, request_context, ApiError, ApiState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuoteBody {
    pub price: Option<Decimal>,
    pub lead_time_days: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuoteBody {
    pub status: Option<String>,
    pub price: Option<Decimal>,
    pub lead_time_days: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEstimate {
    pub design_id: DesignId,
    pub price: Option<Decimal>,
    pub lead_time_days: Option<u32>,
    pub details: BTreeMap<String, Decimal>,
    pub errors: Vec<String>,
}

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/designs/{design_id}/quotes", get(list_quotes).post(create_quote))
        .route("/designs/{design_id}/price-estimate", get(price_estimate))
        .route("/designs/{design_id}/order", get(design_order))
        .route("/quotes/{quote_id}", get(get_quote).patch(update_quote).delete(delete_quote))
}

impl CreateQuoteBody {
    fn into_request(self) -> Result<CreateQuoteRequest, ApplicationError> {
        let estimated_lead_time_days = self.lead_time_days.map(validate_lead_time).transpose()?;
        Ok(CreateQuoteRequest { price: self.price, estimated_lead_time_days, notes: self.notes })
    }
}

impl UpdateQuoteBody {
    fn into_change(self) -> Result<QuoteChange, ApplicationError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<QuoteStatus>)
            .transpose()
            .map_err(ApplicationError::from)?;
        let estimated_lead_time_days = self.lead_time_days.map(validate_lead_time).transpose()?;
        Ok(QuoteChange { status, price: self.price, estimated_lead_time_days, notes: self.notes })
    }
}

async fn create_quote(
    State(state): State<ApiState>,
    Path(design_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<CreateQuoteBody>, JsonRejection>,
) -> Result<(StatusCode, Json<QuoteView>), ApiError> {
    let context = request_context(&state, &headers).await?;
    let Json(body) = payload.map_err(|rejection| reject_body(&context, rejection))?;
    let request = body.into_request().map_err(|error| reject(&context, error))?;

    let quote = state
        .quotes
        .create_quote(&context, &DesignId(design_id), request)
        .await
        .map_err(|error| reject(&context, error))?;
    Ok((StatusCode::CREATED, Json(quote)))
}

async fn list_quotes(
    State(state): State<ApiState>,
    Path(design_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<QuoteView>>, ApiError> {
    let context = request_context(&state, &headers).await?;
    let quotes = state
        .quotes
        .list_quotes(&context, &DesignId(design_id))
        .await
        .map_err(|error| reject(&context, error))?;
    Ok(Json(quotes))
}

async fn get_quote(
    State(state): State<ApiState>,
    Path(quote_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<QuoteView>, ApiError> {
    let context = request_context(&state, &headers).await?;
    let quote = state
        .quotes
        .get_quote(&context, &QuoteId(quote_id))
        .await
        .map_err(|error| reject(&context, error))?;
    Ok(Json(quote))
}

async fn update_quote(
    State(state): State<ApiState>,
    Path(quote_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<UpdateQuoteBody>, JsonRejection>,
) -> Result<Json<QuoteView>, ApiError> {
    let context = request_context(&state, &headers).await?;
    let Json(body) = payload.map_err(|rejection| reject_body(&context, rejection))?;
    let change = body.into_change().map_err(|error| reject(&context, error))?;

    let update = state
        .quotes
        .update_quote(&context, &QuoteId(quote_id), change)
        .await
        .map_err(|error| reject(&context, error))?;
    Ok(Json(update.quote))
}

async fn delete_quote(
    State(state): State<ApiState>,
    Path(quote_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let context = request_context(&state, &headers).await?;
    state
        .quotes
        .delete_quote(&context, &QuoteId(quote_id))
        .await
        .map_err(|error| reject(&context, error))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn price_estimate(
    State(state): State<ApiState>,
    Path(design_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PriceEstimate>, ApiError> {
    let context = request_context(&state, &headers).await?;
    let design_id = DesignId(design_id);
    let outcome = state
        .quotes
        .estimate_price(&context, &design_id)
        .await
        .map_err(|error| reject(&context, error))?;

    Ok(Json(PriceEstimate {
        design_id,
        price: outcome.price,
        lead_time_days: outcome.estimated_lead_time_days,
        details: outcome.details,
        errors: outcome.errors,
    }))
}

async fn design_order(
    State(state): State<ApiState>,
    Path(design_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<OrderView>, ApiError> {
    let context = request_context(&state, &headers).await?;
    let order = state
        .quotes
        .order_for_design(&context, &DesignId(design_id))
        .await
        .map_err(|error| reject(&context, error))?;
    Ok(Json(order))
}
