//! Quote lifecycle controller.
//!
//! Creation, listing, update (including acceptance into an order) and
//! deletion of quotes. Every mutating path authorizes against the loaded
//! records before it writes, and acceptance runs its quote write, order
//! insert, design status change and sibling rejections inside a single
//! [`QuoteUnitOfWork`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, RequestContext};
use crate::authorization::{
    can_create_quote, can_delete_quote, can_submit_quotes, can_update_quote, can_view_order,
    can_view_quote, visible_quotes,
};
use crate::domain::actor::ActorId;
use crate::domain::design::{Design, DesignId, DesignStatus};
use crate::domain::order::{Order, OrderId};
use crate::domain::quote::{validate_price, Quote, QuoteChange, QuoteId, QuoteStatus};
use crate::errors::ApplicationError;
use crate::pricing::{PricingEngine, PricingOutcome};
use crate::store::{MarketplaceStore, QuoteUnitOfWork, StoreError};

pub const DUPLICATE_QUOTE_MESSAGE: &str = "You have already submitted a quote for this design.";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateQuoteRequest {
    /// Filled in from the pricing engine when absent.
    pub price: Option<Decimal>,
    /// Filled in from the pricing engine when absent.
    pub estimated_lead_time_days: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteView {
    pub id: QuoteId,
    pub design_id: DesignId,
    pub design_name: String,
    pub manufacturer_id: ActorId,
    pub manufacturer_display_name: String,
    pub price: Decimal,
    pub lead_time_days: u32,
    pub status: QuoteStatus,
    pub status_display: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: OrderId,
    pub design_id: DesignId,
    pub accepted_quote_id: QuoteId,
    pub customer_id: ActorId,
    pub manufacturer_id: ActorId,
    pub total_price: Decimal,
    pub status: String,
    pub status_display: String,
    pub estimated_delivery_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            design_id: order.design_id,
            accepted_quote_id: order.accepted_quote_id,
            customer_id: order.customer_id,
            manufacturer_id: order.manufacturer_id,
            total_price: order.total_price,
            status: order.status.as_str().to_owned(),
            status_display: order.status.label().to_owned(),
            estimated_delivery_date: order.estimated_delivery_date,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// What acceptance did to the rest of the design's records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceptanceOutcome {
    /// The update did not move the quote onto `accepted`.
    NotApplicable,
    Materialized { order_id: OrderId, rejected_quote_ids: Vec<QuoteId> },
    /// An order already referenced this quote; nothing new was written.
    AlreadyApplied { order_id: OrderId },
    /// A concurrent update won. The quote is returned as currently stored.
    Superseded,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuoteUpdate {
    pub quote: QuoteView,
    pub acceptance: AcceptanceOutcome,
}

enum UnitOutcome {
    Applied { previous: QuoteStatus, quote: Quote, acceptance: AcceptanceOutcome },
    Stale { current: Quote, reason: &'static str },
}

pub struct QuoteLifecycle {
    store: Arc<dyn MarketplaceStore>,
    pricing: Arc<dyn PricingEngine>,
    audit: Arc<dyn AuditSink>,
}

impl QuoteLifecycle {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        pricing: Arc<dyn PricingEngine>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { store, pricing, audit }
    }

    pub async fn create_quote(
        &self,
        context: &RequestContext,
        design_id: &DesignId,
        request: CreateQuoteRequest,
    ) -> Result<QuoteView, ApplicationError> {
        let actor = context.require_actor()?;
        can_submit_quotes(actor).into_result()?;

        let design = self.load_design(design_id).await?;
        if let Err(error) = can_create_quote(actor, &design).into_result() {
            self.emit_rejection(context, "quote.create_denied", Some(design.id.0.as_str()), &error);
            return Err(error);
        }

        if self.store.find_quote_for_pair(&design.id, &actor.id).await?.is_some() {
            return Err(ApplicationError::Validation(DUPLICATE_QUOTE_MESSAGE.to_owned()));
        }

        let (price, lead_time) = match (request.price, request.estimated_lead_time_days) {
            (Some(price), Some(days)) => (price, days),
            (price, days) => {
                let outcome = self.price_design_for(&design, &actor.id).await?;
                let (Some(priced), Some(priced_days)) =
                    (outcome.price, outcome.estimated_lead_time_days)
                else {
                    return Err(ApplicationError::Validation(outcome.errors.join(" ")));
                };
                (price.unwrap_or(priced), days.unwrap_or(priced_days))
            }
        };
        let price = validate_price(price)?;
        let notes = request.notes.filter(|notes| !notes.trim().is_empty());

        let quote = Quote::new(design.id.clone(), actor.id.clone(), price, lead_time, notes, Utc::now());
        match self.store.insert_quote(quote.clone()).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(ApplicationError::Validation(DUPLICATE_QUOTE_MESSAGE.to_owned()));
            }
            Err(error) => return Err(error.into()),
        }

        tracing::info!(
            event_name = "quote.created",
            correlation_id = %context.correlation_id,
            quote_id = %quote.id,
            design_id = %design.id,
            actor_id = %actor.id,
            price = %quote.price,
            "quote created"
        );
        self.audit.emit(
            AuditEvent::new(context, "quote.created", AuditCategory::Quote, AuditOutcome::Success)
                .with_subject(quote.id.0.clone())
                .with_metadata("design_id", design.id.0.clone())
                .with_metadata("price", quote.price.to_string()),
        );

        self.view(quote, &design).await
    }

    pub async fn list_quotes(
        &self,
        context: &RequestContext,
        design_id: &DesignId,
    ) -> Result<Vec<QuoteView>, ApplicationError> {
        let actor = context.require_actor()?;
        let design = self.load_design(design_id).await?;
        let quotes = self.store.list_quotes_for_design(&design.id).await?;

        let mut names: BTreeMap<ActorId, String> = BTreeMap::new();
        let mut views = Vec::new();
        for quote in visible_quotes(actor, &design, quotes) {
            if !names.contains_key(&quote.manufacturer_id) {
                let name = self.manufacturer_display_name(&quote.manufacturer_id).await?;
                names.insert(quote.manufacturer_id.clone(), name);
            }
            let name = names.get(&quote.manufacturer_id).cloned().unwrap_or_default();
            views.push(quote_view(quote, &design, name));
        }
        Ok(views)
    }

    pub async fn get_quote(
        &self,
        context: &RequestContext,
        quote_id: &QuoteId,
    ) -> Result<QuoteView, ApplicationError> {
        let actor = context.require_actor()?;
        let (quote, design) = self.load_quote(quote_id).await?;
        can_view_quote(actor, &quote, &design).into_result()?;
        self.view(quote, &design).await
    }

    pub async fn update_quote(
        &self,
        context: &RequestContext,
        quote_id: &QuoteId,
        mut change: QuoteChange,
    ) -> Result<QuoteUpdate, ApplicationError> {
        let actor = context.require_actor()?;
        if change.is_empty() {
            return Err(ApplicationError::Validation("No updatable fields were provided.".to_owned()));
        }

        let (quote, design) = self.load_quote(quote_id).await?;
        if let Err(error) = can_update_quote(actor, &quote, &design, &change).into_result() {
            self.emit_rejection(context, "quote.update_denied", Some(quote.id.0.as_str()), &error);
            return Err(error);
        }
        if let Some(price) = change.price {
            change.price = Some(validate_price(price)?);
        }
        if let Some(next) = change.status {
            quote.clone().transition_to(next)?;
        }

        let authorized_status = quote.status;
        let now = Utc::now();
        let mut unit = self.store.begin().await?;
        let outcome = match apply_in_unit(unit.as_mut(), quote_id, authorized_status, &change, now).await {
            Ok(outcome) => outcome,
            Err(error) => {
                if let Err(rollback_error) = unit.rollback().await {
                    tracing::error!(
                        event_name = "quote.rollback_failed",
                        correlation_id = %context.correlation_id,
                        quote_id = %quote_id,
                        error = %rollback_error,
                        "failed to roll back quote update"
                    );
                }
                tracing::error!(
                    event_name = "quote.update_failed",
                    correlation_id = %context.correlation_id,
                    quote_id = %quote_id,
                    error = %error,
                    "quote update rolled back"
                );
                self.audit.emit(
                    AuditEvent::new(context, "quote.update_failed", AuditCategory::Quote, AuditOutcome::Failed)
                        .with_subject(quote_id.0.clone())
                        .with_metadata("error", error.to_string()),
                );
                return Err(error);
            }
        };

        match outcome {
            UnitOutcome::Stale { current, reason } => {
                unit.rollback().await?;
                tracing::warn!(
                    event_name = "quote.update_superseded",
                    correlation_id = %context.correlation_id,
                    quote_id = %current.id,
                    design_id = %current.design_id,
                    actor_id = %actor.id,
                    current_status = current.status.as_str(),
                    reason,
                    "concurrent update won, treating request as a no-op"
                );
                let view = self.view(current, &design).await?;
                Ok(QuoteUpdate { quote: view, acceptance: AcceptanceOutcome::Superseded })
            }
            UnitOutcome::Applied { previous, quote, acceptance } => {
                unit.commit().await?;
                self.report_update(context, previous, &quote, &acceptance);
                let view = self.view(quote, &design).await?;
                Ok(QuoteUpdate { quote: view, acceptance })
            }
        }
    }

    pub async fn delete_quote(
        &self,
        context: &RequestContext,
        quote_id: &QuoteId,
    ) -> Result<(), ApplicationError> {
        let actor = context.require_actor()?;
        let (quote, design) = self.load_quote(quote_id).await?;
        if let Err(error) = can_delete_quote(actor, &quote, &design).into_result() {
            self.emit_rejection(context, "quote.delete_denied", Some(quote.id.0.as_str()), &error);
            return Err(error);
        }

        if !self.store.delete_quote(&quote.id).await? {
            return Err(ApplicationError::NotFound("Quote not found.".to_owned()));
        }

        tracing::info!(
            event_name = "quote.deleted",
            correlation_id = %context.correlation_id,
            quote_id = %quote.id,
            design_id = %design.id,
            actor_id = %actor.id,
            status = quote.status.as_str(),
            "quote deleted"
        );
        self.audit.emit(
            AuditEvent::new(context, "quote.deleted", AuditCategory::Quote, AuditOutcome::Success)
                .with_subject(quote.id.0.clone())
                .with_metadata("status", quote.status.as_str()),
        );
        Ok(())
    }

    /// Prices a design for the calling manufacturer without creating a quote.
    pub async fn estimate_price(
        &self,
        context: &RequestContext,
        design_id: &DesignId,
    ) -> Result<PricingOutcome, ApplicationError> {
        let actor = context.require_actor()?;
        can_submit_quotes(actor).into_result()?;
        let design = self.load_design(design_id).await?;
        let outcome = self.price_design_for(&design, &actor.id).await?;

        let result = if outcome.is_quotable() { AuditOutcome::Success } else { AuditOutcome::Rejected };
        self.audit.emit(
            AuditEvent::new(context, "pricing.estimated", AuditCategory::Pricing, result)
                .with_subject(design.id.0.clone())
                .with_metadata("error_count", outcome.errors.len().to_string()),
        );
        Ok(outcome)
    }

    /// Runs the pricing engine against stored records. No access checks.
    pub async fn price(
        &self,
        design_id: &DesignId,
        manufacturer_id: &ActorId,
    ) -> Result<PricingOutcome, ApplicationError> {
        let design = self.load_design(design_id).await?;
        self.price_design_for(&design, manufacturer_id).await
    }

    pub async fn order_for_design(
        &self,
        context: &RequestContext,
        design_id: &DesignId,
    ) -> Result<OrderView, ApplicationError> {
        let actor = context.require_actor()?;
        let design = self.load_design(design_id).await?;
        let order = self
            .store
            .find_order_for_design(&design.id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound("No order has been placed for this design.".to_owned()))?;
        can_view_order(actor, &order).into_result()?;
        Ok(OrderView::from(order))
    }

    async fn price_design_for(
        &self,
        design: &Design,
        manufacturer_id: &ActorId,
    ) -> Result<PricingOutcome, ApplicationError> {
        let profile = self
            .store
            .find_manufacturer_profile(manufacturer_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound("Manufacturer pricing profile not found.".to_owned()))?;
        Ok(self.pricing.compute_price(design, &profile))
    }

    async fn load_design(&self, design_id: &DesignId) -> Result<Design, ApplicationError> {
        self.store
            .find_design(design_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound("Design not found.".to_owned()))
    }

    async fn load_quote(&self, quote_id: &QuoteId) -> Result<(Quote, Design), ApplicationError> {
        let quote = self
            .store
            .find_quote(quote_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound("Quote not found.".to_owned()))?;
        let design = self.load_design(&quote.design_id).await?;
        Ok((quote, design))
    }

    async fn manufacturer_display_name(&self, id: &ActorId) -> Result<String, ApplicationError> {
        Ok(self
            .store
            .find_actor(id)
            .await?
            .map(|actor| actor.display_name().to_owned())
            .unwrap_or_else(|| id.0.clone()))
    }

    async fn view(&self, quote: Quote, design: &Design) -> Result<QuoteView, ApplicationError> {
        let name = self.manufacturer_display_name(&quote.manufacturer_id).await?;
        Ok(quote_view(quote, design, name))
    }

    fn emit_rejection(
        &self,
        context: &RequestContext,
        event_type: &str,
        subject: Option<&str>,
        error: &ApplicationError,
    ) {
        tracing::info!(
            event_name = event_type,
            correlation_id = %context.correlation_id,
            actor_id = %context.actor_label(),
            subject_id = subject.unwrap_or(""),
            reason = %error,
            "quote request denied"
        );
        let mut event = AuditEvent::new(context, event_type, AuditCategory::Quote, AuditOutcome::Rejected)
            .with_metadata("reason", error.to_string());
        if let Some(subject) = subject {
            event = event.with_subject(subject);
        }
        self.audit.emit(event);
    }

    fn report_update(
        &self,
        context: &RequestContext,
        previous: QuoteStatus,
        quote: &Quote,
        acceptance: &AcceptanceOutcome,
    ) {
        tracing::info!(
            event_name = "quote.updated",
            correlation_id = %context.correlation_id,
            quote_id = %quote.id,
            design_id = %quote.design_id,
            actor_id = %context.actor_label(),
            from = previous.as_str(),
            to = quote.status.as_str(),
            "quote updated"
        );
        self.audit.emit(
            AuditEvent::new(context, "quote.updated", AuditCategory::Quote, AuditOutcome::Success)
                .with_subject(quote.id.0.clone())
                .with_metadata("from", previous.as_str())
                .with_metadata("to", quote.status.as_str()),
        );

        match acceptance {
            AcceptanceOutcome::Materialized { order_id, rejected_quote_ids } => {
                tracing::info!(
                    event_name = "quote.accepted",
                    correlation_id = %context.correlation_id,
                    quote_id = %quote.id,
                    design_id = %quote.design_id,
                    order_id = %order_id,
                    "quote accepted"
                );
                self.audit.emit(
                    AuditEvent::new(context, "quote.accepted", AuditCategory::Quote, AuditOutcome::Success)
                        .with_subject(quote.id.0.clone())
                        .with_metadata("order_id", order_id.0.clone()),
                );
                tracing::info!(
                    event_name = "order.created",
                    correlation_id = %context.correlation_id,
                    order_id = %order_id,
                    quote_id = %quote.id,
                    design_id = %quote.design_id,
                    total_price = %quote.price,
                    "order created from accepted quote"
                );
                self.audit.emit(
                    AuditEvent::new(context, "order.created", AuditCategory::Order, AuditOutcome::Success)
                        .with_subject(order_id.0.clone())
                        .with_metadata("quote_id", quote.id.0.clone())
                        .with_metadata("total_price", quote.price.to_string()),
                );
                self.audit.emit(
                    AuditEvent::new(context, "design.ordered", AuditCategory::Design, AuditOutcome::Success)
                        .with_subject(quote.design_id.0.clone()),
                );
                for rejected in rejected_quote_ids {
                    tracing::info!(
                        event_name = "quote.sibling_rejected",
                        correlation_id = %context.correlation_id,
                        quote_id = %rejected,
                        accepted_quote_id = %quote.id,
                        design_id = %quote.design_id,
                        "competing quote rejected"
                    );
                    self.audit.emit(
                        AuditEvent::new(
                            context,
                            "quote.sibling_rejected",
                            AuditCategory::Quote,
                            AuditOutcome::Success,
                        )
                        .with_subject(rejected.0.clone())
                        .with_metadata("accepted_quote_id", quote.id.0.clone()),
                    );
                }
            }
            AcceptanceOutcome::AlreadyApplied { order_id } => {
                tracing::warn!(
                    event_name = "quote.reaccepted",
                    correlation_id = %context.correlation_id,
                    quote_id = %quote.id,
                    order_id = %order_id,
                    "quote re-accepted but an order already exists"
                );
            }
            AcceptanceOutcome::NotApplicable | AcceptanceOutcome::Superseded => {}
        }
    }
}

/// Re-reads the quote inside the unit, applies `change` and, on the edge
/// into `accepted`, materializes the order and its side effects.
async fn apply_in_unit(
    unit: &mut dyn QuoteUnitOfWork,
    quote_id: &QuoteId,
    authorized_status: QuoteStatus,
    change: &QuoteChange,
    now: DateTime<Utc>,
) -> Result<UnitOutcome, ApplicationError> {
    let current = unit
        .find_quote(quote_id)
        .await?
        .ok_or_else(|| ApplicationError::NotFound("Quote not found.".to_owned()))?;
    if current.status != authorized_status {
        return Ok(UnitOutcome::Stale { current, reason: "quote status changed" });
    }

    let previous = current.status;
    let mut updated = current.clone();
    if let Some(next) = change.status {
        updated.transition_to(next)?;
    }
    updated.apply_fields(change);
    updated.updated_at = now;
    unit.update_quote(&updated).await?;

    if previous == QuoteStatus::Accepted || updated.status != QuoteStatus::Accepted {
        return Ok(UnitOutcome::Applied { previous, quote: updated, acceptance: AcceptanceOutcome::NotApplicable });
    }

    if let Some(order) = unit.find_order_for_quote(&updated.id).await? {
        return Ok(UnitOutcome::Applied {
            previous,
            quote: updated,
            acceptance: AcceptanceOutcome::AlreadyApplied { order_id: order.id },
        });
    }

    let design = unit
        .find_design(&updated.design_id)
        .await?
        .ok_or_else(|| ApplicationError::NotFound("Design not found.".to_owned()))?;
    if unit.find_order_for_design(&design.id).await?.is_some() {
        return Ok(UnitOutcome::Stale { current, reason: "design already ordered" });
    }

    let order = Order::from_accepted_quote(&updated, &design, now);
    match unit.insert_order(&order).await {
        Ok(()) => {}
        Err(StoreError::Conflict(_)) => {
            return Ok(UnitOutcome::Stale { current, reason: "order uniqueness guard" });
        }
        Err(error) => return Err(error.into()),
    }

    if design.status != DesignStatus::Ordered {
        unit.update_design_status(&design.id, DesignStatus::Ordered, now).await?;
    }
    let rejected_quote_ids = unit.reject_pending_quotes(&design.id, &updated.id, now).await?;

    Ok(UnitOutcome::Applied {
        previous,
        quote: updated,
        acceptance: AcceptanceOutcome::Materialized { order_id: order.id, rejected_quote_ids },
    })
}

fn quote_view(quote: Quote, design: &Design, manufacturer_display_name: String) -> QuoteView {
    QuoteView {
        id: quote.id,
        design_id: quote.design_id,
        design_name: design.design_name.clone(),
        manufacturer_id: quote.manufacturer_id,
        manufacturer_display_name,
        price: quote.price,
        lead_time_days: quote.estimated_lead_time_days,
        status: quote.status,
        status_display: quote.status.label().to_owned(),
        notes: quote.notes,
        created_at: quote.created_at,
        updated_at: quote.updated_at,
    }
}
