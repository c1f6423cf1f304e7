//! Persistence ports consumed by the lifecycle controller and review service.
//!
//! Implementations live in `fabmarket-db`. Uniqueness guards are the store's
//! job: a violated constraint must surface as [`StoreError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::actor::{Actor, ActorId};
use crate::domain::design::{Design, DesignId, DesignStatus};
use crate::domain::manufacturer::ManufacturerProfile;
use crate::domain::order::{Order, OrderId};
use crate::domain::quote::{Quote, QuoteId};
use crate::domain::review::{Review, ReviewId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("uniqueness conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_actor(&self, id: &ActorId) -> Result<Option<Actor>, StoreError>;
    async fn save_actor(&self, actor: Actor) -> Result<(), StoreError>;
    async fn find_design(&self, id: &DesignId) -> Result<Option<Design>, StoreError>;
    async fn save_design(&self, design: Design) -> Result<(), StoreError>;
    async fn find_manufacturer_profile(
        &self,
        actor_id: &ActorId,
    ) -> Result<Option<ManufacturerProfile>, StoreError>;
    async fn save_manufacturer_profile(&self, profile: ManufacturerProfile)
        -> Result<(), StoreError>;
}

#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn find_quote(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError>;
    /// Oldest first.
    async fn list_quotes_for_design(&self, design_id: &DesignId) -> Result<Vec<Quote>, StoreError>;
    async fn find_quote_for_pair(
        &self,
        design_id: &DesignId,
        manufacturer_id: &ActorId,
    ) -> Result<Option<Quote>, StoreError>;
    async fn insert_quote(&self, quote: Quote) -> Result<(), StoreError>;
    /// Returns `false` when no quote had that id.
    async fn delete_quote(&self, id: &QuoteId) -> Result<bool, StoreError>;
    async fn find_order_for_quote(&self, quote_id: &QuoteId) -> Result<Option<Order>, StoreError>;
    async fn find_order_for_design(&self, design_id: &DesignId)
        -> Result<Option<Order>, StoreError>;
    async fn begin(&self) -> Result<Box<dyn QuoteUnitOfWork>, StoreError>;
}

/// An isolated read/write unit over quotes, orders and design status.
///
/// Nothing written through the unit is visible to other callers before
/// `commit`. Dropping the unit without committing discards its writes.
#[async_trait]
pub trait QuoteUnitOfWork: Send {
    async fn find_quote(&mut self, id: &QuoteId) -> Result<Option<Quote>, StoreError>;
    async fn find_design(&mut self, id: &DesignId) -> Result<Option<Design>, StoreError>;
    async fn find_order_for_quote(&mut self, quote_id: &QuoteId)
        -> Result<Option<Order>, StoreError>;
    async fn find_order_for_design(
        &mut self,
        design_id: &DesignId,
    ) -> Result<Option<Order>, StoreError>;
    async fn update_quote(&mut self, quote: &Quote) -> Result<(), StoreError>;
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;
    async fn update_design_status(
        &mut self,
        design_id: &DesignId,
        status: DesignStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Rejects every pending quote on the design except `keep`, returning the
    /// ids that changed.
    async fn reject_pending_quotes(
        &mut self,
        design_id: &DesignId,
        keep: &QuoteId,
        at: DateTime<Utc>,
    ) -> Result<Vec<QuoteId>, StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn find_review(&self, id: &ReviewId) -> Result<Option<Review>, StoreError>;
    /// Newest first.
    async fn list_reviews_for_manufacturer(
        &self,
        manufacturer_id: &ActorId,
    ) -> Result<Vec<Review>, StoreError>;
    async fn find_review_for(
        &self,
        customer_id: &ActorId,
        manufacturer_id: &ActorId,
        order_id: Option<&OrderId>,
    ) -> Result<Option<Review>, StoreError>;
    async fn insert_review(&self, review: Review) -> Result<(), StoreError>;
    async fn update_review(&self, review: &Review) -> Result<(), StoreError>;
    async fn delete_review(&self, id: &ReviewId) -> Result<bool, StoreError>;
}

pub trait MarketplaceStore: DirectoryStore + QuoteStore + ReviewStore {}

impl<T> MarketplaceStore for T where T: DirectoryStore + QuoteStore + ReviewStore {}
