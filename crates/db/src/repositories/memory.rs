use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use fabmarket_core::domain::actor::{Actor, ActorId};
use fabmarket_core::domain::design::{Design, DesignId, DesignStatus};
use fabmarket_core::domain::manufacturer::ManufacturerProfile;
use fabmarket_core::domain::order::{Order, OrderId};
use fabmarket_core::domain::quote::{Quote, QuoteId, QuoteStatus};
use fabmarket_core::domain::review::{Review, ReviewId};
use fabmarket_core::store::{
    DirectoryStore, QuoteStore, QuoteUnitOfWork, ReviewStore, StoreError,
};

#[derive(Clone, Default)]
struct MarketplaceState {
    actors: HashMap<String, Actor>,
    profiles: HashMap<String, ManufacturerProfile>,
    designs: HashMap<String, Design>,
    quotes: HashMap<String, Quote>,
    orders: HashMap<String, Order>,
    reviews: HashMap<String, Review>,
}

impl MarketplaceState {
    fn order_for_quote(&self, quote_id: &QuoteId) -> Option<Order> {
        self.orders.values().find(|order| &order.accepted_quote_id == quote_id).cloned()
    }

    fn order_for_design(&self, design_id: &DesignId) -> Option<Order> {
        self.orders.values().find(|order| &order.design_id == design_id).cloned()
    }

    fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.orders.contains_key(&order.id.0) {
            return Err(StoreError::Conflict(format!("order `{}` already exists", order.id)));
        }
        if self.order_for_design(&order.design_id).is_some() {
            return Err(StoreError::Conflict(format!(
                "design `{}` already has an order",
                order.design_id
            )));
        }
        if self.order_for_quote(&order.accepted_quote_id).is_some() {
            return Err(StoreError::Conflict(format!(
                "quote `{}` already has an order",
                order.accepted_quote_id
            )));
        }
        self.orders.insert(order.id.0.clone(), order.clone());
        Ok(())
    }

    fn review_for(
        &self,
        customer_id: &ActorId,
        manufacturer_id: &ActorId,
        order_id: Option<&OrderId>,
    ) -> Option<&Review> {
        self.reviews.values().find(|review| {
            &review.customer_id == customer_id
                && &review.manufacturer_id == manufacturer_id
                && review.order_id.as_ref() == order_id
        })
    }
}

/// Process-local store with the same uniqueness guards as the SQLite
/// schema. Units of work hold the state lock until they finish, so
/// concurrent acceptances are serialized.
#[derive(Clone, Default)]
pub struct InMemoryMarketplaceStore {
    state: Arc<Mutex<MarketplaceState>>,
}

impl InMemoryMarketplaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

#[async_trait::async_trait]
impl DirectoryStore for InMemoryMarketplaceStore {
    async fn find_actor(&self, id: &ActorId) -> Result<Option<Actor>, StoreError> {
        Ok(self.state.lock().await.actors.get(&id.0).cloned())
    }

    async fn save_actor(&self, actor: Actor) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state
            .actors
            .values()
            .any(|existing| existing.email == actor.email && existing.id != actor.id)
        {
            return Err(StoreError::Conflict(format!("email `{}` is already taken", actor.email)));
        }
        state.actors.insert(actor.id.0.clone(), actor);
        Ok(())
    }

    async fn find_design(&self, id: &DesignId) -> Result<Option<Design>, StoreError> {
        Ok(self.state.lock().await.designs.get(&id.0).cloned())
    }

    async fn save_design(&self, design: Design) -> Result<(), StoreError> {
        self.state.lock().await.designs.insert(design.id.0.clone(), design);
        Ok(())
    }

    async fn find_manufacturer_profile(
        &self,
        actor_id: &ActorId,
    ) -> Result<Option<ManufacturerProfile>, StoreError> {
        Ok(self.state.lock().await.profiles.get(&actor_id.0).cloned())
    }

    async fn save_manufacturer_profile(
        &self,
        profile: ManufacturerProfile,
    ) -> Result<(), StoreError> {
        self.state.lock().await.profiles.insert(profile.actor_id.0.clone(), profile);
        Ok(())
    }
}

#[async_trait::async_trait]
impl QuoteStore for InMemoryMarketplaceStore {
    async fn find_quote(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        Ok(self.state.lock().await.quotes.get(&id.0).cloned())
    }

    async fn list_quotes_for_design(&self, design_id: &DesignId) -> Result<Vec<Quote>, StoreError> {
        let state = self.state.lock().await;
        let mut quotes: Vec<Quote> =
            state.quotes.values().filter(|quote| &quote.design_id == design_id).cloned().collect();
        quotes.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(quotes)
    }

    async fn find_quote_for_pair(
        &self,
        design_id: &DesignId,
        manufacturer_id: &ActorId,
    ) -> Result<Option<Quote>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .quotes
            .values()
            .find(|quote| &quote.design_id == design_id && &quote.manufacturer_id == manufacturer_id)
            .cloned())
    }

    async fn insert_quote(&self, quote: Quote) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.quotes.values().any(|existing| {
            existing.design_id == quote.design_id && existing.manufacturer_id == quote.manufacturer_id
        }) {
            return Err(StoreError::Conflict(format!(
                "manufacturer `{}` already quoted design `{}`",
                quote.manufacturer_id, quote.design_id
            )));
        }
        state.quotes.insert(quote.id.0.clone(), quote);
        Ok(())
    }

    async fn delete_quote(&self, id: &QuoteId) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.quotes.remove(&id.0).is_some())
    }

    async fn find_order_for_quote(&self, quote_id: &QuoteId) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.order_for_quote(quote_id))
    }

    async fn find_order_for_design(
        &self,
        design_id: &DesignId,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.order_for_design(design_id))
    }

    async fn begin(&self) -> Result<Box<dyn QuoteUnitOfWork>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryQuoteUnitOfWork { guard, working }))
    }
}

#[async_trait::async_trait]
impl ReviewStore for InMemoryMarketplaceStore {
    async fn find_review(&self, id: &ReviewId) -> Result<Option<Review>, StoreError> {
        Ok(self.state.lock().await.reviews.get(&id.0).cloned())
    }

    async fn list_reviews_for_manufacturer(
        &self,
        manufacturer_id: &ActorId,
    ) -> Result<Vec<Review>, StoreError> {
        let state = self.state.lock().await;
        let mut reviews: Vec<Review> = state
            .reviews
            .values()
            .filter(|review| &review.manufacturer_id == manufacturer_id)
            .cloned()
            .collect();
        reviews.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| right.id.cmp(&left.id))
        });
        Ok(reviews)
    }

    async fn find_review_for(
        &self,
        customer_id: &ActorId,
        manufacturer_id: &ActorId,
        order_id: Option<&OrderId>,
    ) -> Result<Option<Review>, StoreError> {
        Ok(self.state.lock().await.review_for(customer_id, manufacturer_id, order_id).cloned())
    }

    async fn insert_review(&self, review: Review) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state
            .review_for(&review.customer_id, &review.manufacturer_id, review.order_id.as_ref())
            .is_some()
        {
            return Err(StoreError::Conflict(format!(
                "customer `{}` already reviewed manufacturer `{}`",
                review.customer_id, review.manufacturer_id
            )));
        }
        state.reviews.insert(review.id.0.clone(), review);
        Ok(())
    }

    async fn update_review(&self, review: &Review) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state.reviews.get_mut(&review.id.0) {
            Some(stored) => {
                *stored = review.clone();
                Ok(())
            }
            None => Err(StoreError::Database(format!("review `{}` no longer exists", review.id))),
        }
    }

    async fn delete_review(&self, id: &ReviewId) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.reviews.remove(&id.0).is_some())
    }
}

/// Works on a copy of the state while holding the store lock; `commit`
/// swaps the copy in, anything else discards it.
pub struct InMemoryQuoteUnitOfWork {
    guard: OwnedMutexGuard<MarketplaceState>,
    working: MarketplaceState,
}

#[async_trait::async_trait]
impl QuoteUnitOfWork for InMemoryQuoteUnitOfWork {
    async fn find_quote(&mut self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        Ok(self.working.quotes.get(&id.0).cloned())
    }

    async fn find_design(&mut self, id: &DesignId) -> Result<Option<Design>, StoreError> {
        Ok(self.working.designs.get(&id.0).cloned())
    }

    async fn find_order_for_quote(
        &mut self,
        quote_id: &QuoteId,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self.working.order_for_quote(quote_id))
    }

    async fn find_order_for_design(
        &mut self,
        design_id: &DesignId,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self.working.order_for_design(design_id))
    }

    async fn update_quote(&mut self, quote: &Quote) -> Result<(), StoreError> {
        match self.working.quotes.get_mut(&quote.id.0) {
            Some(stored) => {
                *stored = quote.clone();
                Ok(())
            }
            None => Err(StoreError::Database(format!("quote `{}` no longer exists", quote.id))),
        }
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        self.working.insert_order(order)
    }

    async fn update_design_status(
        &mut self,
        design_id: &DesignId,
        status: DesignStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(design) = self.working.designs.get_mut(&design_id.0) {
            design.status = status;
            design.updated_at = at;
        }
        Ok(())
    }

    async fn reject_pending_quotes(
        &mut self,
        design_id: &DesignId,
        keep: &QuoteId,
        at: DateTime<Utc>,
    ) -> Result<Vec<QuoteId>, StoreError> {
        let mut rejected = Vec::new();
        for quote in self.working.quotes.values_mut() {
            if &quote.design_id == design_id && &quote.id != keep && quote.is_pending() {
                quote.status = QuoteStatus::Rejected;
                quote.updated_at = at;
                rejected.push(quote.id.clone());
            }
        }
        rejected.sort();
        Ok(rejected)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
