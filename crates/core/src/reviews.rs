use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, RequestContext};
use crate::authorization::{can_create_review, can_modify_review};
use crate::domain::actor::{Actor, ActorId};
use crate::domain::order::OrderId;
use crate::domain::review::{validate_rating, Review, ReviewId};
use crate::errors::ApplicationError;
use crate::store::{MarketplaceStore, StoreError};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReviewDraft {
    pub rating: i64,
    pub comment: Option<String>,
    pub order_id: Option<OrderId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReviewChange {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: ReviewId,
    pub customer_id: ActorId,
    pub customer_display_name: String,
    pub manufacturer_id: ActorId,
    pub manufacturer_display_name: String,
    pub rating: u8,
    pub comment: Option<String>,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn duplicate_message(order_id: Option<&OrderId>) -> String {
    match order_id {
        Some(_) => "You have already submitted a review for this manufacturer for this order.".to_owned(),
        None => "You have already submitted a review for this manufacturer (general review).".to_owned(),
    }
}

fn clean_comment(comment: Option<String>) -> Option<String> {
    comment.filter(|comment| !comment.trim().is_empty())
}

/// Customer reviews of manufacturers. Reads are public; writes are limited
/// to the reviewing customer and staff.
pub struct ReviewService {
    store: Arc<dyn MarketplaceStore>,
    audit: Arc<dyn AuditSink>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn MarketplaceStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub async fn create_review(
        &self,
        context: &RequestContext,
        manufacturer_id: &ActorId,
        draft: ReviewDraft,
    ) -> Result<ReviewView, ApplicationError> {
        let actor = context.require_actor()?;
        let target = self.store.find_actor(manufacturer_id).await?;
        can_create_review(actor, target.as_ref()).into_result()?;
        let Some(manufacturer) = target else {
            return Err(ApplicationError::NotFound("Manufacturer not found.".to_owned()));
        };

        let rating = validate_rating(draft.rating)?;
        if self
            .store
            .find_review_for(&actor.id, &manufacturer.id, draft.order_id.as_ref())
            .await?
            .is_some()
        {
            return Err(ApplicationError::Validation(duplicate_message(draft.order_id.as_ref())));
        }

        let now = Utc::now();
        let review = Review {
            id: ReviewId::generate(),
            customer_id: actor.id.clone(),
            manufacturer_id: manufacturer.id.clone(),
            rating,
            comment: clean_comment(draft.comment),
            order_id: draft.order_id,
            created_at: now,
            updated_at: now,
        };
        match self.store.insert_review(review.clone()).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(ApplicationError::Validation(duplicate_message(review.order_id.as_ref())));
            }
            Err(error) => return Err(error.into()),
        }

        tracing::info!(
            event_name = "review.created",
            correlation_id = %context.correlation_id,
            review_id = %review.id,
            manufacturer_id = %manufacturer.id,
            actor_id = %actor.id,
            rating = review.rating,
            "review created"
        );
        self.emit(context, "review.created", &review);

        Ok(review_view(review, actor, &manufacturer))
    }

    /// Newest first. Unknown or non-manufacturer ids are not found.
    pub async fn list_reviews(&self, manufacturer_id: &ActorId) -> Result<Vec<ReviewView>, ApplicationError> {
        let manufacturer = self
            .store
            .find_actor(manufacturer_id)
            .await?
            .filter(Actor::is_manufacturer)
            .ok_or_else(|| ApplicationError::NotFound("Manufacturer not found.".to_owned()))?;

        let reviews = self.store.list_reviews_for_manufacturer(&manufacturer.id).await?;
        let mut views = Vec::with_capacity(reviews.len());
        for review in reviews {
            let customer = self.find_party(&review.customer_id).await?;
            views.push(review_view(review, &customer, &manufacturer));
        }
        Ok(views)
    }

    pub async fn get_review(&self, review_id: &ReviewId) -> Result<ReviewView, ApplicationError> {
        let review = self.load(review_id).await?;
        self.view(review).await
    }

    pub async fn update_review(
        &self,
        context: &RequestContext,
        review_id: &ReviewId,
        change: ReviewChange,
    ) -> Result<ReviewView, ApplicationError> {
        let actor = context.require_actor()?;
        let mut review = self.load(review_id).await?;
        can_modify_review(actor, &review).into_result()?;

        if let Some(rating) = change.rating {
            review.rating = validate_rating(rating)?;
        }
        if let Some(comment) = change.comment {
            review.comment = clean_comment(Some(comment));
        }
        review.updated_at = Utc::now();
        self.store.update_review(&review).await?;

        tracing::info!(
            event_name = "review.updated",
            correlation_id = %context.correlation_id,
            review_id = %review.id,
            actor_id = %actor.id,
            "review updated"
        );
        self.emit(context, "review.updated", &review);
        self.view(review).await
    }

    pub async fn delete_review(
        &self,
        context: &RequestContext,
        review_id: &ReviewId,
    ) -> Result<(), ApplicationError> {
        let actor = context.require_actor()?;
        let review = self.load(review_id).await?;
        can_modify_review(actor, &review).into_result()?;

        if !self.store.delete_review(&review.id).await? {
            return Err(ApplicationError::NotFound("Review not found.".to_owned()));
        }
        tracing::info!(
            event_name = "review.deleted",
            correlation_id = %context.correlation_id,
            review_id = %review.id,
            actor_id = %actor.id,
            "review deleted"
        );
        self.emit(context, "review.deleted", &review);
        Ok(())
    }

    async fn load(&self, review_id: &ReviewId) -> Result<Review, ApplicationError> {
        self.store
            .find_review(review_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound("Review not found.".to_owned()))
    }

    async fn find_party(&self, id: &ActorId) -> Result<Actor, ApplicationError> {
        self.store.find_actor(id).await?.ok_or_else(|| {
            ApplicationError::Persistence(format!("review references unknown actor `{id}`"))
        })
    }

    async fn view(&self, review: Review) -> Result<ReviewView, ApplicationError> {
        let customer = self.find_party(&review.customer_id).await?;
        let manufacturer = self.find_party(&review.manufacturer_id).await?;
        Ok(review_view(review, &customer, &manufacturer))
    }

    fn emit(&self, context: &RequestContext, event_type: &str, review: &Review) {
        self.audit.emit(
            AuditEvent::new(context, event_type, AuditCategory::Review, AuditOutcome::Success)
                .with_subject(review.id.0.clone())
                .with_metadata("manufacturer_id", review.manufacturer_id.0.clone())
                .with_metadata("rating", review.rating.to_string()),
        );
    }
}

fn review_view(review: Review, customer: &Actor, manufacturer: &Actor) -> ReviewView {
    ReviewView {
        id: review.id,
        customer_id: review.customer_id,
        customer_display_name: customer.display_name().to_owned(),
        manufacturer_id: review.manufacturer_id,
        manufacturer_display_name: manufacturer.display_name().to_owned(),
        rating: review.rating,
        comment: review.comment,
        order_id: review.order_id,
        created_at: review.created_at,
        updated_at: review.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::order::OrderId;

    use super::duplicate_message;

    #[test]
    fn duplicate_message_distinguishes_order_reviews() {
        assert!(duplicate_message(Some(&OrderId("O-1".to_owned()))).ends_with("for this order."));
        assert!(duplicate_message(None).ends_with("(general review)."));
    }
}
