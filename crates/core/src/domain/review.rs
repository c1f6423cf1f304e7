use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::ActorId;
use crate::domain::order::OrderId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReviewId(pub String);

impl ReviewId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub customer_id: ActorId,
    pub manufacturer_id: ActorId,
    pub rating: u8,
    pub comment: Option<String>,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn is_written_by(&self, actor_id: &ActorId) -> bool {
        &self.customer_id == actor_id
    }
}

pub fn validate_rating(rating: i64) -> Result<u8, DomainError> {
    match u8::try_from(rating) {
        Ok(value @ 1..=5) => Ok(value),
        _ => Err(DomainError::InvalidField {
            field: "rating".to_string(),
            message: "Rating must be between 1 and 5.".to_string(),
        }),
    }
}
