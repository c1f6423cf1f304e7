use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::ActorId;
use crate::domain::design::DesignId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuoteId(pub String);

impl QuoteId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
            Self::Expired => "Expired",
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QuoteStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            other => Err(DomainError::InvalidField {
                field: "status".to_string(),
                message: format!("\"{other}\" is not a valid choice."),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub design_id: DesignId,
    pub manufacturer_id: ActorId,
    pub price: Decimal,
    pub estimated_lead_time_days: u32,
    pub status: QuoteStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        design_id: DesignId,
        manufacturer_id: ActorId,
        price: Decimal,
        estimated_lead_time_days: u32,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: QuoteId::generate(),
            design_id,
            manufacturer_id,
            price,
            estimated_lead_time_days,
            status: QuoteStatus::Pending,
            notes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == QuoteStatus::Pending
    }

    /// Writing the current status again is accepted as a no-op.
    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        self.status == next
            || matches!(
                (self.status, next),
                (QuoteStatus::Pending, QuoteStatus::Accepted)
                    | (QuoteStatus::Pending, QuoteStatus::Rejected)
                    | (QuoteStatus::Pending, QuoteStatus::Expired)
            )
    }

    pub fn transition_to(&mut self, next: QuoteStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidQuoteTransition { from: self.status, to: next })
    }

    /// Applies the non-status fields of `change`. Status is handled by
    /// `transition_to` so the state graph stays in one place.
    pub fn apply_fields(&mut self, change: &QuoteChange) {
        if let Some(price) = change.price {
            self.price = price;
        }
        if let Some(days) = change.estimated_lead_time_days {
            self.estimated_lead_time_days = days;
        }
        if let Some(notes) = &change.notes {
            self.notes = if notes.trim().is_empty() { None } else { Some(notes.clone()) };
        }
    }
}

/// A partial quote update. `None` leaves the field untouched; an empty
/// notes string clears the notes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuoteChange {
    pub status: Option<QuoteStatus>,
    pub price: Option<Decimal>,
    pub estimated_lead_time_days: Option<u32>,
    pub notes: Option<String>,
}

impl QuoteChange {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && !self.has_field_changes()
    }

    pub fn has_field_changes(&self) -> bool {
        self.price.is_some() || self.estimated_lead_time_days.is_some() || self.notes.is_some()
    }
}

const MAX_INTEGER_DIGITS: u32 = 8;

/// Checks a quoted price fits the stored currency column and returns it
/// normalised to two decimal places.
pub fn validate_price(price: Decimal) -> Result<Decimal, DomainError> {
    let invalid = |message: &str| DomainError::InvalidField {
        field: "price".to_string(),
        message: message.to_string(),
    };

    if price.is_sign_negative() && !price.is_zero() {
        return Err(invalid("Ensure this value is greater than or equal to 0."));
    }
    let normalized = price.normalize();
    if normalized.scale() > 2 {
        return Err(invalid("Ensure that there are no more than 2 decimal places."));
    }
    if normalized.trunc() >= Decimal::from(10_u64.pow(MAX_INTEGER_DIGITS)) {
        return Err(invalid("Ensure that there are no more than 8 digits before the decimal point."));
    }

    let mut rescaled = normalized;
    rescaled.rescale(2);
    Ok(rescaled)
}

/// Lead times arrive from clients as plain integers.
pub fn validate_lead_time(days: i64) -> Result<u32, DomainError> {
    u32::try_from(days).map_err(|_| DomainError::InvalidField {
        field: "leadTimeDays".to_string(),
        message: "Ensure this value is greater than or equal to 0.".to_string(),
    })
}
