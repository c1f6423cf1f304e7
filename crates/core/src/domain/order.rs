use std::fmt;

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::ActorId;
use crate::domain::design::{Design, DesignId};
use crate::domain::quote::{Quote, QuoteId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    InProduction,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::InProduction => "in_production",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::PendingPayment => "Pending Payment",
            Self::Paid => "Paid",
            Self::InProduction => "In Production",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_payment" => Ok(Self::PendingPayment),
            "paid" => Ok(Self::Paid),
            "in_production" => Ok(Self::InProduction),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::InvalidField {
                field: "status".to_string(),
                message: format!("unknown order status `{other}`"),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub design_id: DesignId,
    pub accepted_quote_id: QuoteId,
    pub customer_id: ActorId,
    pub manufacturer_id: ActorId,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub estimated_delivery_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Materializes the order for a quote that has just been accepted.
    pub fn from_accepted_quote(quote: &Quote, design: &Design, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::generate(),
            design_id: quote.design_id.clone(),
            accepted_quote_id: quote.id.clone(),
            customer_id: design.customer_id.clone(),
            manufacturer_id: quote.manufacturer_id.clone(),
            total_price: quote.price,
            status: OrderStatus::PendingPayment,
            estimated_delivery_date: estimated_delivery_date(now, quote.estimated_lead_time_days),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Calendar date of `created_at` plus `lead_time_days` whole days.
pub fn estimated_delivery_date(created_at: DateTime<Utc>, lead_time_days: u32) -> NaiveDate {
    created_at
        .date_naive()
        .checked_add_days(Days::new(u64::from(lead_time_days)))
        .unwrap_or(NaiveDate::MAX)
}
