use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Customer,
    Manufacturer,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Manufacturer => "manufacturer",
        }
    }
}

impl std::str::FromStr for ActorRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Self::Customer),
            "manufacturer" => Ok(Self::Manufacturer),
            other => Err(DomainError::InvalidField {
                field: "role".to_string(),
                message: format!("unknown actor role `{other}`"),
            }),
        }
    }
}

/// A marketplace participant as supplied by the account directory.
///
/// Staff is orthogonal to role: a staff member keeps their customer or
/// manufacturer role but bypasses object-level ownership checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub email: String,
    pub company_name: String,
    pub role: ActorRole,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

impl Actor {
    pub fn is_manufacturer(&self) -> bool {
        self.role == ActorRole::Manufacturer
    }

    pub fn is_customer(&self) -> bool {
        self.role == ActorRole::Customer
    }

    /// Company name, or the contact email when the company name is blank.
    pub fn display_name(&self) -> &str {
        if self.company_name.trim().is_empty() {
            &self.email
        } else {
            &self.company_name
        }
    }
}
