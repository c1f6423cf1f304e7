use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::ActorId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DesignId(pub String);

impl fmt::Display for DesignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignStatus {
    Submitted,
    Analyzing,
    AnalysisComplete,
    AnalysisFailed,
    Ordered,
}

impl DesignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Analyzing => "analyzing",
            Self::AnalysisComplete => "analysis_complete",
            Self::AnalysisFailed => "analysis_failed",
            Self::Ordered => "ordered",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::Analyzing => "Analyzing",
            Self::AnalysisComplete => "Analysis Complete",
            Self::AnalysisFailed => "Analysis Failed",
            Self::Ordered => "Ordered",
        }
    }
}

impl std::str::FromStr for DesignStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Ok(Self::Submitted),
            "analyzing" => Ok(Self::Analyzing),
            "analysis_complete" => Ok(Self::AnalysisComplete),
            "analysis_failed" => Ok(Self::AnalysisFailed),
            "ordered" => Ok(Self::Ordered),
            other => Err(DomainError::InvalidField {
                field: "status".to_string(),
                message: format!("unknown design status `{other}`"),
            }),
        }
    }
}

/// Geometry extracted by design analysis. Missing keys read as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometricData {
    #[serde(default)]
    pub volume_cm3: Decimal,
    #[serde(default)]
    pub complexity_score: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Design {
    pub id: DesignId,
    pub customer_id: ActorId,
    pub design_name: String,
    pub material: String,
    pub geometric_data: Option<GeometricData>,
    pub status: DesignStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Design {
    pub fn is_owned_by(&self, actor_id: &ActorId) -> bool {
        &self.customer_id == actor_id
    }

    pub fn accepts_quotes(&self) -> bool {
        self.status == DesignStatus::AnalysisComplete
    }
}
