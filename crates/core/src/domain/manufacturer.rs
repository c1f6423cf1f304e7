use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::ActorId;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialProperties {
    #[serde(default)]
    pub density_g_cm3: Decimal,
    #[serde(default)]
    pub cost_usd_kg: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachiningFactors {
    #[serde(default)]
    pub base_time_cost_unit: Decimal,
    #[serde(default)]
    pub time_multiplier_complexity_cost_unit: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingFactors {
    #[serde(default)]
    pub material_properties: BTreeMap<String, MaterialProperties>,
    #[serde(default)]
    pub machining: MachiningFactors,
    /// Kept as raw JSON: profiles are edited by hand and may carry
    /// non-integer or negative values that pricing must tolerate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_lead_time_base_days: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManufacturerCapabilities {
    #[serde(default)]
    pub pricing_factors: PricingFactors,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManufacturerProfile {
    pub actor_id: ActorId,
    pub markup_factor: Decimal,
    pub capabilities: ManufacturerCapabilities,
}
