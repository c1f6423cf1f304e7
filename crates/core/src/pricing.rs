use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::design::Design;
use crate::domain::manufacturer::ManufacturerProfile;

pub const DEFAULT_LEAD_TIME_DAYS: u32 = 7;

/// Result of pricing one design for one manufacturer.
///
/// `price` and `estimated_lead_time_days` are only populated when `errors`
/// is empty. `details` carries every intermediate value that was computed,
/// including on failure, so a rejected estimate can still be explained.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingOutcome {
    pub price: Option<Decimal>,
    pub estimated_lead_time_days: Option<u32>,
    pub details: BTreeMap<String, Decimal>,
    pub errors: Vec<String>,
}

impl PricingOutcome {
    pub fn is_quotable(&self) -> bool {
        self.errors.is_empty() && self.price.is_some()
    }

    fn record(&mut self, key: &str, value: Decimal) {
        self.details.insert(key.to_owned(), value);
    }
}

pub trait PricingEngine: Send + Sync {
    fn compute_price(&self, design: &Design, manufacturer: &ManufacturerProfile) -> PricingOutcome;
}

#[derive(Default)]
pub struct DeterministicPricingEngine;

impl PricingEngine for DeterministicPricingEngine {
    fn compute_price(&self, design: &Design, manufacturer: &ManufacturerProfile) -> PricingOutcome {
        compute_price(design, manufacturer)
    }
}

const PRICE_OUT_OF_RANGE: &str = "Calculated price exceeds the supported range.";

fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn compute_price(design: &Design, manufacturer: &ManufacturerProfile) -> PricingOutcome {
    let mut outcome = PricingOutcome::default();

    let Some(geometry) = design.geometric_data.as_ref() else {
        outcome.errors.push("Design geometric data is missing or incomplete.".to_owned());
        log_failure(design, manufacturer, &outcome);
        return outcome;
    };

    let volume = geometry.volume_cm3;
    let complexity = geometry.complexity_score;
    let volume_valid = volume > Decimal::ZERO;
    if !volume_valid {
        outcome.errors.push("Design volume must be a positive value.".to_owned());
    }

    let factors = &manufacturer.capabilities.pricing_factors;

    let mut out_of_range = false;
    let mut material_cost = Decimal::ZERO;
    match factors.material_properties.get(&design.material) {
        Some(props) => {
            let mut section_errors = Vec::new();
            if props.density_g_cm3 <= Decimal::ZERO {
                section_errors
                    .push(format!("Density for material '{}' must be positive.", design.material));
            }
            if props.cost_usd_kg < Decimal::ZERO {
                section_errors.push(format!(
                    "Cost per kg for material '{}' must be non-negative.",
                    design.material
                ));
            }

            if section_errors.is_empty() && volume_valid {
                outcome.record("material_volume_cm3", volume);
                outcome.record("material_density_g_cm3", props.density_g_cm3);
                outcome.record("material_cost_usd_kg", props.cost_usd_kg);
                let cost_per_gram = props.cost_usd_kg.checked_div(Decimal::ONE_THOUSAND);
                match cost_per_gram
                    .and_then(|per_gram| volume.checked_mul(props.density_g_cm3)?.checked_mul(per_gram))
                {
                    Some(cost) => {
                        material_cost = cost;
                        outcome.record("calculated_material_cost_usd", round_currency(cost));
                    }
                    None => out_of_range = true,
                }
            }
            outcome.errors.extend(section_errors);
        }
        None => outcome.errors.push(format!(
            "Manufacturer does not have pricing information for material: {}",
            design.material
        )),
    }

    let machining = &factors.machining;
    let mut machine_time_cost = Decimal::ZERO;
    let mut machining_errors = Vec::new();
    if machining.base_time_cost_unit < Decimal::ZERO {
        machining_errors.push("Base time cost unit cannot be negative.".to_owned());
    }
    if machining.time_multiplier_complexity_cost_unit < Decimal::ZERO {
        machining_errors.push("Time multiplier cost unit cannot be negative.".to_owned());
    }
    if machining_errors.is_empty() {
        outcome.record("machining_base_time_cost_unit", machining.base_time_cost_unit);
        outcome.record("design_complexity_score", complexity);
        outcome.record(
            "machining_time_multiplier_cost_unit",
            machining.time_multiplier_complexity_cost_unit,
        );
        match complexity
            .checked_mul(machining.time_multiplier_complexity_cost_unit)
            .and_then(|scaled| machining.base_time_cost_unit.checked_add(scaled))
        {
            Some(cost) => {
                machine_time_cost = cost;
                outcome.record("calculated_machine_time_cost_units", round_currency(cost));
            }
            None => out_of_range = true,
        }
    }
    outcome.errors.extend(machining_errors);

    let subtotal = material_cost.checked_add(machine_time_cost);
    match subtotal {
        Some(subtotal) => outcome.record("total_price_before_markup_usd", round_currency(subtotal)),
        None => out_of_range = true,
    }

    let markup = manufacturer.markup_factor;
    if markup <= Decimal::ZERO {
        outcome.errors.push("Manufacturer markup factor must be positive.".to_owned());
    }

    let total = if outcome.errors.is_empty() && !out_of_range {
        subtotal.and_then(|subtotal| subtotal.checked_mul(markup))
    } else {
        None
    };
    if total.is_none() && outcome.errors.is_empty() {
        out_of_range = true;
    }
    if out_of_range {
        outcome.errors.push(PRICE_OUT_OF_RANGE.to_owned());
    }

    let final_price = total.map(|total| {
        let price = round_currency(total);
        outcome.record("manufacturer_markup_factor", markup);
        outcome.record("final_total_price_usd", price);
        price
    });

    let lead_time = resolve_lead_time(manufacturer, factors.estimated_lead_time_base_days.as_ref());
    outcome.record("estimated_lead_time_days", Decimal::from(lead_time));

    match final_price {
        Some(price) => {
            outcome.price = Some(price);
            outcome.estimated_lead_time_days = Some(lead_time);
            tracing::info!(
                event_name = "pricing.computed",
                design_id = %design.id,
                manufacturer_id = %manufacturer.actor_id,
                price = %price,
                lead_time_days = lead_time,
                "pricing calculation succeeded"
            );
        }
        None => log_failure(design, manufacturer, &outcome),
    }

    outcome
}

/// A configured lead time must be a non-negative integer; anything else
/// falls back to the default with a warning. An absent value is not an error.
fn resolve_lead_time(manufacturer: &ManufacturerProfile, raw: Option<&serde_json::Value>) -> u32 {
    let Some(raw) = raw else {
        return DEFAULT_LEAD_TIME_DAYS;
    };

    match raw.as_u64().and_then(|days| u32::try_from(days).ok()) {
        Some(days) => days,
        None => {
            tracing::warn!(
                event_name = "pricing.fallback_lead_time",
                manufacturer_id = %manufacturer.actor_id,
                configured = %raw,
                fallback_days = DEFAULT_LEAD_TIME_DAYS,
                "invalid estimated_lead_time_base_days, using default"
            );
            DEFAULT_LEAD_TIME_DAYS
        }
    }
}

fn log_failure(design: &Design, manufacturer: &ManufacturerProfile, outcome: &PricingOutcome) {
    tracing::warn!(
        event_name = "pricing.failed",
        design_id = %design.id,
        manufacturer_id = %manufacturer.actor_id,
        errors = ?outcome.errors,
        "pricing calculation failed"
    );
}
