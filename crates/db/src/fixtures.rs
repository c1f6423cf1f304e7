use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use fabmarket_core::domain::actor::{Actor, ActorId, ActorRole};
use fabmarket_core::domain::design::{Design, DesignId, DesignStatus, GeometricData};
use fabmarket_core::domain::manufacturer::{
    MachiningFactors, ManufacturerCapabilities, ManufacturerProfile, MaterialProperties,
    PricingFactors,
};
use fabmarket_core::domain::quote::{Quote, QuoteId, QuoteStatus};
use fabmarket_core::store::{MarketplaceStore, StoreError};

pub const DEMO_CUSTOMER_ID: &str = "cust-demo-001";
pub const DEMO_STAFF_ID: &str = "staff-demo-001";
pub const DEMO_MANUFACTURER_IDS: &[&str] = &["mfr-demo-001", "mfr-demo-002"];
pub const DEMO_QUOTABLE_DESIGN_ID: &str = "design-demo-001";
pub const DEMO_QUOTE_ID: &str = "quote-demo-001";

struct SeedActor {
    id: &'static str,
    email: &'static str,
    company_name: &'static str,
    role: ActorRole,
    is_staff: bool,
}

struct SeedDesign {
    id: &'static str,
    design_name: &'static str,
    material: &'static str,
    volume_cm3: Option<(i64, u32)>,
    complexity_score: (i64, u32),
    status: DesignStatus,
}

const SEED_ACTORS: &[SeedActor] = &[
    SeedActor {
        id: DEMO_CUSTOMER_ID,
        email: "buyer@northwind.example",
        company_name: "Northwind Robotics",
        role: ActorRole::Customer,
        is_staff: false,
    },
    SeedActor {
        id: "mfr-demo-001",
        email: "quotes@precisionparts.example",
        company_name: "Precision Parts Co",
        role: ActorRole::Manufacturer,
        is_staff: false,
    },
    SeedActor {
        id: "mfr-demo-002",
        email: "sales@rapidproto.example",
        company_name: "",
        role: ActorRole::Manufacturer,
        is_staff: false,
    },
    SeedActor {
        id: DEMO_STAFF_ID,
        email: "ops@fabmarket.example",
        company_name: "Fabmarket Operations",
        role: ActorRole::Customer,
        is_staff: true,
    },
];

const SEED_DESIGNS: &[SeedDesign] = &[
    SeedDesign {
        id: DEMO_QUOTABLE_DESIGN_ID,
        design_name: "Mounting bracket",
        material: "Al-6061",
        volume_cm3: Some((100, 0)),
        complexity_score: (2, 0),
        status: DesignStatus::AnalysisComplete,
    },
    SeedDesign {
        id: "design-demo-002",
        design_name: "Gear housing",
        material: "SS-316",
        volume_cm3: None,
        complexity_score: (0, 0),
        status: DesignStatus::Submitted,
    },
    SeedDesign {
        id: "design-demo-003",
        design_name: "Heat sink",
        material: "Al-6061",
        volume_cm3: Some((425, 1)),
        complexity_score: (55, 1),
        status: DesignStatus::AnalysisComplete,
    },
];

/// Demo marketplace: a customer, two manufacturers with pricing profiles,
/// a staff member, three designs and one pending quote.
pub struct DemoDataset;

impl DemoDataset {
    /// Inserts whatever part of the dataset is missing. Records that already
    /// exist are left untouched, so loading twice is a no-op.
    pub async fn load(store: &dyn MarketplaceStore) -> Result<SeedResult, StoreError> {
        let now = Utc::now();
        let mut result = SeedResult::default();

        for seed in SEED_ACTORS {
            let id = ActorId(seed.id.to_owned());
            if store.find_actor(&id).await?.is_some() {
                result.existing.push(seed.id);
                continue;
            }
            store
                .save_actor(Actor {
                    id,
                    email: seed.email.to_owned(),
                    company_name: seed.company_name.to_owned(),
                    role: seed.role,
                    is_staff: seed.is_staff,
                    created_at: now,
                })
                .await?;
            result.created.push(seed.id);
        }

        for profile in demo_profiles() {
            if store.find_manufacturer_profile(&profile.actor_id).await?.is_none() {
                store.save_manufacturer_profile(profile).await?;
            }
        }

        for seed in SEED_DESIGNS {
            let id = DesignId(seed.id.to_owned());
            if store.find_design(&id).await?.is_some() {
                result.existing.push(seed.id);
                continue;
            }
            store.save_design(seed.design(now)).await?;
            result.created.push(seed.id);
        }

        let design_id = DesignId("design-demo-003".to_owned());
        let manufacturer_id = ActorId("mfr-demo-001".to_owned());
        if store.find_quote_for_pair(&design_id, &manufacturer_id).await?.is_some() {
            result.existing.push(DEMO_QUOTE_ID);
        } else {
            let mut quote = Quote::new(
                design_id,
                manufacturer_id,
                Decimal::new(6189, 2),
                10,
                Some("Anodized finish included.".to_owned()),
                now,
            );
            quote.id = QuoteId(DEMO_QUOTE_ID.to_owned());
            store.insert_quote(quote).await?;
            result.created.push(DEMO_QUOTE_ID);
        }

        tracing::info!(
            event_name = "seed.loaded",
            created = result.created.len(),
            existing = result.existing.len(),
            "demo dataset loaded"
        );
        Ok(result)
    }

    pub async fn verify(store: &dyn MarketplaceStore) -> Result<VerificationResult, StoreError> {
        let mut checks = Vec::new();

        for seed in SEED_ACTORS {
            let actor = store.find_actor(&ActorId(seed.id.to_owned())).await?;
            checks.push((seed.id, actor.is_some_and(|actor| actor.role == seed.role)));
        }
        for id in DEMO_MANUFACTURER_IDS {
            let profile = store.find_manufacturer_profile(&ActorId((*id).to_owned())).await?;
            checks.push(("manufacturer-profile", profile.is_some()));
        }
        for seed in SEED_DESIGNS {
            checks.push((seed.id, store.find_design(&DesignId(seed.id.to_owned())).await?.is_some()));
        }
        let quote = store.find_quote(&QuoteId(DEMO_QUOTE_ID.to_owned())).await?;
        checks.push((DEMO_QUOTE_ID, quote.is_some_and(|quote| quote.status == QuoteStatus::Pending)));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

impl SeedDesign {
    fn design(&self, now: DateTime<Utc>) -> Design {
        let geometric_data = self.volume_cm3.map(|(volume, scale)| GeometricData {
            volume_cm3: Decimal::new(volume, scale),
            complexity_score: Decimal::new(self.complexity_score.0, self.complexity_score.1),
        });
        Design {
            id: DesignId(self.id.to_owned()),
            customer_id: ActorId(DEMO_CUSTOMER_ID.to_owned()),
            design_name: self.design_name.to_owned(),
            material: self.material.to_owned(),
            geometric_data,
            status: self.status,
            created_at: now,
            updated_at: now,
        }
    }
}

fn demo_profiles() -> Vec<ManufacturerProfile> {
    let material = |density: (i64, u32), cost: (i64, u32)| MaterialProperties {
        density_g_cm3: Decimal::new(density.0, density.1),
        cost_usd_kg: Decimal::new(cost.0, cost.1),
    };

    let precision = ManufacturerProfile {
        actor_id: ActorId("mfr-demo-001".to_owned()),
        markup_factor: Decimal::new(15, 1),
        capabilities: ManufacturerCapabilities {
            pricing_factors: PricingFactors {
                material_properties: BTreeMap::from([
                    ("Al-6061".to_owned(), material((27, 1), (50, 1))),
                ]),
                machining: MachiningFactors {
                    base_time_cost_unit: Decimal::new(10, 0),
                    time_multiplier_complexity_cost_unit: Decimal::new(25, 1),
                },
                estimated_lead_time_base_days: Some(serde_json::json!(10)),
            },
        },
    };

    let rapid = ManufacturerProfile {
        actor_id: ActorId("mfr-demo-002".to_owned()),
        markup_factor: Decimal::new(12, 1),
        capabilities: ManufacturerCapabilities {
            pricing_factors: PricingFactors {
                material_properties: BTreeMap::from([
                    ("Al-6061".to_owned(), material((27, 1), (45, 1))),
                    ("SS-316".to_owned(), material((80, 1), (120, 1))),
                ]),
                machining: MachiningFactors {
                    base_time_cost_unit: Decimal::new(8, 0),
                    time_multiplier_complexity_cost_unit: Decimal::new(3, 0),
                },
                estimated_lead_time_base_days: None,
            },
        },
    };

    vec![precision, rapid]
}

#[derive(Debug, Default)]
pub struct SeedResult {
    pub created: Vec<&'static str>,
    pub existing: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
