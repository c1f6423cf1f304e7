use std::sync::Arc;

use fabmarket_core::audit::TracingAuditSink;
use fabmarket_core::domain::actor::ActorId;
use fabmarket_core::domain::design::DesignId;
use fabmarket_core::errors::ApplicationError;
use fabmarket_core::lifecycle::QuoteLifecycle;
use fabmarket_core::pricing::DeterministicPricingEngine;
use fabmarket_db::SqlMarketplaceStore;

use crate::commands::{migrated_pool, prepare, CommandResult, StepFailure};

pub fn run(design_id: &str, manufacturer_id: &str) -> CommandResult {
    let (config, runtime) = match prepare("price") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let lifecycle = QuoteLifecycle::new(
            Arc::new(SqlMarketplaceStore::new(pool.clone())),
            Arc::new(DeterministicPricingEngine),
            Arc::new(TracingAuditSink),
        );
        let outcome = lifecycle
            .price(&DesignId(design_id.to_string()), &ActorId(manufacturer_id.to_string()))
            .await
            .map_err(|error| match error {
                ApplicationError::NotFound(message) => ("not_found", message, 7u8),
                other => ("pricing", other.to_string(), 6u8),
            })?;
        pool.close().await;
        Ok::<_, StepFailure>(outcome)
    });

    match result {
        Ok(outcome) => {
            let data = serde_json::to_value(&outcome).ok();
            if outcome.is_quotable() {
                let price = outcome.price.map(|price| price.to_string()).unwrap_or_default();
                let days = outcome.estimated_lead_time_days.unwrap_or_default();
                CommandResult::success_with_data(
                    "price",
                    format!("{design_id} by {manufacturer_id}: {price} USD, {days} days"),
                    data,
                )
            } else {
                CommandResult::failure_with_data(
                    "price",
                    "not_quotable",
                    outcome.errors.join(" "),
                    6,
                    data,
                )
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("price", error_class, message, exit_code)
        }
    }
}
