use fabmarket_db::{DemoDataset, SqlMarketplaceStore};

use crate::commands::{migrated_pool, prepare, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let store = SqlMarketplaceStore::new(pool.clone());

        let seed_result = DemoDataset::load(&store)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoDataset::verify(&store)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        pool.close().await;

        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            return Err(("seed_verification", verification_failure_message(&failed_checks), 6u8));
        }
        Ok::<_, StepFailure>(seed_result)
    });

    match result {
        Ok(seed_result) => {
            let mut records = seed_result.created.clone();
            records.extend(seed_result.existing.iter().copied());
            records.sort_unstable();
            let lines = records.iter().map(|id| format!("  - {id}")).collect::<Vec<_>>();
            CommandResult::success(
                "seed",
                format!(
                    "demo marketplace ready ({} created, {} already present):\n{}",
                    seed_result.created.len(),
                    seed_result.existing.len(),
                    lines.join("\n")
                ),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_failure_message;

    #[test]
    fn verification_message_names_failed_checks() {
        assert_eq!(
            verification_failure_message(&["cust-demo-001", "quote-demo-001"]),
            "Seed verification failed for checks: cust-demo-001, quote-demo-001"
        );
        assert_eq!(verification_failure_message(&[]), "Some seed data failed to load");
    }
}
