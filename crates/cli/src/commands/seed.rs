use crate::commands::{prepare, CommandResult, EXIT_DATABASE, EXIT_MIGRATION};
use dentalfly_db::{connect_with_config, migrations, DemoCatalog, SeedResult};
use serde_json::json;

pub fn run(clean: bool) -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        if clean {
            DemoCatalog::clean(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;
            pool.close().await;
            return Ok(None);
        }

        let seeded = DemoCatalog::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;

        let verification = DemoCatalog::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_MIGRATION))?;

        pool.close().await;
        if !verification.all_present {
            return Err(("seed_verification", verification_message(&verification.checks), EXIT_MIGRATION));
        }
        Ok::<Option<SeedResult>, (&'static str, String, u8)>(Some(seeded))
    });

    match result {
        Ok(Some(seeded)) => CommandResult::success_with_details(
            "seed",
            summary(&seeded),
            Some(json!({
                "treatments": seeded.treatments,
                "packages": seeded.packages,
                "offers": seeded.offers,
                "promoCodes": seeded.promo_codes,
            })),
        ),
        Ok(None) => CommandResult::success("seed", "demo catalog removed"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo catalog ready: {} treatments, {} packages, {} special offers, {} promo codes",
        seeded.treatments, seeded.packages, seeded.offers, seeded.promo_codes
    )
}

/// Rows the fixture expected but did not find after loading. Usually a
/// catalog edited by hand under one of the demo ids.
fn verification_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "demo catalog failed to load".to_string()
    } else {
        format!("demo catalog verification failed for: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::{summary, verification_message};
    use dentalfly_db::SeedResult;

    #[test]
    fn verification_message_lists_failed_checks() {
        let checks = [("implant", true), ("pkg-001", false), ("SUMMER15", false)];

        assert_eq!(verification_message(&checks), "demo catalog verification failed for: pkg-001, SUMMER15");
    }

    #[test]
    fn verification_message_falls_back_when_nothing_is_labelled() {
        assert_eq!(verification_message(&[("implant", true)]), "demo catalog failed to load");
    }

    #[test]
    fn summary_counts_every_catalog_section() {
        let seeded = SeedResult { treatments: 6, packages: 2, offers: 2, promo_codes: 5 };
        assert_eq!(
            summary(&seeded),
            "demo catalog ready: 6 treatments, 2 packages, 2 special offers, 5 promo codes"
        );
    }
}
