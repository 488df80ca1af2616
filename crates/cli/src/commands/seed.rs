use orgflow_db::DemoSeedDataset;
use serde_json::json;

use crate::commands::{with_migrated_pool, CommandResult};

pub fn run() -> CommandResult {
    let result = with_migrated_pool("seed", |_, pool| async move {
        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;
        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 7u8))?;

        if !verification.all_present {
            let failed = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            return Err(("seed_verification", verification_message(&failed), 7u8));
        }
        Ok(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success_with_data(
            "seed",
            format!(
                "demo organisation loaded: {} employees, {} surveys",
                seeded.employees_seeded, seeded.surveys_seeded
            ),
            Some(json!({
                "employees": seeded.employees_seeded,
                "surveys": seeded.surveys_seeded,
            })),
        ),
        Err(failure) => failure,
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_message_names_failed_checks() {
        assert_eq!(
            verification_message(&["employees", "ceo-is-root"]),
            "seed verification failed for checks: employees, ceo-is-root"
        );
        assert_eq!(verification_message(&[]), "some seed data failed to load");
    }
}
