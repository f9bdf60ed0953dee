use agentmart_db::{AgentSeedInfo, DemoSeedDataset, VerificationResult};

use crate::commands::{with_migrated_database, CommandResult};

pub fn run(reset: bool) -> CommandResult {
    let result = with_migrated_database("seed", |pool| async move {
        if reset {
            DemoSeedDataset::clean(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;
        }
        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;
        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 7u8))?;

        if !verification.all_present {
            return Err(("seed_verification", verification_message(&verification), 7u8));
        }
        Ok(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            summary(&seeded.agents_seeded, seeded.key_features_seeded),
        ),
        Err(failure) => failure,
    }
}

fn summary(agents: &[AgentSeedInfo], key_features: usize) -> String {
    let lines: Vec<String> =
        agents.iter().map(|agent| format!("  - {}: {}", agent.id, agent.name)).collect();
    format!(
        "demo catalog loaded: {} agents, {key_features} key features\n{}",
        agents.len(),
        lines.join("\n")
    )
}

fn verification_message(verification: &VerificationResult) -> String {
    let failed_checks = verification
        .checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use agentmart_db::{AgentSeedInfo, VerificationResult};

    use super::{summary, verification_message};

    #[test]
    fn verification_message_names_failed_checks() {
        let verification = VerificationResult {
            all_present: false,
            checks: vec![("demo-agent-support", true), ("demo-kf-setup", false)],
        };

        assert_eq!(
            verification_message(&verification),
            "Seed verification failed for checks: demo-kf-setup"
        );
    }

    #[test]
    fn verification_message_falls_back_when_nothing_is_labelled() {
        let verification = VerificationResult { all_present: false, checks: Vec::new() };

        assert_eq!(verification_message(&verification), "Some seed data failed to load");
    }

    #[test]
    fn summary_lists_each_agent() {
        let agents = [AgentSeedInfo { id: "demo-a", name: "A" }, AgentSeedInfo { id: "demo-b", name: "B" }];

        let text = summary(&agents, 4);

        assert!(text.starts_with("demo catalog loaded: 2 agents, 4 key features"));
        assert!(text.contains("  - demo-b: B"));
    }
}
