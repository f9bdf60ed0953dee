use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Agents the demo seed writes, with whether each should be listed publicly.
const SEED_AGENTS: &[SeedAgentContract] = &[
    SeedAgentContract {
        id: "demo-agent-support",
        name: "Support Genie",
        is_active: true,
        comparison_enabled: true,
        feature_count: 2,
    },
    SeedAgentContract {
        id: "demo-agent-sales",
        name: "Lead Catcher",
        is_active: true,
        comparison_enabled: false,
        feature_count: 1,
    },
    SeedAgentContract {
        id: "demo-agent-archived",
        name: "Legacy FAQ Bot",
        is_active: false,
        comparison_enabled: false,
        feature_count: 0,
    },
];

const SEED_KEY_FEATURE_IDS: &[&str] =
    &["demo-kf-setup", "demo-kf-languages", "demo-kf-security", "demo-kf-hidden"];

pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loads the demo catalog. Replaying it overwrites earlier demo rows.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            agents_seeded: SEED_AGENTS
                .iter()
                .map(|agent| AgentSeedInfo { id: agent.id, name: agent.name })
                .collect(),
            key_features_seeded: SEED_KEY_FEATURE_IDS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for agent in SEED_AGENTS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM agents
                               WHERE id = ?1 AND name = ?2 AND is_active = ?3
                                 AND comparison_enabled = ?4)",
            )
            .bind(agent.id)
            .bind(agent.name)
            .bind(agent.is_active)
            .bind(agent.comparison_enabled)
            .fetch_one(pool)
            .await?;
            checks.push((agent.id, present == 1));

            let feature_count: i64 =
                sqlx::query_scalar("SELECT json_array_length(features) FROM agents WHERE id = ?1")
                    .bind(agent.id)
                    .fetch_optional(pool)
                    .await?
                    .unwrap_or(-1);
            checks.push((agent.feature_count_label(), feature_count == agent.feature_count));
        }

        let quoted = sql_array_from_ids(SEED_KEY_FEATURE_IDS);
        let key_feature_count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(1) FROM key_features WHERE id IN {quoted}"))
                .fetch_one(pool)
                .await?;
        checks.push(("key-features", key_feature_count == SEED_KEY_FEATURE_IDS.len() as i64));

        let orders: Vec<i64> = sqlx::query_scalar(&format!(
            "SELECT display_order FROM key_features WHERE id IN {quoted} ORDER BY display_order"
        ))
        .fetch_all(pool)
        .await?;
        let dense = orders.iter().enumerate().all(|(index, order)| *order == index as i64 + 1);
        checks.push(("key-feature-order", dense));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes only the demo rows.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let agent_ids: Vec<&str> = SEED_AGENTS.iter().map(|agent| agent.id).collect();
        let mut tx = pool.begin().await?;

        sqlx::query(&format!("DELETE FROM agents WHERE id IN {}", sql_array_from_ids(&agent_ids)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM key_features WHERE id IN {}",
            sql_array_from_ids(SEED_KEY_FEATURE_IDS)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedAgentContract {
    id: &'static str,
    name: &'static str,
    is_active: bool,
    comparison_enabled: bool,
    feature_count: i64,
}

impl SeedAgentContract {
    fn feature_count_label(&self) -> &'static str {
        match self.id {
            "demo-agent-support" => "demo-agent-support-features",
            "demo-agent-sales" => "demo-agent-sales-features",
            _ => "demo-agent-archived-features",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub agents_seeded: Vec<AgentSeedInfo>,
    pub key_features_seeded: usize,
}

#[derive(Debug)]
pub struct AgentSeedInfo {
    pub id: &'static str,
    pub name: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
