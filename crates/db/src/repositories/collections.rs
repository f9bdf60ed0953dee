//! [`CollectionStore`] adapters that let an [`OrderedList`] editor write
//! straight into a repository.
//!
//! [`OrderedList`]: agentmart_core::ordered::OrderedList

use async_trait::async_trait;

use agentmart_core::domain::agent::{AgentId, AgentPatch};
use agentmart_core::domain::comparison::{ComparisonRow, ComparisonTable};
use agentmart_core::domain::feature::Feature;
use agentmart_core::domain::key_feature::KeyFeature;
use agentmart_core::errors::RemoteCallError;
use agentmart_core::ordered::CollectionStore;

use super::{AgentRepository, KeyFeatureRepository};

fn missing_agent(operation: &str, agent_id: &AgentId) -> RemoteCallError {
    RemoteCallError::new(operation, format!("agent `{agent_id}` no longer exists"))
}

/// Stores the feature cards of one agent.
pub struct AgentFeatureStore<'a, R: ?Sized> {
    repo: &'a R,
    agent_id: AgentId,
}

impl<'a, R: ?Sized> AgentFeatureStore<'a, R> {
    pub fn new(repo: &'a R, agent_id: AgentId) -> Self {
        Self { repo, agent_id }
    }
}

#[async_trait]
impl<R> CollectionStore<Feature> for AgentFeatureStore<'_, R>
where
    R: AgentRepository + ?Sized,
{
    async fn replace_collection(&self, items: Vec<Feature>) -> Result<(), RemoteCallError> {
        const OPERATION: &str = "save agent features";
        let updated = self
            .repo
            .apply_patch(&self.agent_id, AgentPatch::Features(items))
            .await
            .map_err(|error| error.into_remote(OPERATION))?;
        if updated {
            Ok(())
        } else {
            Err(missing_agent(OPERATION, &self.agent_id))
        }
    }
}

/// Stores the comparison rows of one agent, keeping its headers.
pub struct AgentComparisonStore<'a, R: ?Sized> {
    repo: &'a R,
    agent_id: AgentId,
    headers: Vec<String>,
}

impl<'a, R: ?Sized> AgentComparisonStore<'a, R> {
    pub fn new(repo: &'a R, agent_id: AgentId, headers: Vec<String>) -> Self {
        Self { repo, agent_id, headers }
    }
}

#[async_trait]
impl<R> CollectionStore<ComparisonRow> for AgentComparisonStore<'_, R>
where
    R: AgentRepository + ?Sized,
{
    async fn replace_collection(&self, items: Vec<ComparisonRow>) -> Result<(), RemoteCallError> {
        const OPERATION: &str = "save comparison table";
        let table = ComparisonTable { headers: self.headers.clone(), rows: items };
        let updated = self
            .repo
            .apply_patch(&self.agent_id, AgentPatch::ComparisonTable(table))
            .await
            .map_err(|error| error.into_remote(OPERATION))?;
        if updated {
            Ok(())
        } else {
            Err(missing_agent(OPERATION, &self.agent_id))
        }
    }
}

/// Persists key-feature display order after a move.
pub struct KeyFeatureOrderStore<'a, R: ?Sized> {
    repo: &'a R,
}

impl<'a, R: ?Sized> KeyFeatureOrderStore<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R> CollectionStore<KeyFeature> for KeyFeatureOrderStore<'_, R>
where
    R: KeyFeatureRepository + ?Sized,
{
    async fn replace_collection(&self, items: Vec<KeyFeature>) -> Result<(), RemoteCallError> {
        self.repo.save_order(&items).await.map_err(|error| error.into_remote("save key feature order"))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use agentmart_core::domain::agent::{Agent, AgentForm, AgentId};
    use agentmart_core::domain::comparison::{ComparisonRow, ComparisonRowEdit, ComparisonRowKind};
    use agentmart_core::domain::feature::{Feature, FeatureKind};
    use agentmart_core::ordered::{OrderedList, SaveError};

    use super::{AgentComparisonStore, AgentFeatureStore};
    use crate::realtime::ChangeBus;
    use crate::repositories::{AgentRepository, InMemoryAgentRepository};

    fn agent() -> Agent {
        let form = AgentForm {
            name: "Bot".to_string(),
            short_description: "Helps".to_string(),
            ..AgentForm::for_new_agent()
        };
        Agent::create(AgentId::generate(), form.parse().expect("valid"), Utc::now())
    }

    #[tokio::test]
    async fn comparison_rows_keep_existing_headers() {
        let repo = InMemoryAgentRepository::new(ChangeBus::default());
        let stored = agent();
        repo.insert(stored.clone()).await.expect("insert");

        let mut rows: OrderedList<ComparisonRow> = OrderedList::new();
        let id = rows.add(ComparisonRowKind::Section).id.clone();
        rows.update(&id, ComparisonRowEdit::Label("Channels".to_string()));
        let headers = vec!["Features".to_string(), "Lite".to_string()];
        rows.save(&AgentComparisonStore::new(&repo, stored.id.clone(), headers.clone()))
            .await
            .expect("save");

        let reloaded = repo.find_by_id(&stored.id).await.expect("find").expect("present");
        assert_eq!(reloaded.comparison_table.headers, headers);
        assert_eq!(reloaded.comparison_table.rows, rows.into_items());
    }

    #[tokio::test]
    async fn saving_into_a_deleted_agent_is_a_remote_failure() {
        let repo = InMemoryAgentRepository::new(ChangeBus::default());
        let mut list: OrderedList<Feature> = OrderedList::new();
        list.add(FeatureKind::Card);

        let result = list.save(&AgentFeatureStore::new(&repo, AgentId::generate())).await;

        assert!(matches!(result, Err(SaveError::Remote(ref error)) if error.message.contains("no longer exists")));
    }

    #[tokio::test]
    async fn invalid_rows_never_reach_the_store() {
        let repo = InMemoryAgentRepository::new(ChangeBus::default());
        let stored = agent();
        repo.insert(stored.clone()).await.expect("insert");

        let mut rows: OrderedList<ComparisonRow> = OrderedList::new();
        let id = rows.add(ComparisonRowKind::Feature).id.clone();
        rows.update(&id, ComparisonRowEdit::Label("  ".to_string()));
        let result = rows.save(&AgentComparisonStore::new(&repo, stored.id.clone(), Vec::new())).await;

        assert!(matches!(result, Err(SaveError::Validation(_))));
        let reloaded = repo.find_by_id(&stored.id).await.expect("find").expect("present");
        assert!(reloaded.comparison_table.rows.is_empty());
    }
}
