use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use agentmart_core::auth::{hash_password, verify_password, Role, Session, UserId};
use agentmart_core::domain::agent::{Agent, AgentId, AgentPatch};
use agentmart_core::domain::key_feature::KeyFeature;
use agentmart_core::ordered::ItemId;

use super::{
    normalize_email, AgentRepository, AuthRepository, KeyFeatureRepository, RepositoryError,
};
use crate::realtime::{ChangeBus, ChangeEvent, ChangeKind, Table};

#[derive(Default)]
pub struct InMemoryAgentRepository {
    agents: RwLock<HashMap<String, Agent>>,
    changes: ChangeBus,
}

impl InMemoryAgentRepository {
    pub fn new(changes: ChangeBus) -> Self {
        Self { agents: RwLock::new(HashMap::new()), changes }
    }

    async fn sorted(&self, active_only: bool) -> Vec<Agent> {
        let agents = self.agents.read().await;
        let mut list: Vec<Agent> =
            agents.values().filter(|agent| !active_only || agent.is_active).cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }
}

#[async_trait::async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
        Ok(self.sorted(false).await)
    }

    async fn list_active(&self) -> Result<Vec<Agent>, RepositoryError> {
        Ok(self.sorted(true).await)
    }

    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        let agents = self.agents.read().await;
        Ok(agents.get(&id.0).cloned())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let agents = self.agents.read().await;
        Ok(agents.len() as u64)
    }

    async fn insert(&self, agent: Agent) -> Result<(), RepositoryError> {
        let id = agent.id.0.clone();
        self.agents.write().await.insert(id.clone(), agent);
        self.changes.publish(ChangeEvent::new(Table::Agents, ChangeKind::Insert, id));
        Ok(())
    }

    async fn update(&self, agent: Agent) -> Result<bool, RepositoryError> {
        let id = agent.id.0.clone();
        let mut agents = self.agents.write().await;
        let Some(slot) = agents.get_mut(&id) else {
            return Ok(false);
        };
        *slot = agent;
        drop(agents);
        self.changes.publish(ChangeEvent::new(Table::Agents, ChangeKind::Update, id));
        Ok(true)
    }

    async fn apply_patch(&self, id: &AgentId, patch: AgentPatch) -> Result<bool, RepositoryError> {
        let mut agents = self.agents.write().await;
        let Some(agent) = agents.get_mut(&id.0) else {
            return Ok(false);
        };
        agent.apply_patch(patch);
        drop(agents);
        self.changes.publish(ChangeEvent::new(Table::Agents, ChangeKind::Update, id.0.clone()));
        Ok(true)
    }

    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError> {
        let removed = self.agents.write().await.remove(&id.0).is_some();
        if removed {
            self.changes.publish(ChangeEvent::new(Table::Agents, ChangeKind::Delete, id.0.clone()));
        }
        Ok(removed)
    }
}

#[derive(Default)]
pub struct InMemoryKeyFeatureRepository {
    features: RwLock<HashMap<String, KeyFeature>>,
    changes: ChangeBus,
}

impl InMemoryKeyFeatureRepository {
    pub fn new(changes: ChangeBus) -> Self {
        Self { features: RwLock::new(HashMap::new()), changes }
    }

    async fn sorted(&self, active_only: bool) -> Vec<KeyFeature> {
        let features = self.features.read().await;
        let mut list: Vec<KeyFeature> = features
            .values()
            .filter(|feature| !active_only || feature.is_active)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.display_order.cmp(&b.display_order).then_with(|| a.created_at.cmp(&b.created_at))
        });
        list
    }
}

#[async_trait::async_trait]
impl KeyFeatureRepository for InMemoryKeyFeatureRepository {
    async fn list_all(&self) -> Result<Vec<KeyFeature>, RepositoryError> {
        Ok(self.sorted(false).await)
    }

    async fn list_active(&self) -> Result<Vec<KeyFeature>, RepositoryError> {
        Ok(self.sorted(true).await)
    }

    async fn find_by_id(&self, id: &ItemId) -> Result<Option<KeyFeature>, RepositoryError> {
        let features = self.features.read().await;
        Ok(features.get(id.as_str()).cloned())
    }

    async fn insert(&self, feature: KeyFeature) -> Result<(), RepositoryError> {
        let id = feature.id.0.clone();
        self.features.write().await.insert(id.clone(), feature);
        self.changes.publish(ChangeEvent::new(Table::KeyFeatures, ChangeKind::Insert, id));
        Ok(())
    }

    async fn update(&self, feature: KeyFeature) -> Result<bool, RepositoryError> {
        let id = feature.id.0.clone();
        let mut features = self.features.write().await;
        let Some(slot) = features.get_mut(&id) else {
            return Ok(false);
        };
        *slot = feature;
        drop(features);
        self.changes.publish(ChangeEvent::new(Table::KeyFeatures, ChangeKind::Update, id));
        Ok(true)
    }

    async fn delete(&self, id: &ItemId) -> Result<bool, RepositoryError> {
        let removed = self.features.write().await.remove(id.as_str()).is_some();
        if removed {
            self.changes
                .publish(ChangeEvent::new(Table::KeyFeatures, ChangeKind::Delete, id.0.clone()));
        }
        Ok(removed)
    }

    async fn save_order(&self, updates: &[KeyFeature]) -> Result<(), RepositoryError> {
        let mut features = self.features.write().await;
        let mut touched = Vec::new();
        for update in updates {
            if let Some(stored) = features.get_mut(update.id.as_str()) {
                stored.display_order = update.display_order;
                touched.push(update.id.0.clone());
            }
        }
        drop(features);
        for id in touched {
            self.changes.publish(ChangeEvent::new(Table::KeyFeatures, ChangeKind::Update, id));
        }
        Ok(())
    }
}

struct StoredUser {
    id: UserId,
    password_hash: String,
}

#[derive(Default)]
pub struct InMemoryAuthRepository {
    users: RwLock<HashMap<String, StoredUser>>,
    roles: RwLock<HashSet<(String, Role)>>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemoryAuthRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AuthRepository for InMemoryAuthRepository {
    async fn upsert_user(&self, email: &str, password: &str) -> Result<UserId, RepositoryError> {
        let mut users = self.users.write().await;
        let user = users
            .entry(normalize_email(email))
            .or_insert_with(|| StoredUser { id: UserId::generate(), password_hash: String::new() });
        user.password_hash = hash_password(password);
        Ok(user.id.clone())
    }

    async fn grant_role(&self, user_id: &UserId, role: Role) -> Result<(), RepositoryError> {
        self.roles.write().await.insert((user_id.0.clone(), role));
        Ok(())
    }

    async fn has_role(&self, user_id: &UserId, role: Role) -> Result<bool, RepositoryError> {
        Ok(self.roles.read().await.contains(&(user_id.0.clone(), role)))
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
        ttl_hours: u32,
    ) -> Result<Option<Session>, RepositoryError> {
        let email = normalize_email(email);
        let user_id = {
            let users = self.users.read().await;
            match users.get(&email) {
                Some(user) if verify_password(password, &user.password_hash) => user.id.clone(),
                _ => return Ok(None),
            }
        };

        let session = Session::issue(user_id, email, now, ttl_hours);
        self.sessions.write().await.insert(session.token.clone(), session.clone());
        Ok(Some(session))
    }

    async fn get_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(token).filter(|session| !session.is_expired(now)).cloned())
    }

    async fn sign_out(&self, token: &str) -> Result<(), RepositoryError> {
        self.sessions.write().await.remove(token);
        Ok(())
    }
}
