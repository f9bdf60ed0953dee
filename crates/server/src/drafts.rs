use std::collections::HashMap;

use agentmart_core::domain::agent::AgentId;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

/// One admin's draft of one agent's editor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DraftKey {
    pub session_token: String,
    pub agent_id: AgentId,
}

impl DraftKey {
    pub fn new(session_token: &str, agent_id: &AgentId) -> Self {
        Self { session_token: session_token.to_string(), agent_id: agent_id.clone() }
    }
}

#[derive(Debug)]
struct HeldDraft<T> {
    draft: T,
    touched_at: DateTime<Utc>,
}

/// Unsaved editor state kept between requests. The lock is only held for the
/// synchronous closure passed in, never across storage calls. Drafts idle for
/// longer than the session TTL are evicted when a new draft is opened.
#[derive(Debug)]
pub struct DraftStore<T> {
    drafts: Mutex<HashMap<DraftKey, HeldDraft<T>>>,
    idle_ttl: Duration,
}

impl<T> Default for DraftStore<T> {
    fn default() -> Self {
        Self::with_idle_ttl(Duration::hours(24))
    }
}

impl<T> DraftStore<T> {
    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self { drafts: Mutex::new(HashMap::new()), idle_ttl }
    }
}

impl<T: Clone> DraftStore<T> {
    pub async fn get(&self, key: &DraftKey) -> Option<T> {
        self.drafts.lock().await.get(key).map(|held| held.draft.clone())
    }

    /// Keeps an existing draft; otherwise stores `fresh`. Returns what is held.
    pub async fn open(&self, key: DraftKey, fresh: T) -> T {
        let now = Utc::now();
        let mut drafts = self.drafts.lock().await;
        if !drafts.contains_key(&key) {
            evict_idle(&mut drafts, now, self.idle_ttl);
        }
        let held = drafts.entry(key).or_insert_with(|| HeldDraft { draft: fresh, touched_at: now });
        held.touched_at = now;
        held.draft.clone()
    }

    /// Runs `change` against the draft, if one is open.
    pub async fn update<R>(&self, key: &DraftKey, change: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.drafts.lock().await.get_mut(key).map(|held| {
            held.touched_at = Utc::now();
            change(&mut held.draft)
        })
    }

    pub async fn discard(&self, key: &DraftKey) -> Option<T> {
        self.drafts.lock().await.remove(key).map(|held| held.draft)
    }

    /// Drops every draft belonging to a signed-out session.
    pub async fn discard_session(&self, session_token: &str) {
        self.drafts.lock().await.retain(|key, _| key.session_token != session_token);
    }

    /// Drops drafts idle since before `now - idle_ttl`. Returns how many went.
    pub async fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        evict_idle(&mut *self.drafts.lock().await, now, self.idle_ttl)
    }

    pub async fn len(&self) -> usize {
        self.drafts.lock().await.len()
    }
}

fn evict_idle<T>(
    drafts: &mut HashMap<DraftKey, HeldDraft<T>>,
    now: DateTime<Utc>,
    idle_ttl: Duration,
) -> usize {
    let before = drafts.len();
    drafts.retain(|_, held| now - held.touched_at < idle_ttl);
    let evicted = before - drafts.len();
    if evicted > 0 {
        debug!(event_name = "admin.drafts.evicted", evicted, "idle editor drafts dropped");
    }
    evicted
}

#[cfg(test)]
mod tests {
    use agentmart_core::domain::agent::AgentId;
    use chrono::{Duration, Utc};

    use super::{DraftKey, DraftStore};

    #[tokio::test]
    async fn open_keeps_an_existing_draft() {
        let store: DraftStore<Vec<u32>> = DraftStore::default();
        let key = DraftKey::new("token", &AgentId("a".to_string()));

        store.open(key.clone(), vec![1]).await;
        store.update(&key, |draft| draft.push(2)).await;
        let held = store.open(key.clone(), Vec::new()).await;

        assert_eq!(held, vec![1, 2]);
    }

    #[tokio::test]
    async fn update_without_a_draft_is_none() {
        let store: DraftStore<Vec<u32>> = DraftStore::default();
        let key = DraftKey::new("token", &AgentId("a".to_string()));

        assert_eq!(store.update(&key, |draft| draft.len()).await, None);
    }

    #[tokio::test]
    async fn signing_out_drops_only_that_sessions_drafts() {
        let store: DraftStore<u32> = DraftStore::default();
        let agent = AgentId("a".to_string());
        store.open(DraftKey::new("mine", &agent), 1).await;
        store.open(DraftKey::new("theirs", &agent), 2).await;

        store.discard_session("mine").await;

        assert_eq!(store.get(&DraftKey::new("mine", &agent)).await, None);
        assert_eq!(store.get(&DraftKey::new("theirs", &agent)).await, Some(2));
    }

    #[tokio::test]
    async fn drafts_of_expired_sessions_are_evicted() {
        let store: DraftStore<u32> = DraftStore::with_idle_ttl(Duration::hours(2));
        let agent = AgentId("a".to_string());
        store.open(DraftKey::new("expired", &agent), 1).await;

        assert_eq!(store.evict_idle(Utc::now() + Duration::hours(1)).await, 0);
        assert_eq!(store.evict_idle(Utc::now() + Duration::hours(3)).await, 1);
        assert_eq!(store.get(&DraftKey::new("expired", &agent)).await, None);
    }

    #[tokio::test]
    async fn opening_a_draft_sweeps_out_idle_ones() {
        let store: DraftStore<u32> = DraftStore::with_idle_ttl(Duration::zero());
        let agent = AgentId("a".to_string());
        store.open(DraftKey::new("old", &agent), 1).await;

        store.open(DraftKey::new("new", &agent), 2).await;

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&DraftKey::new("new", &agent)).await, Some(2));
    }
}
