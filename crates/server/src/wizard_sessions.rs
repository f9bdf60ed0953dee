use std::collections::HashMap;

use agentmart_core::wizard::LeadWizard;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

pub const LEAD_COOKIE: &str = "am_lead";
pub const LEAD_COOKIE_MAX_AGE_SECS: i64 = 60 * 60 * 24;

#[derive(Debug)]
struct HeldWizard {
    wizard: LeadWizard,
    touched_at: DateTime<Utc>,
}

/// Lead wizards keyed by the browser's `am_lead` cookie. Entries untouched
/// for longer than the idle TTL are evicted, except while a submission is in
/// flight.
#[derive(Debug)]
pub struct WizardSessions {
    wizards: Mutex<HashMap<String, HeldWizard>>,
    idle_ttl: Duration,
}

impl Default for WizardSessions {
    fn default() -> Self {
        Self::with_idle_ttl(Duration::seconds(LEAD_COOKIE_MAX_AGE_SECS))
    }
}

impl WizardSessions {
    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self { wizards: Mutex::new(HashMap::new()), idle_ttl }
    }

    /// The wizard for `browser_id`, or a fresh one.
    pub async fn snapshot(&self, browser_id: &str) -> LeadWizard {
        self.wizards
            .lock()
            .await
            .get(browser_id)
            .map(|held| held.wizard.clone())
            .unwrap_or_default()
    }

    /// Runs `step` against the browser's wizard, creating it on first use.
    /// The lock is released before this returns.
    pub async fn with<R>(&self, browser_id: &str, step: impl FnOnce(&mut LeadWizard) -> R) -> R {
        let now = Utc::now();
        let mut wizards = self.wizards.lock().await;
        if !wizards.contains_key(browser_id) {
            evict_idle(&mut wizards, now, self.idle_ttl);
        }
        let held = wizards
            .entry(browser_id.to_string())
            .or_insert_with(|| HeldWizard { wizard: LeadWizard::default(), touched_at: now });
        held.touched_at = now;
        step(&mut held.wizard)
    }

    /// Drops wizards idle since before `now - idle_ttl`. Returns how many went.
    pub async fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        evict_idle(&mut *self.wizards.lock().await, now, self.idle_ttl)
    }

    pub async fn len(&self) -> usize {
        self.wizards.lock().await.len()
    }
}

fn evict_idle(
    wizards: &mut HashMap<String, HeldWizard>,
    now: DateTime<Utc>,
    idle_ttl: Duration,
) -> usize {
    let before = wizards.len();
    wizards.retain(|_, held| {
        held.wizard.state().submission_in_flight || now - held.touched_at < idle_ttl
    });
    let evicted = before - wizards.len();
    if evicted > 0 {
        debug!(event_name = "site.lead.wizards_evicted", evicted, "idle lead wizards dropped");
    }
    evicted
}

pub fn new_browser_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use agentmart_core::wizard::LeadEdit;
    use chrono::{Duration, Utc};

    use super::WizardSessions;

    #[tokio::test]
    async fn browsers_get_independent_wizards() {
        let sessions = WizardSessions::default();

        sessions
            .with("one", |wizard| wizard.edit(LeadEdit::CompanyName("Acme".to_string())))
            .await
            .expect("edit");

        assert_eq!(sessions.snapshot("one").await.state().draft.company_name, "Acme");
        assert_eq!(sessions.snapshot("two").await.state().draft.company_name, "");
    }

    #[tokio::test]
    async fn idle_wizards_are_evicted_after_the_cookie_lifetime() {
        let sessions = WizardSessions::default();
        sessions.with("stale", |_| ()).await;
        sessions.with("fresh", |_| ()).await;

        assert_eq!(sessions.evict_idle(Utc::now() + Duration::hours(1)).await, 0);
        assert_eq!(sessions.evict_idle(Utc::now() + Duration::hours(25)).await, 2);
        assert_eq!(sessions.len().await, 0);
    }

    #[tokio::test]
    async fn new_browsers_sweep_out_expired_entries() {
        let sessions = WizardSessions::with_idle_ttl(Duration::zero());
        sessions.with("first", |_| ()).await;

        sessions.with("second", |_| ()).await;

        assert_eq!(sessions.len().await, 1);
    }

    #[tokio::test]
    async fn wizard_with_a_submission_in_flight_is_kept() {
        let sessions = WizardSessions::default();
        sessions
            .with("busy", |wizard| {
                for (field, value) in [
                    ("companyName", "Acme"),
                    ("agentName", "Bot"),
                    ("serviceType", "buy"),
                    ("email", "a@b.co"),
                    ("phone", "5551234567"),
                    ("description", "Twenty characters at least"),
                ] {
                    let edit = LeadEdit::from_form_field(field, value).expect("known field");
                    wizard.edit(edit).expect("edit");
                }
                for _ in 0..6 {
                    wizard.next().expect("next");
                }
            })
            .await;
        assert!(sessions.snapshot("busy").await.state().submission_in_flight);

        assert_eq!(sessions.evict_idle(Utc::now() + Duration::days(3)).await, 0);
    }
}
