pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod realtime;
pub mod repositories;

pub use connection::{connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{AgentSeedInfo, DemoSeedDataset, SeedResult, VerificationResult};
pub use realtime::{ChangeBus, ChangeEvent, ChangeKind, EventMask, Notification, Subscription, Table};
