use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use agentmart_core::domain::agent::{Agent, AgentId, AgentPatch, Pricing, TierPlan};

use super::{decode_timestamp, encode_timestamp, AgentRepository, RepositoryError};
use crate::realtime::{ChangeBus, ChangeEvent, ChangeKind, Table};
use crate::DbPool;

const AGENT_COLUMNS: &str = "id, name, short_description, description, image,
    starter_price, starter_features, pro_price, pro_features,
    business_price, business_features, enterprise_price, enterprise_features,
    features, comparison_table, comparison_enabled, is_active, created_at";

pub struct SqlAgentRepository {
    pool: DbPool,
    changes: ChangeBus,
}

impl SqlAgentRepository {
    pub fn new(pool: DbPool, changes: ChangeBus) -> Self {
        Self { pool, changes }
    }

    async fn select(&self, filter: &str) -> Result<Vec<Agent>, RepositoryError> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents {filter} ORDER BY created_at DESC");
        let rows: Vec<SqliteRow> = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_agent).collect::<Result<Vec<_>, _>>()
    }
}

fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn decode_json<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T, RepositoryError> {
    let raw: String = row.try_get(column).map_err(decode_err)?;
    serde_json::from_str(&raw)
        .map_err(|error| RepositoryError::Decode(format!("column `{column}`: {error}")))
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error| RepositoryError::Encode(error.to_string()))
}

fn decode_price(row: &SqliteRow, column: &str) -> Result<u32, RepositoryError> {
    let raw: i64 = row.try_get(column).map_err(decode_err)?;
    u32::try_from(raw)
        .map_err(|_| RepositoryError::Decode(format!("column `{column}` out of range: {raw}")))
}

fn decode_tier(row: &SqliteRow, tier: &str) -> Result<TierPlan, RepositoryError> {
    Ok(TierPlan {
        price: decode_price(row, &format!("{tier}_price"))?,
        features: decode_json(row, &format!("{tier}_features"))?,
    })
}

fn row_to_agent(row: &SqliteRow) -> Result<Agent, RepositoryError> {
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let comparison_enabled: i64 = row.try_get("comparison_enabled").map_err(decode_err)?;
    let is_active: i64 = row.try_get("is_active").map_err(decode_err)?;

    Ok(Agent {
        id: AgentId(row.try_get("id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        short_description: row.try_get("short_description").map_err(decode_err)?,
        description: row.try_get("description").map_err(decode_err)?,
        image: row.try_get("image").map_err(decode_err)?,
        pricing: Pricing {
            starter: decode_tier(row, "starter")?,
            pro: decode_tier(row, "pro")?,
            business: decode_tier(row, "business")?,
            enterprise: decode_tier(row, "enterprise")?,
        },
        features: decode_json(row, "features")?,
        comparison_table: decode_json(row, "comparison_table")?,
        comparison_enabled: comparison_enabled != 0,
        is_active: is_active != 0,
        created_at: decode_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl AgentRepository for SqlAgentRepository {
    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
        self.select("").await
    }

    async fn list_active(&self) -> Result<Vec<Agent>, RepositoryError> {
        self.select("WHERE is_active = 1").await
    }

    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?");
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(ref r) => Ok(Some(row_to_agent(r)?)),
            None => Ok(None),
        }
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM agents")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")
            .map_err(decode_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert(&self, agent: Agent) -> Result<(), RepositoryError> {
        let pricing = &agent.pricing;
        sqlx::query(
            "INSERT INTO agents (id, name, short_description, description, image,
                                 starter_price, starter_features, pro_price, pro_features,
                                 business_price, business_features, enterprise_price, enterprise_features,
                                 features, comparison_table, comparison_enabled, is_active,
                                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&agent.id.0)
        .bind(&agent.name)
        .bind(&agent.short_description)
        .bind(&agent.description)
        .bind(&agent.image)
        .bind(i64::from(pricing.starter.price))
        .bind(encode_json(&pricing.starter.features)?)
        .bind(i64::from(pricing.pro.price))
        .bind(encode_json(&pricing.pro.features)?)
        .bind(i64::from(pricing.business.price))
        .bind(encode_json(&pricing.business.features)?)
        .bind(i64::from(pricing.enterprise.price))
        .bind(encode_json(&pricing.enterprise.features)?)
        .bind(encode_json(&agent.features)?)
        .bind(encode_json(&agent.comparison_table)?)
        .bind(agent.comparison_enabled)
        .bind(agent.is_active)
        .bind(encode_timestamp(agent.created_at))
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        self.changes.publish(ChangeEvent::new(Table::Agents, ChangeKind::Insert, agent.id.0));
        Ok(())
    }

    async fn update(&self, agent: Agent) -> Result<bool, RepositoryError> {
        let pricing = &agent.pricing;
        let result = sqlx::query(
            "UPDATE agents SET
                 name = ?, short_description = ?, description = ?, image = ?,
                 starter_price = ?, starter_features = ?, pro_price = ?, pro_features = ?,
                 business_price = ?, business_features = ?, enterprise_price = ?, enterprise_features = ?,
                 features = ?, comparison_table = ?, comparison_enabled = ?, is_active = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(&agent.name)
        .bind(&agent.short_description)
        .bind(&agent.description)
        .bind(&agent.image)
        .bind(i64::from(pricing.starter.price))
        .bind(encode_json(&pricing.starter.features)?)
        .bind(i64::from(pricing.pro.price))
        .bind(encode_json(&pricing.pro.features)?)
        .bind(i64::from(pricing.business.price))
        .bind(encode_json(&pricing.business.features)?)
        .bind(i64::from(pricing.enterprise.price))
        .bind(encode_json(&pricing.enterprise.features)?)
        .bind(encode_json(&agent.features)?)
        .bind(encode_json(&agent.comparison_table)?)
        .bind(agent.comparison_enabled)
        .bind(agent.is_active)
        .bind(encode_timestamp(Utc::now()))
        .bind(&agent.id.0)
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            self.changes.publish(ChangeEvent::new(Table::Agents, ChangeKind::Update, agent.id.0));
        }
        Ok(updated)
    }

    async fn apply_patch(&self, id: &AgentId, patch: AgentPatch) -> Result<bool, RepositoryError> {
        let column = patch.column();
        let query = format!("UPDATE agents SET {column} = ?, updated_at = ? WHERE id = ?");
        let statement = match &patch {
            AgentPatch::Description(description) => sqlx::query(&query).bind(description.clone()),
            AgentPatch::Features(features) => sqlx::query(&query).bind(encode_json(features)?),
            AgentPatch::ComparisonTable(table) => sqlx::query(&query).bind(encode_json(table)?),
            AgentPatch::ComparisonEnabled(enabled) => sqlx::query(&query).bind(*enabled),
        };

        let result = statement
            .bind(encode_timestamp(Utc::now()))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            self.changes.publish(ChangeEvent::new(Table::Agents, ChangeKind::Update, id.0.clone()));
        }
        Ok(updated)
    }

    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM agents WHERE id = ?").bind(&id.0).execute(&self.pool).await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.changes.publish(ChangeEvent::new(Table::Agents, ChangeKind::Delete, id.0.clone()));
        }
        Ok(deleted)
    }
}
