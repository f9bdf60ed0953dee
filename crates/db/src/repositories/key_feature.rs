use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use agentmart_core::domain::key_feature::KeyFeature;
use agentmart_core::ordered::ItemId;

use super::{decode_timestamp, encode_timestamp, KeyFeatureRepository, RepositoryError};
use crate::realtime::{ChangeBus, ChangeEvent, ChangeKind, Table};
use crate::DbPool;

const KEY_FEATURE_COLUMNS: &str =
    "id, title, description, icon, icon_bg_color, display_order, is_active, created_at";

pub struct SqlKeyFeatureRepository {
    pool: DbPool,
    changes: ChangeBus,
}

impl SqlKeyFeatureRepository {
    pub fn new(pool: DbPool, changes: ChangeBus) -> Self {
        Self { pool, changes }
    }

    async fn select(&self, filter: &str) -> Result<Vec<KeyFeature>, RepositoryError> {
        let sql = format!(
            "SELECT {KEY_FEATURE_COLUMNS} FROM key_features {filter}
             ORDER BY display_order ASC, created_at ASC"
        );
        let rows: Vec<SqliteRow> = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_key_feature).collect::<Result<Vec<_>, _>>()
    }
}

fn row_to_key_feature(row: &SqliteRow) -> Result<KeyFeature, RepositoryError> {
    let decode = |error: sqlx::Error| RepositoryError::Decode(error.to_string());
    let display_order: i64 = row.try_get("display_order").map_err(decode)?;
    let is_active: i64 = row.try_get("is_active").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;

    Ok(KeyFeature {
        id: ItemId(row.try_get("id").map_err(decode)?),
        title: row.try_get("title").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        icon: row.try_get("icon").map_err(decode)?,
        icon_bg_color: row.try_get("icon_bg_color").map_err(decode)?,
        display_order: u32::try_from(display_order).map_err(|_| {
            RepositoryError::Decode(format!("display_order out of range: {display_order}"))
        })?,
        is_active: is_active != 0,
        created_at: decode_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl KeyFeatureRepository for SqlKeyFeatureRepository {
    async fn list_all(&self) -> Result<Vec<KeyFeature>, RepositoryError> {
        self.select("").await
    }

    async fn list_active(&self) -> Result<Vec<KeyFeature>, RepositoryError> {
        self.select("WHERE is_active = 1").await
    }

    async fn find_by_id(&self, id: &ItemId) -> Result<Option<KeyFeature>, RepositoryError> {
        let sql = format!("SELECT {KEY_FEATURE_COLUMNS} FROM key_features WHERE id = ?");
        let row = sqlx::query(&sql).bind(id.as_str()).fetch_optional(&self.pool).await?;

        match row {
            Some(ref r) => Ok(Some(row_to_key_feature(r)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, feature: KeyFeature) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO key_features (id, title, description, icon, icon_bg_color,
                                       display_order, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(feature.id.as_str())
        .bind(&feature.title)
        .bind(&feature.description)
        .bind(&feature.icon)
        .bind(&feature.icon_bg_color)
        .bind(i64::from(feature.display_order))
        .bind(feature.is_active)
        .bind(encode_timestamp(feature.created_at))
        .execute(&self.pool)
        .await?;

        self.changes.publish(ChangeEvent::new(Table::KeyFeatures, ChangeKind::Insert, feature.id.0));
        Ok(())
    }

    async fn update(&self, feature: KeyFeature) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE key_features
             SET title = ?, description = ?, icon = ?, icon_bg_color = ?,
                 display_order = ?, is_active = ?
             WHERE id = ?",
        )
        .bind(&feature.title)
        .bind(&feature.description)
        .bind(&feature.icon)
        .bind(&feature.icon_bg_color)
        .bind(i64::from(feature.display_order))
        .bind(feature.is_active)
        .bind(feature.id.as_str())
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            self.changes
                .publish(ChangeEvent::new(Table::KeyFeatures, ChangeKind::Update, feature.id.0));
        }
        Ok(updated)
    }

    async fn delete(&self, id: &ItemId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM key_features WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.changes
                .publish(ChangeEvent::new(Table::KeyFeatures, ChangeKind::Delete, id.0.clone()));
        }
        Ok(deleted)
    }

    async fn save_order(&self, features: &[KeyFeature]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for feature in features {
            sqlx::query("UPDATE key_features SET display_order = ? WHERE id = ?")
                .bind(i64::from(feature.display_order))
                .bind(feature.id.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(
            event_name = "db.key_features.order_saved",
            count = features.len(),
            "key feature order saved"
        );
        for feature in features {
            self.changes.publish(ChangeEvent::new(
                Table::KeyFeatures,
                ChangeKind::Update,
                feature.id.0.clone(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, SubsecRound, Utc};

    use agentmart_core::domain::key_feature::{KeyFeature, KeyFeatureKind};
    use agentmart_core::ordered::{ItemId, MoveDirection, OrderedItem, OrderedList};

    use super::SqlKeyFeatureRepository;
    use crate::realtime::ChangeBus;
    use crate::repositories::{KeyFeatureOrderStore, KeyFeatureRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlKeyFeatureRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlKeyFeatureRepository::new(pool, ChangeBus::default())
    }

    fn feature(id: &str, order: u32, active: bool) -> KeyFeature {
        let mut feature =
            KeyFeature::with_defaults(ItemId(id.to_string()), KeyFeatureKind::Standard, order);
        feature.title = format!("Feature {id}");
        feature.description = format!("{id} description");
        feature.is_active = active;
        feature.created_at = Utc::now().trunc_subsecs(0) - Duration::minutes(i64::from(order));
        feature
    }

    #[tokio::test]
    async fn listings_follow_display_order() {
        let repo = setup().await;
        for item in [feature("c", 3, true), feature("a", 1, true), feature("b", 2, false)] {
            repo.insert(item).await.expect("insert");
        }

        let all: Vec<String> =
            repo.list_all().await.expect("all").into_iter().map(|f| f.id.0).collect();
        let active: Vec<String> =
            repo.list_active().await.expect("active").into_iter().map(|f| f.id.0).collect();

        assert_eq!(all, vec!["a", "b", "c"]);
        assert_eq!(active, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn update_and_delete_report_matches() {
        let repo = setup().await;
        let mut item = feature("a", 1, true);
        repo.insert(item.clone()).await.expect("insert");

        item.icon_bg_color = "#FFF".to_string();
        assert!(repo.update(item.clone()).await.expect("update"));
        let loaded = repo.find_by_id(&item.id).await.expect("find").expect("present");
        assert_eq!(loaded.icon_bg_color, "#FFF");

        assert!(repo.delete(&item.id).await.expect("delete"));
        assert!(!repo.delete(&item.id).await.expect("second delete"));
        assert!(!repo.update(item).await.expect("update missing"));
    }

    #[tokio::test]
    async fn moved_order_survives_a_reload() {
        let repo = setup().await;
        for item in [feature("a", 1, true), feature("b", 2, true), feature("c", 3, true)] {
            repo.insert(item).await.expect("insert");
        }

        let mut list = OrderedList::from_persisted(repo.list_all().await.expect("list"));
        assert!(list.reorder(2, MoveDirection::Up));
        list.save(&KeyFeatureOrderStore::new(&repo)).await.expect("save");

        let reloaded = OrderedList::from_persisted(repo.list_all().await.expect("reload"));
        let ids: Vec<&str> = reloaded.items().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(reloaded, list);
    }
}
