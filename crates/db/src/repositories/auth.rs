use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::info;

use agentmart_core::auth::{hash_password, verify_password, Role, Session, UserId};

use super::{decode_timestamp, encode_timestamp, normalize_email, AuthRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuthRepository {
    pool: DbPool,
}

impl SqlAuthRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Drops every session that has already expired. Returns how many went.
    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(encode_timestamp(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl AuthRepository for SqlAuthRepository {
    async fn upsert_user(&self, email: &str, password: &str) -> Result<UserId, RepositoryError> {
        let email = normalize_email(email);
        let existing = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;
        let password_hash = hash_password(password);

        if let Some(row) = existing {
            let id: String =
                row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
                .bind(&password_hash)
                .bind(&id)
                .execute(&self.pool)
                .await?;
            info!(event_name = "db.auth.password_reset", user_id = %id, "user password replaced");
            return Ok(UserId(id));
        }

        let id = UserId::generate();
        sqlx::query("INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
            .bind(id.as_str())
            .bind(&email)
            .bind(&password_hash)
            .bind(encode_timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;
        info!(event_name = "db.auth.user_created", user_id = %id, "user created");
        Ok(id)
    }

    async fn grant_role(&self, user_id: &UserId, role: Role) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role, created_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id, role) DO NOTHING",
        )
        .bind(user_id.as_str())
        .bind(role.as_str())
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_role(&self, user_id: &UserId, role: Role) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 AS present FROM user_roles WHERE user_id = ? AND role = ?")
            .bind(user_id.as_str())
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
        ttl_hours: u32,
    ) -> Result<Option<Session>, RepositoryError> {
        let email = normalize_email(email);
        let row = sqlx::query("SELECT id, password_hash FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
        let id: String = row.try_get("id").map_err(decode)?;
        let password_hash: String = row.try_get("password_hash").map_err(decode)?;
        if !verify_password(password, &password_hash) {
            return Ok(None);
        }

        let session = Session::issue(UserId(id), email, now, ttl_hours);
        sqlx::query(
            "INSERT INTO sessions (token, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(session.user_id.as_str())
        .bind(encode_timestamp(session.expires_at))
        .bind(encode_timestamp(now))
        .execute(&self.pool)
        .await?;
        Ok(Some(session))
    }

    async fn get_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(
            "SELECT s.token, s.user_id, s.expires_at, u.email
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
        let expires_at: String = row.try_get("expires_at").map_err(decode)?;
        let session = Session {
            token: row.try_get("token").map_err(decode)?,
            user_id: UserId(row.try_get("user_id").map_err(decode)?),
            email: row.try_get("email").map_err(decode)?,
            expires_at: decode_timestamp(&expires_at)?,
        };
        Ok((!session.is_expired(now)).then_some(session))
    }

    async fn sign_out(&self, token: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?").bind(token).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use agentmart_core::auth::Role;

    use super::SqlAuthRepository;
    use crate::repositories::AuthRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlAuthRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlAuthRepository::new(pool)
    }

    #[tokio::test]
    async fn sign_in_issues_a_session_for_matching_credentials() {
        let repo = setup().await;
        let user = repo.upsert_user("Admin@Example.com ", "hunter22").await.expect("user");
        let now = Utc::now();

        let session = repo
            .sign_in("admin@example.com", "hunter22", now, 24)
            .await
            .expect("sign in")
            .expect("session issued");

        assert_eq!(session.user_id, user);
        assert_eq!(session.email, "admin@example.com");
        let found = repo.get_session(&session.token, now).await.expect("lookup");
        assert_eq!(found.map(|s| s.token), Some(session.token));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_refused() {
        let repo = setup().await;
        repo.upsert_user("admin@example.com", "hunter22").await.expect("user");
        let now = Utc::now();

        assert!(repo.sign_in("admin@example.com", "nope", now, 24).await.expect("call").is_none());
        assert!(repo.sign_in("ghost@example.com", "hunter22", now, 24).await.expect("call").is_none());
    }

    #[tokio::test]
    async fn upsert_resets_the_password_of_an_existing_user() {
        let repo = setup().await;
        let first = repo.upsert_user("admin@example.com", "old-password").await.expect("user");
        let second = repo.upsert_user("ADMIN@example.com", "new-password").await.expect("user");
        let now = Utc::now();

        assert_eq!(first, second);
        assert!(repo.sign_in("admin@example.com", "old-password", now, 1).await.expect("call").is_none());
        assert!(repo.sign_in("admin@example.com", "new-password", now, 1).await.expect("call").is_some());
    }

    #[tokio::test]
    async fn roles_are_granted_once() {
        let repo = setup().await;
        let user = repo.upsert_user("admin@example.com", "pw").await.expect("user");

        assert!(!repo.has_role(&user, Role::Admin).await.expect("check"));
        repo.grant_role(&user, Role::Admin).await.expect("grant");
        repo.grant_role(&user, Role::Admin).await.expect("grant twice");
        assert!(repo.has_role(&user, Role::Admin).await.expect("check"));
    }

    #[tokio::test]
    async fn expired_and_signed_out_sessions_are_gone() {
        let repo = setup().await;
        repo.upsert_user("admin@example.com", "pw").await.expect("user");
        let now = Utc::now();
        let session =
            repo.sign_in("admin@example.com", "pw", now, 1).await.expect("call").expect("session");

        let later = now + Duration::hours(2);
        assert!(repo.get_session(&session.token, later).await.expect("lookup").is_none());
        assert_eq!(repo.purge_expired_sessions(later).await.expect("purge"), 1);

        let fresh =
            repo.sign_in("admin@example.com", "pw", now, 1).await.expect("call").expect("session");
        repo.sign_out(&fresh.token).await.expect("sign out");
        assert!(repo.get_session(&fresh.token, now).await.expect("lookup").is_none());
    }
}
