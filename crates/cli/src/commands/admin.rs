use agentmart_core::auth::Role;
use agentmart_db::repositories::{AuthRepository, SqlAuthRepository};

use crate::commands::{with_migrated_database, CommandResult};

pub const MIN_PASSWORD_CHARS: usize = 8;

/// Checks the account input before any database work.
pub fn validate_input(email: &str, password: &str) -> Result<(), String> {
    let email = email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(format!("`{email}` is not a valid email address"));
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(format!("password must be at least {MIN_PASSWORD_CHARS} characters"));
    }
    Ok(())
}

pub fn run(email: &str, password: &str) -> CommandResult {
    if let Err(message) = validate_input(email, password) {
        return CommandResult::failure("admin", "invalid_input", message, 2);
    }
    let email = email.trim().to_string();

    let result = with_migrated_database("admin", |pool| {
        let email = email.clone();
        async move {
            let auth = SqlAuthRepository::new(pool);
            let user_id = auth
                .upsert_user(&email, password)
                .await
                .map_err(|error| ("account_write", error.to_string(), 6u8))?;
            auth.grant_role(&user_id, Role::Admin)
                .await
                .map_err(|error| ("account_write", error.to_string(), 6u8))?;
            Ok(user_id)
        }
    });

    match result {
        Ok(user_id) => CommandResult::success_with_details(
            "admin",
            format!("admin account ready for {email}"),
            Some(serde_json::json!({ "user_id": user_id.as_str(), "email": email })),
        ),
        Err(failure) => failure,
    }
}

#[cfg(test)]
mod tests {
    use super::validate_input;

    #[test]
    fn rejects_malformed_email_and_short_password() {
        assert!(validate_input("ops@example.com", "long enough").is_ok());
        assert!(validate_input("not-an-email", "long enough").is_err());
        assert!(validate_input("@example.com", "long enough").is_err());
        assert_eq!(
            validate_input("ops@example.com", "short"),
            Err("password must be at least 8 characters".to_string())
        );
    }
}
