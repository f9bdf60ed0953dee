use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

const HASH_SCHEME: &str = "pbkdf2-sha256";
pub const PASSWORD_HASH_ROUNDS: u32 = 100_000;
const DERIVED_KEY_LEN: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn issue(user_id: UserId, email: impl Into<String>, now: DateTime<Utc>, ttl_hours: u32) -> Self {
        Self {
            token: generate_session_token(),
            user_id,
            email: email.into(),
            expires_at: now + Duration::hours(i64::from(ttl_hours)),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

pub fn generate_session_token() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

/// Who is making the current request. Resolved once per request and passed
/// explicitly to anything that gates on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Viewer {
    pub session: Option<Session>,
    pub is_admin: bool,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum AccessDenied {
    #[error("Please sign in to continue.")]
    SignedOut,
    #[error("Access denied. Admin privileges required.")]
    NotAdmin,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(session: Session, is_admin: bool) -> Self {
        Self { session: Some(session), is_admin }
    }

    pub fn require_admin(&self) -> Result<&Session, AccessDenied> {
        match &self.session {
            None => Err(AccessDenied::SignedOut),
            Some(_) if !self.is_admin => Err(AccessDenied::NotAdmin),
            Some(session) => Ok(session),
        }
    }
}

/// PBKDF2-HMAC-SHA256 digest stored as `pbkdf2-sha256$<rounds>$<salt>$<hex>`.
pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    let digest = derive_key(password, &salt, PASSWORD_HASH_ROUNDS);
    format!("{HASH_SCHEME}${PASSWORD_HASH_ROUNDS}${salt}${}", encode_hex(&digest))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(4, '$');
    let (Some(scheme), Some(rounds), Some(salt), Some(digest)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Some(rounds) = rounds.parse::<u32>().ok().filter(|rounds| *rounds > 0) else {
        return false;
    };
    let Some(expected) = decode_hex(digest) else {
        return false;
    };
    constant_time_eq(&derive_key(password, salt, rounds), &expected)
}

fn derive_key(password: &str, salt: &str, rounds: u32) -> [u8; DERIVED_KEY_LEN] {
    let mut derived = [0u8; DERIVED_KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), rounds, &mut derived);
    derived
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    left.len() == right.len()
        && left.iter().zip(right).fold(0u8, |diff, (a, b)| diff | (a ^ b)) == 0
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }
    (0..input.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(input.get(index..index + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{hash_password, verify_password, AccessDenied, Session, UserId, Viewer};

    #[test]
    fn password_hash_verifies_only_the_original_password() {
        let stored = hash_password("correct horse");

        assert!(stored.starts_with("pbkdf2-sha256$100000$"));
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("wrong horse", &stored));
        assert!(!verify_password("correct horse", "plain-text"));
    }

    #[test]
    fn stored_round_count_is_honoured_and_malformed_hashes_fail() {
        let stored = hash_password("correct horse");
        let parts: Vec<&str> = stored.splitn(4, '$').collect();
        let [scheme, _, salt, digest] = parts[..] else {
            panic!("unexpected hash layout: {stored}");
        };

        let weaker = format!("{scheme}$1${salt}${digest}");
        let zero_rounds = format!("{scheme}$0${salt}${digest}");
        let truncated = format!("{scheme}$100000${salt}${}", &digest[..10]);

        assert!(!verify_password("correct horse", &weaker));
        assert!(!verify_password("correct horse", &zero_rounds));
        assert!(!verify_password("correct horse", &truncated));
        assert!(!verify_password("correct horse", "hmac-sha256$salt$00"));
    }

    #[test]
    fn same_password_hashes_differently_per_salt() {
        assert_ne!(hash_password("secret"), hash_password("secret"));
    }

    #[test]
    fn sessions_expire_after_ttl() {
        let now = Utc::now();
        let session = Session::issue(UserId::generate(), "ops@example.test", now, 2);

        assert!(!session.is_expired(now + Duration::hours(1)));
        assert!(session.is_expired(now + Duration::hours(2)));
        assert_eq!(session.token.len(), 64);
    }

    #[test]
    fn admin_gate_distinguishes_signed_out_from_non_admin() {
        let session = Session::issue(UserId::generate(), "user@example.test", Utc::now(), 1);

        assert_eq!(Viewer::anonymous().require_admin(), Err(AccessDenied::SignedOut));
        assert_eq!(
            Viewer::signed_in(session.clone(), false).require_admin(),
            Err(AccessDenied::NotAdmin)
        );
        assert_eq!(
            AccessDenied::NotAdmin.to_string(),
            "Access denied. Admin privileges required."
        );
        assert!(Viewer::signed_in(session, true).require_admin().is_ok());
    }
}
