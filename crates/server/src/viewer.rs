use agentmart_core::auth::{AccessDenied, Role, Session, Viewer};
use axum::http::{header, HeaderMap};
use axum::response::Redirect;
use chrono::Utc;
use tracing::{info, warn};

use crate::render::Notice;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "am_session";

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

pub fn set_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}{secure}")
}

pub fn expired_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Resolves who is asking. Storage failures degrade to an anonymous viewer.
pub async fn resolve_viewer(state: &AppState, headers: &HeaderMap) -> Viewer {
    let Some(token) = cookie_value(headers, SESSION_COOKIE) else {
        return Viewer::anonymous();
    };

    let session = match state.auth.get_session(&token, Utc::now()).await {
        Ok(Some(session)) => session,
        Ok(None) => return Viewer::anonymous(),
        Err(error) => {
            warn!(event_name = "site.viewer.session_lookup_failed", error = %error, "session lookup failed");
            return Viewer::anonymous();
        }
    };

    let is_admin = match state.auth.has_role(&session.user_id, Role::Admin).await {
        Ok(is_admin) => is_admin,
        Err(error) => {
            warn!(event_name = "site.viewer.role_lookup_failed", error = %error, "role lookup failed");
            false
        }
    };
    Viewer::signed_in(session, is_admin)
}

/// A request that passed the admin gate.
pub struct AdminContext {
    pub viewer: Viewer,
    pub session: Session,
}

/// Signed-out viewers go to the login page; signed-in non-admins go home with
/// an access-denied notice.
pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<AdminContext, Redirect> {
    let viewer = resolve_viewer(state, headers).await;
    let gate = viewer.require_admin().cloned();
    match gate {
        Ok(session) => Ok(AdminContext { viewer, session }),
        Err(AccessDenied::SignedOut) => Err(Redirect::to("/admin/login")),
        Err(AccessDenied::NotAdmin) => {
            info!(
                event_name = "admin.access.denied",
                email = viewer.session.as_ref().map(|session| session.email.as_str()).unwrap_or(""),
                "non-admin refused"
            );
            Err(Notice::AccessDenied.redirect("/"))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderMap, HeaderValue};

    use super::{cookie_value, set_cookie};

    #[test]
    fn cookie_value_finds_named_cookie_among_several() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("am_lead=abc; am_session=tok123"));

        assert_eq!(cookie_value(&headers, "am_session").as_deref(), Some("tok123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn secure_flag_is_appended_when_configured() {
        assert!(set_cookie("am_session", "t", 60, true).ends_with("; Secure"));
        assert!(!set_cookie("am_session", "t", 60, false).contains("Secure"));
    }
}
