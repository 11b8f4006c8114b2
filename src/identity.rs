// identity.rs
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use uuid::Uuid;

/// Cookie carrying the voter fingerprint.
pub const VOTER_COOKIE_NAME: &str = "voter_id";

/// One year, in line with "remember this browser" rather than a session.
const VOTER_COOKIE_MAX_AGE: time::Duration = time::Duration::days(365);

/// A soft, browser-bound voter identity. This is a capability token, not an
/// authenticated principal: clearing the cookie mints a new identity, and
/// nothing here attempts to prevent that.
#[derive(Debug, Clone)]
pub struct VoterIdentity {
    pub token: String,
    pub is_new: bool,
}

/// Returns the previously-issued identity from the jar, or mints a fresh one.
/// No side effects; the caller persists new tokens via [`remember`].
pub fn resolve(jar: &CookieJar) -> VoterIdentity {
    match jar.get(VOTER_COOKIE_NAME) {
        Some(cookie) => VoterIdentity {
            token: cookie.value().to_string(),
            is_new: false,
        },
        None => VoterIdentity {
            token: Uuid::new_v4().to_string(),
            is_new: true,
        },
    }
}

/// Writes a newly-minted identity back to the client. Script-inaccessible and
/// same-site so the token never leaks cross-origin; `secure` is off only for
/// local development over plain HTTP.
pub fn remember(jar: CookieJar, identity: &VoterIdentity, secure: bool) -> CookieJar {
    if !identity.is_new {
        return jar;
    }

    let cookie = Cookie::build((VOTER_COOKIE_NAME, identity.token.clone()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(VOTER_COOKIE_MAX_AGE)
        .build();

    jar.add(cookie)
}
