//! Caller identity for the upload intake.
//!
//! Authentication itself lives outside this service; requests arrive with the
//! resolved identity in headers set by the gateway. Only roles with
//! listing-creation rights may start a bulk upload.

use crate::error::IntakeError;
use actix_web::HttpRequest;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

const LISTING_ROLES: [&str; 3] = ["agent", "owner", "admin"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
    pub role: String,
}

pub trait IdentityProvider: Send + Sync {
    /// Resolves the caller and checks they may create listings.
    fn authorize_upload(&self, req: &HttpRequest) -> Result<CallerIdentity, IntakeError>;
}

/// Reads the identity from `X-User-Id` / `X-User-Role`.
#[derive(Clone, Debug)]
pub struct HeaderIdentity {
    allowed_roles: Vec<String>,
}

impl HeaderIdentity {
    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_roles: roles
                .into_iter()
                .map(|r| Into::<String>::into(r).to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self::with_roles(LISTING_ROLES)
    }
}

fn header_value<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl IdentityProvider for HeaderIdentity {
    fn authorize_upload(&self, req: &HttpRequest) -> Result<CallerIdentity, IntakeError> {
        let user_id = header_value(req, USER_ID_HEADER).ok_or(IntakeError::Unauthenticated)?;
        let role = header_value(req, USER_ROLE_HEADER)
            .ok_or(IntakeError::Unauthenticated)?
            .to_ascii_lowercase();

        if !self.allowed_roles.iter().any(|allowed| *allowed == role) {
            return Err(IntakeError::Forbidden(role));
        }

        Ok(CallerIdentity {
            user_id: user_id.to_string(),
            role,
        })
    }
}
