use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;
use ulid::Ulid;

use crate::model::{Requester, Role};

/// Shared-secret password check for the pgwire startup handshake.
#[derive(Debug)]
pub struct FleetAuthSource {
    password: String,
}

impl FleetAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for FleetAuthSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum IdentityError {
    Missing,
    BadRole(String),
    BadUserId(String),
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::Missing => write!(f, "no credential presented"),
            IdentityError::BadRole(r) => write!(f, "unknown role: {r}"),
            IdentityError::BadUserId(e) => write!(f, "bad user id: {e}"),
        }
    }
}

impl std::error::Error for IdentityError {}

/// Turns a verified credential into the caller's user id and role.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, credential: &str) -> Result<Requester, IdentityError>;
}

/// Reads identity from the login name: `owner:<ulid>`, `user:<ulid>`, or a
/// bare `<ulid>` (role `user`). Sits behind a gateway that has already
/// authenticated the caller.
#[derive(Debug, Default)]
pub struct LoginNameIdentity;

impl IdentityProvider for LoginNameIdentity {
    fn resolve(&self, credential: &str) -> Result<Requester, IdentityError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(IdentityError::Missing);
        }
        let (role, id) = match credential.split_once(':') {
            Some((role, id)) => {
                let role = match role.to_ascii_lowercase().as_str() {
                    "owner" => Role::Owner,
                    "user" => Role::User,
                    other => return Err(IdentityError::BadRole(other.to_string())),
                };
                (role, id)
            }
            None => (Role::User, credential),
        };
        let user_id = Ulid::from_string(id).map_err(|e| IdentityError::BadUserId(e.to_string()))?;
        Ok(Requester { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn owner_prefix() {
        let r = LoginNameIdentity.resolve(&format!("owner:{ID}")).unwrap();
        assert_eq!(r.role, Role::Owner);
        assert_eq!(r.user_id.to_string(), ID);
    }

    #[test]
    fn bare_id_is_a_user() {
        let r = LoginNameIdentity.resolve(ID).unwrap();
        assert_eq!(r.role, Role::User);
    }

    #[test]
    fn rejects_unknown_role_and_garbage() {
        assert_eq!(
            LoginNameIdentity.resolve(&format!("admin:{ID}")),
            Err(IdentityError::BadRole("admin".into()))
        );
        assert!(matches!(
            LoginNameIdentity.resolve("owner:not-a-ulid"),
            Err(IdentityError::BadUserId(_))
        ));
        assert_eq!(LoginNameIdentity.resolve("  "), Err(IdentityError::Missing));
    }
}
