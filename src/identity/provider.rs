use std::sync::Arc;

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use password_hash::SaltString;
use tracing::{debug, info};

use super::principal::{Attrs, Principal};
use super::session::{Session, SessionManager};
use crate::host::catalog::SiteCatalog;

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub ip: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub session: Session,
}

pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse>;
}

/// Checks credentials against the site catalog's user list.
pub struct CatalogAuthProvider {
    pub catalog: Arc<SiteCatalog>,
    pub sm: SessionManager,
}

impl CatalogAuthProvider {
    pub fn new(catalog: Arc<SiteCatalog>, sm: SessionManager) -> Self { Self { catalog, sm } }
}

impl AuthProvider for CatalogAuthProvider {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse> {
        let Some(user) = self.catalog.find_user_by_name(&req.username) else {
            debug!(target: "filegate::auth", user = %req.username, "unknown user");
            return Err(anyhow!("invalid_credentials"));
        };
        if user.suspended || !verify_password(&user.password_hash, &req.password) {
            return Err(anyhow!("invalid_credentials"));
        }
        let principal = Principal {
            user_id: user.id,
            username: user.username.clone(),
            attrs: Attrs { ip: req.ip.clone() },
        };
        let session = self.sm.issue(principal)?;
        info!(target: "filegate::auth", user = %req.username, sid = %session.session_id, "login");
        Ok(LoginResponse { session })
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}
