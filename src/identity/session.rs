use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use base64::Engine;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::principal::Principal;

pub type SessionToken = String;

/// Mutable per-session state. Only reachable through a `SessionLease`.
#[derive(Debug)]
pub struct SessionState {
    pub principal: Principal,
    pub last_access: Instant,
    pub requests: u64,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub token: SessionToken,
    pub expires_at: Instant,
    state: Arc<Mutex<SessionState>>,
}

/// Exclusive hold on one session's state. Requests of the same session queue
/// behind it, so it must be dropped before a long transfer starts.
#[derive(Debug)]
pub struct SessionLease {
    session_id: String,
    guard: OwnedMutexGuard<SessionState>,
}

impl SessionLease {
    pub fn principal(&self) -> &Principal { &self.guard.principal }
    pub fn requests(&self) -> u64 { self.guard.requests }

    pub fn touch(&mut self) {
        self.guard.last_access = Instant::now();
        self.guard.requests += 1;
    }

    pub fn release(self) {
        debug!(target: "filegate::session", sid = %self.session_id, "session lock released");
    }
}

fn gen_id() -> Result<String> {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow!("session token generation failed: {e}"))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

#[derive(Clone)]
pub struct SessionManager {
    pub ttl: Duration,
    sessions: Arc<RwLock<HashMap<SessionToken, Session>>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, sessions: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn issue(&self, principal: Principal) -> Result<Session> {
        let now = Instant::now();
        let sess = Session {
            session_id: gen_id()?,
            token: gen_id()?,
            expires_at: now + self.ttl,
            state: Arc::new(Mutex::new(SessionState { principal: principal.clone(), last_access: now, requests: 0 })),
        };
        self.sessions.write().insert(sess.token.clone(), sess.clone());
        debug!(target: "filegate::session", user = %principal.username, sid = %sess.session_id, ttl_secs = self.ttl.as_secs(), "session issued");
        Ok(sess)
    }

    fn live_session(&self, token: &str) -> Option<Session> {
        let now = Instant::now();
        let found = self.sessions.read().get(token).cloned();
        match found {
            Some(s) if s.expires_at > now => Some(s),
            Some(_) => {
                self.sessions.write().remove(token);
                None
            }
            None => None,
        }
    }

    /// Wait for and take the session lock. `None` for unknown or expired tokens.
    pub async fn lease(&self, token: &str) -> Option<SessionLease> {
        let sess = self.live_session(token)?;
        let guard = sess.state.clone().lock_owned().await;
        Some(SessionLease { session_id: sess.session_id, guard })
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }

    pub fn len(&self) -> usize { self.sessions.read().len() }
    pub fn is_empty(&self) -> bool { self.sessions.read().is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Principal { Principal { user_id: 2, username: "alice".into(), ..Default::default() } }

    #[tokio::test]
    async fn lease_serializes_requests_of_one_session() {
        let sm = SessionManager::default();
        let sess = sm.issue(alice()).unwrap();
        let mut first = sm.lease(&sess.token).await.unwrap();
        first.touch();
        assert_eq!(first.principal().user_id, 2);

        let sm2 = sm.clone();
        let token = sess.token.clone();
        let waiter = tokio::spawn(async move {
            let lease = sm2.lease(&token).await.unwrap();
            lease.requests()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "second lease must wait for the first");
        first.release();
        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[test]
    fn issued_tokens_are_full_length_and_distinct() {
        let sm = SessionManager::default();
        let a = sm.issue(alice()).unwrap();
        let b = sm.issue(alice()).unwrap();
        assert_eq!(a.token.len(), 43);
        assert_ne!(a.token, b.token);
        assert_ne!(a.token, a.session_id);
        assert_ne!(a.token, base64::engine::general_purpose::URL_SAFE_NO_PAD.encode([0u8; 32]));
    }

    #[tokio::test]
    async fn expired_and_logged_out_tokens_do_not_lease() {
        let sm = SessionManager::new(Duration::from_millis(0));
        let sess = sm.issue(alice()).unwrap();
        assert!(sm.lease(&sess.token).await.is_none());
        assert!(sm.is_empty());

        let sm = SessionManager::default();
        let sess = sm.issue(alice()).unwrap();
        assert!(sm.logout(&sess.token));
        assert!(sm.lease(&sess.token).await.is_none());
        assert!(!sm.logout(&sess.token));
    }
}
