//! Identity and session management for file requests.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;

pub use principal::{Principal, Attrs};
pub use session::{Session, SessionLease, SessionManager, SessionState, SessionToken};
pub use provider::{AuthProvider, CatalogAuthProvider, LoginRequest, LoginResponse, hash_password, verify_password};
