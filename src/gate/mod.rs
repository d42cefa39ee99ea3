//! Authorization pipeline for file requests.
//!
//! Stages run in a fixed order over an `AccessDecision` accumulator:
//!   1. owner existence        4. backup namespace     7. module trust
//!   2. blog feature gate      5. directory index      8. blog forced download
//!   3. course login           6. submission owner     9. hidden legacy resource
//! Stage 1 produces the `ResolvedScope` every later stage takes, so nothing can
//! consult the course before it has been loaded.

pub mod decision;
pub mod stages;

use std::path::{Path, PathBuf};

use axum::response::{IntoResponse, Response};

pub use decision::AccessDecision;

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::host::{Course, Host};
use crate::identity::SessionLease;
use crate::path::VirtualPath;

pub struct GateContext<'a> {
    pub host: &'a Host,
    pub config: &'a ServerConfig,
}

impl GateContext<'_> {
    pub fn data_root(&self) -> &Path { &self.config.data_root }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedScope {
    Blog,
    Course(Course),
}

impl ResolvedScope {
    pub fn course(&self) -> Option<&Course> {
        match self {
            ResolvedScope::Course(c) => Some(c),
            ResolvedScope::Blog => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileRequest {
    pub path: VirtualPath,
    /// `?forcedownload=1` from the client.
    pub force_download: bool,
}

/// Outcome of a fully passed gate. `path` may differ from the request path
/// when a directory was resolved to its index file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    pub scope: ResolvedScope,
    pub path: VirtualPath,
    pub fs_path: PathBuf,
    pub decision: AccessDecision,
}

/// A terminal gate failure together with the decision reached so far. The
/// error response itself is never cacheable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denied {
    pub error: AppError,
    pub decision: AccessDecision,
}

impl From<Denied> for AppError {
    fn from(d: Denied) -> Self { d.error }
}

impl IntoResponse for Denied {
    fn into_response(self) -> Response { self.error.into_response() }
}

pub async fn authorize(ctx: &GateContext<'_>, req: &FileRequest, mut lease: Option<&mut SessionLease>) -> Result<Authorized, Denied> {
    let decision = AccessDecision::new(ctx.config.file_lifetime_secs, req.force_download);

    let scope = stages::resolve_owner(ctx, &req.path, decision)?;
    stages::blog_feature(ctx, &scope, lease.as_deref_mut(), decision)?;
    stages::course_login(ctx, &scope, lease.as_deref_mut(), decision)?;

    let user = lease.as_deref().map(|l| l.principal());
    let decision = stages::privileged_namespace(ctx, &scope, &req.path, user, decision)?;
    let (path, fs_path) = stages::resolve_index(ctx, &req.path, decision).await?;
    let decision = stages::submission_ownership(ctx, &scope, &path, user, decision)?;
    let decision = stages::module_trust(ctx, &path, decision)?;
    let decision = stages::blog_download(&scope, decision);
    let decision = stages::hidden_resource(ctx, &scope, &path, user, decision)?;

    tracing::debug!(
        target: "filegate::gate",
        path = path.raw(),
        lifetime = decision.cache_lifetime_secs(),
        force_download = decision.force_download(),
        "request authorized"
    );
    Ok(Authorized { scope, path, fs_path, decision })
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
