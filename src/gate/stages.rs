//! Individual gate stages. Each takes the decision as tightened so far and
//! either hands back a (possibly tighter) decision or a `Denied`.

use std::path::PathBuf;

use tracing::{debug, info};

use super::{AccessDecision, Denied, GateContext, ResolvedScope};
use crate::config::BlogLevel;
use crate::error::AppError;
use crate::host::{sanitize_module_name, Capability, ContextRef};
use crate::identity::{Principal, SessionLease};
use crate::path::{Scope, VirtualPath, NS_BACKUPDATA, NS_MODDATA};

pub const INDEX_FILES: [&str; 3] = ["index.html", "index.htm", "Default.htm"];
pub const SUBMISSION_MODULE: &str = "assignment";
pub const LEGACY_RESOURCE_MODULE: &str = "resource";

type StageResult = Result<AccessDecision, Denied>;

fn deny(decision: AccessDecision, err: AppError) -> Denied {
    info!(target: "filegate::gate", code = err.code_str(), "request denied");
    Denied { error: err, decision }
}

/// Stage 1: load the owning course and compare its id against the request text.
pub fn resolve_owner(ctx: &GateContext<'_>, path: &VirtualPath, decision: AccessDecision) -> Result<ResolvedScope, Denied> {
    match path.scope() {
        Scope::Blog => Ok(ResolvedScope::Blog),
        Scope::Course { id, segment } => {
            let Some(course) = ctx.host.scopes.find_course(*id) else {
                return Err(deny(decision, AppError::not_found("invalid_course", "invalid course id")));
            };
            // "007" or "+7" must not alias course 7
            if course.id.to_string() != *segment {
                return Err(deny(decision, AppError::not_found("invalid_course", "invalid course id")));
            }
            debug!(target: "filegate::gate", course = course.id, "owner resolved");
            Ok(ResolvedScope::Course(course))
        }
    }
}

fn require_site_login(lease: Option<&mut SessionLease>, decision: AccessDecision) -> Result<(), Denied> {
    match lease {
        Some(l) => {
            l.touch();
            Ok(())
        }
        None => Err(deny(decision, AppError::forbidden("login_required", "login required"))),
    }
}

/// Stage 2: blog attachments depend on the site blog setting.
pub fn blog_feature(ctx: &GateContext<'_>, scope: &ResolvedScope, lease: Option<&mut SessionLease>, decision: AccessDecision) -> Result<(), Denied> {
    if !matches!(scope, ResolvedScope::Blog) {
        return Ok(());
    }
    let level = ctx.config.blog_level;
    if level == BlogLevel::Disabled {
        return Err(deny(decision, AppError::forbidden("blog_disabled", "blogging is disabled")));
    }
    if level < BlogLevel::Global || ctx.config.force_login {
        require_site_login(lease, decision)?;
    }
    Ok(())
}

/// Stage 3: course files need a login to the course unless they belong to the
/// front page and the site is open.
pub fn course_login(ctx: &GateContext<'_>, scope: &ResolvedScope, lease: Option<&mut SessionLease>, decision: AccessDecision) -> Result<(), Denied> {
    let ResolvedScope::Course(course) = scope else { return Ok(()); };
    if course.id == ctx.config.site_course_id {
        if ctx.config.force_login {
            require_site_login(lease, decision)?;
        }
        return Ok(());
    }
    let Some(lease) = lease else {
        return Err(deny(decision, AppError::forbidden("login_required", "login required")));
    };
    lease.touch();
    let user = Some(lease.principal());
    let ctx_ref = ContextRef::Course(course.id);
    if !course.visible && !ctx.host.capabilities.has_capability(user, Capability::ViewHiddenCourses, ctx_ref) {
        return Err(deny(decision, AppError::forbidden("course_hidden", "course is not available")));
    }
    let enrolled = ctx.host.enrolments.is_enrolled(lease.principal().user_id, course.id)
        || ctx.host.capabilities.has_capability(user, Capability::CourseView, ctx_ref);
    if !enrolled {
        return Err(deny(decision, AppError::forbidden("not_enrolled", "not enrolled in this course")));
    }
    Ok(())
}

/// Stage 4: backups are for users with the backup capability and never cached.
pub fn privileged_namespace(ctx: &GateContext<'_>, scope: &ResolvedScope, path: &VirtualPath, user: Option<&Principal>, decision: AccessDecision) -> StageResult {
    if !path.namespace_is(NS_BACKUPDATA) {
        return Ok(decision);
    }
    let allowed = match scope {
        ResolvedScope::Course(c) => ctx.host.capabilities.has_capability(user, Capability::SiteBackup, ContextRef::Course(c.id)),
        ResolvedScope::Blog => false,
    };
    if !allowed {
        return Err(deny(decision, AppError::forbidden("access_denied", "access not allowed")));
    }
    debug!(target: "filegate::gate", "backup access granted, caching disabled");
    Ok(decision.no_cache())
}

/// Stage 5: directories are served through their index file, never listed.
pub async fn resolve_index(ctx: &GateContext<'_>, path: &VirtualPath, decision: AccessDecision) -> Result<(VirtualPath, PathBuf), Denied> {
    let fs_path = path.to_fs_path(ctx.data_root()).map_err(|e| deny(decision, e))?;
    let is_dir = tokio::fs::metadata(&fs_path).await.map(|m| m.is_dir()).unwrap_or(false);
    if !is_dir {
        return Ok((path.clone(), fs_path));
    }
    for name in INDEX_FILES {
        let candidate = path.with_index(name);
        let candidate_fs = candidate.to_fs_path(ctx.data_root()).map_err(|e| deny(decision, e))?;
        if tokio::fs::try_exists(&candidate_fs).await.unwrap_or(false) {
            debug!(target: "filegate::gate", index = name, "directory resolved to index file");
            return Ok((candidate, candidate_fs));
        }
    }
    Err(deny(decision, AppError::not_found("file_not_found", "file not found")))
}

/// Stage 6: submissions are visible to their owner and to graders of that
/// assignment. Never cached either way.
pub fn submission_ownership(ctx: &GateContext<'_>, scope: &ResolvedScope, path: &VirtualPath, user: Option<&Principal>, decision: AccessDecision) -> StageResult {
    let is_submission = path.len() >= 3
        && path.namespace_is(NS_MODDATA)
        && path.module_type().map(|m| m.eq_ignore_ascii_case(SUBMISSION_MODULE)).unwrap_or(false);
    if !is_submission {
        return Ok(decision);
    }
    let decision = decision.no_cache();
    let owns = match (user, path.owner_uid_segment()) {
        (Some(u), Some(seg)) => u.owns_segment(seg),
        _ => false,
    };
    if owns {
        return Ok(decision);
    }
    let ResolvedScope::Course(course) = scope else {
        return Err(deny(decision, AppError::not_found("file_not_found", "file not found")));
    };
    let instance = path.instance_segment().and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
    let Some(cm) = ctx.host.course_modules.find_instance(SUBMISSION_MODULE, instance, course.id) else {
        return Err(deny(decision, AppError::not_found("file_not_found", "file not found")));
    };
    if !ctx.host.capabilities.has_capability(user, Capability::AssignmentGrade, ContextRef::Module(cm.id)) {
        return Err(deny(decision, AppError::forbidden("access_denied", "access not allowed")));
    }
    debug!(target: "filegate::gate", cm = cm.id, "grader access to submission");
    Ok(decision)
}

/// Stage 7: files of activity modules render inline only when the module
/// declares them trusted.
pub fn module_trust(ctx: &GateContext<'_>, path: &VirtualPath, decision: AccessDecision) -> StageResult {
    if path.len() < 3 || !path.namespace_is(NS_MODDATA) {
        return Ok(decision);
    }
    let module = sanitize_module_name(path.module_type().unwrap_or_default());
    if !ctx.host.modules.is_installed(&module) {
        return Err(deny(decision, AppError::not_found("module_not_installed", "file not found")));
    }
    if decision.force_download() {
        return Ok(decision);
    }
    match ctx.host.modules.trust(&module) {
        Some(true) => Ok(decision),
        Some(false) | None => {
            debug!(target: "filegate::gate", module = %module, "untrusted module data, forcing download");
            Ok(decision.forcing_download())
        }
    }
}

/// Stage 8: blog attachments never render inline.
pub fn blog_download(scope: &ResolvedScope, decision: AccessDecision) -> AccessDecision {
    match scope {
        ResolvedScope::Blog => decision.forcing_download(),
        ResolvedScope::Course(_) => decision,
    }
}

/// Stage 9: files referenced by hidden legacy resources. Only the `resource`
/// module is checked.
pub fn hidden_resource(ctx: &GateContext<'_>, scope: &ResolvedScope, path: &VirtualPath, user: Option<&Principal>, decision: AccessDecision) -> StageResult {
    if !ctx.config.prevent_access_to_hidden_files || path.len() < 2 {
        return Ok(decision);
    }
    let ResolvedScope::Course(course) = scope else { return Ok(decision); };
    let other_module_data = path.namespace_is(NS_MODDATA)
        && !path.module_type().map(|m| m.eq_ignore_ascii_case(LEGACY_RESOURCE_MODULE)).unwrap_or(false);
    if other_module_data {
        return Ok(decision);
    }
    if ctx.host.capabilities.has_capability(user, Capability::ViewHiddenActivities, ContextRef::Course(course.id)) {
        return Ok(decision);
    }
    let reference = path.reference();
    let query = crate::host::HiddenResourceQuery { course_id: course.id, reference: &reference };
    if ctx.host.hidden_resources.count_hidden(&query) > 0 {
        return Err(deny(decision, AppError::forbidden("access_denied", "access not allowed")));
    }
    Ok(decision)
}
