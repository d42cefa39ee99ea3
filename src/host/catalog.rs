//! JSON-backed site catalog: courses, users, enrolments, role assignments,
//! installed modules, course modules and legacy resource records.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::modules::{ModuleHandler, ModuleRegistry};
use super::{
    Capability, CapabilityChecker, ContextRef, Course, CourseModule, CourseModuleLookup, EnrolmentChecker,
    HiddenResourceQuery, HiddenResourceStore, ScopeRepository,
};
use crate::identity::Principal;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogUser {
    pub id: u64,
    pub username: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    #[serde(default)]
    pub suspended: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrolment {
    pub user_id: u64,
    pub course_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: u64,
    pub role: String,
    pub context: ContextRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledModule {
    pub name: String,
    /// `None`: module has no trust predicate.
    #[serde(default)]
    pub trusted: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: u64,
    pub course_id: u64,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub reference: String,
}

fn default_kind() -> String { "file".into() }

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteCatalog {
    pub courses: Vec<Course>,
    pub users: Vec<CatalogUser>,
    pub enrolments: Vec<Enrolment>,
    /// Role name -> capability names.
    pub roles: BTreeMap<String, BTreeSet<String>>,
    pub role_assignments: Vec<RoleAssignment>,
    pub modules: Vec<InstalledModule>,
    pub course_modules: Vec<CourseModule>,
    pub resources: Vec<ResourceRecord>,
}

impl SiteCatalog {
    pub fn load(path: &Path) -> anyhow::Result<SiteCatalog> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading site catalog from '{}'", path.display()))?;
        let catalog = serde_json::from_str(&raw)
            .with_context(|| format!("parsing site catalog from '{}'", path.display()))?;
        Ok(catalog)
    }

    pub fn find_user_by_name(&self, username: &str) -> Option<&CatalogUser> {
        self.users.iter().find(|u| u.username.eq_ignore_ascii_case(username))
    }

    pub fn module_registry(&self) -> ModuleRegistry {
        let mut reg = ModuleRegistry::new();
        for m in &self.modules {
            let handler = match m.trusted {
                Some(t) => ModuleHandler::with_trust(move || t),
                None => ModuleHandler::without_trust(),
            };
            reg.register(&m.name, handler);
        }
        reg
    }

    /// Context and its ancestors, innermost first.
    fn context_chain(&self, ctx: ContextRef) -> Vec<ContextRef> {
        match ctx {
            ContextRef::System => vec![ContextRef::System],
            ContextRef::Course(id) => vec![ContextRef::Course(id), ContextRef::System],
            ContextRef::Module(cmid) => {
                let mut chain = vec![ContextRef::Module(cmid)];
                if let Some(cm) = self.course_modules.iter().find(|cm| cm.id == cmid) {
                    chain.push(ContextRef::Course(cm.course_id));
                }
                chain.push(ContextRef::System);
                chain
            }
        }
    }

    fn role_grants(&self, role: &str, cap: Capability) -> bool {
        self.roles.get(role).map(|caps| caps.contains(cap.as_str())).unwrap_or(false)
    }
}

impl ScopeRepository for SiteCatalog {
    fn find_course(&self, id: u64) -> Option<Course> {
        self.courses.iter().find(|c| c.id == id).cloned()
    }
}

impl CapabilityChecker for SiteCatalog {
    fn has_capability(&self, user: Option<&Principal>, cap: Capability, ctx: ContextRef) -> bool {
        let Some(user) = user else { return false; };
        let chain = self.context_chain(ctx);
        self.role_assignments
            .iter()
            .filter(|ra| ra.user_id == user.user_id && chain.contains(&ra.context))
            .any(|ra| self.role_grants(&ra.role, cap))
    }
}

impl EnrolmentChecker for SiteCatalog {
    fn is_enrolled(&self, user_id: u64, course_id: u64) -> bool {
        self.enrolments.iter().any(|e| e.user_id == user_id && e.course_id == course_id)
    }
}

impl CourseModuleLookup for SiteCatalog {
    fn find_instance(&self, module: &str, instance: u64, course_id: u64) -> Option<CourseModule> {
        self.course_modules
            .iter()
            .find(|cm| cm.module == module && cm.instance == instance && cm.course_id == course_id)
            .cloned()
    }
}

impl HiddenResourceStore for SiteCatalog {
    fn count_hidden(&self, query: &HiddenResourceQuery<'_>) -> usize {
        self.resources
            .iter()
            .filter(|r| r.course_id == query.course_id && r.kind == "file" && r.reference == query.reference)
            .filter(|r| {
                self.course_modules
                    .iter()
                    .any(|cm| cm.module == "resource" && cm.instance == r.id && !cm.visible)
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "courses": [{"id": 1, "short_name": "site"}, {"id": 2, "short_name": "bio101", "visible": false}],
        "enrolments": [{"user_id": 10, "course_id": 2}],
        "roles": {"editingteacher": ["moodle/site:backup", "mod/assignment:grade"]},
        "role_assignments": [
            {"user_id": 20, "role": "editingteacher", "context": {"course": 2}},
            {"user_id": 30, "role": "editingteacher", "context": {"module": 11}}
        ],
        "modules": [{"name": "assignment"}, {"name": "resource", "trusted": true}],
        "course_modules": [
            {"id": 11, "module": "assignment", "instance": 7, "course_id": 2},
            {"id": 12, "module": "resource", "instance": 5, "course_id": 2, "visible": false},
            {"id": 13, "module": "resource", "instance": 6, "course_id": 2}
        ],
        "resources": [
            {"id": 5, "course_id": 2, "reference": "docs/hidden.pdf"},
            {"id": 6, "course_id": 2, "reference": "docs/shown.pdf"}
        ]
    }"#;

    fn user(id: u64) -> Principal { Principal { user_id: id, username: format!("u{}", id), ..Default::default() } }

    #[test]
    fn parses_sample_with_defaults() {
        let c: SiteCatalog = serde_json::from_str(SAMPLE).unwrap();
        assert!(c.find_course(1).unwrap().visible);
        assert!(!c.find_course(2).unwrap().visible);
        assert!(c.find_course(3).is_none());
        assert!(c.is_enrolled(10, 2));
        assert!(!c.is_enrolled(10, 1));
    }

    #[test]
    fn capabilities_inherit_from_course_to_module() {
        let c: SiteCatalog = serde_json::from_str(SAMPLE).unwrap();
        // course-level teacher sees into module 11
        assert!(c.has_capability(Some(&user(20)), Capability::AssignmentGrade, ContextRef::Module(11)));
        assert!(c.has_capability(Some(&user(30)), Capability::AssignmentGrade, ContextRef::Module(11)));
        // module-level assignment does not leak up to the course
        assert!(!c.has_capability(Some(&user(30)), Capability::SiteBackup, ContextRef::Course(2)));
        assert!(!c.has_capability(None, Capability::SiteBackup, ContextRef::Course(2)));
        assert!(!c.has_capability(Some(&user(10)), Capability::SiteBackup, ContextRef::Course(2)));
    }

    #[test]
    fn hidden_resources_match_exact_reference_only() {
        let c: SiteCatalog = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(c.count_hidden(&HiddenResourceQuery { course_id: 2, reference: "docs/hidden.pdf" }), 1);
        assert_eq!(c.count_hidden(&HiddenResourceQuery { course_id: 2, reference: "docs/shown.pdf" }), 0);
        assert_eq!(c.count_hidden(&HiddenResourceQuery { course_id: 2, reference: "docs/hidden.pdf' OR '1'='1" }), 0);
        assert_eq!(c.count_hidden(&HiddenResourceQuery { course_id: 3, reference: "docs/hidden.pdf" }), 0);
    }

    #[test]
    fn registry_from_modules() {
        let c: SiteCatalog = serde_json::from_str(SAMPLE).unwrap();
        let reg = c.module_registry();
        assert!(reg.is_installed("assignment"));
        assert_eq!(reg.trust("assignment"), None);
        assert_eq!(reg.trust("resource"), Some(true));
        assert!(c.find_instance("assignment", 7, 2).is_some());
        assert!(c.find_instance("assignment", 7, 1).is_none());
    }
}
