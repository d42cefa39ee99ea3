//! Contracts the gate relies on from the surrounding site: course lookup,
//! capability checks, enrolment, course-module lookup and hidden-resource
//! records. `catalog::SiteCatalog` is the in-memory implementation shipped
//! with the server.

pub mod catalog;
pub mod modules;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::identity::Principal;
pub use catalog::SiteCatalog;
pub use modules::{ModuleHandler, ModuleRegistry, TrustPredicate, sanitize_module_name};

/// Owner scope of course files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: u64,
    #[serde(default)]
    pub short_name: String,
    #[serde(default = "default_true")]
    pub visible: bool,
}

/// One activity placed in a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseModule {
    pub id: u64,
    pub module: String,
    pub instance: u64,
    pub course_id: u64,
    #[serde(default = "default_true")]
    pub visible: bool,
}

pub(crate) fn default_true() -> bool { true }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    SiteBackup,
    AssignmentGrade,
    ViewHiddenActivities,
    CourseView,
    ViewHiddenCourses,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::SiteBackup => "moodle/site:backup",
            Capability::AssignmentGrade => "mod/assignment:grade",
            Capability::ViewHiddenActivities => "moodle/course:viewhiddenactivities",
            Capability::CourseView => "moodle/course:view",
            Capability::ViewHiddenCourses => "moodle/course:viewhiddencourses",
        }
    }
}

/// Where a capability is evaluated. Module contexts sit below their course,
/// courses below the system context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextRef {
    System,
    Course(u64),
    Module(u64),
}

/// Bound parameters of the hidden legacy-resource lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenResourceQuery<'a> {
    pub course_id: u64,
    pub reference: &'a str,
}

pub trait ScopeRepository: Send + Sync {
    fn find_course(&self, id: u64) -> Option<Course>;
}

pub trait CapabilityChecker: Send + Sync {
    fn has_capability(&self, user: Option<&Principal>, cap: Capability, ctx: ContextRef) -> bool;
}

pub trait EnrolmentChecker: Send + Sync {
    fn is_enrolled(&self, user_id: u64, course_id: u64) -> bool;
}

pub trait CourseModuleLookup: Send + Sync {
    fn find_instance(&self, module: &str, instance: u64, course_id: u64) -> Option<CourseModule>;
}

pub trait HiddenResourceStore: Send + Sync {
    fn count_hidden(&self, query: &HiddenResourceQuery<'_>) -> usize;
}

/// Bundle of collaborators handed to the gate.
#[derive(Clone)]
pub struct Host {
    pub scopes: Arc<dyn ScopeRepository>,
    pub capabilities: Arc<dyn CapabilityChecker>,
    pub enrolments: Arc<dyn EnrolmentChecker>,
    pub course_modules: Arc<dyn CourseModuleLookup>,
    pub hidden_resources: Arc<dyn HiddenResourceStore>,
    pub modules: Arc<ModuleRegistry>,
}

impl Host {
    pub fn from_catalog(catalog: Arc<SiteCatalog>) -> Host {
        let modules = Arc::new(catalog.module_registry());
        Host {
            scopes: catalog.clone(),
            capabilities: catalog.clone(),
            enrolments: catalog.clone(),
            course_modules: catalog.clone(),
            hidden_resources: catalog,
            modules,
        }
    }
}
