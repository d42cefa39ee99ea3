use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// How widely blog entries (and therefore blog attachments) are visible.
/// Ordered from most restrictive to most open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum BlogLevel {
    Disabled,
    User,
    Group,
    Course,
    Site,
    Global,
}

impl BlogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "0" => Some(BlogLevel::Disabled),
            "user" | "1" => Some(BlogLevel::User),
            "group" | "2" => Some(BlogLevel::Group),
            "course" | "3" => Some(BlogLevel::Course),
            "site" | "4" => Some(BlogLevel::Site),
            "global" | "5" => Some(BlogLevel::Global),
            _ => None,
        }
    }
}

/// Server-wide settings. Unspecified values fall back to `Default`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Root folder all virtual paths are resolved under.
    pub data_root: PathBuf,
    /// Site catalog JSON; `None` means `<data_root>/.catalog.json`.
    pub catalog: Option<PathBuf>,
    pub http_port: u16,
    /// Seconds files may stay in browser and proxy caches.
    pub file_lifetime_secs: u64,
    /// Id of the front-page course that anonymous visitors may read.
    pub site_course_id: u64,
    pub blog_level: BlogLevel,
    pub force_login: bool,
    pub prevent_access_to_hidden_files: bool,
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("filedata"),
            catalog: None,
            http_port: 7878,
            file_lifetime_secs: 86_400,
            site_course_id: 1,
            blog_level: BlogLevel::Site,
            force_login: false,
            prevent_access_to_hidden_files: false,
            session_ttl_secs: 60 * 60,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<ServerConfig> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from '{}'", path.display()))?;
        let cfg = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config from '{}'", path.display()))?;
        Ok(cfg)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog.clone().unwrap_or_else(|| self.data_root.join(".catalog.json"))
    }

    /// Overlay `FILEGATE_*` environment variables through a lookup function.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FILEGATE_DATA_ROOT") { self.data_root = PathBuf::from(v); }
        if let Some(v) = lookup("FILEGATE_CATALOG") { self.catalog = Some(PathBuf::from(v)); }
        if let Some(p) = lookup("FILEGATE_HTTP_PORT").and_then(|v| v.parse::<u16>().ok()) { self.http_port = p; }
        if let Some(n) = lookup("FILEGATE_FILE_LIFETIME").and_then(|v| v.parse::<u64>().ok()) { self.file_lifetime_secs = n; }
        if let Some(n) = lookup("FILEGATE_SITE_COURSE_ID").and_then(|v| v.parse::<u64>().ok()) { self.site_course_id = n; }
        if let Some(l) = lookup("FILEGATE_BLOG_LEVEL").and_then(|v| BlogLevel::parse(&v)) { self.blog_level = l; }
        if let Some(b) = lookup("FILEGATE_FORCE_LOGIN").and_then(|v| parse_bool(&v)) { self.force_login = b; }
        if let Some(b) = lookup("FILEGATE_PREVENT_HIDDEN_FILES").and_then(|v| parse_bool(&v)) { self.prevent_access_to_hidden_files = b; }
        if let Some(n) = lookup("FILEGATE_SESSION_TTL").and_then(|v| v.parse::<u64>().ok()) { self.session_ttl_secs = n; }
    }
}

pub fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
