//! Virtual path resolution.
//!
//! A request addresses a file as `/<courseid|blog>/<namespace>/.../<filename>`.
//! Parsing happens before any authorization check so malformed input never
//! reaches a collaborator.

pub mod host_path;

use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

pub const BLOG_SEGMENT: &str = "blog";
pub const NS_MODDATA: &str = "moddata";
pub const NS_BACKUPDATA: &str = "backupdata";

/// Owner scope as written in the first path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Blog,
    /// `segment` keeps the exact request text so the loaded course id can be
    /// compared against it in canonical form.
    Course { id: u64, segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualPath {
    raw: String,
    scope: Scope,
    segments: Vec<String>,
}

/// Pick the relative path from path-info, falling back to the `?file=` form.
pub fn file_argument(path_info: Option<&str>, file_param: Option<&str>) -> Option<String> {
    let from_info = path_info.filter(|s| !s.is_empty()).map(|s| {
        if s.starts_with('/') { s.to_string() } else { format!("/{}", s) }
    });
    from_info.or_else(|| file_param.filter(|s| !s.is_empty()).map(|s| s.to_string()))
}

impl VirtualPath {
    pub fn parse(raw: &str) -> AppResult<VirtualPath> {
        if raw.is_empty() {
            return Err(AppError::malformed("no_arguments", "no valid arguments supplied"));
        }
        // Backup/restore links are always absolute; never guess a base for relative ones.
        if !raw.starts_with('/') {
            return Err(AppError::malformed("no_leading_slash", "path does not start with slash"));
        }
        let mut segments: Vec<String> = Vec::new();
        for seg in raw.trim_matches('/').split('/') {
            if seg.is_empty() || seg == "." { continue; }
            if seg == ".." || seg.contains('\\') || seg.contains('\0') {
                return Err(AppError::malformed("unsafe_segment", "path contains an unsafe segment"));
            }
            segments.push(seg.to_string());
        }
        let Some(first) = segments.first() else {
            return Err(AppError::malformed("no_arguments", "no valid arguments supplied"));
        };
        let scope = if first == BLOG_SEGMENT {
            Scope::Blog
        } else {
            match first.parse::<u64>() {
                Ok(id) => Scope::Course { id, segment: first.clone() },
                Err(_) => return Err(AppError::malformed("invalid_course_id", "owner segment is not a course id")),
            }
        };
        Ok(VirtualPath { raw: raw.to_string(), scope, segments })
    }

    pub fn raw(&self) -> &str { &self.raw }
    pub fn scope(&self) -> &Scope { &self.scope }
    pub fn segments(&self) -> &[String] { &self.segments }
    pub fn len(&self) -> usize { self.segments.len() }
    pub fn is_empty(&self) -> bool { self.segments.is_empty() }
    pub fn is_blog(&self) -> bool { matches!(self.scope, Scope::Blog) }

    pub fn namespace(&self) -> Option<&str> { self.segments.get(1).map(|s| s.as_str()) }
    pub fn module_type(&self) -> Option<&str> { self.segments.get(2).map(|s| s.as_str()) }
    pub fn instance_segment(&self) -> Option<&str> { self.segments.get(3).map(|s| s.as_str()) }
    pub fn owner_uid_segment(&self) -> Option<&str> { self.segments.get(4).map(|s| s.as_str()) }

    /// Display filename: always the last segment.
    pub fn filename(&self) -> &str {
        self.segments.last().map(|s| s.as_str()).unwrap_or_default()
    }

    /// Case-insensitive namespace test.
    pub fn namespace_is(&self, ns: &str) -> bool {
        self.namespace().map(|n| n.eq_ignore_ascii_case(ns)).unwrap_or(false)
    }

    /// Path below the owner segment, as stored in legacy resource references.
    pub fn reference(&self) -> String {
        self.segments.iter().skip(1).cloned().collect::<Vec<_>>().join("/")
    }

    pub fn with_index(&self, index_name: &str) -> VirtualPath {
        let mut next = self.clone();
        next.segments.push(index_name.to_string());
        next
    }

    /// Map onto the data root, refusing anything that would land outside it.
    pub fn to_fs_path(&self, data_root: &Path) -> AppResult<PathBuf> {
        let mut p = data_root.to_path_buf();
        for seg in &self.segments {
            p.push(seg);
        }
        match host_path::is_within_root(&p, data_root) {
            Ok(true) => Ok(p),
            Ok(false) => Err(AppError::malformed("outside_data_root", "path escapes the data root")),
            Err(e) => Err(AppError::internal("path_normalize".to_string(), e.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
