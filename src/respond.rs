//! File responder: final existence check, session release, header policy and
//! streamed body.

use std::path::PathBuf;
use std::time::SystemTime;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use futures_util::TryStreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::gate::{AccessDecision, Authorized};
use crate::identity::SessionLease;

/// A file that passed every gate stage and exists on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub fs_path: PathBuf,
    pub filename: String,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

fn http_date(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Re-check existence after gating; the index stage may have changed the path.
pub async fn resolve_file(auth: &Authorized) -> AppResult<ResolvedFile> {
    let meta = match tokio::fs::metadata(&auth.fs_path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::not_found("file_not_found", "file not found"));
        }
        Err(e) => return Err(e.into()),
    };
    if !meta.is_file() {
        return Err(AppError::not_found("file_not_found", "file not found"));
    }
    Ok(ResolvedFile {
        fs_path: auth.fs_path.clone(),
        filename: auth.path.filename().to_string(),
        len: meta.len(),
        modified: meta.modified().ok(),
    })
}

pub fn apply_cache_headers(headers: &mut HeaderMap, decision: &AccessDecision, now: DateTime<Utc>) {
    let lifetime = decision.cache_lifetime_secs();
    if lifetime > 0 {
        let secs = i64::try_from(lifetime).unwrap_or(i64::MAX);
        let expires = Duration::try_seconds(secs)
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if let Ok(v) = HeaderValue::from_str(&format!("max-age={}", lifetime)) {
            headers.insert(header::CACHE_CONTROL, v);
        }
        if let Ok(v) = HeaderValue::from_str(&http_date(expires)) {
            headers.insert(header::EXPIRES, v);
        }
        headers.insert(header::PRAGMA, HeaderValue::from_static(""));
    } else {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("private, must-revalidate, pre-check=0, post-check=0, max-age=0"),
        );
        headers.insert(header::EXPIRES, HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    }
}

/// Error pages are never cached, whatever lifetime the gate had reached.
pub fn apply_error_cache_headers(headers: &mut HeaderMap) {
    apply_cache_headers(headers, &AccessDecision::new(0, false), Utc::now());
}

/// `attachment` when downloading is forced, `inline` otherwise. Names outside
/// printable ASCII get an RFC 5987 `filename*` next to a sanitized fallback.
pub fn content_disposition(filename: &str, force_download: bool) -> String {
    let kind = if force_download { "attachment" } else { "inline" };
    let ascii_safe = filename.chars().all(|c| c.is_ascii() && !c.is_ascii_control());
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    if ascii_safe {
        format!("{}; filename=\"{}\"", kind, fallback)
    } else {
        format!("{}; filename=\"{}\"; filename*=UTF-8''{}", kind, fallback, urlencoding::encode(filename))
    }
}

/// Stream an authorized file. The session lease is dropped once the file is
/// open and before the first body byte goes out.
pub async fn send_file(file: ResolvedFile, decision: AccessDecision, lease: Option<SessionLease>) -> AppResult<Response> {
    let handle = tokio::fs::File::open(&file.fs_path).await?;
    if let Some(l) = lease {
        l.release();
    }

    let mut headers = HeaderMap::new();
    let mime = mime_guess::from_path(&file.filename).first_or_octet_stream();
    if let Ok(v) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, v);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file.len));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none"));
    if let Some(modified) = file.modified {
        let dt: DateTime<Utc> = modified.into();
        if let Ok(v) = HeaderValue::from_str(&http_date(dt)) {
            headers.insert(header::LAST_MODIFIED, v);
        }
    }
    apply_cache_headers(&mut headers, &decision, Utc::now());
    let disposition = content_disposition(&file.filename, decision.force_download());
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| AppError::internal("bad_header".to_string(), e.to_string()))?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    info!(
        target: "filegate::respond",
        file = %file.fs_path.display(),
        size = file.len,
        force_download = decision.force_download(),
        lifetime = decision.cache_lifetime_secs(),
        "sending file"
    );
    // A client that disconnects mid-transfer simply drops the stream.
    let path = file.fs_path;
    let stream = ReaderStream::new(handle).inspect_err(move |e| {
        warn!(target: "filegate::respond", file = %path.display(), "read failed mid-transfer: {e}");
    });
    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

/// Existence check plus streaming for a gate outcome.
pub async fn serve_authorized(auth: Authorized, lease: Option<SessionLease>) -> AppResult<Response> {
    let file = resolve_file(&auth).await?;
    debug!(target: "filegate::respond", filename = %file.filename, "file resolved");
    send_file(file, auth.decision, lease).await
}
