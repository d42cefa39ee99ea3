use std::fs;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use filegate::config::ServerConfig;
use filegate::host::SiteCatalog;
use filegate::server::{router, AppState};

fn catalog_json(password_hash: &str) -> String {
    format!(
        r#"{{
        "courses": [{{"id": 1, "short_name": "site"}}, {{"id": 2, "short_name": "bio101"}}],
        "users": [
            {{"id": 10, "username": "student", "password_hash": "{h}"}},
            {{"id": 11, "username": "gone", "password_hash": "{h}", "suspended": true}},
            {{"id": 12, "username": "visitor", "password_hash": "{h}"}}
        ],
        "enrolments": [{{"user_id": 10, "course_id": 2}}],
        "modules": [{{"name": "assignment"}}, {{"name": "resource", "trusted": true}}],
        "course_modules": [{{"id": 11, "module": "assignment", "instance": 7, "course_id": 2}}]
    }}"#,
        h = password_hash
    )
}

fn app(tmp: &tempfile::TempDir) -> Router {
    let root = tmp.path();
    fs::create_dir_all(root.join("1")).unwrap();
    fs::create_dir_all(root.join("2/site")).unwrap();
    fs::create_dir_all(root.join("2/moddata/assignment/7/10")).unwrap();
    fs::create_dir_all(root.join("2/moddata/resource/3")).unwrap();
    fs::write(root.join("1/welcome.txt"), b"hello front page").unwrap();
    fs::write(root.join("2/notes.pdf"), b"%PDF-1.4 notes").unwrap();
    fs::write(root.join("2/site/index.html"), b"<h1>bio</h1>").unwrap();
    fs::write(root.join("2/moddata/assignment/7/10/essay.txt"), b"my essay").unwrap();
    fs::write(root.join("2/moddata/resource/3/page.html"), b"<p>page</p>").unwrap();

    let hash = filegate::identity::hash_password("s3cret").unwrap();
    let catalog: SiteCatalog = serde_json::from_str(&catalog_json(&hash)).unwrap();
    let config = ServerConfig { data_root: root.to_path_buf(), ..Default::default() };
    router(AppState::new(config, catalog))
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
    let mut req = Request::builder().uri(uri);
    if let Some(c) = cookie {
        req = req.header(header::COOKIE, c);
    }
    app.clone().oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
}

async fn login(app: &Router, user: &str, password: &str) -> Response {
    let body = serde_json::json!({"username": user, "password": password}).to_string();
    let req = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    app.clone().oneshot(req).await.unwrap()
}

async fn session_cookie(app: &Router) -> String {
    session_cookie_for(app, "student").await
}

async fn session_cookie_for(app: &Router, user: &str) -> String {
    let resp = login(app, user, "s3cret").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let set = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    set.split(';').next().unwrap().to_string()
}

async fn body_string(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn header_str<'a>(resp: &'a Response, name: header::HeaderName) -> &'a str {
    resp.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

#[tokio::test]
async fn slash_arguments_probe() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    let resp = get(&app, "/file.php/testslasharguments", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "test -1 : Incorrect use - slash arguments ok");
}

#[tokio::test]
async fn malformed_requests_are_bad_request() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    for uri in ["/file.php", "/file.php?file=1/welcome.txt", "/file.php/abc/x.txt", "/file.php?file=/2/..%2Fnotes.pdf"] {
        let resp = get(&app, uri, None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "uri {uri}");
        let body: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body["status"], "error");
    }
}

#[tokio::test]
async fn front_page_files_are_public_and_cached() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    let resp = get(&app, "/file.php/1/welcome.txt", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header_str(&resp, header::CACHE_CONTROL), "max-age=86400");
    assert_eq!(header_str(&resp, header::CONTENT_DISPOSITION), "inline; filename=\"welcome.txt\"");
    assert!(header_str(&resp, header::CONTENT_TYPE).starts_with("text/plain"));
    assert_eq!(body_string(resp).await, "hello front page");

    let resp = get(&app, "/file.php?file=/1/welcome.txt&forcedownload=1", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(header_str(&resp, header::CONTENT_DISPOSITION).starts_with("attachment"));
}

#[tokio::test]
async fn course_files_need_login() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    let resp = get(&app, "/file.php/2/notes.pdf", None).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let cookie = session_cookie(&app).await;
    let resp = get(&app, "/file.php/2/notes.pdf", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header_str(&resp, header::CONTENT_TYPE), "application/pdf");
    assert_eq!(body_string(resp).await, "%PDF-1.4 notes");

    let resp = get(&app, "/file.php/2/site", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "<h1>bio</h1>");

    let resp = get(&app, "/file.php/2/missing.txt", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = get(&app, "/file.php/002/notes.pdf", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submissions_stream_uncached_and_as_download() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    let cookie = session_cookie(&app).await;

    let resp = get(&app, "/file.php/2/moddata/assignment/7/10/essay.txt", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(header_str(&resp, header::CACHE_CONTROL).contains("max-age=0"));
    assert_eq!(header_str(&resp, header::PRAGMA), "no-cache");
    assert!(header_str(&resp, header::CONTENT_DISPOSITION).starts_with("attachment"));
    assert_eq!(body_string(resp).await, "my essay");

    let resp = get(&app, "/file.php/2/moddata/assignment/7/12/essay.txt", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(header_str(&resp, header::CACHE_CONTROL).contains("max-age=0"));

    let resp = get(&app, "/file.php/2/moddata/resource/3/page.html", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(header_str(&resp, header::CONTENT_DISPOSITION).starts_with("inline"));

    let resp = get(&app, "/file.php/2/moddata/quiz/1/a.txt", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_rejects_bad_credentials_and_logout_ends_session() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    assert_eq!(login(&app, "student", "wrong").await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(login(&app, "gone", "s3cret").await.status(), StatusCode::UNAUTHORIZED);

    let cookie = session_cookie(&app).await;
    let req = Request::builder()
        .method("POST")
        .uri("/logout")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);
    let resp = get(&app, "/file.php/2/notes.pdf", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

fn assert_not_cacheable(resp: &Response) {
    let cc = header_str(resp, header::CACHE_CONTROL);
    assert!(cc.contains("max-age=0") && !cc.contains("max-age=86400"), "cache-control {cc}");
    assert_eq!(header_str(resp, header::EXPIRES), "Thu, 01 Jan 1970 00:00:00 GMT");
    assert_eq!(header_str(resp, header::PRAGMA), "no-cache");
}

#[tokio::test]
async fn error_responses_are_never_cached() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);

    let resp = get(&app, "/file.php/2/notes.pdf", None).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_not_cacheable(&resp);

    let visitor = session_cookie_for(&app, "visitor").await;
    let resp = get(&app, "/file.php/2/notes.pdf", Some(&visitor)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_not_cacheable(&resp);

    let student = session_cookie(&app).await;
    let resp = get(&app, "/file.php/2/not-uploaded-yet.pdf", Some(&student)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_not_cacheable(&resp);

    let resp = get(&app, "/file.php/abc/x.txt", None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_not_cacheable(&resp);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_directory_out_of_data_root_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    let outside = tempfile::tempdir().unwrap();
    fs::write(outside.path().join("secret.txt"), b"TOP SECRET").unwrap();
    std::os::unix::fs::symlink(outside.path(), tmp.path().join("1").join("link")).unwrap();

    let resp = get(&app, "/file.php/1/link/secret.txt", None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(!body_string(resp).await.contains("TOP SECRET"));
}

#[tokio::test]
async fn session_is_released_before_body_is_read() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    let cookie = session_cookie(&app).await;

    let first = get(&app, "/file.php/2/notes.pdf", Some(&cookie)).await;
    assert_eq!(first.status(), StatusCode::OK);

    // the first body is still unread here
    let second = tokio::time::timeout(Duration::from_secs(5), get(&app, "/file.php/2/site", Some(&cookie)))
        .await
        .expect("second request of the same session must not wait for the first transfer");
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_string(second).await, "<h1>bio</h1>");
    assert_eq!(body_string(first).await, "%PDF-1.4 notes");
}

#[tokio::test]
async fn forcedownload_accepts_any_true_value_and_repeated_keys() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    let resp = get(&app, "/file.php/1/welcome.txt?forcedownload=2", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(header_str(&resp, header::CONTENT_DISPOSITION).starts_with("attachment"));

    let resp = get(&app, "/file.php/1/welcome.txt?forcedownload=1&forcedownload=0", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(header_str(&resp, header::CONTENT_DISPOSITION).starts_with("inline"));

    let resp = get(&app, "/file.php?file=/abc&file=/1/welcome.txt", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "hello front page");
}
