//! HTTP tests driving the full router

use super::*;
use crate::config::BootstrapAdmin;
use crate::db::{create_test_pool, migrations};
use crate::models::ArticleStatus;
use crate::services::{GenerationError, RegisterInput};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use tower::ServiceExt;

/// Generator that answers immediately, or fails when told to
struct StubGenerator {
    fail: bool,
}

#[async_trait]
impl ContentGenerator for StubGenerator {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, title: &str) -> Result<String, GenerationError> {
        if self.fail {
            Err(GenerationError::AllFailed(
                "openai: No API key configured for openai".to_string(),
            ))
        } else {
            Ok(format!("All about {}", title))
        }
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    pool: DynDatabasePool,
}

impl TestApp {
    async fn new(fail: bool) -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let state = build_state(Config::default(), pool.clone(), Arc::new(StubGenerator { fail }))
            .expect("Failed to build state");
        state
            .user_service
            .ensure_bootstrap_admin(&BootstrapAdmin::default())
            .await
            .unwrap();
        for name in ["alice", "bob"] {
            state
                .user_service
                .register(RegisterInput::new(name, "password123"))
                .await
                .unwrap();
        }

        Self {
            router: build_router(state.clone()),
            state,
            pool,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Log in and return the `session=...` cookie pair
    async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .send(form_request("/login", &format!("username={}&password={}", username, password), None))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        set_cookie(&response, "session").expect("login should set a session cookie")
    }

    async fn user_id(&self, username: &str) -> i64 {
        sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(self.pool.as_sqlite().unwrap())
            .await
            .unwrap()
    }

    async fn add_article(&self, username: &str, title: &str) -> i64 {
        let user_id = self.user_id(username).await;
        self.state
            .article_service
            .add_titles(user_id, title)
            .await
            .unwrap()
            .remove(0)
            .id
    }

    async fn article_status(&self, id: i64) -> (String, Option<String>) {
        sqlx::query_as("SELECT status, error FROM articles WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool.as_sqlite().unwrap())
            .await
            .unwrap()
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn form_request(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

const BOUNDARY: &str = "quillboard-test-boundary";

/// Multipart body with one part; `filename` of `None` makes it a plain field
fn multipart_request(
    uri: &str,
    field: &str,
    filename: Option<&str>,
    data: &str,
    cookie: &str,
) -> Request<Body> {
    let disposition = match filename {
        Some(filename) => format!(
            "form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/csv",
            field, filename
        ),
        None => format!("form-data; name=\"{}\"", field),
    };
    let body = format!(
        "--{b}\r\nContent-Disposition: {d}\r\n\r\n{data}\r\n--{b}--\r\n",
        b = BOUNDARY,
        d = disposition,
        data = data
    );
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::COOKIE, cookie)
        .body(Body::from(body))
        .unwrap()
}

/// `name=value` pair from the response's `Set-Cookie` headers, if non-empty
fn set_cookie(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{}=", name)) && pair.len() > name.len() + 1)
        .map(str::to_string)
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_dashboard_requires_login() {
    let app = TestApp::new(false).await;

    let response = app.send(get("/", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_tampered_session_cookie_is_rejected() {
    let app = TestApp::new(false).await;
    let cookie = app.login("alice", "password123").await;
    let tampered = format!("{}0", cookie);

    let response = app.send(get("/", Some(&tampered))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_invalid_login_sets_flash_not_session() {
    let app = TestApp::new(false).await;

    let response = app
        .send(form_request("/login", "username=alice&password=wrong-password", None))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert!(set_cookie(&response, "session").is_none());

    let flash = set_cookie(&response, "flash").unwrap();
    let page = app.send(get("/login", Some(&flash))).await;
    assert!(body_text(page).await.contains("Invalid username or password"));
}

#[tokio::test]
async fn test_login_page_renders() {
    let app = TestApp::new(false).await;

    let response = app.send(get("/login", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains(r#"action="/login""#));
}

#[tokio::test]
async fn test_dashboard_lists_only_own_articles() {
    let app = TestApp::new(false).await;
    app.add_article("alice", "Alice writes about lifetimes").await;
    app.add_article("bob", "Bob writes about traits").await;
    let cookie = app.login("alice", "password123").await;

    let response = app.send(get("/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Alice writes about lifetimes"));
    assert!(!html.contains("Bob writes about traits"));
}

#[tokio::test]
async fn test_add_title_creates_pending_articles() {
    let app = TestApp::new(false).await;
    let cookie = app.login("alice", "password123").await;

    let response = app
        .send(form_request("/add_title", "titles=First%0A%0ASecond%0A", Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let user_id = app.user_id("alice").await;
    let articles = app.state.article_service.list_for_user(user_id).await.unwrap();
    assert_eq!(articles.len(), 2);
    assert!(articles.iter().all(|a| a.status == ArticleStatus::Pending));
}

#[tokio::test]
async fn test_add_title_without_titles_flashes_error() {
    let app = TestApp::new(false).await;
    let cookie = app.login("alice", "password123").await;

    let response = app
        .send(form_request("/add_title", "titles=%20%0A", Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let flash = set_cookie(&response, "flash").unwrap();
    assert!(flash.contains("No%20titles%20provided"));
}

#[tokio::test]
async fn test_upload_titles_creates_articles_from_csv() {
    let app = TestApp::new(false).await;
    let cookie = app.login("alice", "password123").await;

    let csv = "title\nCSV first\n\"CSV, second\"\n";
    let response = app
        .send(multipart_request("/upload_titles", "file", Some("titles.csv"), csv, &cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(set_cookie(&response, "flash")
        .unwrap()
        .contains("Uploaded%202%20title%28s%29%20successfully"));

    let user_id = app.user_id("alice").await;
    let mut titles: Vec<String> = app
        .state
        .article_service
        .list_for_user(user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["CSV first", "CSV, second"]);
}

#[tokio::test]
async fn test_upload_titles_without_file() {
    let app = TestApp::new(false).await;
    let cookie = app.login("alice", "password123").await;

    let response = app
        .send(multipart_request("/upload_titles", "notes", None, "hello", &cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(set_cookie(&response, "flash").unwrap().contains("No%20file%20uploaded"));

    let response = app
        .send(multipart_request("/upload_titles", "file", Some(""), "", &cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(set_cookie(&response, "flash").unwrap().contains("No%20file%20selected"));

    let user_id = app.user_id("alice").await;
    assert!(app.state.article_service.list_for_user(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_titles_header_only_flashes_error() {
    let app = TestApp::new(false).await;
    let cookie = app.login("alice", "password123").await;

    let response = app
        .send(multipart_request("/upload_titles", "file", Some("titles.csv"), "title\n", &cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(set_cookie(&response, "flash").unwrap().contains("No%20titles%20provided"));
}

#[tokio::test]
async fn test_upload_titles_requires_login() {
    let app = TestApp::new(false).await;

    let response = app
        .send(multipart_request("/upload_titles", "file", Some("titles.csv"), "title\nx\n", ""))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_generate_requires_session() {
    let app = TestApp::new(false).await;
    let id = app.add_article("alice", "Topic").await;

    let response = app.send(post(&format!("/generate/{}", id), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_generate_success() {
    let app = TestApp::new(false).await;
    let id = app.add_article("alice", "Borrowing").await;
    let cookie = app.login("alice", "password123").await;

    let response = app.send(post(&format!("/generate/{}", id), Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["article_id"], id);
    assert_eq!(json["content"], "All about Borrowing");

    let (status, error) = app.article_status(id).await;
    assert_eq!(status, "completed");
    assert!(error.is_none());
}

#[tokio::test]
async fn test_generate_failure_is_persisted() {
    let app = TestApp::new(true).await;
    let id = app.add_article("alice", "Borrowing").await;
    let cookie = app.login("alice", "password123").await;

    let response = app.send(post(&format!("/generate/{}", id), Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "GENERATION_FAILED");

    let (status, error) = app.article_status(id).await;
    assert_eq!(status, "failed");
    assert!(error.unwrap().contains("No API key configured"));

    let response = app.send(get(&format!("/status/{}", id), Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["article_id"], id);
    assert_eq!(json["status"], "failed");
}

#[tokio::test]
async fn test_generate_on_foreign_article_is_forbidden() {
    let app = TestApp::new(false).await;
    let id = app.add_article("alice", "Private").await;
    let cookie = app.login("bob", "password123").await;

    let response = app.send(post(&format!("/generate/{}", id), Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.article_status(id).await.0, "pending");

    let response = app.send(get(&format!("/status/{}", id), Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_generate_missing_article() {
    let app = TestApp::new(false).await;
    let cookie = app.login("alice", "password123").await;

    let response = app.send(post("/generate/9999", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generate_while_processing_conflicts() {
    let app = TestApp::new(false).await;
    let id = app.add_article("alice", "Busy").await;
    sqlx::query("UPDATE articles SET status = 'processing' WHERE id = ?")
        .bind(id)
        .execute(app.pool.as_sqlite().unwrap())
        .await
        .unwrap();
    let cookie = app.login("alice", "password123").await;

    let response = app.send(post(&format!("/generate/{}", id), Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(app.article_status(id).await.0, "processing");
}

#[tokio::test]
async fn test_api_keys_admin_only() {
    let app = TestApp::new(false).await;
    let cookie = app.login("alice", "password123").await;

    let response = app
        .send(form_request("/api/keys", "service=openai&key=sk-test", Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(form_request("/api/keys", "service=openai&key=sk-test", None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_key_upsert_twice_keeps_one_row() {
    let app = TestApp::new(false).await;
    let cookie = app.login("admin", "admin").await;

    for _ in 0..2 {
        let response = app
            .send(form_request("/api/keys", "service=openai&key=sk-test-1234", Some(&cookie)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "API key updated successfully");
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_keys WHERE service = 'openai'")
        .fetch_one(app.pool.as_sqlite().unwrap())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_api_key_missing_fields() {
    let app = TestApp::new(false).await;
    let cookie = app.login("admin", "admin").await;

    let response = app
        .send(form_request("/api/keys", "service=openai", Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["message"], "Missing required fields");
}

#[tokio::test]
async fn test_login_resolves_user_identity() {
    let app = TestApp::new(false).await;

    let response = app
        .send(form_request("/login", "username=admin&password=admin", None))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let admin = set_cookie(&response, "session").unwrap();

    let response = app.send(get("/", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(r#"<span class="navbar-text">admin</span>"#));
    assert!(html.contains(r#"href="/settings""#));
    let response = app.send(get("/settings", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(form_request("/login", "username=alice&password=password123", None))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let alice = set_cookie(&response, "session").unwrap();

    let response = app.send(get("/", Some(&alice))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(r#"<span class="navbar-text">alice</span>"#));
    assert!(!html.contains(r#"href="/settings""#));
    let response = app.send(get("/settings", Some(&alice))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_settings_page() {
    let app = TestApp::new(false).await;

    let cookie = app.login("alice", "password123").await;
    let response = app.send(get("/settings", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(set_cookie(&response, "flash").unwrap().contains("Access%20denied"));

    let cookie = app.login("admin", "admin").await;
    let response = app.send(get("/settings", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("api-key-form"));
    assert!(html.contains("anthropic"));
}

#[tokio::test]
async fn test_register_logs_in() {
    let app = TestApp::new(false).await;

    let response = app
        .send(form_request("/register", "username=carol&password=longenough", None))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cookie = set_cookie(&response, "session").unwrap();

    let response = app.send(get("/", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_short_password_rejected() {
    let app = TestApp::new(false).await;

    let response = app
        .send(form_request("/register", "username=carol&password=short", None))
        .await;
    assert_eq!(location(&response), "/register");
    assert!(set_cookie(&response, "session").is_none());
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let app = TestApp::new(false).await;
    let cookie = app.login("alice", "password123").await;

    let response = app.send(get("/logout", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = app.send(get("/", Some(&cookie))).await;
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_static_script_served() {
    let app = TestApp::new(false).await;

    let response = app.send(get("/static/js/main.js", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/javascript; charset=utf-8"
    );
    assert!(body_text(response).await.contains("generate-btn"));
}
