//! Integration tests for authenticated scans

use std::sync::Arc;
use webrecon::output::MemorySink;
use webrecon::{AuthConfig, Engine, ScanConfig, ScanStatus, SessionManager};
use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

fn test_config(server: &MockServer, auth: AuthConfig) -> ScanConfig {
    let mut config = ScanConfig::new(server.uri());
    config.requests_per_second = 200.0;
    config.auth = Some(auth);
    config
}

async fn status_of_root(config: ScanConfig) -> Option<u16> {
    let sink = Arc::new(MemorySink::new());
    let engine = Engine::new(config, sink.clone(), sink.clone()).unwrap();
    engine.run().await.unwrap();
    assert_eq!(engine.status(), ScanStatus::Completed);

    sink.discovered_urls()
        .into_iter()
        .find(|e| e.url.ends_with('/'))
        .map(|e| e.status_code)
}

#[tokio::test]
async fn test_form_login_posts_hidden_fields_and_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(html(
            r#"<form action="/session" method="post">
                 <input type="hidden" name="csrf_token" value="tok123">
                 <input type="text" name="username">
                 <input type="password" name="password">
               </form>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/session"))
        .and(body_string_contains("csrf_token=tok123"))
        .and(body_string_contains("username=admin"))
        .and(body_string_contains("password=s3cret"))
        .respond_with(html("<a href=\"/logout\">Logout</a>"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>dashboard</p>"))
        .mount(&server)
        .await;

    let auth = AuthConfig::form(format!("{}/login", server.uri()), "admin", "s3cret");
    assert_eq!(status_of_root(test_config(&server, auth)).await, Some(200));
}

#[tokio::test]
async fn test_form_login_rejected_scan_continues() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(html(
            r#"<form action="/session" method="post"><input type="password" name="password"></form>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>public home</p>"))
        .mount(&server)
        .await;

    let auth = AuthConfig::form(format!("{}/login", server.uri()), "admin", "wrong");
    assert_eq!(status_of_root(test_config(&server, auth)).await, Some(200));
}

#[tokio::test]
async fn test_basic_auth_header_on_every_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(html("<p>members</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let auth = AuthConfig::basic("admin", "secret");
    assert_eq!(status_of_root(test_config(&server, auth)).await, Some(200));
}

#[tokio::test]
async fn test_bearer_token_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("authorization", "Bearer api-token-1"))
        .respond_with(html("<p>api docs</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let auth = AuthConfig::bearer("api-token-1");
    assert_eq!(status_of_root(test_config(&server, auth)).await, Some(200));
}

#[tokio::test]
async fn test_refresh_logs_in_again_when_session_expired() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(html(
            r#"<form action="/session" method="post">
                 <input type="hidden" name="csrf_token" value="fresh">
                 <input type="password" name="password">
               </form>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(html("ok"))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/account"))
        .respond_with(html(r#"<a href="/login">Log in</a> to continue. Forgot password?"#))
        .mount(&server)
        .await;

    let client = reqwest::Client::builder().cookie_store(true).build().unwrap();
    let session = SessionManager::new(client);
    let mut auth = AuthConfig::form(format!("{}/login", server.uri()), "admin", "pw");
    auth.check_url = Some(format!("{}/account", server.uri()));

    session.configure(&auth, &server.uri()).await.unwrap();
    assert!(session.is_authenticated());
    assert_eq!(session.csrf_tokens()["csrf_token"], "fresh");

    assert!(session.refresh().await.unwrap());
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn test_refresh_keeps_live_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/logout">Logout</a> | My Account"#))
        .mount(&server)
        .await;

    let session = SessionManager::new(reqwest::Client::new());
    session
        .configure(&AuthConfig::bearer("t"), &server.uri())
        .await
        .unwrap();

    assert!(!session.refresh().await.unwrap());
}

#[tokio::test]
async fn test_burst_of_401s_checks_session_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(html(
            r#"<form action="/session" method="post"><input type="password" name="password"></form>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(html("welcome"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/p1">1</a> <a href="/p2">2</a> <a href="/p3">3</a> <a href="/p4">4</a>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d$"))
        .respond_with(ResponseTemplate::new(401))
        .expect(4)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/account"))
        .respond_with(html(r#"<a href="/logout">Logout</a> | My Account"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut auth = AuthConfig::form(format!("{}/login", server.uri()), "admin", "pw");
    auth.check_url = Some(format!("{}/account", server.uri()));
    assert_eq!(status_of_root(test_config(&server, auth)).await, Some(200));
}
