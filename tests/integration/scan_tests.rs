//! Integration tests for full scans
//!
//! These tests use wiremock to create mock HTTP servers and run the
//! engine end-to-end against them.

use std::sync::Arc;
use std::time::Duration;
use webrecon::output::{MemorySink, SqliteSink};
use webrecon::{CrawlStats, Engine, ScanConfig, ScanStatus};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// HTML response with the right content type
fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html")
}

/// Fast, polite-enough settings for a local mock server
fn test_config(server: &MockServer) -> ScanConfig {
    let mut config = ScanConfig::new(server.uri());
    config.requests_per_second = 200.0;
    config.max_concurrent_requests = 4;
    config
}

async fn run_scan(config: ScanConfig) -> (Engine, Arc<MemorySink>, CrawlStats) {
    let sink = Arc::new(MemorySink::new());
    let engine = Engine::new(config, sink.clone(), sink.clone()).expect("valid config");
    let stats = tokio::time::timeout(Duration::from_secs(20), engine.run())
        .await
        .expect("scan did not finish")
        .expect("scan failed");
    (engine, sink, stats)
}

#[tokio::test]
async fn test_full_scan_records_pages_forms_and_fingerprints() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            html(r#"<html><head><title>Home</title></head><body>
                <a href="/about">About</a>
                <a href="/login">Login</a>
                <a href="https://elsewhere.example.org/">External</a>
                <a href="mailto:admin@example.com">Mail</a>
            </body></html>"#)
            .insert_header("server", "nginx/1.18.0"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(html("<title>About</title><p>About us</p>"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(html(
            r#"<title>Login</title>
            <form action="/session" method="post">
                <input type="hidden" name="csrf_token" value="abc">
                <input type="text" name="username">
                <input type="password" name="password">
            </form>"#,
        ))
        .mount(&server)
        .await;

    let (engine, sink, stats) = run_scan(test_config(&server)).await;

    assert_eq!(engine.status(), ScanStatus::Completed);
    assert_eq!(stats.urls_crawled, 3);
    assert_eq!(stats.urls_discovered, 3);
    assert_eq!(stats.forms_found, 1);
    assert_eq!(stats.errors, 0);
    assert!(stats.end_time.is_some());

    let mut fetched = sink.fetched_urls();
    fetched.sort();
    assert_eq!(
        fetched,
        vec![
            format!("{}/", base),
            format!("{}/about", base),
            format!("{}/login", base),
        ]
    );

    let events = sink.discovered_urls();
    let about = events
        .iter()
        .find(|e| e.url.ends_with("/about"))
        .expect("about page recorded");
    assert_eq!(about.parent_url.as_deref(), Some(format!("{}/", base).as_str()));
    assert_eq!(about.page_title.as_deref(), Some("About"));

    let forms = sink.forms();
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0].action, format!("{}/session", base));
    assert_eq!(forms[0].method, "post");
    assert!(forms[0].authentication_required);
    assert_eq!(forms[0].csrf_tokens[0]["value"], "abc");

    let fingerprints = sink.fingerprints();
    assert_eq!(fingerprints.len(), 3);
    let home = fingerprints
        .iter()
        .find(|f| f.url_ref == format!("{}/", base))
        .expect("home fingerprint");
    assert_eq!(home.server_software.as_deref(), Some("nginx/1.18.0"));
    assert!(stats.technologies_detected >= 1);

    assert_eq!(
        sink.statuses(),
        vec![
            ScanStatus::Pending,
            ScanStatus::Running,
            ScanStatus::Completed
        ]
    );
}

#[tokio::test]
async fn test_robots_disallow_is_respected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/private/x">Secret</a><a href="/public">Public</a>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html("<p>public</p>"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private/x"))
        .respond_with(html("<p>secret</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let (_engine, sink, stats) = run_scan(test_config(&server)).await;

    let fetched = sink.fetched_urls();
    assert!(fetched.iter().any(|u| u.ends_with("/public")));
    assert!(!fetched.iter().any(|u| u.contains("/private/")));
    // The disallowed URL was discovered but never fetched
    assert_eq!(stats.urls_discovered, 3);
    assert_eq!(stats.urls_crawled, 2);
    assert_eq!(stats.errors, 1);
}

#[tokio::test]
async fn test_absurd_crawl_delay_does_not_fail_scan() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nCrawl-delay: 1e20"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<title>Only page</title>"))
        .expect(1)
        .mount(&server)
        .await;

    let (engine, _sink, stats) = run_scan(test_config(&server)).await;

    assert_eq!(engine.status(), ScanStatus::Completed);
    assert_eq!(stats.urls_crawled, 1);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn test_max_depth_limits_fetching() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/level1">One</a>"#))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/level1"))
        .respond_with(html(r#"<a href="/level2">Two</a>"#))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/level2"))
        .respond_with(html("<p>too deep</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.max_depth = 1;
    let (_engine, sink, stats) = run_scan(config).await;

    assert_eq!(stats.urls_crawled, 2);
    assert_eq!(stats.urls_discovered, 2);
    assert!(!sink.fetched_urls().iter().any(|u| u.ends_with("/level2")));
}

#[tokio::test]
async fn test_equivalent_links_fetched_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/dup">1</a>
               <a href="/dup">2</a>
               <a href="/dup/">3</a>
               <a href="/dup#section">4</a>
               <a href="/dup?utm_source=newsletter">5</a>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/dup"))
        .respond_with(html("<p>once</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let (_engine, sink, stats) = run_scan(test_config(&server)).await;

    assert_eq!(stats.urls_discovered, 2);
    assert_eq!(
        sink.fetched_urls()
            .iter()
            .filter(|u| u.ends_with("/dup"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_max_pages_caps_discovery() {
    let server = MockServer::start().await;

    let links: String = (0..10)
        .map(|i| format!(r#"<a href="/p{}">page {}</a>"#, i, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(links))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d+$"))
        .respond_with(html("<p>leaf</p>"))
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.max_pages = 3;
    let (engine, sink, stats) = run_scan(config).await;

    assert_eq!(engine.status(), ScanStatus::Completed);
    assert_eq!(stats.urls_discovered, 3);
    assert_eq!(stats.urls_crawled, 3);
    assert_eq!(sink.fetched_urls().len(), 3);
}

#[tokio::test]
async fn test_http_error_statuses_are_discoveries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/missing">404</a><a href="/broken">500</a><a href="/locked">401</a>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_raw("<h1>oops</h1>", "text/html"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/locked"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    // /missing has no mock; wiremock answers 404

    let (_engine, sink, stats) = run_scan(test_config(&server)).await;

    assert_eq!(stats.errors, 0);
    assert_eq!(stats.urls_crawled, 4);

    let status_of = |suffix: &str| {
        sink.discovered_urls()
            .into_iter()
            .find(|e| e.url.ends_with(suffix))
            .map(|e| e.status_code)
    };
    assert_eq!(status_of("/missing"), Some(404));
    assert_eq!(status_of("/broken"), Some(500));
    assert_eq!(status_of("/locked"), Some(401));
}

#[tokio::test]
async fn test_oversize_body_counts_as_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/huge">huge</a><a href="/small">small</a>"#))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(html("x".repeat(8 * 1024)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/small"))
        .respond_with(html("<p>ok</p>"))
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.max_body_bytes = 4 * 1024;
    let (engine, sink, stats) = run_scan(config).await;

    assert_eq!(engine.status(), ScanStatus::Completed);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.urls_crawled, 2);
    assert!(!sink.fetched_urls().iter().any(|u| u.ends_with("/huge")));
}

#[tokio::test]
async fn test_out_of_scope_and_excluded_links_are_skipped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/app/dashboard">in</a>
               <a href="/app/logout">excluded</a>
               <a href="/blog/post">out of scope</a>
               <a href="/app/report.pdf">binary</a>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/app/dashboard"))
        .respond_with(html("<p>dash</p>"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/app/logout"))
        .respond_with(html("<p>bye</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.scope_patterns = vec!["/app/".to_string()];
    config.exclude_patterns = vec!["logout".to_string()];

    let (_engine, sink, stats) = run_scan(config).await;

    // the target itself is seeded regardless of scope patterns
    assert_eq!(stats.urls_crawled, 2);
    assert!(!sink.fetched_urls().iter().any(|u| u.contains("/blog/")));
}

#[tokio::test]
async fn test_stop_cancels_scan() {
    let server = MockServer::start().await;

    let links: String = (0..20)
        .map(|i| format!(r#"<a href="/p{}">page {}</a>"#, i, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(links).set_delay(Duration::from_millis(400)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d+$"))
        .respond_with(html("<p>leaf</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let engine = Engine::new(test_config(&server), sink.clone(), sink.clone()).unwrap();

    let (result, ()) = tokio::join!(engine.run(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.stop();
    });
    let stats = result.unwrap();

    assert_eq!(engine.status(), ScanStatus::Cancelled);
    assert!(stats.end_time.is_some());
    // the in-flight request for the target was allowed to finish
    assert_eq!(sink.fetched_urls(), vec![format!("{}/", server.uri())]);
    assert_eq!(sink.statuses().last(), Some(&ScanStatus::Cancelled));
}

#[tokio::test]
async fn test_scan_into_sqlite_sink() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/contact">Contact</a>
               <form action="/search"><input name="q"></form>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/contact"))
        .respond_with(html("<p>contact</p>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("scan.db");
    let sink = Arc::new(SqliteSink::open(&db_path, &server.uri(), Some("hash")).unwrap());

    let engine = Engine::new(test_config(&server), sink.clone(), sink.clone()).unwrap();
    let stats = engine.run().await.unwrap();

    assert_eq!(stats.urls_crawled, 2);
    assert_eq!(sink.count_rows("discovered_urls").unwrap(), 2);
    assert_eq!(sink.count_rows("forms").unwrap(), 1);
    assert_eq!(sink.count_rows("fingerprints").unwrap(), 2);
    assert_eq!(sink.run_status().unwrap(), Some(ScanStatus::Completed));
}
