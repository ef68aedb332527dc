//! Integration tests for the fetch layer

use std::sync::Arc;
use std::time::Duration;
use url::Url;
use webrecon::crawler::{build_http_client, FetchError};
use webrecon::{ScanConfig, SessionManager, Spider};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn spider_for(config: &ScanConfig) -> Spider {
    let client = build_http_client(config).expect("client builds");
    Spider::new(config, Arc::new(SessionManager::new(client)))
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_populates_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><title> Hello </title></html>", "text/html")
                .insert_header("x-powered-by", "PHP/8.2.0"),
        )
        .mount(&server)
        .await;

    let config = ScanConfig::new(server.uri());
    let spider = spider_for(&config);
    let url = format!("{}/page", server.uri());

    let result = spider.fetch(&url).await.unwrap();
    assert_eq!(result.url, url);
    assert_eq!(result.final_url, url);
    assert_eq!(result.status_code, 200);
    assert!(result.is_html());
    assert_eq!(result.title.as_deref(), Some("Hello"));
    assert_eq!(result.header("X-Powered-By"), Some("PHP/8.2.0"));
    assert_eq!(result.content_length, Some(35));
}

#[tokio::test]
async fn test_error_status_is_a_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410).set_body_string("gone"))
        .mount(&server)
        .await;

    let config = ScanConfig::new(server.uri());
    let result = spider_for(&config)
        .fetch(&format!("{}/gone", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.status_code, 410);
    assert_eq!(result.body.as_deref(), Some("gone"));
}

#[tokio::test]
async fn test_robots_disallow() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private/").await;

    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let config = ScanConfig::new(server.uri());
    let spider = spider_for(&config);

    let blocked = spider
        .fetch(&format!("{}/private/x", server.uri()))
        .await;
    assert!(matches!(blocked, Err(FetchError::RobotsDisallowed(_))));

    let allowed = spider.fetch(&format!("{}/public", server.uri())).await;
    assert_eq!(allowed.unwrap().status_code, 200);
}

#[tokio::test]
async fn test_robots_ignored_when_disabled() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /").await;

    Mock::given(method("GET"))
        .and(path("/anything"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let mut config = ScanConfig::new(server.uri());
    config.respect_robots = false;
    let result = spider_for(&config)
        .fetch(&format!("{}/anything", server.uri()))
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_robots_fetched_once_per_origin() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = ScanConfig::new(server.uri());
    let spider = spider_for(&config);
    for _ in 0..3 {
        spider.fetch(&format!("{}/a", server.uri())).await.unwrap();
    }
}

#[tokio::test]
async fn test_crawl_delay_from_robots() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nCrawl-delay: 2\nDisallow:").await;

    let config = ScanConfig::new(server.uri());
    let spider = spider_for(&config);
    let url = Url::parse(&server.uri()).unwrap();

    assert_eq!(spider.crawl_delay(&url).await, Some(Duration::from_secs(2)));
}

#[tokio::test]
async fn test_oversize_body_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_string("y".repeat(4096)))
        .mount(&server)
        .await;

    let mut config = ScanConfig::new(server.uri());
    config.max_body_bytes = 2048;
    let result = spider_for(&config)
        .fetch(&format!("{}/big", server.uri()))
        .await;

    assert!(matches!(result, Err(FetchError::TooLarge { limit: 2048 })));
}

#[tokio::test]
async fn test_binary_body_keeps_metadata() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/blob"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', 0, 0, 1, 2]))
        .mount(&server)
        .await;

    let config = ScanConfig::new(server.uri());
    let result = spider_for(&config)
        .fetch(&format!("{}/blob", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.status_code, 200);
    assert_eq!(result.body, None);
}

#[tokio::test]
async fn test_timeout_is_fetch_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let mut config = ScanConfig::new(server.uri());
    config.timeout = 1;
    config.respect_robots = false;
    let result = spider_for(&config)
        .fetch(&format!("{}/slow", server.uri()))
        .await;

    assert!(matches!(result, Err(FetchError::Timeout(_))));
}

#[tokio::test]
async fn test_invalid_urls_rejected_without_request() {
    let config = ScanConfig::new("https://example.com/");
    let spider = spider_for(&config);

    for url in ["javascript:void(0)", "mailto:a@b.com", "https://example.com/file.pdf"] {
        assert!(matches!(
            spider.fetch(url).await,
            Err(FetchError::InvalidUrl(_))
        ));
    }
}

#[tokio::test]
async fn test_head_has_no_body() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/meta"))
        .respond_with(ResponseTemplate::new(200).insert_header("server", "Apache/2.4.57"))
        .mount(&server)
        .await;

    let config = ScanConfig::new(server.uri());
    let result = spider_for(&config)
        .head(&format!("{}/meta", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.status_code, 200);
    assert_eq!(result.body, None);
    assert_eq!(result.header("server"), Some("Apache/2.4.57"));
}
