//! Integration tests for the harvester
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! discovery and extraction cycle end-to-end.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sumi_harvest::config::Config;
use sumi_harvest::crawler::Renderer;
use sumi_harvest::output::{export_all, ExportFormat};
use sumi_harvest::storage::{RunStatus, Storage, FAILED_FETCH_STATUS};
use sumi_harvest::{Harvester, HarvestError};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration writing into `dir`
fn create_test_config(dir: &TempDir, max_depth: u32) -> Config {
    let mut config = Config::default();
    config.crawler.max_depth = max_depth;
    config.crawler.max_retries = 0;
    config.crawler.retry_backoff_ms = 10;
    config.crawler.min_request_interval_seconds = 0.0;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.output.database_path = dir.path().join("harvest.db").to_string_lossy().into_owned();
    config.output.media_dir = dir.path().join("media").to_string_lossy().into_owned();
    config.output.export_dir = dir.path().join("export").to_string_lossy().into_owned();
    config
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_string(body.into())
}

async fn mount_page(server: &MockServer, p: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Paths of every URL in the store, sorted
fn stored_paths(harvester: &Harvester) -> Vec<String> {
    let mut paths: Vec<String> = harvester
        .store()
        .with(|s| s.all_urls())
        .unwrap()
        .into_iter()
        .map(|u| Url::parse(&u.url).unwrap().path().to_string())
        .collect();
    paths.sort();
    paths
}

#[tokio::test]
async fn test_harvest_stays_on_seed_domain() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        html(
            r#"<html><body><h1>Home</h1>
               <a href="/a">A</a>
               <a href="https://other.test/b">Elsewhere</a>
               </body></html>"#,
        ),
    )
    .await;
    mount_page(&server, "/a", html(r#"<p>Page A</p><a href="/deeper">D</a>"#)).await;
    Mock::given(method("GET"))
        .and(path("/deeper"))
        .respond_with(html("<p>too deep</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let harvester = Harvester::new(create_test_config(&dir, 1)).unwrap();
    let summary = harvester.run(&format!("{}/", server.uri())).await.unwrap();

    assert_eq!(stored_paths(&harvester), vec!["/", "/a"]);
    assert_eq!(summary.counts.discovered, 2);
    assert_eq!(summary.counts.succeeded, 2);

    let urls = harvester.store().with(|s| s.all_urls()).unwrap();
    let seed_host = Url::parse(&server.uri()).unwrap().host_str().unwrap().to_string();
    assert!(urls.iter().all(|u| u.domain == seed_host));
    assert!(urls.iter().all(|u| u.visited));

    let contents = harvester.store().with(|s| s.all_content()).unwrap();
    let texts: HashSet<&str> = contents.iter().map(|c| c.text_content.as_str()).collect();
    assert!(texts.contains("Page A\nD"));

    let run = harvester.store().with(|s| s.get_run(summary.run_id)).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.discovered, 2);
}

#[tokio::test]
async fn test_harvest_depth_limit() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html(r#"<a href="/l1">1</a>"#)).await;
    mount_page(&server, "/l1", html(r#"<a href="/l2">2</a>"#)).await;
    mount_page(&server, "/l2", html(r#"<a href="/l3">3</a>"#)).await;
    Mock::given(method("GET"))
        .and(path("/l3"))
        .respond_with(html("<p>3</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let harvester = Harvester::new(create_test_config(&dir, 2)).unwrap();
    harvester.run(&format!("{}/", server.uri())).await.unwrap();

    assert_eq!(stored_paths(&harvester), vec!["/", "/l1", "/l2"]);
}

#[tokio::test]
async fn test_referenced_endpoints_are_harvested() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        html(r#"<script>fetch("/api/items");</script><a href="/about">About</a>"#),
    )
    .await;
    mount_page(&server, "/about", html("<p>About us</p>")).await;
    mount_page(
        &server,
        "/api/items",
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/json")
            .set_body_string(r#"{"items":[]}"#),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let harvester = Harvester::new(create_test_config(&dir, 1)).unwrap();
    let summary = harvester.run(&format!("{}/", server.uri())).await.unwrap();

    assert_eq!(stored_paths(&harvester), vec!["/", "/about", "/api/items"]);
    assert_eq!(summary.counts.endpoints, 1);

    let endpoint = harvester
        .store()
        .with(|s| s.get_url_by_address(&format!("{}/api/items", server.uri())))
        .unwrap()
        .unwrap();
    assert!(endpoint.visited);
    assert_eq!(endpoint.http_status, Some(200));
}

#[tokio::test]
async fn test_endpoint_stage_can_be_switched_off() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html(r#"<script>fetch("/api/items");</script>"#)).await;
    Mock::given(method("GET"))
        .and(path("/api/items"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&dir, 1);
    config.crawler.discover_endpoints = false;
    let harvester = Harvester::new(config).unwrap();
    let summary = harvester.run(&format!("{}/", server.uri())).await.unwrap();

    assert_eq!(stored_paths(&harvester), vec!["/"]);
    assert_eq!(summary.counts.endpoints, 0);
}

#[tokio::test]
async fn test_robots_unreachable_allows_everything() {
    let server = MockServer::start().await;
    mount_page(&server, "/robots.txt", ResponseTemplate::new(500)).await;
    mount_page(&server, "/", html(r#"<a href="/admin">admin</a>"#)).await;
    mount_page(&server, "/admin", html("<p>admin</p>")).await;

    let dir = tempfile::tempdir().unwrap();
    let harvester = Harvester::new(create_test_config(&dir, 3)).unwrap();
    let summary = harvester.run(&format!("{}/", server.uri())).await.unwrap();

    assert_eq!(stored_paths(&harvester), vec!["/", "/admin"]);
    assert_eq!(summary.counts.skipped, 0);
}

#[tokio::test]
async fn test_robots_disallowed_urls_never_fetched() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
    )
    .await;
    mount_page(
        &server,
        "/",
        html(r#"<a href="/private/secret">s</a><a href="/public">p</a>"#),
    )
    .await;
    mount_page(&server, "/public", html("<p>public</p>")).await;
    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(html("<p>secret</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let harvester = Harvester::new(create_test_config(&dir, 3)).unwrap();
    let summary = harvester.run(&format!("{}/", server.uri())).await.unwrap();

    assert_eq!(stored_paths(&harvester), vec!["/", "/public"]);
    assert_eq!(summary.counts.skipped, 1);
}

#[tokio::test]
async fn test_ignore_robots_still_records_everything() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
    )
    .await;
    mount_page(&server, "/", html(r#"<a href="/private/page">s</a>"#)).await;
    mount_page(&server, "/private/page", html("<p>private</p>")).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&dir, 3);
    config.politeness.respect_robots = false;
    let harvester = Harvester::new(config).unwrap();
    harvester.run(&format!("{}/", server.uri())).await.unwrap();

    assert_eq!(stored_paths(&harvester), vec!["/", "/private/page"]);
}

#[tokio::test]
async fn test_failed_fetches_marked_visited() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        html(r#"<a href="/missing">m</a><a href="/flaky">f</a>"#),
    )
    .await;
    mount_page(&server, "/flaky", ResponseTemplate::new(503)).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&dir, 3);
    config.crawler.max_retries = 1;
    let harvester = Harvester::new(config).unwrap();
    let summary = harvester.run(&format!("{}/", server.uri())).await.unwrap();

    assert_eq!(summary.counts.failed, 2);
    assert_eq!(summary.counts.succeeded, 1);

    let base = server.uri();
    let missing = harvester
        .store()
        .with(|s| s.get_url_by_address(&format!("{}/missing", base)))
        .unwrap()
        .unwrap();
    assert!(missing.visited);
    assert_eq!(missing.http_status, Some(FAILED_FETCH_STATUS));

    let flaky = harvester
        .store()
        .with(|s| s.get_url_by_address(&format!("{}/flaky", base)))
        .unwrap()
        .unwrap();
    assert!(flaky.visited);
    assert_eq!(flaky.http_status, Some(503));

    // A second run has nothing left to visit
    let again = harvester.run(&format!("{}/", base)).await.unwrap();
    assert_eq!(again.counts.visited, 0);
}

#[tokio::test]
async fn test_media_downloads_with_colliding_names() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        html(r#"<h1>Gallery</h1><img src="/img/logo.png"><img src="/other/logo.png">"#),
    )
    .await;
    mount_page(
        &server,
        "/img/logo.png",
        ResponseTemplate::new(200)
            .insert_header("content-type", "image/png")
            .set_body_bytes(vec![1u8; 100]),
    )
    .await;
    mount_page(
        &server,
        "/other/logo.png",
        ResponseTemplate::new(200)
            .insert_header("content-type", "image/png")
            .set_body_bytes(vec![2u8; 20_000]),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let harvester = Harvester::new(create_test_config(&dir, 1)).unwrap();
    let seed = format!("{}/", server.uri());
    harvester.run(&seed).await.unwrap();

    let seed_record = harvester
        .store()
        .with(|s| s.get_url_by_address(&seed))
        .unwrap()
        .unwrap();
    let media = harvester.store().with(|s| s.media_for(seed_record.id)).unwrap();
    assert_eq!(media.len(), 2);

    let mut sizes: Vec<u64> = media.iter().map(|m| m.file_size).collect();
    sizes.sort();
    assert_eq!(sizes, vec![100, 20_000]);

    // No file was overwritten: every record points at its own file of the recorded size
    let all_media = harvester.store().with(|s| s.all_media()).unwrap();
    let paths: HashSet<&str> = all_media.iter().map(|m| m.local_path.as_str()).collect();
    assert_eq!(paths.len(), all_media.len());
    for record in &all_media {
        let on_disk = std::fs::metadata(&record.local_path).unwrap().len();
        assert_eq!(on_disk, record.file_size);
    }
}

#[tokio::test]
async fn test_pacing_spaces_requests() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html(r#"<a href="/a">a</a><a href="/b">b</a>"#)).await;
    mount_page(&server, "/a", html("<p>a</p>")).await;
    mount_page(&server, "/b", html("<p>b</p>")).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&dir, 1);
    config.crawler.min_request_interval_seconds = 0.1;
    config.crawler.follow_sitemaps = false;
    let harvester = Harvester::new(config).unwrap();

    let started = Instant::now();
    harvester.run(&format!("{}/", server.uri())).await.unwrap();

    // At least six fetches to one domain, so at least five full intervals
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test]
async fn test_disallowed_seed_is_a_run_failure() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let harvester = Harvester::new(create_test_config(&dir, 1)).unwrap();
    let result = harvester.run(&format!("{}/", server.uri())).await;

    assert!(matches!(result, Err(HarvestError::SeedDisallowed(_))));
    assert_eq!(harvester.store().with(|s| s.count_urls()).unwrap(), 0);
}

struct StaticRenderer(String);

#[async_trait]
impl Renderer for StaticRenderer {
    async fn render(&self, _url: &Url) -> Option<String> {
        Some(self.0.clone())
    }
}

#[tokio::test]
async fn test_rendered_source_supplies_content() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html(r#"<div id="root"></div>"#)).await;

    let dir = tempfile::tempdir().unwrap();
    let harvester = Harvester::with_renderer(
        create_test_config(&dir, 0),
        Arc::new(StaticRenderer("<main><p>Rendered by script</p></main>".to_string())),
    )
    .unwrap();
    harvester.run(&format!("{}/", server.uri())).await.unwrap();

    let content = harvester.store().with(|s| s.all_content()).unwrap();
    assert_eq!(content.len(), 1);
    assert_eq!(content[0].text_content, "Rendered by script");
    assert_eq!(content[0].content_type, "text/html");
}

#[tokio::test]
async fn test_exports_after_run() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html("<p>Exported</p>")).await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&dir, 0);
    let export_dir = std::path::PathBuf::from(&config.output.export_dir);
    let harvester = Harvester::new(config).unwrap();
    harvester.run(&format!("{}/", server.uri())).await.unwrap();

    let written = harvester
        .store()
        .with(|s| {
            Ok(export_all(
                &*s,
                &[
                    ExportFormat::Json,
                    ExportFormat::Csv,
                    ExportFormat::Sql,
                    ExportFormat::Markdown,
                ],
                &export_dir,
            ))
        })
        .unwrap()
        .unwrap();
    assert_eq!(written.len(), 8);

    let content = std::fs::read_to_string(export_dir.join("content_export.json")).unwrap();
    assert!(content.contains("Exported"));
    let csv = std::fs::read_to_string(export_dir.join("content_export.csv")).unwrap();
    assert!(csv.starts_with("id,url_id,content_type,text_content"));
    let sql = std::fs::read_to_string(export_dir.join("export.sql")).unwrap();
    assert!(sql.contains("INSERT INTO content"));
    assert!(sql.contains("'Exported'"));
    let summary = std::fs::read_to_string(export_dir.join("summary.md")).unwrap();
    assert!(summary.contains("- **Status**: completed"));
}
