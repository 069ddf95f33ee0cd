//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the
//! dispatcher end-to-end: politeness gate, fetch executor, crawl sessions
//! and the partitioned store.

use chrono::Utc;
use crawl_orchestra::config::{parse_config, Config};
use crawl_orchestra::dispatcher::{Dispatcher, Selection};
use crawl_orchestra::output::{FailureKind, OutputHandler, JsonResultsWriter};
use crawl_orchestra::storage::{FsObjectStore, PartitionedStore};
use crawl_orchestra::{ConfigError, HarvestError, SessionState};
use futures::TryStreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with short delays and the given site tables
fn create_test_config(sites: &str) -> Config {
    let toml = format!(
        r#"
[crawler]
max-parallel-sessions = 4
min-delay-ms = 10
robots-timeout-ms = 2000
request-timeout-ms = 5000

[retry]
max-attempts = 3
base-delay-ms = 10
max-delay-ms = 2000
jitter-ms = 0

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[storage]
backend = "memory"

{}
"#,
        sites
    );
    parse_config(&toml).expect("test config should be valid")
}

/// An HTML page linking to `links`; `marker` keeps bodies distinct
fn html_page(marker: &str, links: &[&str]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a>"#, href, href))
        .collect();
    let body = format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1>{}</body></html>",
        marker, marker, anchors
    );
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn dispatcher(config: &Config) -> Dispatcher {
    Dispatcher::from_config(config, PartitionedStore::in_memory(), CancellationToken::new())
        .expect("dispatcher should build")
}

#[tokio::test]
async fn test_page_limit_completes_site() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("home", &["/a", "/b"]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page("a", &[]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html_page("b", &[]))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&format!(
        "[websites.siteA]\nurl = \"{}/\"\npage-limit = 2\n",
        server.uri()
    ));
    let sites = config.site_configs().unwrap();

    let report = dispatcher(&config)
        .run(&sites, &Selection::all())
        .await
        .unwrap();

    let site = report.session("siteA").unwrap();
    assert_eq!(site.state, SessionState::Completed);
    assert_eq!(site.pages_fetched, 2);
    assert_eq!(site.total_failures(), 0);
    assert_eq!(site.artifacts_stored, 2);
    assert!(!report.has_aborted());
}

#[tokio::test]
async fn test_visited_urls_are_fetched_once() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("home", &["/a", "/", "/a#top"]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page("a", &["/", "/a"]))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&format!(
        "[websites.siteA]\nurl = \"{}/\"\npage-limit = 10\n",
        server.uri()
    ));
    let sites = config.site_configs().unwrap();

    let report = dispatcher(&config)
        .run(&sites, &Selection::all())
        .await
        .unwrap();

    let site = report.session("siteA").unwrap();
    assert_eq!(site.state, SessionState::Completed);
    assert_eq!(site.pages_fetched, 2);
}

#[tokio::test]
async fn test_redirect_back_to_visited_page_is_not_stored_again() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("home", &["/a", "/b"]))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/", server.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html_page("b", &[]))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&format!(
        "[websites.siteA]\nurl = \"{}/\"\npage-limit = 10\n",
        server.uri()
    ));
    let sites = config.site_configs().unwrap();

    let report = dispatcher(&config)
        .run(&sites, &Selection::all())
        .await
        .unwrap();

    let site = report.session("siteA").unwrap();
    assert_eq!(site.state, SessionState::Completed);
    assert_eq!(site.pages_fetched, 2);
    assert_eq!(site.artifacts_stored, 2);
    assert_eq!(site.artifacts_deduplicated, 0);
    assert_eq!(site.records_stored, 2);
    assert_eq!(site.total_failures(), 0);
}

#[tokio::test]
async fn test_robots_txt_respect() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private/").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("home", &["/private/x", "/public"]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html_page("public", &[]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/x"))
        .respond_with(html_page("secret", &[]))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&format!(
        "[websites.siteA]\nurl = \"{}/\"\npage-limit = 10\n",
        server.uri()
    ));
    let sites = config.site_configs().unwrap();

    let report = dispatcher(&config)
        .run(&sites, &Selection::all())
        .await
        .unwrap();

    let site = report.session("siteA").unwrap();
    assert_eq!(site.state, SessionState::Completed);
    assert_eq!(site.pages_fetched, 2);
    assert_eq!(site.policy_skips, 1);
    assert_eq!(site.total_failures(), 0);

    let skip = &site.failures[0];
    assert_eq!(skip.kind, FailureKind::PolicySkip);
    assert!(skip.url.ends_with("/private/x"));
}

#[tokio::test]
async fn test_robots_disallowing_entry_aborts_site() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("home", &[]))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&format!(
        "[websites.siteA]\nurl = \"{}/\"\n",
        server.uri()
    ));
    let sites = config.site_configs().unwrap();

    let report = dispatcher(&config)
        .run(&sites, &Selection::all())
        .await
        .unwrap();

    let site = report.session("siteA").unwrap();
    assert_eq!(site.state, SessionState::Aborted);
    assert_eq!(site.pages_fetched, 0);
    assert!(report.has_aborted());
}

#[tokio::test]
async fn test_dynamic_engine_failure_is_contained() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("home", &[]))
        .mount(&server)
        .await;

    let config = create_test_config(&format!(
        "[websites.siteA]\nurl = \"{uri}/\"\npage-limit = 1\n\n\
         [websites.siteB]\nurl = \"{uri}/\"\ndynamic = true\n\n\
         [websites.siteC]\nurl = \"{uri}/\"\npage-limit = 1\n",
        uri = server.uri()
    ));
    let sites = config.site_configs().unwrap();

    // No render engine is wired in, so every dynamic site fails to launch
    let report = dispatcher(&config)
        .run(&sites, &Selection::all())
        .await
        .unwrap();

    let dynamic = report.session("siteB").unwrap();
    assert_eq!(dynamic.state, SessionState::Aborted);
    assert_eq!(dynamic.pages_fetched, 0);
    assert!(dynamic
        .abort_reason
        .as_deref()
        .unwrap()
        .contains("render engine"));

    for name in ["siteA", "siteC"] {
        let site = report.session(name).unwrap();
        assert_eq!(site.state, SessionState::Completed, "{} should complete", name);
        assert_eq!(site.pages_fetched, 1);
    }

    assert_eq!(report.totals.sites_attempted, 3);
    assert_eq!(report.totals.sites_aborted, 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&format!(
        "[websites.siteA]\nurl = \"{uri}/flaky\"\nseeds = [\"{uri}/gone\"]\n",
        uri = server.uri()
    ));
    let sites = config.site_configs().unwrap();

    let report = dispatcher(&config)
        .run(&sites, &Selection::all())
        .await
        .unwrap();

    let site = report.session("siteA").unwrap();
    assert_eq!(site.state, SessionState::Completed);
    assert_eq!(site.pages_fetched, 0);
    assert_eq!(site.transient_failures, 1);
    assert_eq!(site.permanent_failures, 1);

    let transient = site
        .failures
        .iter()
        .find(|f| f.kind == FailureKind::Transient)
        .unwrap();
    assert_eq!(transient.attempts, Some(3));
}

#[tokio::test]
async fn test_rate_limited_with_retry_after_is_retried() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("home", &[]))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&format!(
        "[websites.siteA]\nurl = \"{}/\"\n",
        server.uri()
    ));
    let sites = config.site_configs().unwrap();

    let started = Instant::now();
    let report = dispatcher(&config)
        .run(&sites, &Selection::all())
        .await
        .unwrap();

    let site = report.session("siteA").unwrap();
    assert_eq!(site.state, SessionState::Completed);
    assert_eq!(site.pages_fetched, 1);
    assert_eq!(site.total_failures(), 0);
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_store_is_idempotent_across_runs() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("home", &["/a"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page("a", &[]))
        .mount(&server)
        .await;

    let config = create_test_config(&format!(
        "[websites.siteA]\nurl = \"{}/\"\n",
        server.uri()
    ));
    let sites = config.site_configs().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = PartitionedStore::new(Arc::new(FsObjectStore::new(dir.path()).unwrap()));
    let dispatcher = Dispatcher::from_config(&config, store.clone(), CancellationToken::new()).unwrap();

    let first = dispatcher.run(&sites, &Selection::all()).await.unwrap();
    let second = dispatcher.run(&sites, &Selection::all()).await.unwrap();

    let first = first.session("siteA").unwrap();
    let second = second.session("siteA").unwrap();
    assert_eq!(first.artifacts_stored, 2);
    assert_eq!(first.records_stored, 2);
    assert_eq!(second.pages_fetched, 2);
    assert_eq!(second.artifacts_stored, 0);
    assert_eq!(second.artifacts_deduplicated, 2);
    assert_eq!(second.records_stored, 0);

    let today = Utc::now().date_naive();
    let keys = store.list_keys("siteA", today).await.unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k.starts_with("raw/siteA/")));

    let artifacts: Vec<_> = store
        .get("siteA", today..=today)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(artifacts.len(), 2);
    assert!(artifacts
        .iter()
        .any(|a| a.source_url.path() == "/a" && a.status == 200));

    let records = store.processed("siteA", today).await.unwrap();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert!(artifacts.iter().any(|a| a.content_hash == record.content_hash));
    }
    assert!(records.iter().any(|r| r.record["title"] == "a"));
}

#[tokio::test]
async fn test_cancellation_aborts_running_sessions() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("slow", &[]).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let config = create_test_config(&format!(
        "[websites.siteA]\nurl = \"{uri}/\"\n\n[websites.siteB]\nurl = \"{uri}/\"\n",
        uri = server.uri()
    ));
    let sites = config.site_configs().unwrap();

    let cancel = CancellationToken::new();
    let dispatcher =
        Dispatcher::from_config(&config, PartitionedStore::in_memory(), cancel.clone()).unwrap();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let report = dispatcher.run(&sites, &Selection::all()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.cancelled);
    assert_eq!(report.totals.sites_aborted, 2);
    assert_eq!(report.totals.total_pages, 0);
}

#[tokio::test]
async fn test_unknown_site_names_are_reported() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("home", &[]))
        .mount(&server)
        .await;

    let config = create_test_config(&format!(
        "[websites.siteA]\nurl = \"{uri}/\"\n\n[websites.siteB]\nurl = \"{uri}/\"\n",
        uri = server.uri()
    ));
    let sites = config.site_configs().unwrap();
    let dispatcher = dispatcher(&config);

    let report = dispatcher
        .run(&sites, &Selection::sites(["siteA", "ghost"]))
        .await
        .unwrap();

    assert_eq!(report.sessions.len(), 1);
    assert_eq!(report.sessions[0].site, "siteA");
    assert_eq!(report.unknown_sites, vec!["ghost".to_string()]);

    let err = dispatcher
        .run(&sites, &Selection::sites(["ghost"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HarvestError::Config(ConfigError::NoSitesSelected)
    ));
}

#[tokio::test]
async fn test_news_feeds_are_stored_under_news() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    for feed in ["/rss.xml", "/atom.xml"] {
        Mock::given(method("GET"))
            .and(path(feed))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(format!("<rss><channel>{}</channel></rss>", feed), "application/rss+xml"),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = create_test_config(&format!(
        "[news]\nfeeds = [\"{uri}/rss.xml\", \"{uri}/atom.xml\"]\n",
        uri = server.uri()
    ));
    let sites = config.site_configs().unwrap();
    assert!(sites.is_empty());

    let dispatcher = dispatcher(&config);
    let report = dispatcher
        .run(&sites, &Selection::news_only())
        .await
        .unwrap();

    let news = report.session("news").unwrap();
    assert_eq!(news.state, SessionState::Completed);
    assert_eq!(news.pages_fetched, 2);
    assert_eq!(news.artifacts_stored, 2);

    let today = Utc::now().date_naive();
    let keys = dispatcher.store().list_keys("news", today).await.unwrap();
    assert_eq!(keys.len(), 2);
}

#[tokio::test]
async fn test_results_file_round_trip() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("home", &[]))
        .mount(&server)
        .await;

    let config = create_test_config(&format!(
        "[websites.siteA]\nurl = \"{}/\"\n",
        server.uri()
    ));
    let sites = config.site_configs().unwrap();

    let report = dispatcher(&config)
        .run(&sites, &Selection::all())
        .await
        .unwrap()
        .with_config_hash("abc123");

    let dir = tempfile::tempdir().unwrap();
    let path = JsonResultsWriter::new(dir.path()).write_report(&report).unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written["config_hash"], "abc123");
    assert_eq!(written["sessions"][0]["site"], "siteA");
    assert_eq!(written["sessions"][0]["pages_fetched"], 1);
}

#[test]
fn test_config_validation_rejects_bad_values() {
    let base = |extra: &str| {
        format!(
            r#"
[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

{}
"#,
            extra
        )
    };

    let cases = [
        "[websites.siteA]\nurl = \"https://a.test/\"\npage-limit = 0\n",
        "[crawler]\nmax-parallel-sessions = 0\n[websites.siteA]\nurl = \"https://a.test/\"\n",
        "[crawler]\nmax-parallel-sessions = 65\n[websites.siteA]\nurl = \"https://a.test/\"\n",
        "[retry]\nmax-attempts = 0\n[websites.siteA]\nurl = \"https://a.test/\"\n",
        "[retry]\nmultiplier = 0.5\n[websites.siteA]\nurl = \"https://a.test/\"\n",
        "[retry]\nbase-delay-ms = 5000\nmax-delay-ms = 100\n[websites.siteA]\nurl = \"https://a.test/\"\n",
        "[websites.\"bad name\"]\nurl = \"https://a.test/\"\n",
        "[websites.siteA]\nurl = \"ftp://a.test/\"\n",
        "",
    ];

    for case in cases {
        assert!(
            parse_config(&base(case)).is_err(),
            "expected rejection for:\n{}",
            case
        );
    }

    assert!(parse_config(&base("[websites.siteA]\nurl = \"https://a.test/\"\n")).is_ok());
}
