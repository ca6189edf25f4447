//! Integration tests for both crawl phases
//!
//! These tests use wiremock to serve listing and detail pages and run full
//! sessions through the HTTP renderer.

use pagewalk::config::{parse_config, Config};
use pagewalk::crawler::{Phase, StopReason};
use pagewalk::output::read_listing_csv;
use pagewalk::render::HttpRenderer;
use pagewalk::{CrawlError, CrawlLimits, CrawlSession, ListingRecord};
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHALLENGE: &str = r#"<html><body>
    <p class="reasonExp">Blocked by our security policy. Please verify.</p>
    </body></html>"#;

/// Creates a configuration pointing at the mock server
fn create_test_config(base_url: &str, output_dir: &Path) -> Config {
    let toml = format!(
        r#"
[session]
login-wait-ms = 0
pacing-ms = 5
retries = 1
retry-delay-ms = 5
checkpoint-every = 2

[http]
user-agent = "pagewalk-test/1.0"
timeout-ms = 5000

[challenge]
marker-selector = "p.reasonExp"
marker-text = "security policy"
initial-wait-ms = 10
poll-interval-ms = 10
max-wait-ms = 2000

[listing]
url-template = "{base_url}/search?page={{page}}"
container = "article.list"
item = "article.list-item"

[listing.key]
selector = "div.list-section-corp a"
transforms = ["trim"]

[listing.detail-ref]
selector = "div.information-title a"
attribute = "href"

[[detail.fields]]
name = "email"
column = "Email"
required = true
rule = {{ css = "span.tahoma a.devChargeEmail" }}
transforms = ["email"]

[[detail.fields]]
name = "position"
column = "Position Name"
rule = {{ css = "article.artReadJobSum h3.hd_3" }}
transforms = ["trim", "last-line"]

[[detail.fields]]
name = "homepage"
column = "Homepage"
attribute = "href"
[detail.fields.rule.labeled]
scope = "dl.tbList"
contains = "Homepage"
inner = "a"

[output]
directory = "{}"
"#,
        output_dir.display()
    );
    parse_config(&toml).expect("test config should be valid")
}

fn listing_page(items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(company, href)| {
            format!(
                r#"<article class="list-item">
                    <div class="list-section-corp"><a> {company} </a></div>
                    <div class="information-title"><a href="{href}">Backend Developer</a></div>
                </article>"#
            )
        })
        .collect();
    format!(r#"<html><body><article class="list">{items}</article></body></html>"#)
}

fn detail_page(position: &str, email: Option<&str>, homepage: Option<&str>) -> String {
    let email = email
        .map(|e| format!(r#"<span class="tahoma"><a class="devChargeEmail">Contact: {e}</a></span>"#))
        .unwrap_or_default();
    let homepage = homepage
        .map(|h| format!(r#"<dt>Homepage</dt><dd><a href="{h}">{h}</a></dd>"#))
        .unwrap_or_default();
    format!(
        r#"<html><body>
        <article class="artReadJobSum"><h3 class="hd_3">
            Company header
            {position}
        </h3></article>
        {email}
        <dl class="tbList"><dt>Industry</dt><dd>Software</dd>{homepage}</dl>
        </body></html>"#
    )
}

async fn mount_html(server: &MockServer, url_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

async fn mount_listing_page(server: &MockServer, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", page.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn session(config: Config, limits: CrawlLimits) -> CrawlSession {
    CrawlSession::new(config, limits, CancellationToken::new(), "integration")
}

#[tokio::test]
async fn test_listing_phase_writes_csv() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_listing_page(
        &server,
        1,
        listing_page(&[("Acme", "/job/1"), ("Beta", "/job/2")]),
    )
    .await;
    mount_listing_page(&server, 2, listing_page(&[("Gamma", "/job/3")])).await;
    mount_listing_page(
        &server,
        3,
        "<html><body><p>No results</p></body></html>".to_string(),
    )
    .await;

    let config = create_test_config(&server.uri(), dir.path());
    let mut renderer = HttpRenderer::new(&config.http).unwrap();
    let report = session(config, CrawlLimits::default())
        .run_listing(&mut renderer)
        .await
        .unwrap();

    assert_eq!(report.phase, Phase::Listing);
    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(report.progress.pages_visited(), 3);
    assert_eq!(report.rows_written, 3);

    let output = report.output.unwrap();
    let file_name = output.file_name().unwrap().to_str().unwrap();
    assert!(file_name.starts_with("recruit_urls_"));
    assert!(file_name.ends_with(".csv"));

    let records = read_listing_csv(&output, "Company Name", "URL").unwrap();
    assert_eq!(
        records,
        vec![
            ListingRecord::new("Acme", format!("{}/job/1", server.uri())),
            ListingRecord::new("Beta", format!("{}/job/2", server.uri())),
            ListingRecord::new("Gamma", format!("{}/job/3", server.uri())),
        ]
    );
}

#[tokio::test]
async fn test_listing_cap_stops_mid_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_listing_page(
        &server,
        1,
        listing_page(&[("A", "/job/1"), ("B", "/job/2"), ("C", "/job/3")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&[("D", "/job/4")])))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), dir.path());
    let mut renderer = HttpRenderer::new(&config.http).unwrap();
    let limits = CrawlLimits {
        max_listing_items: 2,
        ..Default::default()
    };
    let report = session(config, limits)
        .run_listing(&mut renderer)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::ListingCapReached);
    assert_eq!(report.progress.items_collected(), 2);
    assert_eq!(report.rows_written, 2);
}

#[tokio::test]
async fn test_detail_phase_round_trip_with_challenge() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = server.uri();

    // Phase 1 output, written the way the listing phase writes it
    let input = dir.path().join("recruit_urls_20250207_112942.csv");
    std::fs::write(
        &input,
        format!(
            "Company Name,URL\nAcme,{base}/job/1\nBeta,{base}/job/2\nGamma,{base}/job/3\nDelta,{base}/job/4\n"
        ),
    )
    .unwrap();

    mount_html(
        &server,
        "/job/1",
        detail_page("Backend Developer", Some("jobs@acme.example"), Some("https://acme.example")),
    )
    .await;

    // Job 2 shows the challenge page on the first two loads
    Mock::given(method("GET"))
        .and(path("/job/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHALLENGE))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_html(
        &server,
        "/job/2",
        detail_page("Data Engineer", Some("Mail: hr@beta.example (HR)"), None),
    )
    .await;

    // Job 3 has no contact address and is dropped
    mount_html(&server, "/job/3", detail_page("Designer", None, None)).await;

    // Job 4 fails once, then succeeds on retry
    Mock::given(method("GET"))
        .and(path("/job/4"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_html(
        &server,
        "/job/4",
        detail_page("QA Engineer", Some("qa@delta.example"), None),
    )
    .await;

    let config = create_test_config(&base, dir.path());
    let records = read_listing_csv(&input, "Company Name", "URL").unwrap();
    assert_eq!(records.len(), 4);

    let mut renderer = HttpRenderer::new(&config.http).unwrap();
    let report = session(config, CrawlLimits::default())
        .run_detail(&mut renderer, records)
        .await
        .unwrap();

    assert_eq!(report.phase, Phase::Detail);
    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(report.progress.records_visited(), 4);
    assert_eq!(report.progress.results_collected(), 3);
    assert_eq!(report.progress.records_skipped(), 1);
    assert_eq!(report.progress.challenges_seen(), 1);

    let output = report.output.unwrap();
    assert!(output
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("email_results_"));

    let content = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Company Name,Email,Position Name,Homepage",
            "Acme,jobs@acme.example,Backend Developer,https://acme.example",
            "Beta,hr@beta.example,Data Engineer,",
            "Delta,qa@delta.example,QA Engineer,",
        ]
    );
}

#[tokio::test]
async fn test_redirect_to_interstitial_returns_to_detail_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = server.uri();

    // The first request for the job is sent through a verification page
    Mock::given(method("GET"))
        .and(path("/job/1"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/verify"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_html(
        &server,
        "/job/1",
        detail_page("Backend Developer", Some("jobs@acme.example"), None),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHALLENGE))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_html(
        &server,
        "/verify",
        "<html><body><p>Verified</p></body></html>".to_string(),
    )
    .await;

    let config = create_test_config(&base, dir.path());
    let records = vec![ListingRecord::new("Acme", format!("{base}/job/1"))];

    let mut renderer = HttpRenderer::new(&config.http).unwrap();
    let report = session(config, CrawlLimits::default())
        .run_detail(&mut renderer, records)
        .await
        .unwrap();

    assert_eq!(report.progress.challenges_seen(), 1);
    assert_eq!(report.progress.results_collected(), 1);
    assert_eq!(report.progress.records_skipped(), 0);

    let content = std::fs::read_to_string(report.output.unwrap()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Company Name,Email,Position Name,Homepage",
            "Acme,jobs@acme.example,Backend Developer,",
        ]
    );
}

#[tokio::test]
async fn test_script_pagination_rejected_by_http_renderer() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&[])))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), dir.path());
    if let Some(listing) = config.listing.as_mut() {
        listing.url_template = None;
        listing.start_url = Some(format!("{}/members", server.uri()));
        listing.page_script = Some("pageSend({page})".to_string());
    }

    let mut renderer = HttpRenderer::new(&config.http).unwrap();
    let result = session(config, CrawlLimits::default())
        .run_listing(&mut renderer)
        .await;

    assert!(matches!(result, Err(CrawlError::Config(_))));
}

#[tokio::test]
async fn test_persistent_challenge_stops_detail_phase() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = server.uri();

    mount_html(
        &server,
        "/job/1",
        detail_page("Backend Developer", Some("jobs@acme.example"), None),
    )
    .await;
    mount_html(&server, "/job/2", CHALLENGE.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/job/3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(&base, dir.path());
    if let Some(challenge) = config.challenge.as_mut() {
        challenge.max_wait_ms = 50;
    }
    let records = vec![
        ListingRecord::new("Acme", format!("{base}/job/1")),
        ListingRecord::new("Beta", format!("{base}/job/2")),
        ListingRecord::new("Gamma", format!("{base}/job/3")),
    ];

    let mut renderer = HttpRenderer::new(&config.http).unwrap();
    let report = session(config, CrawlLimits::default())
        .run_detail(&mut renderer, records)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::ChallengeEscalated);
    assert_eq!(report.rows_written, 1);
    assert_eq!(report.progress.records_visited(), 2);
}

#[tokio::test]
async fn test_visit_cap_limits_requests() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = server.uri();

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(detail_page("Anything", Some("a@b.example"), None)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let config = create_test_config(&base, dir.path());
    let records = (1..=5)
        .map(|n| ListingRecord::new(format!("Company {n}"), format!("{base}/job/{n}")))
        .collect();
    let limits = CrawlLimits {
        max_records_to_visit: 2,
        ..Default::default()
    };

    let mut renderer = HttpRenderer::new(&config.http).unwrap();
    let report = session(config, limits)
        .run_detail(&mut renderer, records)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::VisitCapReached);
    assert_eq!(report.rows_written, 2);
}
