//! End-to-end pipeline tests against a local mock server.

use std::path::Path;

use sitelocal::config::LocalizeConfig;
use sitelocal::crawl_engine::{run_localization, RetryPolicy};
use sitelocal::report::{ASSET_MAP_FILE, CLASSIFICATION_FILE, REPORT_FILE};

fn test_config(site_root: &Path) -> LocalizeConfig {
    LocalizeConfig::builder()
        .site_root(site_root)
        .target_domains(vec!["127.0.0.1".to_string()])
        .concurrency(4)
        .retry(RetryPolicy::without_delay(2))
        .build()
        .unwrap()
}

async fn write_page(site_root: &Path, name: &str, content: &str) {
    tokio::fs::write(site_root.join(name), content).await.unwrap();
}

#[tokio::test]
async fn recursive_discovery_downloads_and_rewrites() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let css_body = format!("body {{ background: url({base}/img/bg.png); }}");
    let css_mock = server
        .mock("GET", "/css/site.css")
        .with_header("content-type", "text/css")
        .with_body(&css_body)
        .create_async()
        .await;
    let png_mock = server
        .mock("GET", "/img/bg.png")
        .with_header("content-type", "image/png")
        .with_body([0x89u8, 0x50, 0x4e, 0x47].as_slice())
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_page(
        root,
        "index.html",
        &format!(r#"<link rel="stylesheet" href="{base}/css/site.css">"#),
    )
    .await;

    let summary = run_localization(&test_config(root)).await.unwrap();
    css_mock.assert_async().await;
    png_mock.assert_async().await;

    assert!(summary.is_success());
    assert_eq!(summary.downloaded, 2);
    // The image only becomes visible after the stylesheet is scanned.
    assert_eq!(summary.waves, 2);

    let page = tokio::fs::read_to_string(root.join("index.html")).await.unwrap();
    assert!(page.contains(r#"href="assets/127.0.0.1/css/site.css""#));
    assert!(!page.contains(&base));

    // The stylesheet itself is rewritten relative to its own location.
    let css = tokio::fs::read_to_string(root.join("assets/127.0.0.1/css/site.css"))
        .await
        .unwrap();
    assert!(css.contains("url(../img/bg.png)"), "css was: {css}");

    let png = tokio::fs::read(root.join("assets/127.0.0.1/img/bg.png")).await.unwrap();
    assert_eq!(png, [0x89, 0x50, 0x4e, 0x47]);

    for artifact in [ASSET_MAP_FILE, CLASSIFICATION_FILE, REPORT_FILE] {
        assert!(root.join(artifact).exists(), "missing {artifact}");
    }
}

#[tokio::test]
async fn spellings_of_one_url_download_once() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let js_mock = server
        .mock("GET", "/js/app.js")
        .with_header("content-type", "application/javascript")
        .with_body("console.log('app');")
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let escaped = format!("{base}/js/app.js").replace('/', r"\/");
    write_page(
        root,
        "index.html",
        &format!(
            "<script src=\"{base}/js/app.js\"></script>\n\
             <script>window.__data = {{\"script\":\"{escaped}\"}};</script>"
        ),
    )
    .await;

    let summary = run_localization(&test_config(root)).await.unwrap();
    js_mock.assert_async().await;
    assert!(summary.is_success());
    assert_eq!(summary.downloaded, 1);

    let page = tokio::fs::read_to_string(root.join("index.html")).await.unwrap();
    assert!(page.contains(r#"src="assets/127.0.0.1/js/app.js""#));
    assert!(page.contains(r#""script":"assets\/127.0.0.1\/js\/app.js""#));
    assert!(!page.contains("127.0.0.1:"), "page was: {page}");

    // Both spellings resolve in the asset map.
    let map: serde_json::Value = serde_json::from_str(
        &tokio::fs::read_to_string(root.join(ASSET_MAP_FILE)).await.unwrap(),
    )
    .unwrap();
    assert_eq!(map[format!("{base}/js/app.js")], "assets/127.0.0.1/js/app.js");
    assert_eq!(map[&escaped], "assets/127.0.0.1/js/app.js");
}

#[tokio::test]
async fn terminal_failures_are_reported_and_leave_pages_alone() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let broken_mock = server
        .mock("GET", "/missing.js")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;
    let ok_mock = server
        .mock("GET", "/ok.css")
        .with_header("content-type", "text/css")
        .with_body("body {}")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_page(
        root,
        "index.html",
        &format!(
            "<script src=\"{base}/missing.js\"></script>\n\
             <link rel=\"stylesheet\" href=\"{base}/ok.css\">"
        ),
    )
    .await;

    let summary = run_localization(&test_config(root)).await.unwrap();
    broken_mock.assert_async().await;
    ok_mock.assert_async().await;

    assert!(!summary.is_success());
    assert_eq!(summary.downloaded, 1);
    let failed_url = format!("{base}/missing.js");
    assert!(summary.failures.contains_key(&failed_url));

    // The healthy asset is localized, the failed one keeps its remote URL.
    let page = tokio::fs::read_to_string(root.join("index.html")).await.unwrap();
    assert!(page.contains(r#"href="assets/127.0.0.1/ok.css""#));
    assert!(page.contains(&failed_url));

    let report = tokio::fs::read_to_string(root.join(REPORT_FILE)).await.unwrap();
    assert!(report.contains("## Failures"));
    assert!(report.contains("/missing.js"));
}

#[tokio::test]
async fn second_run_over_localized_site_changes_nothing() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let mock = server
        .mock("GET", "/logo.png")
        .with_header("content-type", "image/png")
        .with_body("png-bytes")
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_page(
        root,
        "index.html",
        &format!(r#"<img src="{base}/logo.png">"#),
    )
    .await;

    let first = run_localization(&test_config(root)).await.unwrap();
    assert!(first.is_success());
    assert_eq!(first.downloaded, 1);
    let after_first = tokio::fs::read(root.join("index.html")).await.unwrap();

    let second = run_localization(&test_config(root)).await.unwrap();
    mock.assert_async().await;
    assert!(second.is_success());
    assert_eq!(second.downloaded, 0);
    assert!(second.changed_files.is_empty());
    let after_second = tokio::fs::read(root.join("index.html")).await.unwrap();
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn subdirectory_pages_get_relative_asset_paths() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    server
        .mock("GET", "/shared.css")
        .with_header("content-type", "text/css")
        .with_body("h1 {}")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_page(
        root,
        "index.html",
        &format!(r#"<link href="{base}/shared.css">"#),
    )
    .await;
    tokio::fs::create_dir_all(root.join("courses")).await.unwrap();
    write_page(
        root,
        "courses/intro.html",
        &format!(r#"<link href="{base}/shared.css">"#),
    )
    .await;

    let summary = run_localization(&test_config(root)).await.unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.downloaded, 1);

    let top = tokio::fs::read_to_string(root.join("index.html")).await.unwrap();
    assert!(top.contains(r#"href="assets/127.0.0.1/shared.css""#));
    let nested = tokio::fs::read_to_string(root.join("courses/intro.html"))
        .await
        .unwrap();
    assert!(nested.contains(r#"href="../assets/127.0.0.1/shared.css""#));
}
