//! End-to-end scenarios driven against a mock HTTP server (§8).

use minutes_crawler::config::{Cli, Config};
use minutes_crawler::municipality::Municipality;
use std::collections::HashMap;
use std::fs;

fn base_cli(outdir: &std::path::Path, input: &std::path::Path) -> Cli {
    Cli::parse_from([
        "minutes-crawler",
        "--input",
        input.to_str().unwrap(),
        "--outdir",
        outdir.to_str().unwrap(),
        "--delay",
        "0",
        "--timeout",
        "5",
    ])
}

fn write_municipalities(path: &std::path::Path, seed_url: &str) {
    let municipalities = vec![Municipality {
        prefecture: "Tokyo".to_string(),
        city: "Chiyoda".to_string(),
        parent: HashMap::from([(seed_url.to_string(), 10)]),
        grand_parent: HashMap::new(),
    }];
    fs::write(path, serde_json::to_string(&municipalities).unwrap()).unwrap();
}

use clap::Parser;

#[tokio::test]
async fn crawls_seed_saves_page_and_downloads_file() {
    let mut server = mockito::Server::new_async().await;
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nAllow: /\n")
        .create_async()
        .await;
    let _index = server
        .mock("GET", "/index.html")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(
            r#"<html><body>
                <a href="/page2.html">page2</a>
                <a href="/minutes/doc.pdf">議事録</a>
            </body></html>"#,
        )
        .create_async()
        .await;
    let _page2 = server
        .mock("GET", "/page2.html")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body>no links here</body></html>")
        .create_async()
        .await;
    let _pdf = server
        .mock("GET", "/minutes/doc.pdf")
        .with_status(200)
        .with_header("content-type", "application/pdf")
        .with_body(b"%PDF-1.4 fake minutes")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let outdir = dir.path().join("out");
    let input_path = dir.path().join("municipalities.json");
    let seed_url = format!("{}/index.html", server.url());
    write_municipalities(&input_path, &seed_url);

    let cli = base_cli(&outdir, &input_path);
    let config = Config::from_cli(cli).unwrap();
    let totals = minutes_crawler::run(config).await.unwrap();

    assert_eq!(totals.seeds_total, 1);
    assert_eq!(totals.seeds_done, 1);
    assert_eq!(totals.pages_fetched, 2);
    assert_eq!(totals.files_downloaded, 1);

    let manifest_text = fs::read_to_string(outdir.join("manifest.jsonl")).unwrap();
    assert!(manifest_text.contains("\"kind\":\"seed_done\""));
    assert!(manifest_text.contains("\"kind\":\"downloaded_file\""));

    let files_dir = outdir.join("Tokyo").join("Chiyoda").join("files");
    let pages_dir = outdir.join("Tokyo").join("Chiyoda").join("pages");
    assert!(fs::read_dir(files_dir).unwrap().count() >= 1);
    assert!(fs::read_dir(pages_dir).unwrap().count() >= 2);
}

#[tokio::test]
async fn robots_disallow_skips_seed_and_is_reported() {
    let mut server = mockito::Server::new_async().await;
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /\n")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let outdir = dir.path().join("out");
    let input_path = dir.path().join("municipalities.json");
    let seed_url = format!("{}/index.html", server.url());
    write_municipalities(&input_path, &seed_url);

    let cli = base_cli(&outdir, &input_path);
    let config = Config::from_cli(cli).unwrap();
    let totals = minutes_crawler::run(config).await.unwrap();

    assert_eq!(totals.pages_fetched, 0);
    assert_eq!(totals.files_downloaded, 0);

    let manifest_text = fs::read_to_string(outdir.join("manifest.jsonl")).unwrap();
    assert!(manifest_text.contains("\"kind\":\"seed_skipped\""));
    assert!(manifest_text.contains("robots_denied"));

    let summary = fs::read_to_string(outdir.join("reports").join("robots_disallow_summary.json")).unwrap();
    assert!(summary.contains("\"total_denials\": 1"));
}

#[tokio::test]
async fn resume_skips_unchanged_seed_on_second_run() {
    let mut server = mockito::Server::new_async().await;
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nAllow: /\n")
        .create_async()
        .await;
    let _index = server
        .mock("GET", "/index.html")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_header("etag", "\"v1\"")
        .with_body("<html><body>stable content</body></html>")
        .expect(2)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let outdir = dir.path().join("out");
    let input_path = dir.path().join("municipalities.json");
    let seed_url = format!("{}/index.html", server.url());
    write_municipalities(&input_path, &seed_url);

    let first = Config::from_cli(base_cli(&outdir, &input_path)).unwrap();
    let totals_first = minutes_crawler::run(first).await.unwrap();
    assert_eq!(totals_first.pages_fetched, 1);

    let second = Config::from_cli(base_cli(&outdir, &input_path)).unwrap();
    let totals_second = minutes_crawler::run(second).await.unwrap();
    assert_eq!(totals_second.pages_fetched, 0);

    let manifest_text = fs::read_to_string(outdir.join("manifest.jsonl")).unwrap();
    assert!(manifest_text.matches("\"kind\":\"seed_done\"").count() == 1);
    assert!(manifest_text.contains("completed_unchanged") || manifest_text.contains("no_change_detected"));
}
