mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{read_json, TestApp};
use serde::Deserialize;

#[derive(Deserialize)]
struct JobPage {
    items: Vec<JobItem>,
    total: u64,
    page: u32,
    size: u32,
}

#[derive(Deserialize)]
struct JobItem {
    id: u64,
    title: String,
    rate_max: Option<i64>,
    skills: Vec<String>,
    published: bool,
}

fn seed(app: &TestApp) -> Vec<u64> {
    vec![
        app.store.seed_job("Rust バックエンド", "東京都", 800000, true),
        app.store.seed_job("Go API 開発", "大阪府", 700000, true),
        app.store.seed_job("Rust 組込み", "東京都", 900000, false),
        app.store.seed_job("データ基盤 Rust", "リモート", 750000, true),
        app.store.seed_job("フロントエンド", "東京都", 600000, true),
    ]
}

#[tokio::test]
async fn public_listing_pages_published_jobs() -> Result<()> {
    let app = TestApp::new()?;
    seed(&app);

    let response = app.get("/api/jobs?size=2", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let first: JobPage = read_json(response).await?;
    assert_eq!(first.total, 4);
    assert_eq!(first.page, 1);
    assert_eq!(first.size, 2);
    assert!(first.items.len() <= 2);
    assert!(first.items.iter().all(|job| job.published));
    // newest first
    assert_eq!(first.items[0].title, "フロントエンド");
    assert_eq!(first.items[0].skills, vec!["Rust".to_string()]);

    let response = app.get("/api/jobs?size=2&page=3", None).await?;
    let beyond: JobPage = read_json(response).await?;
    assert_eq!(beyond.total, 4);
    assert!(beyond.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn far_pages_are_empty_but_keep_the_total() -> Result<()> {
    let app = TestApp::new()?;
    seed(&app);

    for path in [
        "/api/jobs?page=4294967295&size=100",
        "/api/jobs?page=102&size=100",
    ] {
        let response = app.get(path, None).await?;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        let page: JobPage = read_json(response).await?;
        assert_eq!(page.total, 4, "{path}");
        assert_eq!(page.size, 100);
        assert!(page.items.is_empty(), "{path}");
    }

    let response = app.get("/api/jobs?page=4294967295&size=100", None).await?;
    let page: JobPage = read_json(response).await?;
    assert_eq!(page.page, u32::MAX);
    Ok(())
}

#[tokio::test]
async fn keyword_location_and_price_sort() -> Result<()> {
    let app = TestApp::new()?;
    seed(&app);

    let response = app
        .get("/api/jobs?query=Rust&sort=price", None)
        .await?;
    let page: JobPage = read_json(response).await?;
    let titles: Vec<&str> = page.items.iter().map(|job| job.title.as_str()).collect();
    assert_eq!(titles, vec!["Rust バックエンド", "データ基盤 Rust"]);
    assert_eq!(page.items[0].rate_max, Some(800000));

    let response = app
        .get("/api/jobs?loc=%E6%9D%B1%E4%BA%AC", None)
        .await?;
    let page: JobPage = read_json(response).await?;
    assert_eq!(page.total, 2);
    Ok(())
}

#[tokio::test]
async fn invalid_paging_is_rejected() -> Result<()> {
    let app = TestApp::new()?;
    for path in ["/api/jobs?page=0", "/api/jobs?size=0", "/api/jobs?size=101"] {
        let response = app.get(path, None).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
    }
    Ok(())
}

#[tokio::test]
async fn job_detail_hides_unpublished() -> Result<()> {
    let app = TestApp::new()?;
    let ids = seed(&app);

    let response = app.get(&format!("/api/jobs/{}", ids[0]), None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let job: JobItem = read_json(response).await?;
    assert_eq!(job.id, ids[0]);

    let response = app.get(&format!("/api/jobs/{}", ids[2]), None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/api/jobs/999", None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn repeated_searches_are_served_from_cache() -> Result<()> {
    let app = TestApp::new()?;
    seed(&app);

    app.get("/api/jobs?query=Rust", None).await?;
    let after_first = app.store.call_count();
    app.get("/api/jobs?query=Rust", None).await?;
    app.get("/api/jobs?query=%20Rust%20", None).await?;
    assert_eq!(app.store.call_count(), after_first);
    Ok(())
}

#[tokio::test]
async fn health_check_reports_ok() -> Result<()> {
    let app = TestApp::new()?;
    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = read_json(response).await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "talent-match");
    assert_eq!(app.store.call_count(), 0);
    Ok(())
}
