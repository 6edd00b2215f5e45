// tests/batch_pipeline.rs
//
// End to end: proxy-backed loading, local extraction, batch isolation and export.

use selector_scraper::batch::{BatchOptions, BatchOrchestrator, BatchStatus, LocalPipeline};
use selector_scraper::export::{csv, export_as, ExportFormat};
use selector_scraper::extractors::ExtractionEngine;
use selector_scraper::loader::{ContentLoader, LoadOptions};
use selector_scraper::model::{ExtractionType, FieldValue, Selector};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRODUCTS: &str = r#"<html><head></head><body>
    <div class="card"><h2>Lamp</h2><span class="price">$20</span></div>
    <div class="card"><h2>Desk</h2><span class="price">$150</span></div>
</body></html>"#;

const ARTICLE: &str = r#"<html><head></head><body>
    <section><h2>Release notes, "v2"</h2><img class="hero" src="/hero.png"></section>
</body></html>"#;

async fn proxy_site() -> MockServer {
    let server = MockServer::start().await;
    for (url, page) in [("https://shop.test/1", PRODUCTS), ("https://shop.test/3", ARTICLE)] {
        Mock::given(method("POST"))
            .and(path("/proxy"))
            .and(body_partial_json(serde_json::json!({ "url": url })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "content": page }
            })))
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/proxy"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/relay"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    server
}

fn selectors() -> Vec<Selector> {
    vec![
        Selector::new("h2", ExtractionType::Text).unwrap().named("title"),
        Selector::new(".price", ExtractionType::Text).unwrap().named("price"),
        Selector::new("img.hero", ExtractionType::Image).unwrap().named("image"),
    ]
}

#[tokio::test]
async fn failed_url_does_not_stop_the_batch() {
    let server = proxy_site().await;
    let loader = ContentLoader::new(&format!("{}/proxy", server.uri()), &format!("{}/relay", server.uri())).unwrap();
    let orchestrator = BatchOrchestrator::new(LocalPipeline::new(loader, ExtractionEngine::new(), LoadOptions::default()));

    let options = BatchOptions {
        inter_request_delay_ms: 0,
        ..BatchOptions::default()
    };
    let urls = ["https://shop.test/1", "https://shop.test/2", "https://shop.test/3"];
    let results = orchestrator.run(urls, &selectors(), &options).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].records.len(), 2);
    assert_eq!(results[0].records[1].get("price"), Some(&FieldValue::from("$150")));
    assert!(results[1].is_error());
    assert!(results[1].records.is_empty());
    assert_eq!(results[2].records.len(), 1);
    assert_eq!(results[2].records[0].get("image"), Some(&FieldValue::from("/hero.png")));

    let job = orchestrator.snapshot();
    assert_eq!(job.status, BatchStatus::Completed);
    assert_eq!(job.progress_percent, 100);

    // the CSV export carries every field plus one error row
    let out = export_as(&results, &ExportFormat::Csv).unwrap();
    let rows = csv::parse_rows(&out.content).unwrap();
    assert_eq!(rows[0], csv::HEADER.map(str::to_string).to_vec());
    let error_rows: Vec<_> = rows.iter().filter(|r| r[2] == csv::ERROR_FIELD_TYPE).collect();
    assert_eq!(error_rows.len(), 1);
    assert_eq!(error_rows[0][0], "https://shop.test/2");
    assert!(rows
        .iter()
        .any(|r| r[0] == "https://shop.test/3" && r[1] == "title" && r[3] == r#"Release notes, "v2""#));
    // header + 2 cards * 2 fields + error + 2 article fields
    assert_eq!(rows.len(), 8);
}

#[tokio::test]
async fn sql_export_of_batch_parses_back() {
    let server = proxy_site().await;
    let loader = ContentLoader::new(&format!("{}/proxy", server.uri()), &format!("{}/relay", server.uri())).unwrap();
    let orchestrator = BatchOrchestrator::new(LocalPipeline::new(loader, ExtractionEngine::new(), LoadOptions::default()));
    let options = BatchOptions {
        inter_request_delay_ms: 0,
        ..BatchOptions::default()
    };
    let results = orchestrator
        .run(["https://shop.test/1"], &selectors(), &options)
        .await
        .unwrap();

    let out = export_as(&results, &ExportFormat::SqlInsert { table: "products".into() }).unwrap();
    assert!(out.content.starts_with("CREATE TABLE IF NOT EXISTS products"));
    let parsed = selector_scraper::export::sql::parse_inserts(&out.content).unwrap();
    assert_eq!(parsed, results);
}
