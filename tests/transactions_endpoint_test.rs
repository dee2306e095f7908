use axum::http::StatusCode;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;
use traderev::api;
use traderev::config::Config;
use traderev::db::init_db;
use traderev::Repository;

struct TestApp {
    app: axum::Router,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let config = Config {
        port: 0,
        database_path: db_path,
        page_size: 100,
        store_timeout_ms: 5000,
    };

    let app = api::create_router(api::AppState { repo, config });
    TestApp {
        app,
        _temp: temp_dir,
    }
}

const CSV_HEADER: &str = "id,symbol,underlying,putcall,positioneffect,transactiondate,amount,cost,price,commission,optregfee,regfee,additionalfee,cdscfee,othercharges,rfee,secfee";

// 2022-11-10T12:00:00Z and 2022-11-11T12:00:00Z.
const DAY1_NOON: i64 = 1668081600000;
const DAY2_NOON: i64 = 1668168000000;

fn sample_csv() -> String {
    format!(
        "{CSV_HEADER}\n\
         1,XYZ_111822C100,XYZ,CALL,OPENING,{DAY1_NOON},10,-500,0.5,6.5,0.035,0.011,0,0,0,0,0.014\n\
         2,XYZ_111822C100,XYZ,CALL,CLOSING,{DAY2_NOON},10,600,0.6,6.5,0.035,0.011,0,0,0,0,0.014"
    )
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn post_csv(app: axum::Router, uri: &str, body: String) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "text/csv")
        .body(axum::body::Body::from(body))
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_import_reports_counts() {
    let test_app = setup_test_app().await;

    let (status, json) = post_csv(
        test_app.app.clone(),
        "/v1/transactions/import",
        sample_csv(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["received"], 2);
    assert_eq!(json["inserted"], 2);
    assert_eq!(json["duplicates"], 0);
    assert!(json["runId"].is_string());
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let test_app = setup_test_app().await;

    post_csv(
        test_app.app.clone(),
        "/v1/transactions/import",
        sample_csv(),
    )
    .await;
    let (status, json) = post_csv(
        test_app.app.clone(),
        "/v1/transactions/import",
        sample_csv(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["inserted"], 0);
    assert_eq!(json["duplicates"], 2);
}

#[tokio::test]
async fn test_import_rejects_bad_rows() {
    let test_app = setup_test_app().await;

    let bad = format!(
        "{CSV_HEADER}\n1,XYZ,XYZ,,OPENING,{DAY1_NOON},ten,-500,0.5,6.5,0,0,0,0,0,0,0"
    );
    let (status, json) = post_csv(test_app.app.clone(), "/v1/transactions/import", bad).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = json["error"].as_str().unwrap();
    assert!(message.contains("amount"), "error was: {}", message);
}

#[tokio::test]
async fn test_list_transactions_newest_first() {
    let test_app = setup_test_app().await;
    post_csv(
        test_app.app.clone(),
        "/v1/transactions/import",
        sample_csv(),
    )
    .await;

    let (status, json) = get(test_app.app.clone(), "/v1/transactions?limit=10").await;

    assert_eq!(status, StatusCode::OK);
    let transactions = json["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0]["id"], 2);
    assert_eq!(transactions[1]["id"], 1);
}

#[tokio::test]
async fn test_transaction_by_id_has_expected_fields() {
    let test_app = setup_test_app().await;
    post_csv(
        test_app.app.clone(),
        "/v1/transactions/import",
        sample_csv(),
    )
    .await;

    let (status, json) = get(test_app.app.clone(), "/v1/transactions/1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], 1);
    assert_eq!(json["symbol"], "XYZ_111822C100");
    assert_eq!(json["underlying"], "XYZ");
    assert_eq!(json["putCall"], "CALL");
    assert_eq!(json["effect"], "OPENING");
    assert_eq!(json["transactionDate"], DAY1_NOON);
    assert_eq!(json["amount"], "10");
    assert_eq!(json["cost"], "-500");
    assert_eq!(json["commission"], "6.5");
    assert_eq!(json["totalFees"], "0.06");
}

#[tokio::test]
async fn test_transaction_by_id_missing_is_404() {
    let test_app = setup_test_app().await;

    let (status, _json) = get(test_app.app.clone(), "/v1/transactions/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_transactions_by_day_windows_correctly() {
    let test_app = setup_test_app().await;
    post_csv(
        test_app.app.clone(),
        "/v1/transactions/import",
        sample_csv(),
    )
    .await;

    let (status, json) = get(test_app.app.clone(), "/v1/transactions/daily/2022-11-10").await;
    assert_eq!(status, StatusCode::OK);
    let transactions = json["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["id"], 1);

    let (_status, json) = get(test_app.app.clone(), "/v1/transactions/daily/2022-11-12").await;
    assert!(json["transactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_transactions_by_day_rejects_bad_date() {
    let test_app = setup_test_app().await;

    let (status, _json) = get(test_app.app.clone(), "/v1/transactions/daily/yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_ready() {
    let test_app = setup_test_app().await;

    let (status, json) = get(test_app.app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");

    let (status, json) = get(test_app.app.clone(), "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ready");
}
