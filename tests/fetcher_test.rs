// Tests for SptFetcher against a mocked streamflow-prediction-tool API
// Uses mockito for HTTP mocking

use hydroviewer_service::fetch_error::FetchError;
use hydroviewer_service::fetcher::SptFetcher;
use mockito::{Matcher, Server};

fn create_test_fetcher(base_url: String) -> SptFetcher {
    SptFetcher::new(base_url, "test-token".to_string())
}

#[tokio::test]
async fn test_fetch_ensemble_csv_success() {
    let mut server = Server::new_async().await;

    let csv = "datetime,ens01,ens02\n2025-03-01 00:00:00,10.0,20.0\n";
    let mock = server
        .mock("GET", "/apps/streamflow-prediction-tool/api/GetEnsemble/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("watershed_name".into(), "nile".into()),
            Matcher::UrlEncoded("subbasin_name".into(), "blue".into()),
            Matcher::UrlEncoded("reach_id".into(), "12345".into()),
            Matcher::UrlEncoded("forecast_folder".into(), "most_recent".into()),
        ]))
        .match_header("authorization", "Token test-token")
        .with_status(200)
        .with_body(csv)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let result = fetcher
        .fetch_ensemble_csv("nile", "blue", "12345", "most_recent")
        .await;

    assert_eq!(result.unwrap(), csv);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_return_periods_numeric_and_string_values() {
    let mut server = Server::new_async().await;

    // Upstream serializes thresholds inconsistently; both forms must parse.
    let body = r#"{"two": 120.5, "ten": "310.25", "twenty": 452, "max": "980.1"}"#;
    let _mock = server
        .mock("GET", "/apps/streamflow-prediction-tool/api/GetReturnPeriods/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let thresholds = fetcher
        .fetch_return_periods("nile", "blue", "12345")
        .await
        .unwrap();

    assert_eq!(thresholds["two"], 120.5);
    assert_eq!(thresholds["ten"], 310.25);
    assert_eq!(thresholds["twenty"], 452.0);
    assert_eq!(thresholds["max"], 980.1);
}

#[tokio::test]
async fn test_fetch_return_periods_rejects_unparseable_value() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", "/apps/streamflow-prediction-tool/api/GetReturnPeriods/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"two": "not-a-flow"}"#)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let result = fetcher.fetch_return_periods("nile", "blue", "12345").await;

    assert!(matches!(result, Err(FetchError::NumberError(_))));
}

#[tokio::test]
async fn test_fetch_warning_points_extracts_features() {
    let mut server = Server::new_async().await;

    let body = r#"{"type": "FeatureCollection", "features": [{"id": 7}]}"#;
    let _mock = server
        .mock("GET", "/apps/streamflow-prediction-tool/api/GetWarningPoints/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("watershed_name".into(), "nile".into()),
            Matcher::UrlEncoded("return_period".into(), "20".into()),
        ]))
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let features = fetcher
        .fetch_warning_points("nile", "blue", 20)
        .await
        .unwrap();

    assert_eq!(features[0]["id"], 7);
}

#[tokio::test]
async fn test_fetch_warning_points_missing_features_field() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", "/apps/streamflow-prediction-tool/api/GetWarningPoints/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"type": "FeatureCollection"}"#)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let result = fetcher.fetch_warning_points("nile", "blue", 2).await;

    assert!(matches!(result, Err(FetchError::MissingField("features"))));
}

#[tokio::test]
async fn test_upstream_error_status_is_not_retried() {
    let mut server = Server::new_async().await;

    // HTTP-level errors are terminal; only transport failures retry.
    let mock = server
        .mock("GET", "/apps/streamflow-prediction-tool/api/GetEnsemble/")
        .match_query(Matcher::Any)
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let result = fetcher
        .fetch_ensemble_csv("nile", "blue", "12345", "most_recent")
        .await;

    assert!(matches!(result, Err(FetchError::UpstreamStatus(status)) if status == 500));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_historic_csv_requests_csv_format() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", "/apps/streamflow-prediction-tool/api/GetHistoricData/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("reach_id".into(), "12345".into()),
            Matcher::UrlEncoded("return_format".into(), "csv".into()),
        ]))
        .with_status(200)
        .with_body("datetime,streamflow\n2010-01-01,3.5\n")
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let result = fetcher.fetch_historic_csv("nile", "blue", "12345").await;

    assert!(result.unwrap().starts_with("datetime,streamflow"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_available_dates_passthrough() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock(
            "GET",
            "/apps/streamflow-prediction-tool/api/GetAvailableDates/",
        )
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"available_dates": ["20250301.00", "20250302.00"]}"#)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let dates = fetcher.fetch_available_dates("nile", "blue").await.unwrap();

    assert_eq!(dates["available_dates"][1], "20250302.00");
}
