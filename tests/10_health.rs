mod common;

use anyhow::Result;
use reqwest::StatusCode;

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = common::ensure_server().await?;

    let res = reqwest::get(server.url("/health")).await?;

    // OK or SERVICE_UNAVAILABLE are both acceptable as a liveness check
    assert!(
        res.status() == StatusCode::OK || res.status() == StatusCode::SERVICE_UNAVAILABLE,
        "unexpected status: {}",
        res.status()
    );

    let body = res.json::<serde_json::Value>().await?;
    assert!(body["data"]["status"].is_string());
    Ok(())
}

#[tokio::test]
async fn root_lists_scopes() -> Result<()> {
    let server = common::ensure_server().await?;

    let body = reqwest::get(server.url("/")).await?.json::<serde_json::Value>().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["scopes"], serde_json::json!(["staff", "manager"]));
    assert_eq!(
        body["data"]["reports"]["manager"],
        serde_json::json!(["finance", "personnel", "payroll"])
    );
    assert_eq!(body["data"]["reports"]["staff"].as_array().map(Vec::len), Some(3));
    Ok(())
}
