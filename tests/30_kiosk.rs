mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn status_rejects_bad_path_parameters() -> Result<()> {
    let server = common::ensure_server().await?;

    let res = reqwest::get(server.url(&format!("/kiosk/status/visitor/{}", Uuid::new_v4()))).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(res.json::<Value>().await?["field_errors"]["kind"].is_string());

    let res = reqwest::get(server.url("/kiosk/status/student/not-a-uuid")).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn check_in_rejects_unknown_kind() -> Result<()> {
    let server = common::ensure_server().await?;

    let res = reqwest::Client::new()
        .post(server.url("/kiosk/check-in"))
        .json(&json!({ "kind": "visitor", "person_id": Uuid::new_v4() }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn check_in_and_out_cycle() -> Result<()> {
    let server = common::ensure_server().await?;
    if !common::database_available(server).await? {
        return Ok(());
    }
    let client = reqwest::Client::new();
    let person_id = Uuid::new_v4();
    let body = json!({ "kind": "student", "person_id": person_id, "kiosk": "lobby" });

    let res = client.post(server.url("/kiosk/check-in")).json(&body).send().await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created = res.json::<Value>().await?;
    assert_eq!(created["data"]["session"]["kiosk"], "lobby");
    assert!(created["data"]["session"]["checked_out_at"].is_null());

    // Second check-in while the first is open
    let res = client.post(server.url("/kiosk/check-in")).json(&body).send().await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let status = reqwest::get(server.url(&format!("/kiosk/status/student/{}", person_id)))
        .await?
        .json::<Value>()
        .await?;
    assert_eq!(status["data"]["checked_in"], true);

    let res = client
        .post(server.url("/kiosk/check-out"))
        .json(&json!({ "kind": "student", "person_id": person_id }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let closed = res.json::<Value>().await?;
    assert!(closed["data"]["session"]["checked_out_at"].is_string());
    assert_eq!(closed["data"]["session"]["auto_checked_out"], false);

    let res = client
        .post(server.url("/kiosk/check-out"))
        .json(&json!({ "kind": "student", "person_id": person_id }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn staff_and_students_are_tracked_separately() -> Result<()> {
    let server = common::ensure_server().await?;
    if !common::database_available(server).await? {
        return Ok(());
    }
    let client = reqwest::Client::new();
    let person_id = Uuid::new_v4();

    for kind in ["staff", "student"] {
        let res = client
            .post(server.url("/kiosk/check-in"))
            .json(&json!({ "kind": kind, "person_id": person_id }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::CREATED, "check-in as {}", kind);
    }

    for kind in ["staff", "student"] {
        let res = client
            .post(server.url("/kiosk/check-out"))
            .json(&json!({ "kind": kind, "person_id": person_id }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK, "check-out as {}", kind);
    }
    Ok(())
}
