use secrecy::SecretString;
use serde_json::json;

use health_sync_server::test_support::{spawn_server, test_state};

fn hrv_payload() -> serde_json::Value {
    json!({
        "data": {
            "metrics": [{
                "name": "heart_rate_variability",
                "units": "ms",
                "data": [
                    {"date": "2025-06-25 07:30:00 +0200", "qty": 52.3},
                    {"date": "2025-06-26 07:31:00 +0200", "qty": 48.9}
                ]
            }],
            "workouts": []
        },
        "request_id": "batch-1"
    })
}

#[tokio::test]
async fn webhook_processes_payload_and_reports_counts() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/hae/webhook/u1"))
        .json(&hrv_payload())
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["success"], true);
    assert_eq!(body["processed"]["metrics"], 2);
    assert_eq!(body["processed"]["sleep"], 0);
    assert_eq!(body["processed"]["workouts"], 0);
    assert_eq!(body["request_hash"], "success");
}

#[tokio::test]
async fn redelivered_payload_does_not_duplicate_rows() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let resp = client
            .post(format!("{base}/api/hae/webhook/u1"))
            .json(&hrv_payload())
            .send()
            .await
            .expect("post");
        assert_eq!(resp.status(), 200);
    }

    let resp = client
        .get(format!("{base}/api/metrics?metric=heart_rate_variability"))
        .header("x-user-id", "u1")
        .send()
        .await
        .expect("get");
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["total_count"], 2);
}

#[tokio::test]
async fn non_json_body_still_gets_the_response_shape() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/hae/webhook/u1"))
        .header("content-type", "application/json")
        .body("definitely not json")
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["success"], false);
    assert_eq!(body["processed"]["metrics"], 0);
    assert_eq!(body["request_hash"], "error");
}

#[tokio::test]
async fn wrong_envelope_fails_the_call_with_zero_counts() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/hae/webhook/u1"))
        .json(&json!({"metrics": [1, 2, 3]}))
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["success"], false);
    assert_eq!(body["processed"]["workouts"], 0);
}

#[tokio::test]
async fn one_bad_point_does_not_fail_the_batch() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;

    let payload = json!({
        "data": {
            "metrics": [{
                "name": "heart_rate_variability",
                "units": "ms",
                "data": [
                    {"date": "2025-06-25 07:30:00 +0200", "qty": 52.3},
                    {"date": "garbage", "qty": 1.0},
                    {"date": "2025-06-27 07:30:00 +0200", "qty": 47.0}
                ]
            }],
            "workouts": []
        }
    });

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/hae/webhook/u1"))
        .json(&payload)
        .send()
        .await
        .expect("post");
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["success"], true);
    assert_eq!(body["processed"]["metrics"], 2);
}

#[tokio::test]
async fn configured_webhook_key_is_enforced() {
    let state = test_state(|cfg| {
        cfg.webhook_key = Some(SecretString::new("hook-key".into()));
    })
    .await;
    let base = spawn_server(state).await;
    let client = reqwest::Client::new();

    let denied = client
        .post(format!("{base}/api/hae/webhook/u1"))
        .json(&hrv_payload())
        .send()
        .await
        .expect("post");
    assert_eq!(denied.status(), 401);
    let body: serde_json::Value = denied.json().await.expect("json");
    assert_eq!(body["success"], false);

    let allowed = client
        .post(format!("{base}/api/hae/webhook/u1"))
        .header("x-api-key", "hook-key")
        .json(&hrv_payload())
        .send()
        .await
        .expect("post");
    assert_eq!(allowed.status(), 200);
    let body: serde_json::Value = allowed.json().await.expect("json");
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn workout_batch_counts_only_calorie_bearing_records() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;

    let payload = json!({
        "data": {
            "metrics": [],
            "workouts": [
                {"start": "2025-07-01 06:00:00 +0200", "activeEnergy": [{"qty": 100.0}, {"qty": 50.0}]},
                {"activeEnergyBurned": {"qty": 0.0}}
            ]
        }
    });

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/hae/webhook/u1"))
        .json(&payload)
        .send()
        .await
        .expect("post");
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["success"], true);
    assert_eq!(body["processed"]["workouts"], 1);
}
