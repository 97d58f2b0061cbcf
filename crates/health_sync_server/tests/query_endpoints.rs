use chrono::{Duration, Utc};
use secrecy::SecretString;
use serde_json::json;

use health_sync_server::test_support::{spawn_server, test_state};

/// Export-format timestamp a given number of hours before now.
fn export_ts(hours_ago: i64) -> String {
    (Utc::now() - Duration::hours(hours_ago))
        .format("%Y-%m-%d %H:%M:%S +0000")
        .to_string()
}

async fn seed(base: &str, user: &str) {
    let payload = json!({
        "data": {
            "metrics": [
                {
                    "name": "heart_rate_variability",
                    "units": "ms",
                    "data": [
                        {"date": export_ts(2), "qty": 55.0},
                        {"date": export_ts(30), "qty": 45.0}
                    ]
                },
                {
                    "name": "sleep_analysis",
                    "units": "hr",
                    "data": [{
                        "date": export_ts(8),
                        "asleep": 7.0, "awake": 0.5, "core": 3.5, "deep": 1.5, "rem": 2.0,
                        "sleepStart": export_ts(9),
                        "sleepEnd": export_ts(1),
                        "source": "Watch",
                        "totalSleep": 7.0
                    }]
                }
            ],
            "workouts": [
                {"start": export_ts(3), "activeEnergyBurned": {"qty": 500.0}},
                {"start": export_ts(30), "activeEnergyBurned": {"qty": 300.0}}
            ]
        }
    });
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/hae/webhook/{user}"))
        .json(&payload)
        .send()
        .await
        .expect("seed post");
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn inverted_range_is_a_client_error() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;

    let resp = reqwest::Client::new()
        .get(format!(
            "{base}/api/metrics?metric=heart_rate_variability&from=2025-06-02T00:00:00Z&to=2025-06-01T00:00:00Z"
        ))
        .header("x-user-id", "u1")
        .send()
        .await
        .expect("get");
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["detail"], "'from' date must be before 'to' date");
}

#[tokio::test]
async fn forward_range_is_accepted() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;
    seed(&base, "u1").await;

    let from = (Utc::now() - Duration::hours(6)).to_rfc3339();
    let to = Utc::now().to_rfc3339();
    let resp = reqwest::Client::new()
        .get(format!("{base}/api/metrics"))
        .query(&[
            ("metric", "heart_rate_variability"),
            ("from", from.as_str()),
            ("to", to.as_str()),
        ])
        .header("x-user-id", "u1")
        .send()
        .await
        .expect("get");
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["total_count"], 1);
    assert_eq!(body["data"][0]["value"], 55.0);
}

#[tokio::test]
async fn sleep_metric_serves_duration_hours() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;
    seed(&base, "u1").await;

    let resp = reqwest::Client::new()
        .get(format!("{base}/api/metrics?metric=sleep"))
        .header("x-user-id", "u1")
        .send()
        .await
        .expect("get");
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["total_count"], 1);
    assert_eq!(body["data"][0]["value"], 7.0);
}

#[tokio::test]
async fn limit_outside_bounds_is_rejected() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;
    let client = reqwest::Client::new();

    for bad in ["0", "5001"] {
        let resp = client
            .get(format!("{base}/api/metrics?metric=workout&limit={bad}"))
            .header("x-user-id", "u1")
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), 400, "limit={bad}");
    }
}

#[tokio::test]
async fn missing_user_identity_is_unauthorized() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;

    let resp = reqwest::Client::new()
        .get(format!("{base}/api/metrics?metric=sleep"))
        .send()
        .await
        .expect("get");
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn configured_bearer_token_is_enforced() {
    let state = test_state(|cfg| {
        cfg.auth_token = Some(SecretString::new("proxy-token".into()));
    })
    .await;
    let base = spawn_server(state).await;
    let client = reqwest::Client::new();

    let denied = client
        .get(format!("{base}/api/metrics?metric=sleep"))
        .header("x-user-id", "u1")
        .send()
        .await
        .expect("get");
    assert_eq!(denied.status(), 401);

    let allowed = client
        .get(format!("{base}/api/metrics?metric=sleep"))
        .header("x-user-id", "u1")
        .bearer_auth("proxy-token")
        .send()
        .await
        .expect("get");
    assert_eq!(allowed.status(), 200);
}

#[tokio::test]
async fn insights_compare_current_and_previous_periods() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;
    seed(&base, "u1").await;

    let resp = reqwest::Client::new()
        .get(format!("{base}/api/insights?range_hours=24"))
        .header("x-user-id", "u1")
        .send()
        .await
        .expect("get");
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["period_hours"], 24);
    // Seeded: one HRV point and one 500 cal workout inside the last 24h, one
    // of each 30h ago inside the previous window.
    assert_eq!(body["current"]["hrv"]["avg"], 55.0);
    assert_eq!(body["previous"]["hrv"]["avg"], 45.0);
    assert_eq!(body["current"]["workout"]["total_calories"], 500.0);
    assert_eq!(body["current"]["workout"]["session_count"], 1);
    assert_eq!(body["changes"]["workout_calorie_change"], 200.0);
    assert_eq!(body["insight"], "test insight");

    let change = body["changes"]["hrv_change_percent"].as_f64().expect("change");
    assert!((change - (55.0 - 45.0) / 45.0 * 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn insights_range_outside_bounds_is_rejected() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;
    let client = reqwest::Client::new();

    for bad in ["0", "169"] {
        let resp = client
            .get(format!("{base}/api/insights?range_hours={bad}"))
            .header("x-user-id", "u1")
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), 400, "range_hours={bad}");
    }
}

#[tokio::test]
async fn health_endpoint_is_live() {
    let state = test_state(|_| {}).await;
    let base = spawn_server(state).await;

    let resp = reqwest::Client::new()
        .get(format!("{base}/health"))
        .send()
        .await
        .expect("get");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "ok");
}
