// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{sync::Arc, time::Duration};

use chrono::{TimeZone, Utc};
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode, body::Bytes, header::SET_COOKIE};
use ledger::{LedgerConfig, LedgerController, ManualClock};
use metrics::Metrics;
use realtime::{ChannelHub, StatePublisher};
use serde_json::{Value, json};
use storage::MemoryStore;
use tally::{AdminSessions, AppState, HttpResponse, ResponseBody, handle};

const PASSWORD: &str = "let-me-in";

fn state() -> Arc<AppState> {
    let metrics = Arc::new(Metrics::new().unwrap());
    let hub = Arc::new(ChannelHub::new("global-counter", 64));
    let ledger = Arc::new(LedgerController::new(
        LedgerConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 12, 24, 20, 0, 0).unwrap(),
        )),
        StatePublisher::new(hub.clone(), metrics.clone()),
        metrics,
    ));
    Arc::new(AppState::new(
        ledger,
        hub,
        AdminSessions::new(PASSWORD, Duration::from_secs(3600)),
        false,
    ))
}

struct Call {
    method: Method,
    path: &'static str,
    cookie: Option<String>,
    headers: Vec<(&'static str, &'static str)>,
    body: Option<Value>,
}

impl Call {
    fn new(method: Method, path: &'static str) -> Self {
        Self {
            method,
            path,
            cookie: None,
            headers: Vec::new(),
            body: None,
        }
    }

    fn cookie(mut self, cookie: &str) -> Self {
        self.cookie = Some(cookie.to_string());
        self
    }

    fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    async fn send(self, state: &Arc<AppState>) -> (StatusCode, Vec<String>, Value) {
        let mut builder = Request::builder().method(self.method).uri(self.path);
        if let Some(cookie) = &self.cookie {
            builder = builder.header("cookie", cookie.as_str());
        }
        let has_body = self.body.is_some();
        if has_body {
            builder = builder.header("content-type", "application/json");
        }
        for (name, value) in &self.headers {
            builder = builder.header(*name, *value);
        }
        let payload = self
            .body
            .map(|body| Bytes::from(body.to_string()))
            .unwrap_or_default();
        let request = builder.body(Full::new(payload)).unwrap();
        let response = handle(state.clone(), request).await.unwrap();
        decode(response).await
    }
}

async fn decode(response: HttpResponse) -> (StatusCode, Vec<String>, Value) {
    let status = response.status();
    let cookies = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, cookies, body)
}

fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

async fn admin_cookie(state: &Arc<AppState>) -> String {
    let (status, cookies, _) = Call::new(Method::POST, "/api/admin/auth")
        .json(json!({ "password": PASSWORD }))
        .send(state)
        .await;
    assert_eq!(status, StatusCode::OK);
    cookie_pair(&cookies[0])
}

#[tokio::test]
async fn first_vote_mints_an_identity_and_assigns_a_team() {
    let state = state();
    let (status, cookies, body) = Call::new(Method::POST, "/api/click")
        .header("x-forwarded-for", "1.0.0.0, 10.0.0.1")
        .json(json!({ "counterId": 1, "delta": 1 }))
        .send(&state)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["team"], "B");
    assert_eq!(body["counters"], json!([1, 0, 0]));
    assert_eq!(body["teamScore"], 1);
    assert_eq!(body["votesRemaining"], 2);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("cid="));
    assert!(!cookies[0].contains("Secure"));

    let cid = cookie_pair(&cookies[0]);
    let (status, cookies, body) = Call::new(Method::GET, "/api/counters")
        .cookie(&cid)
        .send(&state)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookies.is_empty());
    assert_eq!(
        body,
        json!({ "counters": [1, 0, 0], "teamScore": 1, "votesRemaining": 2 })
    );
}

#[tokio::test]
async fn fourth_vote_of_the_day_is_rejected() {
    let state = state();
    let cookie = "cid=quota-tester";
    for remaining in [2, 1, 0] {
        let (status, _, body) = Call::new(Method::POST, "/api/click")
            .cookie(cookie)
            .json(json!({ "counterId": 2, "delta": -1 }))
            .send(&state)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["votesRemaining"], remaining);
    }
    let (status, _, body) = Call::new(Method::POST, "/api/click")
        .cookie(cookie)
        .json(json!({ "counterId": 2, "delta": -1 }))
        .send(&state)
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body,
        json!({ "error": "Daily vote limit reached", "votesRemaining": 0 })
    );
}

#[tokio::test]
async fn malformed_votes_get_field_messages() {
    let state = state();
    let cases = [
        (
            json!({ "counterId": "1", "delta": 1 }),
            "counterId must be an integer",
        ),
        (
            json!({ "counterId": 4, "delta": 1 }),
            "Invalid counterId. Must be 1, 2, or 3",
        ),
        (
            json!({ "counterId": 1, "delta": 1.5 }),
            "delta must be an integer",
        ),
        (
            json!({ "counterId": 1, "delta": 0 }),
            "Invalid delta. Must be 1 or -1",
        ),
        (Value::Null, "Request body is required"),
    ];
    for (payload, message) in cases {
        let (status, _, body) = Call::new(Method::POST, "/api/click")
            .cookie("cid=validator")
            .json(payload)
            .send(&state)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], message);
    }

    let (status, _, body) = Call::new(Method::POST, "/api/click")
        .cookie("cid=validator")
        .send(&state)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Content-Type must be application/json");

    let (_, _, body) = Call::new(Method::GET, "/api/counters")
        .cookie("cid=validator")
        .send(&state)
        .await;
    assert_eq!(body["votesRemaining"], 3);
    assert_eq!(body["counters"], json!([0, 0, 0]));
}

#[tokio::test]
async fn admin_routes_require_a_session() {
    let state = state();
    for call in [
        Call::new(Method::POST, "/api/admin/reset").json(json!({ "type": "all" })),
        Call::new(Method::GET, "/api/admin/stats"),
        Call::new(Method::POST, "/api/admin/reset")
            .cookie("admin-session=forged")
            .json(json!({ "type": "all" })),
    ] {
        let (status, _, body) = call.send(&state).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Unauthorized" }));
    }

    let (status, cookies, body) = Call::new(Method::POST, "/api/admin/auth")
        .json(json!({ "password": "guess" }))
        .send(&state)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(cookies.is_empty());
    assert_eq!(body["error"], "Invalid password");

    let (status, _, body) = Call::new(Method::POST, "/api/admin/auth")
        .json(json!({ "password": 42 }))
        .send(&state)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Password is required and must be a string");
}

#[tokio::test]
async fn admin_session_lifecycle() {
    let state = state();
    let admin = admin_cookie(&state).await;
    assert!(admin.starts_with("admin-session="));

    let (_, _, body) = Call::new(Method::GET, "/api/admin/auth")
        .cookie(&admin)
        .send(&state)
        .await;
    assert_eq!(body, json!({ "authenticated": true }));

    let (status, cookies, _) = Call::new(Method::DELETE, "/api/admin/auth")
        .cookie(&admin)
        .send(&state)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookies[0].contains("Max-Age=0"));

    let (_, _, body) = Call::new(Method::GET, "/api/admin/auth")
        .cookie(&admin)
        .send(&state)
        .await;
    assert_eq!(body, json!({ "authenticated": false }));
}

#[tokio::test]
async fn admins_vote_without_a_quota_and_can_reset() {
    let state = state();
    let admin = admin_cookie(&state).await;
    let cookie = format!("cid=operator; {admin}");

    for _ in 0..5 {
        let (status, _, body) = Call::new(Method::POST, "/api/click")
            .cookie(&cookie)
            .json(json!({ "counterId": 3, "delta": 1 }))
            .send(&state)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["votesRemaining"], 999);
    }

    for _ in 0..3 {
        Call::new(Method::POST, "/api/click")
            .cookie("cid=player")
            .json(json!({ "counterId": 1, "delta": -1 }))
            .send(&state)
            .await;
    }

    let (status, _, body) = Call::new(Method::GET, "/api/admin/stats")
        .cookie(&admin)
        .send(&state)
        .await;
    assert_eq!(status, StatusCode::OK);
    let today = ["votesTodayTeamA", "votesTodayTeamB"]
        .iter()
        .map(|field| body[field].as_i64().unwrap())
        .sum::<i64>();
    assert_eq!(today, 8);

    let (status, _, body) = Call::new(Method::POST, "/api/admin/reset")
        .cookie(&admin)
        .json(json!({ "type": "votes" }))
        .send(&state)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, _, body) = Call::new(Method::GET, "/api/counters")
        .cookie("cid=player")
        .send(&state)
        .await;
    assert_eq!(body["votesRemaining"], 3);
    assert_eq!(body["counters"], json!([-3, 0, 5]));

    let (status, _, body) = Call::new(Method::POST, "/api/admin/reset")
        .cookie(&admin)
        .json(json!({ "type": "all" }))
        .send(&state)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Everything reset (counters and all vote limits)");

    let (_, _, body) = Call::new(Method::GET, "/api/stats").send(&state).await;
    assert_eq!(body["totalVotes"], 0);
    assert_eq!(body["totalUsers"], 2);

    let (status, _, body) = Call::new(Method::POST, "/api/admin/reset")
        .cookie(&admin)
        .json(json!({ "type": "everything" }))
        .send(&state)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid reset type");
}

#[tokio::test]
async fn read_only_routes() {
    let state = state();
    let (status, _, body) = Call::new(Method::GET, "/api/last-vote").send(&state).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "lastVote": null }));

    Call::new(Method::POST, "/api/click")
        .cookie("cid=someone")
        .header("x-real-ip", "0.0.0.0")
        .json(json!({ "counterId": 2, "delta": 1 }))
        .send(&state)
        .await;
    let (_, _, body) = Call::new(Method::GET, "/api/last-vote").send(&state).await;
    assert_eq!(body["lastVote"]["counterId"], 2);
    assert_eq!(body["lastVote"]["team"], "A");
    assert_eq!(body["lastVote"]["delta"], 1);

    let (status, _, body) = Call::new(Method::GET, "/api/health").send(&state).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["store"], "healthy");
    assert_eq!(body["timestamp"], "2025-12-24T20:00:00.000Z");
    assert_eq!(body["subscribers"], 0);

    let (status, _, _) = Call::new(Method::GET, "/nowhere").send(&state).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Request::builder()
        .uri("/metrics")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = handle(state.clone(), request).await.unwrap();
    let text = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains(r#"tally_votes_accepted_total{team="A"} 1"#));
}

async fn next_chunk(body: &mut ResponseBody) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap()
}

#[tokio::test]
async fn event_stream_carries_votes_to_subscribers() {
    let state = state();
    let request = Request::builder()
        .uri("/api/stream")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = handle(state.clone(), request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    let mut body = response.into_body();

    let (_, _, health) = Call::new(Method::GET, "/api/health").send(&state).await;
    assert_eq!(health["subscribers"], 1);

    let (status, _, _) = Call::new(Method::POST, "/api/click")
        .header("x-real-ip", "0.0.0.1")
        .json(json!({ "counterId": 3, "delta": -1 }))
        .send(&state)
        .await;
    assert_eq!(status, StatusCode::OK);

    assert!(next_chunk(&mut body).await.starts_with(": subscribed to global-counter"));
    let update = next_chunk(&mut body).await;
    let mut lines = update.lines();
    assert_eq!(lines.next(), Some("event: update"));
    let data: Value = serde_json::from_str(
        lines.next().unwrap().strip_prefix("data: ").unwrap(),
    )
    .unwrap();
    assert_eq!(data["counters"], json!([0, 0, -1]));
    assert_eq!(data["teamScore"], -1);
    assert_eq!(data["lastVote"]["counterId"], 3);
    assert_eq!(data["lastVote"]["team"], "B");
    assert!(data.get("quotaWasReset").is_none());
    assert!(update.ends_with("\n\n"));
}
