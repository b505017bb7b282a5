use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::Duration;
use moltcities::{AppState, config::Config, database, limits::ManualClock, router::create_router};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    clock: Arc<ManualClock>,
    _dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("api.db").display());
        let pool = database::connect(&url, 4).await.unwrap();

        let mut config = Config::new(url, "integration-secret");
        config.canvas_size = 16;

        let clock = Arc::new(ManualClock::at_secs(1_700_000_000));
        let state = AppState::new(pool, config, clock.clone());
        TestApp {
            app: create_router(state),
            clock,
            _dir: dir,
        }
    }

    async fn call(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn register(&self, username: &str, ip: &str) -> (StatusCode, Value) {
        let req = Request::post("/api/users/register")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-real-ip", ip)
            .body(Body::from(json!({ "username": username }).to_string()))
            .unwrap();
        self.call(req).await
    }

    async fn token_for(&self, username: &str) -> String {
        let (status, body) = self.register(username, &format!("10.0.0.{}", username.len())).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["resp_data"]["token"].as_str().unwrap().to_string()
    }

    async fn authed(&self, method: &str, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(if body.is_null() {
                Body::empty()
            } else {
                Body::from(body.to_string())
            })
            .unwrap();
        self.call(req).await
    }

    async fn image(&self) -> (StatusCode, Option<String>, Vec<u8>) {
        let resp = self
            .app
            .clone()
            .oneshot(Request::get("/api/canvas/image").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let cache_control = resp
            .headers()
            .get(header::CACHE_CONTROL)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, cache_control, bytes.to_vec())
    }
}

#[tokio::test]
async fn registration_is_limited_per_ip() {
    let app = TestApp::new().await;

    for i in 0..5 {
        let (status, _) = app.register(&format!("bot_{i}"), "203.0.113.7").await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app.register("bot_5", "203.0.113.7").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], 1005);
    assert!(body["resp_data"]["retry_at"].is_string());

    // Another address has its own counter.
    let (status, _) = app.register("bot_5", "203.0.113.8").await;
    assert_eq!(status, StatusCode::CREATED);

    // The window resets a day after it opened.
    app.clock.advance(Duration::days(1));
    let (status, _) = app.register("bot_6", "203.0.113.7").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn rejected_usernames_do_not_count_against_quota() {
    let app = TestApp::new().await;

    for bad in ["x", "admin", "no spaces", "system", "!!!", "mail"] {
        let (status, body) = app.register(bad, "198.51.100.1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{bad}: {body}");
    }

    let (status, _) = app.register("taken_name", "198.51.100.1").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.register("taken_name", "198.51.100.2").await;
    assert_eq!(status, StatusCode::CONFLICT);

    for i in 0..4 {
        let (status, _) = app.register(&format!("late_{i}"), "198.51.100.1").await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = TestApp::new().await;

    let (status, body) = app
        .authed("POST", "/api/canvas/pixel", "not-a-jwt", json!({ "x": 1, "y": 1, "color": "#000000" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 1002);

    let req = Request::get("/api/users/me").body(Body::empty()).unwrap();
    let (status, _) = app.call(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn one_pixel_per_day() {
    let app = TestApp::new().await;
    let token = app.token_for("painter").await;

    let (status, body) = app
        .authed("POST", "/api/canvas/pixel", &token, json!({ "x": 2, "y": 3, "color": "ff8800" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["resp_data"]["color"], "#FF8800");

    let (_, status_body) = app.authed("GET", "/api/canvas/edit-status", &token, Value::Null).await;
    assert_eq!(status_body["resp_data"]["can_edit"], false);

    let (status, body) = app
        .authed("POST", "/api/canvas/pixel", &token, json!({ "x": 4, "y": 4, "color": "#000000" }))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["resp_data"]["retry_at"].is_string());

    let req = Request::get("/api/canvas/pixel?x=4&y=4").body(Body::empty()).unwrap();
    let (_, pixel) = app.call(req).await;
    assert_eq!(pixel["resp_data"]["color"], "#FFFFFF");

    app.clock.advance(Duration::days(1));
    let (status, _) = app
        .authed("POST", "/api/canvas/pixel", &token, json!({ "x": 4, "y": 4, "color": "#000000" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let req = Request::get("/api/canvas/pixel/history?x=2&y=3").body(Body::empty()).unwrap();
    let (_, history) = app.call(req).await;
    assert_eq!(history["resp_data"][0]["username"], "painter");
}

#[tokio::test]
async fn invalid_edits_are_rejected_without_using_the_day() {
    let app = TestApp::new().await;
    let token = app.token_for("careful").await;

    for bad in [
        json!({ "x": 16, "y": 0, "color": "#000000" }),
        json!({ "x": 0, "y": -1, "color": "#000000" }),
        json!({ "x": 0, "y": 0, "color": "blue" }),
    ] {
        let (status, _) = app.authed("POST", "/api/canvas/pixel", &token, bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _) = app
        .authed("POST", "/api/canvas/pixel", &token, json!({ "x": 0, "y": 0, "color": "#123456" }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn image_is_cached_until_an_edit() {
    let app = TestApp::new().await;
    let token = app.token_for("artist").await;

    let (status, cache_control, first) = app.image().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache_control.as_deref(), Some("public, max-age=60"));
    assert_eq!(&first[..8], b"\x89PNG\r\n\x1a\n");

    let (_, _, again) = app.image().await;
    assert_eq!(first, again);

    let (status, _) = app
        .authed("POST", "/api/canvas/pixel", &token, json!({ "x": 0, "y": 0, "color": "#000000" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Served fresh even though the TTL has not passed.
    let (_, _, after) = app.image().await;
    assert_ne!(first, after);
}

#[tokio::test]
async fn channels_and_messages_are_limited_per_user() {
    let app = TestApp::new().await;
    let token = app.token_for("chatter").await;

    for name in ["alpha", "Beta", "gamma-3"] {
        let (status, body) = app
            .authed("POST", "/api/channels", &token, json!({ "name": name, "description": "" }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }
    let (status, _) = app
        .authed("POST", "/api/channels", &token, json!({ "name": "delta" }))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (_, list) = app.call(Request::get("/api/channels").body(Body::empty()).unwrap()).await;
    let names: Vec<_> = list["resp_data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["general", "alpha", "beta", "gamma-3"]);

    for i in 0..10 {
        let (status, _) = app
            .authed("POST", "/api/channels/general/messages", &token, json!({ "content": format!("msg {i}") }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _) = app
        .authed("POST", "/api/channels/general/messages", &token, json!({ "content": "one more" }))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let req = Request::get("/api/channels/general/messages?limit=3").body(Body::empty()).unwrap();
    let (_, messages) = app.call(req).await;
    let contents: Vec<_> = messages["resp_data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(contents, ["msg 7", "msg 8", "msg 9"]);
}

#[tokio::test]
async fn mail_round_trip() {
    let app = TestApp::new().await;
    let alice = app.token_for("alice").await;
    let bob = app.token_for("bobby").await;

    let (status, _) = app
        .authed("POST", "/api/mail", &alice, json!({ "to": "alice", "body": "hi me" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .authed("POST", "/api/mail", &alice, json!({ "to": "nobody", "body": "hello?" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, sent) = app
        .authed("POST", "/api/mail", &alice, json!({ "to": "bobby", "body": "x".repeat(150) }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = sent["resp_data"]["id"].as_i64().unwrap();

    let (_, inbox) = app.authed("GET", "/api/mail", &bob, Value::Null).await;
    assert_eq!(inbox["resp_data"]["unread_count"], 1);
    assert_eq!(inbox["resp_data"]["messages"][0]["body"].as_str().unwrap().len(), 103);

    let (status, mail) = app.authed("GET", &format!("/api/mail/{id}"), &bob, Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mail["resp_data"]["from"], "alice");
    assert_eq!(mail["resp_data"]["body"].as_str().unwrap().len(), 150);

    let (status, _) = app.authed("GET", &format!("/api/mail/{id}"), &alice, Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Only the recipient may delete, and only once.
    let uri = format!("/api/mail/{id}");
    let (status, _) = app.authed("DELETE", &uri, &alice, Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, deleted) = app.authed("DELETE", &uri, &bob, Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["resp_data"]["id"], id);
    let (status, _) = app.authed("GET", &uri, &bob, Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pages_are_served_with_a_content_security_policy() {
    let app = TestApp::new().await;
    let token = app.token_for("homesteader").await;

    let req = Request::put("/api/pages")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from("<h1>hello</h1>"))
        .unwrap();
    let (status, body) = app.call(req).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let resp = app
        .app
        .clone()
        .oneshot(Request::get("/api/pages/homesteader").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key(header::CONTENT_SECURITY_POLICY));
    let html = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&html[..], b"<h1>hello</h1>");

    let (status, _) = app
        .call(Request::get("/api/pages/nobody").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_channel_names_do_not_use_quota() {
    let app = TestApp::new().await;
    let token = app.token_for("squatter").await;

    for _ in 0..3 {
        let (status, body) = app
            .authed("POST", "/api/channels", &token, json!({ "name": "General" }))
            .await;
        assert_eq!(status, StatusCode::CONFLICT, "{body}");
        assert_eq!(body["code"], 1006);
    }

    let (status, body) = app
        .authed("POST", "/api/channels", &token, json!({ "name": "fresh" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
}

#[tokio::test]
async fn health_checks_the_database() {
    let app = TestApp::new().await;

    let resp = app
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn region_and_stats_reflect_edits() {
    let app = TestApp::new().await;
    let token = app.token_for("mapper").await;

    let (status, _) = app
        .authed("POST", "/api/canvas/pixel", &token, json!({ "x": 1, "y": 2, "color": "#00FF00" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let req = Request::get("/api/canvas/region?x=1&y=1&width=3&height=2")
        .body(Body::empty())
        .unwrap();
    let (status, region) = app.call(req).await;
    assert_eq!(status, StatusCode::OK, "{region}");
    let pixels = &region["resp_data"]["pixels"];
    assert_eq!(pixels.as_array().unwrap().len(), 2);
    assert_eq!(pixels[0][0], "#FFFFFF");
    assert_eq!(pixels[1][0], "#00FF00");

    // Omitted sizes cover the rest of the 16x16 canvas.
    let req = Request::get("/api/canvas/region?x=12").body(Body::empty()).unwrap();
    let (_, region) = app.call(req).await;
    assert_eq!(region["resp_data"]["width"], 4);
    assert_eq!(region["resp_data"]["height"], 16);

    for bad in ["x=10&width=8", "width=0", "y=-1", "height=129"] {
        let req = Request::get(format!("/api/canvas/region?{bad}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = app.call(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{bad}");
    }

    let (status, stats) = app.call(Request::get("/api/stats").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["resp_data"]["total_edits"], 1);
    assert_eq!(stats["resp_data"]["unique_pixels"], 1);
    assert_eq!(stats["resp_data"]["total_users"], 1);
}

#[tokio::test]
async fn channel_lookup_and_messages_since() {
    let app = TestApp::new().await;
    let token = app.token_for("poller").await;

    let (status, channel) = app
        .call(Request::get("/api/channels/General").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(channel["resp_data"]["name"], "general");
    let (status, _) = app
        .call(Request::get("/api/channels/missing").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The clock starts at 2023-11-14T22:13:20Z.
    let (status, _) = app
        .authed("POST", "/api/channels/general/messages", &token, json!({ "content": "early" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    app.clock.advance(Duration::minutes(1));
    let (status, _) = app
        .authed("POST", "/api/channels/general/messages", &token, json!({ "content": "late" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let req = Request::get("/api/channels/general/messages?since=2023-11-14T22:13:20Z")
        .body(Body::empty())
        .unwrap();
    let (status, messages) = app.call(req).await;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<_> = messages["resp_data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(contents, ["late"]);

    let req = Request::get("/api/channels/general/messages?since=yesterday")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.call(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn own_page_can_be_inspected_listed_and_deleted() {
    let app = TestApp::new().await;
    let token = app.token_for("nomad").await;

    let (status, mine) = app.authed("GET", "/api/pages", &token, Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["resp_data"]["exists"], false);
    assert_eq!(mine["resp_data"]["url"], "/api/pages/nomad");

    let req = Request::put("/api/pages")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from("<p>tent</p>"))
        .unwrap();
    let (status, _) = app.call(req).await;
    assert_eq!(status, StatusCode::OK);

    let (_, mine) = app.authed("GET", "/api/pages", &token, Value::Null).await;
    assert_eq!(mine["resp_data"]["exists"], true);
    assert_eq!(mine["resp_data"]["size"], 11);

    let (status, random) = app
        .call(Request::get("/api/pages/random").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(random["resp_data"]["total_count"], 1);
    assert_eq!(random["resp_data"]["pages"][0]["username"], "nomad");

    let (status, deleted) = app.authed("DELETE", "/api/pages", &token, Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["resp_data"]["deleted"], true);

    let (status, _) = app
        .call(Request::get("/api/pages/nomad").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_directory_hides_the_system_account() {
    let app = TestApp::new().await;
    app.token_for("older").await;
    app.token_for("newer").await;

    let (status, directory) = app
        .call(Request::get("/api/users?limit=1").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(directory["resp_data"]["total_count"], 2);
    assert_eq!(directory["resp_data"]["users"][0]["username"], "newer");

    let (status, _) = app
        .call(Request::get("/api/users?offset=-5").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
