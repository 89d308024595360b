//! End-to-end auth tests against a live server: login, gates, refresh,
//! logout, expiry and the ambient HTTP layers.

mod support;

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use kanbanflow::identity::{Clock, ManualClock};
use support::{login, start, start_with, test_config, PASSWORD};

async fn error_body(resp: reqwest::Response) -> Result<Value> {
    Ok(resp.json::<Value>().await?)
}

#[tokio::test]
async fn login_protected_refresh_roundtrip() -> Result<()> {
    let srv = start().await?;
    let ada = srv.seed_user("ada@example.com")?;
    let client = Client::new();

    let resp = client
        .post(srv.url("/iam/v1/login"))
        .json(&json!({"email": "ada@example.com", "password": PASSWORD}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookies: Vec<String> = resp
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("access_token=") && c.contains("HttpOnly") && c.contains("Max-Age=3600")));
    assert!(cookies.iter().any(|c| c.starts_with("refresh_token=") && c.contains("Max-Age=86400")));
    let body: Value = resp.json().await?;
    assert_eq!(body["status"], "success");
    let access = body["access_token"].as_str().unwrap_or_default().to_string();
    let refresh = body["refresh_token"].as_str().unwrap_or_default().to_string();

    // access token opens a protected endpoint
    let resp = client.get(srv.url("/iam/v1/users/me")).bearer_auth(&access).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let me: Value = resp.json().await?;
    assert_eq!(me["id"], ada.id.as_str());
    assert_eq!(me["email"], "ada@example.com");
    assert!(me.get("password_hash").is_none());

    // the refresh token does not
    let resp = client.get(srv.url("/iam/v1/users/me")).bearer_auth(&refresh).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // refresh mints a new pair
    let resp = client.post(srv.url("/iam/v1/token/refresh")).bearer_auth(&refresh).send().await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let fresh: Value = resp.json().await?;
    let new_access = fresh["access_token"].as_str().unwrap_or_default();
    assert!(!new_access.is_empty());
    assert_ne!(new_access, access);
    let resp = client.get(srv.url("/iam/v1/users/me")).bearer_auth(new_access).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Expected: no revocation. The old refresh token keeps working until its own expiry.
    let resp = client.post(srv.url("/iam/v1/token/refresh")).bearer_auth(&refresh).send().await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn access_token_is_refused_by_refresh_endpoint() -> Result<()> {
    let srv = start().await?;
    srv.seed_user("bob@example.com")?;
    let client = Client::new();
    let pair = login(&client, &srv, "bob@example.com").await?;
    let resp = client.post(srv.url("/iam/v1/token/refresh")).bearer_auth(&pair.access).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn every_rejection_looks_the_same() -> Result<()> {
    let srv = start().await?;
    srv.seed_user("eve@example.com")?;
    let client = Client::new();
    let pair = login(&client, &srv, "eve@example.com").await?;

    let mut tampered = pair.access.clone();
    let last = tampered.pop().unwrap_or('A');
    tampered.push(if last == 'A' { 'B' } else { 'A' });

    let me = srv.url("/iam/v1/users/me");
    let requests = vec![
        client.get(&me),
        client.get(&me).header("authorization", "Bearer "),
        client.get(&me).header("authorization", format!("Basic {}", pair.access)),
        client.get(&me).bearer_auth("not-a-token"),
        client.get(&me).bearer_auth(&tampered),
        client.get(&me).bearer_auth(&pair.refresh),
    ];
    for req in requests {
        let resp = req.send().await?;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = error_body(resp).await?;
        assert_eq!(body, json!({"status": "error", "code": "unauthorized", "message": "unauthorized access"}));
    }
    Ok(())
}

#[tokio::test]
async fn cookie_is_used_when_no_header_is_sent() -> Result<()> {
    let srv = start().await?;
    srv.seed_user("carol@example.com")?;
    let client = Client::new();
    let pair = login(&client, &srv, "carol@example.com").await?;

    let resp = client
        .get(srv.url("/iam/v1/users/me"))
        .header("cookie", format!("theme=dark; access_token={}", pair.access))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .post(srv.url("/iam/v1/token/refresh"))
        .header("cookie", format!("refresh_token={}", pair.refresh))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // a refresh token in the access cookie is still the wrong flavor
    let resp = client
        .get(srv.url("/iam/v1/users/me"))
        .header("cookie", format!("access_token={}", pair.refresh))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // a non-bearer header does not fall back to the cookie
    let resp = client
        .get(srv.url("/iam/v1/users/me"))
        .header("authorization", "Token abc")
        .header("cookie", format!("access_token={}", pair.access))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_share_one_message() -> Result<()> {
    let srv = start().await?;
    srv.seed_user("dan@example.com")?;
    let client = Client::new();
    for (email, password) in [("dan@example.com", "wrong"), ("nobody@example.com", PASSWORD)] {
        let resp = client
            .post(srv.url("/iam/v1/login"))
            .json(&json!({"email": email, "password": password}))
            .send()
            .await?;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = error_body(resp).await?;
        assert_eq!(body["message"], "invalid email and/or password");
    }
    Ok(())
}

#[tokio::test]
async fn register_then_login() -> Result<()> {
    let srv = start().await?;
    let client = Client::new();
    let payload = json!({"first_name": "Grace", "last_name": "Hopper", "email": "grace@example.com", "password": PASSWORD});

    let resp = client.post(srv.url("/iam/v1/users")).json(&payload).send().await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let user: Value = resp.json().await?;
    assert_eq!(user["email"], "grace@example.com");
    assert!(user.get("password_hash").is_none());

    let resp = client.post(srv.url("/iam/v1/users")).json(&payload).send().await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let pair = login(&client, &srv, "grace@example.com").await?;
    let resp = client.get(srv.url("/iam/v1/users/me")).bearer_auth(&pair.access).send().await?;
    let me: Value = resp.json().await?;
    assert_eq!(me["first_name"], "Grace");
    Ok(())
}

#[tokio::test]
async fn logout_clears_cookies_but_tokens_live_on() -> Result<()> {
    let srv = start().await?;
    srv.seed_user("frank@example.com")?;
    let client = Client::new();
    let pair = login(&client, &srv, "frank@example.com").await?;

    let resp = client.post(srv.url("/iam/v1/logout")).bearer_auth(&pair.access).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let expired: Vec<String> = resp
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect();
    assert_eq!(expired.len(), 2);
    assert!(expired.iter().all(|c| c.contains("Max-Age=0")));
    let body: Value = resp.json().await?;
    assert_eq!(body, json!({"message": "logout success"}));

    // Expected: no server-side revocation.
    let resp = client.get(srv.url("/iam/v1/users/me")).bearer_auth(&pair.access).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client.post(srv.url("/iam/v1/logout")).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn access_token_expiry_is_inclusive() -> Result<()> {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let srv = start_with(test_config(), clock.clone() as Arc<dyn Clock>).await?;
    srv.seed_user("gina@example.com")?;
    let client = Client::new();
    let pair = login(&client, &srv, "gina@example.com").await?;

    clock.advance(Duration::seconds(3600));
    let resp = client.get(srv.url("/iam/v1/users/me")).bearer_auth(&pair.access).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    clock.advance(Duration::seconds(1));
    let resp = client.get(srv.url("/iam/v1/users/me")).bearer_auth(&pair.access).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // refresh token outlives the access token
    let resp = client.post(srv.url("/iam/v1/token/refresh")).bearer_auth(&pair.refresh).send().await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn profile_changes_are_seen_live() -> Result<()> {
    let srv = start().await?;
    let hal = srv.seed_user("hal@example.com")?;
    let client = Client::new();
    let pair = login(&client, &srv, "hal@example.com").await?;

    srv.identities.update_profile(&hal.id, Some("Halbert"), None, None, Utc::now())?;
    let me: Value = client.get(srv.url("/iam/v1/users/me")).bearer_auth(&pair.access).send().await?.json().await?;
    assert_eq!(me["first_name"], "Halbert");

    // email change orphans tokens bound to the old email
    srv.identities.update_profile(&hal.id, None, None, Some("hal9000@example.com"), Utc::now())?;
    let resp = client.get(srv.url("/iam/v1/users/me")).bearer_auth(&pair.access).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn soft_deleted_identity_is_locked_out() -> Result<()> {
    let srv = start().await?;
    let ivy = srv.seed_user("ivy@example.com")?;
    let client = Client::new();
    let pair = login(&client, &srv, "ivy@example.com").await?;
    srv.identities.soft_delete(&ivy.id, Utc::now())?;
    let resp = client.get(srv.url("/iam/v1/users/me")).bearer_auth(&pair.access).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = client.post(srv.url("/iam/v1/token/refresh")).bearer_auth(&pair.refresh).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn security_headers_on_every_response() -> Result<()> {
    let srv = start().await?;
    let client = Client::new();
    for resp in [
        client.get(srv.url("/healthz")).send().await?,
        client.get(srv.url("/iam/v1/users/me")).send().await?,
    ] {
        let h = resp.headers();
        assert_eq!(h["x-content-type-options"], "nosniff");
        assert_eq!(h["x-frame-options"], "DENY");
        assert_eq!(h["x-xss-protection"], "1; mode=block");
        assert_eq!(h["strict-transport-security"], "max-age=63072000; includeSubDomains");
        assert_eq!(h["content-security-policy"], "default-src 'self'");
        assert!(h.contains_key("x-request-id"));
    }
    let body: Value = client.get(srv.url("/healthz")).send().await?.json().await?;
    assert_eq!(body, json!({"status": "ok"}));
    Ok(())
}

#[tokio::test]
async fn shared_bucket_throttles_with_429() -> Result<()> {
    let mut cfg = test_config();
    cfg.rate_limit.burst = 3;
    cfg.rate_limit.refill_per_sec = 0;
    let srv = start_with(cfg, Arc::new(kanbanflow::identity::SystemClock)).await?;
    let client = Client::new();
    for _ in 0..3 {
        assert_eq!(client.get(srv.url("/healthz")).send().await?.status(), StatusCode::OK);
    }
    let resp = client.get(srv.url("/healthz")).send().await?;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = error_body(resp).await?;
    assert_eq!(body["message"], "rate limit exceeded");
    Ok(())
}

#[tokio::test]
async fn tickets_are_owner_scoped() -> Result<()> {
    let srv = start().await?;
    srv.seed_user("jo@example.com")?;
    srv.seed_user("kim@example.com")?;
    let client = Client::new();
    let jo = login(&client, &srv, "jo@example.com").await?;
    let kim = login(&client, &srv, "kim@example.com").await?;

    let resp = client
        .post(srv.url("/kanban/v1/tickets"))
        .bearer_auth(&jo.access)
        .json(&json!({"title": "Write docs", "status": "todo"}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let ticket: Value = resp.json().await?;
    let id = ticket["id"].as_str().unwrap_or_default().to_string();
    let one = srv.url(&format!("/kanban/v1/tickets/{id}"));

    let list: Value = client.get(srv.url("/kanban/v1/tickets")).bearer_auth(&jo.access).send().await?.json().await?;
    assert_eq!(list.as_array().map(Vec::len), Some(1));
    client
        .post(srv.url("/kanban/v1/tickets"))
        .bearer_auth(&jo.access)
        .json(&json!({"title": "Fix login", "status": "todo"}))
        .send()
        .await?;
    let hits: Value = client
        .get(srv.url("/kanban/v1/tickets"))
        .query(&[("title", "DOCS")])
        .bearer_auth(&jo.access)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(hits.as_array().map(Vec::len), Some(1));
    assert_eq!(hits[0]["id"], id.as_str());
    let all: Value = client.get(srv.url("/kanban/v1/tickets")).bearer_auth(&jo.access).send().await?.json().await?;
    assert_eq!(all.as_array().map(Vec::len), Some(2));
    let list: Value = client.get(srv.url("/kanban/v1/tickets")).bearer_auth(&kim.access).send().await?.json().await?;
    assert_eq!(list.as_array().map(Vec::len), Some(0));
    assert_eq!(client.get(&one).bearer_auth(&kim.access).send().await?.status(), StatusCode::NOT_FOUND);

    let resp = client
        .put(&one)
        .bearer_auth(&jo.access)
        .json(&json!({"title": "Write docs", "status": "doing", "assignees": ["jo"]}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = resp.json().await?;
    assert_eq!(updated["status"], "doing");

    let resp = client.delete(&one).bearer_auth(&jo.access).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await?, json!({"message": "success"}));
    assert_eq!(client.get(&one).bearer_auth(&jo.access).send().await?.status(), StatusCode::NOT_FOUND);
    assert_eq!(client.get(srv.url("/kanban/v1/tickets")).send().await?.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
