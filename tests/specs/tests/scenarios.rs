// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end session scenarios through the public library surface.

use std::time::Duration;

use futures_util::future::join_all;
use serde_json::json;

use reauth::test_support::{mint_token, profile_json};
use reauth::{ApiRequest, Credential, LoginRequest, ReauthCoordinator, RequestError, TokenStore};
use reauth_specs::{MockBackend, USER_EMAIL, USER_PASSWORD};

/// Cold-start a coordinator whose first credential expires in `ttl_secs`.
async fn signed_in(backend: &MockBackend, ttl_secs: i64) -> anyhow::Result<ReauthCoordinator> {
    let token = backend.state.issue(ttl_secs);
    let grant = json!({ "accessToken": token, "user": profile_json("user-1") });
    backend.state.script_refresh(200, grant);
    let coordinator = ReauthCoordinator::new(&backend.config())?;
    let state = coordinator.bootstrap().await;
    anyhow::ensure!(state.is_authenticated, "bootstrap did not sign in");
    Ok(coordinator)
}

#[test]
fn expiry_predicate_uses_sixty_second_buffer() {
    let buffer = Duration::from_secs(60);
    let store = TokenStore::new();
    assert!(store.is_expiring_within(buffer), "nothing held");

    store.set(Credential::new(mint_token("user-1", 30)));
    assert!(store.is_expiring_within(buffer));

    store.set(Credential::new(mint_token("user-1", 120)));
    assert!(!store.is_expiring_within(buffer));
}

#[tokio::test]
async fn proactive_refresh_replaces_token_before_it_is_sent() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;
    let coordinator = signed_in(&backend, 50).await?;
    let first = backend.state.last_issued.lock().clone();

    let response = coordinator.execute(ApiRequest::get("/movies")).await?;

    assert_eq!(response.status, 200);
    assert_eq!(backend.state.refresh_count(), 2, "cold start plus one proactive refresh");
    let sent = backend.state.seen_bearers.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_ne!(sent[0], first);
    Ok(())
}

#[tokio::test]
async fn reactive_refresh_without_credential() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;
    let coordinator = ReauthCoordinator::new(&backend.config())?;

    let response = coordinator.execute(ApiRequest::get("/movies")).await?;

    assert_eq!(response.status, 200);
    assert_eq!(response.body["movies"][0]["title"], "Metropolis");
    assert_eq!(backend.state.refresh_count(), 1);
    assert_eq!(backend.state.protected_count(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_refresh() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;
    let coordinator = signed_in(&backend, 30).await?;
    backend.state.set_refresh_delay(Duration::from_millis(200));

    let calls = (0..24).map(|_| {
        let c = coordinator.clone();
        async move { c.execute(ApiRequest::get("/movies")).await }
    });
    let results = join_all(calls).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(backend.state.refresh_count(), 2, "cold start plus exactly one shared refresh");
    assert!(!coordinator.is_refreshing());
    Ok(())
}

#[tokio::test]
async fn failed_login_does_not_refresh() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;
    let coordinator = ReauthCoordinator::new(&backend.config())?;

    let wrong = LoginRequest { email: USER_EMAIL.into(), password: "hunter2".into() };
    let err = coordinator.login(&wrong).await.err();

    assert!(matches!(err, Some(RequestError::Unauthorized(_))));
    assert_eq!(backend.state.refresh_count(), 0);

    coordinator
        .login(&LoginRequest { email: USER_EMAIL.into(), password: USER_PASSWORD.into() })
        .await?;
    assert!(coordinator.session().is_authenticated);
    Ok(())
}

#[tokio::test]
async fn refresh_rejection_forces_logout_without_looping() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;
    let coordinator = signed_in(&backend, 3600).await?;
    let mut state = coordinator.sink().subscribe();
    backend.state.revoke_all();
    backend.state.script_refresh(403, json!({ "message": "Invalid refresh token" }));
    backend.state.script_refresh(403, json!({ "message": "Invalid refresh token" }));

    let first = coordinator.execute(ApiRequest::get("/movies")).await;
    assert!(matches!(first, Err(RequestError::Unauthorized(_))));
    assert!(state.has_changed()?);
    assert!(!state.borrow_and_update().is_authenticated);

    let second = coordinator.execute(ApiRequest::get("/movies")).await;
    assert!(matches!(second, Err(RequestError::Unauthorized(_))));
    assert_eq!(backend.state.refresh_count(), 3);
    assert_eq!(backend.state.protected_count(), 4, "each call dispatches twice, never more");
    Ok(())
}

#[tokio::test]
async fn rate_limit_surfaces_advisory() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;
    let coordinator = signed_in(&backend, 3600).await?;

    let err = coordinator.execute(ApiRequest::get("/limited")).await.err();

    assert!(matches!(err, Some(RequestError::RateLimited { .. })));
    let active = coordinator.sink().active_advisories();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].message, "Too many requests. Please try again after 30 seconds.");
    assert!(coordinator.session().is_authenticated);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn login_while_refresh_fails_keeps_new_session() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;
    backend.state.set_refresh_delay(Duration::from_millis(300));
    backend.state.script_refresh(401, json!({ "message": "Refresh token expired" }));
    let coordinator = ReauthCoordinator::new(&backend.config())?;

    let c = coordinator.clone();
    let pending = tokio::spawn(async move { c.execute(ApiRequest::get("/movies")).await });
    for _ in 0..200 {
        if coordinator.is_refreshing() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    anyhow::ensure!(coordinator.is_refreshing(), "refresh never started");
    coordinator
        .login(&LoginRequest { email: USER_EMAIL.into(), password: USER_PASSWORD.into() })
        .await?;

    let response = pending.await??;
    assert_eq!(response.status, 200);
    assert!(coordinator.session().is_authenticated);
    Ok(())
}
