// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests that run the real `reauth` binary against a mock backend.

use serde_json::json;

use reauth_specs::{run_cli, MockBackend, USER_EMAIL, USER_PASSWORD};

#[tokio::test]
async fn status_after_cold_start_refresh() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;

    let run = run_cli(&backend, &["status"]).await?;

    assert!(run.success(), "{run:?}");
    let state = run.json()?;
    assert_eq!(state["isAuthenticated"], true);
    assert_eq!(state["hydrated"], true);
    assert_eq!(state["profile"]["id"], "user-1");
    Ok(())
}

#[tokio::test]
async fn status_without_refresh_cookie() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;
    backend.state.script_refresh(401, json!({ "message": "No refresh token" }));

    let run = run_cli(&backend, &["status"]).await?;

    assert!(run.success(), "{run:?}");
    assert_eq!(run.json()?["isAuthenticated"], false);
    Ok(())
}

#[tokio::test]
async fn get_prints_protected_body() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;

    let run = run_cli(&backend, &["--region", "eu-west", "get", "/movies"]).await?;

    assert!(run.success(), "{run:?}");
    assert_eq!(run.json()?["movies"][0]["title"], "Metropolis");
    assert_eq!(*backend.state.seen_regions.lock(), vec![Some("eu-west".to_owned())]);
    Ok(())
}

#[tokio::test]
async fn login_with_credentials() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;
    backend.state.script_refresh(401, json!({ "message": "No refresh token" }));

    let run =
        run_cli(&backend, &["--email", USER_EMAIL, "--password", USER_PASSWORD, "login"]).await?;

    assert!(run.success(), "{run:?}");
    assert_eq!(run.json()?["profile"]["email"], USER_EMAIL);
    Ok(())
}

#[tokio::test]
async fn bad_password_exits_with_failure() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;

    let run = run_cli(&backend, &["--email", USER_EMAIL, "--password", "nope", "login"]).await?;

    assert_eq!(run.code, Some(1));
    assert!(run.stdout.is_empty());
    assert_eq!(backend.state.refresh_count(), 1, "only the cold-start refresh");
    Ok(())
}

#[tokio::test]
async fn invalid_arguments_exit_with_usage_error() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;

    let run = run_cli(&backend, &["--email", USER_EMAIL, "status"]).await?;

    assert_eq!(run.code, Some(2));
    assert!(run.stderr.contains("--email and --password must be given together"));
    assert_eq!(backend.state.refresh_count(), 0);
    Ok(())
}

#[tokio::test]
async fn json_logs_never_contain_tokens() -> anyhow::Result<()> {
    let backend = MockBackend::start().await;

    let run = run_cli(&backend, &["get", "/movies"]).await?;

    assert!(run.success(), "{run:?}");
    let lines = run.log_lines();
    assert!(lines.iter().any(|l| l["fields"]["message"] == "access token refreshed"));
    let issued = backend.state.last_issued.lock().clone().unwrap_or_default();
    assert!(!issued.is_empty());
    assert!(!run.stderr.contains(&issued));
    Ok(())
}
