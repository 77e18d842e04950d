// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenarios.
//!
//! Runs the real `reauth` binary as a subprocess against the in-process mock
//! backend from `reauth::test_support`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;

pub use reauth::test_support::{MockBackend, USER_EMAIL, USER_PASSWORD};

/// Resolve the path to the compiled `reauth` binary.
pub fn reauth_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("reauth")
}

/// Captured result of one `reauth` invocation.
#[derive(Debug)]
pub struct CliRun {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CliRun {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Parse stdout as the JSON document the binary prints.
    pub fn json(&self) -> anyhow::Result<Value> {
        Ok(serde_json::from_str(&self.stdout)?)
    }

    /// Parse stderr as JSON log lines (requires `--log-format json`).
    pub fn log_lines(&self) -> Vec<Value> {
        self.stderr.lines().filter_map(|line| serde_json::from_str(line).ok()).collect()
    }
}

/// Run `reauth` against `backend` with `args` appended after the global flags.
///
/// Async so the mock backend keeps serving on the test runtime while the
/// child runs.
pub async fn run_cli(backend: &MockBackend, args: &[&str]) -> anyhow::Result<CliRun> {
    let binary = reauth_binary();
    anyhow::ensure!(binary.exists(), "reauth binary not found at {}", binary.display());

    let output = tokio::process::Command::new(&binary)
        .arg("--base-url")
        .arg(backend.base_url())
        .args(["--log-format", "json", "--log-level", "reauth=debug"])
        .args(args)
        .env_remove("REAUTH_EMAIL")
        .env_remove("REAUTH_PASSWORD")
        .env_remove("REAUTH_REGION")
        .stdin(Stdio::null())
        .output()
        .await?;

    Ok(CliRun {
        code: output.status.code(),
        stdout: String::from_utf8(output.stdout)?,
        stderr: String::from_utf8(output.stderr)?,
    })
}
