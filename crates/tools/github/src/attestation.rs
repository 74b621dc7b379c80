//! Build provenance checks with the GitHub CLI.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use relshim_core::{AttestationGate, CancellationToken, Error, Result, cancel};
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::{debug, info};

/// [`AttestationGate`] running `gh attestation verify --repo <repo> <path>`.
///
/// The child sees a cleared environment: only `GH_TOKEN`, `PATH` and, for
/// Enterprise Server, `GH_HOST` are passed through.
pub struct GhAttestationVerifier {
    program: String,
    token: Option<SecretString>,
    host: Option<String>,
    path_var: Option<std::ffi::OsString>,
}

impl std::fmt::Debug for GhAttestationVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GhAttestationVerifier")
            .field("program", &self.program)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl GhAttestationVerifier {
    /// Verifier using `gh` from `PATH`.
    #[must_use]
    pub fn new(token: Option<SecretString>) -> Self {
        Self {
            program: "gh".to_string(),
            token,
            host: None,
            path_var: std::env::var_os("PATH"),
        }
    }

    /// Use a specific `gh` executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Target the server at `server_url`; github.com needs no host.
    #[must_use]
    pub fn with_server(mut self, server_url: &str) -> Self {
        self.host = gh_host(server_url);
        self
    }

    fn command(&self, path: &Path, repository: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["attestation", "verify", "--repo", repository])
            .arg(path)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(search_path) = &self.path_var {
            command.env("PATH", search_path);
        }
        if let Some(token) = &self.token {
            command.env("GH_TOKEN", token.expose_secret());
        }
        if let Some(host) = &self.host {
            command.env("GH_HOST", host);
        }
        command
    }
}

#[async_trait]
impl AttestationGate for GhAttestationVerifier {
    async fn verify(&self, cancel: &CancellationToken, path: &Path, repository: &str) -> Result<()> {
        debug!(program = %self.program, %repository, path = %path.display(), "Verifying attestation");

        let mut command = self.command(path, repository);
        let output = cancel::run(cancel, "verifying attestation", async {
            command
                .output()
                .await
                .map_err(|e| Error::execution(&self.program, format!("failed to start: {e}")))
        })
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::attestation_failed(path, stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        info!(%repository, output = %stdout.trim(), "Attestation verification passed");
        Ok(())
    }
}

/// `GH_HOST` value for a server URL, `None` for github.com.
fn gh_host(server_url: &str) -> Option<String> {
    let host = reqwest::Url::parse(server_url)
        .ok()?
        .host_str()?
        .to_string();
    (host != "github.com").then_some(host)
}
