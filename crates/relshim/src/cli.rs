//! Command-line surface: flags, exit codes and error reporting.

// Reporting errors is the CLI's job.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use miette::{Diagnostic, Report};
use relshim_core::{AttestationFailurePolicy, Error, EnvSource, PartialConfig};
use serde::Serialize;

use crate::tracing::{LogLevel, TracingConfig, TracingFormat};

/// Exit code on success
pub const EXIT_OK: i32 = 0;
/// Exit code for any resolution, download, verification or internal failure
pub const EXIT_FAILURE: i32 = 1;

/// Run a repository's release binary for the given ref.
///
/// Settings come from the environment, GitHub Actions inputs and an optional
/// `shim-config.yml`; flags given here take precedence over all of them.
#[derive(Debug, Parser)]
#[command(name = "relshim", version, about)]
pub struct Cli {
    /// Repository in owner/name form
    #[arg(long = "repo", value_name = "OWNER/NAME")]
    pub repository: Option<String>,

    /// Branch, tag, commit or "latest"
    #[arg(long = "ref", value_name = "REF")]
    pub reference: Option<String>,

    /// Directory downloaded binaries are cached in
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Release asset name pattern, e.g. "{repo_name}-{os}-{arch}{ext}"
    #[arg(long)]
    pub pattern: Option<String>,

    /// Verify downloads with `gh attestation verify`
    #[arg(long, overrides_with = "no_verify_attestations")]
    pub verify_attestations: bool,

    /// Skip attestation verification
    #[arg(long, overrides_with = "verify_attestations")]
    pub no_verify_attestations: bool,

    /// What to do with a binary that fails verification: keep or evict
    #[arg(long, value_name = "POLICY")]
    pub attestation_failure: Option<AttestationFailurePolicy>,

    /// Base URL of the GitHub server
    #[arg(long, value_name = "URL")]
    pub server_url: Option<String>,

    /// Log level for relshim's own output
    #[arg(long, value_enum, default_value = "info")]
    pub level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "compact")]
    pub log_format: TracingFormat,

    /// Emit logs and errors as JSON
    #[arg(long)]
    pub json: bool,

    /// Arguments passed to the binary
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

impl Cli {
    /// Configuration layer built from the flags.
    #[must_use]
    pub fn overrides(&self) -> PartialConfig {
        let validate_attestations = if self.verify_attestations {
            Some(true)
        } else if self.no_verify_attestations {
            Some(false)
        } else {
            None
        };

        PartialConfig {
            cache_dir: self.cache_dir.clone(),
            github_token: None,
            reference: self.reference.clone(),
            repository: self.repository.clone(),
            pattern: self.pattern.clone(),
            validate_attestations,
            server_url: self.server_url.clone(),
            attestation_failure: self.attestation_failure,
        }
    }

    /// Tracing settings requested on the command line.
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig {
            format: if self.json {
                TracingFormat::Json
            } else {
                self.log_format
            },
            level: self.level.into(),
            filter: None,
        }
    }
}

/// Parse command-line arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

/// Error envelope for JSON output
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    /// Always "error"
    pub status: &'static str,
    /// Diagnostic code, e.g. `relshim::fetch::asset_not_found`
    pub code: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl ErrorEnvelope {
    /// Envelope for `err`.
    #[must_use]
    pub fn new(err: &Error) -> Self {
        Self {
            status: "error",
            code: err.code().map(|c| c.to_string()),
            message: err.to_string(),
        }
    }
}

/// Whether we are running inside a GitHub Actions job.
#[must_use]
pub fn in_github_actions(env: &dyn EnvSource) -> bool {
    env.var("GITHUB_ACTIONS").is_some_and(|v| v == "true")
}

/// Format `message` as an `::error::` workflow command.
#[must_use]
pub fn actions_error(message: &str) -> String {
    let escaped = message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A");
    format!("::error::{escaped}")
}

/// Report `err` on stderr, plus an Actions annotation on stdout when
/// `annotate` is set.
pub fn render_error(err: Error, json_mode: bool, annotate: bool) {
    if annotate {
        println!("{}", actions_error(&format!("relshim: {err}")));
        let _ = io::stdout().flush();
    }

    if json_mode {
        match serde_json::to_string(&ErrorEnvelope::new(&err)) {
            Ok(json) => eprintln!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err);
        eprintln!("{report:?}");
    }
    let _ = io::stderr().flush();
}
