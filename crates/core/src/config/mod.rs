//! Configuration for a shim invocation.
//!
//! A [`Config`] is assembled from partial layers merged left to right, each
//! later non-empty value overwriting the earlier one:
//!
//! 1. process environment ([`PartialConfig::from_env`])
//! 2. GitHub Actions inputs ([`PartialConfig::from_action_inputs`])
//! 3. `shim-config.yml` next to the action ([`PartialConfig::from_shim_file`])
//! 4. command-line overrides supplied by the binary
//!
//! Defaults are applied once, in [`PartialConfig::finish`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Server used when `GITHUB_SERVER_URL` is not set.
pub const DEFAULT_SERVER_URL: &str = "https://github.com";

/// Asset name template used when none is configured.
pub const DEFAULT_PATTERN: &str = "{repo_name}-{os}-{arch}{ext}";

/// Name of the optional YAML file shipped alongside an action.
pub const SHIM_CONFIG_FILE: &str = "shim-config.yml";

/// Source of environment variables.
///
/// The process environment in production, a plain map in tests.
pub trait EnvSource {
    /// Look up `key`, returning `None` when it is unset.
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// What to do with a cached artifact the verifier rejected.
///
/// A check that could not complete (the verifier failed to start, or the run
/// was cancelled) always evicts the artifact, whatever the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationFailurePolicy {
    /// Leave the file in the cache; a later run with verification disabled
    /// can use it without another download.
    #[default]
    Keep,
    /// Delete the file so the next run downloads it again.
    Evict,
}

impl FromStr for AttestationFailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "evict" | "delete" => Ok(Self::Evict),
            other => Err(Error::configuration(format!(
                "invalid attestation failure policy '{other}' (expected 'keep' or 'evict')"
            ))),
        }
    }
}

/// One configuration layer; every field is optional.
#[derive(Debug, Default)]
pub struct PartialConfig {
    /// Directory downloaded binaries are cached in.
    pub cache_dir: Option<PathBuf>,
    /// Token for the GitHub API and the attestation verifier.
    pub github_token: Option<SecretString>,
    /// Branch, tag, commit or `latest`.
    pub reference: Option<String>,
    /// Repository in `owner/name` form.
    pub repository: Option<String>,
    /// Asset name template.
    pub pattern: Option<String>,
    /// Whether downloaded binaries are checked with `gh attestation verify`.
    pub validate_attestations: Option<bool>,
    /// Base URL of the GitHub server.
    pub server_url: Option<String>,
    /// Cache policy after a failed attestation.
    pub attestation_failure: Option<AttestationFailurePolicy>,
}

/// Keys read from `shim-config.yml`.
#[derive(Debug, Default, Deserialize)]
struct ShimFile {
    action_repo: Option<String>,
    action_ref: Option<String>,
    pattern: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(Error::configuration(format!(
            "invalid boolean value for {key}: '{other}'"
        ))),
    }
}

/// Name of the environment variable GitHub Actions uses for an input.
#[must_use]
pub fn action_input_var(name: &str) -> String {
    format!("INPUT_{}", name.replace(' ', "_").to_uppercase())
}

impl PartialConfig {
    /// Read the layer sourced from plain environment variables.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed boolean or policy values.
    pub fn from_env(env: &dyn EnvSource) -> Result<Self> {
        let validate_attestations = non_empty(env.var("RELSHIM_VALIDATE_ATTESTATIONS"))
            .map(|v| parse_bool("RELSHIM_VALIDATE_ATTESTATIONS", &v))
            .transpose()?;
        let attestation_failure = non_empty(env.var("RELSHIM_ATTESTATION_FAILURE"))
            .map(|v| v.parse::<AttestationFailurePolicy>())
            .transpose()?;

        Ok(Self {
            cache_dir: non_empty(env.var("RELSHIM_CACHE_DIR")).map(PathBuf::from),
            github_token: non_empty(env.var("GH_TOKEN"))
                .or_else(|| non_empty(env.var("GITHUB_TOKEN")))
                .map(SecretString::from),
            reference: non_empty(env.var("GITHUB_ACTION_REF")),
            repository: non_empty(env.var("GITHUB_ACTION_REPOSITORY")),
            pattern: None,
            validate_attestations,
            server_url: non_empty(env.var("GITHUB_SERVER_URL")),
            attestation_failure,
        })
    }

    /// Read the layer sourced from the action's `with:` inputs.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed `validate_attestations`.
    pub fn from_action_inputs(env: &dyn EnvSource) -> Result<Self> {
        let input = |name: &str| non_empty(env.var(&action_input_var(name)));

        let validate_attestations = input("validate_attestations")
            .map(|v| parse_bool("input validate_attestations", &v))
            .transpose()?;

        Ok(Self {
            github_token: input("github_token").map(SecretString::from),
            reference: input("action_ref"),
            repository: input("action_repo"),
            pattern: input("pattern"),
            validate_attestations,
            ..Self::default()
        })
    }

    /// Read the layer sourced from `shim-config.yml`.
    ///
    /// Looks in `$GITHUB_ACTION_PATH` and then `$GITHUB_ACTION_PATH/shim`.
    /// A missing file yields an empty layer.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a file exists but cannot be read
    /// or parsed.
    pub fn from_shim_file(env: &dyn EnvSource) -> Result<Self> {
        let action_path = PathBuf::from(env.var("GITHUB_ACTION_PATH").unwrap_or_default());
        let candidates = [
            action_path.join(SHIM_CONFIG_FILE),
            action_path.join("shim").join(SHIM_CONFIG_FILE),
        ];

        for candidate in &candidates {
            match std::fs::read_to_string(candidate) {
                Ok(contents) => return Self::from_shim_yaml(candidate, &contents),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::configuration(format!(
                        "failed to read shim config {}: {e}",
                        candidate.display()
                    )));
                }
            }
        }

        tracing::debug!(?candidates, "No shim config file found");
        Ok(Self::default())
    }

    fn from_shim_yaml(path: &Path, contents: &str) -> Result<Self> {
        let file: ShimFile = if contents.trim().is_empty() {
            ShimFile::default()
        } else {
            serde_yaml::from_str(contents).map_err(|e| {
                Error::configuration(format!("failed to parse shim config {}: {e}", path.display()))
            })?
        };
        tracing::debug!(path = %path.display(), "Loaded shim config");

        Ok(Self {
            repository: non_empty(file.action_repo),
            reference: non_empty(file.action_ref),
            pattern: non_empty(file.pattern),
            ..Self::default()
        })
    }

    /// Overlay `over` on top of `self`; set fields in `over` win.
    #[must_use]
    pub fn merge(self, over: Self) -> Self {
        Self {
            cache_dir: over.cache_dir.or(self.cache_dir),
            github_token: over.github_token.or(self.github_token),
            reference: over.reference.or(self.reference),
            repository: over.repository.or(self.repository),
            pattern: over.pattern.or(self.pattern),
            validate_attestations: over.validate_attestations.or(self.validate_attestations),
            server_url: over.server_url.or(self.server_url),
            attestation_failure: over.attestation_failure.or(self.attestation_failure),
        }
    }

    /// Apply defaults and validate.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the repository or ref is missing or
    /// malformed, or when no cache directory can be determined.
    pub fn finish(self) -> Result<Config> {
        let repository = self.repository.map(|r| r.trim().to_string()).ok_or_else(|| {
            Error::configuration_with_help(
                "no repository configured",
                "Set GITHUB_ACTION_REPOSITORY, the action_repo input, or pass --repo owner/name",
            )
        })?;
        validate_repository(&repository)?;

        let reference = self
            .reference
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                Error::configuration_with_help(
                    "no ref configured",
                    "Set GITHUB_ACTION_REF, the action_ref input, or pass --ref (a tag, branch, commit or 'latest')",
                )
            })?;

        let cache_dir = match self.cache_dir {
            Some(dir) => dir,
            None => default_cache_dir()
                .ok_or_else(|| Error::configuration("failed to determine cache directory"))?,
        };

        let server_url = self
            .server_url
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Config {
            repository,
            reference,
            cache_dir,
            pattern: self.pattern.unwrap_or_else(|| DEFAULT_PATTERN.to_string()),
            validate_attestations: self.validate_attestations.unwrap_or(true),
            github_token: self.github_token,
            server_url,
            attestation_failure: self.attestation_failure.unwrap_or_default(),
        })
    }
}

fn validate_repository(repository: &str) -> Result<()> {
    match repository.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(())
        }
        _ => Err(Error::configuration(format!(
            "repository '{repository}' must be in owner/name form"
        ))),
    }
}

/// Get the default cache root, `<user cache dir>/relshim`.
#[must_use]
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("relshim"))
}

/// Fully resolved configuration consumed by the pipeline.
#[derive(Debug)]
pub struct Config {
    /// Repository in `owner/name` form.
    pub repository: String,
    /// Branch, tag, commit or `latest`.
    pub reference: String,
    /// Cache root.
    pub cache_dir: PathBuf,
    /// Asset name template.
    pub pattern: String,
    /// Whether downloaded binaries are attestation-checked.
    pub validate_attestations: bool,
    /// Token for the GitHub API and `gh`.
    pub github_token: Option<SecretString>,
    /// Base URL of the GitHub server, without a trailing slash.
    pub server_url: String,
    /// Cache policy after a failed attestation.
    pub attestation_failure: AttestationFailurePolicy,
}

impl Config {
    /// Load every layer from `env` and apply `overrides` last.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error from any layer or from
    /// validation.
    pub fn load(env: &dyn EnvSource, overrides: PartialConfig) -> Result<Self> {
        PartialConfig::from_env(env)?
            .merge(PartialConfig::from_action_inputs(env)?)
            .merge(PartialConfig::from_shim_file(env)?)
            .merge(overrides)
            .finish()
    }

    /// Repository name without the owner.
    #[must_use]
    pub fn repo_name(&self) -> &str {
        self.repository
            .rsplit_once('/')
            .map_or(self.repository.as_str(), |(_, name)| name)
    }

    /// Clone URL of the repository on the configured server.
    #[must_use]
    pub fn repository_url(&self) -> String {
        format!("{}/{}", self.server_url, self.repository)
    }

    /// The token, if one is configured.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.github_token.as_ref().map(|t| t.expose_secret())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_action_input_var() {
        assert_eq!(action_input_var("action_ref"), "INPUT_ACTION_REF");
        assert_eq!(action_input_var("my input"), "INPUT_MY_INPUT");
    }

    #[test]
    fn test_env_layer() {
        let layer = PartialConfig::from_env(&env(&[
            ("GITHUB_ACTION_REPOSITORY", "acme/tool"),
            ("GITHUB_ACTION_REF", "main"),
            ("RELSHIM_CACHE_DIR", "/tmp/cache"),
            ("GITHUB_TOKEN", "fallback"),
            ("RELSHIM_VALIDATE_ATTESTATIONS", "false"),
            ("RELSHIM_ATTESTATION_FAILURE", "evict"),
        ]))
        .unwrap();

        assert_eq!(layer.repository.as_deref(), Some("acme/tool"));
        assert_eq!(layer.reference.as_deref(), Some("main"));
        assert_eq!(layer.cache_dir, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(
            layer.github_token.as_ref().map(|t| t.expose_secret()),
            Some("fallback")
        );
        assert_eq!(layer.validate_attestations, Some(false));
        assert_eq!(layer.attestation_failure, Some(AttestationFailurePolicy::Evict));
    }

    #[test]
    fn test_gh_token_preferred_over_github_token() {
        let layer =
            PartialConfig::from_env(&env(&[("GH_TOKEN", "primary"), ("GITHUB_TOKEN", "other")]))
                .unwrap();
        assert_eq!(
            layer.github_token.as_ref().map(|t| t.expose_secret()),
            Some("primary")
        );
    }

    #[test]
    fn test_invalid_bool_is_configuration_error() {
        let err =
            PartialConfig::from_env(&env(&[("RELSHIM_VALIDATE_ATTESTATIONS", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("RELSHIM_VALIDATE_ATTESTATIONS"));
    }

    #[test]
    fn test_action_inputs_layer_ignores_empty_inputs() {
        let layer = PartialConfig::from_action_inputs(&env(&[
            ("INPUT_ACTION_REPO", "acme/tool"),
            ("INPUT_ACTION_REF", ""),
            ("INPUT_PATTERN", "{repo_name}_{os}_{arch}"),
            ("INPUT_VALIDATE_ATTESTATIONS", "no"),
        ]))
        .unwrap();
        assert_eq!(layer.repository.as_deref(), Some("acme/tool"));
        assert!(layer.reference.is_none());
        assert_eq!(layer.pattern.as_deref(), Some("{repo_name}_{os}_{arch}"));
        assert_eq!(layer.validate_attestations, Some(false));
    }

    #[test]
    fn test_merge_precedence() {
        let base = PartialConfig {
            repository: Some("env/repo".into()),
            reference: Some("v1.0.0".into()),
            ..PartialConfig::default()
        };
        let over = PartialConfig {
            repository: Some("yaml/repo".into()),
            ..PartialConfig::default()
        };
        let merged = base.merge(over);
        assert_eq!(merged.repository.as_deref(), Some("yaml/repo"));
        assert_eq!(merged.reference.as_deref(), Some("v1.0.0"));
    }

    #[test]
    fn test_finish_applies_defaults() {
        let config = PartialConfig {
            repository: Some("acme/tool".into()),
            reference: Some("latest".into()),
            cache_dir: Some(PathBuf::from("/c")),
            ..PartialConfig::default()
        }
        .finish()
        .unwrap();

        assert_eq!(config.pattern, DEFAULT_PATTERN);
        assert!(config.validate_attestations);
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.attestation_failure, AttestationFailurePolicy::Keep);
        assert_eq!(config.repo_name(), "tool");
        assert_eq!(config.repository_url(), "https://github.com/acme/tool");
        assert!(config.token().is_none());
    }

    #[test]
    fn test_finish_trims_server_url() {
        let config = PartialConfig {
            repository: Some("acme/tool".into()),
            reference: Some("main".into()),
            cache_dir: Some(PathBuf::from("/c")),
            server_url: Some("https://ghe.example.com/".into()),
            ..PartialConfig::default()
        }
        .finish()
        .unwrap();
        assert_eq!(config.repository_url(), "https://ghe.example.com/acme/tool");
    }

    #[test]
    fn test_finish_requires_repository_and_ref() {
        let err = PartialConfig::default().finish().unwrap_err();
        assert!(err.to_string().contains("no repository configured"));

        let err = PartialConfig {
            repository: Some("acme/tool".into()),
            ..PartialConfig::default()
        }
        .finish()
        .unwrap_err();
        assert!(err.to_string().contains("no ref configured"));
    }

    #[test]
    fn test_repository_must_be_owner_slash_name() {
        for bad in ["tool", "/tool", "acme/", "a/b/c"] {
            let err = PartialConfig {
                repository: Some(bad.into()),
                reference: Some("main".into()),
                cache_dir: Some(PathBuf::from("/c")),
                ..PartialConfig::default()
            }
            .finish()
            .unwrap_err();
            assert!(err.to_string().contains("owner/name"), "{bad}: {err}");
        }
    }

    #[test]
    fn test_shim_file_missing_is_empty_layer() {
        let temp = TempDir::new().unwrap();
        let layer = PartialConfig::from_shim_file(&env(&[(
            "GITHUB_ACTION_PATH",
            temp.path().to_str().unwrap(),
        )]))
        .unwrap();
        assert!(layer.repository.is_none());
        assert!(layer.pattern.is_none());
    }

    #[test]
    fn test_shim_file_in_shim_subdirectory() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("shim")).unwrap();
        std::fs::write(
            temp.path().join("shim").join(SHIM_CONFIG_FILE),
            "action_repo: acme/tool\naction_ref: v2.0.0\npattern: \"{repo_name}-{os}\"\nunknown: ignored\n",
        )
        .unwrap();

        let layer = PartialConfig::from_shim_file(&env(&[(
            "GITHUB_ACTION_PATH",
            temp.path().to_str().unwrap(),
        )]))
        .unwrap();
        assert_eq!(layer.repository.as_deref(), Some("acme/tool"));
        assert_eq!(layer.reference.as_deref(), Some("v2.0.0"));
        assert_eq!(layer.pattern.as_deref(), Some("{repo_name}-{os}"));
    }

    #[test]
    fn test_shim_file_malformed_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(SHIM_CONFIG_FILE), "action_repo: [unclosed").unwrap();
        let err = PartialConfig::from_shim_file(&env(&[(
            "GITHUB_ACTION_PATH",
            temp.path().to_str().unwrap(),
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_load_layers_yaml_over_inputs_over_env() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(SHIM_CONFIG_FILE), "action_ref: v3.0.0\n").unwrap();

        let config = Config::load(
            &env(&[
                ("GITHUB_ACTION_PATH", temp.path().to_str().unwrap()),
                ("GITHUB_ACTION_REPOSITORY", "env/repo"),
                ("GITHUB_ACTION_REF", "env-ref"),
                ("INPUT_ACTION_REPO", "input/repo"),
                ("INPUT_ACTION_REF", "input-ref"),
                ("RELSHIM_CACHE_DIR", "/var/cache/shim"),
            ]),
            PartialConfig {
                validate_attestations: Some(false),
                ..PartialConfig::default()
            },
        )
        .unwrap();

        assert_eq!(config.repository, "input/repo");
        assert_eq!(config.reference, "v3.0.0");
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/shim"));
        assert!(!config.validate_attestations);
    }

    #[test]
    fn test_attestation_failure_policy_parse() {
        assert_eq!("Keep".parse::<AttestationFailurePolicy>().unwrap(), AttestationFailurePolicy::Keep);
        assert_eq!(" evict ".parse::<AttestationFailurePolicy>().unwrap(), AttestationFailurePolicy::Evict);
        assert!("quarantine".parse::<AttestationFailurePolicy>().is_err());
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = PartialConfig {
            repository: Some("acme/tool".into()),
            reference: Some("main".into()),
            cache_dir: Some(PathBuf::from("/c")),
            github_token: Some(SecretString::from("super-secret".to_string())),
            ..PartialConfig::default()
        }
        .finish()
        .unwrap();
        assert!(!format!("{config:?}").contains("super-secret"));
        assert_eq!(config.token(), Some("super-secret"));
    }
}
