//! Configuration management for kgrefine.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`KGREFINE__` prefix, `__` separator)
//! 2. Config file (`kgrefine.toml`)
//! 3. Defaults
//!
//! Neo4j connection settings are read separately by the binary, next to the
//! graph client that consumes them.

use serde::Deserialize;

use crate::error::RefineError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct KgRefineConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Conversation session tuning.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Number of prior turns rendered into each prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Characters of the original source text embedded in each prompt.
    #[serde(default = "default_source_excerpt_chars")]
    pub source_excerpt_chars: usize,

    /// Directory for session journal storage.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,
}

/// How to reach the text generation service.
///
/// Passed explicitly into the generator at construction; nothing is read
/// from the process environment at call time.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GeneratorConfig {
    /// Executable that reads a prompt on stdin and writes generated text to stdout.
    #[serde(default)]
    pub command: String,

    /// Extra arguments for the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Name of an environment variable holding the provider credential.
    /// Must be set when the generator is constructed; it is forwarded to the
    /// child process.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_history_window() -> usize {
    4
}

fn default_source_excerpt_chars() -> usize {
    500
}

fn default_journal_dir() -> String {
    "./journals".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            source_excerpt_chars: default_source_excerpt_chars(),
            journal_dir: default_journal_dir(),
        }
    }
}

/// Load configuration from `{file_prefix}.toml` (optional) and `KGREFINE__*`
/// environment variables.
pub fn load(file_prefix: &str) -> Result<KgRefineConfig, RefineError> {
    let cfg = ::config::Config::builder()
        .add_source(::config::File::with_name(file_prefix).required(false))
        .add_source(
            ::config::Environment::with_prefix("KGREFINE")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let loaded: KgRefineConfig = cfg.try_deserialize()?;
    tracing::debug!(
        history_window = loaded.session.history_window,
        source_excerpt_chars = loaded.session.source_excerpt_chars,
        "Configuration loaded"
    );
    Ok(loaded)
}
