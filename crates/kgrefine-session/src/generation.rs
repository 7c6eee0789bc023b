//! The text generation collaborator.
//!
//! The session only ever needs "prompt in, text out". Providers declare what
//! else they can do through [`Capabilities`]; callers branch on those flags
//! rather than on which provider they were handed.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use kgrefine_core::config::GeneratorConfig;
use kgrefine_core::RefineError;

use crate::error::{GenerationError, Result};

/// Optional features a generation service declares up front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `generate_structured` returns schema-conforming JSON.
    pub structured_output: bool,
    /// The provider accepts image inputs.
    pub images: bool,
}

/// A service that turns a prompt into generated text.
///
/// No structured-output guarantee is assumed from `generate`; whatever comes
/// back is treated as untrusted free-form text.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Declared optional features. Defaults to none.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Generate text for a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate JSON conforming to `schema`. Only meaningful when
    /// [`Capabilities::structured_output`] is declared.
    async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<Value> {
        let _ = (prompt, schema);
        Err(GenerationError::Unsupported("structured output"))
    }
}

/// Generation backed by an external command.
///
/// The prompt is written to the command's stdin and its stdout is taken as
/// the generated text. Provider specifics (endpoints, chat formatting) live
/// in that command.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: String,
    args: Vec<String>,
    credential: Option<(String, String)>,
}

impl CommandGenerator {
    /// Build a generator from explicit configuration.
    ///
    /// This is the one fatal failure in the engine: without a command, or
    /// with a configured credential variable that is unset, no session can
    /// make progress, so construction fails instead of every turn.
    pub fn new(config: &GeneratorConfig) -> std::result::Result<Self, RefineError> {
        if config.command.trim().is_empty() {
            return Err(RefineError::GeneratorUnavailable(
                "no generator command configured".to_string(),
            ));
        }

        let credential = match &config.api_key_env {
            Some(var) => {
                let value = std::env::var(var)
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| {
                        RefineError::GeneratorUnavailable(format!(
                            "credential variable {var} is not set"
                        ))
                    })?;
                Some((var.clone(), value))
            }
            None => None,
        };

        tracing::info!(command = %config.command, "Generator configured");
        Ok(Self {
            command: config.command.clone(),
            args: config.args.clone(),
            credential,
        })
    }
}

#[async_trait]
impl GenerationService for CommandGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some((name, value)) = &self.credential {
            cmd.env(name, value);
        }

        let mut child = cmd.spawn().map_err(|source| GenerationError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        // Feed stdin concurrently so a chatty child cannot deadlock on a
        // full stdout pipe while we are still writing.
        let writer = child.stdin.take().map(|mut stdin| {
            let bytes = prompt.as_bytes().to_vec();
            tokio::spawn(async move {
                stdin.write_all(&bytes).await?;
                stdin.shutdown().await
            })
        });

        let output = child.wait_with_output().await?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // The child may legitimately exit without reading all input.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(GenerationError::Io(e)),
                Err(e) => return Err(GenerationError::Provider(e.to_string())),
            }
        }

        if !output.status.success() {
            return Err(GenerationError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text =
            String::from_utf8(output.stdout).map_err(|e| GenerationError::InvalidOutput(e.to_string()))?;

        tracing::debug!(
            command = %self.command,
            prompt_chars = prompt.len(),
            response_chars = text.len(),
            "Generation complete"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: &str, args: &[&str]) -> GeneratorConfig {
        GeneratorConfig {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            api_key_env: None,
        }
    }

    #[test]
    fn empty_command_is_fatal() {
        let result = CommandGenerator::new(&config("  ", &[]));
        assert!(matches!(result, Err(RefineError::GeneratorUnavailable(_))));
    }

    #[test]
    fn missing_credential_is_fatal() {
        let mut cfg = config("cat", &[]);
        cfg.api_key_env = Some("KGREFINE_TEST_CREDENTIAL_THAT_IS_NEVER_SET".to_string());
        let result = CommandGenerator::new(&cfg);
        assert!(matches!(result, Err(RefineError::GeneratorUnavailable(_))));
    }

    #[test]
    fn default_capabilities_are_minimal() {
        let generator = CommandGenerator::new(&config("cat", &[])).unwrap();
        assert_eq!(generator.capabilities(), Capabilities::default());
    }

    #[tokio::test]
    async fn structured_generation_unsupported_by_default() {
        let generator = CommandGenerator::new(&config("cat", &[])).unwrap();
        let result = generator
            .generate_structured("prompt", &serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(GenerationError::Unsupported(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_output_is_returned() {
        let generator = CommandGenerator::new(&config("cat", &[])).unwrap();
        let text = generator.generate("echo this back").await.unwrap();
        assert_eq!(text, "echo this back");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let generator =
            CommandGenerator::new(&config("sh", &["-c", "echo quota exceeded >&2; exit 3"]))
                .unwrap();
        match generator.generate("hi").await {
            Err(GenerationError::Failed { code, stderr }) => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "quota exceeded");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let generator =
            CommandGenerator::new(&config("kgrefine-no-such-generator-binary", &[])).unwrap();
        let result = generator.generate("hi").await;
        assert!(matches!(result, Err(GenerationError::Spawn { .. })));
    }
}
