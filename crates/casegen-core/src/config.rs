//! Client configuration
//!
//! Settings are read from a JSON file (every field optional), then
//! overridden from `CASEGEN_*` environment variables.

use crate::acp::{DiagnosticPolicy, TransportOptions, DEFAULT_MAX_FRAME_BYTES};
use crate::error::{ConfigError, Result};
use crate::types::{ClientInfo, EnvMap};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_AGENT_COMMAND: &str = "CASEGEN_AGENT_COMMAND";
pub const ENV_MODEL: &str = "CASEGEN_MODEL";
pub const ENV_MODE: &str = "CASEGEN_MODE";

/// How to launch the agent process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentCommand {
    pub command: String,
    pub args: Vec<String>,
    pub env: EnvMap,
    pub cwd: Option<PathBuf>,
}

impl AgentCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// `opencode acp`
    pub fn opencode() -> Self {
        Self::new("opencode").with_args(vec!["acp".to_string()])
    }

    /// Locate the executable: explicit paths as given, otherwise `PATH`,
    /// then the usual per-user install locations.
    pub fn resolve_program(&self) -> std::result::Result<PathBuf, ConfigError> {
        let command = Path::new(&self.command);
        if command.components().count() > 1 {
            return if command.is_file() {
                Ok(command.to_path_buf())
            } else {
                Err(ConfigError::AgentNotFound(self.command.clone()))
            };
        }

        let on_path = std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
            .unwrap_or_default();
        let in_home = dirs::home_dir()
            .map(|home| {
                [".opencode/bin", ".bun/bin", "node_modules/.bin"]
                    .iter()
                    .map(|dir| home.join(dir))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        on_path
            .into_iter()
            .chain(in_home)
            .map(|dir| dir.join(&self.command))
            .find(|candidate| candidate.is_file())
            .inspect(|found| debug!("Resolved agent {} to {:?}", self.command, found))
            .ok_or_else(|| ConfigError::AgentNotFound(self.command.clone()))
    }

    /// Copy of this command with the executable resolved to a full path.
    pub fn resolved(&self) -> std::result::Result<Self, ConfigError> {
        let program = self.resolve_program()?;
        Ok(Self {
            command: program.to_string_lossy().into_owned(),
            ..self.clone()
        })
    }
}

/// Everything needed to start and drive an agent connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    pub agent: AgentCommand,
    pub client_info: ClientInfo,
    pub spawn_timeout_ms: u64,
    /// Applies to every request except prompts
    pub call_timeout_ms: Option<u64>,
    pub prompt_timeout_ms: Option<u64>,
    /// Send `session/cancel` when a prompt times out
    pub cancel_on_timeout: bool,
    pub diagnostics: DiagnosticPolicy,
    pub max_frame_bytes: usize,
    pub event_capacity: usize,
    pub default_model: Option<String>,
    pub default_mode: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            agent: AgentCommand::opencode(),
            client_info: ClientInfo::default(),
            spawn_timeout_ms: 10_000,
            call_timeout_ms: None,
            prompt_timeout_ms: None,
            cancel_on_timeout: false,
            diagnostics: DiagnosticPolicy::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            event_capacity: 256,
            default_model: None,
            default_mode: None,
        }
    }
}

impl ClientConfig {
    /// `<config dir>/casegen/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("casegen").join("config.json"))
    }

    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else
    /// defaults. Environment overrides are applied and the result validated.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `CASEGEN_*` overrides using `lookup` to read variables.
    ///
    /// `CASEGEN_AGENT_COMMAND` is split on whitespace into program and args.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(command) = lookup(ENV_AGENT_COMMAND) {
            let mut parts = command.split_whitespace().map(str::to_string);
            if let Some(program) = parts.next() {
                self.agent.command = program;
                self.agent.args = parts.collect();
            }
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.is_empty()) {
            self.default_model = Some(model);
        }
        if let Some(mode) = lookup(ENV_MODE).filter(|m| !m.is_empty()) {
            self.default_mode = Some(mode);
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.agent.command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "agent.command",
                reason: "must not be empty".to_string(),
            });
        }
        if self.spawn_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "spawnTimeoutMs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "maxFrameBytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.diagnostics
            .validate()
            .map_err(|e| ConfigError::Invalid {
                field: "diagnostics.patterns",
                reason: e.to_string(),
            })
    }

    pub fn spawn_timeout(&self) -> Duration {
        Duration::from_millis(self.spawn_timeout_ms)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    pub fn prompt_timeout(&self) -> Option<Duration> {
        self.prompt_timeout_ms.map(Duration::from_millis)
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            spawn_timeout: self.spawn_timeout(),
            max_frame_bytes: self.max_frame_bytes,
            diagnostics: self.diagnostics.clone(),
            ..TransportOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_launch_opencode() {
        let config = ClientConfig::default();
        assert_eq!(config.agent.command, "opencode");
        assert_eq!(config.agent.args, vec!["acp"]);
        assert_eq!(config.spawn_timeout(), Duration::from_secs(10));
        assert!(config.call_timeout().is_none());
        assert!(!config.cancel_on_timeout);
        assert_eq!(config.diagnostics, DiagnosticPolicy::Log);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "agent": {{"command": "my-agent", "args": ["--acp"]}},
                "promptTimeoutMs": 60000,
                "cancelOnTimeout": true,
                "diagnostics": {{"policy": "fail_on_match", "patterns": ["panic"]}}
            }}"#
        )
        .unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.agent.command, "my-agent");
        assert_eq!(config.prompt_timeout(), Some(Duration::from_secs(60)));
        assert!(config.cancel_on_timeout);
        assert_eq!(config.spawn_timeout_ms, 10_000);
        assert_eq!(
            config.diagnostics,
            DiagnosticPolicy::FailOnMatch {
                patterns: vec!["panic".to_string()]
            }
        );
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = ClientConfig::load(file.path()).unwrap_err();
        match err {
            Error::Config(ConfigError::Parse { path, .. }) => {
                assert_eq!(path, file.path().display().to_string())
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_AGENT_COMMAND, "npx opencode-ai acp"),
            (ENV_MODEL, "lmstudio/qwen3-4b-mlx"),
            (ENV_MODE, ""),
        ]
        .into_iter()
        .collect();

        let mut config = ClientConfig::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.agent.command, "npx");
        assert_eq!(config.agent.args, vec!["opencode-ai", "acp"]);
        assert_eq!(config.default_model.as_deref(), Some("lmstudio/qwen3-4b-mlx"));
        assert_eq!(config.default_mode, None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ClientConfig::default();
        config.agent.command = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.diagnostics = DiagnosticPolicy::FailOnMatch {
            patterns: vec!["([".to_string()],
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "diagnostics.patterns", .. })
        ));
    }

    #[test]
    fn test_resolve_program() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-agent");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();

        let explicit = AgentCommand::new(script.to_string_lossy());
        assert_eq!(explicit.resolve_program().unwrap(), script);

        let missing = AgentCommand::new("definitely-not-an-agent-binary-4711");
        assert!(matches!(
            missing.resolve_program(),
            Err(ConfigError::AgentNotFound(_))
        ));
    }
}
