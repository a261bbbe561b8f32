//! Output configuration – reads `retarget.toml`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use retarget_output::HandlerConfig;
use retarget_types::ExclusionSet;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "RETARGET_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "retarget.toml";

/// Output backend selected for a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// `control_msgs/FollowJointTrajectory` action over rosbridge.
    FollowJointTrajectory,
    /// `sensor_msgs/JointState` topic over rosbridge.
    JointState,
    /// In-process simulated trajectory channel; no robot required.
    Sim,
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::FollowJointTrajectory => write!(f, "follow_joint_trajectory"),
            HandlerKind::JointState => write!(f, "joint_state"),
            HandlerKind::Sim => write!(f, "sim"),
        }
    }
}

/// One `[[handlers]]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerEntry {
    pub name: String,
    pub kind: HandlerKind,
    /// Action namespace or topic name.
    pub endpoint: String,
    #[serde(default)]
    pub excluded_joints: Vec<String>,
    /// Absent: `init` blocks until the endpoint answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
}

impl HandlerEntry {
    pub fn handler_config(&self) -> HandlerConfig {
        let excluded: ExclusionSet = self.excluded_joints.iter().cloned().collect();
        let cfg = HandlerConfig::new(&self.name).with_excluded(excluded);
        match self.connect_timeout_ms {
            Some(ms) => cfg.with_connect_timeout(Duration::from_millis(ms)),
            None => cfg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket URL of the robot's `rosbridge_server`.
    #[serde(default = "default_rosbridge_url")]
    pub rosbridge_url: String,

    #[serde(default = "default_handlers")]
    pub handlers: Vec<HandlerEntry>,
}

fn default_rosbridge_url() -> String {
    "ws://localhost:9090".to_string()
}

fn default_handlers() -> Vec<HandlerEntry> {
    vec![HandlerEntry {
        name: "arm".to_string(),
        kind: HandlerKind::FollowJointTrajectory,
        endpoint: "/arm_controller/follow_joint_trajectory".to_string(),
        excluded_joints: vec!["wheel_left".to_string(), "wheel_right".to_string()],
        connect_timeout_ms: None,
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rosbridge_url: default_rosbridge_url(),
            handlers: default_handlers(),
        }
    }
}

impl Config {
    /// `true` when at least one handler needs the rosbridge connection.
    pub fn uses_rosbridge(&self) -> bool {
        self.handlers.iter().any(|h| h.kind != HandlerKind::Sim)
    }

    /// Reject configurations the registry cannot represent unambiguously.
    pub fn validate(&self) -> Result<(), String> {
        let mut names = HashSet::new();
        for handler in &self.handlers {
            if handler.name.trim().is_empty() {
                return Err("handler name must not be empty".to_string());
            }
            if handler.endpoint.trim().is_empty() {
                return Err(format!("handler '{}' has an empty endpoint", handler.name));
            }
            if !names.insert(handler.name.as_str()) {
                return Err(format!("duplicate handler name '{}'", handler.name));
            }
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {}", e))
    }
}

/// Pick the config path: the `--config` argument, then `RETARGET_CONFIG`,
/// then `./retarget.toml`.
pub fn resolve_path(cli_arg: Option<&str>) -> PathBuf {
    cli_arg
        .map(PathBuf::from)
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load the config at `path`, falling back to defaults when the file does not
/// exist, then apply environment overrides.
pub fn load(path: &Path) -> Result<Config, String> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does not
/// exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `RETARGET_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `RETARGET_ROSBRIDGE_URL` | `rosbridge_url` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("RETARGET_ROSBRIDGE_URL") {
        cfg.rosbridge_url = v;
    }
}
