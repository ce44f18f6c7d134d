//! Pipeline configuration loaded from TOML.
//!
//! One [`PipelineConfig`] is built in `main` and passed by reference into each
//! component; there is no process-wide configuration state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Placeholders every backend argument template must reference.
pub const REQUIRED_PLACEHOLDERS: [&str; 3] = ["{instruction}", "{log_dir}", "{subtask_id}"];

/// Upper bound for model and backend timeouts (one week).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;
/// Upper bound for the terminate-to-kill grace period.
pub const MAX_GRACE_PERIOD_MS: u64 = 10 * 60 * 1000;

/// Pipeline configuration (TOML).
///
/// Missing fields default to values that match the reference backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory for decomposition directories.
    pub log_root: PathBuf,

    /// Optional `agent_list.json`; when absent the catalog is derived from `backends`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    /// Proxy applied to every model client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    pub decomposer: ModelEndpoint,
    pub rewriter: ModelEndpoint,
    pub validator: ModelEndpoint,
    pub dispatch: DispatchSettings,

    /// Backend contracts keyed by backend name.
    pub backends: BTreeMap<String, BackendContract>,
}

/// One chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelEndpoint {
    pub api_url: String,
    /// Environment variable holding the bearer token. Unset means no auth header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl ModelEndpoint {
    fn with_model(model: &str, timeout_secs: u64) -> Self {
        Self {
            api_url: "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
                .to_string(),
            api_key_env: Some("TASKCHAIN_API_KEY".to_string()),
            model: model.to_string(),
            temperature: 0.0,
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(anyhow!("{section}.api_url must be set"));
        }
        if self.model.trim().is_empty() {
            return Err(anyhow!("{section}.model must be set"));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(anyhow!(
                "{section}.timeout_secs must be within 1..={MAX_TIMEOUT_SECS}"
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow!("{section}.temperature must be within 0.0..=2.0"));
        }
        Ok(())
    }
}

impl Default for ModelEndpoint {
    fn default() -> Self {
        Self::with_model("qwen-vl-max", 360)
    }
}

/// Process supervision settings shared by all backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchSettings {
    /// Time between terminate and kill once a backend overruns its timeout.
    pub grace_period_ms: u64,
    /// Combined output kept in memory and in `backend.log`.
    pub output_limit_bytes: usize,
    /// Capacity of the reader-to-dispatcher channel, in chunks.
    pub channel_capacity: usize,
}

impl DispatchSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: 1000,
            output_limit_bytes: 1_000_000,
            channel_capacity: 256,
        }
    }
}

/// How a backend expects its sub-task id argument.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    #[default]
    Int,
    String,
}

/// Invocation contract for one external executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendContract {
    /// Device tag advertised in the catalog.
    pub device: String,
    pub program: String,
    /// Argument template; `{instruction}`, `{log_dir}` and `{subtask_id}` are substituted.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    pub timeout_secs: u64,
    #[serde(default)]
    pub id_type: IdType,
}

impl BackendContract {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(anyhow!("backends.{name}.program must be set"));
        }
        if self.device.trim().is_empty() {
            return Err(anyhow!("backends.{name}.device must be set"));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(anyhow!(
                "backends.{name}.timeout_secs must be within 1..={MAX_TIMEOUT_SECS}"
            ));
        }
        for placeholder in REQUIRED_PLACEHOLDERS {
            if !self.args.iter().any(|arg| arg.contains(placeholder)) {
                return Err(anyhow!(
                    "backends.{name}.args must reference {placeholder}"
                ));
            }
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(
            "mobile_agent_e".to_string(),
            BackendContract {
                device: "android".to_string(),
                program: "python".to_string(),
                args: [
                    "run.py",
                    "--log_root",
                    "{log_dir}",
                    "--run_name",
                    "{subtask_id}",
                    "--setting",
                    "individual",
                    "--instruction",
                    "{instruction}",
                    "--atomic_tasks_numbers",
                    "{subtask_id}",
                ]
                .map(str::to_string)
                .to_vec(),
                workdir: None,
                timeout_secs: 60,
                id_type: IdType::String,
            },
        );
        for (name, script) in [("pc_agent_win", "run_v2.py"), ("jarvis_agent", "run_wrapper.py")] {
            backends.insert(
                name.to_string(),
                BackendContract {
                    device: if name == "pc_agent_win" { "windows" } else { "minecraft" }
                        .to_string(),
                    program: "python".to_string(),
                    args: [
                        script,
                        "--instruction",
                        "{instruction}",
                        "--log_dir",
                        "{log_dir}",
                        "--atomic_tasks_numbers",
                        "{subtask_id}",
                    ]
                    .map(str::to_string)
                    .to_vec(),
                    workdir: None,
                    timeout_secs: 600,
                    id_type: IdType::Int,
                },
            );
        }

        Self {
            log_root: PathBuf::from("Log"),
            catalog_path: None,
            proxy: None,
            decomposer: ModelEndpoint::default(),
            rewriter: ModelEndpoint::default(),
            validator: ModelEndpoint::with_model("deepseek-v3", 60),
            dispatch: DispatchSettings::default(),
            backends,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_root.as_os_str().is_empty() {
            return Err(anyhow!("log_root must be set"));
        }
        self.decomposer.validate("decomposer")?;
        self.rewriter.validate("rewriter")?;
        self.validator.validate("validator")?;
        if self.dispatch.grace_period_ms > MAX_GRACE_PERIOD_MS {
            return Err(anyhow!(
                "dispatch.grace_period_ms must be <= {MAX_GRACE_PERIOD_MS}"
            ));
        }
        if self.dispatch.output_limit_bytes == 0 {
            return Err(anyhow!("dispatch.output_limit_bytes must be > 0"));
        }
        if self.dispatch.channel_capacity == 0 {
            return Err(anyhow!("dispatch.channel_capacity must be > 0"));
        }
        if self.backends.is_empty() {
            return Err(anyhow!("at least one backend must be configured"));
        }
        for (name, contract) in &self.backends {
            contract.validate(name)?;
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
