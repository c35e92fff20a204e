use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SubjectSettings {
    pub command: Vec<String>,
    #[serde(default = "default_replay_flag")]
    pub replay_flag: String,
    #[serde(default = "default_subject_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_replay_flag() -> String {
    "--input_test_file".to_string()
}

fn default_subject_timeout_ms() -> u64 {
    0
}

impl SubjectSettings {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            replay_flag: default_replay_flag(),
            timeout_ms: default_subject_timeout_ms(),
        }
    }

    /// `timeout-ms = 0` means no per-run bound.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms))
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BuildSettings {
    #[serde(default = "default_build_commands")]
    pub commands: Vec<Vec<String>>,
}

fn default_build_commands() -> Vec<Vec<String>> {
    vec![vec!["make".to_string()]]
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            commands: default_build_commands(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct EngineSettings {
    pub command: Vec<String>,
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,
    #[serde(default = "default_coverage_marker")]
    pub coverage_marker: String,
    #[serde(default = "default_working_copy")]
    pub working_copy: PathBuf,
}

fn default_artifact_prefix() -> String {
    "crash-".to_string()
}

fn default_coverage_marker() -> String {
    "cov:".to_string()
}

pub fn default_working_copy() -> PathBuf {
    PathBuf::from("newcorpus")
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SmokeSettings {
    pub command: Vec<String>,
    #[serde(default = "default_done_marker")]
    pub done_marker: String,
}

fn default_done_marker() -> String {
    "Done fuzzing".to_string()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ShakeoutConfig {
    pub subject: SubjectSettings,
    #[serde(default)]
    pub build: BuildSettings,
    #[serde(default)]
    pub engine: Option<EngineSettings>,
    #[serde(default)]
    pub smoke: Option<SmokeSettings>,
}

impl ShakeoutConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: ShakeoutConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    /// Minimal configuration for running straight from command-line flags:
    /// just the subject command, defaults everywhere else.
    pub fn for_subject(command: Vec<String>) -> Self {
        Self {
            subject: SubjectSettings::new(command),
            build: BuildSettings::default(),
            engine: None,
            smoke: None,
        }
    }
}
