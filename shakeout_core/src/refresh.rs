use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::config::EngineSettings;
use crate::corpus::{self, CorpusError};
use crate::process::{ProcessError, ProcessRunner, ProcessSpec};

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("Refresh I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl RefreshError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        RefreshError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Summary of one fuzzing campaign.
///
/// `coverage` holds the first and last coverage counters the engine printed,
/// or `None` when the engine printed none at all. An engine that measured a
/// coverage of zero still yields `Some`; absence of measurement and a zero
/// measurement stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignReport {
    pub coverage: Option<(u64, u64)>,
    pub tests_before: usize,
    pub tests_after: usize,
}

/// Drives one campaign of the external coverage-guided fuzzing engine over a
/// working copy of the corpus.
///
/// The engine runs inside a fresh scratch directory so the crash artifacts
/// it drops (files named with the artifact prefix) can be collected without
/// guessing what else it wrote. Newly discovered artifacts are merged into
/// the working copy afterwards; an artifact whose name collides with an
/// existing entry is renamed with a numeric suffix rather than overwriting
/// the entry it collides with.
#[derive(Debug, Clone)]
pub struct CorpusRefresher {
    command: Vec<String>,
    artifact_prefix: String,
    coverage_marker: String,
    pub working_copy: PathBuf,
}

impl CorpusRefresher {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            command: settings.command.clone(),
            artifact_prefix: settings.artifact_prefix.clone(),
            coverage_marker: settings.coverage_marker.clone(),
            working_copy: settings.working_copy.clone(),
        }
    }

    /// Copies `source` into the working copy, fuzzes it for `budget`
    /// wall-clock seconds, merges new crash artifacts, and reports the
    /// coverage delta.
    pub fn run(
        &self,
        runner: &mut dyn ProcessRunner,
        source: &Path,
        budget: Duration,
    ) -> Result<CampaignReport, RefreshError> {
        if self.working_copy.exists() {
            fs::remove_dir_all(&self.working_copy)
                .map_err(|e| RefreshError::io(&self.working_copy, e))?;
        }
        let tests_before = corpus::copy_entries(source, &self.working_copy)?;

        let scratch = tempfile::tempdir().map_err(|e| RefreshError::Io {
            path: PathBuf::from("<scratch>"),
            source: e,
        })?;

        let corpus_arg = std::path::absolute(&self.working_copy)
            .map_err(|e| RefreshError::io(&self.working_copy, e))?;
        let mut command = self.command.clone();
        command.push(corpus_arg.display().to_string());
        command.push("-detect_leaks=0".to_string());
        command.push("-use_value_profile=1".to_string());
        command.push(format!("-max_total_time={}", budget.as_secs()));

        let spec = ProcessSpec {
            command,
            working_dir: Some(scratch.path().to_path_buf()),
            // The engine bounds itself via -max_total_time.
            timeout: None,
        };
        let output = runner.run(&spec)?;
        if !output.success() {
            log::warn!(
                "fuzzing engine exited with {:?}; continuing with whatever it produced",
                output.exit_code
            );
        }

        let coverage = extract_coverage(&output.log, &self.coverage_marker);
        let merged = self.merge_artifacts(scratch.path())?;
        log::info!("merged {merged} new crash artifacts into {:?}", self.working_copy);

        let tests_after = corpus::list_entries(&self.working_copy)?.len();
        Ok(CampaignReport {
            coverage,
            tests_before,
            tests_after,
        })
    }

    fn merge_artifacts(&self, scratch: &Path) -> Result<usize, RefreshError> {
        let mut merged = 0;
        for entry in fs::read_dir(scratch).map_err(|e| RefreshError::io(scratch, e))? {
            let entry = entry.map_err(|e| RefreshError::io(scratch, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&self.artifact_prefix) {
                continue;
            }
            let dest = unique_destination(&self.working_copy, name);
            // Copy then remove: the scratch dir may live on another filesystem,
            // where a rename would fail.
            fs::copy(&path, &dest).map_err(|e| RefreshError::io(&path, e))?;
            fs::remove_file(&path).map_err(|e| RefreshError::io(&path, e))?;
            merged += 1;
        }
        Ok(merged)
    }
}

/// First free destination path for `name` under `dir`, suffixing `.1`, `.2`,
/// ... when the plain name is taken.
fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let mut dest = dir.join(name);
    let mut attempt = 1;
    while dest.exists() {
        dest = dir.join(format!("{name}.{attempt}"));
        attempt += 1;
    }
    dest
}

/// Pulls the first and last coverage counters out of an engine log.
///
/// A coverage line is any line containing the marker; the counter is its
/// final whitespace-delimited token. Lines whose final token does not parse
/// as an integer are skipped silently.
fn extract_coverage(log: &str, marker: &str) -> Option<(u64, u64)> {
    let mut first = None;
    let mut last = None;
    for line in log.lines() {
        if !line.contains(marker) {
            continue;
        }
        let Some(token) = line.split_whitespace().last() else {
            continue;
        };
        let Ok(value) = token.parse::<u64>() else {
            continue;
        };
        if first.is_none() {
            first = Some(value);
        }
        last = Some(value);
    }
    Some((first?, last?))
}
