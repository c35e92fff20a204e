use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::classify::Classifier;
use crate::config::ShakeoutConfig;
use crate::corpus::{self, CorpusError};
use crate::dedup::ReproducerTable;
use crate::process::{ProcessError, ProcessRunner, ProcessSpec};
use crate::refresh::{CorpusRefresher, RefreshError};
use crate::subject::SubjectRunner;

/// Exit code for any failed session: failures found, build failure, or an
/// environment error.
pub const FAILURE_EXIT_CODE: i32 = 255;

/// How a completed session ended. Environment problems never reach this;
/// they surface as [`SessionError`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Clean,
    FailuresFound,
}

impl SessionOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionOutcome::Clean => 0,
            SessionOutcome::FailuresFound => FAILURE_EXIT_CODE,
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Build command {command:?} failed")]
    BuildFailed { command: Vec<String> },
    #[error("Refresh mode requested but no [engine] section is configured")]
    EngineNotConfigured,
    #[error("Smoke mode requested but no [smoke] section is configured")]
    SmokeNotConfigured,
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error("Report output failed: {0}")]
    Report(#[from] std::io::Error),
}

/// One triage session over a corpus directory.
///
/// Sequence: build the subject variants, optionally refresh the corpus with
/// a fuzzing campaign, classify every entry in order, then print the
/// deduplicated report. Everything the session learns lives in its two
/// reproducer tables and is dropped when it returns; the corpus directory is
/// the only state that outlives it.
pub struct Session {
    config: ShakeoutConfig,
    corpus_dir: PathBuf,
    fast: bool,
    refresh_budget: Option<Duration>,
    classifier: Classifier,
}

impl Session {
    pub fn new(
        config: ShakeoutConfig,
        corpus_dir: PathBuf,
        fast: bool,
        refresh_budget: Option<Duration>,
    ) -> Self {
        Self {
            config,
            corpus_dir,
            fast,
            refresh_budget,
            classifier: Classifier::with_default_rules(),
        }
    }

    /// Full triage run. The report goes to `out`; the caller maps the
    /// outcome to a process exit code.
    pub fn run(
        &self,
        runner: &mut dyn ProcessRunner,
        out: &mut dyn Write,
    ) -> Result<SessionOutcome, SessionError> {
        self.build(runner, out)?;

        let corpus_dir = match self.refresh_budget {
            Some(budget) => self.refresh(runner, out, budget)?,
            None => self.corpus_dir.clone(),
        };

        let subject = SubjectRunner::new(&self.config.subject);
        let mut fatals = ReproducerTable::new();
        let mut crashes = ReproducerTable::new();

        for entry in corpus::list_entries(&corpus_dir)? {
            let log_text = subject.run(runner, &entry)?;
            let outcome = self.classifier.classify(&log_text);
            if let Some(signature) = &outcome.crash {
                crashes.record(signature, outcome.steps, &entry);
            }
            if let Some(signature) = &outcome.fatal {
                fatals.record(signature, outcome.steps, &entry);
            }
            // Fast mode is an explicit opt-in trade of completeness for
            // speed: the rest of the corpus is skipped, not classified.
            if self.fast && !outcome.is_clean() {
                writeln!(out, "ABORTING AFTER DETECTING ONE FAILURE")?;
                break;
            }
        }

        report(out, &fatals, &crashes)?;
        if fatals.is_empty() && crashes.is_empty() {
            Ok(SessionOutcome::Clean)
        } else {
            Ok(SessionOutcome::FailuresFound)
        }
    }

    /// Legacy smoke run: build, run the standalone fuzzer once, echo its
    /// log, and succeed only if it printed the done marker.
    pub fn run_smoke(
        &self,
        runner: &mut dyn ProcessRunner,
        out: &mut dyn Write,
    ) -> Result<SessionOutcome, SessionError> {
        let smoke = self
            .config
            .smoke
            .as_ref()
            .ok_or(SessionError::SmokeNotConfigured)?;
        self.build(runner, out)?;

        let output = runner.run(&ProcessSpec::new(smoke.command.clone()))?;
        out.write_all(output.log.as_bytes())?;
        if output
            .log
            .lines()
            .any(|line| line.contains(&smoke.done_marker))
        {
            Ok(SessionOutcome::Clean)
        } else {
            Ok(SessionOutcome::FailuresFound)
        }
    }

    fn build(
        &self,
        runner: &mut dyn ProcessRunner,
        out: &mut dyn Write,
    ) -> Result<(), SessionError> {
        for command in &self.config.build.commands {
            let ok = match runner.run(&ProcessSpec::new(command.clone())) {
                Ok(output) => {
                    if !output.success() {
                        log::error!("build {:?} exited with {:?}", command, output.exit_code);
                    }
                    output.success()
                }
                Err(e) => {
                    log::error!("build {command:?} could not launch: {e}");
                    false
                }
            };
            if !ok {
                writeln!(out, "FAILED TO COMPILE")?;
                return Err(SessionError::BuildFailed {
                    command: command.clone(),
                });
            }
        }
        Ok(())
    }

    fn refresh(
        &self,
        runner: &mut dyn ProcessRunner,
        out: &mut dyn Write,
        budget: Duration,
    ) -> Result<PathBuf, SessionError> {
        let engine = self
            .config
            .engine
            .as_ref()
            .ok_or(SessionError::EngineNotConfigured)?;
        let refresher = CorpusRefresher::new(engine);
        let campaign = refresher.run(runner, &self.corpus_dir, budget)?;

        writeln!(out, "STARTING FROM {} TESTS", campaign.tests_before)?;
        if let Some((first, last)) = campaign.coverage {
            writeln!(out, "COVERAGE CHANGE WITH NEW FUZZING: {first} TO {last}")?;
        }
        writeln!(out, "THERE ARE NOW {} TESTS", campaign.tests_after)?;
        Ok(refresher.working_copy)
    }
}

/// Prints every fatal signature, then every crash signature, each with its
/// best reproducer, followed by the summary counts. Order within a category
/// is first-seen order, so a repeated run over the same corpus prints a
/// byte-identical report.
fn report(
    out: &mut dyn Write,
    fatals: &ReproducerTable,
    crashes: &ReproducerTable,
) -> std::io::Result<()> {
    for (signature, repro) in fatals.iter() {
        writeln!(out, "{signature} ({}, {})", repro.steps, repro.entry.display())?;
    }
    for (signature, repro) in crashes.iter() {
        writeln!(out, "{signature} ({}, {})", repro.steps, repro.entry.display())?;
    }
    writeln!(out, "{} FATALS {} CRASHES", fatals.len(), crashes.len())
}
