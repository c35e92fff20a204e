use std::path::Path;
use std::time::Duration;

use crate::config::SubjectSettings;
use crate::process::{ProcessError, ProcessRunner, ProcessSpec};

/// Runs the instrumented subject program once per corpus entry.
///
/// The entry path is appended after the configured replay flag, and the
/// subject's combined output comes back as the execution log. A subject that
/// crashes, gets killed by a signal, or exits non-zero still yields a log;
/// only a launch failure propagates, as that is an environment problem
/// rather than a triage result.
#[derive(Debug, Clone)]
pub struct SubjectRunner {
    command: Vec<String>,
    replay_flag: String,
    timeout: Option<Duration>,
}

impl SubjectRunner {
    pub fn new(settings: &SubjectSettings) -> Self {
        Self {
            command: settings.command.clone(),
            replay_flag: settings.replay_flag.clone(),
            timeout: settings.timeout(),
        }
    }

    /// Executes the subject against one corpus entry and returns the
    /// captured log.
    pub fn run(
        &self,
        runner: &mut dyn ProcessRunner,
        entry: &Path,
    ) -> Result<String, ProcessError> {
        let mut command = self.command.clone();
        if !self.replay_flag.is_empty() {
            command.push(self.replay_flag.clone());
        }
        command.push(entry.display().to_string());

        let spec = ProcessSpec {
            command,
            working_dir: None,
            timeout: self.timeout,
        };
        let output = runner.run(&spec)?;
        if let Some(signal) = output.signal {
            log::debug!("subject killed by signal {signal} on {entry:?}");
        }
        Ok(output.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubjectSettings;
    use crate::process::testing::ScriptedRunner;
    use std::path::Path;

    fn runner_under_test() -> SubjectRunner {
        let mut settings = SubjectSettings::new(vec!["./ds_rb".to_string()]);
        settings.timeout_ms = 2000;
        SubjectRunner::new(&settings)
    }

    #[test]
    fn appends_replay_flag_and_entry_path() {
        let subject = runner_under_test();
        let mut fake = ScriptedRunner::new();
        fake.push_log("STEP\n", 0);

        subject
            .run(&mut fake, Path::new("corpus/input-07"))
            .expect("scripted run should succeed");

        assert_eq!(fake.calls.len(), 1);
        assert_eq!(
            fake.calls[0].command,
            vec!["./ds_rb", "--input_test_file", "corpus/input-07"]
        );
        assert_eq!(
            fake.calls[0].timeout,
            Some(Duration::from_millis(2000)),
            "the configured per-run timeout must reach the process runner"
        );
    }

    #[test]
    fn crashing_subject_still_yields_its_log() {
        let subject = runner_under_test();
        let mut fake = ScriptedRunner::new();
        fake.push_log("STEP\nAddressSanitizer: SEGV\n", 1);

        let log = subject
            .run(&mut fake, Path::new("corpus/bad"))
            .expect("a crashing subject is data, not an error");
        assert!(log.contains("AddressSanitizer"));
    }

    #[test]
    fn launch_failure_propagates() {
        let subject = runner_under_test();
        let mut fake = ScriptedRunner::new();
        fake.push_error(ProcessError::Launch {
            program: "./ds_rb".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });

        let result = subject.run(&mut fake, Path::new("corpus/any"));
        assert!(
            matches!(result, Err(ProcessError::Launch { .. })),
            "a missing subject binary must surface as a launch error"
        );
    }

    #[test]
    fn empty_replay_flag_passes_the_bare_path() {
        let settings = SubjectSettings {
            command: vec!["./subject".to_string()],
            replay_flag: String::new(),
            timeout_ms: 0,
        };
        let subject = SubjectRunner::new(&settings);
        let mut fake = ScriptedRunner::new();
        fake.push_log("", 0);

        subject.run(&mut fake, Path::new("corpus/raw")).unwrap();
        assert_eq!(fake.calls[0].command, vec!["./subject", "corpus/raw"]);
        assert_eq!(fake.calls[0].timeout, None);
    }
}
