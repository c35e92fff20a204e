/// The two families of failure a subject run can report.
///
/// `Crash` covers memory-safety diagnostics and generic crash markers;
/// `Fatal` covers explicit fatal-assertion markers. One execution log may
/// carry one signature of each family at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    Crash,
    Fatal,
}

impl FailureCategory {
    pub fn label(&self) -> &'static str {
        match self {
            FailureCategory::Crash => "CRASH",
            FailureCategory::Fatal => "FATAL",
        }
    }
}

/// One line-matching rule: any log line containing `needle` becomes the
/// current signature for `category`.
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub category: FailureCategory,
    pub needle: String,
}

impl MatchRule {
    pub fn new(category: FailureCategory, needle: &str) -> Self {
        Self {
            category,
            needle: needle.to_string(),
        }
    }
}

/// Result of classifying one execution log.
///
/// A signature is the full matching line, verbatim. No normalization is
/// applied: two logs are the same failure exactly when their signature lines
/// are byte-identical. `steps` counts progress-marker lines across the whole
/// log and serves as a simplicity proxy for reproducers (fewer is simpler;
/// a log with no markers counts as maximally simple).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub crash: Option<String>,
    pub fatal: Option<String>,
    pub steps: u64,
}

impl Outcome {
    pub fn is_clean(&self) -> bool {
        self.crash.is_none() && self.fatal.is_none()
    }

    pub fn signature(&self, category: FailureCategory) -> Option<&str> {
        match category {
            FailureCategory::Crash => self.crash.as_deref(),
            FailureCategory::Fatal => self.fatal.as_deref(),
        }
    }
}

/// Scans execution logs for failure signatures and progress markers.
///
/// The scan is a single forward fold over lines with last-match-wins
/// semantics per category: when several diagnostic lines match the same
/// category, the final one is the canonical signature. This deliberately
/// trades root-cause precision for cheap, symbolizer-free grouping; the
/// trailing line of a multi-line diagnostic decides the signature.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<MatchRule>,
    step_marker: String,
}

impl Classifier {
    pub fn new(rules: Vec<MatchRule>, step_marker: &str) -> Self {
        Self {
            rules,
            step_marker: step_marker.to_string(),
        }
    }

    /// The stock rule set for DeepState-style subjects: sanitizer and crash
    /// markers feed the crash signature, "FATAL" feeds the fatal signature,
    /// and "STEP" lines are the progress counter.
    pub fn with_default_rules() -> Self {
        Self::new(
            vec![
                MatchRule::new(FailureCategory::Crash, "Crash"),
                MatchRule::new(FailureCategory::Crash, "UndefinedBehaviorSanitizer"),
                MatchRule::new(FailureCategory::Crash, "AddressSanitizer"),
                MatchRule::new(FailureCategory::Fatal, "FATAL"),
            ],
            "STEP",
        )
    }

    pub fn classify(&self, log: &str) -> Outcome {
        log.lines().fold(Outcome::default(), |mut outcome, line| {
            if line.contains(&self.step_marker) {
                outcome.steps += 1;
            }
            for rule in &self.rules {
                if line.contains(&rule.needle) {
                    let slot = match rule.category {
                        FailureCategory::Crash => &mut outcome.crash,
                        FailureCategory::Fatal => &mut outcome.fatal,
                    };
                    *slot = Some(line.to_string());
                }
            }
            outcome
        })
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_log_yields_empty_signatures() {
        let classifier = Classifier::with_default_rules();
        let outcome = classifier.classify("starting up\nall good\nshutting down\n");
        assert!(outcome.is_clean(), "expected clean, got {outcome:?}");
        assert_eq!(outcome.steps, 0);
    }

    #[test]
    fn single_fatal_line_is_recorded_verbatim() {
        let classifier = Classifier::with_default_rules();
        let outcome = classifier.classify("STEP 1\nFATAL: null deref\n");
        assert_eq!(outcome.fatal.as_deref(), Some("FATAL: null deref"));
        assert!(outcome.crash.is_none());
        assert_eq!(outcome.steps, 1);
    }

    #[test]
    fn last_matching_sanitizer_line_wins() {
        let classifier = Classifier::with_default_rules();
        let log = "AddressSanitizer: heap-buffer-overflow\n\
                   some frame info\n\
                   AddressSanitizer: SUMMARY line\n";
        let outcome = classifier.classify(log);
        assert_eq!(
            outcome.crash.as_deref(),
            Some("AddressSanitizer: SUMMARY line"),
            "the final matching line must be the canonical signature"
        );
    }

    #[test]
    fn crash_and_fatal_are_tracked_independently() {
        let classifier = Classifier::with_default_rules();
        let log = "STEP a\nFATAL: assert failed\nSTEP b\nCrash in handler\n";
        let outcome = classifier.classify(log);
        assert_eq!(outcome.fatal.as_deref(), Some("FATAL: assert failed"));
        assert_eq!(outcome.crash.as_deref(), Some("Crash in handler"));
        assert_eq!(outcome.steps, 2);
    }

    #[test]
    fn ubsan_marker_feeds_the_crash_signature() {
        let classifier = Classifier::with_default_rules();
        let outcome = classifier.classify("UndefinedBehaviorSanitizer: signed overflow\n");
        assert_eq!(
            outcome.crash.as_deref(),
            Some("UndefinedBehaviorSanitizer: signed overflow")
        );
    }

    #[test]
    fn step_lines_count_even_after_a_failure_line() {
        let classifier = Classifier::with_default_rules();
        let outcome = classifier.classify("STEP 1\nFATAL: boom\nSTEP 2\nSTEP 3\n");
        assert_eq!(outcome.steps, 3);
    }

    #[test]
    fn marker_substring_matches_anywhere_in_the_line() {
        let classifier = Classifier::with_default_rules();
        let outcome = classifier.classify("note: a Crash was observed here\n");
        assert_eq!(
            outcome.crash.as_deref(),
            Some("note: a Crash was observed here")
        );
    }

    #[test]
    fn custom_rules_replace_the_stock_set() {
        let classifier = Classifier::new(
            vec![MatchRule::new(FailureCategory::Fatal, "panicked at")],
            "tick",
        );
        let outcome = classifier.classify("tick\ntick\nthread 'main' panicked at 'oops'\n");
        assert_eq!(
            outcome.fatal.as_deref(),
            Some("thread 'main' panicked at 'oops'")
        );
        assert!(outcome.crash.is_none());
        assert_eq!(outcome.steps, 2);
    }

    #[test]
    fn signature_accessor_selects_by_category() {
        let classifier = Classifier::with_default_rules();
        let outcome = classifier.classify("FATAL: x\nCrash: y\n");
        assert_eq!(outcome.signature(FailureCategory::Fatal), Some("FATAL: x"));
        assert_eq!(outcome.signature(FailureCategory::Crash), Some("Crash: y"));
    }
}
