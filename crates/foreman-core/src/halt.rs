//! Halt Detector: classifies raw provider output into halt reasons and
//! ambiguity, using regex pattern tables.

use regex::Regex;
use std::sync::LazyLock;

use foreman_db::model::ErrorClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltSignal {
    None,
    Blocked,
    OutputFormatInvalid,
    ProviderExecFailure,
    ResourceExhausted,
    ProviderCircuitBroken,
    AmbiguityDetected,
}

impl HaltSignal {
    /// Critical halts stop the loop immediately; everything else enters
    /// retry logic.
    pub fn is_critical(self) -> bool {
        matches!(self, HaltSignal::Blocked | HaltSignal::OutputFormatInvalid | HaltSignal::ProviderCircuitBroken)
    }
}

static AMBIGUITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)could you clarify",
        r"(?i)which (?:one|option) (?:do|would) you prefer",
        r"(?i)please (?:specify|confirm)",
        r"(?i)I('m| am) not sure (?:what|which|how) you (?:want|mean)",
        r"(?i)can you provide more (?:detail|information|context)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static ambiguity pattern is valid"))
    .collect()
});

static AUTH_PATTERNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(unauthorized|invalid api key|authentication failed|401)").unwrap());
static RATE_LIMIT_PATTERNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(rate limit|429|too many requests)").unwrap());
static RESOURCE_PATTERNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(resource exhausted|quota exceeded|out of memory|context length exceeded)").unwrap());
static INVALID_MODEL_PATTERNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(invalid model|unknown model|model not found)").unwrap());

/// Detect whether raw output contains text indicating the agent is asking
/// the operator a question it cannot answer itself.
pub fn detect_ambiguity(raw_output: &str) -> bool {
    AMBIGUITY_PATTERNS.iter().any(|p| p.is_match(raw_output))
}

/// Classify a provider's stderr/exit-code combination into an error class,
/// used by the circuit breaker to decide whether to trip.
pub fn classify_error(stderr: &str, _exit_code: Option<i32>) -> ErrorClass {
    if AUTH_PATTERNS.is_match(stderr) {
        ErrorClass::Auth
    } else if RATE_LIMIT_PATTERNS.is_match(stderr) {
        ErrorClass::RateLimit
    } else if RESOURCE_PATTERNS.is_match(stderr) {
        ErrorClass::ResourceExhausted
    } else if INVALID_MODEL_PATTERNS.is_match(stderr) {
        ErrorClass::InvalidModel
    } else {
        ErrorClass::Unknown
    }
}

/// The coding-task structured output the provider port expects.
pub fn is_valid_json_schema(raw_output: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(raw_output).is_ok()
}

/// Top-level classification combining exit status, self-reported block,
/// schema validity, and ambiguity detection.
///
/// Exit status is checked before schema validity: a nonzero exit means
/// there is no well-formed response to judge, so it is classified as an
/// exec failure rather than a format violation.
pub fn classify(raw_output: &str, stderr: &str, exit_code: Option<i32>, expect_json_schema: bool, self_reported_blocked: bool) -> HaltSignal {
    if self_reported_blocked {
        return HaltSignal::Blocked;
    }
    if let Some(code) = exit_code {
        if code != 0 {
            let class = classify_error(stderr, exit_code);
            return match class {
                ErrorClass::ResourceExhausted => HaltSignal::ResourceExhausted,
                _ => HaltSignal::ProviderExecFailure,
            };
        }
    }
    if expect_json_schema && !is_valid_json_schema(raw_output) {
        return HaltSignal::OutputFormatInvalid;
    }
    if detect_ambiguity(raw_output) {
        return HaltSignal::AmbiguityDetected;
    }
    HaltSignal::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_clarification_questions() {
        assert!(detect_ambiguity("Could you clarify which database you want me to use?"));
        assert!(!detect_ambiguity("Created the file successfully."));
    }

    #[test]
    fn classifies_auth_errors() {
        assert_eq!(classify_error("Error: invalid api key provided", Some(1)), ErrorClass::Auth);
    }

    #[test]
    fn classifies_rate_limit_errors() {
        assert_eq!(classify_error("429 too many requests", Some(1)), ErrorClass::RateLimit);
    }

    #[test]
    fn classifies_resource_exhausted() {
        assert_eq!(classify_error("quota exceeded for this billing period", Some(1)), ErrorClass::ResourceExhausted);
    }

    #[test]
    fn classify_returns_none_on_clean_exit_without_ambiguity() {
        assert_eq!(classify("all done", "", Some(0), false, false), HaltSignal::None);
    }

    #[test]
    fn classify_flags_invalid_json_schema_for_coding_tasks() {
        assert_eq!(classify("not json", "", Some(0), true, false), HaltSignal::OutputFormatInvalid);
    }

    #[test]
    fn classify_returns_resource_exhausted_on_matching_nonzero_exit() {
        assert_eq!(classify("", "quota exceeded", Some(1), false, false), HaltSignal::ResourceExhausted);
    }

    #[test]
    fn classify_is_critical_matches_spec_taxonomy() {
        assert!(HaltSignal::Blocked.is_critical());
        assert!(HaltSignal::OutputFormatInvalid.is_critical());
        assert!(HaltSignal::ProviderCircuitBroken.is_critical());
        assert!(!HaltSignal::ResourceExhausted.is_critical());
        assert!(!HaltSignal::AmbiguityDetected.is_critical());
    }
}
