/**
Configuration for the semantic passes

The verifier needs to know which service to analyse when a module declares
several, and whether a missing `main` procedure is an error (libraries of
interfaces and types have none).
*/
use std::fmt;

/// How instances of a service are spawned at runtime
///
/// Only `Single` changes the analysis: a single-instance service has no
/// sessions to correlate, so input statements carry no correlation facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionMode {
    #[default]
    Single,
    Sequential,
    Concurrent,
}

impl ExecutionMode {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "single" => Some(ExecutionMode::Single),
            "sequential" => Some(ExecutionMode::Sequential),
            "concurrent" => Some(ExecutionMode::Concurrent),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Single => write!(f, "single"),
            ExecutionMode::Sequential => write!(f, "sequential"),
            ExecutionMode::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Options for `SemanticVerifier`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    /// Service to analyse when the module declares more than one
    pub execution_target: Option<String>,

    /// Report an error when no `main` procedure is reachable
    pub check_for_main: bool,
}

impl VerifierConfig {
    pub fn new() -> Self {
        VerifierConfig {
            execution_target: None,
            check_for_main: true,
        }
    }

    pub fn with_execution_target(mut self, target: impl Into<String>) -> Self {
        self.execution_target = Some(target.into());
        self
    }

    pub fn with_check_for_main(mut self, check_for_main: bool) -> Self {
        self.check_for_main = check_for_main;
        self
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_requires_main() {
        let config = VerifierConfig::default();
        assert!(config.check_for_main);
        assert_eq!(config.execution_target, None);
    }

    #[test]
    fn test_builder_setters() {
        let config = VerifierConfig::new()
            .with_execution_target("Gateway")
            .with_check_for_main(false);
        assert_eq!(config.execution_target.as_deref(), Some("Gateway"));
        assert!(!config.check_for_main);
    }

    #[test]
    fn test_execution_mode_keywords() {
        assert_eq!(
            ExecutionMode::from_keyword("concurrent"),
            Some(ExecutionMode::Concurrent)
        );
        assert_eq!(ExecutionMode::from_keyword("parallel"), None);
        assert_eq!(ExecutionMode::default(), ExecutionMode::Single);
    }
}
