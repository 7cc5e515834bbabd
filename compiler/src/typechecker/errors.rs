/**
Session checking errors
*/
use crate::diagnostics::DiagnosticKind;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("Cannot find the main entry point")]
    MissingMain,

    /// A procedure call seen before the procedure was typed
    #[error("Can not find definition {name}")]
    UndefinedDefinition { name: String },

    #[error("Correlation path {path} is not initialised before usage.")]
    CorrelationNotInitialised { path: String },

    #[error(
        "Variable {path} is not initialised before using it to initialise a correlation variable."
    )]
    VariableNotInitialised { path: String },

    #[error("Every correlation set must have at least one fresh value (maybe you are not using new?).")]
    NoFreshValue,

    #[error("Correlation variables can not be defined more than one time.")]
    DuplicateCorrelation,

    #[error("Correlation variables can not be initialised in the init procedure.")]
    CorrelationInInit,

    #[error("Correlation variables must be initialized in every branch.")]
    ChoiceBranchMismatch,

    #[error("Correlation variables must be initialized in every if-then-else branch.")]
    ConditionalBranchMismatch,

    #[error(
        "Operation {operation} can not be used both as a starter and in the body of another session branch."
    )]
    StarterInSessionBody { operation: String },

    #[error("Initialising correlation variables in loops is forbidden.")]
    CorrelationInLoop,

    #[error("No correlation set defined for operation {operation}")]
    MissingCorrelationSet { operation: String },

    #[error("Input operations can not receive on a correlation variable")]
    InputIntoCorrelation,

    #[error("Solicit-response statements can not receive on a correlation variable")]
    SolicitResponseIntoCorrelation,

    #[error(
        "Variable {source_path} may be undefined before being used for defining correlation variable {target}"
    )]
    UndefinedCorrelationSource { source_path: String, target: String },

    #[error("Correlation variables must either be initialised with new, a variable or a constant.")]
    InvalidCorrelationValue,
}

impl SessionError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            SessionError::MissingMain
            | SessionError::UndefinedDefinition { .. }
            | SessionError::InputIntoCorrelation => DiagnosticKind::Structural,
            SessionError::MissingCorrelationSet { .. } => DiagnosticKind::CorrelationCoverage,
            _ => DiagnosticKind::SessionSafety,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_interpolate_names() {
        let error = SessionError::UndefinedCorrelationSource {
            source_path: "req.id".to_string(),
            target: "csets.sid".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Variable req.id may be undefined before being used for defining correlation variable csets.sid"
        );
        assert_eq!(
            SessionError::StarterInSessionBody {
                operation: "login".to_string()
            }
            .to_string(),
            "Operation login can not be used both as a starter and in the body of another session branch."
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            SessionError::MissingCorrelationSet {
                operation: "op".to_string()
            }
            .kind(),
            DiagnosticKind::CorrelationCoverage
        );
        assert_eq!(SessionError::CorrelationInLoop.kind(), DiagnosticKind::SessionSafety);
        assert_eq!(
            SessionError::UndefinedDefinition {
                name: "f".to_string()
            }
            .kind(),
            DiagnosticKind::Structural
        );
    }
}
