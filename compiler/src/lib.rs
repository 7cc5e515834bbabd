/// Correlation-safety front end for service programs
///
/// This crate implements the two semantic passes run over a parsed program:
/// - Semantic verification of declarations, ports, types and correlation sets
/// - Session type checking of correlation variable lifetimes
///
/// `check_program` runs both in order.
pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod parser;
pub mod typechecker;
pub mod verifier;

pub use ast::{Program, SourceLoc};
pub use config::{ExecutionMode, VerifierConfig};
pub use diagnostics::{CodeCheckError, Diagnostic, DiagnosticKind};
pub use typechecker::TypeChecker;
pub use verifier::{CorrelationFunctionInfo, SemanticVerifier};

/// Outcome of a successful check
#[derive(Debug)]
pub struct Analysis {
    pub correlation_function_info: CorrelationFunctionInfo,
    pub execution_mode: ExecutionMode,
    pub warnings: Vec<Diagnostic>,
}

/// Verify `program`, then type check the selected execution unit
///
/// The type checker only runs when verification succeeded.
pub fn check_program(
    program: &Program,
    config: &VerifierConfig,
) -> Result<Analysis, CodeCheckError> {
    let verification = SemanticVerifier::new(program, config.clone()).validate()?;

    let mut checker = TypeChecker::new(
        program,
        &verification.execution_unit,
        verification.execution_mode,
        &verification.correlation_function_info,
    );
    if !checker.check() {
        return Err(CodeCheckError::new(checker.into_diagnostics()));
    }
    tracing::debug!(
        mode = %verification.execution_mode,
        correlation_sets = verification.correlation_function_info.correlation_sets().len(),
        "program is correlation safe"
    );

    Ok(Analysis {
        correlation_function_info: verification.correlation_function_info,
        execution_mode: verification.execution_mode,
        warnings: verification.warnings,
    })
}
