/**
Semantic verification

The first semantic pass: declaration validity and correlation function
construction. See `semantic` for the checks and `correlation` for the
structure it hands to the type checker.
*/
pub mod correlation;
pub mod semantic;

pub use correlation::{CorrelationFunctionInfo, CorrelationPair, CorrelationSetId};
pub use semantic::{SemanticVerifier, Verification};
