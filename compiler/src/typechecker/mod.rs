/**
Session type checker

The second semantic pass. Computes a `TypingResult` dataflow fact per
statement and reports correlation variables that are used before being
provided, provided twice, provided inconsistently across branches, or
provided inside loops.
*/
pub mod checker;
pub mod errors;
pub mod typing;

pub use checker::TypeChecker;
pub use errors::SessionError;
pub use typing::TypingResult;
