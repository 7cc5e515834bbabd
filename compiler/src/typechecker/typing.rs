/**
Typing results

The dataflow fact computed for one statement: which correlation paths and
ordinary variables it guarantees to provide, which ones it needs from its
context, which it invalidates, and which session operations it receives on.

A result describes the statement alone. Facts flowing in from the context
are passed separately as an entry result, and callers combine results with
the composition rules of the checker.
*/
use crate::ast::{FlaggedPath, Path, PathSet};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct TypingResult {
    needed_correlation: PathSet<Path>,
    provided_correlation: PathSet<FlaggedPath>,
    needed_variables: PathSet<Path>,
    provided_variables: PathSet<Path>,
    invalidated_variables: PathSet<Path>,
    session_operations: BTreeSet<String>,
    starting_operation: Option<String>,
}

impl TypingResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Facts holding before the next statement of a sequence
    ///
    /// `entry` is what held before the sequence, `preceding` the merged
    /// result of the statements already checked.
    pub fn chained(entry: &TypingResult, preceding: &TypingResult) -> Self {
        let mut result = TypingResult::new();
        for path in &entry.provided_variables {
            if !preceding.invalidated_variables.contains(path) {
                result.provided_variables.insert(path.clone());
            }
        }
        for path in &preceding.provided_variables {
            result.provided_variables.insert(path.clone());
        }
        for flagged in entry
            .provided_correlation
            .iter()
            .chain(&preceding.provided_correlation)
        {
            result.provided_correlation.insert(flagged.clone());
        }
        result
    }

    pub fn register_operation_input(&mut self, operation: &str, starting: bool) {
        if starting {
            self.starting_operation = Some(operation.to_string());
        } else {
            self.session_operations.insert(operation.to_string());
        }
    }

    /// Adopt the session operations of `other`, and its starting operation
    /// if none is set yet
    pub fn register_operations(&mut self, other: &TypingResult) {
        if self.starting_operation.is_none() {
            self.starting_operation = other.starting_operation.clone();
        }
        self.session_operations
            .extend(other.session_operations.iter().cloned());
    }

    pub fn provide(&mut self, path: &Path, fresh: bool) {
        if path.is_correlation() {
            self.provided_correlation
                .insert(FlaggedPath::new(path.clone(), fresh));
        } else {
            self.provided_variables.insert(path.clone());
        }
    }

    /// Provide keeping the freshness recorded in `flagged`
    pub fn provide_flagged(&mut self, flagged: &FlaggedPath) {
        if flagged.path.is_correlation() {
            self.provided_correlation.insert(flagged.clone());
        } else {
            self.provided_variables.insert(flagged.path.clone());
        }
    }

    pub fn need(&mut self, path: &Path) {
        if path.is_correlation() {
            self.needed_correlation.insert(path.clone());
        } else {
            self.needed_variables.insert(path.clone());
        }
    }

    pub fn need_all(&mut self, other: &TypingResult) {
        for path in other
            .needed_correlation
            .iter()
            .chain(&other.needed_variables)
        {
            self.need(path);
        }
    }

    pub fn provide_all(&mut self, other: &TypingResult) {
        for flagged in &other.provided_correlation {
            self.provide_flagged(flagged);
        }
        for path in &other.provided_variables {
            self.provided_variables.insert(path.clone());
        }
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.invalidated_variables.insert(path.clone());
        self.provided_variables.remove(path);
    }

    /// Drop `path` from the invalidated variables after it is assigned again
    pub fn revalidate(&mut self, path: &Path) {
        self.invalidated_variables.remove(path);
    }

    pub fn invalidate_all(&mut self, other: &TypingResult) {
        for path in &other.invalidated_variables {
            self.invalidate(path);
        }
    }

    /// Keep only the provided variables `other` provides as well
    pub fn remove_unshared_provided(&mut self, other: &TypingResult) {
        self.provided_variables
            .retain(|path| other.provided_variables.contains(path));
    }

    pub fn clear_provided_variables(&mut self) {
        self.provided_variables.clear();
    }

    /// Whether `path` is guaranteed to hold a value
    pub fn is_defined(&self, path: &Path) -> bool {
        self.provided_variables.contains(path) || self.provided_correlation.contains(path)
    }

    pub fn needed_correlation(&self) -> &PathSet<Path> {
        &self.needed_correlation
    }

    pub fn provided_correlation(&self) -> &PathSet<FlaggedPath> {
        &self.provided_correlation
    }

    pub fn needed_variables(&self) -> &PathSet<Path> {
        &self.needed_variables
    }

    pub fn provided_variables(&self) -> &PathSet<Path> {
        &self.provided_variables
    }

    pub fn invalidated_variables(&self) -> &PathSet<Path> {
        &self.invalidated_variables
    }

    pub fn session_operations(&self) -> &BTreeSet<String> {
        &self.session_operations
    }

    pub fn starting_operation(&self) -> Option<&str> {
        self.starting_operation.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLoc;

    fn path(names: &[&str]) -> Path {
        Path::from_names(names, SourceLoc::unknown())
    }

    #[test]
    fn test_provide_routes_by_kind() {
        let mut result = TypingResult::new();
        result.provide(&path(&["csets", "sid"]), true);
        result.provide(&path(&["x"]), false);

        assert_eq!(result.provided_correlation().len(), 1);
        assert!(result.provided_correlation().iter().all(|p| p.fresh));
        assert!(result.provided_variables().contains(&path(&["x"])));
        assert!(result.is_defined(&path(&["csets", "sid"])));
        assert!(!result.is_defined(&path(&["y"])));
    }

    #[test]
    fn test_first_provide_keeps_its_flag() {
        let mut result = TypingResult::new();
        let sid = path(&["csets", "sid"]);
        result.provide(&sid, false);
        result.provide(&sid, true);
        assert!(result.provided_correlation().get(&sid).is_some_and(|p| !p.fresh));
    }

    #[test]
    fn test_invalidate_removes_provided_variable() {
        let mut result = TypingResult::new();
        let x = path(&["x"]);
        result.provide(&x, false);
        result.invalidate(&x);
        assert!(!result.is_defined(&x));
        assert!(result.invalidated_variables().contains(&x));
    }

    #[test]
    fn test_remove_unshared_provided_intersects() {
        let mut left = TypingResult::new();
        left.provide(&path(&["a"]), false);
        left.provide(&path(&["b"]), false);
        let mut right = TypingResult::new();
        right.provide(&path(&["b"]), false);

        left.remove_unshared_provided(&right);
        assert!(!left.is_defined(&path(&["a"])));
        assert!(left.is_defined(&path(&["b"])));
    }

    #[test]
    fn test_operation_registration() {
        let mut starter = TypingResult::new();
        starter.register_operation_input("login", true);
        let mut body = TypingResult::new();
        body.register_operation_input("op", false);
        body.register_operation_input("logout", false);

        starter.register_operations(&body);
        assert_eq!(starter.starting_operation(), Some("login"));
        assert_eq!(starter.session_operations().len(), 2);

        let mut empty = TypingResult::new();
        empty.register_operations(&starter);
        assert_eq!(empty.starting_operation(), Some("login"));
    }

    #[test]
    fn test_chained_entry() {
        let mut entry = TypingResult::new();
        entry.provide(&path(&["a"]), false);
        entry.provide(&path(&["b"]), false);
        let mut preceding = TypingResult::new();
        preceding.invalidate(&path(&["a"]));
        preceding.provide(&path(&["csets", "sid"]), true);

        let chained = TypingResult::chained(&entry, &preceding);
        assert!(!chained.is_defined(&path(&["a"])));
        assert!(chained.is_defined(&path(&["b"])));
        assert!(chained.is_defined(&path(&["csets", "sid"])));
        assert!(chained.needed_correlation().is_empty());
    }
}
