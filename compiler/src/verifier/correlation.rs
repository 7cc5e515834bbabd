/**
Correlation function

Which correlation set each input operation uses, and for every variable of
that set, where the operation's request message carries its value. The
verifier fills this in; the type checker and message routing read it.
*/
use crate::ast::Path;
pub use crate::ast::{CorrelationAlias, CorrelationSetInfo, CorrelationVariable};
use std::collections::BTreeMap;

/// Index of a correlation set in declaration order
pub type CorrelationSetId = usize;

/// A correlation variable and the path of its value in a request message
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationPair {
    /// Qualified `csets.<var>` path
    pub variable_path: Path,
    /// Path relative to the request message root
    pub alias_path: Path,
}

#[derive(Debug, Clone, Default)]
pub struct CorrelationFunctionInfo {
    correlation_sets: Vec<CorrelationSetInfo>,
    operation_pairs: BTreeMap<String, Vec<CorrelationPair>>,
    operation_sets: BTreeMap<String, CorrelationSetId>,
    set_operations: BTreeMap<CorrelationSetId, Vec<String>>,
}

impl CorrelationFunctionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_correlation_set(&mut self, cset: CorrelationSetInfo) -> CorrelationSetId {
        self.correlation_sets.push(cset);
        self.correlation_sets.len() - 1
    }

    pub fn correlation_sets(&self) -> &[CorrelationSetInfo] {
        &self.correlation_sets
    }

    pub fn correlation_set(&self, id: CorrelationSetId) -> Option<&CorrelationSetInfo> {
        self.correlation_sets.get(id)
    }

    pub fn put_correlation_pair(&mut self, operation: &str, pair: CorrelationPair) {
        self.operation_pairs
            .entry(operation.to_string())
            .or_default()
            .push(pair);
    }

    pub fn operation_correlation_pairs(&self, operation: &str) -> &[CorrelationPair] {
        self.operation_pairs
            .get(operation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Assigns `operation` to a correlation set
    ///
    /// An operation correlates through one set only; the first binding wins
    /// and a later one returns `false`.
    pub fn bind_operation(&mut self, operation: &str, id: CorrelationSetId) -> bool {
        if self.operation_sets.contains_key(operation) {
            return false;
        }
        self.operation_sets.insert(operation.to_string(), id);
        self.set_operations
            .entry(id)
            .or_default()
            .push(operation.to_string());
        true
    }

    pub fn operation_correlation_set(&self, operation: &str) -> Option<&CorrelationSetInfo> {
        self.operation_sets
            .get(operation)
            .and_then(|id| self.correlation_sets.get(*id))
    }

    pub fn correlation_set_operations(&self, id: CorrelationSetId) -> &[String] {
        self.set_operations
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Bound operations with their set, in name order
    pub fn operations(&self) -> impl Iterator<Item = (&str, CorrelationSetId)> {
        self.operation_sets
            .iter()
            .map(|(name, id)| (name.as_str(), *id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLoc;

    fn cset(var: &str, guard: &str) -> CorrelationSetInfo {
        CorrelationSetInfo {
            variables: vec![CorrelationVariable {
                path: Path::from_names(&[var], SourceLoc::unknown()),
                aliases: vec![CorrelationAlias {
                    guard_type: guard.to_string(),
                    path: Path::from_names(&[var], SourceLoc::unknown()),
                }],
            }],
            loc: SourceLoc::unknown(),
        }
    }

    #[test]
    fn test_binding_is_exclusive() {
        let mut info = CorrelationFunctionInfo::new();
        let first = info.add_correlation_set(cset("sid", "A"));
        let second = info.add_correlation_set(cset("uid", "B"));

        assert!(info.bind_operation("op", first));
        assert!(!info.bind_operation("op", second));
        assert_eq!(info.correlation_set_operations(first), &["op".to_string()]);
        assert!(info.correlation_set_operations(second).is_empty());
        assert_eq!(
            info.operation_correlation_set("op"),
            info.correlation_set(first)
        );
    }

    #[test]
    fn test_pairs_accumulate_per_operation() {
        let mut info = CorrelationFunctionInfo::new();
        let loc = SourceLoc::unknown();
        info.put_correlation_pair(
            "op",
            CorrelationPair {
                variable_path: Path::from_names(&["csets", "sid"], loc.clone()),
                alias_path: Path::from_names(&["sid"], loc.clone()),
            },
        );
        info.put_correlation_pair(
            "op",
            CorrelationPair {
                variable_path: Path::from_names(&["csets", "uid"], loc.clone()),
                alias_path: Path::from_names(&["user", "id"], loc),
            },
        );

        assert_eq!(info.operation_correlation_pairs("op").len(), 2);
        assert!(info.operation_correlation_pairs("other").is_empty());
        assert!(info.operation_correlation_set("op").is_none());
    }
}
