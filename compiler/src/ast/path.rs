/**
Variable paths

A path addresses a node in the data tree of a session: `a.b[2].c`,
`global.counter`, `csets.sid`. Each segment has a key and an optional
index; both may be computed at runtime, which makes the path dynamic.

Equality between paths is structural equivalence: same kind, same length,
pairwise equal constant keys and indices, with a missing index meaning 0.
A dynamic component is never equal to anything, so `PartialEq` is not
reflexive for dynamic paths and `Eq` is deliberately not implemented.
*/
use super::{Expr, ExprKind, SourceLoc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    Normal,
    /// Rooted at `global`; the keyword itself is not stored as a segment
    Global,
    /// First segment is `csets`
    CorrelationSet,
}

#[derive(Debug, Clone)]
pub enum PathKey {
    Name(String),
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum PathIndex {
    Const(i64),
    Dynamic(Box<Expr>),
}

impl PathIndex {
    /// Constant integer literals become `Const`, anything else is dynamic
    pub fn from_expr(expr: Expr) -> Self {
        match expr.kind {
            ExprKind::Int(n) => PathIndex::Const(n),
            _ => PathIndex::Dynamic(Box::new(expr)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathSegment {
    pub key: PathKey,
    pub index: Option<PathIndex>,
}

impl PathSegment {
    pub fn named(name: impl Into<String>) -> Self {
        PathSegment {
            key: PathKey::Name(name.into()),
            index: None,
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self.key, PathKey::Name(_))
            && !matches!(self.index, Some(PathIndex::Dynamic(_)))
    }

    pub fn name(&self) -> Option<&str> {
        match &self.key {
            PathKey::Name(name) => Some(name),
            PathKey::Dynamic(_) => None,
        }
    }

    fn constant_index(&self) -> Option<i64> {
        match &self.index {
            None => Some(0),
            Some(PathIndex::Const(n)) => Some(*n),
            Some(PathIndex::Dynamic(_)) => None,
        }
    }
}

impl PartialEq for PathSegment {
    fn eq(&self, other: &Self) -> bool {
        let keys_equal = match (&self.key, &other.key) {
            (PathKey::Name(a), PathKey::Name(b)) => a == b,
            _ => false,
        };
        if !keys_equal {
            return false;
        }
        match (self.constant_index(), other.constant_index()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Path {
    pub kind: PathKind,
    pub segments: Vec<PathSegment>,
    pub loc: SourceLoc,
}

impl Path {
    pub fn new(kind: PathKind, loc: SourceLoc) -> Self {
        Path {
            kind,
            segments: Vec::new(),
            loc,
        }
    }

    /// Static path from plain names; `csets` as the first name makes it a
    /// correlation path
    pub fn from_names(names: &[&str], loc: SourceLoc) -> Self {
        let kind = if names.first() == Some(&"csets") {
            PathKind::CorrelationSet
        } else {
            PathKind::Normal
        };
        Path {
            kind,
            segments: names.iter().map(|n| PathSegment::named(*n)).collect(),
            loc,
        }
    }

    /// `csets.<variable>`
    pub fn correlation(variable: &Path) -> Self {
        let mut segments = Vec::with_capacity(variable.segments.len() + 1);
        segments.push(PathSegment {
            key: PathKey::Name("csets".to_string()),
            index: Some(PathIndex::Const(0)),
        });
        segments.extend(variable.segments.iter().cloned());
        Path {
            kind: PathKind::CorrelationSet,
            segments,
            loc: variable.loc.clone(),
        }
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    pub fn is_static(&self) -> bool {
        self.segments.iter().all(PathSegment::is_static)
    }

    pub fn is_global(&self) -> bool {
        self.kind == PathKind::Global
    }

    pub fn is_correlation(&self) -> bool {
        self.kind == PathKind::CorrelationSet
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Name of the first segment when it is a constant key
    pub fn root_name(&self) -> Option<&str> {
        self.segments.first().and_then(PathSegment::name)
    }

    /// Single unindexed name, the shape of a procedure call
    pub fn as_simple_name(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [segment] if self.kind == PathKind::Normal && segment.index.is_none() => {
                segment.name()
            }
            _ => None,
        }
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.segments == other.segments
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == PathKind::Global {
            write!(f, "global")?;
            if !self.segments.is_empty() {
                write!(f, ".")?;
            }
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            match &segment.key {
                PathKey::Name(name) => write!(f, "{}", name)?,
                PathKey::Dynamic(_) => write!(f, "<Expression>")?,
            }
            match &segment.index {
                None | Some(PathIndex::Const(0)) => {}
                Some(PathIndex::Const(n)) => write!(f, "[{}]", n)?,
                Some(PathIndex::Dynamic(_)) => write!(f, "[<Expression>]")?,
            }
        }
        Ok(())
    }
}

/// A provided correlation path, remembering whether it was set with `new`
#[derive(Debug, Clone)]
pub struct FlaggedPath {
    pub path: Path,
    pub fresh: bool,
}

impl FlaggedPath {
    pub fn new(path: Path, fresh: bool) -> Self {
        FlaggedPath { path, fresh }
    }
}

impl PartialEq for FlaggedPath {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

pub trait AsPath {
    fn as_path(&self) -> &Path;
}

impl AsPath for Path {
    fn as_path(&self) -> &Path {
        self
    }
}

impl AsPath for FlaggedPath {
    fn as_path(&self) -> &Path {
        &self.path
    }
}

/// Insertion-ordered set of paths under path equivalence
///
/// Membership is a linear scan: path equality is not an equivalence
/// relation, so it cannot back a hash or an ordering. The sets built
/// while checking one procedure stay small.
#[derive(Debug, Clone)]
pub struct PathSet<P> {
    items: Vec<P>,
}

impl<P> Default for PathSet<P> {
    fn default() -> Self {
        PathSet { items: Vec::new() }
    }
}

impl<P: AsPath> PathSet<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `item` unless an equivalent path is already present
    pub fn insert(&mut self, item: P) -> bool {
        if self.contains(item.as_path()) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    pub fn get(&self, path: &Path) -> Option<&P> {
        self.items.iter().find(|item| item.as_path() == path)
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.as_path() != path);
        self.items.len() != before
    }

    pub fn retain(&mut self, keep: impl FnMut(&P) -> bool) {
        self.items.retain(keep);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, P> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a, P> IntoIterator for &'a PathSet<P> {
    type Item = &'a P;
    type IntoIter = std::slice::Iter<'a, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<P: AsPath> FromIterator<P> for PathSet<P> {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut set = PathSet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLoc {
        SourceLoc::unknown()
    }

    fn dynamic_index() -> Option<PathIndex> {
        Some(PathIndex::Dynamic(Box::new(Expr::new(
            ExprKind::Variable(Path::from_names(&["i"], loc())),
            loc(),
        ))))
    }

    #[test]
    fn test_missing_index_equals_zero() {
        let plain = Path::from_names(&["a", "b"], loc());
        let mut indexed = Path::from_names(&["a", "b"], loc());
        indexed.segments[0].index = Some(PathIndex::Const(0));
        assert_eq!(plain, indexed);

        indexed.segments[1].index = Some(PathIndex::Const(1));
        assert_ne!(plain, indexed);
    }

    #[test]
    fn test_dynamic_paths_are_never_equal() {
        let mut path = Path::from_names(&["a"], loc());
        path.segments[0].index = dynamic_index();
        assert!(!path.is_static());
        assert_ne!(path, path.clone());
    }

    #[test]
    fn test_kind_and_length_matter() {
        let normal = Path::from_names(&["x"], loc());
        let mut global = Path::new(PathKind::Global, loc());
        global.push(PathSegment::named("x"));
        assert_ne!(normal, global);
        assert_ne!(normal, Path::from_names(&["x", "y"], loc()));
    }

    #[test]
    fn test_correlation_qualification() {
        let variable = Path::from_names(&["sid"], loc());
        let qualified = Path::correlation(&variable);
        assert!(qualified.is_correlation());
        assert_eq!(qualified, Path::from_names(&["csets", "sid"], loc()));
        assert_eq!(qualified.to_string(), "csets.sid");
    }

    #[test]
    fn test_pretty_printing() {
        let mut path = Path::new(PathKind::Global, loc());
        path.push(PathSegment::named("counter"));
        path.push(PathSegment {
            key: PathKey::Name("items".to_string()),
            index: Some(PathIndex::Const(2)),
        });
        path.push(PathSegment {
            key: PathKey::Name("x".to_string()),
            index: dynamic_index(),
        });
        assert_eq!(path.to_string(), "global.counter.items[2].x[<Expression>]");
    }

    #[test]
    fn test_path_set_uses_equivalence() {
        let mut set: PathSet<FlaggedPath> = PathSet::new();
        let sid = Path::from_names(&["csets", "sid"], loc());
        assert!(set.insert(FlaggedPath::new(sid.clone(), true)));
        assert!(!set.insert(FlaggedPath::new(sid.clone(), false)));
        assert_eq!(set.len(), 1);
        assert!(set.get(&sid).is_some_and(|p| p.fresh));

        assert!(set.remove(&sid));
        assert!(set.is_empty());
    }

    #[test]
    fn test_simple_name_detection() {
        assert_eq!(
            Path::from_names(&["helper"], loc()).as_simple_name(),
            Some("helper")
        );
        assert_eq!(Path::from_names(&["a", "b"], loc()).as_simple_name(), None);
    }
}
