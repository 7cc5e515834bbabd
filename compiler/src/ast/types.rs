/**
Message type definitions

This module defines the tree-shaped message types declared with `type`.
A type is a native root value with optional named subnodes, a link to
another named type, or a choice between two alternatives. Every node
carries a cardinality.
*/
use super::{PathKey, PathSegment, SourceLoc};
use std::collections::HashMap;
use std::fmt;

/// Named types visible in a module, including the native ones
pub type TypeTable = HashMap<String, TypeDefinition>;

/// Link chains deeper than this are treated as recursive
const MAX_LINK_DEPTH: usize = 64;

/// Root value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Void,
    Bool,
    Int,
    Long,
    Double,
    String,
    Raw,
    Any,
}

impl NativeType {
    pub const ALL: [NativeType; 8] = [
        NativeType::Void,
        NativeType::Bool,
        NativeType::Int,
        NativeType::Long,
        NativeType::Double,
        NativeType::String,
        NativeType::Raw,
        NativeType::Any,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        NativeType::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            NativeType::Void => "void",
            NativeType::Bool => "bool",
            NativeType::Int => "int",
            NativeType::Long => "long",
            NativeType::Double => "double",
            NativeType::String => "string",
            NativeType::Raw => "raw",
            NativeType::Any => "any",
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Occurrence bounds `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cardinality {
    pub min: i64,
    pub max: i64,
}

impl Cardinality {
    pub const ONE: Cardinality = Cardinality { min: 1, max: 1 };
    pub const OPTIONAL: Cardinality = Cardinality { min: 0, max: 1 };
    pub const ANY: Cardinality = Cardinality {
        min: 0,
        max: i64::MAX,
    };

    pub fn new(min: i64, max: i64) -> Self {
        Cardinality { min, max }
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Cardinality::ONE
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.max == i64::MAX {
            write!(f, "[{}, *]", self.min)
        } else {
            write!(f, "[{}, {}]", self.min, self.max)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Inline {
        native: NativeType,
        /// `{ ? }`: any subnodes are accepted
        untyped: bool,
        fields: Vec<TypeDefinition>,
    },
    /// Reference to another named type
    Link(String),
    Choice(Box<TypeDefinition>, Box<TypeDefinition>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    pub name: String,
    pub cardinality: Cardinality,
    pub kind: TypeKind,
    pub loc: SourceLoc,
}

impl TypeDefinition {
    /// A native type with no subnodes
    pub fn native(native: NativeType, loc: SourceLoc) -> Self {
        TypeDefinition {
            name: native.name().to_string(),
            cardinality: Cardinality::ONE,
            kind: TypeKind::Inline {
                native,
                untyped: false,
                fields: Vec::new(),
            },
            loc,
        }
    }

    /// `undefined`: any root value, any subnodes
    pub fn undefined(loc: SourceLoc) -> Self {
        TypeDefinition {
            name: "undefined".to_string(),
            cardinality: Cardinality::ONE,
            kind: TypeKind::Inline {
                native: NativeType::Any,
                untyped: true,
                fields: Vec::new(),
            },
            loc,
        }
    }

    /// Table holding `undefined` and the native types
    pub fn builtin_table() -> TypeTable {
        let mut table: TypeTable = NativeType::ALL
            .into_iter()
            .map(|t| (t.name().to_string(), TypeDefinition::native(t, SourceLoc::unknown())))
            .collect();
        table.insert(
            "undefined".to_string(),
            TypeDefinition::undefined(SourceLoc::unknown()),
        );
        table
    }

    pub fn field(&self, name: &str) -> Option<&TypeDefinition> {
        match &self.kind {
            TypeKind::Inline { fields, .. } => fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }

    /// Whether a message of this type can hold a node at `path`
    ///
    /// Paths reaching into untyped subtrees are accepted. Dynamic keys are
    /// never contained.
    pub fn contains_path(&self, path: &[PathSegment], table: &TypeTable) -> bool {
        self.contains_path_at(path, table, 0)
    }

    fn contains_path_at(&self, path: &[PathSegment], table: &TypeTable, depth: usize) -> bool {
        if depth > MAX_LINK_DEPTH {
            return false;
        }
        match &self.kind {
            TypeKind::Link(name) => table
                .get(name)
                .is_some_and(|linked| linked.contains_path_at(path, table, depth + 1)),
            TypeKind::Choice(left, right) => {
                left.contains_path_at(path, table, depth)
                    || right.contains_path_at(path, table, depth)
            }
            TypeKind::Inline {
                untyped, fields, ..
            } => {
                let Some((head, rest)) = path.split_first() else {
                    return true;
                };
                if *untyped {
                    return true;
                }
                let PathKey::Name(name) = &head.key else {
                    return false;
                };
                fields
                    .iter()
                    .find(|f| &f.name == name)
                    .is_some_and(|f| f.contains_path_at(rest, table, depth + 1))
            }
        }
    }

    /// Structural equality up to link resolution
    ///
    /// Names of the compared roots are ignored; subnode names must match.
    pub fn is_equivalent_to(&self, other: &TypeDefinition, table: &TypeTable) -> bool {
        self.equivalent_at(other, table, 0)
    }

    fn equivalent_at(&self, other: &TypeDefinition, table: &TypeTable, depth: usize) -> bool {
        if depth > MAX_LINK_DEPTH {
            // recursive types: assume the cycle matches
            return true;
        }
        if self.cardinality != other.cardinality {
            return false;
        }
        match (&self.kind, &other.kind) {
            (TypeKind::Link(a), TypeKind::Link(b)) if a == b => true,
            (TypeKind::Link(name), _) => match table.get(name) {
                Some(linked) => linked
                    .with_cardinality(self.cardinality)
                    .equivalent_at(other, table, depth + 1),
                None => false,
            },
            (_, TypeKind::Link(_)) => other.equivalent_at(self, table, depth),
            (TypeKind::Choice(l1, r1), TypeKind::Choice(l2, r2)) => {
                l1.equivalent_at(l2, table, depth + 1) && r1.equivalent_at(r2, table, depth + 1)
            }
            (
                TypeKind::Inline {
                    native: n1,
                    untyped: u1,
                    fields: f1,
                },
                TypeKind::Inline {
                    native: n2,
                    untyped: u2,
                    fields: f2,
                },
            ) => {
                n1 == n2
                    && u1 == u2
                    && f1.len() == f2.len()
                    && f1.iter().all(|a| {
                        f2.iter()
                            .find(|b| b.name == a.name)
                            .is_some_and(|b| a.equivalent_at(b, table, depth + 1))
                    })
            }
            _ => false,
        }
    }

    fn with_cardinality(&self, cardinality: Cardinality) -> TypeDefinition {
        TypeDefinition {
            cardinality,
            ..self.clone()
        }
    }

    /// Every cardinality in this definition, with the subnode it belongs to
    pub fn cardinalities(&self) -> Vec<(&str, Cardinality)> {
        let mut out = vec![(self.name.as_str(), self.cardinality)];
        match &self.kind {
            TypeKind::Inline { fields, .. } => {
                for field in fields {
                    out.extend(field.cardinalities());
                }
            }
            TypeKind::Choice(left, right) => {
                out.extend(left.cardinalities());
                out.extend(right.cardinalities());
            }
            TypeKind::Link(_) => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLoc {
        SourceLoc::unknown()
    }

    fn inline(name: &str, native: NativeType, fields: Vec<TypeDefinition>) -> TypeDefinition {
        TypeDefinition {
            name: name.to_string(),
            cardinality: Cardinality::ONE,
            kind: TypeKind::Inline {
                native,
                untyped: false,
                fields,
            },
            loc: loc(),
        }
    }

    fn field(name: &str, native: NativeType) -> TypeDefinition {
        inline(name, native, Vec::new())
    }

    fn link(name: &str, target: &str) -> TypeDefinition {
        TypeDefinition {
            name: name.to_string(),
            cardinality: Cardinality::ONE,
            kind: TypeKind::Link(target.to_string()),
            loc: loc(),
        }
    }

    #[test]
    fn test_contains_path_follows_fields() {
        let table = TypeDefinition::builtin_table();
        let order = inline(
            "Order",
            NativeType::Void,
            vec![
                field("id", NativeType::String),
                inline(
                    "customer",
                    NativeType::Void,
                    vec![field("name", NativeType::String)],
                ),
            ],
        );
        let path = |names: &[&str]| -> Vec<PathSegment> {
            names.iter().map(|n| PathSegment::named(*n)).collect()
        };
        assert!(order.contains_path(&path(&["id"]), &table));
        assert!(order.contains_path(&path(&["customer", "name"]), &table));
        assert!(!order.contains_path(&path(&["customer", "email"]), &table));
        assert!(!order.contains_path(&path(&["total"]), &table));
    }

    #[test]
    fn test_contains_path_through_links_and_untyped() {
        let mut table = TypeDefinition::builtin_table();
        table.insert(
            "Key".to_string(),
            inline("Key", NativeType::Void, vec![field("sid", NativeType::String)]),
        );
        let wrapper = inline("Wrapper", NativeType::Void, vec![link("key", "Key")]);
        let segments = vec![PathSegment::named("key"), PathSegment::named("sid")];
        assert!(wrapper.contains_path(&segments, &table));

        let open = TypeDefinition::undefined(loc());
        assert!(open.contains_path(&segments, &table));
    }

    #[test]
    fn test_equivalence() {
        let mut table = TypeDefinition::builtin_table();
        let a = inline("A", NativeType::Void, vec![field("x", NativeType::Int)]);
        let b = inline("B", NativeType::Void, vec![field("x", NativeType::Int)]);
        let c = inline("C", NativeType::Void, vec![field("x", NativeType::String)]);
        table.insert("A".to_string(), a.clone());
        assert!(a.is_equivalent_to(&b, &table));
        assert!(!a.is_equivalent_to(&c, &table));
        assert!(link("L", "A").is_equivalent_to(&b, &table));
        assert!(!link("L", "Missing").is_equivalent_to(&b, &table));
    }

    #[test]
    fn test_recursive_links_terminate() {
        let mut table = TypeDefinition::builtin_table();
        table.insert(
            "Tree".to_string(),
            inline("Tree", NativeType::Int, vec![link("child", "Tree")]),
        );
        let tree = link("T", "Tree");
        assert!(tree.is_equivalent_to(&link("U", "Tree"), &table));
        let deep: Vec<PathSegment> = (0..200).map(|_| PathSegment::named("child")).collect();
        assert!(!tree.contains_path(&deep, &table));
    }
}
