/**
Abstract Syntax Tree definitions for service programs

This module defines the declarations, process statements and expressions
the semantic passes walk. Variable paths live in `path`, message type
definitions in `types`.
*/
pub mod path;
pub mod types;

pub use path::{FlaggedPath, Path, PathIndex, PathKey, PathKind, PathSegment, PathSet};
pub use types::{Cardinality, NativeType, TypeDefinition, TypeKind, TypeTable};

use crate::config::ExecutionMode;
use std::fmt;
use std::sync::Arc;

/// Source code location for debugging and error messages
///
/// Uses Arc<str> for the filename to avoid duplicating it across the AST.
/// This is important because a large program may have thousands of AST nodes
/// all referring to the same file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLoc {
    pub line: usize,
    pub column: usize,
    pub file: Arc<str>,
}

impl SourceLoc {
    pub fn new(line: usize, column: usize, file: impl Into<Arc<str>>) -> Self {
        Self {
            line,
            column,
            file: file.into(),
        }
    }

    /// Create an unknown/synthetic location (for generated code or tests)
    pub fn unknown() -> Self {
        Self {
            line: 0,
            column: 0,
            file: Arc::from("<unknown>"),
        }
    }

    /// Create a location with just a file (line/column unknown)
    pub fn file_only(file: impl Into<Arc<str>>) -> Self {
        Self {
            line: 1,
            column: 1,
            file: file.into(),
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A parsed module
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub declarations: Vec<Declaration>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Import(ImportDecl),
    Type(TypeDefinition),
    Port(PortDecl),
    Execution(ExecutionDecl),
    CorrelationSet(CorrelationSetInfo),
    Procedure(ProcedureDef),
    Service(ServiceDecl),
}

impl Declaration {
    pub fn loc(&self) -> &SourceLoc {
        match self {
            Declaration::Import(d) => &d.loc,
            Declaration::Type(d) => &d.loc,
            Declaration::Port(d) => &d.loc,
            Declaration::Execution(d) => &d.loc,
            Declaration::CorrelationSet(d) => &d.loc,
            Declaration::Procedure(d) => &d.loc,
            Declaration::Service(d) => &d.loc,
        }
    }
}

/// `from module import A, B`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub module: String,
    pub symbols: Vec<String>,
    pub loc: SourceLoc,
}

/// `service Name { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDecl {
    pub name: String,
    pub declarations: Vec<Declaration>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input port"),
            PortDirection::Output => write!(f, "output port"),
        }
    }
}

/// The protocol of a port: a bare protocol name or an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Protocol {
    Named(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortDecl {
    pub name: String,
    pub direction: PortDirection,
    pub location: Option<Expr>,
    pub protocol: Option<Protocol>,
    /// Operations declared inline or pulled in from `interfaces:`
    pub operations: Vec<OperationDecl>,
    /// Output ports aggregated by an input port
    pub aggregates: Vec<String>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaultDecl {
    pub name: String,
    pub type_name: String,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    OneWay,
    RequestResponse {
        response_type: String,
        faults: Vec<FaultDecl>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationDecl {
    pub name: String,
    pub request_type: String,
    pub kind: OperationKind,
    pub loc: SourceLoc,
}

impl OperationDecl {
    pub fn is_one_way(&self) -> bool {
        matches!(self.kind, OperationKind::OneWay)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionDecl {
    pub mode: ExecutionMode,
    pub loc: SourceLoc,
}

/// `cset { var: Type.path Other.path, ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationSetInfo {
    pub variables: Vec<CorrelationVariable>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationVariable {
    /// Path relative to `csets`
    pub path: Path,
    pub aliases: Vec<CorrelationAlias>,
}

impl CorrelationVariable {
    /// The variable as it is written in a process: `csets.<path>`
    pub fn qualified_path(&self) -> Path {
        Path::correlation(&self.path)
    }
}

/// Where the value of a correlation variable is found in a message type
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationAlias {
    pub guard_type: String,
    pub path: Path,
}

/// `main`, `init` or `define name`
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureDef {
    pub name: String,
    pub body: Stmt,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: SourceLoc,
}

impl Stmt {
    pub fn new(kind: StmtKind, loc: SourceLoc) -> Self {
        Stmt { kind, loc }
    }

    /// The operation this statement receives on, if it is an input
    pub fn input_operation(&self) -> Option<&str> {
        match &self.kind {
            StmtKind::Input(input) => Some(&input.operation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Sequence(Vec<Stmt>),
    Parallel(Vec<Stmt>),
    /// Input choice `[guard] { body } ...`
    Choice(Vec<ChoiceBranch>),
    If {
        branches: Vec<(Expr, Stmt)>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Box<Stmt>,
        condition: Expr,
        post: Box<Stmt>,
        body: Box<Stmt>,
    },
    /// `for (item in array)`
    ForEachItem {
        item: Path,
        array: Path,
        body: Box<Stmt>,
    },
    /// `foreach (key : target)`
    ForEachSubNode {
        key: Path,
        target: Path,
        body: Box<Stmt>,
    },
    Scope {
        name: String,
        body: Box<Stmt>,
    },
    Synchronized {
        id: String,
        body: Box<Stmt>,
    },
    Call(String),
    Input(InputStmt),
    Notification {
        operation: String,
        port: String,
        message: Option<Expr>,
    },
    SolicitResponse {
        operation: String,
        port: String,
        message: Option<Expr>,
        response: Option<Path>,
    },
    Assign {
        target: Path,
        op: AssignOp,
        value: Expr,
    },
    /// `x++` or `--x` used as a statement
    Increment {
        target: Path,
        decrement: bool,
    },
    /// `target << source`
    DeepCopy {
        target: Path,
        source: Expr,
    },
    /// `target -> source`
    Alias {
        target: Path,
        source: Path,
    },
    Undef(Path),
    Throw {
        fault: String,
        value: Option<Expr>,
    },
    Exit,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

/// Guard and continuation of an input choice branch
///
/// The parser only produces input statements as guards; the verifier
/// reports anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceBranch {
    pub guard: Stmt,
    pub body: Stmt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputStmt {
    pub operation: String,
    /// Where the received message is stored
    pub input: Option<Path>,
    pub kind: InputKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    OneWay,
    RequestResponse {
        output: Option<Expr>,
        body: Box<Stmt>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: SourceLoc,
}

impl Expr {
    pub fn new(kind: ExprKind, loc: SourceLoc) -> Self {
        Expr { kind, loc }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match &self.kind {
            ExprKind::Variable(path) => Some(path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Long(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    Variable(Path),
    /// `new`: a fresh unique token
    Fresh,
    PreIncrement(Path),
    PostIncrement(Path),
    PreDecrement(Path),
    PostDecrement(Path),
    /// `#path`
    VectorSize(Path),
    IsDefined(Path),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}
