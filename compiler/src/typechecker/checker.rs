/**
Session type checker

Computes a `TypingResult` for every statement of every procedure and checks
that correlation variables are provided exactly once, before they are
needed, consistently across branches, never inside loops, and with at least
one fresh value per correlation set.

Procedures are typed once, in declaration order, and memoized by name. A
call adopts the memoized result of its callee; calling a procedure that has
not been typed yet is reported rather than iterated to a fixpoint.
*/
use crate::ast::{
    AssignOp, ChoiceBranch, Declaration, Expr, ExprKind, InputKind, InputStmt, Path, ProcedureDef,
    Program, SourceLoc, Stmt, StmtKind,
};
use crate::config::ExecutionMode;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::typechecker::errors::SessionError;
use crate::typechecker::typing::TypingResult;
use crate::verifier::CorrelationFunctionInfo;
use std::collections::HashMap;

/// Flags scoped to the statement being checked
#[derive(Debug, Clone, Copy, Default)]
struct Context {
    /// The next input starts a new session
    session_starter: bool,
    inside_init: bool,
}

pub struct TypeChecker<'a> {
    program: &'a Program,
    declarations: Vec<&'a Declaration>,
    execution_mode: ExecutionMode,
    correlation_function_info: &'a CorrelationFunctionInfo,
    definition_typing: HashMap<String, TypingResult>,
    diagnostics: Diagnostics,
}

impl<'a> TypeChecker<'a> {
    pub fn new(
        program: &'a Program,
        declarations: &[&'a Declaration],
        execution_mode: ExecutionMode,
        correlation_function_info: &'a CorrelationFunctionInfo,
    ) -> Self {
        TypeChecker {
            program,
            declarations: declarations.to_vec(),
            execution_mode,
            correlation_function_info,
            definition_typing: HashMap::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Check every procedure, then the whole-program properties of `main`
    ///
    /// Returns true when no error was found. Running it again starts from a
    /// clean state.
    pub fn check(&mut self) -> bool {
        self.definition_typing.clear();
        self.diagnostics = Diagnostics::new();

        let declarations = self.declarations.clone();
        for declaration in declarations {
            if let Declaration::Procedure(procedure) = declaration {
                self.check_procedure(procedure);
            }
        }
        tracing::debug!(
            procedures = self.definition_typing.len(),
            "procedures typed"
        );

        match self.definition_typing.get("main").cloned() {
            None => {
                let program = self.program;
                self.report(&program.loc, SessionError::MissingMain);
            }
            Some(main) => self.check_main_typing(main),
        }
        !self.diagnostics.has_errors()
    }

    /// Errors found by the last `check()`
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.errors()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics.into_parts().0
    }

    /// Memoized result of a procedure
    pub fn definition_typing(&self, name: &str) -> Option<&TypingResult> {
        self.definition_typing.get(name)
    }

    /// Type a single statement from `entry`, outside of any procedure
    pub fn check_node(&mut self, stmt: &Stmt, entry: &TypingResult) -> TypingResult {
        self.check_stmt(stmt, entry, Context::default())
    }

    fn report(&mut self, loc: &SourceLoc, error: SessionError) {
        self.diagnostics.error(loc, error.kind(), error.to_string());
    }

    fn check_procedure(&mut self, procedure: &ProcedureDef) {
        let (entry, ctx) = match procedure.name.as_str() {
            "main" => (
                self.definition_typing
                    .get("init")
                    .cloned()
                    .unwrap_or_default(),
                Context {
                    session_starter: self.execution_mode != ExecutionMode::Single,
                    inside_init: false,
                },
            ),
            "init" => (
                TypingResult::new(),
                Context {
                    session_starter: false,
                    inside_init: true,
                },
            ),
            _ => (TypingResult::new(), Context::default()),
        };

        let result = self.check_stmt(&procedure.body, &entry, ctx);
        if ctx.inside_init {
            let provided: Vec<_> = result
                .provided_correlation()
                .iter()
                .map(|flagged| flagged.path.loc.clone())
                .collect();
            for loc in provided {
                self.report(&loc, SessionError::CorrelationInInit);
            }
        }
        self.definition_typing
            .insert(procedure.name.clone(), result);
    }

    fn check_main_typing(&mut self, main: TypingResult) {
        let typing = match self.definition_typing.get("init").cloned() {
            Some(mut init) => {
                self.merge_sequence(&mut init, main);
                init
            }
            None => main,
        };

        for path in typing.needed_correlation() {
            self.report(
                &path.loc,
                SessionError::CorrelationNotInitialised {
                    path: path.to_string(),
                },
            );
        }
        for path in typing.needed_variables() {
            self.report(
                &path.loc,
                SessionError::VariableNotInitialised {
                    path: path.to_string(),
                },
            );
        }

        let info = self.correlation_function_info;
        for cset in info.correlation_sets() {
            let fresh = cset.variables.iter().any(|variable| {
                typing
                    .provided_correlation()
                    .get(&variable.qualified_path())
                    .is_some_and(|flagged| flagged.fresh)
            });
            if !fresh {
                self.report(&cset.loc, SessionError::NoFreshValue);
            }
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt, entry: &TypingResult, ctx: Context) -> TypingResult {
        match &stmt.kind {
            StmtKind::Sequence(children) => self.check_sequence(children, entry, ctx),
            StmtKind::Parallel(children) => self.check_parallel(children, entry, ctx),
            StmtKind::Choice(branches) => self.check_choice(branches, entry, ctx, &stmt.loc),
            StmtKind::If {
                branches,
                otherwise,
            } => {
                let bodies = branches
                    .iter()
                    .map(|(_, body)| Some(body))
                    .chain(std::iter::once(otherwise.as_deref()));
                self.check_if(bodies, entry, ctx)
            }
            StmtKind::While { body, .. } => {
                self.check_loop(TypingResult::new(), body, entry, ctx, &stmt.loc)
            }
            StmtKind::For { init, body, .. } => {
                let header = self.check_stmt(init, entry, ctx);
                self.check_loop(header, body, entry, ctx, &stmt.loc)
            }
            StmtKind::ForEachItem { item: variable, body, .. }
            | StmtKind::ForEachSubNode { key: variable, body, .. } => {
                let mut header = TypingResult::new();
                header.provide(variable, false);
                self.check_loop(header, body, entry, ctx, &stmt.loc)
            }
            StmtKind::Scope { body, .. } | StmtKind::Synchronized { body, .. } => {
                self.check_stmt(body, entry, ctx)
            }
            StmtKind::Call(name) => match self.definition_typing.get(name) {
                Some(typing) => typing.clone(),
                None => {
                    self.report(
                        &stmt.loc,
                        SessionError::UndefinedDefinition { name: name.clone() },
                    );
                    TypingResult::new()
                }
            },
            StmtKind::Input(input) => self.check_input(input, entry, ctx, &stmt.loc),
            StmtKind::SolicitResponse { response, .. } => {
                if response.as_ref().is_some_and(Path::is_correlation) {
                    self.report(&stmt.loc, SessionError::SolicitResponseIntoCorrelation);
                }
                TypingResult::new()
            }
            StmtKind::Assign { target, op, value } => {
                let mut result = TypingResult::new();
                if *op == AssignOp::Set && target.is_static() {
                    self.check_assignment(&mut result, target, value, entry, &stmt.loc);
                }
                result
            }
            StmtKind::DeepCopy { target, source } => {
                let mut result = TypingResult::new();
                if let Some(source) = source.as_path() {
                    result.invalidate(source);
                }
                result.invalidate(target);
                result
            }
            StmtKind::Alias { target, source } => {
                let mut result = TypingResult::new();
                result.invalidate(source);
                result.invalidate(target);
                result
            }
            StmtKind::Undef(path) => {
                let mut result = TypingResult::new();
                result.invalidate(path);
                result
            }
            StmtKind::Increment { .. }
            | StmtKind::Notification { .. }
            | StmtKind::Throw { .. }
            | StmtKind::Exit
            | StmtKind::Null => TypingResult::new(),
        }
    }

    /// The header runs once; the body zero or more times and may not
    /// provide correlation paths
    fn check_loop(
        &mut self,
        mut header: TypingResult,
        body: &Stmt,
        entry: &TypingResult,
        ctx: Context,
        loc: &SourceLoc,
    ) -> TypingResult {
        let body_entry = TypingResult::chained(entry, &header);
        let mut result = self.check_stmt(body, &body_entry, ctx);
        if !result.provided_correlation().is_empty() {
            self.report(loc, SessionError::CorrelationInLoop);
        }
        result.clear_provided_variables();
        self.merge_sequence(&mut header, result);
        header
    }

    fn check_sequence<'s>(
        &mut self,
        children: impl IntoIterator<Item = &'s Stmt>,
        entry: &TypingResult,
        mut ctx: Context,
    ) -> TypingResult {
        let mut result = TypingResult::new();
        for child in children {
            let child_entry = TypingResult::chained(entry, &result);
            let right = self.check_stmt(child, &child_entry, ctx);
            if right.starting_operation().is_some() {
                ctx.session_starter = false;
            }
            self.merge_sequence(&mut result, right);
        }
        result
    }

    /// `left ; right`
    fn merge_sequence(&mut self, left: &mut TypingResult, right: TypingResult) {
        for flagged in right.provided_correlation() {
            if left.provided_correlation().contains(&flagged.path) {
                self.report(&flagged.path.loc, SessionError::DuplicateCorrelation);
            } else {
                left.provide_flagged(flagged);
            }
        }

        for path in right.provided_variables() {
            left.provide(path, false);
            left.revalidate(path);
        }

        for path in right.needed_variables() {
            if !left.provided_variables().contains(path) {
                left.need(path);
            }
        }
        for path in right.needed_correlation() {
            if !left.provided_correlation().contains(path) {
                left.need(path);
            }
        }

        left.invalidate_all(&right);
        left.register_operations(&right);
    }

    fn check_parallel(
        &mut self,
        children: &[Stmt],
        entry: &TypingResult,
        mut ctx: Context,
    ) -> TypingResult {
        let mut merged: Option<TypingResult> = None;
        for child in children {
            let right = self.check_stmt(child, entry, ctx);
            if right.starting_operation().is_some() {
                ctx.session_starter = false;
            }
            let Some(left) = merged.as_mut() else {
                merged = Some(right);
                continue;
            };
            for flagged in right.provided_correlation() {
                if left.provided_correlation().contains(&flagged.path) {
                    self.report(&flagged.path.loc, SessionError::DuplicateCorrelation);
                } else {
                    left.provide_flagged(flagged);
                }
            }
            for path in right.provided_variables() {
                left.provide(path, false);
            }
            left.need_all(&right);
            left.invalidate_all(&right);
            left.register_operations(&right);
        }
        merged.unwrap_or_default()
    }

    fn check_choice(
        &mut self,
        branches: &[ChoiceBranch],
        entry: &TypingResult,
        ctx: Context,
        loc: &SourceLoc,
    ) -> TypingResult {
        let starter = ctx.session_starter;
        let mut typings: Vec<TypingResult> = Vec::with_capacity(branches.len());
        let mut merged: Option<TypingResult> = None;

        for branch in branches {
            let right = self.check_sequence([&branch.guard, &branch.body], entry, ctx);
            typings.push(right.clone());
            let Some(left) = merged.as_mut() else {
                merged = Some(right);
                continue;
            };
            left.need_all(&right);
            left.invalidate_all(&right);
            if starter {
                // each branch starts its own kind of session
                for flagged in right.provided_correlation() {
                    left.provide_flagged(flagged);
                }
            } else {
                self.check_branch_parity(left, &right, SessionError::ChoiceBranchMismatch);
                left.register_operations(&right);
            }
            left.remove_unshared_provided(&right);
        }

        if starter {
            for (i, typing) in typings.iter().enumerate() {
                let Some(operation) = typing.starting_operation() else {
                    continue;
                };
                for (j, other) in typings.iter().enumerate() {
                    if i != j && other.session_operations().contains(operation) {
                        self.report(
                            loc,
                            SessionError::StarterInSessionBody {
                                operation: operation.to_string(),
                            },
                        );
                    }
                }
            }
        }

        merged.unwrap_or_default()
    }

    fn check_if<'s>(
        &mut self,
        bodies: impl Iterator<Item = Option<&'s Stmt>>,
        entry: &TypingResult,
        mut ctx: Context,
    ) -> TypingResult {
        let mut merged: Option<TypingResult> = None;
        for body in bodies {
            // a missing else provides nothing
            let right = match body {
                Some(body) => self.check_stmt(body, entry, ctx),
                None => TypingResult::new(),
            };
            if right.starting_operation().is_some() {
                ctx.session_starter = false;
            }
            let Some(left) = merged.as_mut() else {
                merged = Some(right);
                continue;
            };
            left.need_all(&right);
            left.register_operations(&right);
            left.invalidate_all(&right);
            self.check_branch_parity(left, &right, SessionError::ConditionalBranchMismatch);
            left.remove_unshared_provided(&right);
        }
        merged.unwrap_or_default()
    }

    /// Both branches must provide the same correlation paths
    fn check_branch_parity(
        &mut self,
        left: &TypingResult,
        right: &TypingResult,
        error: SessionError,
    ) {
        let mut unmatched: Vec<SourceLoc> = Vec::new();
        for flagged in left.provided_correlation() {
            if !right.provided_correlation().contains(&flagged.path) {
                unmatched.push(flagged.path.loc.clone());
            }
        }
        for flagged in right.provided_correlation() {
            if !left.provided_correlation().contains(&flagged.path) {
                unmatched.push(flagged.path.loc.clone());
            }
        }
        for loc in unmatched {
            self.report(&loc, error.clone());
        }
    }

    fn check_input(
        &mut self,
        input: &InputStmt,
        entry: &TypingResult,
        ctx: Context,
        loc: &SourceLoc,
    ) -> TypingResult {
        let mut result = TypingResult::new();
        if self.execution_mode == ExecutionMode::Single {
            return result;
        }

        result.register_operation_input(&input.operation, ctx.session_starter);

        if input.input.as_ref().is_some_and(Path::is_correlation) {
            self.report(loc, SessionError::InputIntoCorrelation);
        }

        let info = self.correlation_function_info;
        let cset = info.operation_correlation_set(&input.operation);
        let covered = cset.is_some_and(|cset| !cset.variables.is_empty());
        if !ctx.session_starter && !ctx.inside_init && !covered {
            self.report(
                loc,
                SessionError::MissingCorrelationSet {
                    operation: input.operation.clone(),
                },
            );
        }
        if let Some(cset) = cset {
            for variable in &cset.variables {
                let path = variable.qualified_path();
                if ctx.session_starter {
                    result.provide(&path, true);
                } else {
                    result.need(&path);
                }
            }
        }

        if let InputKind::RequestResponse { body, .. } = &input.kind {
            let body_ctx = Context {
                session_starter: false,
                ..ctx
            };
            let body_entry = TypingResult::chained(entry, &result);
            let internal = self.check_stmt(body, &body_entry, body_ctx);
            for path in internal.needed_correlation() {
                if !result.provided_correlation().contains(path) {
                    result.need(path);
                }
            }
            for path in internal.needed_variables() {
                result.need(path);
            }
            result.provide_all(&internal);
            result.register_operations(&internal);
        }
        result
    }

    fn check_assignment(
        &mut self,
        result: &mut TypingResult,
        target: &Path,
        value: &Expr,
        entry: &TypingResult,
        loc: &SourceLoc,
    ) {
        match &value.kind {
            ExprKind::Int(_)
            | ExprKind::Long(_)
            | ExprKind::Double(_)
            | ExprKind::Bool(_)
            | ExprKind::Str(_)
            | ExprKind::PreIncrement(_)
            | ExprKind::PostIncrement(_)
            | ExprKind::PreDecrement(_)
            | ExprKind::PostDecrement(_) => result.provide(target, false),
            ExprKind::Fresh => result.provide(target, true),
            ExprKind::Variable(source) => {
                if source.is_static() && entry.is_defined(source) {
                    result.provide(target, false);
                } else if target.is_correlation() {
                    self.report(
                        loc,
                        SessionError::UndefinedCorrelationSource {
                            source_path: source.to_string(),
                            target: target.to_string(),
                        },
                    );
                }
            }
            _ => {
                if target.is_correlation() {
                    self.report(loc, SessionError::InvalidCorrelationValue);
                }
            }
        }
    }
}
