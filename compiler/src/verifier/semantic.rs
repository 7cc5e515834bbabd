/**
Semantic verifier

One pass over the declarations of a module. It validates ports, operations,
types, procedures and process statements, resolves correlation aliases
against the input operations that accept their guard types, and builds the
`CorrelationFunctionInfo` the type checker consumes.

Some checks only make sense once the whole module has been seen: duplicate
type and operation declarations are compared structurally after the pass,
correlation sets are resolved after every input operation is known, and
procedure calls are matched against every procedure name.
*/
use super::correlation::{CorrelationFunctionInfo, CorrelationPair};
use crate::ast::{
    ChoiceBranch, CorrelationAlias, CorrelationSetInfo, Declaration, Expr, ExprKind, InputKind,
    OperationDecl, OperationKind, Path, PathKey, PathSet, PortDecl, PortDirection, ProcedureDef,
    Program, Protocol, ServiceDecl, SourceLoc, Stmt, StmtKind, TypeDefinition, TypeTable,
};
use crate::config::{ExecutionMode, VerifierConfig};
use crate::diagnostics::{CodeCheckError, Diagnostic, DiagnosticKind, Diagnostics};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

const MAIN_SHAPE_ERROR: &str = "If execution is not single, the body of main must be either an input choice or a sequence that starts with an input statement (request-response or one-way)";

/// Outcome of a successful `validate()`
#[derive(Debug)]
pub struct Verification<'a> {
    pub correlation_function_info: CorrelationFunctionInfo,
    pub execution_mode: ExecutionMode,
    /// Declarations of the module body plus those of the selected service
    pub execution_unit: Vec<&'a Declaration>,
    pub warnings: Vec<Diagnostic>,
    /// Variable root name -> assigned exactly once
    pub constant_flags: BTreeMap<String, bool>,
}

impl Verification<'_> {
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }
}

pub struct SemanticVerifier<'a> {
    program: &'a Program,
    config: VerifierConfig,
    diagnostics: Diagnostics,

    input_ports: HashMap<String, &'a PortDecl>,
    output_ports: HashMap<String, &'a PortDecl>,
    one_way_operations: HashMap<String, &'a OperationDecl>,
    request_response_operations: HashMap<String, &'a OperationDecl>,
    /// Request type name -> input operations accepting it
    input_type_operations: HashMap<String, Vec<String>>,

    defined_types: TypeTable,
    imported_symbols: HashSet<String>,
    types_to_be_equal: Vec<(TypeDefinition, &'a TypeDefinition)>,
    operations_to_be_equal: Vec<(&'a OperationDecl, &'a OperationDecl)>,

    correlation_sets: Vec<&'a CorrelationSetInfo>,
    constant_flags: BTreeMap<String, bool>,
    scopes: Vec<String>,
    procedure_names: HashSet<String>,
    calls: Vec<(&'a str, &'a SourceLoc)>,
    services: Vec<&'a ServiceDecl>,
    execution_unit: Vec<&'a Declaration>,

    execution_mode: ExecutionMode,
    main_defined: bool,
    inside_init: bool,
}

impl<'a> SemanticVerifier<'a> {
    pub fn new(program: &'a Program, config: VerifierConfig) -> Self {
        SemanticVerifier {
            program,
            config,
            diagnostics: Diagnostics::new(),
            input_ports: HashMap::new(),
            output_ports: HashMap::new(),
            one_way_operations: HashMap::new(),
            request_response_operations: HashMap::new(),
            input_type_operations: HashMap::new(),
            defined_types: TypeDefinition::builtin_table(),
            imported_symbols: HashSet::new(),
            types_to_be_equal: Vec::new(),
            operations_to_be_equal: Vec::new(),
            correlation_sets: Vec::new(),
            constant_flags: BTreeMap::new(),
            scopes: Vec::new(),
            procedure_names: HashSet::new(),
            calls: Vec::new(),
            services: Vec::new(),
            execution_unit: Vec::new(),
            execution_mode: ExecutionMode::default(),
            main_defined: false,
            inside_init: false,
        }
    }

    /// Run the pass and the whole-module checks
    ///
    /// Every problem found is reported; the aggregate error carries them all.
    pub fn validate(mut self) -> Result<Verification<'a>, CodeCheckError> {
        tracing::debug!(
            declarations = self.program.declarations.len(),
            "semantic verification started"
        );
        let program = self.program;
        for declaration in &program.declarations {
            if !matches!(declaration, Declaration::Service(_)) {
                self.execution_unit.push(declaration);
            }
            self.visit_declaration(declaration);
        }

        if self.services.is_empty() {
            if self.config.check_for_main && !self.main_defined {
                self.error(&program.loc, "Main procedure is not defined");
            }
        } else if let Some(service) = self.select_service() {
            for declaration in &service.declarations {
                self.execution_unit.push(declaration);
                self.visit_declaration(declaration);
            }
            if self.config.check_for_main && !self.main_defined {
                let name = self
                    .config
                    .execution_target
                    .clone()
                    .unwrap_or_else(|| service.name.clone());
                self.error(
                    &service.loc,
                    format!("Main procedure for service \"{}\" is not defined", name),
                );
            }
        }

        self.check_calls();
        self.check_to_be_equal();
        let correlation_function_info = self.check_correlation_sets();

        let (errors, warnings) = self.diagnostics.into_parts();
        if !errors.is_empty() {
            tracing::error!("Aborting: input file semantically invalid.");
            return Err(CodeCheckError::new(errors));
        }

        tracing::debug!(
            correlation_sets = correlation_function_info.correlation_sets().len(),
            mode = %self.execution_mode,
            "semantic verification passed"
        );
        Ok(Verification {
            correlation_function_info,
            execution_mode: self.execution_mode,
            execution_unit: self.execution_unit,
            warnings,
            constant_flags: self.constant_flags,
        })
    }

    fn select_service(&mut self) -> Option<&'a ServiceDecl> {
        if self.services.len() == 1 {
            return self.services.first().copied();
        }
        if !self.config.check_for_main {
            return None;
        }
        let program = self.program;
        let loc = &program.loc;
        match self.config.execution_target.clone() {
            None => {
                self.error(
                    loc,
                    "Execution service is not defined from command line argument (--service or -s)",
                );
                None
            }
            Some(target) => {
                let found = self.services.iter().find(|s| s.name == target).copied();
                if found.is_none() {
                    self.error(
                        loc,
                        format!("Execution service \"{}\" is not defined in the module", target),
                    );
                }
                found
            }
        }
    }

    fn error(&mut self, loc: &SourceLoc, message: impl Into<String>) {
        self.diagnostics
            .error(loc, DiagnosticKind::Structural, message);
    }

    fn visit_declaration(&mut self, declaration: &'a Declaration) {
        match declaration {
            Declaration::Import(import) => {
                self.imported_symbols
                    .extend(import.symbols.iter().cloned());
            }
            Declaration::Type(definition) => self.visit_type(definition),
            Declaration::Port(port) => match port.direction {
                PortDirection::Input => self.visit_input_port(port),
                PortDirection::Output => self.visit_output_port(port),
            },
            Declaration::Execution(execution) => self.execution_mode = execution.mode,
            Declaration::CorrelationSet(cset) => self.visit_correlation_set(cset),
            Declaration::Procedure(procedure) => self.visit_procedure(procedure),
            Declaration::Service(service) => self.services.push(service),
        }
    }

    fn visit_type(&mut self, definition: &'a TypeDefinition) {
        for (name, cardinality) in definition.cardinalities() {
            if cardinality.min < 0 {
                self.error(
                    &definition.loc,
                    format!(
                        "type {} specifies an invalid minimum range value (must be positive)",
                        name
                    ),
                );
            }
            if cardinality.max < 0 {
                self.error(
                    &definition.loc,
                    format!(
                        "type {} specifies an invalid maximum range value (must be positive)",
                        name
                    ),
                );
            }
        }
        if let Some(existing) = self.defined_types.get(&definition.name) {
            self.types_to_be_equal.push((existing.clone(), definition));
        }
        self.defined_types
            .insert(definition.name.clone(), definition.clone());
    }

    fn visit_input_port(&mut self, port: &'a PortDecl) {
        if self.input_ports.contains_key(&port.name) {
            self.error(
                &port.loc,
                format!("input port {} has been already defined", port.name),
            );
        }
        self.check_port_expressions(port);
        self.input_ports.insert(port.name.clone(), port);

        let mut seen = HashSet::new();
        for operation in &port.operations {
            if !seen.insert(operation.name.as_str()) {
                self.error(
                    &port.loc,
                    format!(
                        "input port {} declares operation {} multiple times",
                        port.name, operation.name
                    ),
                );
            } else {
                self.visit_operation(operation, true);
            }
        }

        for aggregated in &port.aggregates {
            if !self.output_ports.contains_key(aggregated) {
                self.error(
                    &port.loc,
                    format!(
                        "input port {} aggregates an undefined output port ({})",
                        port.name, aggregated
                    ),
                );
            }
        }
    }

    fn visit_output_port(&mut self, port: &'a PortDecl) {
        if self.output_ports.contains_key(&port.name) {
            self.error(
                &port.loc,
                format!("output port {} has been already defined", port.name),
            );
        }
        self.check_port_expressions(port);
        self.output_ports.insert(port.name.clone(), port);
        self.encountered_assignment_name(&port.name);

        for operation in &port.operations {
            self.visit_operation(operation, false);
        }
    }

    fn check_port_expressions(&mut self, port: &PortDecl) {
        if let Some(Protocol::Expr(expr)) = &port.protocol
            && !matches!(expr.kind, ExprKind::Str(_) | ExprKind::Variable(_))
        {
            self.error(
                &port.loc,
                format!("{} {}'s protocol is not a valid expression", port.direction, port.name),
            );
        }

        let Some(location) = &port.location else {
            return;
        };
        match &location.kind {
            ExprKind::Str(uri) => {
                if !is_valid_uri(uri) {
                    self.error(
                        &port.loc,
                        format!("{} {}'s location is not a valid URI", port.direction, port.name),
                    );
                }
            }
            ExprKind::Variable(_) => {}
            _ => self.error(
                &port.loc,
                format!("{} {}'s location is not a valid expression", port.direction, port.name),
            ),
        }
    }

    fn type_is_known(&self, name: &str) -> bool {
        self.defined_types.contains_key(name) || self.imported_symbols.contains(name)
    }

    fn visit_operation(&mut self, operation: &'a OperationDecl, input_side: bool) {
        if !self.type_is_known(&operation.request_type) {
            self.error(
                &operation.loc,
                format!(
                    "unknown type: {} for operation {}",
                    operation.request_type, operation.name
                ),
            );
        }
        if let OperationKind::RequestResponse {
            response_type,
            faults,
        } = &operation.kind
        {
            if !self.type_is_known(response_type) {
                self.error(
                    &operation.loc,
                    format!(
                        "unknown type: {} for operation {}",
                        response_type, operation.name
                    ),
                );
            }
            for fault in faults {
                if !self.type_is_known(&fault.type_name) {
                    self.error(
                        &operation.loc,
                        format!("unknown type for fault {}", fault.name),
                    );
                }
            }
        }

        if !input_side {
            return;
        }
        let declared = if operation.is_one_way() {
            &mut self.one_way_operations
        } else {
            &mut self.request_response_operations
        };
        if let Some(first) = declared.get(&operation.name).copied() {
            self.operations_to_be_equal.push((first, operation));
            return;
        }
        declared.insert(operation.name.clone(), operation);
        let accepting = self
            .input_type_operations
            .entry(operation.request_type.clone())
            .or_default();
        if !accepting.contains(&operation.name) {
            accepting.push(operation.name.clone());
        }
    }

    fn visit_correlation_set(&mut self, cset: &'a CorrelationSetInfo) {
        let mut variables: PathSet<Path> = PathSet::new();
        for variable in &cset.variables {
            let path = &variable.path;
            if path.is_global() {
                self.error(&path.loc, "Correlation variables can not be global");
            } else if path.is_correlation() {
                self.error(
                    &path.loc,
                    "Correlation variables can not be in the csets structure",
                );
            } else if !path.is_static() {
                self.error(
                    &path.loc,
                    "correlation variable paths can not make use of dynamic evaluation",
                );
            }

            if !variables.insert(path.clone()) {
                self.error(&path.loc, "Duplicate correlation variable");
            }

            for alias in &variable.aliases {
                let alias_path = &alias.path;
                if alias_path.is_global() {
                    self.error(&alias_path.loc, "Correlation variables can not be global");
                } else if alias_path.is_correlation() {
                    self.error(
                        &alias_path.loc,
                        "Correlation variables can not be in the csets structure",
                    );
                } else if !alias_path.is_static() {
                    self.error(
                        &alias_path.loc,
                        "correlation variable path aliases can not make use of dynamic evaluation",
                    );
                }
            }
        }
        self.correlation_sets.push(cset);
    }

    fn visit_procedure(&mut self, procedure: &'a ProcedureDef) {
        if !self.procedure_names.insert(procedure.name.clone()) {
            self.error(
                &procedure.loc,
                format!(
                    "Procedure {} uses an already defined identifier",
                    procedure.name
                ),
            );
        }

        if procedure.name == "main" {
            self.main_defined = true;
            if self.execution_mode != ExecutionMode::Single && !starts_with_input(&procedure.body) {
                self.error(&procedure.body.loc, MAIN_SHAPE_ERROR);
            }
        }

        self.inside_init = procedure.name == "init";
        self.visit_stmt(&procedure.body);
        self.inside_init = false;
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Sequence(children) | StmtKind::Parallel(children) => {
                for child in children {
                    self.visit_stmt(child);
                }
            }
            StmtKind::Choice(branches) => self.visit_choice(branches),
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    self.visit_expr(condition);
                    self.visit_stmt(body);
                }
                if let Some(otherwise) = otherwise {
                    self.visit_stmt(otherwise);
                }
            }
            StmtKind::While { condition, body } => {
                self.visit_expr(condition);
                self.visit_stmt(body);
            }
            StmtKind::For {
                init,
                condition,
                post,
                body,
            } => {
                self.visit_stmt(init);
                self.visit_expr(condition);
                self.visit_stmt(post);
                self.visit_stmt(body);
            }
            StmtKind::ForEachItem { item, array, body } => {
                self.encountered_assignment(item);
                self.visit_path(item);
                self.visit_path(array);
                self.visit_stmt(body);
            }
            StmtKind::ForEachSubNode { key, target, body } => {
                self.encountered_assignment(key);
                self.visit_path(key);
                self.visit_path(target);
                self.visit_stmt(body);
            }
            StmtKind::Scope { name, body } => {
                self.scopes.push(name.clone());
                self.visit_stmt(body);
                self.scopes.pop();
            }
            StmtKind::Synchronized { body, .. } => self.visit_stmt(body),
            StmtKind::Call(name) => self.calls.push((name.as_str(), &stmt.loc)),
            StmtKind::Input(input) => {
                if let Some(path) = &input.input {
                    self.visit_path(path);
                    if path.is_correlation() {
                        self.error(
                            &stmt.loc,
                            "Receiving a message in a correlation variable is forbidden",
                        );
                    }
                    if path.is_global() {
                        self.error(
                            &stmt.loc,
                            "Receiving a message in a global variable is forbidden",
                        );
                    }
                    self.encountered_assignment(path);
                }
                if let InputKind::RequestResponse { output, body } = &input.kind {
                    if let Some(output) = output {
                        self.visit_expr(output);
                    }
                    self.visit_stmt(body);
                }
            }
            StmtKind::Notification {
                operation,
                port,
                message,
            } => {
                if let Some(message) = message {
                    self.visit_expr(message);
                }
                self.check_notification(operation, port, &stmt.loc);
            }
            StmtKind::SolicitResponse {
                operation,
                port,
                message,
                response,
            } => {
                if let Some(message) = message {
                    self.visit_expr(message);
                }
                if let Some(response) = response {
                    self.encountered_assignment(response);
                }
                self.check_solicit_response(operation, port, &stmt.loc);
            }
            StmtKind::Assign { target, value, .. } => {
                self.visit_path(target);
                self.encountered_assignment(target);
                self.visit_expr(value);
            }
            StmtKind::Increment { target, .. } => {
                self.visit_path(target);
                self.encountered_assignment(target);
            }
            StmtKind::DeepCopy { target, source } => {
                self.encountered_assignment(target);
                self.visit_path(target);
                self.visit_expr(source);
                if target.is_correlation() {
                    self.error(&stmt.loc, "Deep copy on a correlation variable is forbidden");
                }
            }
            StmtKind::Alias { target, source } => {
                self.encountered_assignment(target);
                self.encountered_assignment(source);
                self.visit_path(target);
                self.visit_path(source);
                if source.is_correlation() {
                    self.error(
                        &stmt.loc,
                        "Making an alias to a correlation variable is forbidden",
                    );
                }
            }
            StmtKind::Undef(path) => {
                self.encountered_assignment(path);
                self.visit_path(path);
                if path.is_correlation() {
                    self.error(&stmt.loc, "Undefining a correlation variable is forbidden");
                }
            }
            StmtKind::Throw { value, .. } => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            StmtKind::Exit | StmtKind::Null => {}
        }
    }

    fn visit_choice(&mut self, branches: &'a [ChoiceBranch]) {
        let mut operations = HashSet::new();
        for branch in branches {
            match branch.guard.input_operation() {
                None => self.error(
                    &branch.guard.loc,
                    "Input choices can contain only One-Way or Request-Response guards",
                ),
                Some(name) => {
                    if !operations.insert(name) {
                        self.error(
                            &branch.guard.loc,
                            format!(
                                "Input choices can not have duplicate input guards (input statement for operation {})",
                                name
                            ),
                        );
                    }
                }
            }
            self.visit_stmt(&branch.guard);
            self.visit_stmt(&branch.body);
        }
    }

    fn check_notification(&mut self, operation: &str, port: &str, loc: &SourceLoc) {
        let Some(declared) = self.output_ports.get(port).copied() else {
            self.error(loc, format!("{} is not a valid output port", port));
            return;
        };
        match declared.operations.iter().find(|op| op.name == operation) {
            None => self.error(
                loc,
                format!(
                    "Operation {} has not been declared in output port type {}",
                    operation, port
                ),
            ),
            Some(op) if !op.is_one_way() => self.error(
                loc,
                format!(
                    "Operation {} is not a valid one-way operation in output port {}",
                    operation, port
                ),
            ),
            Some(_) => {}
        }
    }

    fn check_solicit_response(&mut self, operation: &str, port: &str, loc: &SourceLoc) {
        let Some(declared) = self.output_ports.get(port).copied() else {
            self.error(loc, format!("{} is not a valid output port", port));
            return;
        };
        match declared.operations.iter().find(|op| op.name == operation) {
            None => self.error(
                loc,
                format!(
                    "Operation {} has not been declared in output port {}",
                    operation, port
                ),
            ),
            Some(op) if op.is_one_way() => self.error(
                loc,
                format!(
                    "Operation {} is not a valid request-response operation in output port {}",
                    operation, port
                ),
            ),
            Some(_) => {}
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Variable(path)
            | ExprKind::PreIncrement(path)
            | ExprKind::PostIncrement(path)
            | ExprKind::PreDecrement(path)
            | ExprKind::PostDecrement(path)
            | ExprKind::VectorSize(path)
            | ExprKind::IsDefined(path) => self.visit_path(path),
            ExprKind::Not(inner) | ExprKind::Negate(inner) => self.visit_expr(inner),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.visit_expr(lhs);
                self.visit_expr(rhs);
            }
            ExprKind::Int(_)
            | ExprKind::Long(_)
            | ExprKind::Double(_)
            | ExprKind::Bool(_)
            | ExprKind::Str(_)
            | ExprKind::Fresh => {}
        }
    }

    fn visit_path(&mut self, path: &Path) {
        if self.inside_init && path.is_correlation() {
            self.error(
                &path.loc,
                "Correlation variable access is forbidden in init procedures",
            );
        }
        if path.is_correlation() && !path.is_static() {
            self.error(&path.loc, "Correlation paths must be statically defined");
        }

        let first = if path.is_correlation() {
            path.segments.get(1)
        } else {
            path.segments.first()
        };
        match first {
            None => self.error(&path.loc, format!("invalid path: {}", path)),
            Some(segment) if matches!(segment.key, PathKey::Dynamic(_)) => {
                let message = if path.is_global() {
                    "the global keyword in paths must be followed by an identifier"
                } else if path.is_correlation() {
                    "the csets keyword in paths must be followed by an identifier"
                } else {
                    "paths must start with an identifier"
                };
                self.error(&path.loc, message);
            }
            Some(_) => {}
        }
    }

    fn encountered_assignment(&mut self, path: &Path) {
        let Some(name) = path.root_name() else {
            self.error(&path.loc, format!("{} is an invalid path", path));
            return;
        };
        if self.scopes.iter().any(|scope| scope == name) {
            let message = format!(
                "DEPRECATION: usage of same variable name \"{}\" inside scope \"[{}]\"",
                name,
                self.scopes.join(", ")
            );
            self.diagnostics.warning(&path.loc, message);
        }
        let name = name.to_string();
        self.encountered_assignment_name(&name);
    }

    fn encountered_assignment_name(&mut self, name: &str) {
        let first = !self.constant_flags.contains_key(name);
        self.constant_flags.insert(name.to_string(), first);
    }

    fn check_calls(&mut self) {
        let undefined: Vec<_> = self
            .calls
            .iter()
            .filter(|(name, _)| !self.procedure_names.contains(*name))
            .map(|(name, loc)| (name.to_string(), (*loc).clone()))
            .collect();
        for (name, loc) in undefined {
            self.error(&loc, format!("Call to undefined definition: {}", name));
        }
    }

    fn check_to_be_equal(&mut self) {
        let types = std::mem::take(&mut self.types_to_be_equal);
        for (first, redefined) in &types {
            if !first.is_equivalent_to(redefined, &self.defined_types) {
                self.error(
                    &redefined.loc,
                    format!(
                        "type {} has already been defined with a different structure",
                        redefined.name
                    ),
                );
            }
        }

        let operations = std::mem::take(&mut self.operations_to_be_equal);
        for (first, other) in operations {
            self.check_operation_equality(first, other);
        }
    }

    fn types_equivalent(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        match (self.defined_types.get(a), self.defined_types.get(b)) {
            (Some(a), Some(b)) => a.is_equivalent_to(b, &self.defined_types),
            _ => false,
        }
    }

    fn check_operation_equality(&mut self, first: &OperationDecl, other: &OperationDecl) {
        let label = if first.is_one_way() {
            "One-Way"
        } else {
            "Request-Response"
        };
        if !self.types_equivalent(&first.request_type, &other.request_type) {
            self.error(
                &other.loc,
                format!(
                    "input operations sharing the same name cannot declare different request types ({} operation {})",
                    label, other.name
                ),
            );
        }

        let (
            OperationKind::RequestResponse {
                response_type: first_response,
                faults: first_faults,
            },
            OperationKind::RequestResponse {
                response_type: other_response,
                faults: other_faults,
            },
        ) = (&first.kind, &other.kind)
        else {
            return;
        };

        if !self.types_equivalent(first_response, other_response) {
            self.error(
                &other.loc,
                format!(
                    "input operations sharing the same name cannot declare different response types (Request-Response operation {})",
                    other.name
                ),
            );
        }

        let faults_match = first_faults.len() == other_faults.len()
            && first_faults.iter().all(|fault| {
                other_faults.iter().any(|candidate| {
                    candidate.name == fault.name
                        && self.types_equivalent(&candidate.type_name, &fault.type_name)
                })
            });
        if !faults_match {
            self.error(
                &other.loc,
                format!(
                    "input operations sharing the same name cannot declare different fault types (Request-Response operation {})",
                    other.name
                ),
            );
        }
    }

    fn check_correlation_sets(&mut self) -> CorrelationFunctionInfo {
        let mut info = CorrelationFunctionInfo::new();
        let mut correlating: HashSet<String> = HashSet::new();
        let sets = std::mem::take(&mut self.correlation_sets);

        for cset in sets {
            let id = info.add_correlation_set(cset.clone());
            let mut current: BTreeSet<String> = BTreeSet::new();
            for variable in &cset.variables {
                for alias in &variable.aliases {
                    self.check_correlation_alias(alias);
                    let operations = self
                        .input_type_operations
                        .get(&alias.guard_type)
                        .cloned()
                        .unwrap_or_default();
                    for operation in operations {
                        info.put_correlation_pair(
                            &operation,
                            CorrelationPair {
                                variable_path: variable.qualified_path(),
                                alias_path: alias.path.clone(),
                            },
                        );
                        current.insert(operation);
                    }
                }
            }
            for operation in current {
                if correlating.contains(&operation) {
                    self.error(
                        &cset.loc,
                        format!(
                            "Operation {} is specified on more than one correlation set. Each operation can correlate using only one correlation set.",
                            operation
                        ),
                    );
                } else {
                    info.bind_operation(&operation, id);
                    correlating.insert(operation);
                }
            }
        }

        let incomplete: Vec<(String, SourceLoc)> = info
            .operations()
            .filter_map(|(operation, id)| {
                let cset = info.correlation_set(id)?;
                let pairs = info.operation_correlation_pairs(operation).len();
                (pairs != cset.variables.len()).then(|| (operation.to_string(), cset.loc.clone()))
            })
            .collect();
        for (operation, loc) in incomplete {
            self.error(
                &loc,
                format!(
                    "Operation {} has not an alias specified for every variable in the correlation set.",
                    operation
                ),
            );
        }

        tracing::debug!(
            sets = info.correlation_sets().len(),
            operations = info.operations().count(),
            "correlation sets resolved"
        );
        info
    }

    fn check_correlation_alias(&mut self, alias: &CorrelationAlias) {
        let Some(guard) = self.defined_types.get(&alias.guard_type) else {
            self.error(
                &alias.path.loc,
                format!("type {} is undefined", alias.guard_type),
            );
            return;
        };
        if !guard.contains_path(&alias.path.segments, &self.defined_types) {
            self.error(
                &alias.path.loc,
                format!(
                    "type {} does not contain the specified path",
                    alias.guard_type
                ),
            );
        }
    }
}

fn starts_with_input(body: &Stmt) -> bool {
    match &body.kind {
        StmtKind::Choice(_) | StmtKind::Input(_) => true,
        StmtKind::Sequence(children) => children
            .first()
            .is_some_and(|first| matches!(first.kind, StmtKind::Input(_))),
        _ => false,
    }
}

/// Syntax check of a constant port location
fn is_valid_uri(uri: &str) -> bool {
    const ILLEGAL: &[char] = &[' ', '"', '<', '>', '\\', '^', '`', '{', '|', '}'];
    if uri.starts_with(':') || uri.chars().any(|c| ILLEGAL.contains(&c) || c.is_control()) {
        return false;
    }
    let bytes = uri.as_bytes();
    bytes.iter().enumerate().all(|(i, b)| {
        *b != b'%'
            || (bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit))
    })
}
