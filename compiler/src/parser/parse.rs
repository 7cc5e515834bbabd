/// Recursive descent parser for service programs
use crate::ast::{
    AssignOp, BinaryOp, Cardinality, ChoiceBranch, CorrelationAlias, CorrelationSetInfo,
    CorrelationVariable, Declaration, ExecutionDecl, Expr, ExprKind, FaultDecl, ImportDecl,
    InputKind, InputStmt, NativeType, OperationDecl, OperationKind, Path, PathIndex, PathKey,
    PathKind, PathSegment, PortDecl, PortDirection, ProcedureDef, Program, Protocol, ServiceDecl,
    SourceLoc, Stmt, StmtKind, TypeDefinition, TypeKind,
};
use crate::config::ExecutionMode;
use crate::parser::lexer::{Lexer, Token, TokenKind};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Parse error at {line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

const MAX_NESTING_DEPTH: usize = 32;

/// Port properties and section headers that end a `throws` list
const PORT_KEYWORDS: &[&str] = &[
    "OneWay",
    "oneWay",
    "RequestResponse",
    "requestResponse",
    "location",
    "Location",
    "protocol",
    "Protocol",
    "interfaces",
    "Interfaces",
    "aggregates",
    "Aggregates",
];

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    nesting_depth: usize,
    /// Arc-wrapped filename to avoid duplication across all SourceLocs
    filename: Arc<str>,
    /// Interfaces are expanded into the ports that use them
    interfaces: HashMap<String, Vec<OperationDecl>>,
    imported: HashSet<String>,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Self::new_with_filename(input, "<input>")
    }

    pub fn new_with_filename(input: &str, filename: &str) -> Self {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize();
        Parser {
            tokens,
            current: 0,
            nesting_depth: 0,
            filename: Arc::from(filename),
            interfaces: HashMap::new(),
            imported: HashSet::new(),
        }
    }

    /// Helper: Create SourceLoc from current token
    fn current_loc(&self) -> SourceLoc {
        let token = self.peek();
        SourceLoc::new(token.line, token.column, Arc::clone(&self.filename))
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        if let Some(token) = self.tokens.iter().find(|t| t.kind == TokenKind::Error) {
            return Err(ParseError {
                message: token.lexeme.clone(),
                line: token.line,
                column: token.column,
            });
        }

        let loc = SourceLoc::file_only(Arc::clone(&self.filename));
        let mut declarations = Vec::new();
        while !self.is_at_end() {
            if let Some(declaration) = self.parse_declaration()? {
                declarations.push(declaration);
            }
        }

        Ok(Program { declarations, loc })
    }

    /// Interfaces yield `None`: their operations live on in the ports
    fn parse_declaration(&mut self) -> Result<Option<Declaration>, ParseError> {
        if self.peek().kind != TokenKind::Ident {
            return Err(self.error("Expected a declaration"));
        }

        let keyword = self.peek().lexeme.clone();
        let declaration = match keyword.as_str() {
            "from" => Declaration::Import(self.parse_import()?),
            "type" => Declaration::Type(self.parse_type_decl()?),
            "interface" => {
                self.parse_interface()?;
                return Ok(None);
            }
            "inputPort" => Declaration::Port(self.parse_port(PortDirection::Input)?),
            "outputPort" => Declaration::Port(self.parse_port(PortDirection::Output)?),
            "execution" => Declaration::Execution(self.parse_execution()?),
            "cset" => Declaration::CorrelationSet(self.parse_correlation_set()?),
            "main" | "init" | "define" => Declaration::Procedure(self.parse_procedure()?),
            "service" => Declaration::Service(self.parse_service()?),
            _ => return Err(self.error(&format!("Unexpected '{}' at declaration level", keyword))),
        };
        Ok(Some(declaration))
    }

    fn parse_import(&mut self) -> Result<ImportDecl, ParseError> {
        let loc = self.current_loc();
        self.advance(); // consume 'from'

        let mut module = String::new();
        while !self.check_ident("import") && !self.is_at_end() {
            let token = self.advance();
            module.push_str(&token.lexeme);
        }
        if module.is_empty() {
            return Err(self.error("Expected a module name after 'from'"));
        }
        self.consume_ident_value("import", "Expected 'import'")?;

        let mut symbols = Vec::new();
        loop {
            let symbol = self.consume_ident("Expected an imported symbol")?;
            self.imported.insert(symbol.clone());
            symbols.push(symbol);
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        Ok(ImportDecl {
            module,
            symbols,
            loc,
        })
    }

    fn parse_type_decl(&mut self) -> Result<TypeDefinition, ParseError> {
        let loc = self.current_loc();
        self.advance(); // consume 'type'

        let name = self.consume_ident("Expected type name")?;
        let cardinality = self.parse_cardinality()?;
        self.consume(&TokenKind::Colon, "Expected ':' after type name")?;
        self.parse_type_body(name, cardinality, loc)
    }

    /// `alternative ('|' alternative)*`
    fn parse_type_body(
        &mut self,
        name: String,
        cardinality: Cardinality,
        loc: SourceLoc,
    ) -> Result<TypeDefinition, ParseError> {
        let left = self.parse_type_alternative(name.clone(), cardinality, loc.clone())?;
        if !self.check(&TokenKind::Pipe) {
            return Ok(left);
        }
        self.advance();
        let right = self.parse_type_body(name.clone(), cardinality, loc.clone())?;
        Ok(TypeDefinition {
            name,
            cardinality,
            kind: TypeKind::Choice(Box::new(left), Box::new(right)),
            loc,
        })
    }

    fn parse_type_alternative(
        &mut self,
        name: String,
        cardinality: Cardinality,
        loc: SourceLoc,
    ) -> Result<TypeDefinition, ParseError> {
        let base = self.consume_ident("Expected a type")?;

        if base == "undefined" {
            return Ok(TypeDefinition {
                name,
                cardinality,
                ..TypeDefinition::undefined(loc)
            });
        }

        let Some(native) = NativeType::from_name(&base) else {
            return Ok(TypeDefinition {
                name,
                cardinality,
                kind: TypeKind::Link(base),
                loc,
            });
        };

        let mut untyped = false;
        let mut fields = Vec::new();
        if self.check(&TokenKind::LeftBrace) {
            self.enter_nesting()?;
            self.advance();
            if self.check(&TokenKind::Question) {
                self.advance();
                untyped = true;
            } else {
                while self.check(&TokenKind::Dot) {
                    fields.push(self.parse_subtype()?);
                }
            }
            self.consume(&TokenKind::RightBrace, "Expected '}' after subtypes")?;
            self.exit_nesting();
        }

        Ok(TypeDefinition {
            name,
            cardinality,
            kind: TypeKind::Inline {
                native,
                untyped,
                fields,
            },
            loc,
        })
    }

    /// `.name[min, max]: type`
    fn parse_subtype(&mut self) -> Result<TypeDefinition, ParseError> {
        let loc = self.current_loc();
        self.advance(); // consume '.'
        let name = self.consume_ident("Expected subnode name")?;
        let cardinality = self.parse_cardinality()?;
        self.consume(&TokenKind::Colon, "Expected ':' after subnode name")?;
        self.parse_type_body(name, cardinality, loc)
    }

    fn parse_cardinality(&mut self) -> Result<Cardinality, ParseError> {
        match self.peek().kind {
            TokenKind::Question => {
                self.advance();
                Ok(Cardinality::OPTIONAL)
            }
            TokenKind::Star => {
                self.advance();
                Ok(Cardinality::ANY)
            }
            TokenKind::LeftBracket => {
                self.advance();
                let min = self.parse_signed_int()?;
                self.consume(&TokenKind::Comma, "Expected ',' in cardinality")?;
                let max = if self.check(&TokenKind::Star) {
                    self.advance();
                    i64::MAX
                } else {
                    self.parse_signed_int()?
                };
                self.consume(&TokenKind::RightBracket, "Expected ']' after cardinality")?;
                Ok(Cardinality::new(min, max))
            }
            _ => Ok(Cardinality::ONE),
        }
    }

    fn parse_signed_int(&mut self) -> Result<i64, ParseError> {
        let negative = self.check(&TokenKind::Minus);
        if negative {
            self.advance();
        }
        if !self.check(&TokenKind::IntLiteral) {
            return Err(self.error("Expected an integer"));
        }
        let value = self.parse_int_lexeme()?;
        Ok(if negative { -value } else { value })
    }

    fn parse_int_lexeme(&mut self) -> Result<i64, ParseError> {
        let value = self
            .peek()
            .lexeme
            .parse::<i64>()
            .map_err(|_| self.error("Invalid integer literal"))?;
        self.advance();
        Ok(value)
    }

    fn parse_interface(&mut self) -> Result<(), ParseError> {
        self.advance(); // consume 'interface'
        let name = self.consume_ident("Expected interface name")?;
        self.consume(&TokenKind::LeftBrace, "Expected '{' after interface name")?;

        let mut operations = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            self.parse_operation_section(&mut operations)?;
        }
        self.consume(&TokenKind::RightBrace, "Expected '}' after interface")?;

        self.interfaces.insert(name, operations);
        Ok(())
    }

    /// `OneWay: a(T), b(U)` or `RequestResponse: c(T)(U) throws F(V)`
    fn parse_operation_section(&mut self, out: &mut Vec<OperationDecl>) -> Result<(), ParseError> {
        let one_way = if self.check_ident("OneWay") || self.check_ident("oneWay") {
            true
        } else if self.check_ident("RequestResponse") || self.check_ident("requestResponse") {
            false
        } else {
            return Err(self.error("Expected 'OneWay' or 'RequestResponse'"));
        };
        self.advance();
        self.consume(&TokenKind::Colon, "Expected ':' after operation kind")?;

        loop {
            out.push(self.parse_operation(one_way)?);
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(())
    }

    fn parse_operation(&mut self, one_way: bool) -> Result<OperationDecl, ParseError> {
        let loc = self.current_loc();
        let name = self.consume_ident("Expected operation name")?;
        let request_type = self.parse_operation_type()?;

        if one_way {
            return Ok(OperationDecl {
                name,
                request_type,
                kind: OperationKind::OneWay,
                loc,
            });
        }

        let response_type = self.parse_operation_type()?;
        let mut faults = Vec::new();
        if self.check_ident("throws") {
            self.advance();
            while self.peek().kind == TokenKind::Ident
                && !PORT_KEYWORDS.contains(&self.peek().lexeme.as_str())
            {
                let fault_loc = self.current_loc();
                let fault_name = self.consume_ident("Expected fault name")?;
                let type_name = if self.check(&TokenKind::LeftParen) {
                    self.parse_operation_type()?
                } else {
                    "undefined".to_string()
                };
                faults.push(FaultDecl {
                    name: fault_name,
                    type_name,
                    loc: fault_loc,
                });
            }
        }

        Ok(OperationDecl {
            name,
            request_type,
            kind: OperationKind::RequestResponse {
                response_type,
                faults,
            },
            loc,
        })
    }

    /// `(TypeName)`, `()` or nothing; the last two mean `void`
    fn parse_operation_type(&mut self) -> Result<String, ParseError> {
        if !self.check(&TokenKind::LeftParen) {
            return Ok("void".to_string());
        }
        self.advance();
        let name = if self.check(&TokenKind::RightParen) {
            "void".to_string()
        } else {
            self.consume_ident("Expected a type name")?
        };
        self.consume(&TokenKind::RightParen, "Expected ')' after type name")?;
        Ok(name)
    }

    fn parse_port(&mut self, direction: PortDirection) -> Result<PortDecl, ParseError> {
        let loc = self.current_loc();
        self.advance(); // consume 'inputPort' / 'outputPort'
        let name = self.consume_ident("Expected port name")?;
        self.consume(&TokenKind::LeftBrace, "Expected '{' after port name")?;

        let mut port = PortDecl {
            name,
            direction,
            location: None,
            protocol: None,
            operations: Vec::new(),
            aggregates: Vec::new(),
            loc,
        };

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            if self.peek().kind != TokenKind::Ident {
                return Err(self.error("Expected a port property"));
            }
            let property = self.peek().lexeme.clone();
            match property.as_str() {
                "location" | "Location" => {
                    self.advance();
                    self.consume(&TokenKind::Colon, "Expected ':' after location")?;
                    port.location = Some(self.parse_expr()?);
                }
                "protocol" | "Protocol" => {
                    self.advance();
                    self.consume(&TokenKind::Colon, "Expected ':' after protocol")?;
                    port.protocol = Some(self.parse_protocol()?);
                }
                "interfaces" | "Interfaces" => {
                    self.advance();
                    self.consume(&TokenKind::Colon, "Expected ':' after interfaces")?;
                    for interface in self.parse_name_list("Expected interface name")? {
                        match self.interfaces.get(&interface) {
                            Some(operations) => port.operations.extend(operations.iter().cloned()),
                            // Imported interfaces are resolved by another module
                            None if self.imported.contains(&interface) => {}
                            None => {
                                return Err(
                                    self.error(&format!("Unknown interface '{}'", interface))
                                );
                            }
                        }
                    }
                }
                "aggregates" | "Aggregates" => {
                    self.advance();
                    self.consume(&TokenKind::Colon, "Expected ':' after aggregates")?;
                    port.aggregates = self.parse_name_list("Expected output port name")?;
                }
                _ => self.parse_operation_section(&mut port.operations)?,
            }
        }
        self.consume(&TokenKind::RightBrace, "Expected '}' after port")?;

        Ok(port)
    }

    /// A bare protocol name, with an optional configuration block that is
    /// skipped, or an expression
    fn parse_protocol(&mut self) -> Result<Protocol, ParseError> {
        let is_named = self.peek().kind == TokenKind::Ident
            && !matches!(self.peek_next_kind(), Some(TokenKind::Dot | TokenKind::LeftBracket));
        if !is_named {
            return Ok(Protocol::Expr(self.parse_expr()?));
        }

        let name = self.consume_ident("Expected protocol name")?;
        if self.check(&TokenKind::LeftBrace) {
            let mut depth = 0usize;
            loop {
                let kind = self.advance().kind.clone();
                match kind {
                    TokenKind::LeftBrace => depth += 1,
                    TokenKind::RightBrace => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    TokenKind::Eof => return Err(self.error("Unterminated protocol configuration")),
                    _ => {}
                }
            }
        }
        Ok(Protocol::Named(name))
    }

    fn parse_name_list(&mut self, message: &str) -> Result<Vec<String>, ParseError> {
        let mut names = vec![self.consume_ident(message)?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            names.push(self.consume_ident(message)?);
        }
        Ok(names)
    }

    /// `execution { concurrent }` or `execution: concurrent`
    fn parse_execution(&mut self) -> Result<ExecutionDecl, ParseError> {
        let loc = self.current_loc();
        self.advance(); // consume 'execution'

        let braced = self.check(&TokenKind::LeftBrace);
        if braced {
            self.advance();
        } else {
            self.consume(&TokenKind::Colon, "Expected '{' or ':' after execution")?;
        }

        let keyword = self.consume_ident("Expected execution mode")?;
        let mode = ExecutionMode::from_keyword(&keyword).ok_or_else(|| {
            self.error(&format!("Unknown execution mode '{}'", keyword))
        })?;

        if braced {
            self.consume(&TokenKind::RightBrace, "Expected '}' after execution mode")?;
        }

        Ok(ExecutionDecl { mode, loc })
    }

    /// `cset { var: Type.path Other.path, ... }`
    fn parse_correlation_set(&mut self) -> Result<CorrelationSetInfo, ParseError> {
        let loc = self.current_loc();
        self.advance(); // consume 'cset'
        self.consume(&TokenKind::LeftBrace, "Expected '{' after cset")?;

        let mut variables = Vec::new();
        loop {
            let path = self.parse_variable_path()?;
            self.consume(&TokenKind::Colon, "Expected ':' after correlation variable")?;

            let mut aliases = Vec::new();
            while self.peek().kind == TokenKind::Ident {
                let guard_type = self.consume_ident("Expected a type name")?;
                self.consume(&TokenKind::Dot, "Expected '.' after alias type name")?;
                let alias = self.parse_variable_path()?;
                aliases.push(CorrelationAlias {
                    guard_type,
                    path: alias,
                });
            }
            if aliases.is_empty() {
                return Err(self.error("Expected at least one alias for correlation variable"));
            }

            variables.push(CorrelationVariable { path, aliases });
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.consume(&TokenKind::RightBrace, "Expected '}' after cset")?;

        Ok(CorrelationSetInfo { variables, loc })
    }

    fn parse_procedure(&mut self) -> Result<ProcedureDef, ParseError> {
        let loc = self.current_loc();
        let keyword = self.consume_ident("Expected a procedure")?;
        let name = if keyword == "define" {
            self.consume_ident("Expected procedure name after 'define'")?
        } else {
            keyword
        };
        let body = self.parse_block()?;
        Ok(ProcedureDef { name, body, loc })
    }

    fn parse_service(&mut self) -> Result<ServiceDecl, ParseError> {
        let loc = self.current_loc();
        self.advance(); // consume 'service'
        let name = self.consume_ident("Expected service name")?;

        // Service parameters do not take part in the analysis
        if self.check(&TokenKind::LeftParen) {
            while !self.check(&TokenKind::RightParen) && !self.is_at_end() {
                self.advance();
            }
            self.consume(&TokenKind::RightParen, "Expected ')' after service parameters")?;
        }

        self.consume(&TokenKind::LeftBrace, "Expected '{' after service name")?;
        let mut declarations = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            if let Some(declaration) = self.parse_declaration()? {
                declarations.push(declaration);
            }
        }
        self.consume(&TokenKind::RightBrace, "Expected '}' after service body")?;

        Ok(ServiceDecl {
            name,
            declarations,
            loc,
        })
    }

    /// `{ process }`; an empty block is the null process
    fn parse_block(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.current_loc();
        self.consume(&TokenKind::LeftBrace, "Expected '{'")?;
        self.enter_nesting()?;
        let body = if self.check(&TokenKind::RightBrace) {
            Stmt::new(StmtKind::Null, loc)
        } else {
            self.parse_process()?
        };
        self.exit_nesting();
        self.consume(&TokenKind::RightBrace, "Expected '}'")?;
        Ok(body)
    }

    fn parse_process(&mut self) -> Result<Stmt, ParseError> {
        self.parse_parallel()
    }

    fn parse_parallel(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.current_loc();
        let first = self.parse_sequence()?;
        if !self.check(&TokenKind::Pipe) {
            return Ok(first);
        }

        let mut children = vec![first];
        while self.check(&TokenKind::Pipe) {
            self.advance();
            children.push(self.parse_sequence()?);
        }
        Ok(Stmt::new(StmtKind::Parallel(children), loc))
    }

    fn parse_sequence(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.current_loc();
        let mut children = vec![self.parse_statement()?];
        while self.check(&TokenKind::Semicolon) {
            self.advance();
            // Trailing separator
            if self.check(&TokenKind::RightBrace) || self.check(&TokenKind::Pipe) || self.is_at_end()
            {
                break;
            }
            children.push(self.parse_statement()?);
        }

        if children.len() == 1 {
            Ok(children.remove(0))
        } else {
            Ok(Stmt::new(StmtKind::Sequence(children), loc))
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.current_loc();
        match self.peek().kind {
            TokenKind::LeftBrace => return self.parse_block(),
            TokenKind::LeftBracket => return self.parse_choice(),
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let decrement = self.check(&TokenKind::MinusMinus);
                self.advance();
                let target = self.parse_variable_path()?;
                return Ok(Stmt::new(StmtKind::Increment { target, decrement }, loc));
            }
            TokenKind::Ident => {}
            _ => return Err(self.error("Expected a statement")),
        }

        let keyword = self.peek().lexeme.clone();
        match keyword.as_str() {
            "if" => self.parse_if(),
            "while" => {
                self.advance();
                let condition = self.parse_condition()?;
                let body = self.parse_block()?;
                Ok(Stmt::new(
                    StmtKind::While {
                        condition,
                        body: Box::new(body),
                    },
                    loc,
                ))
            }
            "for" => self.parse_for(),
            "foreach" => {
                self.advance();
                self.consume(&TokenKind::LeftParen, "Expected '(' after foreach")?;
                let key = self.parse_variable_path()?;
                self.consume(&TokenKind::Colon, "Expected ':' in foreach")?;
                let target = self.parse_variable_path()?;
                self.consume(&TokenKind::RightParen, "Expected ')' after foreach target")?;
                let body = self.parse_block()?;
                Ok(Stmt::new(
                    StmtKind::ForEachSubNode {
                        key,
                        target,
                        body: Box::new(body),
                    },
                    loc,
                ))
            }
            "scope" | "synchronized" => {
                self.advance();
                self.consume(&TokenKind::LeftParen, "Expected '('")?;
                let name = self.consume_ident("Expected an identifier")?;
                self.consume(&TokenKind::RightParen, "Expected ')'")?;
                let body = Box::new(self.parse_block()?);
                let kind = if keyword == "scope" {
                    StmtKind::Scope { name, body }
                } else {
                    StmtKind::Synchronized { id: name, body }
                };
                Ok(Stmt::new(kind, loc))
            }
            "undef" => {
                self.advance();
                self.consume(&TokenKind::LeftParen, "Expected '(' after undef")?;
                let path = self.parse_variable_path()?;
                self.consume(&TokenKind::RightParen, "Expected ')' after undef")?;
                Ok(Stmt::new(StmtKind::Undef(path), loc))
            }
            "throw" => {
                self.advance();
                self.consume(&TokenKind::LeftParen, "Expected '(' after throw")?;
                let fault = self.consume_ident("Expected fault name")?;
                let value = if self.check(&TokenKind::Comma) {
                    self.advance();
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.consume(&TokenKind::RightParen, "Expected ')' after throw")?;
                Ok(Stmt::new(StmtKind::Throw { fault, value }, loc))
            }
            "nullProcess" => {
                self.advance();
                Ok(Stmt::new(StmtKind::Null, loc))
            }
            "exit" => {
                self.advance();
                Ok(Stmt::new(StmtKind::Exit, loc))
            }
            _ => self.parse_simple_statement(),
        }
    }

    /// Inputs, outputs, assignments and procedure calls
    fn parse_simple_statement(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.current_loc();
        match self.peek_next_kind() {
            Some(TokenKind::LeftParen) => return self.parse_input(),
            Some(TokenKind::At) => return self.parse_output(),
            _ => {}
        }

        let target = self.parse_variable_path()?;
        let assign_op = match self.peek().kind {
            TokenKind::Assign => Some(AssignOp::Set),
            TokenKind::PlusAssign => Some(AssignOp::Add),
            TokenKind::MinusAssign => Some(AssignOp::Sub),
            TokenKind::StarAssign => Some(AssignOp::Mul),
            TokenKind::SlashAssign => Some(AssignOp::Div),
            _ => None,
        };

        let kind = if let Some(op) = assign_op {
            self.advance();
            let value = self.parse_expr()?;
            StmtKind::Assign { target, op, value }
        } else {
            match self.peek().kind {
                TokenKind::DeepCopy => {
                    self.advance();
                    let source = self.parse_expr()?;
                    StmtKind::DeepCopy { target, source }
                }
                TokenKind::Arrow => {
                    self.advance();
                    let source = self.parse_variable_path()?;
                    StmtKind::Alias { target, source }
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let decrement = self.check(&TokenKind::MinusMinus);
                    self.advance();
                    StmtKind::Increment { target, decrement }
                }
                _ => match target.as_simple_name() {
                    Some(name) => StmtKind::Call(name.to_string()),
                    None => return Err(self.error("Expected an assignment")),
                },
            }
        };

        Ok(Stmt::new(kind, loc))
    }

    /// `op(in)` or `op(in)(out) { body }`
    fn parse_input(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.current_loc();
        let operation = self.consume_ident("Expected operation name")?;

        self.consume(&TokenKind::LeftParen, "Expected '(' after operation name")?;
        let input = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_variable_path()?)
        };
        self.consume(&TokenKind::RightParen, "Expected ')' after input variable")?;

        let kind = if self.check(&TokenKind::LeftParen) {
            self.advance();
            let output = if self.check(&TokenKind::RightParen) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.consume(&TokenKind::RightParen, "Expected ')' after response")?;
            let body = if self.check(&TokenKind::LeftBrace) {
                self.parse_block()?
            } else {
                Stmt::new(StmtKind::Null, loc.clone())
            };
            InputKind::RequestResponse {
                output,
                body: Box::new(body),
            }
        } else {
            InputKind::OneWay
        };

        Ok(Stmt::new(
            StmtKind::Input(InputStmt {
                operation,
                input,
                kind,
            }),
            loc,
        ))
    }

    /// `op@Port(msg)` or `op@Port(msg)(response)`
    fn parse_output(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.current_loc();
        let operation = self.consume_ident("Expected operation name")?;
        self.consume(&TokenKind::At, "Expected '@'")?;
        let port = self.consume_ident("Expected output port name")?;

        self.consume(&TokenKind::LeftParen, "Expected '(' after output port")?;
        let message = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.consume(&TokenKind::RightParen, "Expected ')' after message")?;

        if !self.check(&TokenKind::LeftParen) {
            return Ok(Stmt::new(
                StmtKind::Notification {
                    operation,
                    port,
                    message,
                },
                loc,
            ));
        }

        self.advance();
        let response = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_variable_path()?)
        };
        self.consume(&TokenKind::RightParen, "Expected ')' after response variable")?;

        Ok(Stmt::new(
            StmtKind::SolicitResponse {
                operation,
                port,
                message,
                response,
            },
            loc,
        ))
    }

    /// Consecutive `[guard] { body }` branches form one input choice
    fn parse_choice(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.current_loc();
        let mut branches = Vec::new();
        while self.check(&TokenKind::LeftBracket) {
            self.advance();
            self.enter_nesting()?;
            let guard = self.parse_statement()?;
            self.exit_nesting();
            self.consume(&TokenKind::RightBracket, "Expected ']' after input guard")?;
            let body = self.parse_block()?;
            branches.push(ChoiceBranch { guard, body });
        }
        Ok(Stmt::new(StmtKind::Choice(branches), loc))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.current_loc();
        self.advance(); // consume 'if'

        let condition = self.parse_condition()?;
        let mut branches = vec![(condition, self.parse_branch_body()?)];
        let mut otherwise = None;

        while self.check_ident("else") {
            self.advance();
            if self.check_ident("if") {
                self.advance();
                let condition = self.parse_condition()?;
                branches.push((condition, self.parse_branch_body()?));
            } else {
                otherwise = Some(Box::new(self.parse_branch_body()?));
                break;
            }
        }

        Ok(Stmt::new(
            StmtKind::If {
                branches,
                otherwise,
            },
            loc,
        ))
    }

    fn parse_branch_body(&mut self) -> Result<Stmt, ParseError> {
        if self.check(&TokenKind::LeftBrace) {
            self.parse_block()
        } else {
            self.parse_statement()
        }
    }

    fn parse_condition(&mut self) -> Result<Expr, ParseError> {
        self.consume(&TokenKind::LeftParen, "Expected '(' before condition")?;
        let condition = self.parse_expr()?;
        self.consume(&TokenKind::RightParen, "Expected ')' after condition")?;
        Ok(condition)
    }

    /// `for (item in array)` or `for (init, condition, post)`
    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let loc = self.current_loc();
        self.advance(); // consume 'for'
        self.consume(&TokenKind::LeftParen, "Expected '(' after for")?;

        if self.peek().kind == TokenKind::Ident {
            let save = self.current;
            let item = self.parse_variable_path()?;
            if self.check_ident("in") {
                self.advance();
                let array = self.parse_variable_path()?;
                self.consume(&TokenKind::RightParen, "Expected ')' after for-each array")?;
                let body = self.parse_block()?;
                return Ok(Stmt::new(
                    StmtKind::ForEachItem {
                        item,
                        array,
                        body: Box::new(body),
                    },
                    loc,
                ));
            }
            self.current = save;
        }

        let init = self.parse_statement()?;
        self.consume(&TokenKind::Comma, "Expected ',' after for initialisation")?;
        let condition = self.parse_expr()?;
        self.consume(&TokenKind::Comma, "Expected ',' after for condition")?;
        let post = self.parse_statement()?;
        self.consume(&TokenKind::RightParen, "Expected ')' after for header")?;
        let body = self.parse_block()?;

        Ok(Stmt::new(
            StmtKind::For {
                init: Box::new(init),
                condition,
                post: Box::new(post),
                body: Box::new(body),
            },
            loc,
        ))
    }

    /// Paths start with an identifier; `global` and `csets` set the kind
    fn parse_variable_path(&mut self) -> Result<Path, ParseError> {
        let loc = self.current_loc();
        let first = self.consume_ident("Expected a variable path")?;

        let mut path = match first.as_str() {
            "global" => Path::new(PathKind::Global, loc),
            "csets" => {
                let mut path = Path::new(PathKind::CorrelationSet, loc);
                path.push(PathSegment {
                    key: PathKey::Name(first),
                    index: Some(PathIndex::Const(0)),
                });
                path
            }
            _ => {
                let mut path = Path::new(PathKind::Normal, loc);
                let index = self.parse_path_index()?;
                path.push(PathSegment {
                    key: PathKey::Name(first),
                    index,
                });
                path
            }
        };

        while self.check(&TokenKind::Dot) {
            self.advance();
            let key = if self.check(&TokenKind::LeftParen) {
                self.advance();
                let key = self.parse_expr()?;
                self.consume(&TokenKind::RightParen, "Expected ')' after dynamic key")?;
                PathKey::Dynamic(Box::new(key))
            } else {
                PathKey::Name(self.consume_ident("Expected a path segment after '.'")?)
            };
            let index = self.parse_path_index()?;
            path.push(PathSegment { key, index });
        }

        if path.is_global() && path.is_empty() {
            return Err(self.error("Expected '.' after 'global'"));
        }
        Ok(path)
    }

    fn parse_path_index(&mut self) -> Result<Option<PathIndex>, ParseError> {
        if !self.check(&TokenKind::LeftBracket) {
            return Ok(None);
        }
        self.advance();
        let index = self.parse_expr()?;
        self.consume(&TokenKind::RightBracket, "Expected ']' after index")?;
        Ok(Some(PathIndex::from_expr(index)))
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.check(&TokenKind::OrOr) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_comparison()?;
        while self.check(&TokenKind::AndAnd) {
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_additive()?;
        let op = match self.peek().kind {
            TokenKind::Equal => BinaryOp::Equal,
            TokenKind::NotEqual => BinaryOp::NotEqual,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::LessEqual => BinaryOp::LessEqual,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(binary(op, lhs, rhs))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let loc = self.current_loc();
        match self.peek().kind {
            TokenKind::Bang => {
                self.advance();
                self.enter_nesting()?;
                let operand = self.parse_unary()?;
                self.exit_nesting();
                Ok(Expr::new(ExprKind::Not(Box::new(operand)), loc))
            }
            TokenKind::Minus => {
                self.advance();
                self.enter_nesting()?;
                let operand = self.parse_unary()?;
                self.exit_nesting();
                // Negative literals stay literals
                let kind = match operand.kind {
                    ExprKind::Int(n) => ExprKind::Int(-n),
                    ExprKind::Long(n) => ExprKind::Long(-n),
                    ExprKind::Double(n) => ExprKind::Double(-n),
                    _ => ExprKind::Negate(Box::new(operand)),
                };
                Ok(Expr::new(kind, loc))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let loc = self.current_loc();
        let kind = match self.peek().kind {
            TokenKind::IntLiteral => ExprKind::Int(self.parse_int_lexeme()?),
            TokenKind::LongLiteral => ExprKind::Long(self.parse_int_lexeme()?),
            TokenKind::DoubleLiteral => {
                let value = self
                    .peek()
                    .lexeme
                    .parse::<f64>()
                    .map_err(|_| self.error("Invalid double literal"))?;
                self.advance();
                ExprKind::Double(value)
            }
            TokenKind::StringLiteral => ExprKind::Str(self.advance().lexeme.clone()),
            TokenKind::BoolLiteral => ExprKind::Bool(self.advance().lexeme == "true"),
            TokenKind::Hash => {
                self.advance();
                ExprKind::VectorSize(self.parse_variable_path()?)
            }
            TokenKind::PlusPlus => {
                self.advance();
                ExprKind::PreIncrement(self.parse_variable_path()?)
            }
            TokenKind::MinusMinus => {
                self.advance();
                ExprKind::PreDecrement(self.parse_variable_path()?)
            }
            TokenKind::LeftParen => {
                self.advance();
                self.enter_nesting()?;
                let inner = self.parse_expr()?;
                self.exit_nesting();
                self.consume(&TokenKind::RightParen, "Expected ')' after expression")?;
                return Ok(inner);
            }
            TokenKind::Ident if self.check_ident("new") => {
                self.advance();
                ExprKind::Fresh
            }
            TokenKind::Ident if self.check_ident("is_defined") => {
                self.advance();
                self.consume(&TokenKind::LeftParen, "Expected '(' after is_defined")?;
                let path = self.parse_variable_path()?;
                self.consume(&TokenKind::RightParen, "Expected ')' after is_defined")?;
                ExprKind::IsDefined(path)
            }
            TokenKind::Ident => {
                let path = self.parse_variable_path()?;
                match self.peek().kind {
                    TokenKind::PlusPlus => {
                        self.advance();
                        ExprKind::PostIncrement(path)
                    }
                    TokenKind::MinusMinus => {
                        self.advance();
                        ExprKind::PostDecrement(path)
                    }
                    _ => ExprKind::Variable(path),
                }
            }
            _ => {
                let token = self.peek();
                return Err(ParseError {
                    message: format!("Unexpected token: {}", token.kind),
                    line: token.line,
                    column: token.column,
                });
            }
        };
        Ok(Expr::new(kind, loc))
    }

    // Helper methods

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_next_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.current + 1).map(|t| &t.kind)
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            return false;
        }
        &self.peek().kind == kind
    }

    fn check_ident(&self, value: &str) -> bool {
        if self.is_at_end() {
            return false;
        }
        let token = self.peek();
        token.kind == TokenKind::Ident && token.lexeme == value
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) -> Result<&Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    fn consume_ident(&mut self, message: &str) -> Result<String, ParseError> {
        if self.peek().kind == TokenKind::Ident {
            let lexeme = self.peek().lexeme.clone();
            self.advance();
            Ok(lexeme)
        } else {
            Err(self.error(message))
        }
    }

    fn consume_ident_value(&mut self, value: &str, message: &str) -> Result<(), ParseError> {
        if self.check_ident(value) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn error(&self, message: &str) -> ParseError {
        let token = self.peek();
        ParseError {
            message: message.to_string(),
            line: token.line,
            column: token.column,
        }
    }

    fn enter_nesting(&mut self) -> Result<(), ParseError> {
        self.nesting_depth += 1;
        if self.nesting_depth > MAX_NESTING_DEPTH {
            Err(ParseError {
                message: format!("Maximum nesting depth of {} exceeded", MAX_NESTING_DEPTH),
                line: self.peek().line,
                column: self.peek().column,
            })
        } else {
            Ok(())
        }
    }

    fn exit_nesting(&mut self) {
        self.nesting_depth = self.nesting_depth.saturating_sub(1);
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let loc = lhs.loc.clone();
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        loc,
    )
}
