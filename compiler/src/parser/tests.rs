/// Integration tests for the parser
use super::*;
use crate::ast::{
    Cardinality, Declaration, ExprKind, InputKind, NativeType, OperationKind, PathKind,
    PortDirection, Program, Protocol, StmtKind, TypeKind,
};
use crate::config::ExecutionMode;

fn parse(input: &str) -> Program {
    let mut parser = Parser::new(input);
    let result = parser.parse();
    if let Err(e) = &result {
        eprintln!("Parse error: {}", e);
    }
    result.unwrap()
}

#[test]
fn test_parse_complete_service() {
    let input = r#"
        type LoginRequest: void {
            .name: string
        }
        type OpMessage: void {
            .sid: string
            .payload?: undefined
        }

        interface SessionInterface {
            RequestResponse: login(LoginRequest)(OpMessage) throws InvalidUser
            OneWay: op(OpMessage), logout(OpMessage)
        }

        inputPort SessionPort {
            location: "socket://localhost:9000"
            protocol: sodep
            interfaces: SessionInterface
        }

        execution { concurrent }

        cset { sid: OpMessage.sid }

        main {
            login(req)(res) { csets.sid = new; res.sid = csets.sid };
            op(msg)
        }
    "#;

    let program = parse(input);
    assert_eq!(program.declarations.len(), 6);

    let port = program
        .declarations
        .iter()
        .find_map(|d| match d {
            Declaration::Port(port) => Some(port),
            _ => None,
        })
        .unwrap();
    assert_eq!(port.direction, PortDirection::Input);
    assert_eq!(port.operations.len(), 3);
    assert_eq!(port.protocol, Some(Protocol::Named("sodep".to_string())));
    assert!(matches!(
        port.location.as_ref().map(|l| &l.kind),
        Some(ExprKind::Str(s)) if s == "socket://localhost:9000"
    ));

    let execution = program
        .declarations
        .iter()
        .find_map(|d| match d {
            Declaration::Execution(e) => Some(e.mode),
            _ => None,
        })
        .unwrap();
    assert_eq!(execution, ExecutionMode::Concurrent);
}

#[test]
fn test_parse_operation_declarations() {
    let input = r#"
        outputPort Bank {
            location: "socket://bank:8000"
            protocol: sodep
            RequestResponse: pay(Payment)(Receipt) throws Refused(RefusalInfo) Timeout,
                             balance(void)(int)
            OneWay: audit(string)
        }
    "#;

    let program = parse(input);
    let Declaration::Port(port) = &program.declarations[0] else {
        panic!("Expected Port");
    };
    assert_eq!(port.direction, PortDirection::Output);
    assert_eq!(port.operations.len(), 3);

    match &port.operations[0].kind {
        OperationKind::RequestResponse {
            response_type,
            faults,
        } => {
            assert_eq!(port.operations[0].request_type, "Payment");
            assert_eq!(response_type, "Receipt");
            assert_eq!(faults.len(), 2);
            assert_eq!(faults[0].type_name, "RefusalInfo");
            assert_eq!(faults[1].type_name, "undefined");
        }
        other => panic!("Expected RequestResponse, got {:?}", other),
    }
    assert!(port.operations[2].is_one_way());
}

#[test]
fn test_parse_type_with_cardinalities_and_choice() {
    let input = r#"
        type Item: void {
            .tags*: string
            .count[1, 5]: int
            .note?: string
        }
        type Key: string | int
        type Alias: Item
    "#;

    let program = parse(input);
    let Declaration::Type(item) = &program.declarations[0] else {
        panic!("Expected Type");
    };
    assert_eq!(item.field("tags").unwrap().cardinality, Cardinality::ANY);
    assert_eq!(item.field("count").unwrap().cardinality, Cardinality::new(1, 5));
    assert_eq!(item.field("note").unwrap().cardinality, Cardinality::OPTIONAL);

    let Declaration::Type(key) = &program.declarations[1] else {
        panic!("Expected Type");
    };
    assert!(matches!(key.kind, TypeKind::Choice(_, _)));

    let Declaration::Type(alias) = &program.declarations[2] else {
        panic!("Expected Type");
    };
    assert_eq!(alias.kind, TypeKind::Link("Item".to_string()));
}

#[test]
fn test_parse_negative_cardinality_is_kept_for_verification() {
    let program = parse("type T: void { .x[-1, 2]: int }");
    let Declaration::Type(t) = &program.declarations[0] else {
        panic!("Expected Type");
    };
    assert_eq!(t.field("x").unwrap().cardinality.min, -1);
}

#[test]
fn test_parse_untyped_subnodes() {
    let program = parse("type Open: any { ? }");
    let Declaration::Type(t) = &program.declarations[0] else {
        panic!("Expected Type");
    };
    match &t.kind {
        TypeKind::Inline {
            native, untyped, ..
        } => {
            assert_eq!(*native, NativeType::Any);
            assert!(*untyped);
        }
        other => panic!("Expected Inline, got {:?}", other),
    }
}

#[test]
fn test_parse_correlation_set_with_aliases() {
    let input = r#"
        cset {
            sid: OpMessage.sid LogoutMessage.session.id,
            user: OpMessage.user
        }
    "#;

    let program = parse(input);
    let Declaration::CorrelationSet(cset) = &program.declarations[0] else {
        panic!("Expected CorrelationSet");
    };
    assert_eq!(cset.variables.len(), 2);
    assert_eq!(cset.variables[0].aliases.len(), 2);
    assert_eq!(cset.variables[0].aliases[1].guard_type, "LogoutMessage");
    assert_eq!(cset.variables[0].aliases[1].path.to_string(), "session.id");
    assert_eq!(cset.variables[0].qualified_path().to_string(), "csets.sid");
}

#[test]
fn test_parse_input_choice() {
    let input = r#"
        main {
            [ login(req)(res) { res = 1 } ] { x = 1 }
            [ cancel(msg) ] { nullProcess }
        }
    "#;

    let program = parse(input);
    let Declaration::Procedure(main) = &program.declarations[0] else {
        panic!("Expected Procedure");
    };
    match &main.body.kind {
        StmtKind::Choice(branches) => {
            assert_eq!(branches.len(), 2);
            assert_eq!(branches[0].guard.input_operation(), Some("login"));
            assert_eq!(branches[1].guard.input_operation(), Some("cancel"));
            assert_eq!(branches[1].body.kind, StmtKind::Null);
        }
        other => panic!("Expected Choice, got {:?}", other),
    }
}

#[test]
fn test_parse_control_flow() {
    let input = r#"
        main {
            if (x > 1) { a = 1 } else if (x == 0) { a = 2 } else { a = 3 };
            while (i < 10) { i++ };
            for (i = 0, i < 3, i++) { b = i };
            for (item in list.items) { c = item };
            foreach (k : tree) { d = k };
            scope (s) { e = 1 };
            synchronized (lock) { f = 1 };
            undef (g)
        }
    "#;

    let program = parse(input);
    let Declaration::Procedure(main) = &program.declarations[0] else {
        panic!("Expected Procedure");
    };
    let StmtKind::Sequence(children) = &main.body.kind else {
        panic!("Expected Sequence");
    };
    assert_eq!(children.len(), 8);
    assert!(matches!(
        &children[0].kind,
        StmtKind::If { branches, otherwise: Some(_) } if branches.len() == 2
    ));
    assert!(matches!(children[1].kind, StmtKind::While { .. }));
    assert!(matches!(children[2].kind, StmtKind::For { .. }));
    assert!(matches!(children[3].kind, StmtKind::ForEachItem { .. }));
    assert!(matches!(children[4].kind, StmtKind::ForEachSubNode { .. }));
    assert!(matches!(children[5].kind, StmtKind::Scope { .. }));
    assert!(matches!(children[6].kind, StmtKind::Synchronized { .. }));
    assert!(matches!(children[7].kind, StmtKind::Undef(_)));
}

#[test]
fn test_parse_path_kinds() {
    let input = "main { global.counter = 1; csets.sid = new; a.(k)[i] = 2 }";
    let program = parse(input);
    let Declaration::Procedure(main) = &program.declarations[0] else {
        panic!("Expected Procedure");
    };
    let StmtKind::Sequence(children) = &main.body.kind else {
        panic!("Expected Sequence");
    };
    let targets: Vec<_> = children
        .iter()
        .map(|s| match &s.kind {
            StmtKind::Assign { target, .. } => target,
            other => panic!("Expected Assign, got {:?}", other),
        })
        .collect();

    assert_eq!(targets[0].kind, PathKind::Global);
    assert_eq!(targets[0].to_string(), "global.counter");
    assert_eq!(targets[1].kind, PathKind::CorrelationSet);
    assert!(targets[1].is_static());
    assert_eq!(targets[2].kind, PathKind::Normal);
    assert!(!targets[2].is_static());
    assert_eq!(targets[2].to_string(), "a.<Expression>[<Expression>]");
}

#[test]
fn test_parse_services_and_imports() {
    let input = r#"
        from console import Console
        from .types import Shared

        service Gateway {
            outputPort Out { interfaces: Console }
            main { nullProcess }
        }

        service Worker(params: undefined) {
            execution: sequential
            main { nullProcess }
        }
    "#;

    let program = parse(input);
    assert_eq!(program.declarations.len(), 4);
    let Declaration::Import(import) = &program.declarations[1] else {
        panic!("Expected Import");
    };
    assert_eq!(import.module, ".types");

    let services: Vec<_> = program
        .declarations
        .iter()
        .filter_map(|d| match d {
            Declaration::Service(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(services.len(), 2);
    assert_eq!(services[0].name, "Gateway");
    assert_eq!(services[1].declarations.len(), 2);
}

#[test]
fn test_parse_request_response_without_body() {
    let program = parse("main { ping(x)(x) }");
    let Declaration::Procedure(main) = &program.declarations[0] else {
        panic!("Expected Procedure");
    };
    match &main.body.kind {
        StmtKind::Input(input) => match &input.kind {
            InputKind::RequestResponse { body, .. } => assert_eq!(body.kind, StmtKind::Null),
            other => panic!("Expected RequestResponse, got {:?}", other),
        },
        other => panic!("Expected Input, got {:?}", other),
    }
}

#[test]
fn test_parse_comments() {
    let input = r#"
        // leading comment
        main {
            /* block
               comment */
            x = 1 // trailing
        }
    "#;
    let program = parse(input);
    assert_eq!(program.declarations.len(), 1);
}

#[test]
fn test_parse_error_reports_location() {
    let err = Parser::new("main {\n  x = \n}").parse().unwrap_err();
    assert_eq!(err.line, 3);
    assert!(err.to_string().starts_with("Parse error at 3:1"));
}
