//! End-to-end correlation safety scenarios
//!
//! Each test parses a complete program and runs verification followed by
//! session type checking through `check_program`.

use olc::parser::Parser;
use olc::{Analysis, CodeCheckError, DiagnosticKind, ExecutionMode, VerifierConfig, check_program};

const DECLARATIONS: &str = r#"
    type StartRequest: void { .user: string }
    type MsgA: void { .id: string .value?: int }

    inputPort Sessions {
        location: "socket://localhost:9000"
        protocol: sodep
        RequestResponse: start(StartRequest)(string), login(StartRequest)(string)
        OneWay: receiveUpdate(MsgA), a(StartRequest), b(StartRequest)
    }

    cset { id: MsgA.id }
"#;

fn concurrent(main: &str) -> String {
    format!("{DECLARATIONS}\nexecution {{ concurrent }}\n{main}")
}

fn single(main: &str) -> String {
    format!("{DECLARATIONS}\n{main}")
}

fn run_with(source: &str, config: &VerifierConfig) -> Result<Analysis, CodeCheckError> {
    let program = Parser::new_with_filename(source, "scenario.ol")
        .parse()
        .unwrap_or_else(|e| panic!("{}", e));
    check_program(&program, config)
}

fn run(source: &str) -> Result<Analysis, CodeCheckError> {
    run_with(source, &VerifierConfig::default())
}

fn rejected(source: &str) -> CodeCheckError {
    match run(source) {
        Ok(_) => panic!("expected the program to be rejected"),
        Err(e) => e,
    }
}

const SCENARIO_A: &str = r#"
    main {
        start(req)(res) {
            csets.id = new;
            res = csets.id;
            receiveUpdate(upd)
        }
    }
"#;

#[test]
fn scenario_a_fresh_key_at_starter_is_accepted() {
    let analysis = run(&concurrent(SCENARIO_A)).unwrap_or_else(|e| panic!("{}", e));
    assert_eq!(analysis.execution_mode, ExecutionMode::Concurrent);

    let info = &analysis.correlation_function_info;
    let pairs = info.operation_correlation_pairs("receiveUpdate");
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].variable_path.to_string(), "csets.id");
    assert_eq!(pairs[0].alias_path.to_string(), "id");
    assert!(info.operation_correlation_set("start").is_none());
}

#[test]
fn scenario_b_arithmetic_key_is_rejected() {
    let source = concurrent(
        r#"
        main {
            start(req)(res) {
                csets.id = req.value + 1;
                receiveUpdate(upd)
            }
        }
        "#,
    );
    let err = rejected(&source);
    let invalid = err
        .diagnostics
        .iter()
        .find(|d| d.message.contains("must either be initialised with new"))
        .expect("invalid correlation value reported");
    assert_eq!(invalid.kind, DiagnosticKind::SessionSafety);
    assert!(invalid.loc.to_string().starts_with("scenario.ol:"));
}

#[test]
fn scenario_c_key_assigned_in_for_loop_is_rejected() {
    let source = concurrent(
        r#"
        main {
            start(req)(res) { csets.id = new };
            for (i = 0, i < 3, i++) { csets.id = i }
        }
        "#,
    );
    let err = rejected(&source);
    assert!(err.mentions("Initialising correlation variables in loops is forbidden."));
}

#[test]
fn loop_key_copied_from_foreach_variable_is_rejected() {
    let source = concurrent(
        r#"
        main {
            start(req)(res) { csets.id = new };
            foreach (k : req) { csets.id = k };
            for (item in req.user) { csets.id = item }
        }
        "#,
    );
    let err = rejected(&source);
    let loops = err
        .diagnostics
        .iter()
        .filter(|d| d.message == "Initialising correlation variables in loops is forbidden.")
        .count();
    assert_eq!(loops, 2);
    assert!(!err.mentions("may be undefined"));
}

#[test]
fn scenario_d_branch_without_key_is_rejected() {
    let source = single(
        r#"
        main {
            [ a(x) ] { csets.id = new }
            [ b(y) ] { nullProcess }
        }
        "#,
    );
    let err = rejected(&source);
    assert!(err.mentions("Correlation variables must be initialized in every branch."));
}

#[test]
fn identical_branch_keys_are_accepted() {
    let source = single(
        r#"
        main {
            [ a(x) ] { csets.id = new }
            [ b(y) ] { csets.id = new }
        }
        "#,
    );
    assert!(run(&source).is_ok());
}

#[test]
fn checking_is_deterministic() {
    let source = concurrent(SCENARIO_A);
    assert!(run(&source).is_ok());
    assert!(run(&source).is_ok());

    let program = Parser::new(&source).parse().unwrap();
    let config = VerifierConfig::default();
    let first = check_program(&program, &config).unwrap();
    let second = check_program(&program, &config).unwrap();
    assert_eq!(
        first.correlation_function_info.correlation_sets().len(),
        second.correlation_function_info.correlation_sets().len()
    );

    let failing = single("main { csets.id = new; csets.id = new }");
    let first = rejected(&failing).diagnostics.len();
    let second = rejected(&failing).diagnostics.len();
    assert_eq!(first, second);
}

#[test]
fn set_without_fresh_value_is_rejected() {
    let err = rejected(&single("main { csets.id = 1 }"));
    assert!(err.mentions("Every correlation set must have at least one fresh value"));

    let err = rejected(&single("main { x = 1 }"));
    assert!(err.mentions("Every correlation set must have at least one fresh value"));
}

#[test]
fn duplicate_key_in_sequence_is_rejected() {
    let err = rejected(&single("main { csets.id = new; csets.id = new }"));
    assert!(err.mentions("Correlation variables can not be defined more than one time."));
}

#[test]
fn nested_loop_provide_is_rejected() {
    let source = single(
        r#"
        main {
            csets.id = new;
            for (i = 0, i < 3, i++) {
                while (c) {
                    if (c) { csets.id = 1 } else { csets.id = 2 }
                }
            }
        }
        "#,
    );
    assert!(rejected(&source).mentions("Initialising correlation variables in loops is forbidden."));
}

#[test]
fn conditional_without_else_is_rejected() {
    let err = rejected(&single("main { if (c) { csets.id = new } }"));
    assert!(err.mentions("Correlation variables must be initialized in every if-then-else branch."));
}

#[test]
fn operation_without_key_is_rejected() {
    let source = concurrent(
        r#"
        main {
            start(req)(res) { csets.id = new };
            a(x)
        }
        "#,
    );
    let err = rejected(&source);
    let missing = err
        .diagnostics
        .iter()
        .find(|d| d.message == "No correlation set defined for operation a")
        .expect("missing correlation set reported");
    assert_eq!(missing.kind, DiagnosticKind::CorrelationCoverage);
}

#[test]
fn key_needed_before_session_start_is_rejected() {
    let source = concurrent(
        r#"
        main {
            a(x);
            receiveUpdate(upd);
            csets.id = new
        }
        "#,
    );
    let err = rejected(&source);
    assert!(err.mentions("Correlation path csets.id is not initialised before usage."));
}

#[test]
fn forward_and_undefined_calls() {
    let err = rejected(&single("main { later } define later { csets.id = new }"));
    assert!(err.mentions("Can not find definition later"));

    let err = rejected(&single("main { missing; csets.id = new }"));
    assert!(err.mentions("Call to undefined definition: missing"));

    assert!(run(&single("define mint { csets.id = new } main { mint }")).is_ok());
}

#[test]
fn missing_main_is_reported_unless_disabled() {
    let err = rejected("type T: void");
    assert!(err.mentions("Main procedure is not defined"));

    let program = Parser::new("type T: void").parse().unwrap();
    let config = VerifierConfig::new().with_check_for_main(false);
    let err = check_program(&program, &config).unwrap_err();
    assert!(err.mentions("Cannot find the main entry point"));
}

#[test]
fn execution_target_selects_service() {
    let source = format!(
        r#"
        service Broken {{
            {DECLARATIONS}
            main {{ csets.id = 1 }}
        }}
        service Good {{
            {DECLARATIONS}
            main {{ csets.id = new }}
        }}
        "#
    );

    let err = rejected(&source);
    assert!(err.mentions("Execution service is not defined from command line argument"));

    let good = VerifierConfig::new().with_execution_target("Good");
    assert!(run_with(&source, &good).is_ok());

    let broken = VerifierConfig::new().with_execution_target("Broken");
    let err = run_with(&source, &broken).unwrap_err();
    assert!(err.mentions("at least one fresh value"));
}

#[test]
fn starter_reused_inside_another_session_is_rejected() {
    let source = concurrent(
        r#"
        main {
            [ login(req)(res) { csets.id = new; receiveUpdate(m) } ] { nullProcess }
            [ receiveUpdate(m) ] { nullProcess }
        }
        "#,
    );
    let err = rejected(&source);
    assert!(err.mentions(
        "Operation receiveUpdate can not be used both as a starter and in the body of another session branch."
    ));
}

#[test]
fn starter_choice_branches_may_start_different_sessions() {
    let source = concurrent(
        r#"
        main {
            [ login(req)(res) { csets.id = new } ] { receiveUpdate(m) }
            [ start(req)(res) { csets.id = new } ] { nullProcess }
        }
        "#,
    );
    assert!(run(&source).is_ok());
}
