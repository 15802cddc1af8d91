//! Error reporting across the pipeline: syntax errors with offsets,
//! structured compile errors, and the client/server error split.

use aql::{AqlError, CompileError, Engine, EngineOptions, SqliteStore};

fn engine() -> Engine {
    Engine::new(SqliteStore::open_in_memory().unwrap())
}

#[test]
fn unknown_field_names_both_domain_and_field() {
    let err = engine()
        .run_eager(r#"items.find({"bogusField":{"$eq":"x"}})"#)
        .unwrap_err();
    let AqlError::Compile(compile) = &err else {
        panic!("expected a compile error, got {err:?}");
    };
    assert_eq!(
        compile,
        &CompileError::UnknownField {
            domain: "items".into(),
            field: "bogusField".into(),
        }
    );
    assert_eq!(compile.code(), "UnknownField");
    assert!(err.is_client_error());
}

#[test]
fn truncated_query_reports_the_deepest_offset() {
    let text = r#"items.find({"repo":"libs-release""#;
    let err = engine().parse(text).unwrap_err();
    assert_eq!(err.offset, text.len());
    assert!(!err.expected.is_empty());
    assert!(err.to_string().contains(&format!("offset {}", text.len())));
}

#[test]
fn unknown_domain_fails_at_parse_time() {
    let err = engine().parse("warehouse.find()").unwrap_err();
    assert_eq!(err.offset, 0);
}

#[test]
fn ordering_operator_on_a_string_field_is_rejected() {
    let err = engine()
        .run_eager(r#"items.find({"name":{"$gt":"a"}})"#)
        .unwrap_err();
    let AqlError::Compile(compile) = &err else {
        panic!("expected a compile error, got {err:?}");
    };
    assert_eq!(compile.code(), "IllegalOperator");
    let text = compile.to_string();
    assert!(text.contains("$gt"));
    assert!(text.contains("name"));
    assert!(err.is_client_error());
}

#[test]
fn unsupported_operator_token_is_rejected() {
    let err = engine()
        .run_eager(r#"items.find({"size":{"$between":10}})"#)
        .unwrap_err();
    let AqlError::Compile(compile) = err else {
        panic!("expected a compile error");
    };
    assert_eq!(compile.code(), "IllegalOperator");
}

#[test]
fn traversal_without_a_registered_edge_is_rejected() {
    let err = engine()
        .run_eager(r#"builds.find({"stats.downloads":{"$gt":1}})"#)
        .unwrap_err();
    let AqlError::Compile(compile) = err else {
        panic!("expected a compile error");
    };
    assert_eq!(
        compile,
        CompileError::NoTraversal {
            from: "builds".into(),
            to: "stats".into(),
        }
    );
}

#[test]
fn bad_item_type_literal_is_an_illegal_value() {
    let err = engine()
        .run_eager(r#"items.find({"type":{"$eq":"zip"}})"#)
        .unwrap_err();
    let AqlError::Compile(compile) = err else {
        panic!("expected a compile error");
    };
    assert_eq!(compile.code(), "IllegalValue");
    assert!(compile.to_string().contains("zip"));
}

#[test]
fn dry_run_rejects_anything_but_true_or_false() {
    let err = engine()
        .run_eager(r#"items.find().dryRun("maybe")"#)
        .unwrap_err();
    assert!(matches!(err, AqlError::Syntax(_)));
    assert!(err.is_client_error());
}

#[test]
fn runaway_criteria_nesting_hits_the_depth_budget() {
    let options = EngineOptions {
        max_criteria_depth: 8,
        ..EngineOptions::default()
    };
    let engine = Engine::with_options(SqliteStore::open_in_memory().unwrap(), options);
    let mut text = String::from(r#"{"repo":"x"}"#);
    for _ in 0..12 {
        text = format!(r#"{{"$and":[{}]}}"#, text);
    }
    let err = engine
        .run_eager(&format!("items.find({text})"))
        .unwrap_err();
    let AqlError::Compile(compile) = err else {
        panic!("expected a compile error");
    };
    assert_eq!(compile.code(), "CriteriaTooDeep");
}

#[test]
fn pathological_nesting_is_stopped_by_the_parser_guard() {
    let mut text = String::from(r#"{"repo":"x"}"#);
    for _ in 0..200 {
        text = format!(r#"{{"$and":[{}]}}"#, text);
    }
    let err = engine().parse(&format!("items.find({text})")).unwrap_err();
    assert!(err.expected.iter().any(|e| e.contains("nesting")));
}

#[test]
fn population_errors_are_server_side() {
    let err = AqlError::from(aql::PopulationError::UnknownItemType {
        column: "items.type".into(),
        ordinal: 9,
    });
    assert!(!err.is_client_error());
    assert!(err.to_string().contains("ordinal 9"));
}
