//! Streaming result behavior: windowed fetching, pagination accounting,
//! early close, and exhaustion.

use aql::{Engine, EngineOptions, ItemRecord, SqliteStore, Value};

const ROWS: u64 = 60;

fn bulk_engine(fetch_size: usize) -> Engine {
    let store = SqliteStore::open_in_memory().unwrap();
    for i in 0..ROWS {
        store
            .insert_item(&ItemRecord {
                repo: "bulk".into(),
                path: Some("data".into()),
                name: format!("file-{i:03}.bin"),
                size: i as i64,
                ..ItemRecord::default()
            })
            .unwrap();
    }
    let options = EngineOptions {
        fetch_size,
        ..EngineOptions::default()
    };
    Engine::with_options(store, options)
}

fn name_of(row: &aql::Row) -> String {
    match &row["name"] {
        Value::Str(name) => name.clone(),
        other => panic!("expected a string name, got {other:?}"),
    }
}

#[test]
fn lazy_iteration_yields_every_row_in_order() {
    // Window size deliberately not a divisor of the row count.
    let engine = bulk_engine(7);
    let lazy = engine.run_lazy("items.find()").unwrap();
    assert_eq!(lazy.total(), ROWS);

    let names: Vec<String> = lazy.map(|row| name_of(&row.unwrap())).collect();
    assert_eq!(names.len(), ROWS as usize);
    for (i, name) in names.iter().enumerate() {
        assert_eq!(name, &format!("file-{i:03}.bin"));
    }

    // Lazy and eager agree on content.
    let eager = engine.run_eager("items.find()").unwrap();
    let eager_names: Vec<String> = eager.rows().iter().map(name_of).collect();
    assert_eq!(names, eager_names);
}

#[test]
fn limit_and_offset_bound_the_stream_not_the_total() {
    let engine = bulk_engine(8);
    let lazy = engine
        .run_lazy("items.find().limit(25).offset(10)")
        .unwrap();
    assert_eq!(lazy.start(), 10);
    assert_eq!(lazy.total(), ROWS);
    assert_eq!(lazy.limited(), Some(25));

    let names: Vec<String> = lazy.map(|row| name_of(&row.unwrap())).collect();
    assert_eq!(names.len(), 25);
    assert_eq!(names[0], "file-010.bin");
    assert_eq!(names[24], "file-034.bin");
}

#[test]
fn early_close_stops_iteration_and_is_idempotent() {
    let engine = bulk_engine(7);
    let mut lazy = engine.run_lazy("items.find()").unwrap();
    for _ in 0..3 {
        lazy.next().unwrap().unwrap();
    }
    lazy.close();
    lazy.close();
    assert!(lazy.is_closed());
    assert!(lazy.next().is_none());
}

#[test]
fn close_before_first_row_is_safe() {
    let engine = bulk_engine(7);
    let mut lazy = engine.run_lazy("items.find()").unwrap();
    lazy.close();
    assert!(lazy.next().is_none());
    assert_eq!(lazy.total(), ROWS);
}

#[test]
fn exhaustion_releases_the_cursor() {
    let engine = bulk_engine(16);
    let mut lazy = engine.run_lazy("items.find().limit(5)").unwrap();
    let mut count = 0;
    for row in &mut lazy {
        row.unwrap();
        count += 1;
    }
    assert_eq!(count, 5);
    assert!(lazy.is_closed());

    // The shared handle is free for the next query.
    let again = engine.run_eager("items.find().limit(1)").unwrap();
    assert_eq!(again.len(), 1);
}

#[test]
fn dropping_a_stream_mid_flight_releases_the_cursor() {
    let engine = bulk_engine(7);
    {
        let mut lazy = engine.run_lazy("items.find()").unwrap();
        lazy.next().unwrap().unwrap();
    }
    let again = engine.run_eager("items.find().limit(1)").unwrap();
    assert_eq!(again.len(), 1);
}

#[test]
fn lazy_dry_run_is_born_closed_with_an_exact_total() {
    let engine = bulk_engine(7);
    let mut lazy = engine
        .run_lazy(r#"items.find({"size":{"$gte":30}}).dryRun("true")"#)
        .unwrap();
    assert_eq!(lazy.total(), 30);
    assert!(lazy.is_closed());
    assert!(lazy.next().is_none());
}

#[test]
fn streamed_filters_match_their_eager_counterpart() {
    let engine = bulk_engine(9);
    let text = r#"items.find({"$or":[{"size":{"$lt":5}},{"size":{"$gte":55}}]})"#;
    let lazy_names: Vec<String> = engine
        .run_lazy(text)
        .unwrap()
        .map(|row| name_of(&row.unwrap()))
        .collect();
    let eager = engine.run_eager(text).unwrap();
    assert_eq!(lazy_names.len(), 10);
    assert_eq!(eager.total(), 10);
    let eager_names: Vec<String> = eager.rows().iter().map(name_of).collect();
    assert_eq!(lazy_names, eager_names);
}
