//! End-to-end queries over a seeded store: parse, compile, execute, and
//! check the typed rows and result counters.

use std::sync::Once;

use aql::{
    aql_grammar, DomainRegistry, Engine, EngineOptions, ItemRecord, ItemTypeValue, Query,
    SqliteStore, Value,
};
use proptest::prelude::*;
use tracing_subscriber::EnvFilter;

const JAN_2024_MILLIS: i64 = 1_704_067_200_000;
const FEB_2024_MILLIS: i64 = 1_706_745_600_000;

fn item(repo: &str, path: &str, name: &str, item_type: ItemTypeValue, depth: i64) -> ItemRecord {
    ItemRecord {
        repo: repo.to_owned(),
        path: Some(path.to_owned()),
        name: name.to_owned(),
        item_type,
        depth,
        ..ItemRecord::default()
    }
}

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aql=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

fn seeded_store() -> SqliteStore {
    init_tracing();
    let store = SqliteStore::open_in_memory().unwrap();

    let jar = store
        .insert_item(&ItemRecord {
            size: 1024,
            created: JAN_2024_MILLIS,
            created_by: Some("alice".into()),
            modified: FEB_2024_MILLIS,
            sha1: Some("da39a3ee5e6b4b0d3255bfef95601890afd80709".into()),
            ..item(
                "libs-release",
                "org/acme/app/1.0",
                "app-1.0.jar",
                ItemTypeValue::File,
                4,
            )
        })
        .unwrap();
    store
        .insert_item(&item(
            "libs-release",
            "org/acme",
            "acme",
            ItemTypeValue::Folder,
            2,
        ))
        .unwrap();
    let snapshot = store
        .insert_item(&ItemRecord {
            size: 2048,
            ..item(
                "libs-snapshot",
                "org/acme/app/1.1",
                "app-1.1-SNAPSHOT.jar",
                ItemTypeValue::File,
                4,
            )
        })
        .unwrap();

    store
        .insert_stats(jar, 250, FEB_2024_MILLIS, Some("bob"))
        .unwrap();
    store.insert_stats(snapshot, 10, 0, None).unwrap();
    store.insert_property(jar, "build.name", Some("app")).unwrap();
    let archive = store.insert_archive(jar).unwrap();
    store
        .insert_archive_entry(archive, "META-INF/MANIFEST.MF", Some("META-INF"))
        .unwrap();
    store
        .insert_archive_entry(archive, "Main.class", Some("com/acme"))
        .unwrap();
    store
}

fn engine() -> Engine {
    Engine::new(seeded_store())
}

#[test]
fn repo_filter_returns_matching_items_in_id_order() {
    let result = engine()
        .run_eager(r#"items.find({"repo":{"$eq":"libs-release"}})"#)
        .unwrap();
    assert_eq!(result.total(), 2);
    assert_eq!(result.start(), 0);
    assert_eq!(result.limited(), None);

    let rows = result.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], Value::Str("app-1.0.jar".into()));
    assert_eq!(rows[0]["type"], Value::ItemType(ItemTypeValue::File));
    assert_eq!(rows[1]["name"], Value::Str("acme".into()));
    assert_eq!(rows[1]["type"], Value::ItemType(ItemTypeValue::Folder));

    // Default projection: identity plus the default item fields.
    for key in ["id", "repo", "path", "name", "type", "size", "created", "modified"] {
        assert!(rows[0].contains_key(key), "missing default field {key}");
    }
    assert!(!rows[0].contains_key("depth"));
}

#[test]
fn type_and_depth_conjunction() {
    let result = engine()
        .run_eager(r#"items.find({"$and":[{"type":{"$eq":"file"}},{"depth":{"$gt":2}}]})"#)
        .unwrap();
    assert_eq!(result.total(), 2);
    let names: Vec<_> = result.rows().iter().map(|r| r["name"].clone()).collect();
    assert_eq!(
        names,
        vec![
            Value::Str("app-1.0.jar".into()),
            Value::Str("app-1.1-SNAPSHOT.jar".into()),
        ]
    );
}

#[test]
fn qualified_stats_criteria_join_transparently() {
    let result = engine()
        .run_eager(r#"items.find({"stats.downloads":{"$gt":100}})"#)
        .unwrap();
    assert_eq!(result.total(), 1);
    assert_eq!(result.rows()[0]["name"], Value::Str("app-1.0.jar".into()));
}

#[test]
fn multi_hop_entry_criteria_join_through_archives() {
    let result = engine()
        .run_eager(r#"items.find({"entry.name":{"$match":"META-INF*"}})"#)
        .unwrap();
    assert_eq!(result.total(), 1);
    assert_eq!(result.rows()[0]["name"], Value::Str("app-1.0.jar".into()));
}

#[test]
fn include_replaces_the_default_projection() {
    let result = engine()
        .run_eager(r#"items.find({"repo":"libs-release"}).include("name","stats.downloads")"#)
        .unwrap();
    let row = &result.rows()[0];
    let keys: Vec<_> = row.keys().map(String::as_str).collect();
    assert_eq!(keys, ["id", "name", "stats.downloads"]);
    assert_eq!(row["stats.downloads"], Value::Int(250));
}

#[test]
fn limit_and_offset_page_without_changing_total() {
    let result = engine().run_eager(r#"items.find().limit(2).offset(1)"#).unwrap();
    assert_eq!(result.total(), 3);
    assert_eq!(result.start(), 1);
    assert_eq!(result.limited(), Some(2));
    let names: Vec<_> = result.rows().iter().map(|r| r["name"].clone()).collect();
    assert_eq!(
        names,
        vec![
            Value::Str("acme".into()),
            Value::Str("app-1.1-SNAPSHOT.jar".into()),
        ]
    );
}

#[test]
fn dry_run_counts_without_materializing_rows() {
    let result = engine()
        .run_eager(r#"items.find({"repo":"libs-release"}).dryRun("true")"#)
        .unwrap();
    assert_eq!(result.total(), 2);
    assert!(result.is_empty());
}

#[test]
fn dates_render_as_iso_strings_and_zero_means_absent() {
    let result = engine()
        .run_eager(r#"items.find({"type":{"$eq":"file"}})"#)
        .unwrap();
    let rows = result.rows();
    assert_eq!(rows[0]["created"], Value::Str("2024-01-01T00:00:00Z".into()));
    // The snapshot item was stored with the zero sentinel.
    assert_eq!(rows[1]["created"], Value::Null);
}

#[test]
fn date_objects_option_changes_the_rendering_policy() {
    let engine = Engine::with_options(seeded_store(), EngineOptions::with_date_objects());
    let result = engine
        .run_eager(r#"items.find({"name":"app-1.0.jar"})"#)
        .unwrap();
    let Value::Date(dt) = &result.rows()[0]["created"] else {
        panic!("expected a date object");
    };
    assert_eq!(dt.unix_timestamp(), JAN_2024_MILLIS / 1000);
}

#[test]
fn date_criteria_accept_rfc3339_literals() {
    let result = engine()
        .run_eager(r#"items.find({"modified":{"$gte":"2024-02-01T00:00:00Z"}})"#)
        .unwrap();
    assert_eq!(result.total(), 1);
    assert_eq!(result.rows()[0]["name"], Value::Str("app-1.0.jar".into()));
}

#[test]
fn traversal_path_queries_the_leaf_domain() {
    let result = engine()
        .run_eager(r#"archives.entries.find({"archives.entry.path":{"$eq":"META-INF"}})"#)
        .unwrap();
    assert_eq!(result.total(), 1);
    assert_eq!(
        result.rows()[0]["name"],
        Value::Str("META-INF/MANIFEST.MF".into())
    );
}

#[test]
fn item_type_any_matches_files_and_folders() {
    let result = engine()
        .run_eager(r#"items.find({"type":{"$eq":"any"}})"#)
        .unwrap();
    assert_eq!(result.total(), 3);
}

#[test]
fn update_compiles_and_executes_like_find() {
    let result = engine()
        .run_eager(r#"items.update({"repo":"libs-snapshot"})"#)
        .unwrap();
    assert_eq!(result.total(), 1);
    assert_eq!(
        result.rows()[0]["name"],
        Value::Str("app-1.1-SNAPSHOT.jar".into())
    );
}

proptest! {
    // Canonical re-serialization is a fixed point: parse -> canonical ->
    // parse yields an equal query and the same canonical text.
    #[test]
    fn canonical_form_round_trips(
        repo in "[a-z][a-z0-9-]{0,11}",
        depth in 0i64..500,
        limit in 1u64..100,
        offset in 0u64..100,
        dry_run in any::<bool>(),
    ) {
        let registry = DomainRegistry::new();
        let grammar = aql_grammar(&registry);
        let mut text = format!(
            r#"items.find({{"repo":"{repo}","depth":{{"$lt":{depth}}}}}).limit({limit}).offset({offset})"#
        );
        if dry_run {
            text.push_str(r#".dryRun("true")"#);
        }
        let query = Query::parse(&text, &grammar, &registry).unwrap();
        let canonical = query.to_canonical_string();
        let reparsed = Query::parse(&canonical, &grammar, &registry).unwrap();
        prop_assert_eq!(&query, &reparsed);
        prop_assert_eq!(canonical, reparsed.to_canonical_string());
    }
}
