//! # Persistence Tests
//!
//! End-to-end behavior of the AtomSpace over the relational engine: round
//! trips, barrier visibility across stores, identity convergence, reset,
//! overwrite, write failures and corrupt rows.
//!
//! Every test works in its own temporary data directory.

use atomvault_core::{
    Atom, AtomSpace, BackingStore, ConnectionDescriptor, SqlStorage, StorageConfig, Value,
    VaultError,
};
use rusqlite::Connection;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

// =============================================================================
// HELPERS
// =============================================================================

const URI: &str = "sqlite://persistence";

fn open(dir: &TempDir) -> Arc<SqlStorage> {
    Arc::new(SqlStorage::connect(URI, &StorageConfig::in_dir(dir.path())).expect("open store"))
}

fn space(store: &Arc<SqlStorage>) -> AtomSpace {
    AtomSpace::with_backing(Arc::clone(store) as Arc<dyn BackingStore>)
}

fn raw_connection(dir: &TempDir) -> Connection {
    let descriptor = ConnectionDescriptor::parse(URI).expect("descriptor");
    Connection::open(descriptor.sqlite_path(dir.path())).expect("raw connection")
}

fn floats() -> Value {
    Value::floats(vec![1.14, 2.24, 3.34])
}

fn strings() -> Value {
    Value::strings(["aaa", "bb bb bb", "ccc ccc ccc"])
}

/// Two independently built, structurally equal sub-composites side by side.
fn nested_example() -> Value {
    Value::link(vec![
        Value::link(vec![floats(), strings()]),
        Value::link(vec![floats(), strings()]),
        floats(),
        strings(),
    ])
}

/// Store `value` on (atom, key) through one AtomSpace, then fetch it through
/// a fresh one.
fn round_trip(store: &Arc<SqlStorage>, atom: &Atom, key: &Atom, value: Value) -> Option<Value> {
    let mut writer = space(store);
    let a = writer.add_atom(atom).expect("add atom");
    let k = writer.add_atom(key).expect("add key");
    writer.set_value(a, k, value).expect("set");
    writer.store_atom(a).expect("store");
    writer.barrier().expect("barrier");

    let mut reader = space(store);
    let k = reader.add_atom(key).expect("add key");
    let a = reader.fetch_atom(atom).expect("fetch")?;
    reader.get_value(a, k).cloned()
}

fn concept(name: &str) -> Atom {
    Atom::node("ConceptNode", name).expect("node")
}

fn predicate(name: &str) -> Atom {
    Atom::node("PredicateNode", name).expect("node")
}

// =============================================================================
// ROUND TRIP
// =============================================================================

#[test]
fn nested_composite_round_trips_exactly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let fetched = round_trip(
        &store,
        &concept("thing"),
        &predicate("some pred key"),
        nested_example(),
    );
    assert_eq!(fetched, Some(nested_example()));
}

#[test]
fn every_variant_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let mut deep = strings();
    for depth in 0..5 {
        deep = Value::link(vec![deep, Value::floats(vec![f64::from(depth)])]);
    }

    let cases = [
        floats(),
        strings(),
        Value::Float(Vec::new()),
        Value::String(vec![String::new()]),
        Value::Link(Vec::new()),
        nested_example(),
        deep,
    ];
    for (i, value) in cases.into_iter().enumerate() {
        let key = predicate(&format!("key-{}", i));
        let fetched = round_trip(&store, &concept("variants"), &key, value.clone());
        assert_eq!(fetched, Some(value), "case {}", i);
    }
}

#[test]
fn links_round_trip_with_their_outgoing_set() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let link = Atom::link(
        "EvaluationLink",
        vec![
            predicate("likes"),
            Atom::link("ListLink", vec![concept("alice"), concept("bob"), concept("alice")])
                .expect("list"),
        ],
    )
    .expect("link");

    let fetched = round_trip(&store, &link, &predicate("truth"), floats());
    assert_eq!(fetched, Some(floats()));

    let mut reader = space(&store);
    let handle = reader.fetch_atom(&link).expect("fetch").expect("found");
    let uuid = reader.uuid(handle).expect("uuid");

    let mut by_uuid = space(&store);
    let handle = by_uuid.fetch_uuid(uuid).expect("fetch").expect("found");
    assert_eq!(by_uuid.atom(handle).expect("atom"), link);
}

// =============================================================================
// CONTENT ADDRESSING & IDENTITY
// =============================================================================

#[test]
fn add_node_twice_stores_one_atom() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let mut space = space(&store);
    let a = space.add_node("Predicate", "some pred key").expect("add");
    let b = space.add_node("Predicate", "some pred key").expect("add");
    assert_eq!(a, b);

    space.store_atom(a).expect("store");
    space.store_atom(b).expect("store");
    space.barrier().expect("barrier");
    assert_eq!(store.stats().expect("stats").atoms, 1);
}

#[test]
fn two_stores_converge_on_one_uuid() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = open(&dir);
    let second = open(&dir);
    let names: Vec<String> = (0..40).map(|i| format!("shared-{}", i)).collect();

    let handles: Vec<_> = [Arc::clone(&first), Arc::clone(&second)]
        .into_iter()
        .map(|store| {
            let names = names.clone();
            thread::spawn(move || {
                for name in &names {
                    store.store_atom(&concept(name)).expect("store");
                }
                store.barrier().expect("barrier");
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    assert_eq!(first.stats().expect("stats").atoms, names.len() as u64);
    for name in &names {
        let a = first.fetch_atom(&concept(name)).expect("fetch").expect("found");
        let b = second.fetch_atom(&concept(name)).expect("fetch").expect("found");
        assert_eq!(a.uuid, b.uuid, "{}", name);
    }
}

// =============================================================================
// BARRIER VISIBILITY
// =============================================================================

#[test]
fn barrier_makes_writes_visible_to_another_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let writer_store = open(&dir);
    let reader_store = open(&dir);

    let mut writer = space(&writer_store);
    let atom = writer.add_node("ConceptNode", "visible").expect("add");
    let key = writer.add_node("PredicateNode", "k").expect("add");
    writer.set_value(atom, key, strings()).expect("set");
    writer.store_atom(atom).expect("store");
    writer.barrier().expect("barrier");

    let mut reader = space(&reader_store);
    let fetched = reader
        .fetch_atom(&concept("visible"))
        .expect("fetch")
        .expect("found");
    let key = reader.lookup(&predicate("k")).expect("key resident");
    assert_eq!(reader.get_value(fetched, key), Some(&strings()));
}

#[test]
fn same_slot_writes_apply_in_submission_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let mut space = space(&store);
    let atom = space.add_node("ConceptNode", "counter").expect("add");
    let key = space.add_node("PredicateNode", "count").expect("add");

    for i in 0..100 {
        space
            .set_value(atom, key, Value::floats(vec![f64::from(i)]))
            .expect("set");
        space.store_value(atom, key).expect("store");
    }
    space.barrier().expect("barrier");

    let fetched = store
        .fetch_value(&concept("counter"), &predicate("count"))
        .expect("fetch");
    assert_eq!(fetched, Some(Value::floats(vec![99.0])));
    assert_eq!(store.stats().expect("stats").valuations, 1);
}

#[test]
fn writes_from_many_threads_all_land() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25 {
                    let atom = concept(&format!("t{}-{}", t, i));
                    store
                        .store_value(&atom, &predicate("k"), &Value::floats(vec![f64::from(i)]))
                        .expect("store");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }
    store.barrier().expect("barrier");

    let stats = store.stats().expect("stats");
    // 100 atoms plus the shared key.
    assert_eq!(stats.atoms, 101);
    assert_eq!(stats.valuations, 100);
}

// =============================================================================
// FETCH PATHS
// =============================================================================

#[test]
fn key_unresolved_fetch_matches_key_first_fetch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let atom = concept("subject");
    let key = predicate("never seen by the reader");

    let mut writer = space(&store);
    let a = writer.add_atom(&atom).expect("add");
    let k = writer.add_atom(&key).expect("add");
    writer.set_value(a, k, nested_example()).expect("set");
    writer.store_atom(a).expect("store");
    writer.barrier().expect("barrier");

    let mut key_first = space(&store);
    let k1 = key_first.fetch_atom(&key).expect("fetch").expect("found");
    let a1 = key_first.fetch_atom(&atom).expect("fetch").expect("found");

    let mut key_unresolved = space(&store);
    let a2 = key_unresolved.fetch_atom(&atom).expect("fetch").expect("found");
    let k2 = key_unresolved.lookup(&key).expect("key resolved on demand");

    assert_eq!(key_first.get_value(a1, k1), Some(&nested_example()));
    assert_eq!(key_unresolved.get_value(a2, k2), Some(&nested_example()));
}

#[test]
fn fetching_unknown_content_reports_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let mut space = space(&store);
    assert_eq!(space.fetch_atom(&concept("ghost")).expect("fetch"), None);
    let link = Atom::link("ListLink", vec![concept("ghost")]).expect("link");
    assert_eq!(space.fetch_atom(&link).expect("fetch"), None);
}

// =============================================================================
// OVERWRITE & RESET
// =============================================================================

#[test]
fn overwrite_leaves_no_trace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let atom = concept("overwritten");
    let key = predicate("k");

    assert_eq!(
        round_trip(&store, &atom, &key, nested_example()),
        Some(nested_example())
    );
    assert_eq!(
        round_trip(&store, &atom, &key, Value::strings(["replacement"])),
        Some(Value::strings(["replacement"]))
    );

    let stats = store.stats().expect("stats");
    assert_eq!(stats.valuations, 1);
    assert_eq!(stats.value_parts, 0);
}

#[test]
fn reset_forgets_everything_but_keeps_schema() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let atom = concept("doomed");
    let key = predicate("k");
    assert!(round_trip(&store, &atom, &key, floats()).is_some());

    store.reset().expect("reset");
    let mut space = space(&store);
    assert_eq!(space.fetch_atom(&atom).expect("fetch"), None);
    assert_eq!(space.fetch_atom(&key).expect("fetch"), None);

    assert_eq!(round_trip(&store, &atom, &key, strings()), Some(strings()));
}

#[test]
fn reset_through_another_store_reaches_every_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let atom = concept("x");
    let key = predicate("k");

    let first = open(&dir);
    first
        .store_value(&atom, &key, &Value::floats(vec![1.0]))
        .expect("store");
    first.barrier().expect("barrier");
    assert!(first.fetch_atom(&atom).expect("fetch").is_some());

    let second = open(&dir);
    second.reset().expect("reset");
    drop(second);

    assert_eq!(first.fetch_atom(&atom).expect("fetch"), None);
    assert_eq!(first.fetch_value(&atom, &key).expect("fetch"), None);
    assert_eq!(space(&first).fetch_atom(&atom).expect("fetch"), None);

    first
        .store_value(&atom, &key, &Value::floats(vec![2.0]))
        .expect("store");
    first.barrier().expect("barrier");
    drop(first);

    let third = open(&dir);
    let stored = third
        .fetch_atom(&atom)
        .expect("fetch")
        .expect("written after the reset");
    assert_eq!(stored.value(&key), Some(&Value::floats(vec![2.0])));
    let stats = third.stats().expect("stats");
    assert_eq!(stats.atoms, 2);
    assert_eq!(stats.valuations, 1);
}

#[test]
fn writes_racing_a_reset_stay_reachable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let key = predicate("k");
    for i in 0..20 {
        store
            .store_value(&concept(&format!("old{}", i)), &key, &floats())
            .expect("store");
    }

    let writer = {
        let store = Arc::clone(&store);
        let key = key.clone();
        thread::spawn(move || {
            for i in 0..50 {
                store
                    .store_value(&concept(&format!("new{}", i)), &key, &floats())
                    .expect("store");
            }
        })
    };
    store.reset().expect("reset");
    writer.join().expect("join");
    store.barrier().expect("barrier");

    // Whatever landed after the reset is complete and reachable.
    let stats = store.stats().expect("stats");
    let reachable = (0..50)
        .filter(|i| {
            store
                .fetch_value(&concept(&format!("new{}", i)), &key)
                .expect("fetch")
                .is_some()
        })
        .count() as u64;
    assert_eq!(stats.valuations, reachable);
}

// =============================================================================
// FAILURES
// =============================================================================

#[test]
fn write_failure_surfaces_at_barrier_until_cleared() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    store.store_atom(&concept("fine")).expect("store");
    store.barrier().expect("barrier");

    raw_connection(&dir)
        .execute_batch("DROP TABLE valuations;")
        .expect("drop table");

    store
        .store_value(&concept("fine"), &predicate("k"), &floats())
        .expect("accepted");
    assert!(matches!(store.barrier(), Err(VaultError::WriteFailure(_))));
    assert!(matches!(store.barrier(), Err(VaultError::WriteFailure(_))));
    assert!(store.write_failure().is_some());
    assert!(matches!(
        store.store_atom(&concept("rejected")),
        Err(VaultError::WriteFailure(_))
    ));

    assert!(store.clear_write_failure().is_some());
    raw_connection(&dir)
        .execute_batch(
            "CREATE TABLE valuations (atom INTEGER NOT NULL, key INTEGER NOT NULL, \
             kind INTEGER NOT NULL, floats BLOB NULL, strings BLOB NULL, links BLOB NULL, \
             PRIMARY KEY (atom, key));",
        )
        .expect("restore table");

    store
        .store_value(&concept("after"), &predicate("k"), &floats())
        .expect("store");
    store.barrier().expect("barrier");
    assert_eq!(
        store
            .fetch_value(&concept("after"), &predicate("k"))
            .expect("fetch"),
        Some(floats())
    );
}

#[test]
fn corrupt_value_rows_are_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    assert!(round_trip(&store, &concept("victim"), &predicate("k"), floats()).is_some());

    raw_connection(&dir)
        .execute("UPDATE valuations SET floats = x'05'", [])
        .expect("corrupt row");

    let mut space = space(&store);
    assert!(matches!(
        space.fetch_atom(&concept("victim")),
        Err(VaultError::CorruptData(_))
    ));
}

#[test]
fn closed_store_fails_fast_through_the_atomspace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open(&dir);
    let mut space = space(&store);
    let atom = space.add_node("ConceptNode", "late").expect("add");
    store.close();

    assert!(matches!(space.store_atom(atom), Err(VaultError::Connection(_))));
    assert!(matches!(space.barrier(), Err(VaultError::Connection(_))));
    // Local operations still work.
    assert!(space.add_node("ConceptNode", "still local").is_ok());
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let store = open(&dir);
        assert!(round_trip(&store, &concept("durable"), &predicate("k"), strings()).is_some());
    }
    let store = open(&dir);
    let fetched = store
        .fetch_value(&concept("durable"), &predicate("k"))
        .expect("fetch");
    assert_eq!(fetched, Some(strings()));
}
