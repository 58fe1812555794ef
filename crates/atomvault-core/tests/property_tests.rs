//! # Property-Based Tests
//!
//! Invariants over arbitrary values and atoms:
//! - arbitrary nested values survive the codec and both engines unchanged
//! - content addressing is idempotent and order-sensitive
//! - a damaged payload never decodes to a different value

use atomvault_core::{
    Atom, AtomSpace, BackingStore, MemoryStorage, SqlStorage, StorageConfig, Value, VaultError,
    decode, encode,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::sync::Arc;

// =============================================================================
// STRATEGIES
// =============================================================================

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        vec(-1.0e12f64..1.0e12, 0..6).prop_map(Value::Float),
        vec("[a-z ]{0,12}", 0..6).prop_map(Value::String),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 5, |inner| vec(inner, 0..5).prop_map(Value::Link))
}

fn node_name() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Every value decodes to itself.
    #[test]
    fn codec_preserves_values(v in value()) {
        let bytes = encode(&v).expect("encode");
        prop_assert_eq!(decode(&bytes).expect("decode"), v);
    }

    /// A truncated payload is rejected, never misread.
    #[test]
    fn truncated_payload_is_rejected(v in value(), cut in 0usize..64) {
        let bytes = encode(&v).expect("encode");
        let cut = cut.min(bytes.len() - 1);
        let result = decode(&bytes[..cut]);
        prop_assert!(matches!(result, Err(VaultError::CorruptData(_))));
    }

    /// Values stored through the in-process engine come back unchanged.
    #[test]
    fn memory_engine_round_trip(v in value(), name in node_name()) {
        let store: Arc<dyn BackingStore> = Arc::new(MemoryStorage::new());
        let mut writer = AtomSpace::with_backing(Arc::clone(&store));
        let atom = writer.add_node("ConceptNode", name.clone()).expect("add");
        let key = writer.add_node("PredicateNode", "k").expect("add");
        writer.set_value(atom, key, v.clone()).expect("set");
        writer.store_atom(atom).expect("store");
        writer.barrier().expect("barrier");

        let mut reader = AtomSpace::with_backing(store);
        let content = Atom::node("ConceptNode", name).expect("node");
        let fetched = reader.fetch_atom(&content).expect("fetch").expect("found");
        let key = reader
            .lookup(&Atom::node("PredicateNode", "k").expect("node"))
            .expect("key");
        prop_assert_eq!(reader.get_value(fetched, key), Some(&v));
    }

    /// Inserting the same node any number of times yields one handle.
    #[test]
    fn node_insertion_is_idempotent(names in vec(node_name(), 1..30)) {
        let mut space = AtomSpace::new();
        let first: Vec<_> = names
            .iter()
            .map(|n| space.add_node("ConceptNode", n.clone()).expect("add"))
            .collect();
        let len = space.len();
        let second: Vec<_> = names
            .iter()
            .map(|n| space.add_node("ConceptNode", n.clone()).expect("add"))
            .collect();
        prop_assert_eq!(first, second);
        prop_assert_eq!(space.len(), len);
    }

    /// Links over the same outgoing sequence share a handle; reordering
    /// the sequence yields a different link.
    #[test]
    fn link_identity_follows_outgoing_order(a in node_name(), b in node_name()) {
        prop_assume!(a != b);
        let mut space = AtomSpace::new();
        let ha = space.add_node("ConceptNode", a).expect("add");
        let hb = space.add_node("ConceptNode", b).expect("add");
        let ab = space.add_link("ListLink", &[ha, hb]).expect("link");
        prop_assert_eq!(space.add_link("ListLink", &[ha, hb]).expect("link"), ab);
        prop_assert_ne!(space.add_link("ListLink", &[hb, ha]).expect("link"), ab);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Values stored through the relational engine come back unchanged.
    #[test]
    fn relational_engine_round_trip(values in vec(value(), 1..4)) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StorageConfig {
            workers: 2,
            ..StorageConfig::in_dir(dir.path())
        };
        let store: Arc<dyn BackingStore> =
            Arc::new(SqlStorage::connect("sqlite://props", &config).expect("open"));
        let atom = Atom::node("ConceptNode", "subject").expect("node");

        for (i, v) in values.iter().enumerate() {
            let key = Atom::node("PredicateNode", format!("k{}", i)).expect("node");
            store.store_value(&atom, &key, v).expect("store");
        }
        store.barrier().expect("barrier");

        let stored = store.fetch_atom(&atom).expect("fetch").expect("found");
        prop_assert_eq!(stored.values.len(), values.len());
        for (i, v) in values.iter().enumerate() {
            let key = Atom::node("PredicateNode", format!("k{}", i)).expect("node");
            prop_assert_eq!(stored.value(&key), Some(v));
        }
    }
}
