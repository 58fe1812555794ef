//! CLI tests: argument parsing and commands against temporary databases.

use atomvault::cli::{Cli, Commands, Target, cmd_reset, cmd_show_node, cmd_status, execute};
use atomvault::config::{AppConfig, load_config};
use atomvault_core::{Atom, BackingStore, SqlStorage, StorageConfig, Value, VaultError};
use clap::Parser;
use std::path::Path;
use tempfile::TempDir;

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("atomvault.toml");
    let config = AppConfig {
        uri: Some("sqlite://clitest".to_string()),
        storage: StorageConfig {
            workers: 2,
            ..StorageConfig::in_dir(dir.path())
        },
    };
    atomvault::config::write_config(&path, &config, false).expect("write config");
    path
}

fn parse(config: &Path, args: &[&str]) -> Cli {
    let mut argv = vec![
        "atomvault".to_string(),
        "--quiet".to_string(),
        "--config".to_string(),
        config.display().to_string(),
    ];
    argv.extend(args.iter().map(|s| s.to_string()));
    Cli::try_parse_from(argv).expect("parse")
}

fn seed(dir: &TempDir) {
    let store = SqlStorage::connect("sqlite://clitest", &StorageConfig::in_dir(dir.path()))
        .expect("open");
    let cat = Atom::node("ConceptNode", "cat").expect("node");
    let key = Atom::node("PredicateNode", "weight").expect("node");
    store
        .store_value(&cat, &key, &Value::floats(vec![4.5]))
        .expect("store");
    store.barrier().expect("barrier");
}

#[test]
fn parses_show_node() {
    let cli = Cli::try_parse_from([
        "atomvault",
        "--uri",
        "sqlite://x",
        "show-node",
        "--type",
        "ConceptNode",
        "--name",
        "cat",
    ])
    .expect("parse");
    assert_eq!(cli.uri.as_deref(), Some("sqlite://x"));
    match cli.command {
        Some(Commands::ShowNode { atom_type, name }) => {
            assert_eq!(atom_type, "ConceptNode");
            assert_eq!(name, "cat");
        }
        other => unreachable!("unexpected command: {:?}", other),
    }
}

#[test]
fn target_resolves_from_config_and_flags() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(&dir);

    let target = Target::resolve(&parse(&config, &["status"])).expect("resolve");
    assert_eq!(target.descriptor.database, "clitest");
    assert_eq!(target.storage.workers, 2);

    let overridden = parse(&config, &["--uri", "sqlite3://other", "status"]);
    let target = Target::resolve(&overridden).expect("resolve");
    assert_eq!(target.descriptor.database, "other");
}

#[test]
fn bad_descriptor_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(&dir);
    let cli = parse(&config, &["--uri", "not-a-descriptor", "status"]);
    assert!(matches!(
        execute(cli),
        Err(VaultError::InvalidDescriptor(_))
    ));
}

#[test]
fn status_and_show_node_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(&dir);
    seed(&dir);

    let target = Target::resolve(&parse(&config, &["status"])).expect("resolve");
    cmd_status(&target, false).expect("status");
    cmd_status(&target, true).expect("status json");
    cmd_show_node(&target, false, "ConceptNode", "cat").expect("show");
    cmd_show_node(&target, true, "ConceptNode", "cat").expect("show json");
    cmd_show_node(&target, false, "ConceptNode", "dog").expect("missing node is not an error");
    assert!(matches!(
        cmd_show_node(&target, false, "", "cat"),
        Err(VaultError::InvalidAtom(_))
    ));
}

#[test]
fn reset_requires_force() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(&dir);
    seed(&dir);
    let target = Target::resolve(&parse(&config, &["status"])).expect("resolve");

    assert!(cmd_reset(&target, false, false).is_err());
    cmd_reset(&target, true, true).expect("reset");

    let store = SqlStorage::open(&target.descriptor, &target.storage).expect("open");
    let stats = store.stats().expect("stats");
    assert_eq!(stats.atoms, 0);
    assert_eq!(stats.valuations, 0);
}

#[test]
fn init_writes_default_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fresh.toml");

    execute(parse(&path, &["init"])).expect("init");
    let loaded = load_config(Some(&path)).expect("load").expect("present");
    assert_eq!(loaded, AppConfig::default());

    assert!(execute(parse(&path, &["init"])).is_err());
    execute(parse(&path, &["init", "--force"])).expect("forced init");
}
