//! # Relational Storage
//!
//! A `BackingStore` over SQLite.
//!
//! ## Threads and Connections
//!
//! `SqlStorage::open` starts `workers` writer threads, each owning its own
//! connection, plus one reader connection shared behind a mutex for fetches
//! and maintenance. The database runs in WAL mode so the reader sees
//! committed data without blocking writers.
//!
//! ## Writes
//!
//! `store_atom` and `store_value` only enqueue. A worker applies each item in
//! one `BEGIN IMMEDIATE` transaction: read the reset generation, claim UUIDs
//! for the atoms involved, rewrite the value rows, commit, then publish the
//! UUIDs it learned to the identity cache. A failed item puts the queue into
//! failed state; the next [`barrier`](crate::BackingStore::barrier) reports
//! it.
//!
//! ## Resets
//!
//! `reset` deletes every row and bumps the reset generation in one
//! transaction. Cached identities from an older generation are never used,
//! so a reset through any store, in any process, is picked up by every other
//! store at its next transaction.

mod identity;
mod queue;
mod schema;
mod values;

use crate::backing::{BackingStore, StoredAtom};
use crate::config::{ConnectionDescriptor, Driver, StorageConfig};
use crate::storage::StoreStats;
use crate::{Atom, AtomUuid, Value, VaultError};
use identity::{CacheView, IdentityCache, Learned};
use parking_lot::Mutex;
use queue::{Job, WriteOp, WriteQueue};
use rusqlite::{Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// rusqlite errors outside the write path are connection failures.
fn db_err(e: rusqlite::Error) -> VaultError {
    VaultError::Connection(e.to_string())
}

/// State shared with the writer threads.
#[derive(Debug)]
struct Shared {
    queue: WriteQueue,
    cache: IdentityCache,
}

/// Relational backing store.
pub struct SqlStorage {
    descriptor: ConnectionDescriptor,
    path: PathBuf,
    shared: Arc<Shared>,
    reader: Mutex<Connection>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    connected: AtomicBool,
}

impl std::fmt::Debug for SqlStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlStorage")
            .field("descriptor", &self.descriptor)
            .field("path", &self.path)
            .field("connected", &self.connected())
            .field("pending_writes", &self.shared.queue.depth())
            .finish_non_exhaustive()
    }
}

impl SqlStorage {
    /// Parse a descriptor string and open the store.
    pub fn connect(uri: &str, config: &StorageConfig) -> Result<Self, VaultError> {
        Self::open(&ConnectionDescriptor::parse(uri)?, config)
    }

    /// Open (creating if needed) the database a descriptor names, apply the
    /// schema and start the writer threads.
    pub fn open(descriptor: &ConnectionDescriptor, config: &StorageConfig) -> Result<Self, VaultError> {
        config.validate()?;
        let path = match descriptor.driver()? {
            Driver::Sqlite => descriptor.sqlite_path(&config.data_dir),
        };
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            VaultError::Connection(format!("{}: {}", config.data_dir.display(), e))
        })?;

        let reader = schema::open_connection(&path, config)?;
        schema::initialize(&reader)?;

        let writers = (0..config.workers)
            .map(|_| schema::open_connection(&path, config))
            .collect::<Result<Vec<_>, _>>()?;

        let store = Self {
            descriptor: descriptor.clone(),
            path,
            shared: Arc::new(Shared {
                queue: WriteQueue::new(config.queue_capacity),
                cache: IdentityCache::default(),
            }),
            reader: Mutex::new(reader),
            workers: Mutex::new(Vec::with_capacity(config.workers)),
            connected: AtomicBool::new(true),
        };

        for (index, conn) in writers.into_iter().enumerate() {
            let shared = Arc::clone(&store.shared);
            let handle = thread::Builder::new()
                .name(format!("atomvault-writer-{}", index))
                .spawn(move || run_worker(conn, &shared))
                .map_err(|e| VaultError::Connection(format!("cannot start writer: {}", e)))?;
            store.workers.lock().push(handle);
        }

        tracing::info!(
            descriptor = %store.descriptor,
            path = %store.path.display(),
            workers = config.workers,
            "storage opened"
        );
        Ok(store)
    }

    /// The descriptor this store was opened with.
    #[must_use]
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// The database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes accepted but not yet applied.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.shared.queue.depth()
    }

    /// The recorded write failure, if the queue is in failed state.
    #[must_use]
    pub fn write_failure(&self) -> Option<String> {
        self.shared.queue.failure()
    }

    /// Leave failed state, returning the recorded failure.
    pub fn clear_write_failure(&self) -> Option<String> {
        let failure = self.shared.queue.clear_failure();
        if let Some(failure) = &failure {
            tracing::warn!(failure = %failure, "write failure cleared");
        }
        failure
    }

    /// Delete every atom and value. Waits for queued writes first.
    ///
    /// Tables stay in place and UUIDs are not reused. Writes accepted while
    /// the reset runs are applied after it.
    pub fn reset(&self) -> Result<(), VaultError> {
        self.ensure_connected()?;
        // Writers stay idle until the cache has moved past the reset.
        let _paused = self.shared.queue.pause();

        let mut conn = self.reader.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        tx.execute_batch("DELETE FROM valuations; DELETE FROM value_parts; DELETE FROM atoms;")
            .map_err(db_err)?;
        let generation = schema::bump_generation(&tx)?;
        tx.commit().map_err(db_err)?;

        let cached = self.shared.cache.len();
        self.shared.cache.advance(generation);
        tracing::info!(descriptor = %self.descriptor, generation, cached, "storage reset");
        Ok(())
    }

    /// Row counts per table.
    pub fn stats(&self) -> Result<StoreStats, VaultError> {
        self.ensure_connected()?;
        let conn = self.reader.lock();
        let count = |table: &str| -> Result<u64, VaultError> {
            let n: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })
                .map_err(db_err)?;
            Ok(n as u64)
        };
        Ok(StoreStats {
            atoms: count("atoms")?,
            valuations: count("valuations")?,
            value_parts: count("value_parts")?,
        })
    }

    /// Apply every queued write, stop the writer threads and disconnect.
    ///
    /// Idempotent. Every later operation fails with `Connection`.
    pub fn close(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.queue.drain();
        self.shared.queue.shutdown();
        for handle in self.workers.lock().drain(..) {
            if handle.join().is_err() {
                tracing::warn!("writer thread panicked");
            }
        }
        if let Some(failure) = self.shared.queue.failure() {
            tracing::warn!(failure = %failure, "closing with unreported write failure");
        }
        tracing::info!(descriptor = %self.descriptor, "storage closed");
    }

    fn ensure_connected(&self) -> Result<(), VaultError> {
        if self.connected() {
            Ok(())
        } else {
            Err(VaultError::Connection(format!(
                "{} is closed",
                self.descriptor
            )))
        }
    }

    /// Run `f` inside one read transaction on the reader connection and
    /// publish whatever identities it learned.
    fn read<T>(
        &self,
        f: impl FnOnce(&Connection, &CacheView<'_>, &mut Learned) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        self.ensure_connected()?;
        let mut conn = self.reader.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let cache = self.shared.cache.view(schema::generation(&tx)?);
        let mut learned = Learned::new();
        let out = f(&tx, &cache, &mut learned)?;
        tx.commit().map_err(db_err)?;
        self.shared.cache.publish(cache.generation(), learned);
        Ok(out)
    }

    fn materialize(
        &self,
        conn: &Connection,
        cache: &CacheView<'_>,
        uuid: AtomUuid,
        atom: Atom,
        learned: &mut Learned,
    ) -> Result<StoredAtom, VaultError> {
        let mut stored = Vec::new();
        for (key_uuid, value) in values::read_values(conn, uuid)? {
            let key = identity::find_atom(conn, cache, key_uuid, learned)?
                .ok_or_else(|| {
                    VaultError::CorruptData(format!("value key {} has no atom", key_uuid))
                })?;
            stored.push((key, value));
        }
        Ok(StoredAtom {
            uuid,
            atom,
            values: stored,
        })
    }
}

impl Drop for SqlStorage {
    fn drop(&mut self) {
        self.close();
    }
}

impl BackingStore for SqlStorage {
    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn store_atom(&self, atom: &Atom) -> Result<(), VaultError> {
        self.ensure_connected()?;
        self.shared.queue.push(WriteOp::Atom(atom.clone()))?;
        Ok(())
    }

    fn store_value(&self, atom: &Atom, key: &Atom, value: &Value) -> Result<(), VaultError> {
        self.ensure_connected()?;
        self.shared.queue.push(WriteOp::Value {
            atom: atom.clone(),
            key: key.clone(),
            value: value.clone(),
        })?;
        Ok(())
    }

    fn fetch_atom(&self, atom: &Atom) -> Result<Option<StoredAtom>, VaultError> {
        self.read(|conn, cache, learned| {
            match identity::find_uuid(conn, cache, atom, learned)? {
                Some(uuid) => self
                    .materialize(conn, cache, uuid, atom.clone(), learned)
                    .map(Some),
                None => Ok(None),
            }
        })
    }

    fn fetch_atom_by_uuid(&self, uuid: AtomUuid) -> Result<Option<StoredAtom>, VaultError> {
        self.read(|conn, cache, learned| {
            match identity::find_atom(conn, cache, uuid, learned)? {
                Some(atom) => self.materialize(conn, cache, uuid, atom, learned).map(Some),
                None => Ok(None),
            }
        })
    }

    fn fetch_value(&self, atom: &Atom, key: &Atom) -> Result<Option<Value>, VaultError> {
        self.read(|conn, cache, learned| {
            let (Some(atom), Some(key)) = (
                identity::find_uuid(conn, cache, atom, learned)?,
                identity::find_uuid(conn, cache, key, learned)?,
            ) else {
                return Ok(None);
            };
            values::read_value(conn, atom, key)
        })
    }

    fn barrier(&self) -> Result<(), VaultError> {
        self.ensure_connected()?;
        self.shared.queue.barrier()
    }
}

// =============================================================================
// WRITER THREADS
// =============================================================================

fn run_worker(mut conn: Connection, shared: &Shared) {
    while let Some(job) = shared.queue.take() {
        let result = apply(&mut conn, &shared.cache, &job);
        shared.queue.complete(&job, result);
    }
    tracing::debug!("writer stopped");
}

/// Apply one queued write in its own transaction.
fn apply(conn: &mut Connection, cache: &IdentityCache, job: &Job) -> Result<(), VaultError> {
    let write_err = |e: VaultError| VaultError::WriteFailure(e.to_string());
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| write_err(db_err(e)))?;
    let generation = schema::generation(&tx).map_err(write_err)?;
    let view = cache.view(generation);
    let mut learned = Learned::new();
    match &job.op {
        WriteOp::Atom(atom) => {
            identity::claim_uuid(&tx, &view, atom, &mut learned).map_err(write_err)?;
        }
        WriteOp::Value { atom, key, value } => {
            let atom = identity::claim_uuid(&tx, &view, atom, &mut learned).map_err(write_err)?;
            let key = identity::claim_uuid(&tx, &view, key, &mut learned).map_err(write_err)?;
            values::write_value(&tx, atom, key, value).map_err(write_err)?;
        }
    }
    tx.commit().map_err(|e| write_err(db_err(e)))?;
    tracing::debug!(seq = job.seq, slot = %job.slot, learned = learned.len(), "write applied");
    cache.publish(generation, learned);
    Ok(())
}
