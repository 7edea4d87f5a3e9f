//! Tests for the driftlog crate.

mod join_tests;

use std::sync::Arc;

use driftlog_store::{BlockStore, Ed25519Keystore, Keystore, MemoryStore, Signer};
use driftlog_types::EntryHash;

use crate::entry::Entry;
use crate::log::{Log, LogOptions};

/// Fresh in-memory block store.
fn mem_store() -> Arc<dyn BlockStore> {
    Arc::new(MemoryStore::new())
}

/// The default ed25519 keystore.
fn keystore() -> Arc<dyn Keystore> {
    Arc::new(Ed25519Keystore::new())
}

/// Deterministic signing identity from a seed.
fn test_signer(seed: u8) -> Signer {
    Signer::from_seed([seed; 32])
}

/// Unsigned log with the given id on its own store.
fn new_log(id: &str) -> Log {
    new_log_on(&mem_store(), id)
}

/// Unsigned log with the given id sharing `store`.
fn new_log_on(store: &Arc<dyn BlockStore>, id: &str) -> Log {
    Log::new(store.clone(), keystore(), LogOptions::with_id(id)).unwrap()
}

/// Signed log: own key from `seed`, explicit allowed keys (`None` = anyone).
fn signed_log_on(
    store: &Arc<dyn BlockStore>,
    id: &str,
    seed: u8,
    allowed_keys: Option<Vec<String>>,
) -> Log {
    Log::new(
        store.clone(),
        keystore(),
        LogOptions {
            id: Some(id.to_string()),
            own_key: Some(test_signer(seed)),
            allowed_keys,
            ..LogOptions::default()
        },
    )
    .unwrap()
}

/// Recompute an entry's hash after direct field surgery, so that only the
/// signature (not the content address) is inconsistent.
fn rehash(entry: &mut Entry) {
    entry.hash = EntryHash::from_data(&entry.stored_bytes().unwrap());
}
