//! Log entry type and its canonical serialization.

use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use bytes::Bytes;
use driftlog_store::{BlockStore, Keystore, Signer};
use driftlog_types::{Clock, EntryHash};
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Current entry format version.
pub const ENTRY_VERSION: u8 = 1;

/// A single immutable entry in the log DAG.
///
/// Each entry carries an opaque payload, references its predecessor entries
/// by hash, and is optionally signed by the authoring key. Its `hash` is the
/// content address assigned by the block store; everything else is covered
/// by that digest, so any mutation invalidates the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Content address of the canonical stored form.
    pub hash: EntryHash,
    /// Identifier of the log this entry belongs to.
    pub id: String,
    /// Opaque caller-supplied payload.
    pub payload: Bytes,
    /// Predecessor entry hashes, sorted and deduplicated.
    pub next: Vec<EntryHash>,
    /// Entry format version.
    pub v: u8,
    /// Logical clock at creation time.
    pub clock: Clock,
    /// Public key identity of the signer (hex), when signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Signature over the signable form (hex), when signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

/// Signable content of an entry (excludes `hash`, `key` and `sig`).
///
/// Both signing and verification serialize exactly this shape, so the two
/// sides always agree on the covered bytes.
#[derive(Serialize)]
struct SignableRecord<'a> {
    id: &'a str,
    payload: &'a Bytes,
    next: &'a [EntryHash],
    v: u8,
    clock: &'a Clock,
}

/// Stored content of an entry (excludes only `hash`).
///
/// These are the bytes the block store digests; the returned digest becomes
/// the entry's `hash`.
#[derive(Serialize)]
struct StoredRecord<'a> {
    id: &'a str,
    payload: &'a Bytes,
    next: &'a [EntryHash],
    v: u8,
    clock: &'a Clock,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sig: Option<&'a String>,
}

/// Owned mirror of [`StoredRecord`] for decoding blocks fetched from the store.
#[derive(Deserialize)]
struct OwnedRecord {
    id: String,
    payload: Bytes,
    next: Vec<EntryHash>,
    v: u8,
    clock: Clock,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    sig: Option<String>,
}

impl Entry {
    /// Create a new entry, sign it if a signer is given, and persist it.
    ///
    /// Predecessor hashes are sorted and deduplicated so that replicas
    /// constructing "the same" entry produce identical bytes and therefore
    /// identical content addresses.
    pub async fn create(
        store: &dyn BlockStore,
        log_id: &str,
        payload: Bytes,
        predecessors: Vec<EntryHash>,
        clock: Clock,
        signer: Option<&Signer>,
    ) -> Result<Entry, LogError> {
        let mut next = predecessors;
        next.sort();
        next.dedup();

        let (key, sig) = match signer {
            Some(signer) => {
                let signable = SignableRecord {
                    id: log_id,
                    payload: &payload,
                    next: &next,
                    v: ENTRY_VERSION,
                    clock: &clock,
                };
                let bytes = serde_json::to_vec(&signable)?;
                (Some(signer.public_key()), Some(signer.sign(&bytes)))
            }
            None => (None, None),
        };

        let record = StoredRecord {
            id: log_id,
            payload: &payload,
            next: &next,
            v: ENTRY_VERSION,
            clock: &clock,
            key: key.as_ref(),
            sig: sig.as_ref(),
        };
        let bytes = serde_json::to_vec(&record)?;
        let hash = store.put(Bytes::from(bytes)).await?;

        Ok(Entry {
            hash,
            id: log_id.to_string(),
            payload,
            next,
            v: ENTRY_VERSION,
            clock,
            key,
            sig,
        })
    }

    /// Decode an entry from its stored bytes, checking the digest and the
    /// format version.
    pub fn from_stored(hash: EntryHash, bytes: &[u8]) -> Result<Entry, LogError> {
        if EntryHash::from_data(bytes) != hash {
            return Err(LogError::InvalidHash(hash));
        }

        let record: OwnedRecord = serde_json::from_slice(bytes)?;
        if record.v != ENTRY_VERSION {
            return Err(LogError::BadEntries(format!(
                "unsupported entry version {} for entry {hash}",
                record.v
            )));
        }

        Ok(Entry {
            hash,
            id: record.id,
            payload: record.payload,
            next: record.next,
            v: record.v,
            clock: record.clock,
            key: record.key,
            sig: record.sig,
        })
    }

    /// The canonical stored bytes of this entry (everything but `hash`).
    pub fn stored_bytes(&self) -> Result<Vec<u8>, LogError> {
        let record = StoredRecord {
            id: &self.id,
            payload: &self.payload,
            next: &self.next,
            v: self.v,
            clock: &self.clock,
            key: self.key.as_ref(),
            sig: self.sig.as_ref(),
        };
        Ok(serde_json::to_vec(&record)?)
    }

    /// The bytes covered by this entry's signature.
    fn signable_bytes(&self) -> Result<Vec<u8>, LogError> {
        let record = SignableRecord {
            id: &self.id,
            payload: &self.payload,
            next: &self.next,
            v: self.v,
            clock: &self.clock,
        };
        Ok(serde_json::to_vec(&record)?)
    }

    /// Verify that the stored `hash` matches the entry's content.
    pub fn verify_hash(&self) -> Result<bool, LogError> {
        Ok(EntryHash::from_data(&self.stored_bytes()?) == self.hash)
    }

    /// Verify this entry's signature through the given keystore.
    ///
    /// Fails with [`LogError::EntryMissingKey`] / [`LogError::EntryMissingSig`]
    /// when the signed fields are absent, and with
    /// [`LogError::VerificationFailed`] when the signature doesn't check out.
    pub fn verify(&self, keystore: &dyn Keystore) -> Result<(), LogError> {
        let key = self
            .key
            .as_ref()
            .ok_or(LogError::EntryMissingKey(self.hash))?;
        let sig = self
            .sig
            .as_ref()
            .ok_or(LogError::EntryMissingSig(self.hash))?;

        let bytes = self.signable_bytes()?;
        if keystore.verify(key, sig, &bytes) {
            Ok(())
        } else {
            Err(LogError::VerificationFailed(self.hash))
        }
    }

    /// Total order over entries: `(clock.time, clock.id, hash)`.
    ///
    /// Used everywhere entries must be sorted deterministically across
    /// replicas.
    pub fn compare(a: &Entry, b: &Entry) -> Ordering {
        a.clock.cmp(&b.clock).then_with(|| a.hash.cmp(&b.hash))
    }

    /// Whether `child` directly references `parent` via `next`.
    pub fn is_parent(parent: &Entry, child: &Entry) -> bool {
        child.next.contains(&parent.hash)
    }

    /// Entries in `pool` that transitively reference `entry` via `next`,
    /// sorted by [`Entry::compare`]. Used for rendering only.
    pub fn find_children<'a>(entry: &Entry, pool: &'a [Entry]) -> Vec<&'a Entry> {
        let mut found: Vec<&Entry> = Vec::new();
        let mut seen: HashSet<EntryHash> = HashSet::new();
        let mut frontier: VecDeque<EntryHash> = VecDeque::from([entry.hash]);

        while let Some(hash) = frontier.pop_front() {
            for candidate in pool {
                if candidate.next.contains(&hash) && seen.insert(candidate.hash) {
                    frontier.push_back(candidate.hash);
                    found.push(candidate);
                }
            }
        }

        found.sort_by(|a, b| Entry::compare(a, b));
        found
    }
}
