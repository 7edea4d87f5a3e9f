//! Core log implementation — an append-only G-Set CRDT over a Merkle DAG.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use driftlog_store::{BlockStore, Keystore, Signer};
use driftlog_types::{hex, Clock, EntryHash};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entry::Entry;
use crate::error::LogError;
use crate::io::{self, RecoveredLog, RootRecord};

/// Sentinel key identity meaning "any signer may append".
pub const ALLOW_ANY: &str = "*";

/// Construction inputs for a [`Log`]. Everything is optional; missing
/// pieces are derived (random id, computed heads, zeroed clock) or
/// defaulted (`allowed_keys` to [`ALLOW_ANY`]).
#[derive(Default)]
pub struct LogOptions {
    /// Log identifier. Generated randomly when absent.
    pub id: Option<String>,
    /// Initial entry set, e.g. recovered from storage.
    pub entries: Vec<Entry>,
    /// Head hashes. Computed from `entries` when absent.
    pub heads: Option<Vec<EntryHash>>,
    /// Initial clock. The id is always overridden by the signing identity
    /// (or the log id in unsigned mode).
    pub clock: Option<Clock>,
    /// Local signing identity. Unset means unsigned mode.
    pub own_key: Option<Signer>,
    /// Key identities permitted to append. `None` defaults to `["*"]`;
    /// an explicitly empty list means nobody may append.
    pub allowed_keys: Option<Vec<String>>,
}

impl LogOptions {
    /// Options with just an identifier set.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// Minimal root-pointer snapshot of a log: its id and head hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogJson {
    /// Log identifier.
    pub id: String,
    /// Current head hashes.
    pub heads: Vec<EntryHash>,
}

/// Full materialization of a log's contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSnapshot {
    /// Log identifier.
    pub id: String,
    /// Current head entries.
    pub heads: Vec<Entry>,
    /// All entries, sorted by [`Entry::compare`].
    pub values: Vec<Entry>,
}

/// An append-only, eventually-consistent log.
///
/// The log is a grow-only set of content-addressed entries forming a DAG:
/// each appended entry references the heads it observed, and independent
/// replicas converge by exchanging entries through [`join`](Log::join).
/// A Lamport `(id, time)` clock gives the converged set a deterministic
/// total order on every replica.
///
/// The `entries` map is the authoritative container; `heads` is a derived
/// index of hashes into it. Cloning a log forks an independent replica
/// view sharing the same store and keystore.
#[derive(Clone)]
pub struct Log {
    store: Arc<dyn BlockStore>,
    keystore: Arc<dyn Keystore>,
    id: String,
    entries: HashMap<EntryHash, Entry>,
    heads: Vec<EntryHash>,
    clock: Clock,
    own_key: Option<Signer>,
    allowed_keys: BTreeSet<String>,
}

impl Log {
    /// Create a log from the given options.
    ///
    /// # Errors
    ///
    /// Fails with [`LogError::InvalidHash`] when an entry's digest doesn't
    /// match its content, [`LogError::BadEntries`] when predecessor clocks
    /// are not strictly smaller than their referents, and
    /// [`LogError::BadHeads`] when a supplied head is not in the entry set.
    pub fn new(
        store: Arc<dyn BlockStore>,
        keystore: Arc<dyn Keystore>,
        options: LogOptions,
    ) -> Result<Self, LogError> {
        let id = options.id.unwrap_or_else(random_id);

        let mut entries: HashMap<EntryHash, Entry> = HashMap::with_capacity(options.entries.len());
        for entry in options.entries {
            if !entry.verify_hash()? {
                return Err(LogError::InvalidHash(entry.hash));
            }
            entries.insert(entry.hash, entry);
        }

        // Internal edges must point strictly backwards in time; content
        // addressing makes cycles impossible, this catches corrupt inputs.
        for entry in entries.values() {
            for next in &entry.next {
                if let Some(pred) = entries.get(next) {
                    if pred.clock.time >= entry.clock.time {
                        return Err(LogError::BadEntries(format!(
                            "entry {} references predecessor {} with a later clock",
                            entry.hash, next
                        )));
                    }
                }
            }
        }

        let heads = match options.heads {
            Some(heads) => {
                for head in &heads {
                    if !entries.contains_key(head) {
                        return Err(LogError::BadHeads(format!(
                            "head {head} is not in the entry set"
                        )));
                    }
                }
                heads
            }
            None => Self::find_heads(entries.values()),
        };

        let clock_id = match &options.own_key {
            Some(own_key) => own_key.public_key(),
            None => id.clone(),
        };
        let head_time = heads
            .iter()
            .filter_map(|h| entries.get(h))
            .map(|e| e.clock.time)
            .max()
            .unwrap_or(0);
        let given_time = options.clock.map(|c| c.time).unwrap_or(0);
        let clock = Clock::with_time(clock_id, given_time.max(head_time));

        let allowed_keys: BTreeSet<String> = match options.allowed_keys {
            Some(keys) => keys.into_iter().collect(),
            None => BTreeSet::from([ALLOW_ANY.to_string()]),
        };

        Ok(Self {
            store,
            keystore,
            id,
            entries,
            heads,
            clock,
            own_key: options.own_key,
            allowed_keys,
        })
    }

    /// Create a log from contents recovered by the [`io`] module.
    pub fn from_recovered(
        store: Arc<dyn BlockStore>,
        keystore: Arc<dyn Keystore>,
        recovered: RecoveredLog,
        own_key: Option<Signer>,
        allowed_keys: Option<Vec<String>>,
    ) -> Result<Self, LogError> {
        Self::new(
            store,
            keystore,
            LogOptions {
                id: Some(recovered.id),
                entries: recovered.entries,
                heads: Some(recovered.heads),
                clock: Some(recovered.clock),
                own_key,
                allowed_keys,
            },
        )
    }

    // ----- Accessors -----

    /// The log identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The log's current clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Number of entries in the log.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, sorted ascending by [`Entry::compare`] (oldest first).
    pub fn values(&self) -> Vec<Entry> {
        let mut values: Vec<Entry> = self.entries.values().cloned().collect();
        values.sort_by(Entry::compare);
        values
    }

    /// Look up an entry by hash.
    pub fn get(&self, hash: &EntryHash) -> Option<&Entry> {
        self.entries.get(hash)
    }

    /// Whether the log contains an entry with the given hash.
    pub fn has(&self, hash: &EntryHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Current head entries, in head order.
    pub fn heads(&self) -> Vec<Entry> {
        self.heads
            .iter()
            .filter_map(|h| self.entries.get(h))
            .cloned()
            .collect()
    }

    /// Current head hashes.
    pub fn head_hashes(&self) -> &[EntryHash] {
        &self.heads
    }

    /// Entries whose predecessors are not all present (or that have none),
    /// sorted by [`Entry::compare`].
    pub fn tails(&self) -> Vec<Entry> {
        Self::find_tails(self.entries.values())
    }

    /// The unresolved predecessor hashes — what must be fetched to close
    /// the graph.
    pub fn tail_hashes(&self) -> Vec<EntryHash> {
        Self::find_tail_hashes(self.entries.values())
    }

    // ----- Head / tail computation -----

    /// Entries not referenced by any other entry's `next`, sorted by clock
    /// id (hash as tiebreak) for deterministic serialization.
    pub fn find_heads<'a>(
        entries: impl IntoIterator<Item = &'a Entry> + Clone,
    ) -> Vec<EntryHash> {
        let referenced: HashSet<EntryHash> = entries
            .clone()
            .into_iter()
            .flat_map(|e| e.next.iter().copied())
            .collect();

        let mut heads: Vec<&Entry> = entries
            .into_iter()
            .filter(|e| !referenced.contains(&e.hash))
            .collect();
        heads.sort_by(|a, b| {
            a.clock
                .id
                .cmp(&b.clock.id)
                .then_with(|| a.hash.cmp(&b.hash))
        });
        heads.iter().map(|e| e.hash).collect()
    }

    /// Entries that reference a hash outside the set, or have no
    /// predecessors at all. Sorted by [`Entry::compare`].
    pub fn find_tails<'a>(entries: impl IntoIterator<Item = &'a Entry> + Clone) -> Vec<Entry> {
        let present: HashSet<EntryHash> = entries.clone().into_iter().map(|e| e.hash).collect();

        let mut tails: Vec<Entry> = entries
            .into_iter()
            .filter(|e| e.next.is_empty() || e.next.iter().any(|n| !present.contains(n)))
            .cloned()
            .collect();
        tails.sort_by(Entry::compare);
        tails
    }

    /// The referenced-but-absent hashes themselves.
    pub fn find_tail_hashes<'a>(
        entries: impl IntoIterator<Item = &'a Entry> + Clone,
    ) -> Vec<EntryHash> {
        let present: HashSet<EntryHash> = entries.clone().into_iter().map(|e| e.hash).collect();

        let mut hashes: Vec<EntryHash> = entries
            .into_iter()
            .flat_map(|e| e.next.iter().copied())
            .filter(|n| !present.contains(n))
            .collect();
        hashes.sort();
        hashes.dedup();
        hashes
    }

    // ----- Append -----

    /// Append a payload to the log. Returns the new entry.
    ///
    /// The new entry references every current head, advances the clock
    /// strictly by one above everything observed, and becomes the sole
    /// head. With a signing key configured the entry is signed and the
    /// allowed-key set is enforced first.
    ///
    /// The log's state is updated only after the store put succeeds, so a
    /// failed append leaves the log untouched.
    pub async fn append(&mut self, payload: impl Into<Bytes>) -> Result<Entry, LogError> {
        if let Some(own_key) = &self.own_key {
            let public = own_key.public_key();
            if !self.allowed_keys.contains(ALLOW_ANY) && !self.allowed_keys.contains(&public) {
                return Err(LogError::NotAllowedToWrite(public));
            }
        }

        let head_time = self
            .heads
            .iter()
            .filter_map(|h| self.entries.get(h))
            .map(|e| e.clock.time)
            .max()
            .unwrap_or(0);
        let new_clock = Clock::with_time(self.clock.id.clone(), self.clock.time.max(head_time) + 1);

        let entry = Entry::create(
            self.store.as_ref(),
            &self.id,
            payload.into(),
            self.heads.clone(),
            new_clock.clone(),
            self.own_key.as_ref(),
        )
        .await?;

        debug!(hash = %entry.hash, time = entry.clock.time, "appended entry");

        self.clock = new_clock;
        self.heads = vec![entry.hash];
        self.entries.insert(entry.hash, entry.clone());
        Ok(entry)
    }

    // ----- Join -----

    /// Merge another log into this one.
    ///
    /// Computes the set of entries reachable from `other`'s heads that this
    /// log doesn't have yet, verifies them when a signing key is configured,
    /// merges, optionally trims to `size_limit` (keeping the greatest
    /// entries under [`Entry::compare`]), and recomputes heads and clock.
    ///
    /// Verification is asymmetric: an entry missing its `key` or `sig`
    /// aborts the whole join with no mutation; an entry signed by a key
    /// outside the allowed set makes the join a warned no-op; an entry
    /// whose signature fails verification is dropped while the join
    /// continues with the rest.
    ///
    /// Joining the same pair of logs in either order yields the same entry
    /// set; joining a log with itself is a no-op. Size trimming is applied
    /// per call, so trimmed joins are not associative.
    pub fn join(
        &mut self,
        other: &Log,
        size_limit: Option<usize>,
        new_id: Option<String>,
    ) -> Result<(), LogError> {
        // Difference: walk back from the other log's heads, stopping at
        // anything already present here. Once a hash is known locally all
        // its ancestors are either known or open tails.
        let mut queue: VecDeque<EntryHash> = other.heads.iter().copied().collect();
        let mut visited: HashSet<EntryHash> = HashSet::new();
        let mut new_items: Vec<Entry> = Vec::new();

        while let Some(hash) = queue.pop_front() {
            if !visited.insert(hash) || self.entries.contains_key(&hash) {
                continue;
            }
            if let Some(entry) = other.entries.get(&hash) {
                for next in &entry.next {
                    queue.push_back(*next);
                }
                new_items.push(entry.clone());
            }
            // Hashes absent from `other` are its open tails; they stay open.
        }

        if let Some(own_key) = &self.own_key {
            let own_public = own_key.public_key();
            let solo_owner =
                self.allowed_keys.len() == 1 && self.allowed_keys.contains(&own_public);

            for entry in &new_items {
                let Some(key) = &entry.key else {
                    return Err(LogError::EntryMissingKey(entry.hash));
                };
                if entry.sig.is_none() {
                    return Err(LogError::EntryMissingSig(entry.hash));
                }

                // The local owner's entries are always admissible.
                if !self.allowed_keys.contains(ALLOW_ANY)
                    && *key != own_public
                    && !self.allowed_keys.contains(key)
                {
                    warn!(
                        hash = %entry.hash,
                        key = %key,
                        "join aborted: entry signed by a key outside the allowed set"
                    );
                    return Ok(());
                }

                if solo_owner && entry.id != self.id {
                    return Err(LogError::BadEntries(format!(
                        "entry {} does not belong to log {}",
                        entry.hash, self.id
                    )));
                }
            }

            new_items.retain(|entry| match entry.verify(self.keystore.as_ref()) {
                Ok(()) => true,
                Err(err) => {
                    warn!(
                        hash = %entry.hash,
                        %err,
                        "dropping entry with invalid signature during join"
                    );
                    false
                }
            });
        }

        let added = new_items.len();
        for entry in new_items {
            self.entries.insert(entry.hash, entry);
        }

        if let Some(limit) = size_limit {
            if self.entries.len() > limit {
                let mut all: Vec<Entry> = self.entries.values().cloned().collect();
                all.sort_by(Entry::compare);
                let keep = all.split_off(all.len() - limit);
                debug!(removed = all.len(), "trimmed log to size limit");
                self.entries = keep.into_iter().map(|e| (e.hash, e)).collect();
            }
        }

        // Heads come from the union of both logs' head sets: drop any that
        // are now referenced by a merged entry or fell to the trim.
        let referenced: HashSet<EntryHash> = self
            .entries
            .values()
            .flat_map(|e| e.next.iter().copied())
            .collect();
        let mut new_heads: Vec<&Entry> = self
            .heads
            .iter()
            .chain(other.heads.iter())
            .filter_map(|h| self.entries.get(h))
            .filter(|e| !referenced.contains(&e.hash))
            .collect();
        new_heads.sort_by(|a, b| {
            a.clock
                .id
                .cmp(&b.clock.id)
                .then_with(|| a.hash.cmp(&b.hash))
        });
        new_heads.dedup_by_key(|e| e.hash);
        self.heads = new_heads.iter().map(|e| e.hash).collect();

        let head_time = self
            .heads
            .iter()
            .filter_map(|h| self.entries.get(h))
            .map(|e| e.clock.time)
            .max()
            .unwrap_or(0);
        self.clock = Clock::with_time(self.clock.id.clone(), self.clock.time.max(head_time));

        if let Some(id) = new_id {
            self.id = id;
        } else if other.id > self.id {
            self.id = other.id.clone();
        }

        debug!(added, total = self.entries.len(), "joined log");
        Ok(())
    }

    // ----- Expansion -----

    /// Fetch up to `amount` more ancestors through the log's open tail
    /// hashes and absorb them. Heads and clock are unaffected — everything
    /// fetched is older than what's already here. Returns the number of
    /// entries added; tails the store cannot resolve stay open.
    pub async fn expand(&mut self, amount: usize) -> Result<usize, LogError> {
        let mut roots = Vec::new();
        for hash in self.tail_hashes() {
            if let Some(bytes) = self.store.get(&hash).await? {
                roots.push(Entry::from_stored(hash, &bytes)?);
            }
        }

        let exclude: HashSet<EntryHash> = self.entries.keys().copied().collect();
        let fetched =
            io::fetch_all(self.store.as_ref(), roots, Some(amount), &exclude, None).await?;

        let added = fetched.len();
        for entry in fetched {
            self.entries.insert(entry.hash, entry);
        }

        debug!(added, "expanded log from tails");
        Ok(added)
    }

    // ----- Snapshots -----

    /// Minimal root-pointer record: the id and head hashes.
    pub fn to_json(&self) -> LogJson {
        LogJson {
            id: self.id.clone(),
            heads: self.heads.clone(),
        }
    }

    /// Full materialization: id, head entries, and all values.
    pub fn to_snapshot(&self) -> LogSnapshot {
        LogSnapshot {
            id: self.id.clone(),
            heads: self.heads(),
            values: self.values(),
        }
    }

    /// UTF-8 JSON bytes of [`to_json`](Log::to_json).
    pub fn to_buffer(&self) -> Result<Vec<u8>, LogError> {
        Ok(serde_json::to_vec(&self.to_json())?)
    }

    /// Persist a root record (id plus full head entries) to the store and
    /// return its content address. [`io::from_multihash`] reverses this.
    pub async fn to_multihash(&self) -> Result<EntryHash, LogError> {
        let record = RootRecord {
            id: self.id.clone(),
            heads: self.heads(),
        };
        let bytes = serde_json::to_vec(&record)?;
        Ok(self.store.put(Bytes::from(bytes)).await?)
    }

    /// Render the log as a text tree, newest entry first, with `└─`
    /// markers indented by each entry's depth in the graph.
    pub fn render(&self, payload_mapper: Option<&dyn Fn(&Entry) -> String>) -> String {
        let values = self.values();
        let mut lines = Vec::with_capacity(values.len());

        for entry in values.iter().rev() {
            let children = Entry::find_children(entry, &values);
            let len = children.len();
            let mut line = "  ".repeat(len.saturating_sub(1));
            if len > 0 {
                line.push_str("└─");
            }
            match payload_mapper {
                Some(mapper) => line.push_str(&mapper(entry)),
                None => line.push_str(&String::from_utf8_lossy(&entry.payload)),
            }
            lines.push(line);
        }

        lines.join("\n")
    }
}

impl fmt::Display for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(None))
    }
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log")
            .field("id", &self.id)
            .field("entries", &self.entries.len())
            .field("heads", &self.heads)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Generate a random log identifier.
fn random_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}
