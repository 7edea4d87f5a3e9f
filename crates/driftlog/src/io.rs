//! Reconstruction of logs from content-addressed storage.
//!
//! A log is persisted as its entry blocks plus a root record written by
//! [`Log::to_multihash`](crate::Log::to_multihash). The functions here walk
//! the `next` references backwards from a starting shape (root record,
//! single entry hash, JSON pointer, or pre-loaded entries), fetching each
//! referenced block, and hand back a [`RecoveredLog`] for the `Log`
//! constructor. Traversal is depth-bounded and reports progress per fetched
//! entry; unresolvable references are left as open tails.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use driftlog_store::BlockStore;
use driftlog_types::{Clock, EntryHash};
use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::LogError;
use crate::log::{Log, LogJson};

/// Progress callback invoked once per collected entry: `(hash, entry, depth)`.
pub type Progress<'a> = Option<&'a mut dyn FnMut(&EntryHash, &Entry, usize)>;

/// Root record persisted by `Log::to_multihash`: the minimal pointer plus
/// the full head entries needed to bootstrap traversal.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RootRecord {
    pub id: String,
    pub heads: Vec<Entry>,
}

/// A log's contents recovered from storage, ready for
/// [`Log::from_recovered`](crate::Log::from_recovered).
#[derive(Debug)]
pub struct RecoveredLog {
    /// Recovered log identifier.
    pub id: String,
    /// The collected entries.
    pub entries: Vec<Entry>,
    /// Heads of the collected set.
    pub heads: Vec<EntryHash>,
    /// Maximal clock observed across the collected set.
    pub clock: Clock,
}

/// Reconstruct a log from the content address of its root record.
///
/// Traverses `next` references from the recorded heads, fetching each entry
/// from the store. Hashes in `exclude` are skipped; traversal halts once
/// `length` entries have been collected, keeping the most recent ones
/// (the frontier is expanded newest-first under [`Entry::compare`]).
pub async fn from_multihash(
    store: &dyn BlockStore,
    root: EntryHash,
    length: Option<usize>,
    exclude: &HashSet<EntryHash>,
    on_progress: Progress<'_>,
) -> Result<RecoveredLog, LogError> {
    let bytes = store
        .get(&root)
        .await?
        .ok_or(LogError::EntryNotFound(root))?;
    let record: RootRecord = serde_json::from_slice(&bytes)?;

    let entries = fetch_all(store, record.heads, length, exclude, on_progress).await?;
    Ok(recover(record.id, entries))
}

/// Reconstruct a log starting from a single entry hash.
pub async fn from_entry_hash(
    store: &dyn BlockStore,
    hash: EntryHash,
    length: Option<usize>,
    exclude: &HashSet<EntryHash>,
    on_progress: Progress<'_>,
) -> Result<RecoveredLog, LogError> {
    let bytes = store
        .get(&hash)
        .await?
        .ok_or(LogError::EntryNotFound(hash))?;
    let entry = Entry::from_stored(hash, &bytes)?;
    let id = entry.id.clone();

    let entries = fetch_all(store, vec![entry], length, exclude, on_progress).await?;
    Ok(recover(id, entries))
}

/// Reconstruct a log from a minimal root-pointer record
/// ([`Log::to_json`](crate::Log::to_json) output).
pub async fn from_json(
    store: &dyn BlockStore,
    json: &LogJson,
    length: Option<usize>,
    on_progress: Progress<'_>,
) -> Result<RecoveredLog, LogError> {
    let mut roots = Vec::with_capacity(json.heads.len());
    for hash in &json.heads {
        let bytes = store
            .get(hash)
            .await?
            .ok_or(LogError::EntryNotFound(*hash))?;
        roots.push(Entry::from_stored(*hash, &bytes)?);
    }

    let entries = fetch_all(store, roots, length, &HashSet::new(), on_progress).await?;
    Ok(recover(json.id.clone(), entries))
}

/// Reconstruct a log by deepening from already-loaded entries.
pub async fn from_entry(
    store: &dyn BlockStore,
    entries: Vec<Entry>,
    length: Option<usize>,
    exclude: &HashSet<EntryHash>,
    on_progress: Progress<'_>,
) -> Result<RecoveredLog, LogError> {
    let id = entries
        .first()
        .map(|e| e.id.clone())
        .ok_or_else(|| LogError::BadEntries("no entries to start from".to_string()))?;

    let fetched = fetch_all(store, entries, length, exclude, on_progress).await?;
    Ok(recover(id, fetched))
}

/// Frontier item ordered by [`Entry::compare`] so the [`BinaryHeap`] pops
/// the newest entry first.
struct QueueItem {
    entry: Entry,
    depth: usize,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.entry.hash == other.entry.hash
    }
}

impl Eq for QueueItem {}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        Entry::compare(&self.entry, &other.entry)
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Collect entries reachable from `roots` by fetching `next` references
/// from the store.
///
/// The frontier is a max-heap under [`Entry::compare`], so with a `length`
/// bound the most recent entries win (heads sit deepest in the graph).
/// References in `exclude`, already-seen hashes, and blocks the store
/// cannot resolve are skipped — the latter remain open tails.
pub(crate) async fn fetch_all(
    store: &dyn BlockStore,
    roots: Vec<Entry>,
    length: Option<usize>,
    exclude: &HashSet<EntryHash>,
    mut on_progress: Progress<'_>,
) -> Result<Vec<Entry>, LogError> {
    let mut seen: HashSet<EntryHash> = exclude.clone();
    let mut frontier: BinaryHeap<QueueItem> = BinaryHeap::new();
    let mut collected: Vec<Entry> = Vec::new();

    for entry in roots {
        if seen.insert(entry.hash) {
            frontier.push(QueueItem { entry, depth: 0 });
        }
    }

    while let Some(QueueItem { entry, depth }) = frontier.pop() {
        if let Some(limit) = length {
            if collected.len() >= limit {
                break;
            }
        }

        if let Some(cb) = on_progress.as_mut() {
            cb(&entry.hash, &entry, depth);
        }

        for hash in &entry.next {
            if seen.contains(hash) {
                continue;
            }
            let Some(bytes) = store.get(hash).await? else {
                // Unresolvable predecessor: leave the tail open.
                continue;
            };
            seen.insert(*hash);
            let parent = Entry::from_stored(*hash, &bytes)?;
            frontier.push(QueueItem {
                entry: parent,
                depth: depth + 1,
            });
        }

        collected.push(entry);
    }

    Ok(collected)
}

/// Derive heads and the maximal clock from a collected entry set.
fn recover(id: String, entries: Vec<Entry>) -> RecoveredLog {
    let heads = Log::find_heads(entries.iter());
    let time = entries.iter().map(|e| e.clock.time).max().unwrap_or(0);
    let clock = Clock::with_time(id.clone(), time);

    RecoveredLog {
        id,
        entries,
        heads,
        clock,
    }
}
