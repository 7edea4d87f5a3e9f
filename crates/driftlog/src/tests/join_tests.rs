//! Tests for the join (merge) operation and its CRDT properties.

use driftlog_types::EntryHash;

use super::{mem_store, new_log, new_log_on};
use crate::entry::Entry;

/// Hashes of a log's values, in converged order.
fn value_hashes(log: &crate::log::Log) -> Vec<EntryHash> {
    log.values().iter().map(|e| e.hash).collect()
}

#[tokio::test]
async fn test_join_two_independent_logs() {
    let store = mem_store();
    let mut log1 = new_log_on(&store, "A");
    let mut log2 = new_log_on(&store, "A");

    log1.append("one").await.unwrap();
    log2.append("two").await.unwrap();

    log1.join(&log2, None, None).unwrap();

    assert_eq!(log1.len(), 2);
    assert_eq!(log1.heads().len(), 2, "both entries stay unreferenced");
    for entry in log1.values() {
        assert_eq!(entry.clock.time, 1);
    }
}

#[tokio::test]
async fn test_join_commutative() {
    let store = mem_store();
    let mut a = new_log_on(&store, "A");
    let mut b = new_log_on(&store, "A");

    for i in 0..3u32 {
        a.append(format!("a{i}").into_bytes()).await.unwrap();
        b.append(format!("b{i}").into_bytes()).await.unwrap();
    }

    let mut ab = a.clone();
    ab.join(&b, None, None).unwrap();
    let mut ba = b.clone();
    ba.join(&a, None, None).unwrap();

    assert_eq!(value_hashes(&ab), value_hashes(&ba));
    assert_eq!(
        ab.heads().iter().map(|e| e.hash).collect::<Vec<_>>(),
        ba.heads().iter().map(|e| e.hash).collect::<Vec<_>>()
    );
    assert_eq!(ab.clock().time, ba.clock().time);
}

#[tokio::test]
async fn test_join_idempotent() {
    let mut a = new_log("A");
    for i in 0..3u32 {
        a.append(format!("{i}").into_bytes()).await.unwrap();
    }

    let before = value_hashes(&a);
    let copy = a.clone();
    a.join(&copy, None, None).unwrap();

    assert_eq!(value_hashes(&a), before);
    assert_eq!(a.len(), 3);
}

#[tokio::test]
async fn test_join_associative_without_trim() {
    let store = mem_store();
    let mut a = new_log_on(&store, "A");
    let mut b = new_log_on(&store, "A");
    let mut c = new_log_on(&store, "A");

    for i in 0..2u32 {
        a.append(format!("a{i}").into_bytes()).await.unwrap();
        b.append(format!("b{i}").into_bytes()).await.unwrap();
        c.append(format!("c{i}").into_bytes()).await.unwrap();
    }

    // (a ⊔ b) ⊔ c
    let mut left = a.clone();
    left.join(&b, None, None).unwrap();
    left.join(&c, None, None).unwrap();

    // a ⊔ (b ⊔ c)
    let mut bc = b.clone();
    bc.join(&c, None, None).unwrap();
    let mut right = a.clone();
    right.join(&bc, None, None).unwrap();

    assert_eq!(value_hashes(&left), value_hashes(&right));
}

#[tokio::test]
async fn test_join_is_union_of_both_sets() {
    let store = mem_store();
    let mut a = new_log_on(&store, "A");
    let mut b = new_log_on(&store, "A");

    a.append("one").await.unwrap();
    b.append("two").await.unwrap();
    b.append("three").await.unwrap();

    let mut expected: Vec<EntryHash> = value_hashes(&a)
        .into_iter()
        .chain(value_hashes(&b))
        .collect();
    expected.sort();
    expected.dedup();

    a.join(&b, None, None).unwrap();
    let mut merged = value_hashes(&a);
    merged.sort();
    assert_eq!(merged, expected);
}

#[tokio::test]
async fn test_join_linear_extension_moves_head() {
    let mut log1 = new_log("A");
    log1.append("one").await.unwrap();

    let mut log2 = log1.clone();
    let two = log2.append("two").await.unwrap();

    log1.join(&log2, None, None).unwrap();

    assert_eq!(log1.len(), 2);
    assert_eq!(log1.head_hashes(), &[two.hash]);
    assert_eq!(log1.clock().time, 2);
}

#[tokio::test]
async fn test_join_updates_clock_to_max_head() {
    let store = mem_store();
    let mut log1 = new_log_on(&store, "A");
    let mut log2 = new_log_on(&store, "A");

    log1.append("one").await.unwrap();
    for i in 0..5u32 {
        log2.append(format!("{i}").into_bytes()).await.unwrap();
    }

    log1.join(&log2, None, None).unwrap();
    assert_eq!(log1.clock().time, 5);
}

#[tokio::test]
async fn test_join_size_limit_keeps_greatest() {
    let store = mem_store();
    let mut log1 = new_log_on(&store, "A");
    let mut log2 = new_log_on(&store, "A");

    log1.append("one").await.unwrap();
    log1.append("two").await.unwrap();
    log2.append("three").await.unwrap();
    log2.append("four").await.unwrap();

    // The expected survivors are the 2 greatest of the union.
    let mut union: Vec<Entry> = log1.values().into_iter().chain(log2.values()).collect();
    union.sort_by(Entry::compare);
    let expected: Vec<EntryHash> = union[2..].iter().map(|e| e.hash).collect();

    log1.join(&log2, Some(2), None).unwrap();

    assert_eq!(log1.len(), 2);
    assert_eq!(value_hashes(&log1), expected);
}

#[tokio::test]
async fn test_join_trim_leaves_tails_open() {
    let mut log1 = new_log("A");
    log1.append("one").await.unwrap();
    let two = log1.append("two").await.unwrap();
    let three = log1.append("three").await.unwrap();

    let mut trimmed = new_log("A");
    trimmed.join(&log1, Some(1), None).unwrap();

    assert_eq!(trimmed.len(), 1);
    assert_eq!(value_hashes(&trimmed), vec![three.hash]);
    assert_eq!(trimmed.head_hashes(), &[three.hash]);
    assert_eq!(trimmed.tail_hashes(), vec![two.hash]);
}

#[tokio::test]
async fn test_join_retains_greater_id() {
    let store = mem_store();
    let mut a = new_log_on(&store, "A");
    let b = new_log_on(&store, "B");

    a.join(&b, None, None).unwrap();
    assert_eq!(a.id(), "B");

    let mut b2 = new_log_on(&store, "B");
    let a2 = new_log_on(&store, "A");
    b2.join(&a2, None, None).unwrap();
    assert_eq!(b2.id(), "B");
}

#[tokio::test]
async fn test_join_adopts_new_id() {
    let store = mem_store();
    let mut a = new_log_on(&store, "A");
    let b = new_log_on(&store, "B");

    a.join(&b, None, Some("C".to_string())).unwrap();
    assert_eq!(a.id(), "C");
}

#[tokio::test]
async fn test_join_empty_logs() {
    let mut a = new_log("A");
    let b = new_log("A");

    a.join(&b, None, None).unwrap();
    assert!(a.is_empty());
    assert!(a.heads().is_empty());
    assert_eq!(a.clock().time, 0);
}

#[tokio::test]
async fn test_join_into_empty_log() {
    let mut source = new_log("A");
    for i in 0..3u32 {
        source.append(format!("{i}").into_bytes()).await.unwrap();
    }

    let mut sink = new_log("A");
    sink.join(&source, None, None).unwrap();

    assert_eq!(value_hashes(&sink), value_hashes(&source));
    assert_eq!(sink.clock().time, 3);
}

#[tokio::test]
async fn test_bidirectional_join_converges() {
    let store = mem_store();
    let mut a = new_log_on(&store, "A");
    let mut b = new_log_on(&store, "A");

    for i in 0..3u32 {
        a.append(format!("a{i}").into_bytes()).await.unwrap();
        b.append(format!("b{i}").into_bytes()).await.unwrap();
    }

    let b_before = b.clone();
    b.join(&a, None, None).unwrap();
    a.join(&b_before, None, None).unwrap();

    assert_eq!(value_hashes(&a), value_hashes(&b));
    assert_eq!(
        a.heads().iter().map(|e| e.hash).collect::<Vec<_>>(),
        b.heads().iter().map(|e| e.hash).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_join_ignores_entries_unreachable_from_heads() {
    // The difference walk starts at the other log's heads; a trimmed log
    // whose kept entry is unreachable contributes only what its heads reach.
    let mut full = new_log("A");
    full.append("one").await.unwrap();
    full.append("two").await.unwrap();

    let mut receiver = new_log("A");
    receiver.join(&full, None, None).unwrap();
    assert_eq!(receiver.len(), 2);
}
