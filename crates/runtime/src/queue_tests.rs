use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;

fn job(n: usize, out: Arc<Mutex<Vec<usize>>>) -> Job {
    Box::new(move || out.lock().push(n))
}

#[test]
fn empty_queue_consumes_nothing() {
    let q = JobQueue::new();
    assert!(q.empty());
    assert!(!q.consume_one(|_| unreachable!()));
}

#[test]
fn push_then_consume_one_preserves_fifo_order() {
    let q = JobQueue::new();
    let out = Arc::new(Mutex::new(Vec::new()));
    for n in 0..5 {
        q.push(job(n, out.clone()));
    }
    for _ in 0..5 {
        assert!(q.consume_one(|j| j()));
    }
    assert_eq!(*out.lock(), vec![0, 1, 2, 3, 4]);
    assert!(q.empty());
}

#[test]
fn consume_all_drains_everything_in_order() {
    let q = JobQueue::new();
    let out = Arc::new(Mutex::new(Vec::new()));
    for n in 0..10 {
        q.push(job(n, out.clone()));
    }
    let ran = q.consume_all(|j| j());
    assert!(ran);
    assert_eq!(*out.lock(), (0..10).collect::<Vec<_>>());
    assert!(q.empty());
}

#[test]
fn capacity_grows_to_next_power_of_two_and_never_shrinks() {
    let q = JobQueue::new();
    assert_eq!(q.capacity(), 0);
    q.push(Box::new(|| {}));
    assert_eq!(q.capacity(), 1);
    for _ in 0..3 {
        q.push(Box::new(|| {}));
    }
    assert_eq!(q.capacity(), 4);
    q.consume_all(|_| {});
    // draining doesn't shrink the backing storage
    assert_eq!(q.capacity(), 4);
}

#[test]
fn expansion_after_wraparound_keeps_entries_contiguous_and_ordered() {
    let q = JobQueue::new();
    let out = Arc::new(Mutex::new(Vec::new()));
    // Fill capacity to 4, then pop two so read_head sits at 2.
    for n in 0..4 {
        q.push(job(n, out.clone()));
    }
    assert!(q.consume_one(|j| j()));
    assert!(q.consume_one(|j| j()));
    assert_eq!(q.capacity(), 4);
    // Push three more: two land in the freed slots at the tail (wrapping to
    // index 0,1), the third forces an expansion while the occupied region
    // straddles the end of the buffer.
    for n in 4..7 {
        q.push(job(n, out.clone()));
    }
    assert_eq!(q.capacity(), 8);
    let ran = q.consume_all(|j| j());
    assert!(ran);
    assert_eq!(*out.lock(), vec![2, 3, 4, 5, 6]);
}

#[test]
fn concurrent_producers_and_a_single_consumer_see_every_job_exactly_once() {
    let q = Arc::new(JobQueue::new());
    let counted = Arc::new(AtomicUsize::new(0));
    let producers: Vec<_> = (0..8)
        .map(|_| {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    q.push(Box::new(|| {}));
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }
    while q.consume_one(|j| {
        j();
        counted.fetch_add(1, Ordering::Relaxed);
    }) {}
    assert_eq!(counted.load(Ordering::Relaxed), 1600);
    assert!(q.empty());
}
