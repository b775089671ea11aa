//! Integration tests for semaphores and queues shared between threads

use ipcbox_core::io::{IpcError, LockOptions, Timeout};
use ipcbox_core::{Queue, Semaphore};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn options(holder: &str) -> LockOptions {
    LockOptions::new(holder, Duration::from_millis(10))
}

#[test]
fn test_initial_permits_then_block() {
    let temp_dir = TempDir::new().unwrap();
    let sem = Semaphore::new(temp_dir.path().join("jobs"), &options("owner"));
    sem.init(3).unwrap();

    for _ in 0..3 {
        sem.trywait().unwrap();
    }
    assert!(matches!(sem.trywait(), Err(IpcError::WouldBlock { .. })));
    assert!(matches!(
        sem.wait(Timeout::Rounds(2)),
        Err(IpcError::Timeout { .. })
    ));
    assert_eq!(sem.peek().unwrap(), 0);
}

#[test]
fn test_count_tracks_posts_and_waits() {
    let temp_dir = TempDir::new().unwrap();
    let sem = Semaphore::new(temp_dir.path().join("jobs"), &options("owner"));
    sem.init(2).unwrap();

    // N = 2, k = 5 posts, m = 4 waits
    for _ in 0..5 {
        sem.post().unwrap();
    }
    for _ in 0..4 {
        sem.wait(Timeout::Rounds(1)).unwrap();
    }

    assert_eq!(sem.peek().unwrap(), 2 + 5 - 4);
}

#[test]
fn test_blocked_wait_released_by_post() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("gate");
    Semaphore::new(&path, &options("owner")).init(0).unwrap();

    let waiter_path = path.clone();
    let waiter = thread::spawn(move || {
        let sem = Semaphore::new(waiter_path, &options("waiter"));
        let started = Instant::now();
        sem.wait(Timeout::Infinite).unwrap();
        started.elapsed()
    });

    thread::sleep(Duration::from_millis(100));
    Semaphore::new(&path, &options("poster")).post().unwrap();

    let waited = waiter.join().unwrap();
    assert!(waited >= Duration::from_millis(50));
    assert_eq!(Semaphore::new(&path, &options("owner")).peek().unwrap(), 0);
}

#[test]
fn test_concurrent_waiters_never_overdraw() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pool");
    Semaphore::new(&path, &options("owner")).init(3).unwrap();

    let barrier = Arc::new(Barrier::new(6));
    let handles: Vec<_> = (0..6)
        .map(|i| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let sem = Semaphore::new(path, &options(&format!("w{i}")));
                barrier.wait();
                sem.wait(Timeout::Rounds(20)).is_ok()
            })
        })
        .collect();

    let granted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(granted, 3);
    assert_eq!(Semaphore::new(&path, &options("owner")).peek().unwrap(), 0);
}

#[test]
fn test_queue_fifo_across_threads() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("work");
    Queue::new(&path, &options("owner")).init().unwrap();

    let producer_path = path.clone();
    let producer = thread::spawn(move || {
        let queue = Queue::new(producer_path, &options("producer"));
        for i in 0..20 {
            queue.put(&format!("item-{i}")).unwrap();
        }
    });

    let consumer = Queue::new(&path, &options("consumer"));
    let received: Vec<String> = (0..20)
        .map(|_| consumer.get(Timeout::Infinite).unwrap())
        .collect();
    producer.join().unwrap();

    let expected: Vec<String> = (0..20).map(|i| format!("item-{i}")).collect();
    assert_eq!(received, expected);
    assert!(consumer.is_empty().unwrap());
}

#[test]
fn test_queue_get_times_out_when_empty() {
    let temp_dir = TempDir::new().unwrap();
    let queue = Queue::new(temp_dir.path().join("idle"), &options("owner"));
    queue.init().unwrap();

    assert!(matches!(
        queue.get(Timeout::Rounds(0)),
        Err(IpcError::Timeout { .. })
    ));
    assert!(matches!(
        queue.get(Timeout::Rounds(3)),
        Err(IpcError::Timeout { .. })
    ));
}

#[test]
fn test_queue_destroy_requires_owner() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("owned");
    Queue::new(&path, &options("owner")).init().unwrap();

    let stranger = Queue::new(&path, &options("stranger"));
    assert!(matches!(stranger.destroy(), Err(IpcError::NotOwner { .. })));
    assert!(stranger.exists());

    Queue::new(&path, &options("owner")).destroy().unwrap();
    assert!(!path.exists());
}
