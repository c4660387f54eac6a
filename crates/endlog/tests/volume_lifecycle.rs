//! End-to-end scenarios exercising a volume through its public API only.

use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Barrier};
use std::thread;

use endlog::LogHandle;
use serial_test::serial;
use tempfile::tempdir;

fn set_capacity(cap: u32) {
    endlog::set_max_capacity(cap).unwrap();
}

#[test]
#[serial]
fn fresh_directory_accepts_a_single_write() {
    let dir = tempdir().unwrap();
    set_capacity(endlog::CAPACITY_MIN);
    let handle = LogHandle::open(dir.path(), None).unwrap();
    handle.write(b"first record").unwrap();
    handle.flush().unwrap();

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[test]
#[serial]
fn sustained_small_writes_roll_across_multiple_files() {
    let dir = tempdir().unwrap();
    set_capacity(endlog::CAPACITY_MIN);
    let handle = LogHandle::open(dir.path(), None).unwrap();

    for _ in 0..20_999 {
        handle.write(&[0u8; 50]).unwrap();
    }
    handle.flush().unwrap();

    let log_files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_str().unwrap().ends_with(".log"))
        .collect();
    assert!(log_files.len() > 1, "expected rotation to have occurred");
    assert!(log_files.len() <= endlog::DAILY_BUDGET as usize);
}

#[test]
#[serial]
fn record_larger_than_capacity_is_rejected() {
    let dir = tempdir().unwrap();
    set_capacity(endlog::CAPACITY_MIN);
    let handle = LogHandle::open(dir.path(), None).unwrap();
    let too_big = vec![0u8; endlog::CAPACITY_MIN as usize];
    let err = handle.write(&too_big).unwrap_err();
    assert_eq!(err.code(), -11);
}

#[test]
#[serial]
fn ten_threads_twenty_thousand_writes_each_on_an_encrypted_volume() {
    let dir = tempdir().unwrap();
    set_capacity(endlog_format::CAPACITY_MAX);
    let handle = LogHandle::open(dir.path(), Some("correct horse battery staple")).unwrap();

    const THREADS: usize = 10;
    const PER_THREAD: usize = 20_000;
    let barrier = Arc::new(Barrier::new(THREADS));
    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let handle = handle.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    let line = format!("Thread-{t} Log-{i}");
                    handle.write(line.as_bytes()).unwrap();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    handle.flush().unwrap();

    let mut seen = HashSet::new();
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let path = entry.unwrap().path();
        let (file, footer) = endlog_format::open_existing(&path).unwrap();
        let mut data = vec![0u8; footer.used as usize];
        let mut f = &file;
        f.seek(SeekFrom::Start(0)).unwrap();
        f.read_exact(&mut data).unwrap();
        let key = endlog_crypto::Key::derive("correct horse battery staple", &footer.salt);
        endlog_crypto::process(&key, 0, &mut data);

        // Records are written back-to-back with no delimiter; recover them
        // by scanning for the "Thread-" prefix boundaries.
        let text = String::from_utf8(data).unwrap();
        for chunk in text.split("Thread-").skip(1) {
            seen.insert(format!("Thread-{chunk}"));
        }
    }
    assert_eq!(seen.len(), THREADS * PER_THREAD);
}

#[test]
#[serial]
fn daily_budget_recycles_the_oldest_slot() {
    let dir = tempdir().unwrap();
    set_capacity(endlog::CAPACITY_MIN);
    let handle = LogHandle::open(dir.path(), None).unwrap();
    let max_payload = endlog_format::Footer::max_payload(endlog::CAPACITY_MIN);

    // Force one rotation per write by filling each file to the brim.
    for _ in 0..(endlog::DAILY_BUDGET as usize + 2) {
        handle.write(&vec![0u8; max_payload as usize]).unwrap();
    }
    handle.flush().unwrap();

    let log_files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_str().unwrap().ends_with(".log"))
        .collect();
    assert_eq!(log_files.len(), endlog::DAILY_BUDGET as usize);
}

#[test]
#[serial]
fn cleanup_removes_only_aged_out_files() {
    let dir = tempdir().unwrap();
    set_capacity(endlog::CAPACITY_MIN);
    let handle = LogHandle::open(dir.path(), None).unwrap();
    handle.write(b"today's record").unwrap();
    handle.flush().unwrap();

    let removed = endlog::cleanup(dir.path(), 30).unwrap();
    assert_eq!(removed, 0);

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}
