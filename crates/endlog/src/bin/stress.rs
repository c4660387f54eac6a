//! Manual concurrent-writer stress harness.
//!
//! Spawns `--threads` writer threads, each appending `--writes` records of
//! the form `Thread-<t> Log-<i>` to a shared volume, then verifies that
//! every expected line landed in the final set of files exactly once.

use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

use clap::Parser;
use tracing::info;

#[derive(Parser)]
struct Args {
    /// Directory to write into; created if it doesn't exist.
    #[arg(long, default_value = "./stress-volume")]
    dir: PathBuf,

    /// Number of concurrent writer threads.
    #[arg(long, default_value_t = 10)]
    threads: usize,

    /// Records written by each thread.
    #[arg(long, default_value_t = 20_000)]
    writes: usize,

    /// Optional password; if set, the volume is encrypted.
    #[arg(long)]
    password: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.dir)?;

    let handle = endlog::LogHandle::open(&args.dir, args.password.as_deref())?;
    let barrier = Arc::new(Barrier::new(args.threads));
    let start = Instant::now();

    let workers: Vec<_> = (0..args.threads)
        .map(|t| {
            let handle = handle.clone();
            let barrier = Arc::clone(&barrier);
            let writes = args.writes;
            thread::spawn(move || {
                barrier.wait();
                for i in 0..writes {
                    let line = format!("Thread-{t} Log-{i}\n");
                    handle.write(line.as_bytes()).expect("write failed");
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("writer thread panicked");
    }
    handle.flush()?;

    let elapsed = start.elapsed();
    let total = args.threads * args.writes;
    info!(total, ?elapsed, "all writers finished");

    let mut seen = HashSet::with_capacity(total);
    for entry in std::fs::read_dir(&args.dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) == Some("export.log") {
            continue;
        }
        let (file, footer) = endlog_format::open_existing(&path)?;
        let mut data = vec![0u8; footer.used as usize];
        let mut f = &file;
        f.seek(SeekFrom::Start(0))?;
        f.read_exact(&mut data)?;
        if let Some(key_password) = args.password.as_deref() {
            let key = endlog_crypto::Key::derive(key_password, &footer.salt);
            endlog_crypto::process(&key, 0, &mut data);
        }
        for line in String::from_utf8(data)?.lines() {
            if !seen.insert(line.to_string()) {
                eprintln!("duplicate line: {line}");
            }
        }
    }

    let mut missing = 0usize;
    for t in 0..args.threads {
        for i in 0..args.writes {
            if !seen.contains(&format!("Thread-{t} Log-{i}")) {
                missing += 1;
            }
        }
    }

    println!("expected {total}, recovered {}, missing {missing}", seen.len());
    if missing > 0 {
        std::process::exit(1);
    }
    Ok(())
}
