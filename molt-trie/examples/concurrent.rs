//! Example demonstrating concurrent operations on the lock-free trie map.
//!
//! Multiple threads insert, read, and delete without any locks or blocking;
//! readers always observe a consistent snapshot.

use molt_trie::TrieMap64;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn main() {
    println!("=== Lock-Free Concurrent Trie Map Demo ===\n");

    let map = Arc::new(TrieMap64::new());

    // Benchmark concurrent inserts
    println!("Benchmarking concurrent inserts...");
    let start = Instant::now();
    let mut handles = Vec::new();

    // Spawn 8 threads, each inserting 10,000 entries
    for thread_id in 0..8u64 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..10_000u64 {
                let key = format!("entry-{}", thread_id * 10_000 + i);
                map.put(key.as_bytes(), i * 2);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Inserted 80,000 entries from 8 threads in {:?} ({:.2} ops/sec)\n",
        duration,
        80_000.0 / duration.as_secs_f64()
    );

    // Benchmark concurrent reads
    println!("Benchmarking concurrent reads...");
    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..8 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            let mut found = 0u64;
            for i in 0..80_000u64 {
                let key = format!("entry-{i}");
                if map.get(key.as_bytes()).is_some() {
                    found += 1;
                }
            }
            found
        }));
    }
    let found: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    let duration = start.elapsed();
    println!(
        "8 threads read 640,000 keys ({} hits) in {:?} ({:.2} ops/sec)\n",
        found,
        duration,
        640_000.0 / duration.as_secs_f64()
    );

    // Readers racing writers on the same keys
    println!("Mixed readers and deleters...");
    let start = Instant::now();
    let mut handles = Vec::new();

    for thread_id in 0..4u64 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..10_000u64 {
                let key = format!("entry-{}", thread_id * 10_000 + i);
                map.delete(key.as_bytes());
            }
        }));
    }
    for _ in 0..4 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..20_000u64 {
                let key = format!("entry-{i}");
                // Either a full value or absent, never a torn read.
                let _ = map.get(key.as_bytes());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    println!("Mixed phase finished in {:?}", start.elapsed());
    println!("\nDone.");
}
