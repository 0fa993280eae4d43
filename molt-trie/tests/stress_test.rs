//! Concurrency stress tests: many writers, many readers, no locks.

use molt_trie::{TrieMap32, TrieMap64};
use rand::RngCore;
use std::sync::Arc;
use std::thread;

fn random_pairs(count: usize) -> Vec<[u8; 32]> {
    let mut rng = rand::thread_rng();
    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        let mut key = [0u8; 32];
        rng.fill_bytes(&mut key);
        keys.push(key);
    }
    keys
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_inserts_then_reads_32() {
    const INPUT_SIZE: usize = 100_000;
    const THREADS: usize = 8;

    let map = Arc::new(TrieMap32::<Vec<u8>>::new());
    let keys = Arc::new(random_pairs(INPUT_SIZE));

    let mut handles = vec![];
    for t in 0..THREADS {
        let map = map.clone();
        let keys = keys.clone();
        handles.push(thread::spawn(move || {
            for key in keys.iter().skip(t).step_by(THREADS) {
                map.put(key, key.to_vec());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut handles = vec![];
    for t in 0..THREADS {
        let map = map.clone();
        let keys = keys.clone();
        handles.push(thread::spawn(move || {
            for key in keys.iter().skip(t).step_by(THREADS) {
                assert_eq!(map.get(key).as_deref(), Some(&key[..]));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_inserts_then_reads_64() {
    const INPUT_SIZE: usize = 50_000;
    const THREADS: usize = 8;

    let map = Arc::new(TrieMap64::<Vec<u8>>::new());
    let keys = Arc::new(random_pairs(INPUT_SIZE));

    let mut handles = vec![];
    for t in 0..THREADS {
        let map = map.clone();
        let keys = keys.clone();
        handles.push(thread::spawn(move || {
            for key in keys.iter().skip(t).step_by(THREADS) {
                map.put(key, key.to_vec());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for key in keys.iter() {
        assert_eq!(map.get(key).as_deref(), Some(&key[..]));
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn same_key_two_writers() {
    const ITERATIONS: usize = 10_000;

    let map = Arc::new(TrieMap64::<&str>::new());
    map.put(b"contested", "initial");

    let writer_a = {
        let map = map.clone();
        thread::spawn(move || {
            for _ in 0..ITERATIONS {
                map.put(b"contested", "from-a");
            }
        })
    };
    let writer_b = {
        let map = map.clone();
        thread::spawn(move || {
            for _ in 0..ITERATIONS {
                map.put(b"contested", "from-b");
            }
        })
    };

    // Readers must always see a complete value, never a torn or absent one.
    let reader = {
        let map = map.clone();
        thread::spawn(move || {
            for _ in 0..ITERATIONS {
                let value = map.get(b"contested").expect("key vanished");
                assert!(matches!(value, "initial" | "from-a" | "from-b"));
            }
        })
    };

    writer_a.join().unwrap();
    writer_b.join().unwrap();
    reader.join().unwrap();

    // After both writers joined, the value is whichever last write won.
    let last = map.get(b"contested").expect("key vanished");
    assert!(matches!(last, "from-a" | "from-b"));
}

#[test]
#[cfg_attr(miri, ignore)]
fn insert_delete_churn() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 2_000;

    let map = Arc::new(TrieMap32::<usize>::new());

    let mut handles = vec![];
    for t in 0..THREADS {
        let map = map.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PER_THREAD {
                let key = format!("churn-{t}-{i}");
                map.put(key.as_bytes(), i);
                if i % 2 == 0 {
                    map.delete(key.as_bytes());
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Each thread owned its keys exclusively, so the survivors are exact.
    for t in 0..THREADS {
        for i in 0..PER_THREAD {
            let key = format!("churn-{t}-{i}");
            let expected = if i % 2 == 0 { None } else { Some(i) };
            assert_eq!(map.get(key.as_bytes()), expected, "key {key}");
        }
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn parallel_reads_and_writes() {
    const INPUT_SIZE: usize = 20_000;
    const THREADS: usize = 4;

    let map = Arc::new(TrieMap32::<Vec<u8>>::new());
    let initial = Arc::new(random_pairs(INPUT_SIZE));
    let incoming = Arc::new(random_pairs(INPUT_SIZE));

    for key in initial.iter() {
        map.put(key, key.to_vec());
    }

    // Readers of the initial set race writers of a disjoint new set.
    let mut handles = vec![];
    for t in 0..THREADS {
        let reader_map = map.clone();
        let initial = initial.clone();
        handles.push(thread::spawn(move || {
            for key in initial.iter().skip(t).step_by(THREADS) {
                assert_eq!(reader_map.get(key).as_deref(), Some(&key[..]));
            }
        }));

        let writer_map = map.clone();
        let incoming = incoming.clone();
        handles.push(thread::spawn(move || {
            for key in incoming.iter().skip(t).step_by(THREADS) {
                writer_map.put(key, key.to_vec());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for key in incoming.iter() {
        assert_eq!(map.get(key).as_deref(), Some(&key[..]));
    }
}
