//! MurmurHash3-style mixers in 32-bit and 64-bit widths.
//!
//! The trie derives node positions from these hashes, so they must be
//! reproducible bit-for-bit: same little-endian chunking, same rotations,
//! same tail handling, same finalisers, on every platform. Seeds are part of
//! the contract; the trie re-seeds once a hash's chunks are exhausted.

const C32_1: u32 = 0x85ebca6b;
const C32_2: u32 = 0xc2b2ae35;
const C32_3: u32 = 0xe6546b64;
const C32_4: u32 = 0x1b873593;
const C32_5: u32 = 0x5c4bcea9;

const C64_1: u64 = 0xff51afd7ed558ccd;
const C64_2: u64 = 0xc4ceb9fe1a85ec53;
const C64_3: u64 = 0x7b6d5f86d192eaa1;
const C64_4: u64 = 0x4cf5ad432745937f;
const C64_5: u64 = 0x8a7d3eef7b5ea2e1;

/// 32-bit mixer: 4-byte little-endian chunks, left-rotations by 15 and 13,
/// byte-packed tail, avalanche finaliser.
pub fn murmur32(data: &[u8], seed: u32) -> u32 {
    let mut hash = seed;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C32_1).rotate_left(15).wrapping_mul(C32_2);
        hash ^= k;
        hash = hash.rotate_left(13).wrapping_mul(5).wrapping_add(C32_3);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &byte) in tail.iter().enumerate() {
            k |= u32::from(byte) << (8 * i);
        }
        k = k.wrapping_mul(C32_1).rotate_left(15).wrapping_mul(C32_2);
        hash ^= k;
    }

    hash ^= data.len() as u32;
    hash ^= hash >> 16;
    hash = hash.wrapping_mul(C32_4);
    hash ^= hash >> 13;
    hash = hash.wrapping_mul(C32_5);
    hash ^= hash >> 16;
    hash
}

/// 64-bit mixer: 8-byte little-endian chunks, left-rotations by 31 and 27,
/// byte-packed tail, avalanche finaliser.
pub fn murmur64(data: &[u8], seed: u64) -> u64 {
    let mut hash = seed;

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut k = u64::from_le_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
        ]);
        k = k.wrapping_mul(C64_1).rotate_left(31).wrapping_mul(C64_2);
        hash ^= k;
        hash = hash.rotate_left(27).wrapping_mul(5).wrapping_add(C64_3);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u64;
        for (i, &byte) in tail.iter().enumerate() {
            k |= u64::from(byte) << (8 * i);
        }
        k = k.wrapping_mul(C64_1).rotate_left(31).wrapping_mul(C64_2);
        hash ^= k;
    }

    hash ^= data.len() as u64;
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(C64_4);
    hash ^= hash >> 29;
    hash = hash.wrapping_mul(C64_5);
    hash ^= hash >> 32;
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference vectors produced by the canonical implementation. Any drift
    // here silently scrambles node positions, so they are pinned exactly.

    #[test]
    fn murmur32_vectors() {
        assert_eq!(murmur32(b"hello", 0), 3355575554);
        assert_eq!(murmur32(b"hello", 1), 2730838749);
        assert_eq!(murmur32(b"hello", 2), 3593992079);
        assert_eq!(murmur32(b"hello", 42), 2229186400);
        // Tail-only input (3 bytes, no full chunk).
        assert_eq!(murmur32(b"new", 1), 2200280793);
        // Chunk-aligned input (two full chunks, no tail).
        assert_eq!(murmur32(b"asdfasdf", 1), 128644410);
        assert_eq!(murmur32(b"", 1), 395188916);
        assert_eq!(murmur32(&[0xab; 32], 1), 3012555217);
    }

    #[test]
    fn murmur64_vectors() {
        assert_eq!(murmur64(b"hello", 0), 9557211043937617316);
        assert_eq!(murmur64(b"hello", 1), 13503924954659443343);
        assert_eq!(murmur64(b"hello", 2), 1379037824428578219);
        assert_eq!(murmur64(b"hello", 42), 10145345726283613107);
        // Tail-only input (no full 8-byte chunk).
        assert_eq!(murmur64(b"new", 1), 9955225196943375354);
        // Chunk-aligned input (one full chunk, no tail).
        assert_eq!(murmur64(b"asdfasdf", 1), 934754561773452123);
        assert_eq!(murmur64(b"", 1), 15883035934462205857);
        assert_eq!(murmur64(&[0xab; 32], 1), 4035740540355226776);
    }

    #[test]
    fn seeds_decorrelate() {
        // Re-seeding must yield fresh index bits, not a shifted variant.
        let a = murmur32(b"hello", 1);
        let b = murmur32(b"hello", 2);
        assert_ne!(a, b);
        assert_ne!(a.rotate_left(1), b);

        let c = murmur64(b"hello", 1);
        let d = murmur64(b"hello", 2);
        assert_ne!(c, d);
    }
}
