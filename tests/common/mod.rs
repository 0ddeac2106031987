#![allow(dead_code)]

pub fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

pub fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

pub fn crc_of(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// First position of `signature` in `bytes` at or after `from`.
pub fn find_signature(bytes: &[u8], signature: u32, from: usize) -> Option<usize> {
    let needle = signature.to_le_bytes();
    bytes[from..]
        .windows(4)
        .position(|window| window == needle)
        .map(|i| i + from)
}

pub fn contains_signature(bytes: &[u8], signature: u32) -> bool {
    find_signature(bytes, signature, 0).is_some()
}
