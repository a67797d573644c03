//! Call target hashing.
//!
//! Syscalls are addressed by the murmur3 (x86, 32-bit, seed 0) hash of their
//! name. Local functions are addressed by the same hash over the little-endian
//! bytes of their slot index, so both share one 32-bit call immediate space.

/// `symbol_hash("entrypoint")`.
pub const ENTRYPOINT_HASH: u32 = 0x71e3_cf81;

/// murmur3 x86 32-bit hash of `bytes` with seed 0.
fn hash_bytes(mut bytes: &[u8]) -> u32 {
    // Reading from a slice cannot fail.
    murmur3::murmur3_32(&mut bytes, 0).unwrap_or_default()
}

/// Hash of a syscall or exported symbol name.
#[must_use]
pub fn symbol_hash(name: &str) -> u32 {
    hash_bytes(name.as_bytes())
}

/// Hash of a local function's slot index.
#[must_use]
pub fn pc_hash(pc: u64) -> u32 {
    hash_bytes(&pc.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_hash_known_values() {
        assert_eq!(symbol_hash(""), 0);
        assert_eq!(symbol_hash("a"), 0x3c25_69b2);
        assert_eq!(symbol_hash("ab"), 0x9bbf_d75f);
        assert_eq!(symbol_hash("abc"), 0xb3dd_93fa);
        assert_eq!(symbol_hash("abort"), 0xb6fc_1a11);
        assert_eq!(symbol_hash("sol_log_"), 0x2075_59bd);
        assert_eq!(symbol_hash("sol_log_64_"), 0x5c2a_3178);
        assert_eq!(symbol_hash("sol_memcpy_"), 0x717c_c4a3);
    }

    #[test]
    fn test_entrypoint_hash() {
        assert_eq!(symbol_hash("entrypoint"), ENTRYPOINT_HASH);
    }

    #[test]
    fn test_pc_hash_known_values() {
        assert_eq!(pc_hash(0), 0x6385_2afc);
        assert_eq!(pc_hash(1), 0x5307_5d44);
        assert_eq!(pc_hash(2), 0xc61f_a2f4);
        assert_eq!(pc_hash(5), 0x67c2_5ef7);
    }
}
