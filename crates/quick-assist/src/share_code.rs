//! Share code generation. Codes are short enough to read aloud and typed
//! from an alphabet with no visually ambiguous glyphs; uniqueness against
//! live sessions is the registry's job, not the generator's.

use rand::Rng;

/// 32 uppercase alphanumerics, excluding 0/O and 1/I.
pub const ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const CODE_LEN: usize = 6;

pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively and ignore surrounding whitespace.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
