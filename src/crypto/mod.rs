//! Streaming sign-then-encrypt transform (§4.1).
//!
//! The codec is the one piece of this crate's "external collaborators"
//! (§1) that ships a concrete implementation rather than only a trait,
//! since the core needs something to actually round-trip bytes through in
//! its own test suite. It combines `crypto_secretbox` (XSalsa20Poly1305,
//! the same "secretbox" primitive as NaCl) with `ed25519-dalek` signing,
//! under the fixed 16-byte nonce prefix mandated by the external
//! interface (§6) — safe only because [`SignEncrypter::encrypt`]
//! generates a fresh symmetric key on every call.

pub mod sign_encrypt;

pub use sign_encrypt::{DecryptOutput, EncryptKeys, EncryptOutput, SignDecrypter, SignEncrypter};

/// The fixed 16-byte nonce prefix, ASCII `"kbchatattachment"`. Carried as
/// an immutable value alongside the codec, never as process-wide state.
pub const NONCE_PREFIX: [u8; 16] = *b"kbchatattachment";

/// Plaintext bytes encoded per chunk before framing/sealing overhead.
pub const CHUNK_SIZE: usize = 1 << 20;

/// Bytes of overhead contributed by each chunk: a 64-byte Ed25519
/// signature, a 1-byte "is final chunk" flag, a 16-byte Poly1305 tag, and
/// a 4-byte big-endian length prefix.
pub const CHUNK_OVERHEAD: u64 = 64 + 1 + 16 + 4;

/// Bytes of overhead contributed once per stream: the 1-byte format
/// version preceding the first chunk.
pub const STREAM_OVERHEAD: u64 = 1;

/// Deterministic ciphertext size for a plaintext of `plaintext_size`
/// bytes. Exposed so uploaders can pre-announce size to the store without
/// draining the reader (§4.1, Testable Property 3).
#[must_use]
pub fn encrypted_len(plaintext_size: u64) -> u64 {
    let chunks = chunk_count(plaintext_size);
    STREAM_OVERHEAD + chunks * CHUNK_OVERHEAD + plaintext_size
}

/// Number of chunks a plaintext of this size will be split into. A
/// zero-byte plaintext still produces exactly one (empty) chunk so the
/// stream always has a signed, authenticated "final" marker.
#[must_use]
pub fn chunk_count(plaintext_size: u64) -> u64 {
    if plaintext_size == 0 {
        1
    } else {
        plaintext_size.div_ceil(CHUNK_SIZE as u64)
    }
}
