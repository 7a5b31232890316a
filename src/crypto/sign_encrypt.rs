use crate::crypto::{CHUNK_SIZE, NONCE_PREFIX};
use crate::error::{AttachmentError, Result};
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

const FORMAT_VERSION: u8 = 1;
const PIPE_CAPACITY: usize = 64 * 1024;
const SIGNATURE_LEN: usize = 64;

/// The ephemeral key set bound to one `encrypt` call (§3). Never reused
/// across uploads: a fresh [`EncryptKeys`] is produced on every call to
/// [`SignEncrypter::encrypt`].
#[derive(Clone)]
pub struct EncryptKeys {
    pub enc_key: [u8; 32],
    sign_key: [u8; 32],
    pub verify_key: [u8; 32],
}

impl std::fmt::Debug for EncryptKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptKeys").finish_non_exhaustive()
    }
}

/// The ciphertext reader, the key material committed to producing it,
/// and the background pipe's eventual result, returned together so that
/// no API path can obtain a reader without the other two (§9,
/// ephemeral-key lifecycle design note). Callers must `await` `result`
/// after fully reading `reader` — a plaintext read error ends the pipe
/// early, which otherwise looks like an ordinary short EOF to anything
/// draining `reader` alone.
pub struct EncryptOutput {
    pub reader: DuplexStream,
    pub keys: EncryptKeys,
    pub result: JoinHandle<Result<()>>,
}

/// Streaming sign-then-encrypt transform (§4.1). A fresh symmetric key
/// and signing key pair are generated on every [`encrypt`](Self::encrypt)
/// call; this is the single most important invariant of the component,
/// since the wire nonce prefix is a fixed constant.
#[derive(Default)]
pub struct SignEncrypter {
    last_keys: Option<EncryptKeys>,
}

impl SignEncrypter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic ciphertext size for a given plaintext size.
    #[must_use]
    pub fn encrypted_len(plaintext_size: u64) -> u64 {
        crate::crypto::encrypted_len(plaintext_size)
    }

    /// The symmetric key bound by the most recent `encrypt` call.
    /// Undefined (returns `None`) before the first call.
    #[must_use]
    pub fn encrypt_key(&self) -> Option<[u8; 32]> {
        self.last_keys.as_ref().map(|k| k.enc_key)
    }

    /// The signing public key bound by the most recent `encrypt` call.
    #[must_use]
    pub fn verify_key(&self) -> Option<[u8; 32]> {
        self.last_keys.as_ref().map(|k| k.verify_key)
    }

    /// Generates a fresh key set, binds it to this instance, and returns
    /// a reader that lazily produces the sign-then-encrypt encoding of
    /// `plaintext` under those keys and the fixed nonce prefix.
    ///
    /// # Errors
    /// Returns [`AttachmentError::KeyGenerationFailed`] if the entropy
    /// source fails.
    pub fn encrypt<R>(&mut self, plaintext: R) -> Result<EncryptOutput>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let keys = generate_keys()?;
        self.last_keys = Some(keys.clone());

        let (writer_side, reader_side) = tokio::io::duplex(PIPE_CAPACITY);
        let result = tokio::spawn(run_encrypt_pipe(plaintext, writer_side, keys.clone()));

        Ok(EncryptOutput {
            reader: reader_side,
            keys,
            result,
        })
    }
}

fn generate_keys() -> Result<EncryptKeys> {
    let mut enc_key = [0u8; 32];
    rand::rngs::OsRng.try_fill_bytes(&mut enc_key).map_err(|e| {
        AttachmentError::KeyGenerationFailed(format!("symmetric key generation failed: {e}"))
    })?;

    let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
    let verify_key = signing_key.verifying_key().to_bytes();

    Ok(EncryptKeys {
        enc_key,
        sign_key: signing_key.to_bytes(),
        verify_key,
    })
}

async fn run_encrypt_pipe<R>(mut plaintext: R, mut sink: DuplexStream, keys: EncryptKeys) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let cipher = XSalsa20Poly1305::new(Key::from_slice(&keys.enc_key));
    let signing_key = SigningKey::from_bytes(&keys.sign_key);

    if sink.write_all(&[FORMAT_VERSION]).await.is_err() {
        // Consumer dropped the reader before the first byte; nothing
        // left to produce.
        return Ok(());
    }

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut chunk_index: u64 = 0;

    loop {
        let (n, eof) = read_chunk(&mut plaintext, &mut buf)
            .await
            .map_err(|e| AttachmentError::PlaintextReadFailed(anyhow::anyhow!(e)))?;

        let frame = seal_chunk(&cipher, &signing_key, chunk_index, eof, &buf[..n]);
        let len_prefix = u32::try_from(frame.len()).unwrap_or(u32::MAX).to_be_bytes();

        if sink.write_all(&len_prefix).await.is_err() || sink.write_all(&frame).await.is_err() {
            return Ok(());
        }

        if eof {
            return Ok(());
        }
        chunk_index += 1;
    }
}

/// Reads up to `buf.len()` bytes, short only at end-of-stream. Returns
/// `(n, is_last)`.
async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::io::Result<(usize, bool)> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Ok((filled, true));
        }
        filled += n;
    }
    Ok((filled, false))
}

fn seal_chunk(
    cipher: &XSalsa20Poly1305,
    signing_key: &SigningKey,
    chunk_index: u64,
    is_last: bool,
    plaintext_chunk: &[u8],
) -> Vec<u8> {
    let mut framed = Vec::with_capacity(1 + plaintext_chunk.len());
    framed.push(u8::from(is_last));
    framed.extend_from_slice(plaintext_chunk);

    let mut sign_payload = Vec::with_capacity(8 + framed.len());
    sign_payload.extend_from_slice(&chunk_index.to_be_bytes());
    sign_payload.extend_from_slice(&framed);
    let signature = signing_key.sign(&sign_payload);

    let mut sealed_input = Vec::with_capacity(SIGNATURE_LEN + framed.len());
    sealed_input.extend_from_slice(&signature.to_bytes());
    sealed_input.extend_from_slice(&framed);

    let nonce = chunk_nonce(chunk_index);
    #[allow(clippy::expect_used)]
    cipher
        .encrypt(Nonce::from_slice(&nonce), sealed_input.as_ref())
        .expect("secretbox sealing with a fixed-size key/nonce cannot fail")
}

fn chunk_nonce(chunk_index: u64) -> [u8; 24] {
    let mut nonce = [0u8; 24];
    nonce[..16].copy_from_slice(&NONCE_PREFIX);
    nonce[16..].copy_from_slice(&chunk_index.to_be_bytes());
    nonce
}

/// The reader half of a decrypt pipeline, paired with the background
/// task's eventual result. Callers must `await` `result` after fully
/// reading `reader` to learn whether decoding actually succeeded — an
/// authentication or signature failure partway through the stream ends
/// the pipe early, which otherwise looks like an ordinary EOF.
pub struct DecryptOutput {
    pub reader: DuplexStream,
    pub result: JoinHandle<Result<()>>,
}

/// Inverse of [`SignEncrypter::encrypt`]. Construction is infallible;
/// errors (authentication failure, truncation, signature mismatch)
/// surface from `result` after the reader is drained.
#[derive(Default)]
pub struct SignDecrypter;

impl SignDecrypter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn decrypt<R>(&self, ciphertext: R, enc_key: [u8; 32], verify_key: [u8; 32]) -> DecryptOutput
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (writer_side, reader_side) = tokio::io::duplex(PIPE_CAPACITY);
        let result = tokio::spawn(run_decrypt_pipe(ciphertext, writer_side, enc_key, verify_key));
        DecryptOutput {
            reader: reader_side,
            result,
        }
    }
}

async fn run_decrypt_pipe<R>(
    mut source: R,
    mut sink: DuplexStream,
    enc_key: [u8; 32],
    verify_key: [u8; 32],
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let cipher = XSalsa20Poly1305::new(Key::from_slice(&enc_key));
    let verifying_key = VerifyingKey::from_bytes(&verify_key)
        .map_err(|_| AttachmentError::IntegrityFailure)?;

    let mut version = [0u8; 1];
    source
        .read_exact(&mut version)
        .await
        .map_err(|_| AttachmentError::IntegrityFailure)?;
    if version[0] != FORMAT_VERSION {
        return Err(AttachmentError::IntegrityFailure);
    }

    let mut chunk_index: u64 = 0;
    loop {
        let mut len_buf = [0u8; 4];
        source
            .read_exact(&mut len_buf)
            .await
            .map_err(|_| AttachmentError::IntegrityFailure)?;
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut sealed = vec![0u8; len];
        source
            .read_exact(&mut sealed)
            .await
            .map_err(|_| AttachmentError::IntegrityFailure)?;

        let nonce = chunk_nonce(chunk_index);
        let opened = cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_ref())
            .map_err(|_| AttachmentError::IntegrityFailure)?;

        if opened.len() < SIGNATURE_LEN + 1 {
            return Err(AttachmentError::IntegrityFailure);
        }
        let (signature_bytes, framed) = opened.split_at(SIGNATURE_LEN);
        let signature = Signature::from_slice(signature_bytes)
            .map_err(|_| AttachmentError::IntegrityFailure)?;

        let mut sign_payload = Vec::with_capacity(8 + framed.len());
        sign_payload.extend_from_slice(&chunk_index.to_be_bytes());
        sign_payload.extend_from_slice(framed);
        verifying_key
            .verify(&sign_payload, &signature)
            .map_err(|_| AttachmentError::IntegrityFailure)?;

        let is_last = framed[0] == 1;
        let plaintext_chunk = &framed[1..];

        if sink.write_all(plaintext_chunk).await.is_err() {
            // Consumer dropped the reader; nothing left to verify.
            return Ok(());
        }

        if is_last {
            return Ok(());
        }
        chunk_index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    async fn round_trip(plaintext: Vec<u8>) -> Vec<u8> {
        let mut encrypter = SignEncrypter::new();
        let output = encrypter.encrypt(Cursor::new(plaintext)).unwrap();
        let keys = output.keys.clone();

        let decrypter = SignDecrypter::new();
        let decrypt_output = decrypter.decrypt(output.reader, keys.enc_key, keys.verify_key);

        let mut plaintext_out = Vec::new();
        let mut reader = decrypt_output.reader;
        tokio::io::copy(&mut reader, &mut plaintext_out)
            .await
            .unwrap();
        decrypt_output.result.await.unwrap().unwrap();
        plaintext_out
    }

    #[tokio::test]
    async fn round_trips_empty_plaintext() {
        assert_eq!(round_trip(Vec::new()).await, Vec::new() as Vec<u8>);
    }

    #[tokio::test]
    async fn round_trips_small_plaintext() {
        let data = b"hello".to_vec();
        assert_eq!(round_trip(data.clone()).await, data);
    }

    #[tokio::test]
    async fn round_trips_multi_chunk_plaintext() {
        let data = vec![0x5Au8; CHUNK_SIZE + 1];
        assert_eq!(round_trip(data.clone()).await, data);
    }

    #[tokio::test]
    async fn encrypted_len_matches_actual_output_size() {
        let data = vec![7u8; CHUNK_SIZE + 123];
        let expected = SignEncrypter::encrypted_len(data.len() as u64);

        let mut encrypter = SignEncrypter::new();
        let output = encrypter.encrypt(Cursor::new(data)).unwrap();
        let mut ciphertext = Vec::new();
        let mut reader = output.reader;
        tokio::io::copy(&mut reader, &mut ciphertext).await.unwrap();

        assert_eq!(ciphertext.len() as u64, expected);
    }

    #[tokio::test]
    async fn successive_encrypt_calls_yield_fresh_keys() {
        let mut encrypter = SignEncrypter::new();
        let a = encrypter.encrypt(Cursor::new(b"one".to_vec())).unwrap();
        let b = encrypter.encrypt(Cursor::new(b"two".to_vec())).unwrap();
        assert_ne!(a.keys.enc_key, b.keys.enc_key);
        assert_ne!(a.keys.verify_key, b.keys.verify_key);
    }

    #[tokio::test]
    async fn corrupted_ciphertext_fails_decrypt() {
        let mut encrypter = SignEncrypter::new();
        let output = encrypter
            .encrypt(Cursor::new(vec![1u8; 10_000]))
            .unwrap();
        let keys = output.keys.clone();

        let mut ciphertext = Vec::new();
        let mut reader = output.reader;
        tokio::io::copy(&mut reader, &mut ciphertext).await.unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;

        let decrypter = SignDecrypter::new();
        let decrypt_output =
            decrypter.decrypt(Cursor::new(ciphertext), keys.enc_key, keys.verify_key);
        let mut sink = Vec::new();
        let mut reader = decrypt_output.reader;
        let _ = tokio::io::copy(&mut reader, &mut sink).await;
        let result = decrypt_output.result.await.unwrap();
        assert!(result.is_err());
    }
}
