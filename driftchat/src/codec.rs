//! Content transform layer for the delivery pipeline.
//!
//! Defines the [`ContentCodec`] trait applied to payloads on their way to
//! and from the store. The deployed scheme has alternated between
//! asymmetric, symmetric, and no encryption, so the pipeline never
//! hard-codes one: it is handed a codec at construction time and calls
//! `encode` before persisting and `decode` after reading.
//!
//! Two implementations ship in-tree: [`IdentityCodec`] (no transform) and
//! [`XorCodec`], a placeholder symmetric transform for exercising the
//! pipeline's encode/decode seam in tests. `XorCodec` is **not
//! cryptographically secure** — a real scheme plugs in behind the same
//! trait.

/// Errors that can occur while transforming content.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The outgoing transform failed.
    #[error("content encode failed: {0}")]
    EncodeFailed(String),

    /// The stored form could not be decoded (corrupted or produced by a
    /// different codec).
    #[error("content decode failed: {0}")]
    DecodeFailed(String),
}

/// Transform applied to message content before persistence and reversed
/// on read.
///
/// Implementations must round-trip: `decode(encode(s)) == s` for any
/// string `s`.
pub trait ContentCodec: Send + Sync {
    /// Transforms plaintext content into its stored form.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::EncodeFailed`] if the transform cannot be
    /// applied.
    fn encode(&self, plain: &str) -> Result<String, CodecError>;

    /// Recovers plaintext content from its stored form.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::DecodeFailed`] if the stored form is
    /// corrupted or was produced by a different codec.
    fn decode(&self, stored: &str) -> Result<String, CodecError>;
}

/// No-op codec: content is stored as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl ContentCodec for IdentityCodec {
    fn encode(&self, plain: &str) -> Result<String, CodecError> {
        Ok(plain.to_owned())
    }

    fn decode(&self, stored: &str) -> Result<String, CodecError> {
        Ok(stored.to_owned())
    }
}

/// Placeholder symmetric codec: repeating-key XOR over the UTF-8 bytes,
/// hex-encoded for storage.
///
/// Provides **zero** cryptographic security. It only guarantees that the
/// stored form differs from the plaintext, which is what the pipeline
/// tests need: two independently encoded copies of the same plaintext are
/// byte-identical here but ciphertext-distinct under a real scheme, and
/// the read path must not rely on either.
#[derive(Debug, Clone)]
pub struct XorCodec {
    key: Vec<u8>,
}

impl XorCodec {
    /// Creates a codec with the given key. An empty key behaves like the
    /// identity transform over bytes (still hex-encoded).
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn xor(&self, data: &[u8]) -> Vec<u8> {
        if self.key.is_empty() {
            return data.to_vec();
        }
        data.iter()
            .enumerate()
            .map(|(i, byte)| byte ^ self.key[i % self.key.len()])
            .collect()
    }
}

impl Default for XorCodec {
    fn default() -> Self {
        Self::new(*b"driftchat-placeholder-key")
    }
}

impl ContentCodec for XorCodec {
    fn encode(&self, plain: &str) -> Result<String, CodecError> {
        use std::fmt::Write;

        let mut out = String::with_capacity(plain.len() * 2);
        for byte in self.xor(plain.as_bytes()) {
            write!(out, "{byte:02x}")
                .map_err(|e| CodecError::EncodeFailed(e.to_string()))?;
        }
        Ok(out)
    }

    fn decode(&self, stored: &str) -> Result<String, CodecError> {
        if stored.len() % 2 != 0 {
            return Err(CodecError::DecodeFailed(
                "odd-length hex payload".to_owned(),
            ));
        }
        let mut bytes = Vec::with_capacity(stored.len() / 2);
        for pair in stored.as_bytes().chunks(2) {
            let hex = std::str::from_utf8(pair)
                .map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
            bytes.push(byte);
        }
        let plain = self.xor(&bytes);
        String::from_utf8(plain).map_err(|e| CodecError::DecodeFailed(e.to_string()))
    }
}
