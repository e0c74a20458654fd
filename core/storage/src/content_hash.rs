//! Content hash used by the remote service to fingerprint file contents.
//!
//! The payload is split into 4 MiB blocks, each block is hashed with SHA-256,
//! the block digests are concatenated and the concatenation is hashed again.
//! The result must match the server-side value byte for byte, since it is
//! compared against `Entry::content_hash` to decide whether an upload can be
//! skipped.

use sha2::{Digest, Sha256};

/// Block size of the two-level hash.
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Incremental content hasher.
///
/// Data may be fed in pieces of any size; the result only depends on the
/// concatenated bytes.
#[derive(Clone, Default)]
pub struct ContentHasher {
    block: Sha256,
    block_len: usize,
    digests: Vec<u8>,
}

impl ContentHasher {
    /// Create a hasher with no data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes.
    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = (BLOCK_SIZE - self.block_len).min(data.len());
            self.block.update(&data[..take]);
            self.block_len += take;
            data = &data[take..];

            if self.block_len == BLOCK_SIZE {
                self.flush_block();
            }
        }
    }

    /// Finish and return the lowercase hex digest.
    pub fn finalize(mut self) -> String {
        if self.block_len > 0 {
            self.flush_block();
        }
        format!("{:x}", Sha256::digest(&self.digests))
    }

    fn flush_block(&mut self) {
        let digest = std::mem::take(&mut self.block).finalize();
        self.digests.extend_from_slice(&digest);
        self.block_len = 0;
    }
}

/// Compute the content hash of a complete payload.
///
/// An empty payload has no blocks, so the result is the SHA-256 of the empty
/// byte sequence.
pub fn compute_hash(payload: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(payload);
    hasher.finalize()
}
