//! Feature-hashing embedder.
//!
//! Each lowercase alphanumeric token is hashed with SHA-256; the first
//! eight bytes pick a bucket and the ninth picks a sign. Texts that share
//! words land close together, which is enough for offline use and
//! reproducible tests. No model download, no network.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use portfolio_rag_core::embedding::EmbeddingProvider;

pub const DEFAULT_HASH_DIMS: usize = 256;
pub const HASH_MODEL_NAME: &str = "feature-hash-v1";

pub struct HashProvider {
    dims: usize,
}

impl HashProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        v
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        HASH_MODEL_NAME
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
