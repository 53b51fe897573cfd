//! Shared utilities used across the agent's crates.
//!
//! Provides the crypto building blocks the fallback uploader depends on
//! (hybrid encryption, compression), the SQLite storage primitives backing
//! the durable queue, the cron parser the local scheduler depends on, and a
//! couple of small serde/macro helpers shared by the domain crate.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod crypto;
pub mod storage;
pub mod time;
#[macro_use]
pub mod utils;

// Re-export commonly used types and traits for convenience
pub use crypto::hybrid::{decrypt as hybrid_decrypt, encrypt as hybrid_encrypt};
pub use crypto::{
    compress, decompress, parse_private_key_pem, parse_public_key_pem, CompressionError,
    HybridCryptoError,
};
pub use utils::serde::duration_millis;
