//! Shared cryptographic primitives used across runtime and platform features.

pub mod compression;
pub mod hybrid;

pub use compression::{compress, decompress, CompressionError};
pub use hybrid::{parse_private_key_pem, parse_public_key_pem, HybridCryptoError};
