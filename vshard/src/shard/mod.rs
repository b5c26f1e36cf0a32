//! Key placement - shard selection and key normalization
//!
//! Both halves are pure functions of their input and carry no shared state:
//! - Shard selection: 64-bit fingerprint (MD5, FarmHash, xxHash) + jump hash
//! - Key normalization: identity or fingerprint rewrite of the stored key

pub mod jump;
pub mod normalizer;
pub mod selector;

pub use jump::jump_hash;
pub use normalizer::KeyNormalization;
pub use selector::HashAlgorithm;
