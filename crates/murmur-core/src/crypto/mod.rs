//! Key derivation and cipher operations for Murmur.
//!
//! This module provides the stateless cryptographic layer:
//! - **AES-256-GCM**: authenticated sealing of protected fields
//! - **PBKDF2-HMAC-SHA256**: PIN-based key derivation for encrypted tags
//! - **SHA-256**: salted PIN hashes for verification
//!
//! ## Security Model
//!
//! - Every seal uses a fresh random nonce stored inside the sealed blob
//! - Key material is zeroized from memory on drop
//! - No plaintext PINs are stored
//!
//! ## Threat Model
//!
//! We defend against:
//! - Theft of the journal database
//! - Reading entries of a locked tag while the app is running
//!
//! We do NOT defend against:
//! - Compromised OS / keylogger
//! - Access to an unlocked session / memory

pub mod cipher;
pub mod key;
pub mod pin;

pub use cipher::{open, open_string, seal, seal_detached, seal_string};
pub use key::{derive_key, generate_random_key, generate_salt, SymmetricKey};
pub use pin::{hash_pin, validate_pin, verify_pin};
