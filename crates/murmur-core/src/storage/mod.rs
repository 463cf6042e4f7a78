//! Storage abstraction layer.
//!
//! The storage layer persists tags and entries. Protection happens before
//! data reaches it: backends store whatever plaintext or ciphertext the
//! coordinator produced.

pub mod sqlite;
pub mod traits;
pub mod types;

pub use sqlite::SqliteStorage;
pub use traits::StorageEngine;
pub use types::{
    Entry, EntryFilter, EntryTag, FieldName, JournalMetadata, ProtectedField, Tag, TagCredential,
};
