//! The store's single failure domain.
//!
//! Unlike the teacher format's per-subsystem error enums, every component
//! here (`BlockFile`, `FreeSpace`, `ObjectIndex`, `Allocator`, `IndexCodec`,
//! `ObjectStream`) shares one open file and one lock, so one enum covers
//! all of them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised by operations that require a present OID (`reserve` on an
    /// already-claimed OID not covered here; this is for collaborators that
    /// need an object to already exist). `read()` itself returns `None`
    /// for an absent OID rather than this variant.
    #[error("OID {oid} not found")]
    NotFound { oid: i64 },

    #[error("OID {oid} already present in the index")]
    DuplicateOid { oid: i64 },

    #[error("OID space exhausted")]
    CapacityExhausted,

    #[error("seek before the start of the stream")]
    UnexpectedEof,

    #[error("index corruption: {0}")]
    Corruption(String),

    #[error("store is read-only")]
    ReadOnly,
}

pub type Result<T> = std::result::Result<T, StoreError>;
