//! # fxstore — a single-file, self-describing fixed-block object store
//!
//! Format guarantees:
//! - Maps a 64-bit OID to an opaque byte payload of arbitrary size
//! - The file is a sequence of fixed [`block_file::BLOCK_SIZE`]-byte blocks;
//!   block 0 is always the head of the OID-index chain
//! - Free blocks are reused before the file is extended
//! - The index is rewritten in place at close, so the file is self-
//!   contained and reopenable with no sidecar
//! - All on-disk integers are little-endian
//!
//! Out of scope here (external collaborators): the string-keyed blob façade
//! mapping names to OIDs, the transaction wrapper doing OID remapping with
//! commit/rollback, and multi-writer concurrency.

pub mod allocator;
pub mod block_file;
pub mod error;
pub mod free_space;
pub mod index;
pub mod index_codec;
pub mod object_stream;
pub mod store;

pub use allocator::Allocator;
pub use block_file::{BlockFile, BLOCK_SIZE, INDEX_OID, ROOT_OID};
pub use error::{Result, StoreError};
pub use free_space::FreeSpace;
pub use index::{ObjectBlock, ObjectIndex};
pub use index_codec::IndexCodec;
pub use object_stream::{ObjectStream, SeekOrigin};
pub use store::ObjectStore;
