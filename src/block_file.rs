//! `BlockFile` — the backing file handle.
//!
//! Every other component addresses the file exclusively through positioned
//! operations at multiples of [`BLOCK_SIZE`], except `IndexCodec`, which
//! reads/writes individual scalar fields inside the OID-0 chain.
//!
//! On open in read-write mode the file is created if absent; in read-only
//! mode it must already exist.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Fixed block size in bytes. Every object block and every index chain
/// block occupies exactly this many bytes on disk.
pub const BLOCK_SIZE: u64 = 256;

/// OID reserved for the internal index.
pub const INDEX_OID: i64 = 0;

/// The application root OID (reserved, never a data object without
/// `reserve`/`write` being called on it first).
pub const ROOT_OID: i64 = 1;

pub struct BlockFile {
    file: File,
    read_only: bool,
}

impl BlockFile {
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> std::io::Result<Self> {
        let file = if read_only {
            OpenOptions::new().read(true).open(path)?
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?
        };
        Ok(Self { file, read_only })
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn len(&mut self) -> std::io::Result<u64> {
        self.file.seek(SeekFrom::End(0))
    }

    pub fn set_len(&mut self, n: u64) -> std::io::Result<()> {
        self.file.set_len(n)
    }

    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

/// Round `n` up to the nearest multiple of [`BLOCK_SIZE`].
pub fn round_up_to_block(n: u64) -> u64 {
    let rem = n % BLOCK_SIZE;
    if rem == 0 {
        n
    } else {
        n + (BLOCK_SIZE - rem)
    }
}
