//! Raw block transfer between streams and [`Block`] values.
//!
//! The codec moves whole blocks to and from the archive stream and payload
//! bytes to and from plain (non-archive) streams. It knows nothing about
//! chains, the TOC, or processors — that is the archive's job.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::block::{Block, BlockHeader, BLOCK_SIZE, HEADER_SIZE, PAYLOAD_SIZE};
use crate::error::{ArchiveError, ArchiveResult};

/// Read the block at `index` from an archive stream.
///
/// Seeks to `index * BLOCK_SIZE` and reads one block. A short read is
/// NUL-padded (the final block of a truncated archive); reading nothing at
/// all is a `FileRead` error.
pub fn read_block<R: Read + Seek>(stream: &mut R, index: u64) -> ArchiveResult<Block> {
    stream
        .seek(SeekFrom::Start(index * BLOCK_SIZE as u64))
        .map_err(ArchiveError::FileSeek)?;

    let mut buf = [0u8; BLOCK_SIZE];
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArchiveError::FileRead(e)),
        }
    }
    if filled < HEADER_SIZE {
        return Err(ArchiveError::FileRead(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("short read at block {index}: {filled} bytes"),
        )));
    }

    let header = BlockHeader::read(&buf[..HEADER_SIZE]).map_err(ArchiveError::FileRead)?;
    if header.data_len as usize > PAYLOAD_SIZE {
        return Err(ArchiveError::BadBlockDataLength(header.data_len));
    }

    let mut block = Block {
        header,
        payload: [0; PAYLOAD_SIZE],
    };
    block.payload.copy_from_slice(&buf[HEADER_SIZE..]);
    Ok(block)
}

/// Write `block` at `index` in an archive stream.
///
/// Always emits exactly `BLOCK_SIZE` bytes; the payload tail past `data_len`
/// is NUL in the block value, so padding comes for free.
pub fn write_block<W: Write + Seek>(stream: &mut W, index: u64, block: &Block) -> ArchiveResult<()> {
    if block.header.data_len as usize > PAYLOAD_SIZE {
        return Err(ArchiveError::BadBlockDataLength(block.header.data_len));
    }
    stream
        .seek(SeekFrom::Start(index * BLOCK_SIZE as u64))
        .map_err(ArchiveError::FileSeek)?;
    block.header.write(&mut *stream).map_err(ArchiveError::FileWrite)?;
    stream.write_all(&block.payload).map_err(ArchiveError::FileWrite)?;
    Ok(())
}

/// Fill a block's payload from a plain stream.
///
/// Reads up to [`PAYLOAD_SIZE`] bytes, sets `data_len` to the bytes actually
/// read, and clears the tombstone flag. Returns the byte count (zero at EOF).
pub fn read_payload<R: Read>(stream: &mut R, block: &mut Block) -> ArchiveResult<usize> {
    block.payload = [0; PAYLOAD_SIZE];
    let mut filled = 0;
    while filled < PAYLOAD_SIZE {
        match stream.read(&mut block.payload[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArchiveError::FileRead(e)),
        }
    }
    block.header.data_len = filled as u32;
    block.header.is_empty = false;
    Ok(filled)
}

/// Write exactly `data_len` payload bytes to a plain stream — no header, no
/// padding.
pub fn write_payload<W: Write>(stream: &mut W, block: &Block) -> ArchiveResult<()> {
    stream.write_all(block.data()).map_err(ArchiveError::FileWrite)
}
