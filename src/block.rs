//! The on-disk block record: a fixed-size header followed by payload bytes.
//!
//! Every block occupies exactly [`BLOCK_SIZE`] bytes in the archive, at the
//! offset `block_index * BLOCK_SIZE`. Multi-block files are linked through
//! `next_block`; the last block of a chain points at itself.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{ArchiveError, ArchiveResult};

/// On-disk size of one block.
pub const BLOCK_SIZE: usize = 1024;
/// Serialized size of [`BlockHeader`], reserved tail included.
pub const HEADER_SIZE: usize = 64;
/// Payload bytes available per block.
pub const PAYLOAD_SIZE: usize = BLOCK_SIZE - HEADER_SIZE;
/// Capacity of the name field, NUL terminator included.
pub const FILE_NAME_SIZE: usize = 30;
/// Capacity of the processor tag field: 4 ASCII chars + NUL.
pub const PROCESSOR_TAG_SIZE: usize = 5;

const RESERVED_SIZE: usize = 7;

/// Fixed little-endian block header.
///
/// Field order and sizes are frozen; archives are portable across builds.
///
/// | offset | size | field          |
/// |-------:|-----:|----------------|
/// |      0 |    8 | `block_index`  |
/// |      8 |    8 | `next_block`   |
/// |     16 |    4 | `data_len`     |
/// |     20 |    1 | `is_empty`     |
/// |     21 |    1 | `is_processed` |
/// |     22 |    5 | `processor_tag`|
/// |     27 |   30 | `file_name`    |
/// |     57 |    7 | reserved (NUL) |
#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub block_index: u64,
    /// Index of the next block of the same file; equal to `block_index` on
    /// the last block of a chain.
    pub next_block: u64,
    /// Valid payload bytes in this block (≤ [`PAYLOAD_SIZE`]).
    pub data_len: u32,
    /// Tombstone flag — the block is unreferenced and reusable.
    pub is_empty: bool,
    /// Set when the payload was produced by a processor.
    pub is_processed: bool,
    /// NUL-padded ASCII tag; meaningful only when `is_processed`.
    pub processor_tag: [u8; PROCESSOR_TAG_SIZE],
    /// NUL-padded archive-relative file name.
    pub file_name: [u8; FILE_NAME_SIZE],
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            block_index: 0,
            next_block: 0,
            data_len: 0,
            is_empty: false,
            is_processed: false,
            processor_tag: [0; PROCESSOR_TAG_SIZE],
            file_name: [0; FILE_NAME_SIZE],
        }
    }
}

impl BlockHeader {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.block_index)?;
        writer.write_u64::<LittleEndian>(self.next_block)?;
        writer.write_u32::<LittleEndian>(self.data_len)?;
        writer.write_u8(self.is_empty as u8)?;
        writer.write_u8(self.is_processed as u8)?;
        writer.write_all(&self.processor_tag)?;
        writer.write_all(&self.file_name)?;
        writer.write_all(&[0u8; RESERVED_SIZE])?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let block_index = reader.read_u64::<LittleEndian>()?;
        let next_block = reader.read_u64::<LittleEndian>()?;
        let data_len = reader.read_u32::<LittleEndian>()?;
        let is_empty = reader.read_u8()? != 0;
        let is_processed = reader.read_u8()? != 0;
        let mut processor_tag = [0u8; PROCESSOR_TAG_SIZE];
        reader.read_exact(&mut processor_tag)?;
        let mut file_name = [0u8; FILE_NAME_SIZE];
        reader.read_exact(&mut file_name)?;
        let mut reserved = [0u8; RESERVED_SIZE];
        reader.read_exact(&mut reserved)?;

        Ok(Self {
            block_index,
            next_block,
            data_len,
            is_empty,
            is_processed,
            processor_tag,
            file_name,
        })
    }

    /// True on the last block of a chain (self-loop sentinel).
    pub fn is_last(&self) -> bool {
        self.next_block == self.block_index
    }

    /// Stored file name up to the first NUL.
    pub fn file_name(&self) -> &str {
        field_str(&self.file_name)
    }

    /// Stored processor tag up to the first NUL.
    pub fn processor_tag(&self) -> &str {
        field_str(&self.processor_tag)
    }

    /// Store `name`, NUL-padding the field. A terminating NUL must fit.
    pub fn set_file_name(&mut self, name: &str) -> ArchiveResult<()> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() >= FILE_NAME_SIZE || bytes.contains(&0) {
            return Err(ArchiveError::BadFilename(name.to_owned()));
        }
        self.file_name = [0; FILE_NAME_SIZE];
        self.file_name[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Store a processor tag of at most 4 ASCII bytes.
    pub fn set_processor_tag(&mut self, tag: &str) -> ArchiveResult<()> {
        let bytes = tag.as_bytes();
        if bytes.is_empty() || bytes.len() >= PROCESSOR_TAG_SIZE || !tag.is_ascii() {
            return Err(ArchiveError::BadProcessor(tag.to_owned()));
        }
        self.processor_tag = [0; PROCESSOR_TAG_SIZE];
        self.processor_tag[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

fn field_str(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).unwrap_or_default()
}

/// One archive block: header plus full-capacity payload.
///
/// Blocks are plain values — produced by the codec, consumed by callers,
/// never shared. The payload tail past `data_len` stays NUL so a written
/// block is always fully determined.
#[derive(Debug, Clone)]
pub struct Block {
    pub header: BlockHeader,
    pub payload: [u8; PAYLOAD_SIZE],
}

impl Default for Block {
    fn default() -> Self {
        Self {
            header: BlockHeader::default(),
            payload: [0; PAYLOAD_SIZE],
        }
    }
}

impl Block {
    /// A tombstone at `index`: empty, zero-length, self-linked, nameless.
    pub fn tombstone(index: u64) -> Self {
        let mut block = Block::default();
        block.header.block_index = index;
        block.header.next_block = index;
        block.header.is_empty = true;
        block
    }

    /// Valid payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.payload[..self.header.data_len as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_layout_is_exactly_header_size() {
        let mut buf = Vec::new();
        BlockHeader::default().write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(PAYLOAD_SIZE, BLOCK_SIZE - HEADER_SIZE);
    }

    #[test]
    fn header_round_trip() {
        let mut header = BlockHeader {
            block_index: 7,
            next_block: 9,
            data_len: 123,
            is_empty: false,
            is_processed: true,
            ..BlockHeader::default()
        };
        header.set_file_name("notes.txt").unwrap();
        header.set_processor_tag("comp").unwrap();

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let back = BlockHeader::read(Cursor::new(&buf)).unwrap();

        assert_eq!(back.block_index, 7);
        assert_eq!(back.next_block, 9);
        assert_eq!(back.data_len, 123);
        assert!(!back.is_empty);
        assert!(back.is_processed);
        assert_eq!(back.file_name(), "notes.txt");
        assert_eq!(back.processor_tag(), "comp");
        assert!(!back.is_last());
    }

    #[test]
    fn over_long_name_is_rejected() {
        let mut header = BlockHeader::default();
        let long = "x".repeat(FILE_NAME_SIZE);
        assert!(matches!(
            header.set_file_name(&long),
            Err(ArchiveError::BadFilename(_))
        ));
        // FILE_NAME_SIZE - 1 bytes is the longest name that still fits a NUL.
        let ok = "x".repeat(FILE_NAME_SIZE - 1);
        header.set_file_name(&ok).unwrap();
        assert_eq!(header.file_name(), ok);
    }

    #[test]
    fn over_long_tag_is_rejected() {
        let mut header = BlockHeader::default();
        assert!(header.set_processor_tag("toolong").is_err());
        header.set_processor_tag("comp").unwrap();
        assert_eq!(header.processor_tag(), "comp");
    }

    #[test]
    fn tombstone_is_self_linked() {
        let block = Block::tombstone(4);
        assert!(block.header.is_empty);
        assert!(block.header.is_last());
        assert_eq!(block.header.data_len, 0);
        assert_eq!(block.header.file_name(), "");
    }
}
