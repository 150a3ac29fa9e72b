//! High-level [`Archive`] API — the primary embedding surface.
//!
//! ```no_run
//! use blockarc::archive::Archive;
//!
//! let mut ar = Archive::create("backup")?;          // creates backup.arc
//! ar.add("notes.txt", None)?;
//! ar.add("report.txt", Some("comp"))?;              // DEFLATE on the way in
//! ar.extract("notes.txt", "restored.txt")?;
//! let survivors = ar.compact()?;
//! # let _ = survivors;
//! # Ok::<(), blockarc::ArchiveError>(())
//! ```
//!
//! One `Archive` instance exclusively owns its host file for its lifetime.
//! All operations are synchronous and run on the caller's thread.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;

use crate::block::{Block, BlockHeader, BLOCK_SIZE, PAYLOAD_SIZE};
use crate::codec;
use crate::error::{ArchiveError, ArchiveResult};
use crate::observer::{ActionType, ObserverHandle};
use crate::processor::{reverse_path, ProcessorRegistry};
use crate::toc::Toc;

/// Lightweight descriptor returned by [`Archive::stat`].
#[derive(Debug, Clone)]
pub struct FileStat {
    pub name: String,
    pub first_block: u64,
    pub block_count: usize,
    /// Stored payload bytes (post-processing when the chain is processed).
    pub size: u64,
    pub is_processed: bool,
}

/// A fixed-block archive: host file, TOC, free-block pool, observers, and
/// the processor registry.
pub struct Archive {
    path: PathBuf,
    file: File,
    num_blocks: u64,
    toc: Toc,
    free_blocks: BTreeSet<u64>,
    observers: Vec<ObserverHandle>,
    processors: ProcessorRegistry,
}

impl Archive {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Create a new archive at `path` (`.arc` appended when absent),
    /// truncating any existing content.
    pub fn create<P: AsRef<Path>>(path: P) -> ArchiveResult<Self> {
        let arc_path = arc_file_path(path.as_ref())?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&arc_path)
            .map_err(ArchiveError::open(&arc_path))?;
        Ok(Self::from_parts(arc_path, file, 0))
    }

    /// Open an existing archive at `path` (`.arc` appended when absent) and
    /// rebuild the TOC and free-block pool by scanning every block.
    pub fn open<P: AsRef<Path>>(path: P) -> ArchiveResult<Self> {
        let arc_path = arc_file_path(path.as_ref())?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&arc_path)
            .map_err(ArchiveError::open(&arc_path))?;
        let len = file.metadata().map_err(ArchiveError::FileRead)?.len();

        let mut archive = Self::from_parts(arc_path, file, len / BLOCK_SIZE as u64);
        archive.reconstruct()?;
        Ok(archive)
    }

    fn from_parts(path: PathBuf, file: File, num_blocks: u64) -> Self {
        Self {
            path,
            file,
            num_blocks,
            toc: Toc::default(),
            free_blocks: BTreeSet::new(),
            observers: Vec::new(),
            processors: ProcessorRegistry::default(),
        }
    }

    /// Rebuild TOC and free pool from block headers.
    ///
    /// Chain heads always carry the lowest index of their chain (allocation
    /// draws the pool in ascending order), so the first non-empty block seen
    /// for a name is its first block.
    fn reconstruct(&mut self) -> ArchiveResult<()> {
        self.toc.clear();
        self.free_blocks.clear();
        for index in 0..self.num_blocks {
            let block = codec::read_block(&mut self.file, index)?;
            if block.header.is_empty {
                self.free_blocks.insert(index);
                continue;
            }
            if block.header.block_index != index {
                return Err(ArchiveError::BadArchive(format!(
                    "block at offset {index} claims index {}",
                    block.header.block_index
                )));
            }
            let name = block.header.file_name();
            if !name.is_empty() && !self.toc.contains(name) {
                self.toc.insert(name, index);
            }
        }
        Ok(())
    }

    // ── Observers ────────────────────────────────────────────────────────────

    /// Register an observer; notified synchronously, in registration order.
    pub fn add_observer(&mut self, observer: ObserverHandle) -> &mut Self {
        self.observers.push(observer);
        self
    }

    /// Unregister by handle identity.
    pub fn remove_observer(&mut self, observer: &ObserverHandle) {
        self.observers.retain(|o| !Rc::ptr_eq(o, observer));
    }

    fn notify(&self, action: ActionType, name: &str, status: bool) {
        for observer in &self.observers {
            observer.on_action(action, name, status);
        }
    }

    // ── Write path ───────────────────────────────────────────────────────────

    /// Archive the file at `path`, optionally routing it through the
    /// processor registered under `processor`.
    ///
    /// The path is opened as supplied (relative paths resolve against the
    /// caller's working directory); the stored name is its final component.
    pub fn add<P: AsRef<Path>>(&mut self, path: P, processor: Option<&str>) -> ArchiveResult<()> {
        let path = path.as_ref();
        let display = display_name(path);
        let result = self.add_inner(path, processor);
        self.notify(ActionType::Added, &display, result.is_ok());
        result
    }

    fn add_inner(&mut self, path: &Path, processor: Option<&str>) -> ArchiveResult<()> {
        let name = entry_name(path)?;
        // Capacity check before any I/O happens.
        BlockHeader::default().set_file_name(&name)?;
        if self.toc.contains(&name) {
            return Err(ArchiveError::FileExists(name));
        }

        let (ingest_path, tag) = match processor {
            Some(tag) => {
                let proc = self.processors.get(tag)?;
                (proc.process(path)?, Some(proc.tag()))
            }
            None => (path.to_owned(), None),
        };

        let mut source = File::open(&ingest_path).map_err(ArchiveError::open(&ingest_path))?;
        let len = source.metadata().map_err(ArchiveError::FileRead)?.len();
        // Zero-length files still occupy one block.
        let num_chunks = (len.div_ceil(PAYLOAD_SIZE as u64)).max(1);

        // Draw freed blocks lowest-first; grow only when the pool runs dry.
        let mut indices = Vec::with_capacity(num_chunks as usize);
        for _ in 0..num_chunks {
            match self.free_blocks.pop_first() {
                Some(index) => indices.push(index),
                None => {
                    indices.push(self.num_blocks);
                    self.num_blocks += 1;
                }
            }
        }

        let written = self.write_chain(&indices, &name, tag, &mut source);
        if tag.is_some() {
            let _ = fs::remove_file(&ingest_path);
        }
        if let Err(e) = written {
            self.revert_allocation(&indices);
            return Err(e);
        }

        debug!("add {name}: {num_chunks} block(s), first at {}", indices[0]);
        self.toc.insert(name, indices[0]);
        Ok(())
    }

    fn write_chain(
        &mut self,
        indices: &[u64],
        name: &str,
        tag: Option<&str>,
        source: &mut File,
    ) -> ArchiveResult<()> {
        for (i, &index) in indices.iter().enumerate() {
            let mut block = Block::default();
            block.header.block_index = index;
            block.header.next_block = if i + 1 < indices.len() { indices[i + 1] } else { index };
            block.header.set_file_name(name)?;
            if let Some(tag) = tag {
                block.header.is_processed = true;
                block.header.set_processor_tag(tag)?;
            }
            codec::read_payload(source, &mut block)?;
            codec::write_block(&mut self.file, index, &block)?;
        }
        Ok(())
    }

    /// Best-effort rollback of a failed `add`: tombstone whatever was
    /// allocated, then shrink the archive past any all-empty tail.
    fn revert_allocation(&mut self, indices: &[u64]) {
        for &index in indices {
            let _ = codec::write_block(&mut self.file, index, &Block::tombstone(index));
            self.free_blocks.insert(index);
        }
        while self.num_blocks > 0 && self.free_blocks.remove(&(self.num_blocks - 1)) {
            self.num_blocks -= 1;
        }
        let _ = self.file.set_len(self.num_blocks * BLOCK_SIZE as u64);
    }

    // ── Read path ────────────────────────────────────────────────────────────

    /// Extract an archived file to `out_path`, inverting the processor when
    /// the chain was processed.
    pub fn extract<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        name: P,
        out_path: Q,
    ) -> ArchiveResult<()> {
        let display = display_name(name.as_ref());
        let result = self.extract_inner(name.as_ref(), out_path.as_ref());
        self.notify(ActionType::Extracted, &display, result.is_ok());
        result
    }

    fn extract_inner(&mut self, name: &Path, out_path: &Path) -> ArchiveResult<()> {
        let name = entry_name(name)?;
        let first = self
            .toc
            .lookup(&name)
            .ok_or_else(|| ArchiveError::FileNotFound(name.clone()))?;

        let head = self.read_checked(first)?;
        let processed = head.header.is_processed;
        let tag = head.header.processor_tag().to_owned();

        // Processed chains land in the reverse sibling first; the processor
        // then materializes the real destination.
        let target = if processed {
            reverse_path(out_path)
        } else {
            out_path.to_owned()
        };

        {
            let mut out = File::create(&target).map_err(ArchiveError::open(&target))?;
            let mut index = first;
            let mut visited = 0u64;
            loop {
                let block = self.read_checked(index)?;
                if block.header.is_empty || block.header.file_name() != name {
                    return Err(ArchiveError::BadBlock(index));
                }
                codec::write_payload(&mut out, &block)?;
                if block.header.is_last() {
                    break;
                }
                visited += 1;
                if visited > self.num_blocks {
                    return Err(ArchiveError::BadBlock(index));
                }
                index = block.header.next_block;
            }
        }

        if processed {
            let reversed = self
                .processors
                .get(&tag)
                .and_then(|proc| proc.reverse_process(out_path));
            let _ = fs::remove_file(&target);
            reversed?;
        }

        debug!("extract {name} -> {}", out_path.display());
        Ok(())
    }

    /// Remove an archived file: tombstone its chain and return the blocks to
    /// the free pool.
    pub fn remove<P: AsRef<Path>>(&mut self, name: P) -> ArchiveResult<()> {
        let display = display_name(name.as_ref());
        let result = self.remove_inner(name.as_ref());
        self.notify(ActionType::Removed, &display, result.is_ok());
        result
    }

    fn remove_inner(&mut self, name: &Path) -> ArchiveResult<()> {
        let name = entry_name(name)?;
        let first = self
            .toc
            .lookup(&name)
            .ok_or_else(|| ArchiveError::FileNotFound(name.clone()))?;

        let mut index = first;
        let mut visited = 0u64;
        loop {
            let block = self.read_checked(index)?;
            if block.header.is_empty || block.header.file_name() != name {
                return Err(ArchiveError::BadBlock(index));
            }
            let next = block.header.next_block;
            let last = block.header.is_last();
            codec::write_block(&mut self.file, index, &Block::tombstone(index))?;
            self.free_blocks.insert(index);
            if last {
                break;
            }
            visited += 1;
            if visited > self.num_blocks {
                return Err(ArchiveError::BadBlock(index));
            }
            index = next;
        }

        self.toc.erase(&name);
        debug!("remove {name}: freed chain starting at {first}");
        Ok(())
    }

    // ── Introspection ────────────────────────────────────────────────────────

    /// Write one archived name per line, then two `#` marker lines.
    /// Returns the entry count.
    pub fn list<W: Write>(&mut self, sink: &mut W) -> ArchiveResult<usize> {
        let result = self.list_inner(sink);
        self.notify(ActionType::Listed, "", result.is_ok());
        result
    }

    fn list_inner<W: Write>(&mut self, sink: &mut W) -> ArchiveResult<usize> {
        for (name, _) in self.toc.iter() {
            writeln!(sink, "{name}").map_err(ArchiveError::FileWrite)?;
        }
        writeln!(sink, "#\n#").map_err(ArchiveError::FileWrite)?;
        Ok(self.toc.len())
    }

    /// Write `"<index> <is_empty> <name>"` for every block, tombstones
    /// included. Returns the total block count.
    pub fn debug_dump<W: Write>(&mut self, sink: &mut W) -> ArchiveResult<usize> {
        let result = self.debug_dump_inner(sink);
        self.notify(ActionType::Dumped, "", result.is_ok());
        result
    }

    fn debug_dump_inner<W: Write>(&mut self, sink: &mut W) -> ArchiveResult<usize> {
        for index in 0..self.num_blocks {
            let block = codec::read_block(&mut self.file, index)?;
            writeln!(
                sink,
                "{} {} {}",
                index,
                block.header.is_empty as u8,
                block.header.file_name()
            )
            .map_err(ArchiveError::FileWrite)?;
        }
        Ok(self.num_blocks as usize)
    }

    /// Chain summary for one archived file.
    pub fn stat<P: AsRef<Path>>(&mut self, name: P) -> ArchiveResult<FileStat> {
        let name = entry_name(name.as_ref())?;
        let first = self
            .toc
            .lookup(&name)
            .ok_or_else(|| ArchiveError::FileNotFound(name.clone()))?;

        let mut index = first;
        let mut block_count = 0usize;
        let mut size = 0u64;
        let mut is_processed = false;
        loop {
            let block = self.read_checked(index)?;
            block_count += 1;
            size += block.header.data_len as u64;
            is_processed = block.header.is_processed;
            if block.header.is_last() {
                break;
            }
            if block_count as u64 > self.num_blocks {
                return Err(ArchiveError::BadBlock(index));
            }
            index = block.header.next_block;
        }

        Ok(FileStat {
            name,
            first_block: first,
            block_count,
            size,
            is_processed,
        })
    }

    // ── Compaction ───────────────────────────────────────────────────────────

    /// Drop tombstoned blocks, renumbering survivors in stream order and
    /// remapping chain links. The archive file is replaced atomically
    /// (temp sibling + rename). Returns the survivor count.
    pub fn compact(&mut self) -> ArchiveResult<usize> {
        let result = self.compact_inner();
        self.notify(ActionType::Compacted, "", result.is_ok());
        result
    }

    fn compact_inner(&mut self) -> ArchiveResult<usize> {
        let mut remap: BTreeMap<u64, u64> = BTreeMap::new();
        let mut survivors: Vec<Block> = Vec::new();
        for index in 0..self.num_blocks {
            let block = codec::read_block(&mut self.file, index)?;
            if !block.header.is_empty {
                remap.insert(index, survivors.len() as u64);
                survivors.push(block);
            }
        }
        let count = survivors.len();

        let tmp_path = self.path.with_extension("arc.tmp");
        {
            let mut tmp = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)
                .map_err(ArchiveError::open(&tmp_path))?;
            for (new_index, mut block) in survivors.into_iter().enumerate() {
                let new_index = new_index as u64;
                let old_next = block.header.next_block;
                block.header.block_index = new_index;
                block.header.next_block = *remap
                    .get(&old_next)
                    .ok_or(ArchiveError::BadBlock(old_next))?;
                codec::write_block(&mut tmp, new_index, &block)?;
            }
            tmp.sync_all().map_err(ArchiveError::FileClose)?;
        }

        fs::rename(&tmp_path, &self.path).map_err(ArchiveError::FileWrite)?;
        self.file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(ArchiveError::open(&self.path))?;
        self.num_blocks = count as u64;
        self.reconstruct()?;

        debug!("compact: {count} surviving block(s)");
        Ok(count)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks in the archive, tombstones included.
    pub fn block_count(&self) -> u64 {
        self.num_blocks
    }

    /// Archived file count.
    pub fn file_count(&self) -> usize {
        self.toc.len()
    }

    /// Mutable access to the processor registry, for registering custom
    /// processors before `add`/`extract`.
    pub fn processors_mut(&mut self) -> &mut ProcessorRegistry {
        &mut self.processors
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn read_checked(&mut self, index: u64) -> ArchiveResult<Block> {
        if index >= self.num_blocks {
            return Err(ArchiveError::BadBlockIndex {
                index,
                num_blocks: self.num_blocks,
            });
        }
        codec::read_block(&mut self.file, index)
    }

}

/// Final path component, used as the canonical archived name.
fn entry_name(path: &Path) -> ArchiveResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ArchiveError::BadFilename(path.display().to_string()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Validate the archive path and append `.arc` when absent.
fn arc_file_path(path: &Path) -> ArchiveResult<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(ArchiveError::BadPath(path.to_owned()));
    }
    match path.extension() {
        Some(ext) if ext == "arc" => Ok(path.to_owned()),
        _ => {
            let mut s = path.as_os_str().to_owned();
            s.push(".arc");
            Ok(PathBuf::from(s))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arc_suffix_appended_once() {
        assert_eq!(arc_file_path(Path::new("t")).unwrap(), PathBuf::from("t.arc"));
        assert_eq!(arc_file_path(Path::new("t.arc")).unwrap(), PathBuf::from("t.arc"));
        assert_eq!(
            arc_file_path(Path::new("dir/t.bin")).unwrap(),
            PathBuf::from("dir/t.bin.arc")
        );
        assert!(matches!(
            arc_file_path(Path::new("")),
            Err(ArchiveError::BadPath(_))
        ));
    }

    #[test]
    fn entry_name_is_final_component() {
        assert_eq!(entry_name(Path::new("/tmp/a/b.txt")).unwrap(), "b.txt");
        assert_eq!(entry_name(Path::new("b.txt")).unwrap(), "b.txt");
        assert!(entry_name(Path::new("/")).is_err());
    }

    #[test]
    fn create_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut ar = Archive::create(dir.path().join("t")).unwrap();
        assert_eq!(ar.block_count(), 0);
        assert_eq!(ar.file_count(), 0);
        let mut out = Vec::new();
        assert_eq!(ar.list(&mut out).unwrap(), 0);
        assert_eq!(out, b"#\n#\n");
        assert!(ar.path().ends_with("t.arc"));
    }

    #[test]
    fn missing_archive_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Archive::open(dir.path().join("absent")),
            Err(ArchiveError::FileOpen { .. })
        ));
    }
}
