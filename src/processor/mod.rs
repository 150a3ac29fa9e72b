//! Payload processors — transform on add, invert on extract.
//!
//! A processor reads a source file and materializes a transformed sibling;
//! its tag is stored in every block header of the chain so extraction can
//! reconstruct the right inverse. Compression (DEFLATE) is the only
//! built-in.
//!
//! Sibling naming contract:
//! - forward: `_processed` inserted before the final 4 characters,
//! - reverse: `_reverse_process` inserted before the final 4 characters.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::debug;

use crate::block::PAYLOAD_SIZE;
use crate::error::{ArchiveError, ArchiveResult};

/// A named transform/inverse-transform pair over files on disk.
///
/// Processors must be deterministic: `reverse_process(process(x)) == x`.
pub trait DataProcessor {
    /// ≤ 4-char ASCII identifier stored in block headers.
    fn tag(&self) -> &'static str;

    /// Read `src` and write the transformed sibling; returns the sibling's
    /// path, which becomes the archive's ingestion source.
    fn process(&self, src: &Path) -> ArchiveResult<PathBuf>;

    /// Read the reverse sibling of `dst` and materialize the recovered
    /// content at `dst`.
    fn reverse_process(&self, dst: &Path) -> ArchiveResult<()>;
}

/// Forward sibling: `_processed` spliced before the final 4 characters.
pub fn processed_path(path: &Path) -> PathBuf {
    splice_marker(path, "_processed")
}

/// Reverse sibling: `_reverse_process` spliced before the final 4 characters.
pub fn reverse_path(path: &Path) -> PathBuf {
    splice_marker(path, "_reverse_process")
}

fn splice_marker(path: &Path, marker: &str) -> PathBuf {
    let s = path.to_string_lossy();
    let split = s.len().saturating_sub(4);
    if s.len() > 4 && s.is_char_boundary(split) {
        PathBuf::from(format!("{}{}{}", &s[..split], marker, &s[split..]))
    } else {
        // Too short for an extension split; append instead.
        PathBuf::from(format!("{s}{marker}"))
    }
}

// ── DEFLATE ──────────────────────────────────────────────────────────────────

/// The built-in `"comp"` processor: DEFLATE both ways, streamed in
/// payload-sized chunks.
pub struct DeflateProcessor;

impl DataProcessor for DeflateProcessor {
    fn tag(&self) -> &'static str {
        "comp"
    }

    fn process(&self, src: &Path) -> ArchiveResult<PathBuf> {
        let out_path = processed_path(src);
        let mut input = File::open(src).map_err(ArchiveError::open(src))?;
        let output = File::create(&out_path).map_err(ArchiveError::open(&out_path))?;

        let mut encoder = DeflateEncoder::new(output, Compression::default());
        let copied = copy_chunked(&mut input, &mut encoder)?;
        encoder.finish().map_err(ArchiveError::FileWrite)?;

        debug!("deflate: {copied} bytes from {} -> {}", src.display(), out_path.display());
        Ok(out_path)
    }

    fn reverse_process(&self, dst: &Path) -> ArchiveResult<()> {
        let src_path = reverse_path(dst);
        let input = File::open(&src_path).map_err(ArchiveError::open(&src_path))?;
        let mut output = File::create(dst).map_err(ArchiveError::open(dst))?;

        let mut decoder = DeflateDecoder::new(input);
        let copied = copy_chunked(&mut decoder, &mut output)?;

        debug!("inflate: {copied} bytes from {} -> {}", src_path.display(), dst.display());
        Ok(())
    }
}

fn copy_chunked<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> ArchiveResult<u64> {
    let mut buf = [0u8; PAYLOAD_SIZE];
    let mut copied = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArchiveError::FileRead(e)),
        };
        writer.write_all(&buf[..n]).map_err(ArchiveError::FileWrite)?;
        copied += n as u64;
    }
    Ok(copied)
}

// ── Registry ─────────────────────────────────────────────────────────────────

type ProcessorFactory = fn() -> Box<dyn DataProcessor>;

/// Tag → processor factory map, used on both the add and the extract path.
pub struct ProcessorRegistry {
    factories: HashMap<&'static str, ProcessorFactory>,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        let mut factories: HashMap<&'static str, ProcessorFactory> = HashMap::new();
        factories.insert("comp", || Box::new(DeflateProcessor));
        Self { factories }
    }
}

impl ProcessorRegistry {
    /// Register a processor under `tag` (≤ 4 ASCII bytes).
    pub fn register(&mut self, tag: &'static str, factory: ProcessorFactory) -> ArchiveResult<()> {
        if tag.is_empty() || tag.len() > 4 || !tag.is_ascii() {
            return Err(ArchiveError::BadProcessor(tag.to_owned()));
        }
        self.factories.insert(tag, factory);
        Ok(())
    }

    /// Instantiate the processor registered under `tag`.
    pub fn get(&self, tag: &str) -> ArchiveResult<Box<dyn DataProcessor>> {
        self.factories
            .get(tag)
            .map(|factory| factory())
            .ok_or_else(|| ArchiveError::BadProcessor(tag.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn sibling_naming() {
        assert_eq!(
            processed_path(Path::new("/tmp/doc.txt")),
            PathBuf::from("/tmp/doc_processed.txt")
        );
        assert_eq!(
            reverse_path(Path::new("/tmp/out.txt")),
            PathBuf::from("/tmp/out_reverse_process.txt")
        );
        // No room for a 4-char extension split.
        assert_eq!(processed_path(Path::new("abc")), PathBuf::from("abc_processed"));
    }

    #[test]
    fn registry_knows_comp_only() {
        let registry = ProcessorRegistry::default();
        assert_eq!(registry.get("comp").unwrap().tag(), "comp");
        assert!(matches!(
            registry.get("nope"),
            Err(ArchiveError::BadProcessor(_))
        ));
    }

    #[test]
    fn registry_rejects_long_tags() {
        let mut registry = ProcessorRegistry::default();
        assert!(registry.register("toolong", || Box::new(DeflateProcessor)).is_err());
    }

    #[test]
    fn deflate_round_trip_through_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("input.txt");
        let original: Vec<u8> = b"the quick brown fox "
            .iter()
            .cycle()
            .take(5000)
            .copied()
            .collect();
        fs::write(&src, &original).unwrap();

        let processor = DeflateProcessor;
        let compressed = processor.process(&src).unwrap();
        assert_eq!(compressed, dir.path().join("input_processed.txt"));
        assert!(fs::metadata(&compressed).unwrap().len() < original.len() as u64);

        // Extraction writes the chain into the reverse sibling, then asks the
        // processor to invert it in place.
        let dst = dir.path().join("restored.txt");
        fs::rename(&compressed, reverse_path(&dst)).unwrap();
        processor.reverse_process(&dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), original);
    }
}
