use crate::parser::ChunkReader;
use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Chunk file names follow the multistream dump convention, e.g.
/// `enwiki-20240101-pages-articles-multistream3.xml-p151574p311329.bz2`.
static CHUNK_FILE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"wiki-.+-pages-articles-multistream.*\.xml-p(\d+)p(\d+)\.bz2$").unwrap()
});

/// First of the two expected suffixes: a flavor of `.xml-p<start>p<end>`.
static RANGE_SUFFIX_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^xml-p.+p.+$").unwrap());

/// Suffix left behind by interrupted downloads.
const PARTIAL_SUFFIX: &str = ".part";

/// Metadata for one compressed XML shard of a dump: the page-id range it
/// covers and where it lives on disk.
///
/// Immutable after construction; equality is structural on (start, end, path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpChunk {
    start_id: u64,
    end_id: u64,
    path: PathBuf,
}

impl DumpChunk {
    pub fn new(start_id: u64, end_id: u64, path: impl Into<PathBuf>) -> Result<Self> {
        if start_id > end_id {
            bail!(
                "start_id ({}) must be less than or equal to end_id ({})",
                start_id,
                end_id
            );
        }
        Ok(Self {
            start_id,
            end_id,
            path: path.into(),
        })
    }

    pub fn start_id(&self) -> u64 {
        self.start_id
    }

    pub fn end_id(&self) -> u64 {
        self.end_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without leading directories, for log and error messages.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// True only if the path is an existing file whose name carries exactly two
    /// suffixes: a page-range marker (`.xml-p<a>p<b>`) followed by `.bz2`.
    pub fn is_valid_chunk_file(&self) -> bool {
        if !self.path.is_file() {
            return false;
        }
        let Some(name) = self.path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let suffixes: Vec<&str> = name.split('.').skip(1).collect();
        if suffixes.len() != 2 {
            return false;
        }
        RANGE_SUFFIX_REGEX.is_match(suffixes[0]) && suffixes[1] == "bz2"
    }

    /// Opens a decompressing event stream over the chunk. The returned reader
    /// owns the file handle and closes it on drop.
    pub fn open_stream(&self) -> Result<ChunkReader> {
        if !self.is_valid_chunk_file() {
            bail!(
                "unable to open chunk stream because the path is not a valid chunk file: {}",
                self.path.display()
            );
        }
        ChunkReader::open(&self.path)
    }
}

/// Scans a dump directory for chunk files and returns them sorted by start id.
///
/// Partial downloads (`.part`) and files without the two expected suffixes are
/// logged and excluded rather than failing the scan.
pub fn discover_chunks(data_dir: &Path) -> Result<Vec<DumpChunk>> {
    if !data_dir.exists() {
        bail!("could not find dump directory: {}", data_dir.display());
    }
    if data_dir.is_file() {
        bail!(
            "dump path {} is a file; expected the directory containing the multistream chunk files",
            data_dir.display()
        );
    }

    let mut chunks = Vec::new();
    let entries = fs::read_dir(data_dir)
        .with_context(|| format!("failed to read dump directory: {}", data_dir.display()))?;
    for entry in entries {
        let entry = entry.context("failed to read dump directory entry")?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.ends_with(PARTIAL_SUFFIX) {
            warn!(file = name, "skipping partial download");
            continue;
        }
        let Some(caps) = CHUNK_FILE_REGEX.captures(name) else {
            if name.contains(".xml-p") || name.ends_with(".bz2") {
                warn!(file = name, "skipping file without the expected suffixes");
            } else {
                debug!(file = name, "skipping non-chunk file");
            }
            continue;
        };
        let start_id: u64 = caps[1]
            .parse()
            .with_context(|| format!("invalid start id in chunk file name: {}", name))?;
        let end_id: u64 = caps[2]
            .parse()
            .with_context(|| format!("invalid end id in chunk file name: {}", name))?;
        chunks.push(DumpChunk::new(start_id, end_id, path)?);
    }

    chunks.sort_by_key(|c| c.start_id());
    Ok(chunks)
}
