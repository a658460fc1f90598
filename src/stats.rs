use std::sync::atomic::{AtomicU64, Ordering};

/// Per-chunk ingestion counters.
///
/// Shared between the extraction worker streaming the chunk (pages) and the
/// commit worker writing its records (additions, duplicates, errors), so all
/// fields are atomic. Counters only move forward.
#[derive(Default)]
pub struct ChunkStats {
    pages: AtomicU64,
    additions: AtomicU64,
    duplicates: AtomicU64,
    errors: AtomicU64,
}

impl ChunkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_pages(&self) {
        self.pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_additions(&self) {
        self.additions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_duplicates(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pages(&self) -> u64 {
        self.pages.load(Ordering::Relaxed)
    }

    pub fn additions(&self) -> u64 {
        self.additions.load(Ordering::Relaxed)
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ChunkCounts {
        ChunkCounts {
            pages: self.pages(),
            additions: self.additions(),
            duplicates: self.duplicates(),
            errors: self.errors(),
        }
    }
}

/// Point-in-time copy of chunk counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkCounts {
    pub pages: u64,
    pub additions: u64,
    pub duplicates: u64,
    pub errors: u64,
}

impl ChunkCounts {
    pub fn accumulate(&mut self, other: &ChunkCounts) {
        self.pages += other.pages;
        self.additions += other.additions;
        self.duplicates += other.duplicates;
        self.errors += other.errors;
    }
}

/// Counters for one chunk paired with the page-id range they describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    pub start_id: u64,
    pub end_id: u64,
    pub counts: ChunkCounts,
}

/// Final accounting for a pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub per_chunk: Vec<ChunkReport>,
    pub totals: ChunkCounts,
    /// True once every extraction worker terminated.
    pub production_complete: bool,
    /// True once the commit worker saw the queue disconnect empty and flushed
    /// its final batch.
    pub queue_drained: bool,
}
