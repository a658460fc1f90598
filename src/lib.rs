//! Minos: streaming Wikipedia dump ingestion into a page store
//!
//! This crate turns a sharded, bzip2-compressed XML export of a wiki into
//! normalized page records (title, section headings, section text, outbound
//! links) and bulk-loads them into a persistent store:
//!
//! 1. **Discovery** -- Scan a dump directory for range-addressed chunk files
//!    (`...multistream<N>.xml-p<start>p<end>.bz2`), excluding partial
//!    downloads and misnamed files
//! 2. **Coverage gate** -- Verify the chunks tile the page-id space without
//!    gaps before any processing starts; a gap is fatal and names the last
//!    valid chunk
//! 3. **Extraction** -- Stream each chunk through an event-based XML parser,
//!    emitting one `(title, markup)` pair per namespace-0 article without ever
//!    materializing a whole document
//! 4. **Transformation** -- Split article markup into heading/section pairs
//!    and outbound links, stripped of markup and transliterated to ASCII
//! 5. **Commit** -- Classify every record against the store as an addition,
//!    duplicate, or error, and write additions in batched transactions
//!
//! # Architecture
//!
//! Extraction runs on a pool of worker threads, one chunk per worker, feeding
//! a bounded queue that applies backpressure when the commit worker falls
//! behind. A supervisor reacts to worker-exit notifications and assigns the
//! next chunk as slots free up; exactly one commit worker drains the queue so
//! store writes stay serialized. Within a chunk, articles arrive in document
//! order; across chunks no order is guaranteed, and the store's duplicate
//! detection makes final record order immaterial.
//!
//! # Key Modules
//!
//! - [`chunk`] -- Chunk metadata, file-name validation, directory discovery
//! - [`parser`] -- Streaming BZ2 + XML adapter producing structured page events
//! - [`extract`] -- Article extraction state machine over parse events
//! - [`content`] -- Markup transformation (headings, sections, links)
//! - [`coverage`] -- Gapless-coverage verification over a chunk set
//! - [`pipeline`] -- Worker pool, bounded queue, commit worker, statistics
//! - [`store`] -- Page store seam and SQLite implementation
//! - [`models`] -- Core value types (Page, RawArticle)
//! - [`stats`] -- Per-chunk counters and run reports
//! - [`config`] -- Constants for extraction and ingestion

pub mod chunk;
pub mod config;
pub mod content;
pub mod coverage;
pub mod extract;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod stats;
pub mod store;
