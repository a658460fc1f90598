use crate::chunk::DumpChunk;
use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_WORKERS, DEFAULT_QUEUE_DEPTH};
use crate::content;
use crate::coverage;
use crate::extract::ArticleExtractor;
use crate::models::Page;
use crate::stats::{ChunkCounts, ChunkReport, ChunkStats, RunReport};
use crate::store::{InsertOutcome, PageStore};
use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{error, info, warn};

/// Tunables for one ingestion run. No global state: everything the pipeline
/// needs comes in through this struct and the store handed to [`run`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on concurrent extraction workers.
    pub max_workers: usize,
    /// Upper bound on queued page records; producers block when it is reached.
    pub queue_depth: usize,
    /// Pages per store commit.
    pub batch_size: usize,
    /// Directory for the duplicate-title log; disabled when `None`.
    pub log_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            batch_size: DEFAULT_BATCH_SIZE,
            log_dir: None,
        }
    }
}

/// One queued record: a normalized page plus the index of the chunk it came
/// from, so the commit worker can attribute its outcome.
struct QueuedPage {
    chunk_idx: usize,
    page: Page,
}

/// Exit notification a worker sends the supervisor when its chunk is done.
struct WorkerExit {
    chunk_idx: usize,
    result: Result<()>,
}

/// Runs the full ingestion pipeline over a chunk set.
///
/// Coverage is verified up front; a gap aborts before any worker is spawned.
/// Up to `max_workers` extraction workers each stream one chunk, pushing
/// normalized pages onto a bounded queue. The supervisor blocks on worker-exit
/// notifications and assigns the next unprocessed chunk as slots free up. A
/// single commit worker drains the queue in batches, classifying every record
/// against the store as an addition, duplicate, or error.
///
/// A failed chunk is contained: its error is logged and counted, and the run
/// continues with the remaining chunks. Only precondition failures (coverage
/// gap, store batch failure) abort the whole run.
pub fn run<S: PageStore + Send>(
    chunks: &[DumpChunk],
    store: &mut S,
    config: &PipelineConfig,
) -> Result<RunReport> {
    if config.max_workers == 0 {
        bail!("max_workers must be at least 1");
    }
    if config.queue_depth == 0 {
        bail!("queue_depth must be at least 1");
    }
    if config.batch_size == 0 {
        bail!("batch_size must be at least 1");
    }

    coverage::ensure_full_coverage(chunks)?;
    info!(chunks = chunks.len(), "coverage verified, starting pipeline");

    let duplicates_log = match &config.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory: {}", dir.display()))?;
            let path = dir.join("duplicates.txt");
            let file = File::create(&path).with_context(|| {
                format!("failed to create duplicates log: {}", path.display())
            })?;
            Some(BufWriter::new(file))
        }
        None => None,
    };

    let stats: Vec<ChunkStats> = chunks.iter().map(|_| ChunkStats::new()).collect();
    let production_complete = AtomicBool::new(false);
    let queue_drained = AtomicBool::new(false);

    let (page_tx, page_rx) = bounded::<QueuedPage>(config.queue_depth);
    let (exit_tx, exit_rx) = unbounded::<WorkerExit>();

    // One sender per chunk, handed out as chunks are assigned. The queue
    // disconnects exactly when the last worker drops its sender, which is the
    // commit worker's signal that production is complete and drained.
    let mut senders: Vec<Sender<QueuedPage>> = Vec::with_capacity(chunks.len());
    for _ in 0..chunks.len() {
        senders.push(page_tx.clone());
    }
    drop(page_tx);

    thread::scope(|scope| -> Result<()> {
        let consumer = {
            let stats = &stats;
            let queue_drained = &queue_drained;
            let batch_size = config.batch_size;
            let store = &mut *store;
            scope.spawn(move || {
                consume(page_rx, store, stats, batch_size, duplicates_log, queue_drained)
            })
        };

        let mut next_chunk = 0usize;
        let mut running = 0usize;
        while running > 0 || next_chunk < chunks.len() {
            while running < config.max_workers && next_chunk < chunks.len() {
                let chunk_idx = next_chunk;
                next_chunk += 1;
                let Some(tx) = senders.pop() else {
                    bail!("ran out of queue senders before chunks were assigned");
                };
                let chunk = &chunks[chunk_idx];
                let chunk_stats = &stats[chunk_idx];
                let exit_tx = exit_tx.clone();
                scope.spawn(move || {
                    let result = extract_chunk(chunk, chunk_idx, &tx, chunk_stats);
                    drop(tx);
                    let _ = exit_tx.send(WorkerExit { chunk_idx, result });
                });
                running += 1;
                info!(
                    worker = chunk_idx,
                    chunk = %chunk.file_name(),
                    "started extraction worker"
                );
            }

            let exit = match exit_rx.recv() {
                Ok(exit) => exit,
                Err(_) => {
                    // Release unassigned senders so the commit worker can
                    // still observe a disconnect while the run unwinds.
                    senders.clear();
                    bail!("worker exit channel closed unexpectedly");
                }
            };
            running -= 1;
            match exit.result {
                Ok(()) => {
                    info!(worker = exit.chunk_idx, "joined completed extraction worker");
                }
                Err(e) => {
                    stats[exit.chunk_idx].inc_errors();
                    error!(
                        worker = exit.chunk_idx,
                        chunk = %chunks[exit.chunk_idx].file_name(),
                        error = format!("{:#}", e),
                        "extraction worker failed"
                    );
                }
            }
        }

        production_complete.store(true, Ordering::SeqCst);
        info!("all extraction workers terminated, waiting for the queue to drain");

        match consumer.join() {
            Ok(result) => result.context("commit worker failed"),
            Err(_) => bail!("commit worker panicked"),
        }
    })?;

    let per_chunk: Vec<ChunkReport> = chunks
        .iter()
        .zip(&stats)
        .map(|(chunk, chunk_stats)| ChunkReport {
            start_id: chunk.start_id(),
            end_id: chunk.end_id(),
            counts: chunk_stats.snapshot(),
        })
        .collect();

    let mut totals = ChunkCounts::default();
    for report in &per_chunk {
        info!(
            start_id = report.start_id,
            end_id = report.end_id,
            pages = report.counts.pages,
            additions = report.counts.additions,
            duplicates = report.counts.duplicates,
            errors = report.counts.errors,
            "chunk totals"
        );
        totals.accumulate(&report.counts);
    }
    info!(
        pages = totals.pages,
        additions = totals.additions,
        duplicates = totals.duplicates,
        errors = totals.errors,
        "run totals"
    );

    Ok(RunReport {
        per_chunk,
        totals,
        production_complete: production_complete.load(Ordering::SeqCst),
        queue_drained: queue_drained.load(Ordering::SeqCst),
    })
}

/// Extraction worker body: streams one chunk, normalizes each article, and
/// blocks on the bounded queue when the commit worker falls behind.
fn extract_chunk(
    chunk: &DumpChunk,
    chunk_idx: usize,
    tx: &Sender<QueuedPage>,
    stats: &ChunkStats,
) -> Result<()> {
    let reader = chunk.open_stream()?;
    for article in ArticleExtractor::new(reader) {
        let article = article?;
        let (headings, sections) = content::headings_and_sections(&article.text);
        let links = content::page_links(&article.text);
        let page = Page::new(article.title, headings, sections, links)?;
        stats.inc_pages();
        if tx.send(QueuedPage { chunk_idx, page }).is_err() {
            bail!(
                "page queue closed before chunk {} finished",
                chunk.file_name()
            );
        }
    }
    info!(
        chunk = %chunk.file_name(),
        pages = stats.pages(),
        "chunk stream exhausted"
    );
    Ok(())
}

/// Commit worker body: drains the queue in batches until every producer has
/// terminated and the queue is empty, then flushes the final partial batch.
fn consume<S: PageStore>(
    rx: Receiver<QueuedPage>,
    store: &mut S,
    stats: &[ChunkStats],
    batch_size: usize,
    mut duplicates_log: Option<BufWriter<File>>,
    queue_drained: &AtomicBool,
) -> Result<()> {
    let mut batch: Vec<QueuedPage> = Vec::with_capacity(batch_size);
    let result = (|| -> Result<()> {
        loop {
            match rx.recv() {
                Ok(record) => {
                    batch.push(record);
                    if batch.len() >= batch_size {
                        commit_batch(store, &mut batch, stats, &mut duplicates_log)?;
                    }
                }
                // Disconnected: every producer is gone and the queue is empty.
                Err(_) => {
                    if !batch.is_empty() {
                        commit_batch(store, &mut batch, stats, &mut duplicates_log)?;
                    }
                    if let Some(log) = duplicates_log.as_mut() {
                        log.flush().context("failed to flush duplicates log")?;
                    }
                    queue_drained.store(true, Ordering::SeqCst);
                    info!("queue drained, commit worker exiting");
                    return Ok(());
                }
            }
        }
    })();

    if result.is_err() {
        // Keep producers unblocked while the failed run unwinds.
        for _ in rx.iter() {}
    }
    result
}

fn commit_batch<S: PageStore>(
    store: &mut S,
    batch: &mut Vec<QueuedPage>,
    stats: &[ChunkStats],
    duplicates_log: &mut Option<BufWriter<File>>,
) -> Result<()> {
    let size = batch.len();
    store.begin_batch().context("failed to open store batch")?;
    for QueuedPage { chunk_idx, page } in batch.drain(..) {
        let chunk_stats = &stats[chunk_idx];
        match store.contains_title(&page.title) {
            Ok(true) => record_duplicate(&page.title, chunk_stats, duplicates_log),
            Ok(false) => match store.insert_page(&page) {
                Ok(InsertOutcome::Inserted) => chunk_stats.inc_additions(),
                Ok(InsertOutcome::DuplicateTitle) => {
                    record_duplicate(&page.title, chunk_stats, duplicates_log)
                }
                Err(e) => {
                    chunk_stats.inc_errors();
                    warn!(title = %page.title, error = format!("{:#}", e), "failed to insert page");
                }
            },
            Err(e) => {
                chunk_stats.inc_errors();
                warn!(title = %page.title, error = format!("{:#}", e), "title lookup failed");
            }
        }
    }
    store.commit_batch().context("failed to commit store batch")?;
    info!(pages = size, "committed batch");
    Ok(())
}

fn record_duplicate(
    title: &str,
    chunk_stats: &ChunkStats,
    duplicates_log: &mut Option<BufWriter<File>>,
) {
    chunk_stats.inc_duplicates();
    info!(title = title, "duplicate page");
    if let Some(log) = duplicates_log.as_mut() {
        if let Err(e) = writeln!(log, "{}", title) {
            warn!(error = %e, "failed to write duplicates log, disabling it");
            *duplicates_log = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::MemoryStore;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn write_chunk(dir: &TempDir, index: u32, start: u64, end: u64, xml: &str) -> DumpChunk {
        let name = format!(
            "testwiki-20240101-pages-articles-multistream{}.xml-p{}p{}.bz2",
            index, start, end
        );
        let path = dir.path().join(name);
        let mut encoder = BzEncoder::new(File::create(&path).unwrap(), Compression::fast());
        encoder.write_all(xml.as_bytes()).unwrap();
        encoder.finish().unwrap();
        DumpChunk::new(start, end, path).unwrap()
    }

    fn page_xml(titles: &[&str]) -> String {
        let mut xml = String::from("<mediawiki>");
        for title in titles {
            xml.push_str(&format!(
                "<page><title>{}</title><text>Body of {}. [[Some Link]]</text></page>",
                title, title
            ));
        }
        xml.push_str("</mediawiki>");
        xml
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            max_workers: 2,
            queue_depth: 8,
            batch_size: 2,
            log_dir: None,
        }
    }

    #[test]
    fn pipeline_classifies_additions_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let chunks = vec![
            write_chunk(&dir, 1, 1, 3, &page_xml(&["Alpha", "Beta", "Alpha"])),
            write_chunk(&dir, 2, 4, 6, &page_xml(&["Gamma", "Beta", "Delta"])),
        ];

        let mut store = MemoryStore::new();
        let report = run(&chunks, &mut store, &test_config()).unwrap();

        assert_eq!(report.totals.pages, 6);
        assert_eq!(report.totals.additions, 4);
        assert_eq!(report.totals.duplicates, 2);
        assert_eq!(report.totals.errors, 0);
        assert!(report.production_complete);
        assert!(report.queue_drained);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn coverage_gap_aborts_before_any_work() {
        let dir = TempDir::new().unwrap();
        let chunks = vec![
            write_chunk(&dir, 1, 1, 3, &page_xml(&["Alpha"])),
            write_chunk(&dir, 2, 5, 6, &page_xml(&["Beta"])),
        ];

        let mut store = MemoryStore::new();
        let result = run(&chunks, &mut store, &test_config());

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("missing chunk detected"));
        assert_eq!(store.len(), 0);
        assert_eq!(store.commits, 0);
    }

    #[test]
    fn store_write_failure_is_contained() {
        let dir = TempDir::new().unwrap();
        let chunks = vec![write_chunk(
            &dir,
            1,
            1,
            3,
            &page_xml(&["Alpha", "Broken", "Beta"]),
        )];

        let mut store = MemoryStore::new();
        store.poison_titles.push("Broken".to_string());
        let report = run(&chunks, &mut store, &test_config()).unwrap();

        assert_eq!(report.totals.pages, 3);
        assert_eq!(report.totals.additions, 2);
        assert_eq!(report.totals.duplicates, 0);
        assert_eq!(report.totals.errors, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn corrupt_chunk_is_contained() {
        let dir = TempDir::new().unwrap();
        let good = write_chunk(&dir, 1, 1, 3, &page_xml(&["Alpha", "Beta"]));

        // Valid name and coverage position, but not bzip2 data.
        let name = "testwiki-20240101-pages-articles-multistream2.xml-p4p6.bz2";
        let bad_path = dir.path().join(name);
        std::fs::write(&bad_path, b"this is not a chunk").unwrap();
        let bad = DumpChunk::new(4, 6, bad_path).unwrap();

        let mut store = MemoryStore::new();
        let report = run(&[good, bad], &mut store, &test_config()).unwrap();

        assert_eq!(report.totals.additions, 2);
        assert_eq!(report.per_chunk[1].counts.errors, 1);
        assert!(report.production_complete);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn batches_flush_with_partial_remainder() {
        let dir = TempDir::new().unwrap();
        let chunks = vec![write_chunk(
            &dir,
            1,
            1,
            5,
            &page_xml(&["A", "B", "C", "D", "E"]),
        )];

        let mut store = MemoryStore::new();
        let report = run(&chunks, &mut store, &test_config()).unwrap();

        // batch_size 2 over 5 pages: two full batches plus the final partial.
        assert_eq!(report.totals.additions, 5);
        assert_eq!(store.commits, 3);
    }

    #[test]
    fn rejects_zero_workers() {
        let mut config = test_config();
        config.max_workers = 0;
        let mut store = MemoryStore::new();
        let result = run(&[], &mut store, &config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_workers"));
    }

    #[test]
    fn duplicates_log_records_titles() {
        let dir = TempDir::new().unwrap();
        let log_dir = TempDir::new().unwrap();
        let chunks = vec![write_chunk(
            &dir,
            1,
            1,
            3,
            &page_xml(&["Alpha", "Alpha", "Alpha"]),
        )];

        let mut config = test_config();
        config.log_dir = Some(log_dir.path().to_path_buf());

        let mut store = MemoryStore::new();
        let report = run(&chunks, &mut store, &config).unwrap();
        assert_eq!(report.totals.duplicates, 2);

        let logged = std::fs::read_to_string(log_dir.path().join("duplicates.txt")).unwrap();
        assert_eq!(logged, "Alpha\nAlpha\n");
    }
}
