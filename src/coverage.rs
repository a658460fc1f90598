use crate::chunk::DumpChunk;
use anyhow::{bail, Result};
use tracing::error;

/// Outcome of a contiguity scan over a chunk set.
///
/// When the scan breaks, `last_valid_chunk` is the chunk whose start id still
/// lined up with the previous end id (`None` when the very first chunk is
/// already out of place). When the scan completes, it is the chunk with the
/// greatest end id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageResult {
    pub contiguous: bool,
    pub last_valid_chunk: Option<DumpChunk>,
}

/// Checks that the chunks' page-id ranges tile without gaps.
///
/// Chunks are sorted by start id; each chunk must begin exactly one past the
/// previous chunk's end. This can only prove that no gap exists between the
/// lowest start id and the highest end id observed — it cannot prove the
/// chunk set is globally complete.
pub fn verify_coverage(chunks: &[DumpChunk]) -> Result<CoverageResult> {
    if chunks.is_empty() {
        bail!("cannot verify coverage of an empty chunk set");
    }

    let mut sorted: Vec<&DumpChunk> = chunks.iter().collect();
    sorted.sort_by_key(|c| c.start_id());

    let mut last_end = 0u64;
    for (i, chunk) in sorted.iter().enumerate() {
        if chunk.start_id() != last_end + 1 {
            let last_valid_chunk = if i == 0 {
                None
            } else {
                Some(sorted[i - 1].clone())
            };
            return Ok(CoverageResult {
                contiguous: false,
                last_valid_chunk,
            });
        }
        last_end = chunk.end_id();
    }

    Ok(CoverageResult {
        contiguous: true,
        last_valid_chunk: sorted.last().map(|c| (*c).clone()),
    })
}

/// Gates a pipeline run on full coverage: a gap is fatal and names the last
/// valid chunk so the operator knows which range to fetch.
pub fn ensure_full_coverage(chunks: &[DumpChunk]) -> Result<()> {
    let result = verify_coverage(chunks)?;
    if !result.contiguous {
        let last_valid = result
            .last_valid_chunk
            .as_ref()
            .map(|c| c.file_name())
            .unwrap_or_else(|| "none".to_string());
        error!(
            last_valid = %last_valid,
            "missing chunks detected; download them and rerun to get a gapless dump"
        );
        bail!(
            "missing chunk detected: the last valid chunk in the dump is {}",
            last_valid
        );
    }
    Ok(())
}
