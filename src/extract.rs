use crate::chunk::DumpChunk;
use crate::config::MAX_TITLE_CHARS;
use crate::models::RawArticle;
use crate::parser::{ChunkReader, PageEvent};
use anyhow::Result;
use deunicode::deunicode;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// A qualifying colon in a title puts the page outside namespace 0
/// (Main/Article), so such titles are never candidates.
static NAMESPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^.+:.+$").unwrap());

/// Lazy, single-pass extractor of in-scope articles from one chunk stream.
///
/// Tracks a candidate-title register across page events: a `<title>` in
/// namespace 0 arms it, a `<redirect/>` marker clears it (redirect pages carry
/// a text element too, but must never be emitted), and a `<text>` element
/// emits the pair and resets the register so the next page cannot inherit a
/// stale title. The sequence is finite and non-restartable; exhaustion is the
/// iterator ending, not an error.
pub struct ArticleExtractor {
    reader: ChunkReader,
    candidate_title: Option<String>,
    done: bool,
}

impl ArticleExtractor {
    pub fn new(reader: ChunkReader) -> Self {
        Self {
            reader,
            candidate_title: None,
            done: false,
        }
    }

    fn next_article(&mut self) -> Result<Option<RawArticle>> {
        while let Some(event) = self.reader.next_event()? {
            match event {
                PageEvent::Title(text) => {
                    self.candidate_title = accept_title(&text);
                }
                PageEvent::Redirect => {
                    self.candidate_title = None;
                }
                PageEvent::Text(body) => {
                    if let Some(title) = self.candidate_title.take() {
                        return Ok(Some(RawArticle { title, text: body }));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// Returns the transliterated title if it names a namespace-0 article, `None`
/// for namespace-qualified, over-long, or empty titles.
fn accept_title(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    if NAMESPACE_REGEX.is_match(text) {
        debug!(title = text, "skipping page outside namespace 0");
        return None;
    }
    if text.chars().count() > MAX_TITLE_CHARS {
        debug!(title = text, "skipping over-long title");
        return None;
    }
    let transliterated = deunicode(text);
    if transliterated.chars().count() > MAX_TITLE_CHARS {
        debug!(title = text, "skipping title over-long after transliteration");
        return None;
    }
    Some(transliterated)
}

impl Iterator for ArticleExtractor {
    type Item = Result<RawArticle>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_article() {
            Ok(Some(article)) => Some(Ok(article)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Census of one chunk: article count and the longest accepted title.
pub fn scan_chunk(chunk: &DumpChunk) -> Result<(u64, Option<String>)> {
    let reader = chunk.open_stream()?;
    let mut count = 0u64;
    let mut longest: Option<String> = None;
    for article in ArticleExtractor::new(reader) {
        let article = article?;
        count += 1;
        if longest
            .as_ref()
            .map_or(true, |t| article.title.len() > t.len())
        {
            longest = Some(article.title);
        }
    }
    Ok((count, longest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_chunk(dir: &TempDir, start: u64, end: u64, xml: &str) -> DumpChunk {
        let name = format!(
            "testwiki-20240101-pages-articles-multistream1.xml-p{}p{}.bz2",
            start, end
        );
        let path: PathBuf = dir.path().join(name);
        let mut encoder = BzEncoder::new(File::create(&path).unwrap(), Compression::fast());
        encoder.write_all(xml.as_bytes()).unwrap();
        encoder.finish().unwrap();
        DumpChunk::new(start, end, path).unwrap()
    }

    fn extract_all(chunk: &DumpChunk) -> Vec<RawArticle> {
        ArticleExtractor::new(chunk.open_stream().unwrap())
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn redirect_page_is_never_emitted() {
        let dir = TempDir::new().unwrap();
        let chunk = write_chunk(
            &dir,
            1,
            2,
            r#"<mediawiki>
                <page>
                    <title>Rust</title>
                    <redirect title="Rust (programming language)" />
                    <text>#REDIRECT [[Rust (programming language)]]</text>
                </page>
                <page>
                    <title>Rust (programming language)</title>
                    <text>Rust is a systems programming language.</text>
                </page>
            </mediawiki>"#,
        );

        let articles = extract_all(&chunk);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Rust (programming language)");
        assert!(articles[0].text.contains("systems programming"));
    }

    #[test]
    fn namespace_titles_are_skipped() {
        let dir = TempDir::new().unwrap();
        let chunk = write_chunk(
            &dir,
            1,
            3,
            r#"<mediawiki>
                <page><title>User:Somebody</title><text>user page</text></page>
                <page><title>Category:Things</title><text>category page</text></page>
                <page><title>Plain Article</title><text>body</text></page>
            </mediawiki>"#,
        );

        let articles = extract_all(&chunk);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Plain Article");
    }

    #[test]
    fn over_long_titles_are_skipped() {
        let dir = TempDir::new().unwrap();
        let long_title = "x".repeat(201);
        let xml = format!(
            "<mediawiki><page><title>{}</title><text>a</text></page>\
             <page><title>Short</title><text>b</text></page></mediawiki>",
            long_title
        );
        let chunk = write_chunk(&dir, 1, 2, &xml);

        let articles = extract_all(&chunk);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Short");
    }

    #[test]
    fn text_without_candidate_title_is_dropped() {
        // The second text element must not pair with the already-consumed title.
        let dir = TempDir::new().unwrap();
        let chunk = write_chunk(
            &dir,
            1,
            1,
            "<mediawiki><page><title>Only</title><text>first</text>\
             <text>stray text</text></page></mediawiki>",
        );

        let articles = extract_all(&chunk);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].text, "first");
    }

    #[test]
    fn titles_are_transliterated() {
        let dir = TempDir::new().unwrap();
        let chunk = write_chunk(
            &dir,
            1,
            1,
            "<mediawiki><page><title>Æther</title><text>body</text></page></mediawiki>",
        );

        let articles = extract_all(&chunk);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "AEther");
    }

    #[test]
    fn scan_chunk_counts_articles_and_longest_title() {
        let dir = TempDir::new().unwrap();
        let chunk = write_chunk(
            &dir,
            1,
            3,
            r#"<mediawiki>
                <page><title>Ab</title><text>x</text></page>
                <page><title>Abcdef</title><text>y</text></page>
                <page><title>User:Nobody</title><text>z</text></page>
            </mediawiki>"#,
        );

        let (count, longest) = scan_chunk(&chunk).unwrap();
        assert_eq!(count, 2);
        assert_eq!(longest.as_deref(), Some("Abcdef"));
    }
}
