use anyhow::{bail, Context, Result};
use bzip2::read::BzDecoder;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One structurally interesting event from a chunk's XML stream.
///
/// Tag discrimination happens here, once, so downstream code matches on this
/// enum instead of re-inspecting serialized element names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// Text content of a `<title>` element
    Title(String),
    /// A `<redirect/>` marker between a page's title and text
    Redirect,
    /// Body of a `<text>` element
    Text(String),
}

/// Tag decision for one raw XML event, detached from the event buffer.
enum Scanned {
    Title,
    Text,
    Redirect,
    Eof,
    Other,
}

/// Streaming, decompressing reader over one dump chunk.
///
/// Owns the only handle to the underlying file; dropping the reader closes the
/// stream. The event buffer is reused and cleared between events so peak memory
/// stays bounded by the largest single element, not the chunk size.
pub struct ChunkReader {
    reader: Reader<BufReader<BzDecoder<File>>>,
    buf: Vec<u8>,
}

impl std::fmt::Debug for ChunkReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkReader")
            .field("buf_len", &self.buf.len())
            .finish_non_exhaustive()
    }
}

impl ChunkReader {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open chunk file: {}", path.display()))?;
        let reader = Reader::from_reader(BufReader::new(BzDecoder::new(file)));
        Ok(Self {
            reader,
            buf: Vec::with_capacity(64 * 1024),
        })
    }

    /// Next page event, or `None` once the stream is exhausted.
    pub fn next_event(&mut self) -> Result<Option<PageEvent>> {
        loop {
            self.buf.clear();
            // The raw event borrows the buffer, so reduce it to a tag decision
            // before reading the element's text.
            let scanned = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                    b"title" => Scanned::Title,
                    b"text" => Scanned::Text,
                    b"redirect" => Scanned::Redirect,
                    _ => Scanned::Other,
                },
                Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"redirect" => {
                    Scanned::Redirect
                }
                Ok(Event::Eof) => Scanned::Eof,
                Ok(_) => Scanned::Other,
                Err(e) => return Err(e).context("XML parse error in chunk stream"),
            };
            match scanned {
                Scanned::Title => {
                    let text = self.element_text(b"title")?;
                    return Ok(Some(PageEvent::Title(text)));
                }
                Scanned::Text => {
                    let text = self.element_text(b"text")?;
                    return Ok(Some(PageEvent::Text(text)));
                }
                Scanned::Redirect => return Ok(Some(PageEvent::Redirect)),
                Scanned::Eof => return Ok(None),
                Scanned::Other => {}
            }
        }
    }

    /// Collects the text content of the element just entered, copying each
    /// event out of the buffer before it is cleared for the next one.
    fn element_text(&mut self, end_tag: &[u8]) -> Result<String> {
        let mut out = String::new();
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Text(ref t)) => {
                    out.push_str(&t.unescape().context("invalid escape in element text")?);
                }
                Ok(Event::CData(ref t)) => {
                    out.push_str(&String::from_utf8_lossy(t));
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == end_tag => {
                    return Ok(out);
                }
                Ok(Event::Eof) => bail!(
                    "chunk stream ended inside a <{}> element",
                    String::from_utf8_lossy(end_tag)
                ),
                Ok(_) => {}
                Err(e) => return Err(e).context("XML parse error in chunk stream"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_bz2_xml(xml: &str) -> NamedTempFile {
        let mut encoder = BzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(xml.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&compressed).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn yields_title_redirect_and_text_events() {
        let tmp = create_bz2_xml(
            r#"<mediawiki>
                <page>
                    <title>Rust</title>
                    <redirect title="Rust (programming language)" />
                    <text>#REDIRECT [[Rust (programming language)]]</text>
                </page>
            </mediawiki>"#,
        );
        let mut reader = ChunkReader::open(tmp.path()).unwrap();

        assert_eq!(
            reader.next_event().unwrap(),
            Some(PageEvent::Title("Rust".to_string()))
        );
        assert_eq!(reader.next_event().unwrap(), Some(PageEvent::Redirect));
        assert_eq!(
            reader.next_event().unwrap(),
            Some(PageEvent::Text(
                "#REDIRECT [[Rust (programming language)]]".to_string()
            ))
        );
        assert_eq!(reader.next_event().unwrap(), None);
    }

    #[test]
    fn unescapes_entities_in_text() {
        let tmp = create_bz2_xml("<page><title>AT&amp;T</title></page>");
        let mut reader = ChunkReader::open(tmp.path()).unwrap();
        assert_eq!(
            reader.next_event().unwrap(),
            Some(PageEvent::Title("AT&T".to_string()))
        );
    }

    #[test]
    fn ignores_unrelated_elements() {
        let tmp = create_bz2_xml(
            "<page><ns>0</ns><id>7</id><title>Rust</title><revision><id>1</id></revision></page>",
        );
        let mut reader = ChunkReader::open(tmp.path()).unwrap();
        assert_eq!(
            reader.next_event().unwrap(),
            Some(PageEvent::Title("Rust".to_string()))
        );
        assert_eq!(reader.next_event().unwrap(), None);
    }

    #[test]
    fn exhausted_stream_keeps_returning_none() {
        let tmp = create_bz2_xml("<mediawiki></mediawiki>");
        let mut reader = ChunkReader::open(tmp.path()).unwrap();
        assert_eq!(reader.next_event().unwrap(), None);
        assert_eq!(reader.next_event().unwrap(), None);
    }

    #[test]
    fn open_missing_file_fails() {
        let result = ChunkReader::open(Path::new("/no/such/chunk.xml-p1p2.bz2"));
        assert!(result.is_err());
    }
}
