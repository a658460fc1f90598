use deunicode::deunicode;
use memchr::memchr;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Sentinel heading recorded for the implicit first section of an article.
pub const LEAD_HEADING: &str = "Lead";

static HEADING_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(={2,})[ \t]*(.+?)[ \t]*(={2,})[ \t]*$").unwrap());

static WIKILINK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[([^\[\]]*?)\]\]").unwrap());

static FILE_LINK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:file|image|category):").unwrap());

static EXTERNAL_LINK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(?:https?|ftp)://[^\s\]]*(?:[ \t]+([^\]]*))?\]").unwrap());

static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static REF_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)<ref[^>]*/>|<ref[^>]*>.*?</ref>").unwrap());

static HTML_TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)</?[A-Za-z][^>]*>").unwrap());

static THUMB_LINK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"thumb\|").unwrap());

static CATEGORY_LINK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"Category:.+").unwrap());

/// Splits an article body into parallel heading and section lists.
///
/// The implicit section before the first heading is recorded under the
/// `"Lead"` sentinel. Each heading's raw markup is located in the remaining
/// unconsumed text; everything before it belongs to the previous heading's
/// section, and the text after the final heading becomes the last section.
/// Sections are stripped of markup, trimmed, and transliterated to ASCII.
///
/// An article with no headings at all yields two empty lists; no `"Lead"`
/// entry is fabricated for it. The outputs always have equal length.
pub fn headings_and_sections(text: &str) -> (Vec<String>, Vec<String>) {
    let matches: Vec<(&str, &str)> = HEADING_REGEX
        .captures_iter(text)
        .filter_map(|c| Some((c.get(0)?.as_str(), c.get(2)?.as_str())))
        .collect();
    if matches.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let mut headings = Vec::with_capacity(matches.len() + 1);
    headings.push(LEAD_HEADING.to_string());

    let mut raw_sections: Vec<&str> = Vec::with_capacity(matches.len() + 1);
    let mut remaining = text;
    let last = matches.len() - 1;
    for (i, (raw, title)) in matches.iter().enumerate() {
        headings.push(strip_markup(title).trim().to_string());
        match remaining.split_once(raw) {
            Some((before, after)) => {
                raw_sections.push(before);
                if i == last {
                    raw_sections.push(after);
                } else {
                    remaining = after;
                }
            }
            // Heading text already consumed by an earlier split; keep the
            // one-to-one pairing intact with an empty section.
            None => {
                raw_sections.push("");
                if i == last {
                    raw_sections.push(remaining);
                }
            }
        }
    }

    let sections = raw_sections
        .iter()
        .map(|s| deunicode(strip_markup(s).trim()))
        .collect();
    (headings, sections)
}

/// Extracts internal page links from an article body, in document order.
///
/// Image/thumbnail annotations, category links, links that do not reduce to
/// plain text, and links that are empty after trimming are discarded. The
/// survivors are transliterated to ASCII; duplicates are retained.
pub fn page_links(text: &str) -> Vec<String> {
    WIKILINK_REGEX
        .captures_iter(text)
        .filter_map(|c| {
            let inner = c.get(1)?.as_str();
            if inner.contains("{{") || inner.contains("}}") {
                return None;
            }
            if THUMB_LINK_REGEX.is_match(inner) || CATEGORY_LINK_REGEX.is_match(inner) {
                return None;
            }
            let plain = match inner.split_once('|') {
                Some((_, label)) => label,
                None => inner,
            };
            let plain = plain.trim();
            if plain.is_empty() {
                return None;
            }
            Some(deunicode(plain))
        })
        .collect()
}

/// Reduces wiki markup to plain text: templates, comments, ref tags, and HTML
/// tags are dropped; links collapse to their display text; quote markup is
/// removed.
pub fn strip_markup(text: &str) -> String {
    let without_comments = COMMENT_REGEX.replace_all(text, "");
    let without_templates = strip_templates(&without_comments);
    let without_refs = REF_TAG_REGEX.replace_all(&without_templates, "");
    let without_tags = HTML_TAG_REGEX.replace_all(&without_refs, "");
    let without_wikilinks = replace_wikilinks(&without_tags);
    let without_external = EXTERNAL_LINK_REGEX.replace_all(&without_wikilinks, "$1");
    without_external.replace("'''", "").replace("''", "")
}

/// Collapses `[[target]]` to `target` and `[[target|label]]` to `label`;
/// file, image, and category links are removed entirely. Runs innermost-first
/// until no link markup remains, so nested constructs unwrap fully.
fn replace_wikilinks(text: &str) -> String {
    let mut out = text.to_string();
    loop {
        let replaced = WIKILINK_REGEX
            .replace_all(&out, |caps: &Captures| {
                let inner = caps.get(1).map_or("", |m| m.as_str());
                if FILE_LINK_REGEX.is_match(inner) {
                    return String::new();
                }
                match inner.split_once('|') {
                    Some((_, label)) => label.to_string(),
                    None => inner.to_string(),
                }
            })
            .into_owned();
        if replaced == out {
            return out;
        }
        out = replaced;
    }
}

/// Removes `{{...}}` template blocks, including nested ones. An unclosed
/// template swallows the remainder of the text.
fn strip_templates(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut result = String::with_capacity(text.len());
    let mut run_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let Some(off) = memchr(b'{', &bytes[i..]) else {
            break;
        };
        let pos = i + off;
        if pos + 1 >= bytes.len() || bytes[pos + 1] != b'{' {
            i = pos + 1;
            continue;
        }
        result.push_str(&text[run_start..pos]);

        let mut depth: i32 = 0;
        let mut j = pos;
        while j + 1 < bytes.len() {
            if bytes[j] == b'{' && bytes[j + 1] == b'{' {
                depth += 1;
                j += 2;
            } else if bytes[j] == b'}' && bytes[j + 1] == b'}' {
                depth -= 1;
                j += 2;
                if depth == 0 {
                    break;
                }
            } else {
                j += 1;
            }
        }
        if depth > 0 {
            j = bytes.len();
        }
        run_start = j;
        i = j;
    }

    if run_start < bytes.len() {
        result.push_str(&text[run_start..]);
    }
    result
}
