use crate::config::MAX_TITLE_CHARS;
use anyhow::{bail, Result};
use serde::Serialize;

/// Raw `(title, markup)` pair yielded by the extractor before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArticle {
    pub title: String,
    pub text: String,
}

/// A normalized article record, ready for bulk load into the page store.
///
/// `headings` and `sections` pair one-to-one; when an article has any headings
/// at all, the first heading is the `"Lead"` sentinel for the implicit section
/// before the first real heading. Pages are values: once constructed they are
/// handed to the store untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub title: String,
    pub headings: Vec<String>,
    pub sections: Vec<String>,
    pub links: Vec<String>,
}

impl Page {
    pub fn new(
        title: String,
        headings: Vec<String>,
        sections: Vec<String>,
        links: Vec<String>,
    ) -> Result<Self> {
        if title.chars().count() > MAX_TITLE_CHARS {
            bail!(
                "title must be at most {} characters, got {}: {}",
                MAX_TITLE_CHARS,
                title.chars().count(),
                title
            );
        }
        if headings.len() != sections.len() {
            bail!(
                "headings ({}) and sections ({}) must pair one-to-one for page: {}",
                headings.len(),
                sections.len(),
                title
            );
        }
        Ok(Self {
            title,
            headings,
            sections,
            links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_new_valid() {
        let page = Page::new(
            "Rust".to_string(),
            vec!["Lead".to_string(), "History".to_string()],
            vec!["Intro text".to_string(), "History text".to_string()],
            vec!["Mozilla".to_string()],
        )
        .unwrap();
        assert_eq!(page.title, "Rust");
        assert_eq!(page.headings.len(), page.sections.len());
    }

    #[test]
    fn page_new_no_headings() {
        let page = Page::new("Stub".to_string(), vec![], vec![], vec![]).unwrap();
        assert!(page.headings.is_empty());
        assert!(page.sections.is_empty());
    }

    #[test]
    fn page_new_rejects_mismatched_lengths() {
        let result = Page::new(
            "Rust".to_string(),
            vec!["Lead".to_string(), "History".to_string()],
            vec!["Intro text".to_string()],
            vec![],
        );
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must pair one-to-one"));
    }

    #[test]
    fn page_new_rejects_long_title() {
        let result = Page::new("x".repeat(201), vec![], vec![], vec![]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("at most 200"));
    }

    #[test]
    fn page_new_accepts_title_at_limit() {
        assert!(Page::new("x".repeat(200), vec![], vec![], vec![]).is_ok());
    }
}
