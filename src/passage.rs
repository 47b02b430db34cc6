use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured locator of a passage: collection name plus 1-based chapter
/// and verse numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub collection: String,
    pub major: u32,
    pub minor: u32,
}

impl SourceRef {
    pub fn new(collection: impl Into<String>, major: u32, minor: u32) -> Self {
        Self {
            collection: collection.into(),
            major,
            minor,
        }
    }

    /// Human-readable citation, e.g. `Genesis 1:1`.
    pub fn citation(&self) -> String {
        self.to_string()
    }

    /// Parse a citation back into a reference.
    ///
    /// The collection part may itself contain spaces (`1 Kings 2:3`), so the
    /// split happens at the last space.
    ///
    /// ```
    /// use versebert::passage::SourceRef;
    ///
    /// let r = SourceRef::parse_citation("Song of Solomon 2:4").unwrap();
    /// assert_eq!(r, SourceRef::new("Song of Solomon", 2, 4));
    /// assert!(SourceRef::parse_citation("Genesis").is_none());
    /// ```
    pub fn parse_citation(citation: &str) -> Option<Self> {
        let (collection, numbers) = citation.trim().rsplit_once(' ')?;
        let (major, minor) = numbers.split_once(':')?;
        let major: u32 = major.parse().ok()?;
        let minor: u32 = minor.parse().ok()?;
        let collection = collection.trim();
        if collection.is_empty() || major == 0 || minor == 0 {
            return None;
        }
        Some(Self::new(collection, major, minor))
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.collection, self.major, self.minor)
    }
}

/// One addressable unit of scripture text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub source_ref: SourceRef,
    pub text: String,
}

impl Passage {
    pub fn new(source_ref: SourceRef, text: impl Into<String>) -> Self {
        Self {
            source_ref,
            text: text.into(),
        }
    }

    pub fn citation(&self) -> String {
        self.source_ref.citation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_format() {
        let r = SourceRef::new("Genesis", 1, 1);
        assert_eq!(r.citation(), "Genesis 1:1");
        assert_eq!(r.to_string(), "Genesis 1:1");
    }

    #[test]
    fn citation_is_deterministic() {
        let a = SourceRef::new("John", 3, 16);
        let b = SourceRef::new("John", 3, 16);
        assert_eq!(a.citation(), b.citation());
    }

    #[test]
    fn parse_citation_roundtrip() {
        let r = SourceRef::new("1 Kings", 2, 3);
        assert_eq!(SourceRef::parse_citation(&r.citation()), Some(r));
    }

    #[test]
    fn parse_citation_rejects_garbage() {
        assert!(SourceRef::parse_citation("").is_none());
        assert!(SourceRef::parse_citation("John 3").is_none());
        assert!(SourceRef::parse_citation("John 0:1").is_none());
        assert!(SourceRef::parse_citation("John x:1").is_none());
        assert!(SourceRef::parse_citation(" 3:16").is_none());
    }

    #[test]
    fn passage_citation_delegates() {
        let p = Passage::new(SourceRef::new("Psalms", 23, 1), "The LORD is my shepherd");
        assert_eq!(p.citation(), "Psalms 23:1");
    }
}
