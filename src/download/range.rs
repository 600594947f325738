//! Range header parsing
//!
//! Only single byte ranges are honored; anything else is treated as absent
//! and the whole file is served.

/// A requested byte interval, bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-end` or, with `end` absent, `bytes=start-`
    From { start: u64, end: Option<u64> },
    /// `bytes=-n`: the last `n` bytes
    Suffix(u64),
}

/// A range resolved against a concrete file size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u64,
    /// Inclusive
    pub end: u64,
}

impl Span {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// The requested start lies at or beyond the end of the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Range start {start} not satisfiable for size {size}")]
pub struct Unsatisfiable {
    pub start: u64,
    pub size: u64,
}

impl ByteRange {
    /// Parse a `Range` header value.
    ///
    /// Returns `None` for malformed, reversed or multi-range values.
    pub fn parse(header: &str) -> Option<Self> {
        let value = header.trim().strip_prefix("bytes=")?.trim();
        if value.contains(',') {
            return None;
        }

        let (start, end) = value.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());

        match (start.is_empty(), end.is_empty()) {
            (false, false) => {
                let start = start.parse().ok()?;
                let end = end.parse().ok()?;
                (start <= end).then_some(ByteRange::From { start, end: Some(end) })
            }
            (false, true) => Some(ByteRange::From {
                start: start.parse().ok()?,
                end: None,
            }),
            (true, false) => Some(ByteRange::Suffix(end.parse().ok()?)),
            (true, true) => None,
        }
    }

    /// Clamp against `size`; an end past the file is cut to the last byte.
    pub fn resolve(&self, size: u64) -> Result<Span, Unsatisfiable> {
        match *self {
            ByteRange::From { start, end } => {
                if start >= size {
                    return Err(Unsatisfiable { start, size });
                }
                let last = size - 1;
                Ok(Span {
                    start,
                    end: end.map_or(last, |e| e.min(last)),
                })
            }
            ByteRange::Suffix(n) => {
                if n == 0 || size == 0 {
                    return Err(Unsatisfiable { start: size, size });
                }
                Ok(Span {
                    start: size.saturating_sub(n),
                    end: size - 1,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            ByteRange::parse("bytes=0-499"),
            Some(ByteRange::From { start: 0, end: Some(499) })
        );
        assert_eq!(
            ByteRange::parse("bytes=1000-"),
            Some(ByteRange::From { start: 1000, end: None })
        );
        assert_eq!(ByteRange::parse("bytes=-200"), Some(ByteRange::Suffix(200)));
        assert_eq!(
            ByteRange::parse(" bytes= 5 - 9 "),
            Some(ByteRange::From { start: 5, end: Some(9) })
        );
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        assert_eq!(ByteRange::parse("items=0-5"), None);
        assert_eq!(ByteRange::parse("bytes=0-5,10-20"), None);
        assert_eq!(ByteRange::parse("bytes=9-3"), None);
        assert_eq!(ByteRange::parse("bytes=-"), None);
        assert_eq!(ByteRange::parse("bytes=abc-"), None);
        assert_eq!(ByteRange::parse("bytes=5"), None);
    }

    #[test]
    fn test_resolve() {
        let size = 1000;

        let span = ByteRange::From { start: 100, end: Some(199) }.resolve(size).unwrap();
        assert_eq!(span, Span { start: 100, end: 199 });
        assert_eq!(span.len(), 100);

        let open = ByteRange::From { start: 900, end: None }.resolve(size).unwrap();
        assert_eq!(open, Span { start: 900, end: 999 });

        let clamped = ByteRange::From { start: 990, end: Some(5000) }.resolve(size).unwrap();
        assert_eq!(clamped, Span { start: 990, end: 999 });

        let suffix = ByteRange::Suffix(10).resolve(size).unwrap();
        assert_eq!(suffix, Span { start: 990, end: 999 });

        let whole = ByteRange::Suffix(5000).resolve(size).unwrap();
        assert_eq!(whole, Span { start: 0, end: 999 });
    }

    #[test]
    fn test_resolve_unsatisfiable() {
        assert_eq!(
            ByteRange::From { start: 1000, end: None }.resolve(1000),
            Err(Unsatisfiable { start: 1000, size: 1000 })
        );
        assert!(ByteRange::From { start: 5000, end: Some(6000) }.resolve(1000).is_err());
        assert!(ByteRange::From { start: 0, end: None }.resolve(0).is_err());
        assert!(ByteRange::Suffix(0).resolve(10).is_err());
    }
}
