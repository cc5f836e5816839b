//! Single-range `Range` header parsing
//!
//! Supports `bytes=A-B`, `bytes=A-` and `bytes=-N`. Anything else (multiple
//! ranges, other units, malformed or unsatisfiable values) means "no range"
//! and the whole object is served.

/// Inclusive byte range within an object of `total` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Content-Range` header value
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// Parse a Range header against an object of `total` bytes.
pub fn parse_range(header: &str, total: u64) -> Option<ByteRange> {
    let spec = header.trim().strip_prefix("bytes=")?;
    if total == 0 || spec.contains(',') {
        return None;
    }
    let (first, last) = spec.split_once('-')?;
    let (first, last) = (first.trim(), last.trim());

    let (start, end) = if first.is_empty() {
        // Suffix range: bytes=-500 means last 500 bytes
        let suffix: u64 = last.parse().ok()?;
        if suffix == 0 {
            return None;
        }
        (total.saturating_sub(suffix), total - 1)
    } else {
        let start: u64 = first.parse().ok()?;
        if start >= total {
            return None;
        }
        let end = if last.is_empty() {
            total - 1
        } else {
            let end: u64 = last.parse().ok()?;
            if end < start {
                return None;
            }
            end.min(total - 1)
        };
        (start, end)
    };

    Some(ByteRange { start, end, total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_header() {
        let r = parse_range("bytes=0-9", 100).unwrap();
        assert_eq!((r.start, r.end, r.len()), (0, 9, 10));
        assert_eq!(r.content_range(), "bytes 0-9/100");

        let r = parse_range("bytes=90-", 100).unwrap();
        assert_eq!((r.start, r.end, r.len()), (90, 99, 10));

        let r = parse_range("bytes=-5", 100).unwrap();
        assert_eq!((r.start, r.end), (95, 99));
        assert_eq!(r.content_range(), "bytes 95-99/100");
    }

    #[test]
    fn test_suffix_clamped_to_size() {
        let r = parse_range("bytes=-500", 100).unwrap();
        assert_eq!((r.start, r.end, r.len()), (0, 99, 100));
    }

    #[test]
    fn test_end_clamped_to_size() {
        let r = parse_range("bytes=10-1000", 100).unwrap();
        assert_eq!((r.start, r.end), (10, 99));
    }

    #[test]
    fn test_unsupported_forms_mean_no_range() {
        assert_eq!(parse_range("", 100), None);
        assert_eq!(parse_range("bytes=9-0", 100), None);
        assert_eq!(parse_range("bytes=-0", 100), None);
        assert_eq!(parse_range("bytes=100-", 100), None);
        assert_eq!(parse_range("bytes=0-1,5-9", 100), None);
        assert_eq!(parse_range("items=0-9", 100), None);
        assert_eq!(parse_range("bytes=a-b", 100), None);
        assert_eq!(parse_range("bytes=0-9", 0), None);
    }
}
