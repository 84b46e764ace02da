//! `Range` request header parsing (RFC 7233, `bytes` unit only).

use thiserror::Error;

const BYTES_UNIT: &str = "bytes=";

/// Errors returned by [`parse_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The header is syntactically malformed.
    #[error("invalid range")]
    Invalid,

    /// The header is well formed but every range starts at or past the end
    /// of the resource.
    #[error("invalid range: failed to overlap")]
    NoOverlap,
}

impl RangeError {
    /// HTTP status a server should answer with for this error.
    ///
    /// `Invalid` maps to 400 Bad Request, `NoOverlap` to
    /// 416 Range Not Satisfiable (see [`unsatisfied_content_range`]).
    pub fn status_code(&self) -> u16 {
        match self {
            RangeError::Invalid => 400,
            RangeError::NoOverlap => 416,
        }
    }
}

/// A byte range within a resource of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    start: u64,
    length: u64,
}

impl ByteRange {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Inclusive offset of the last byte, `None` for a zero-length range or
    /// one reaching past `u64::MAX`.
    pub fn end(&self) -> Option<u64> {
        match self.length {
            0 => None,
            n => self.start.checked_add(n - 1),
        }
    }

    /// Value of the `Content-Range` response header for this range.
    ///
    /// No validation is done against `size`.
    ///
    /// # Example
    ///
    /// ```
    /// # use rangekit::http::range::ByteRange;
    /// assert_eq!(ByteRange::new(4, 1).content_range(10), "bytes 4-4/10");
    /// ```
    pub fn content_range(&self, size: u64) -> String {
        // zero-length ranges project their last byte to start - 1
        let last = i128::from(self.start) + i128::from(self.length) - 1;
        format!("bytes {}-{}/{}", self.start, last, size)
    }

    /// Single-range `Range` request header value, `None` for a zero-length range.
    pub fn to_header_value(&self) -> Option<String> {
        self.end()
            .map(|end| format!("{}{}-{}", BYTES_UNIT, self.start, end))
    }
}

/// `Content-Range` value sent with a 416 response.
pub fn unsatisfied_content_range(size: u64) -> String {
    format!("bytes */{}", size)
}

/// Parses a `Range` header value against a resource of `size` bytes.
///
/// An empty `header` means no Range header was sent and yields no ranges.
/// Ranges are returned in header order, clamped to the resource; specs
/// starting at or past `size` are dropped, and if that leaves nothing the
/// result is [`RangeError::NoOverlap`].
///
/// # Example
///
/// ```
/// # use rangekit::http::range::{parse_range, ByteRange};
/// let ranges = parse_range("bytes=1-3, -2", 10).unwrap();
/// assert_eq!(ranges, vec![ByteRange::new(1, 3), ByteRange::new(8, 2)]);
/// ```
pub fn parse_range(header: &str, size: u64) -> Result<Vec<ByteRange>, RangeError> {
    if header.is_empty() {
        return Ok(Vec::new());
    }

    let specs = header
        .strip_prefix(BYTES_UNIT)
        .ok_or(RangeError::Invalid)?;

    let mut ranges = Vec::new();
    let mut no_overlap = false;

    for spec in specs.split(',') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }

        let (start, end) = spec.split_once('-').ok_or(RangeError::Invalid)?;
        let (start, end) = (start.trim(), end.trim());

        if start.is_empty() {
            // Suffix range: the last `end` bytes.
            let suffix = parse_offset(end)?.min(size);
            ranges.push(ByteRange::new(size - suffix, suffix));
            continue;
        }

        let first = parse_offset(start)?;
        if first >= size {
            no_overlap = true;
            continue;
        }

        let length = if end.is_empty() {
            size - first
        } else {
            let last = parse_offset(end)?;
            if last < first {
                return Err(RangeError::Invalid);
            }
            last.min(size - 1) - first + 1
        };

        ranges.push(ByteRange::new(first, length));
    }

    if no_overlap && ranges.is_empty() {
        return Err(RangeError::NoOverlap);
    }

    Ok(ranges)
}

fn parse_offset(s: &str) -> Result<u64, RangeError> {
    s.parse::<u64>().map_err(|_| RangeError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u64, length: u64) -> ByteRange {
        ByteRange::new(start, length)
    }

    #[test]
    fn parse_table() {
        let cases: Vec<(&str, u64, Result<Vec<ByteRange>, RangeError>)> = vec![
            ("", 10, Ok(vec![])),
            ("0-10", 10, Err(RangeError::Invalid)),
            ("bytes=0,10", 10, Err(RangeError::Invalid)),
            ("bytes=-abc", 10, Err(RangeError::Invalid)),
            ("bytes=-5", 10, Ok(vec![r(5, 5)])),
            ("bytes=-15", 10, Ok(vec![r(0, 10)])),
            ("bytes=abc-15", 10, Err(RangeError::Invalid)),
            ("bytes=3-", 10, Ok(vec![r(3, 7)])),
            ("bytes=3-abc", 10, Err(RangeError::Invalid)),
            ("bytes=3-7", 10, Ok(vec![r(3, 5)])),
            ("bytes=3-17", 10, Ok(vec![r(3, 7)])),
            ("bytes=", 10, Ok(vec![])),
            ("bytes=10-15", 10, Err(RangeError::NoOverlap)),
            ("bytes=1-3, 5-7", 10, Ok(vec![r(1, 3), r(5, 3)])),
            ("bytes=1-3, 5-17", 10, Ok(vec![r(1, 3), r(5, 5)])),
            ("bytes=1-3, 15-17", 10, Ok(vec![r(1, 3)])),
        ];

        for (header, size, expected) in cases {
            assert_eq!(parse_range(header, size), expected, "header {:?}", header);
        }
    }

    #[test]
    fn bare_dash_is_invalid() {
        assert_eq!(parse_range("bytes=-", 10), Err(RangeError::Invalid));
        assert_eq!(parse_range("bytes=1-2,-", 10), Err(RangeError::Invalid));
    }

    #[test]
    fn start_after_end_is_invalid() {
        assert_eq!(parse_range("bytes=5-3", 10), Err(RangeError::Invalid));
    }

    #[test]
    fn negative_bounds_are_invalid() {
        assert_eq!(parse_range("bytes=--5", 10), Err(RangeError::Invalid));
        assert_eq!(parse_range("bytes=3--5", 10), Err(RangeError::Invalid));
    }

    #[test]
    fn empty_specs_are_skipped() {
        assert_eq!(parse_range("bytes=,,", 10), Ok(vec![]));
        assert_eq!(parse_range("bytes= , 2-3 ,", 10), Ok(vec![r(2, 2)]));
    }

    #[test]
    fn whitespace_around_bounds() {
        assert_eq!(parse_range("bytes= 1 - 3 ", 10), Ok(vec![r(1, 3)]));
    }

    #[test]
    fn zero_suffix_is_kept() {
        assert_eq!(parse_range("bytes=-0", 10), Ok(vec![r(10, 0)]));
    }

    #[test]
    fn empty_resource() {
        assert_eq!(parse_range("bytes=0-", 0), Err(RangeError::NoOverlap));
        assert_eq!(parse_range("bytes=-5", 0), Ok(vec![r(0, 0)]));
    }

    #[test]
    fn no_reordering_or_merging() {
        assert_eq!(
            parse_range("bytes=5-7,0-1,5-7", 10),
            Ok(vec![r(5, 3), r(0, 2), r(5, 3)])
        );
    }

    #[test]
    fn emitted_ranges_stay_inside_resource() {
        let headers = [
            "bytes=0-", "bytes=-1", "bytes=-100", "bytes=9-9", "bytes=0-1000",
            "bytes=2-4,6-,-3", "bytes=8-,20-30",
        ];

        for header in headers {
            for range in parse_range(header, 10).unwrap() {
                assert!(range.start() < 10, "{header}: {range:?}");
                assert!(range.start() + range.length() <= 10, "{header}: {range:?}");
            }
        }
    }

    #[test]
    fn content_range_projection() {
        assert_eq!(r(0, 10).content_range(10), "bytes 0-9/10");
        assert_eq!(r(0, 15).content_range(10), "bytes 0-14/10");
        assert_eq!(r(4, 1).content_range(10), "bytes 4-4/10");
        assert_eq!(r(0, 0).content_range(0), "bytes 0--1/0");
    }

    #[test]
    fn single_range_header_value() {
        let range = r(3, 5);
        assert_eq!(range.end(), Some(7));
        assert_eq!(range.to_header_value().as_deref(), Some("bytes=3-7"));
        assert_eq!(r(10, 0).to_header_value(), None);
    }

    #[test]
    fn end_does_not_overflow() {
        assert_eq!(r(u64::MAX, 1).end(), Some(u64::MAX));
        assert_eq!(r(u64::MAX, 2).end(), None);
        assert_eq!(r(u64::MAX, 2).to_header_value(), None);
        assert_eq!(
            r(u64::MAX, 2).content_range(10),
            format!("bytes {}-{}/10", u64::MAX, u128::from(u64::MAX) + 1)
        );
    }

    #[test]
    fn error_status_codes() {
        assert_eq!(RangeError::Invalid.status_code(), 400);
        assert_eq!(RangeError::NoOverlap.status_code(), 416);
        assert_eq!(unsatisfied_content_range(10), "bytes */10");
    }
}
