//! `Range` request header parsing and resolution.
//!
//! Policy: an end offset past the file is clamped to the last byte; a start
//! offset past the file, an inverted span, an empty file, a zero-length
//! suffix, multiple ranges or a malformed header are unsatisfiable.

use crate::errors::{Result, StreamError};
use crate::types::ByteRange;

/// A parsed but not yet size-checked byte range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=<start>-[<end>]`
    FromTo { start: u64, end: Option<u64> },
    /// `bytes=-<n>`: the last `n` bytes.
    Suffix(u64),
}

/// Parses a `Range` header value such as `bytes=0-99`.
pub fn parse_range_header(value: &str) -> Result<RangeSpec> {
    let (unit, spec) = value
        .trim()
        .split_once('=')
        .ok_or_else(|| StreamError::InvalidRange(format!("missing range unit: {value}")))?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(StreamError::InvalidRange(format!("unsupported range unit: {value}")));
    }
    let spec = spec.trim();
    if spec.contains(',') {
        return Err(StreamError::InvalidRange(format!("multiple ranges are not supported: {value}")));
    }
    let (first, last) = spec
        .split_once('-')
        .ok_or_else(|| StreamError::InvalidRange(format!("missing '-' in range: {value}")))?;
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        let n = parse_offset(last, value)?;
        return Ok(RangeSpec::Suffix(n));
    }
    let start = parse_offset(first, value)?;
    let end = if last.is_empty() { None } else { Some(parse_offset(last, value)?) };
    Ok(RangeSpec::FromTo { start, end })
}

fn parse_offset(s: &str, header: &str) -> Result<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StreamError::InvalidRange(format!("invalid byte offset in range: {header}")));
    }
    s.parse::<u64>()
        .map_err(|_| StreamError::InvalidRange(format!("byte offset overflow in range: {header}")))
}

/// Resolves a parsed range against a file of `size` bytes.
pub fn resolve(spec: RangeSpec, size: u64) -> Result<ByteRange> {
    if size == 0 {
        return Err(StreamError::InvalidRange("file is empty".to_string()));
    }
    let last = size - 1;
    match spec {
        RangeSpec::FromTo { start, end } => {
            if start >= size {
                return Err(StreamError::InvalidRange(format!(
                    "start {start} is beyond file size {size}"
                )));
            }
            let end = end.unwrap_or(last).min(last);
            if start > end {
                return Err(StreamError::InvalidRange(format!("start {start} is after end {end}")));
            }
            Ok(ByteRange { start, end, total: size })
        }
        RangeSpec::Suffix(0) => Err(StreamError::InvalidRange("zero-length suffix range".to_string())),
        RangeSpec::Suffix(n) => Ok(ByteRange { start: size.saturating_sub(n), end: last, total: size }),
    }
}

/// Parses and resolves a `Range` header value in one step.
pub fn resolve_header(value: &str, size: u64) -> Result<ByteRange> {
    resolve(parse_range_header(value)?, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_and_closed_ranges() {
        assert_eq!(
            parse_range_header("bytes=0-99").unwrap(),
            RangeSpec::FromTo { start: 0, end: Some(99) }
        );
        assert_eq!(
            parse_range_header("bytes=500-").unwrap(),
            RangeSpec::FromTo { start: 500, end: None }
        );
        assert_eq!(parse_range_header(" bytes=-20 ").unwrap(), RangeSpec::Suffix(20));
    }

    #[test]
    fn unit_is_case_insensitive() {
        for header in ["Bytes=0-99", "BYTES=0-99", "bytes = 0-99"] {
            assert_eq!(
                parse_range_header(header).unwrap(),
                RangeSpec::FromTo { start: 0, end: Some(99) },
                "{header}"
            );
        }
    }

    #[test]
    fn rejects_malformed_headers() {
        for bad in ["", "bytes=", "bytes=-", "items=0-1", "bytes=a-9", "bytes=0-9,20-29", "bytes=5", "bytes=+1-2"] {
            assert!(
                matches!(parse_range_header(bad), Err(StreamError::InvalidRange(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn open_end_defaults_to_last_byte() {
        let r = resolve_header("bytes=10-", 1000).unwrap();
        assert_eq!((r.start, r.end, r.len()), (10, 999, 990));
    }

    #[test]
    fn end_past_size_is_clamped() {
        let r = resolve_header("bytes=900-2000", 1000).unwrap();
        assert_eq!(r.content_range(), "bytes 900-999/1000");
        assert_eq!(r.len(), 100);
    }

    #[test]
    fn unsatisfiable_ranges() {
        assert!(resolve_header("bytes=1000-1001", 1000).is_err());
        assert!(resolve_header("bytes=50-10", 1000).is_err());
        assert!(resolve_header("bytes=0-0", 0).is_err());
        assert!(resolve_header("bytes=-0", 1000).is_err());
    }

    #[test]
    fn suffix_longer_than_file_covers_whole_file() {
        let r = resolve_header("bytes=-5000", 1000).unwrap();
        assert_eq!((r.start, r.end), (0, 999));
        let r = resolve_header("bytes=-100", 1000).unwrap();
        assert_eq!((r.start, r.end), (900, 999));
    }
}
