//! Byte range expression parsing
//!
//! Ranges use the textual `unit=start-end` form, e.g. `bytes=0-20`.
//! Malformed input is a hard parse failure, never a clamp.

use crate::error::{Error, Result};

/// A parsed `unit=start-end` range expression with `start <= end`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRange {
    pub unit: String,
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn parse(input: &str) -> Result<Self> {
        let (unit, bounds) = input
            .split_once('=')
            .ok_or_else(|| Error::InvalidRange(format!("missing unit in {input:?}")))?;

        if unit.is_empty() || !unit.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::InvalidRange(format!("bad unit in {input:?}")));
        }

        let (start, end) = bounds
            .split_once('-')
            .ok_or_else(|| Error::InvalidRange(format!("missing separator in {input:?}")))?;

        let start = parse_bound(start, input)?;
        let end = parse_bound(end, input)?;

        if start > end {
            return Err(Error::InvalidRange(format!(
                "start {start} exceeds end {end}"
            )));
        }

        Ok(Self {
            unit: unit.to_string(),
            start,
            end,
        })
    }
}

fn parse_bound(text: &str, input: &str) -> Result<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidRange(format!("non-numeric bound in {input:?}")));
    }
    text.parse::<u64>()
        .map_err(|e| Error::InvalidRange(format!("bound out of range in {input:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_ranges() {
        let r = ByteRange::parse("bytes=0-20").unwrap();
        assert_eq!(r.unit, "bytes");
        assert_eq!(r.start, 0);
        assert_eq!(r.end, 20);

        let r = ByteRange::parse("bytes=7-7").unwrap();
        assert_eq!((r.start, r.end), (7, 7));

        let r = ByteRange::parse("items=100-200").unwrap();
        assert_eq!(r.unit, "items");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in [
            "",
            "bytes",
            "=0-20",
            "bytes=0",
            "bytes=0:20",
            "bytes=a-20",
            "bytes=0-b",
            "bytes=-5-20",
            "bytes= 0-20",
            "123=0-20",
            "bytes=20-0",
        ] {
            let err = ByteRange::parse(input).unwrap_err();
            assert!(
                matches!(err, Error::InvalidRange(_)),
                "expected InvalidRange for {input:?}, got {err:?}"
            );
        }
    }
}
