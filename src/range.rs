//! `Range: bytes=...` negotiation for single-range responses.

/// A satisfiable byte span, inclusive on both ends, `start <= end < size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: u64,
}

#[allow(clippy::len_without_is_empty)]
impl RangeSpec {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// What to serve for a given `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeNegotiation {
    /// Whole body with `200 OK`: no header, an unparsable one, or several ranges.
    Full,
    Partial(RangeSpec),
    Unsatisfiable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteRange {
    FromTo(u64, u64),
    From(u64),
    Suffix(u64),
}

/// Negotiate `header` against a representation of `size` bytes.
pub fn negotiate(header: Option<&str>, size: u64) -> RangeNegotiation {
    let Some(ranges) = header.and_then(parse) else {
        return RangeNegotiation::Full;
    };

    // multipart/byteranges isn't supported, several ranges get the whole body
    let [range] = ranges.as_slice() else {
        return RangeNegotiation::Full;
    };

    match satisfy(*range, size) {
        Some(spec) => RangeNegotiation::Partial(spec),
        None => RangeNegotiation::Unsatisfiable,
    }
}

/// `None` when the header is not a syntactically valid bytes range set.
fn parse(header: &str) -> Option<Vec<ByteRange>> {
    let set = header.trim_start().strip_prefix("bytes=")?;

    set.split(',')
        .map(str::trim)
        .filter(|spec| !spec.is_empty())
        .map(parse_one)
        .collect::<Option<Vec<_>>>()
        .filter(|ranges| !ranges.is_empty())
}

fn parse_one(spec: &str) -> Option<ByteRange> {
    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (true, true) => None,
        (true, false) => Some(ByteRange::Suffix(parse_u64(end)?)),
        (false, true) => Some(ByteRange::From(parse_u64(start)?)),
        (false, false) => {
            let (start, end) = (parse_u64(start)?, parse_u64(end)?);
            (start <= end).then_some(ByteRange::FromTo(start, end))
        }
    }
}

fn parse_u64(digits: &str) -> Option<u64> {
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

fn satisfy(range: ByteRange, size: u64) -> Option<RangeSpec> {
    let last = size.checked_sub(1)?;

    let (start, end) = match range {
        ByteRange::FromTo(start, end) => (start, end.min(last)),
        ByteRange::From(start) => (start, last),
        ByteRange::Suffix(0) => return None,
        ByteRange::Suffix(len) => (size.saturating_sub(len), last),
    };

    (start <= last).then_some(RangeSpec { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(start: u64, end: u64) -> RangeNegotiation {
        RangeNegotiation::Partial(RangeSpec { start, end })
    }

    #[test]
    fn no_header_serves_everything() {
        assert_eq!(negotiate(None, 10), RangeNegotiation::Full);
    }

    #[test]
    fn supported_forms() {
        assert_eq!(negotiate(Some("bytes=0-4"), 10), partial(0, 4));
        assert_eq!(negotiate(Some("bytes=3-"), 10), partial(3, 9));
        assert_eq!(negotiate(Some("bytes=-3"), 10), partial(7, 9));
        assert_eq!(negotiate(Some("bytes=-30"), 10), partial(0, 9));
        assert_eq!(negotiate(Some("bytes= 2 - 2 "), 10), partial(2, 2));
    }

    #[test]
    fn end_is_clamped() {
        assert_eq!(negotiate(Some("bytes=5-100"), 10), partial(5, 9));
    }

    #[test]
    fn start_past_the_end_is_unsatisfiable() {
        assert_eq!(negotiate(Some("bytes=10-"), 10), RangeNegotiation::Unsatisfiable);
        assert_eq!(negotiate(Some("bytes=20-30"), 10), RangeNegotiation::Unsatisfiable);
        assert_eq!(negotiate(Some("bytes=0-"), 0), RangeNegotiation::Unsatisfiable);
        assert_eq!(negotiate(Some("bytes=-0"), 10), RangeNegotiation::Unsatisfiable);
    }

    #[test]
    fn garbage_is_ignored() {
        for header in [
            "bytes",
            "bytes=",
            "items=0-1",
            "bytes=a-b",
            "bytes=-",
            "bytes=5-2",
            "bytes=1-2-3",
            "bytes=+1-2",
        ] {
            assert_eq!(negotiate(Some(header), 10), RangeNegotiation::Full, "{header}");
        }
    }

    #[test]
    fn multiple_ranges_serve_everything() {
        assert_eq!(negotiate(Some("bytes=0-1,3-4"), 10), RangeNegotiation::Full);
        assert_eq!(negotiate(Some("bytes=0-1, 20-"), 10), RangeNegotiation::Full);
    }

    #[test]
    fn length_matches_span() {
        let RangeNegotiation::Partial(spec) = negotiate(Some("bytes=2-5"), 10) else {
            panic!("expected partial");
        };
        assert_eq!(spec.len(), 4);
        assert_eq!((spec.start, spec.end), (2, 5));
    }
}
