use std::time::UNIX_EPOCH;

use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue};
use httpdate::HttpDate;

use crate::fs::Metadata;

/// Outcome of evaluating the conditional request headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Precondition {
    Proceed,
    NotModified,
    Failed,
}

/// The validators of one file, each present only when enabled.
#[derive(Debug, Clone, Default)]
pub(crate) struct Validators {
    etag: Option<String>,
    last_modified: Option<HttpDate>,
}

impl Validators {
    pub(crate) fn new(metadata: &Metadata, etag: bool, last_modified: bool) -> Self {
        Self {
            etag: etag.then(|| strong_etag(metadata)),
            last_modified: last_modified
                .then_some(metadata.modified)
                .flatten()
                .map(HttpDate::from),
        }
    }

    /// `ETag`, `Last-Modified` and `Cache-Control`, shared by content and 304 responses.
    pub(crate) fn to_headers(&self, cache_control: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(value) = cache_control.and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        if let Some(last_modified) = self.last_modified {
            if let Ok(value) = HeaderValue::from_str(&last_modified.to_string()) {
                headers.insert(header::LAST_MODIFIED, value);
            }
        }
        if let Some(value) = self.etag.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(header::ETAG, value);
        }

        headers
    }

    /// Evaluate `If-Match`/`If-Unmodified-Since`, then `If-None-Match`/`If-Modified-Since`.
    pub(crate) fn evaluate(&self, request: &HeaderMap) -> Precondition {
        if self.precondition_fails(request) {
            Precondition::Failed
        } else if self.is_fresh(request) {
            Precondition::NotModified
        } else {
            Precondition::Proceed
        }
    }

    fn precondition_fails(&self, request: &HeaderMap) -> bool {
        if let Some(if_match) = joined(request, &header::IF_MATCH) {
            let Some(etag) = &self.etag else {
                return true;
            };
            if if_match.trim() == "*" {
                return false;
            }

            return !entity_tags(&if_match).any(|tag| tag == etag.as_str());
        }

        match (
            http_date(request, &header::IF_UNMODIFIED_SINCE),
            self.last_modified,
        ) {
            (Some(since), Some(modified)) => modified > since,
            _ => false,
        }
    }

    fn is_fresh(&self, request: &HeaderMap) -> bool {
        let if_none_match = joined(request, &header::IF_NONE_MATCH);
        let if_modified_since = request.get(header::IF_MODIFIED_SINCE);

        if if_none_match.is_none() && if_modified_since.is_none() {
            return false;
        }

        // an explicit end-to-end reload always gets the full representation
        if joined(request, &header::CACHE_CONTROL)
            .is_some_and(|value| value.split(',').any(|d| d.trim() == "no-cache"))
        {
            return false;
        }

        if let Some(if_none_match) = if_none_match {
            if if_none_match.trim() != "*" {
                let Some(etag) = &self.etag else {
                    return false;
                };
                if !entity_tags(&if_none_match).any(|tag| weak_eq(tag, etag)) {
                    return false;
                }
            }
        }

        if if_modified_since.is_some() {
            match (
                http_date(request, &header::IF_MODIFIED_SINCE),
                self.last_modified,
            ) {
                (Some(since), Some(modified)) if modified <= since => {}
                _ => return false,
            }
        }

        true
    }

    /// Whether `If-Range` (if any) still matches, so a `Range` header may be honored.
    pub(crate) fn range_is_fresh(&self, request: &HeaderMap) -> bool {
        let Some(if_range) = request.get(header::IF_RANGE).and_then(|v| v.to_str().ok()) else {
            return true;
        };

        if if_range.contains('"') {
            return self
                .etag
                .as_deref()
                .is_some_and(|etag| if_range.trim() == etag);
        }

        match (if_range.trim().parse::<HttpDate>(), self.last_modified) {
            (Ok(date), Some(modified)) => modified <= date,
            _ => false,
        }
    }
}

/// Strong entity tag from size and modification time.
fn strong_etag(metadata: &Metadata) -> String {
    let mtime = metadata
        .modified
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .unwrap_or_default()
        .as_millis();

    format!("\"{:x}-{:x}\"", metadata.len, mtime)
}

fn joined(request: &HeaderMap, name: &HeaderName) -> Option<String> {
    let values: Vec<&str> = request
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    (!values.is_empty()).then(|| values.join(","))
}

fn http_date(request: &HeaderMap, name: &HeaderName) -> Option<HttpDate> {
    request
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn entity_tags(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|tag| !tag.is_empty())
}

fn weak_eq(a: &str, b: &str) -> bool {
    a.trim_start_matches("W/") == b.trim_start_matches("W/")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn metadata() -> Metadata {
        Metadata {
            modified: Some(UNIX_EPOCH + Duration::from_secs(1_000_000_000)),
            len: 11,
            is_dir: false,
        }
    }

    fn request(pairs: &[(HeaderName, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn etag_is_strong_and_derived_from_size_and_mtime() {
        let validators = Validators::new(&metadata(), true, true);
        let headers = validators.to_headers(Some("public, max-age=0"));

        assert_eq!(headers[header::ETAG], "\"b-e8d4a51000\"");
        assert_eq!(headers[header::LAST_MODIFIED], "Sun, 09 Sep 2001 01:46:40 GMT");
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=0");
    }

    #[test]
    fn disabled_validators_emit_nothing() {
        let validators = Validators::new(&metadata(), false, false);
        assert!(validators.to_headers(None).is_empty());
    }

    #[test]
    fn if_none_match_round_trip() {
        let validators = Validators::new(&metadata(), true, true);
        let etag = validators.etag.clone().unwrap();

        let req = request(&[(header::IF_NONE_MATCH, etag.as_str())]);
        assert_eq!(validators.evaluate(&req), Precondition::NotModified);

        let req = request(&[(header::IF_NONE_MATCH, format!("\"other\", W/{etag}").as_str())]);
        assert_eq!(validators.evaluate(&req), Precondition::NotModified);

        let req = request(&[(header::IF_NONE_MATCH, "\"other\"")]);
        assert_eq!(validators.evaluate(&req), Precondition::Proceed);

        let req = request(&[(header::IF_NONE_MATCH, "*")]);
        assert_eq!(validators.evaluate(&req), Precondition::NotModified);
    }

    #[test]
    fn no_cache_request_is_never_fresh() {
        let validators = Validators::new(&metadata(), true, true);
        let etag = validators.etag.clone().unwrap();

        let req = request(&[
            (header::IF_NONE_MATCH, etag.as_str()),
            (header::CACHE_CONTROL, "no-cache"),
        ]);
        assert_eq!(validators.evaluate(&req), Precondition::Proceed);
    }

    #[test]
    fn if_modified_since() {
        let validators = Validators::new(&metadata(), true, true);

        let req = request(&[(header::IF_MODIFIED_SINCE, "Sun, 09 Sep 2001 01:46:40 GMT")]);
        assert_eq!(validators.evaluate(&req), Precondition::NotModified);

        let req = request(&[(header::IF_MODIFIED_SINCE, "Sun, 09 Sep 2001 01:46:39 GMT")]);
        assert_eq!(validators.evaluate(&req), Precondition::Proceed);

        let req = request(&[(header::IF_MODIFIED_SINCE, "yesterday")]);
        assert_eq!(validators.evaluate(&req), Precondition::Proceed);

        let without_last_modified = Validators::new(&metadata(), true, false);
        let req = request(&[(header::IF_MODIFIED_SINCE, "Sun, 09 Sep 2001 01:46:40 GMT")]);
        assert_eq!(without_last_modified.evaluate(&req), Precondition::Proceed);
    }

    #[test]
    fn both_freshness_headers_must_agree() {
        let validators = Validators::new(&metadata(), true, true);
        let etag = validators.etag.clone().unwrap();

        let req = request(&[
            (header::IF_NONE_MATCH, etag.as_str()),
            (header::IF_MODIFIED_SINCE, "Sun, 09 Sep 2001 01:46:39 GMT"),
        ]);
        assert_eq!(validators.evaluate(&req), Precondition::Proceed);
    }

    #[test]
    fn if_match_and_if_unmodified_since() {
        let validators = Validators::new(&metadata(), true, true);
        let etag = validators.etag.clone().unwrap();

        let req = request(&[(header::IF_MATCH, etag.as_str())]);
        assert_eq!(validators.evaluate(&req), Precondition::Proceed);

        let req = request(&[(header::IF_MATCH, "*")]);
        assert_eq!(validators.evaluate(&req), Precondition::Proceed);

        let req = request(&[(header::IF_MATCH, "\"stale\"")]);
        assert_eq!(validators.evaluate(&req), Precondition::Failed);

        let req = request(&[(header::IF_UNMODIFIED_SINCE, "Sun, 09 Sep 2001 01:46:39 GMT")]);
        assert_eq!(validators.evaluate(&req), Precondition::Failed);

        let req = request(&[(header::IF_UNMODIFIED_SINCE, "Sun, 09 Sep 2001 01:46:40 GMT")]);
        assert_eq!(validators.evaluate(&req), Precondition::Proceed);

        let without_etag = Validators::new(&metadata(), false, true);
        let req = request(&[(header::IF_MATCH, "*")]);
        assert_eq!(without_etag.evaluate(&req), Precondition::Failed);
    }

    #[test]
    fn if_range() {
        let validators = Validators::new(&metadata(), true, true);
        let etag = validators.etag.clone().unwrap();

        assert!(validators.range_is_fresh(&HeaderMap::new()));
        assert!(validators.range_is_fresh(&request(&[(header::IF_RANGE, etag.as_str())])));
        assert!(!validators.range_is_fresh(&request(&[(header::IF_RANGE, "\"old\"")])));
        assert!(validators.range_is_fresh(&request(&[(
            header::IF_RANGE,
            "Sun, 09 Sep 2001 01:46:40 GMT"
        )])));
        assert!(!validators.range_is_fresh(&request(&[(
            header::IF_RANGE,
            "Sun, 09 Sep 2001 01:46:39 GMT"
        )])));
    }
}
