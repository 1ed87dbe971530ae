use std::io::{self, SeekFrom};
use std::path::PathBuf;

use http::{header, HeaderMap, HeaderValue, StatusCode};
use tokio::io::AsyncSeekExt;

use crate::config::ServeOptions;
use crate::error::ServeError;
use crate::fs::{FileExt, Filesystem, Metadata};
use crate::headers::{Precondition, Validators};
use crate::mime;
use crate::range::{self, RangeNegotiation, RangeSpec};
use crate::resolve::ResolvedEntry;

/// The single decision made for a request. It fully determines the response.
pub enum ResponseOutcome<IO> {
    /// Directory requested without a trailing slash.
    Redirect { location: HeaderValue },
    /// Validators matched, carries `ETag`/`Last-Modified`/`Cache-Control`.
    NotModified { headers: HeaderMap },
    PreconditionFailed,
    Content(Box<FileOpened<IO>>),
    Error(ServeError),
    /// Nothing to serve here, the next handler should take the request.
    Fallthrough,
}

impl<IO> ResponseOutcome<IO> {
    /// Status the response for this outcome will carry, `None` for [`Self::Fallthrough`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ResponseOutcome::Redirect { .. } => Some(StatusCode::SEE_OTHER),
            ResponseOutcome::NotModified { .. } => Some(StatusCode::NOT_MODIFIED),
            ResponseOutcome::PreconditionFailed => Some(StatusCode::PRECONDITION_FAILED),
            ResponseOutcome::Content(file) => Some(file.status()),
            ResponseOutcome::Error(err) => Some(err.status()),
            ResponseOutcome::Fallthrough => None,
        }
    }
}

impl<IO> std::fmt::Debug for ResponseOutcome<IO> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseOutcome::Redirect { location } => {
                f.debug_struct("Redirect").field("location", location).finish()
            }
            ResponseOutcome::NotModified { .. } => f.write_str("NotModified"),
            ResponseOutcome::PreconditionFailed => f.write_str("PreconditionFailed"),
            ResponseOutcome::Content(file) => f
                .debug_struct("Content")
                .field("entry", &file.entry)
                .field("range", &file.range)
                .finish(),
            ResponseOutcome::Error(err) => f.debug_tuple("Error").field(err).finish(),
            ResponseOutcome::Fallthrough => f.write_str("Fallthrough"),
        }
    }
}

/// A file ready to be streamed.
pub struct FileOpened<IO> {
    pub(crate) extent: FileRequestExtent<IO>,
    pub(crate) entry: ResolvedEntry,
    pub(crate) range: Option<RangeSpec>,
    pub(crate) mime_header_value: HeaderValue,
    /// Validator, cache and `Accept-Ranges` headers.
    pub(crate) headers: HeaderMap,
}

impl<IO> FileOpened<IO> {
    pub fn status(&self) -> StatusCode {
        if self.range.is_some() {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        }
    }

    pub fn entry(&self) -> &ResolvedEntry {
        &self.entry
    }

    pub fn range(&self) -> Option<RangeSpec> {
        self.range
    }

    /// Number of body bytes a `GET` would produce.
    pub fn content_length(&self) -> u64 {
        self.range.map_or(self.entry.len, |range| range.len())
    }
}

pub(crate) enum FileRequestExtent<IO> {
    Full(IO),
    Head,
}

/// Validate and open the resolved file at `path`.
///
/// `HEAD` requests only use `metadata`; `GET` requests open the file and re-read the
/// metadata from the handle, so the validators describe the bytes actually streamed.
pub(crate) async fn open_file<FS: Filesystem>(
    filesystem: &FS,
    options: &ServeOptions,
    path: PathBuf,
    metadata: Metadata,
    request_headers: &HeaderMap,
    head: bool,
) -> io::Result<ResponseOutcome<FS::File>> {
    let (mut extent, metadata) = if head {
        (FileRequestExtent::Head, metadata)
    } else {
        let file = filesystem.open(&path).await?;
        let metadata = file.metadata().await?;
        (FileRequestExtent::Full(file), metadata)
    };

    let validators = Validators::new(&metadata, options.etag, options.last_modified);
    let mut headers = validators.to_headers(options.cache_control_value().as_deref());
    if options.accept_ranges {
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    }

    match validators.evaluate(request_headers) {
        Precondition::Failed => return Ok(ResponseOutcome::PreconditionFailed),
        Precondition::NotModified => return Ok(ResponseOutcome::NotModified { headers }),
        Precondition::Proceed => {}
    }

    let negotiation = if options.accept_ranges && validators.range_is_fresh(request_headers) {
        let range_header = request_headers
            .get(header::RANGE)
            .and_then(|value| value.to_str().ok());
        range::negotiate(range_header, metadata.len)
    } else {
        RangeNegotiation::Full
    };

    let range = match negotiation {
        RangeNegotiation::Full => None,
        RangeNegotiation::Partial(range) => Some(range),
        RangeNegotiation::Unsatisfiable => {
            return Ok(ResponseOutcome::Error(ServeError::RangeNotSatisfiable {
                size: metadata.len,
            }));
        }
    };

    if let (FileRequestExtent::Full(file), Some(range)) = (&mut extent, range) {
        file.seek(SeekFrom::Start(range.start)).await?;
    }

    Ok(ResponseOutcome::Content(Box::new(FileOpened {
        extent,
        mime_header_value: mime::content_type(&path),
        entry: ResolvedEntry {
            path: filesystem.full_path(&path),
            is_dir: metadata.is_dir,
            len: metadata.len,
            modified: metadata.modified,
        },
        range,
        headers,
    })))
}
