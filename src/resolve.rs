use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use percent_encoding::percent_decode_str;

use crate::config::{Dotfiles, ServeOptions};
use crate::error::{ForbiddenReason, NotFoundReason, ServeError};
use crate::fs::{Filesystem, Metadata};

/// Longest single path segment most filesystems accept.
const MAX_NAME_LEN: usize = 255;

/// A file the request resolved to.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    /// Location on the backing filesystem.
    pub path: PathBuf,
    pub is_dir: bool,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Decoded and normalized request path, relative to the served root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RequestPath {
    segments: Vec<String>,
    trailing_slash: bool,
}

impl RequestPath {
    /// Decode the raw URI path and normalize it.
    ///
    /// Rejects malformed percent-encoding and NUL bytes with `BadRequest`, and any `..`
    /// that would climb above the root with `Forbidden`.
    pub(crate) fn parse(raw: &str) -> Result<Self, ServeError> {
        let decoded = decode_path(raw)?;
        let segments = normalize_segments(&decoded)?
            .into_iter()
            .map(str::to_owned)
            .collect();

        Ok(Self {
            segments,
            trailing_slash: raw.ends_with('/'),
        })
    }

    pub(crate) fn has_trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    /// Apply the dotfile policy and the name length limit.
    pub(crate) fn check(&self, dotfiles: Dotfiles) -> Result<(), ServeError> {
        if self.segments.iter().any(|segment| is_dotfile(segment)) {
            match dotfiles {
                Dotfiles::Allow => {}
                Dotfiles::Deny => return Err(ServeError::Forbidden(ForbiddenReason::Dotfile)),
                Dotfiles::Ignore => return Err(ServeError::NotFound(NotFoundReason::Dotfile)),
            }
        }

        if self
            .segments
            .iter()
            .any(|segment| segment.len() > MAX_NAME_LEN)
        {
            return Err(ServeError::NotFound(NotFoundReason::NameTooLong));
        }

        Ok(())
    }

    pub(crate) fn to_path_buf(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

fn is_dotfile(segment: &str) -> bool {
    segment.len() > 1 && segment.starts_with('.')
}

/// Percent-decode a URI path, rejecting what `decodeURIComponent`-style decoders reject.
pub(crate) fn decode_path(raw: &str) -> Result<String, ServeError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let well_formed = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !well_formed {
                return Err(ServeError::BadRequest);
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ServeError::BadRequest)?;
    if decoded.contains('\0') {
        return Err(ServeError::BadRequest);
    }

    Ok(decoded.into_owned())
}

/// Collapse `.`, `..` and empty segments of an already decoded path.
///
/// Pure function over the segments: a `..` with nothing left to pop escapes the root and
/// yields `Forbidden`.
pub fn normalize_segments(decoded: &str) -> Result<Vec<&str>, ServeError> {
    let mut segments = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(ServeError::Forbidden(ForbiddenReason::Traversal));
                }
            }
            // a separator smuggled in another form is never a plain file name
            segment if segment.contains('\\') && cfg!(windows) => {
                return Err(ServeError::Forbidden(ForbiddenReason::Traversal));
            }
            segment => segments.push(segment),
        }
    }

    Ok(segments)
}

pub(crate) enum Resolution {
    File { path: PathBuf, metadata: Metadata },
    Redirect,
    NotFound(NotFoundReason),
}

/// Probe the filesystem for the request path, applying index and extension fallbacks.
pub(crate) async fn resolve<FS: Filesystem>(
    filesystem: &FS,
    options: &ServeOptions,
    request_path: &RequestPath,
) -> io::Result<Resolution> {
    let path = request_path.to_path_buf();

    if request_path.has_trailing_slash() {
        if !options.index.is_enabled() {
            return Ok(match probe(filesystem, &path).await? {
                Ok(metadata) if metadata.is_dir => Resolution::NotFound(NotFoundReason::Directory),
                Ok(_) => Resolution::NotFound(NotFoundReason::Missing),
                Err(reason) => Resolution::NotFound(reason),
            });
        }

        for name in options.index.names() {
            let candidate = path.join(name);
            tracing::trace!(candidate = %candidate.display(), "trying index file");
            match probe(filesystem, &candidate).await? {
                Ok(metadata) if !metadata.is_dir => {
                    return Ok(Resolution::File {
                        path: candidate,
                        metadata,
                    });
                }
                Err(NotFoundReason::NameTooLong) => {
                    return Ok(Resolution::NotFound(NotFoundReason::NameTooLong));
                }
                _ => {}
            }
        }

        return Ok(Resolution::NotFound(NotFoundReason::Missing));
    }

    match probe(filesystem, &path).await? {
        Ok(metadata) if metadata.is_dir => {
            if options.redirect {
                Ok(Resolution::Redirect)
            } else {
                Ok(Resolution::NotFound(NotFoundReason::Directory))
            }
        }
        Ok(metadata) => Ok(Resolution::File { path, metadata }),
        Err(NotFoundReason::Missing) if !path.as_os_str().is_empty() => {
            for extension in options.fallback_extensions() {
                let candidate = with_extension(&path, extension);
                tracing::trace!(candidate = %candidate.display(), "trying extension");
                if let Ok(metadata) = probe(filesystem, &candidate).await? {
                    if !metadata.is_dir {
                        return Ok(Resolution::File {
                            path: candidate,
                            metadata,
                        });
                    }
                }
            }

            Ok(Resolution::NotFound(NotFoundReason::Missing))
        }
        Err(reason) => Ok(Resolution::NotFound(reason)),
    }
}

fn with_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// The inner `Err` carries why the entry can't be served; the outer one is a real I/O failure.
async fn probe<FS: Filesystem>(
    filesystem: &FS,
    path: &Path,
) -> io::Result<Result<Metadata, NotFoundReason>> {
    match filesystem.metadata(path).await {
        Ok(metadata) => Ok(Ok(metadata)),
        Err(err) => match not_found_reason(&err) {
            Some(reason) => Ok(Err(reason)),
            None => Err(err),
        },
    }
}

/// Lookup failures that mean "nothing to serve here" rather than a broken filesystem.
///
/// A path whose segments are short but whose total length passes the OS limit ends up
/// as `InvalidFilename` (`ENAMETOOLONG`).
pub(crate) fn not_found_reason(err: &io::Error) -> Option<NotFoundReason> {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::NotADirectory => {
            Some(NotFoundReason::Missing)
        }
        io::ErrorKind::InvalidFilename => Some(NotFoundReason::NameTooLong),
        _ => None,
    }
}
