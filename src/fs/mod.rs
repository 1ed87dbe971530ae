use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncSeek};

pub mod disk;

#[derive(Debug, Clone)]
pub struct Metadata {
    pub modified: Option<SystemTime>,
    pub len: u64,
    pub is_dir: bool,
}

pub trait FileExt {
    fn metadata(&self) -> BoxFuture<'_, io::Result<Metadata>>;
}

/// Read-only view of the served tree.
///
/// Paths handed to a `Filesystem` are relative to its root and already normalized.
pub trait Filesystem {
    type File: AsyncRead + AsyncSeek + FileExt + Send + Sync + Unpin + 'static;

    fn open<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Self::File>>;

    fn metadata<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Metadata>>;

    /// Location of `path` on the backing store, for diagnostics and header hooks.
    fn full_path(&self, path: &Path) -> PathBuf;
}
