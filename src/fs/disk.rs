use std::io;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::fs;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::config::{self, ServeConfig};
use crate::error::ConfigError;
use crate::fs::{FileExt, Filesystem, Metadata};

#[derive(Debug)]
pub struct DiskFile(File);

impl AsyncRead for DiskFile {
    #[inline]
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl AsyncSeek for DiskFile {
    #[inline]
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.get_mut().0).start_seek(position)
    }

    #[inline]
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.get_mut().0).poll_complete(cx)
    }
}

impl FileExt for DiskFile {
    fn metadata(&self) -> BoxFuture<'_, io::Result<Metadata>> {
        async move { Ok(convert_metadata(&self.0.metadata().await?)) }.boxed()
    }
}

/// Serves files below a directory on the local disk.
#[derive(Debug, Clone)]
pub struct DiskFilesystem {
    base: PathBuf,
}

impl DiskFilesystem {
    /// Check that `base` is an existing directory.
    pub fn new<P: Into<PathBuf>>(base: P) -> Result<Self, ConfigError> {
        Ok(Self {
            base: config::validate_root(base.into())?,
        })
    }

    pub(crate) fn from_config(config: &ServeConfig) -> Self {
        Self {
            base: config.root.clone(),
        }
    }

    fn build_and_validate_path(&self, path: &Path) -> io::Result<PathBuf> {
        let mut path_to_file = self.base.clone();
        for component in path.components() {
            match component {
                Component::Normal(comp) => {
                    // protect against paths like `/foo/c:/bar/baz`
                    if Path::new(&comp)
                        .components()
                        .all(|c| matches!(c, Component::Normal(_)))
                    {
                        path_to_file.push(comp)
                    } else {
                        return Err(io::Error::from(ErrorKind::NotFound));
                    }
                }
                Component::CurDir => {}
                Component::Prefix(_) | Component::RootDir | Component::ParentDir => {
                    return Err(io::Error::from(ErrorKind::NotFound));
                }
            }
        }

        Ok(path_to_file)
    }
}

impl Filesystem for DiskFilesystem {
    type File = DiskFile;

    fn open<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Self::File>> {
        async move {
            let path = self.build_and_validate_path(path)?;

            Ok(DiskFile(File::open(&path).await?))
        }
        .boxed()
    }

    fn metadata<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Metadata>> {
        async move {
            let path = self.build_and_validate_path(path)?;

            Ok(convert_metadata(&fs::metadata(&path).await?))
        }
        .boxed()
    }

    fn full_path(&self, path: &Path) -> PathBuf {
        self.base.join(path)
    }
}

fn convert_metadata(raw_metadata: &std::fs::Metadata) -> Metadata {
    Metadata {
        modified: raw_metadata.modified().ok(),
        len: raw_metadata.len(),
        is_dir: raw_metadata.is_dir(),
    }
}
