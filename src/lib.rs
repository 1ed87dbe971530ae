//! Static file response engine, exposed as a [`tower_service::Service`].
//!
//! [`ServeDir`] resolves request paths below a root directory, answers conditional
//! requests from `ETag`/`Last-Modified` validators, serves single byte ranges and streams
//! the file body. Anything it can't serve is either handed to a fallback service (the next
//! handler of the host framework) or turned into a terminal `4xx`, depending on
//! [`ServeOptions::fallthrough`].
//!
//! Each request produces exactly one [`ResponseOutcome`]; [`ServeDir::outcome`] exposes it
//! directly for hosts that want to map it onto their own response type.
//!
//! # Example
//! ```no_run
//! use serve_static::{Dotfiles, ServeDir};
//!
//! // This will serve files in the "assets" directory and
//! // its subdirectories
//! let service = ServeDir::new("assets")
//!     .expect("assets is a directory")
//!     .dotfiles(Dotfiles::Deny)
//!     .fallthrough(false);
//!
//! # async {
//! // Run our service using `hyper`
//! let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 3000));
//! hyper::Server::bind(&addr)
//!     .serve(tower::make::Shared::new(service))
//!     .await
//!     .expect("server error");
//! # };
//! ```

pub use async_body::AsyncReadBody;
pub use config::{Dotfiles, IndexFiles, MaxAge, ServeConfig, ServeOptions, SetHeaders, MAX_MAX_AGE};
pub use error::{ConfigError, ForbiddenReason, NotFoundReason, ServeError};
pub use open_file::{FileOpened, ResponseOutcome};
pub use range::{RangeNegotiation, RangeSpec};
pub use resolve::{normalize_segments, ResolvedEntry};
pub use response::ResponseBody;
pub use serve_dir::{DefaultServeDirFallback, ServeDir};

mod async_body;
mod config;
mod error;
pub mod fs;
mod headers;
mod mime;
mod open_file;
pub mod range;
mod resolve;
mod response;
mod serve_dir;
