use std::error::Error;
use std::future::Ready;
use std::path::PathBuf;
use std::{
    convert::Infallible,
    io,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, TryFutureExt};
use http::{HeaderValue, Method, Request, Response, StatusCode, Uri};
use http_body::Body;
use tower_http::set_status::SetStatus;
use tower_http::BoxError;
use tower_service::Service;
use tracing::Instrument;

use crate::config::{Dotfiles, IndexFiles, MaxAge, ServeConfig, ServeOptions};
use crate::error::{ConfigError, ServeError};
use crate::fs::disk::DiskFilesystem;
use crate::fs::Filesystem;
use crate::open_file::{self, ResponseOutcome};
use crate::resolve::{self, RequestPath, Resolution, ResolvedEntry};
use crate::response::{self, ResponseBody, StreamSettings};

// default capacity 64KiB
const DEFAULT_CAPACITY: usize = 65536;

/// Service that serves files from a given directory and all its sub directories.
///
/// The `Content-Type` is guessed from the file extension. `GET` and `HEAD` are served with
/// `ETag`/`Last-Modified` validators, `Cache-Control`, conditional requests and single byte
/// ranges.
///
/// Requests that can't be served here (missing file, traversal attempt, malformed path,
/// unsupported method) either fall through to the fallback service or, with
/// [`ServeDir::fallthrough`] disabled, get a terminal `4xx` response.
///
/// # Example
///
/// ```no_run
/// use serve_static::ServeDir;
///
/// // This will serve files in the "assets" directory and
/// // its subdirectories
/// let max_age: serve_static::MaxAge = "1d".parse().unwrap();
/// let service = ServeDir::new("assets").unwrap().max_age(max_age);
///
/// # async {
/// // Run our service using `hyper`
/// let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 3000));
/// hyper::Server::bind(&addr)
///     .serve(tower::make::Shared::new(service))
///     .await
///     .expect("server error");
/// # };
/// ```
#[derive(Debug, Clone)]
pub struct ServeDir<FS, F = DefaultServeDirFallback> {
    buf_chunk_size: usize,
    config: ServeConfig,
    fallback: Option<F>,
    filesystem: FS,
}

impl ServeDir<DiskFilesystem, DefaultServeDirFallback> {
    /// Serve `root` with the default options.
    ///
    /// Fails if `root` is empty, doesn't exist or isn't a directory.
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self, ConfigError> {
        Ok(Self::with_config(ServeConfig::new(root, ServeOptions::default())?))
    }

    pub fn with_config(config: ServeConfig) -> Self {
        let filesystem = DiskFilesystem::from_config(&config);
        Self::from_parts(config, filesystem)
    }
}

impl<FS> ServeDir<FS, DefaultServeDirFallback> {
    /// Serve `filesystem` with `config`; the config root is only used for validation.
    pub fn from_parts(config: ServeConfig, filesystem: FS) -> Self {
        Self {
            buf_chunk_size: DEFAULT_CAPACITY,
            config,
            fallback: None,
            filesystem,
        }
    }
}

impl<FS, F> ServeDir<FS, F> {
    pub fn config(&self) -> &ServeConfig {
        &self.config
    }

    /// Index file names tried for directory requests. Defaults to `index.html`.
    pub fn index<I: Into<IndexFiles>>(mut self, index: I) -> Self {
        self.config.options.index = index.into();
        self
    }

    /// Extensions appended, in order, when the requested file doesn't exist.
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.options.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Defaults to [`Dotfiles::Ignore`].
    pub fn dotfiles(mut self, dotfiles: Dotfiles) -> Self {
        self.config.options.dotfiles = dotfiles;
        self
    }

    /// Let the fallback handle requests that can't be served here instead of answering
    /// with an error.
    ///
    /// Defaults to `true`.
    pub fn fallthrough(mut self, fallthrough: bool) -> Self {
        self.config.options.fallthrough = fallthrough;
        self
    }

    /// Redirect `/dir` to `/dir/` with `303 See Other`.
    ///
    /// Defaults to `true`.
    pub fn redirect(mut self, redirect: bool) -> Self {
        self.config.options.redirect = redirect;
        self
    }

    pub fn max_age<M: Into<MaxAge>>(mut self, max_age: M) -> Self {
        self.config.options.max_age = max_age.into();
        self
    }

    pub fn immutable(mut self, immutable: bool) -> Self {
        self.config.options.immutable = immutable;
        self
    }

    pub fn last_modified(mut self, last_modified: bool) -> Self {
        self.config.options.last_modified = last_modified;
        self
    }

    pub fn etag(mut self, etag: bool) -> Self {
        self.config.options.etag = etag;
        self
    }

    pub fn cache_control(mut self, cache_control: bool) -> Self {
        self.config.options.cache_control = cache_control;
        self
    }

    pub fn accept_ranges(mut self, accept_ranges: bool) -> Self {
        self.config.options.accept_ranges = accept_ranges;
        self
    }

    /// Mutate the headers of successful content responses before the body is sent.
    pub fn set_headers<H>(mut self, hook: H) -> Self
    where
        H: Fn(&mut http::HeaderMap, &ResolvedEntry) + Send + Sync + 'static,
    {
        self.config = self.config.set_headers(hook);
        self
    }

    /// Set a specific read buffer chunk size.
    ///
    /// The default capacity is 64kb.
    pub fn with_buf_chunk_size(mut self, chunk_size: usize) -> Self {
        self.buf_chunk_size = chunk_size;
        self
    }

    /// Set the fallback service.
    ///
    /// This service is called on a fall-through outcome, so the request continues to the
    /// next handler. The status code returned by the fallback will not be altered. Use
    /// [`ServeDir::not_found_service`] to always respond with `404 Not Found`.
    pub fn fallback<F2>(self, new_fallback: F2) -> ServeDir<FS, F2> {
        ServeDir {
            buf_chunk_size: self.buf_chunk_size,
            config: self.config,
            fallback: Some(new_fallback),
            filesystem: self.filesystem,
        }
    }

    /// Set the fallback service and override the fallback's status code to `404 Not Found`.
    ///
    /// Setups like this are often found in single page applications.
    pub fn not_found_service<F2>(self, new_fallback: F2) -> ServeDir<FS, SetStatus<F2>> {
        self.fallback(SetStatus::new(new_fallback, StatusCode::NOT_FOUND))
    }
}

impl<FS, F> ServeDir<FS, F>
where
    FS: Filesystem,
{
    /// Decide what to do with `req` without producing a response.
    pub async fn outcome<B>(&self, req: &Request<B>) -> io::Result<ResponseOutcome<FS::File>> {
        decide(&self.config, &self.filesystem, req.method(), req.uri(), req.headers()).await
    }

    /// Turn an outcome into a response, honoring `HEAD` semantics for `method`.
    ///
    /// A fall-through outcome becomes an empty `404 Not Found`.
    pub fn into_response(
        &self,
        outcome: ResponseOutcome<FS::File>,
        method: &Method,
    ) -> Response<ResponseBody> {
        response::build_response(
            outcome,
            &StreamSettings {
                head: method == Method::HEAD,
                chunk_size: self.buf_chunk_size,
                set_headers: self.config.set_headers.as_ref(),
            },
        )
    }
}

enum Failure {
    Serve(ServeError),
    Io(io::Error),
}

impl From<ServeError> for Failure {
    fn from(err: ServeError) -> Self {
        Failure::Serve(err)
    }
}

impl From<io::Error> for Failure {
    fn from(err: io::Error) -> Self {
        Failure::Io(err)
    }
}

/// Policy controller: turn request-level failures into a fall-through or a terminal error.
async fn decide<FS: Filesystem>(
    config: &ServeConfig,
    filesystem: &FS,
    method: &Method,
    uri: &Uri,
    headers: &http::HeaderMap,
) -> io::Result<ResponseOutcome<FS::File>> {
    let options = &config.options;

    match negotiate(options, filesystem, method, uri, headers).await {
        Ok(outcome) => {
            tracing::debug!(path = uri.path(), status = ?outcome.status(), "resolved");
            Ok(outcome)
        }

        Err(Failure::Serve(err)) if options.fallthrough && err.can_fall_through() => {
            tracing::debug!(path = uri.path(), error = %err, "falling through");
            Ok(ResponseOutcome::Fallthrough)
        }

        Err(Failure::Serve(err)) => {
            tracing::debug!(path = uri.path(), error = %err, "refusing request");
            Ok(ResponseOutcome::Error(err))
        }

        Err(Failure::Io(err)) => {
            tracing::warn!(path = uri.path(), error = %err, "failed to read file");
            Err(err)
        }
    }
}

async fn negotiate<FS: Filesystem>(
    options: &ServeOptions,
    filesystem: &FS,
    method: &Method,
    uri: &Uri,
    headers: &http::HeaderMap,
) -> Result<ResponseOutcome<FS::File>, Failure> {
    if method != Method::GET && method != Method::HEAD {
        return Err(ServeError::MethodNotAllowed.into());
    }

    let request_path = RequestPath::parse(uri.path())?;
    request_path.check(options.dotfiles)?;

    match resolve::resolve(filesystem, options, &request_path).await? {
        Resolution::Redirect => {
            let location = redirect_location(uri).ok_or(ServeError::BadRequest)?;
            Ok(ResponseOutcome::Redirect { location })
        }

        Resolution::NotFound(reason) => Err(ServeError::NotFound(reason).into()),

        Resolution::File { path, metadata } => {
            let head = method == Method::HEAD;
            match open_file::open_file(filesystem, options, path, metadata, headers, head).await {
                Ok(outcome) => Ok(outcome),
                // removed between the probe and the open
                Err(err) => match resolve::not_found_reason(&err) {
                    Some(reason) => Err(ServeError::NotFound(reason).into()),
                    None => Err(err.into()),
                },
            }
        }
    }
}

/// `path + "/"` with the query string kept and leading slashes collapsed, so the
/// redirect can never become protocol-relative.
fn redirect_location(uri: &Uri) -> Option<HeaderValue> {
    let mut location = format!("/{}/", uri.path().trim_start_matches('/'));
    if let Some(query) = uri.query() {
        location.push('?');
        location.push_str(query);
    }

    HeaderValue::from_str(&location).ok()
}

impl<ReqBody, F, FResBody, FS> Service<Request<ReqBody>> for ServeDir<FS, F>
where
    ReqBody: Send + 'static,
    F: Service<Request<ReqBody>, Response = Response<FResBody>> + Clone + Send + 'static,
    F::Error: Into<io::Error>,
    F::Future: Send,
    FResBody: Body<Data = Bytes> + Send + 'static,
    FResBody::Error: Into<Box<dyn Error + Send + Sync>>,
    FS: Filesystem + Clone + Send + Sync + 'static,
{
    type Response = Response<ResponseBody>;
    type Error = io::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if let Some(fallback) = &mut self.fallback {
            fallback.poll_ready(cx).map_err(Into::into)
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // get the ready fallback and leave a non-ready clone in its place
        let fallback = self.fallback.as_mut().map(|fallback| {
            let clone = fallback.clone();
            std::mem::replace(fallback, clone)
        });
        let config = self.config.clone();
        let filesystem = self.filesystem.clone();
        let buf_chunk_size = self.buf_chunk_size;

        let span = tracing::debug_span!("serve", method = %req.method(), uri = %req.uri());

        async move {
            // the engine never reads the body but the fallback might, so keep it aside
            // together with the extensions, which can't be cloned either
            let (mut parts, body) = req.into_parts();
            let extensions = std::mem::take(&mut parts.extensions);

            let outcome =
                decide(&config, &filesystem, &parts.method, &parts.uri, &parts.headers).await?;

            if let ResponseOutcome::Fallthrough = outcome {
                return match fallback {
                    Some(mut fallback) => {
                        parts.extensions = extensions;
                        call_fallback(&mut fallback, Request::from_parts(parts, body)).await
                    }
                    None => Ok(response::not_found()),
                };
            }

            Ok(response::build_response(
                outcome,
                &StreamSettings {
                    head: parts.method == Method::HEAD,
                    chunk_size: buf_chunk_size,
                    set_headers: config.set_headers.as_ref(),
                },
            ))
        }
        .instrument(span)
        .boxed()
    }
}

/// The default fallback service used with [`ServeDir`].
#[derive(Debug, Clone, Copy)]
pub struct DefaultServeDirFallback(Infallible);

impl<ReqBody> Service<Request<ReqBody>> for DefaultServeDirFallback
where
    ReqBody: Send + 'static,
{
    type Response = Response<ResponseBody>;
    type Error = io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.0 {}
    }

    fn call(&mut self, _req: Request<ReqBody>) -> Self::Future {
        match self.0 {}
    }
}

async fn call_fallback<F, B, FResBody>(
    fallback: &mut F,
    req: Request<B>,
) -> io::Result<Response<ResponseBody>>
where
    F: Service<Request<B>, Response = Response<FResBody>> + Clone,
    F::Error: Into<io::Error>,
    F::Future: Send,
    FResBody: Body<Data = Bytes> + Send + 'static,
    FResBody::Error: Into<BoxError>,
{
    fallback
        .call(req)
        .err_into()
        .map_ok(|response| {
            response
                .map(|body| {
                    body.map_err(|err| match err.into().downcast::<io::Error>() {
                        Ok(err) => *err,
                        Err(err) => io::Error::new(io::ErrorKind::Other, err),
                    })
                    .boxed_unsync()
                })
                .map(ResponseBody::new)
        })
        .await
}
