use std::io;

use bytes::Bytes;
use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use http_body::{combinators::UnsyncBoxBody, Body, Empty, Full};
use tokio::io::AsyncRead;

use crate::async_body::AsyncReadBody;
use crate::config::SetHeaders;
use crate::error::ServeError;
use crate::open_file::{FileOpened, FileRequestExtent, ResponseOutcome};

pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

const HTML_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// Settings the streamer needs beyond the outcome itself.
pub(crate) struct StreamSettings<'a> {
    pub(crate) head: bool,
    pub(crate) chunk_size: usize,
    pub(crate) set_headers: Option<&'a SetHeaders>,
}

pub(crate) fn build_response<IO: AsyncRead + Send + 'static>(
    outcome: ResponseOutcome<IO>,
    settings: &StreamSettings<'_>,
) -> Response<ResponseBody> {
    match outcome {
        ResponseOutcome::Content(file) => content_response(*file, settings),

        ResponseOutcome::NotModified { headers } => {
            let mut res = response_with_status(StatusCode::NOT_MODIFIED);
            res.headers_mut().extend(headers);
            res
        }

        ResponseOutcome::Redirect { location } => {
            let target = escape_html(location.to_str().unwrap_or_default());
            let body = html_document(
                "Redirecting",
                &format!("Redirecting to <a href=\"{target}\">{target}</a>"),
            );

            let mut res = html_response(StatusCode::SEE_OTHER, body, settings.head);
            res.headers_mut().insert(header::LOCATION, location);
            res
        }

        ResponseOutcome::PreconditionFailed => {
            error_document(StatusCode::PRECONDITION_FAILED, settings.head)
        }

        ResponseOutcome::Error(ServeError::MethodNotAllowed) => {
            let mut res = response_with_status(StatusCode::METHOD_NOT_ALLOWED);
            res.headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            res.headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
            res
        }

        ResponseOutcome::Error(err) => {
            let mut res = error_document(err.status(), settings.head);
            if let ServeError::RangeNotSatisfiable { size } = err {
                insert_str(res.headers_mut(), header::CONTENT_RANGE, &format!("bytes */{size}"));
            }
            res
        }

        ResponseOutcome::Fallthrough => not_found(),
    }
}

fn content_response<IO: AsyncRead + Send + 'static>(
    file: FileOpened<IO>,
    settings: &StreamSettings<'_>,
) -> Response<ResponseBody> {
    let status = file.status();
    let content_length = file.content_length();

    let body = match file.extent {
        FileRequestExtent::Full(reader) if !settings.head => ResponseBody::new(
            AsyncReadBody::new(reader, settings.chunk_size, content_length).boxed_unsync(),
        ),
        _ => empty_body(),
    };

    let mut res = Response::new(body);
    *res.status_mut() = status;

    let headers = res.headers_mut();
    headers.extend(file.headers);
    headers.insert(header::CONTENT_TYPE, file.mime_header_value);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    if let Some(range) = file.range {
        insert_str(
            headers,
            header::CONTENT_RANGE,
            &format!("bytes {}-{}/{}", range.start, range.end, file.entry.len),
        );
    }

    if let Some(set_headers) = settings.set_headers {
        set_headers(headers, &file.entry);
    }

    res
}

fn error_document(status: StatusCode, head: bool) -> Response<ResponseBody> {
    let message = escape_html(status.canonical_reason().unwrap_or("Error"));
    html_response(status, html_document("Error", &message), head)
}

fn html_response(status: StatusCode, document: String, head: bool) -> Response<ResponseBody> {
    let len = document.len() as u64;
    let body = if head {
        empty_body()
    } else {
        body_from_bytes(Bytes::from(document))
    };

    let mut res = Response::new(body);
    *res.status_mut() = status;

    let headers = res.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(HTML_CONTENT_TYPE),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));

    res
}

fn html_document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n<pre>{body}</pre>\n</body>\n</html>\n"
    )
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn insert_str(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

pub(crate) fn response_with_status(status: StatusCode) -> Response<ResponseBody> {
    let mut res = Response::new(empty_body());
    *res.status_mut() = status;
    res
}

pub(crate) fn not_found() -> Response<ResponseBody> {
    response_with_status(StatusCode::NOT_FOUND)
}

fn empty_body() -> ResponseBody {
    let body = Empty::new().map_err(|err| match err {}).boxed_unsync();
    ResponseBody::new(body)
}

fn body_from_bytes(bytes: Bytes) -> ResponseBody {
    let body = Full::from(bytes).map_err(|err| match err {}).boxed_unsync();
    ResponseBody::new(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("/a?b=<script>&c=\"'"),
            "/a?b=&lt;script&gt;&amp;c=&quot;&#39;"
        );
    }

    #[test]
    fn error_documents_are_html() {
        let res = error_document(StatusCode::NOT_FOUND, false);
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers()[header::CONTENT_TYPE], HTML_CONTENT_TYPE);
        assert_eq!(res.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

        let expected = html_document("Error", "Not Found").len().to_string();
        assert_eq!(res.headers()[header::CONTENT_LENGTH], expected.as_str());
    }
}
