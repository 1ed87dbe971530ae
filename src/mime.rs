use std::path::Path;

use http::HeaderValue;
use mime_guess::mime;

/// `Content-Type` for `path`, guessed from its extension.
///
/// Text types get an explicit UTF-8 charset, unknown extensions fall back to
/// `application/octet-stream`.
pub(crate) fn content_type(path: &Path) -> HeaderValue {
    let guess = mime_guess::from_path(path).first_or_octet_stream();

    let value = if guess.type_() == mime::TEXT && guess.get_param(mime::CHARSET).is_none() {
        format!("{guess}; charset=UTF-8")
    } else {
        guess.to_string()
    };

    HeaderValue::from_str(&value)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}
