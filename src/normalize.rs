use crate::{Body, Headers, RawResponse, Response, STATUS_MESSAGE_NOT_SET};

/// Converts a raw transport result into a canonical [`Response`].
///
/// Never fails. Missing status fields fall back to `0` and `"Not set"`, and a
/// body that does not parse as JSON is kept verbatim as [`Body::Text`].
pub fn normalize(raw: RawResponse) -> Response {
    let status_message = raw
        .status_message
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| STATUS_MESSAGE_NOT_SET.to_owned());

    Response {
        status_code: raw.status_code.unwrap_or(0),
        status_message,
        headers: raw.headers.into_iter().collect::<Headers>(),
        body: decode_body(raw.body),
    }
}

fn decode_body(body: Option<String>) -> Body {
    let text = match body {
        Some(text) if !text.is_empty() => text,
        _ => return Body::Empty,
    };

    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => Body::Json(value),
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("could not parse response body as JSON: {}; keeping raw text", _err);
            Body::Text(text)
        }
    }
}
