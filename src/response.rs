//! HTTP response building helpers
//!
//! Every JSON body is an envelope: `Data` always present (an empty array
//! rather than `null`), `Error` only when something went wrong, mapping a
//! field name to a message.

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_util::io::ReaderStream;

use crate::blob_ref::{BlobReader, Ref, SizedInfoRef};
use crate::error::StorageError;

/// Body of every response: buffered JSON or a streamed blob.
pub type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Buffered body.
pub fn full(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// JSON envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    #[serde(rename = "Data")]
    pub data: T,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<BTreeMap<String, String>>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self { data, error: None }
    }

    pub fn with_error(data: T, field: &str, message: impl Into<String>) -> Self {
        let mut error = BTreeMap::new();
        error.insert(field.to_string(), message.into());
        Self {
            data,
            error: Some(error),
        }
    }
}

/// A blob as reported by upload and stat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefInfo {
    #[serde(rename = "Ref")]
    pub blob_ref: Ref,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "MD5", skip_serializing_if = "String::is_empty")]
    pub md5: String,
}

impl From<SizedInfoRef> for RefInfo {
    fn from(info: SizedInfoRef) -> Self {
        Self {
            blob_ref: info.sized.blob_ref,
            size: info.sized.size,
            md5: info.md5,
        }
    }
}

/// A request the handler refuses, with the status and envelope field to
/// report it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub field: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            field,
            message: message.into(),
        }
    }

    /// Batch larger than the per-request maximum.
    pub fn rate_limit(max: usize) -> Self {
        Self::bad_request("blob", format!("Max per request is {}", max))
    }

    pub fn from_storage(field: &'static str, error: &StorageError) -> Self {
        Self {
            status: status_for(error),
            field,
            message: error.to_string(),
        }
    }
}

/// HTTP status for a storage failure.
pub fn status_for(error: &StorageError) -> StatusCode {
    match error {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        StorageError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<ResponseBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut resp = Response::new(full(json));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    resp
}

/// 200 with `{Data: data}`
pub fn ok<T: Serialize>(data: T) -> Response<ResponseBody> {
    json_response(StatusCode::OK, &Envelope::data(data))
}

/// 201 with `{Data: data}`
pub fn created<T: Serialize>(data: T) -> Response<ResponseBody> {
    json_response(StatusCode::CREATED, &Envelope::data(data))
}

/// Error envelope carrying whatever data was produced before the failure.
pub fn error_with_data<T: Serialize>(error: &ApiError, data: T) -> Response<ResponseBody> {
    json_response(
        error.status,
        &Envelope::with_error(data, error.field, error.message.clone()),
    )
}

/// Error envelope with empty `Data`.
pub fn error_response(error: &ApiError) -> Response<ResponseBody> {
    error_with_data(error, Vec::<RefInfo>::new())
}

pub fn not_found(message: &str) -> Response<ResponseBody> {
    error_response(&ApiError {
        status: StatusCode::NOT_FOUND,
        field: "path",
        message: message.to_string(),
    })
}

pub fn not_implemented() -> Response<ResponseBody> {
    json_response(
        StatusCode::NOT_IMPLEMENTED,
        &Envelope::with_error(None::<()>, "storage", "501 Not Implemented"),
    )
}

/// Stream blob bytes from `reader`. `Content-Length` is only set when the
/// size is known.
pub fn stream_response(
    content_type: &str,
    size: Option<u64>,
    etag: Option<&str>,
    reader: BlobReader,
) -> Response<ResponseBody> {
    let frames = ReaderStream::new(reader).map_ok(Frame::data);
    let mut resp = Response::new(StreamBody::new(frames).boxed_unsync());
    let headers = resp.headers_mut();
    if let Ok(value) = header::HeaderValue::from_str(content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(size) = size {
        headers.insert(header::CONTENT_LENGTH, header::HeaderValue::from(size));
    }
    if let Some(etag) = etag.filter(|e| !e.is_empty()) {
        if let Ok(value) = header::HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }
    resp
}
