//! HTTP API for blob storage
//!
//! All routes live under the configured prefix (default `/v1/api/blobserver`):
//!
//! ## Blob API
//! - `POST /blob/upload/` - Multipart upload, one blob per part
//! - `GET|HEAD /blob/stat/{ref}/` - Stat one blob
//! - `GET /blob/stat/?blob=..&blob=..` - Stat up to 1000 blobs
//! - `DELETE /blob/remove/{ref}/` - Remove one blob
//! - `POST /blob/remove/` - Remove up to 1000 blobs (form fields `blob1..blobN`)
//! - `GET /blob/fetch/{ref}/` - Blob bytes
//!
//! ## Service
//! - `GET /config/` - Backend public URL and name
//! - `GET /health` - Liveness
//!
//! ## Example Usage
//!
//! ```bash
//! # Upload two files, keeping their names
//! curl -F "a=@photo.jpg" -F "b=@notes.txt" \
//!      "http://localhost:6064/v1/api/blobserver/blob/upload/?use-filename=1"
//!
//! # Stat them
//! curl "http://localhost:6064/v1/api/blobserver/blob/stat/?blob=photo.jpg&blob=notes.txt"
//!
//! # Remove in batch
//! curl -d "blob1=photo.jpg&blob2=notes.txt" \
//!      http://localhost:6064/v1/api/blobserver/blob/remove/
//! ```

use crate::blob_ref::{BlobReader, Ref};
use crate::error::StorageError;
use crate::response::{self, ApiError, RefInfo, ResponseBody};
use crate::storage::BlobStorage;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::{BodyExt, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tracing::{debug, error, info, warn};

/// Most refs a stat or remove request may name
pub const MAX_REFS_PER_REQUEST: usize = 1000;

/// Cap on a url-encoded remove body
const MAX_FORM_BYTES: usize = 1 << 20;

const USE_FILENAME: &str = "use-filename";

/// HTTP server state
pub struct HttpServer {
    storage: Arc<dyn BlobStorage>,
    bind_addr: SocketAddr,
    prefix: String,
    max_blob_size: u64,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(storage: Arc<dyn BlobStorage>, bind_addr: SocketAddr) -> Self {
        Self {
            storage,
            bind_addr,
            prefix: String::new(),
            max_blob_size: crate::config::DEFAULT_MAX_BLOB_SIZE,
        }
    }

    /// Mount every route under `prefix`
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_blob_size(mut self, max_blob_size: u64) -> Self {
        self.max_blob_size = max_blob_size;
        self
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), StorageError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, prefix = %self.prefix, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, hyper::Error>(server.handle(req).await) }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route a request to its handler
    pub async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let full_path = req.uri().path().to_string();

        debug!(method = %method, path = %full_path, "Incoming request");

        if method == Method::GET && full_path == "/health" {
            return self.handle_health();
        }

        let path = match full_path.strip_prefix(self.prefix.as_str()) {
            Some(p) => p,
            None => return response::not_found("Not Found"),
        };

        match (method, path) {
            (Method::POST, "/blob/upload" | "/blob/upload/") => self.handle_upload(req).await,

            (Method::GET, "/blob/stat" | "/blob/stat/") => {
                let values = query_values(&req, "blob");
                match parse_stat_refs(&values) {
                    Ok(refs) => {
                        debug!(unique = refs.len(), submitted = values.len(), "Stat request");
                        self.handle_stat(refs).await
                    }
                    Err(err) => response::error_response(&err),
                }
            }
            (Method::GET | Method::HEAD, p) if p.starts_with("/blob/stat/") => {
                match parse_path_ref(path_ref(p, "/blob/stat/")) {
                    Ok(blob_ref) => self.handle_stat(vec![blob_ref]).await,
                    Err(err) => response::error_response(&err),
                }
            }

            (Method::POST, "/blob/remove" | "/blob/remove/") => self.handle_batch_remove(req).await,
            (Method::DELETE, p) if p.starts_with("/blob/remove/") => {
                let raw = path_ref(p, "/blob/remove/");
                self.handle_remove(raw).await
            }

            (Method::GET, p) if p.starts_with("/blob/fetch/") => {
                let raw = path_ref(p, "/blob/fetch/");
                self.handle_fetch(raw).await
            }

            (Method::GET, "/config" | "/config/") => self.handle_config(),

            _ => response::not_found("Not Found"),
        }
    }

    fn handle_health(&self) -> Response<ResponseBody> {
        let backend = self
            .storage
            .config()
            .map(|c| c.name)
            .unwrap_or_else(|| "unknown".to_string());

        response::json_response(
            StatusCode::OK,
            &json!({
                "status": "ok",
                "backend": backend,
            }),
        )
    }

    /// POST /blob/upload/ - receive each multipart part as a blob
    async fn handle_upload<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let use_filename = query_flag(&req, USE_FILENAME);

        let boundary = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|ct| multer::parse_boundary(ct).ok());
        let boundary = match boundary {
            Some(b) => b,
            None => {
                return response::error_response(&ApiError::bad_request(
                    "upload",
                    "Expected multipart/form-data POST request",
                ))
            }
        };

        let mut multipart = multer::Multipart::new(req.into_body().into_data_stream(), boundary);
        let mut received: Vec<RefInfo> = Vec::new();

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    let err = ApiError::bad_request("upload", format!("Error reading multipart section: {}", e));
                    return upload_failed(&err, received);
                }
            };

            if let Err(err) = check_form_data(field.headers()) {
                return upload_failed(&err, received);
            }

            let original = field
                .file_name()
                .or_else(|| field.name())
                .unwrap_or_default()
                .to_string();
            let blob_ref = match part_ref(&original, use_filename) {
                Ok(r) => r,
                Err(err) => return upload_failed(&err, received),
            };

            // a broken part is the client's fault, keep it apart from storage I/O
            let stream = field.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e));
            let source: BlobReader =
                Box::new(StreamReader::new(Box::pin(stream)).take(self.max_blob_size + 1));

            match self.storage.receive_blob(blob_ref.clone(), source).await {
                Ok(got) => {
                    debug!(blob_ref = %got.blob_ref(), size = got.size(), "Upload part stored");
                    received.push(got.into());
                }
                Err(StorageError::InvalidInput(msg)) => {
                    let err = ApiError::bad_request("upload", format!("Error reading multipart section: {}", msg));
                    return upload_failed(&err, received);
                }
                Err(e) => {
                    error!(blob_ref = %blob_ref, error = %e, "Error receiving blob");
                    let err = ApiError {
                        message: format!("Error receiving blob {}: {}", blob_ref, e),
                        ..ApiError::from_storage("upload", &e)
                    };
                    return upload_failed(&err, received);
                }
            }
        }

        info!(count = received.len(), "Upload complete");
        response::created(received)
    }

    /// Stat already validated refs, reporting those that exist
    async fn handle_stat(&self, refs: Vec<Ref>) -> Response<ResponseBody> {
        let (tx, mut rx) = mpsc::channel(64);
        let storage = Arc::clone(&self.storage);
        let task = tokio::spawn(async move { storage.stat_blobs(&tx, &refs).await });

        let mut found: Vec<RefInfo> = Vec::new();
        while let Some(info) = rx.recv().await {
            found.push(info.into());
        }

        let result = task
            .await
            .map_err(|e| StorageError::Internal(format!("Stat task failed: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(()) => response::ok(found),
            Err(e) => {
                error!(error = %e, "Stat error");
                response::error_response(&ApiError::from_storage("blob", &e))
            }
        }
    }

    /// DELETE /blob/remove/{ref}/
    async fn handle_remove(&self, raw: &str) -> Response<ResponseBody> {
        let blob_ref = match parse_path_ref(raw) {
            Ok(r) => r,
            Err(err) => return response::error_response(&err),
        };
        self.remove(vec![blob_ref]).await
    }

    /// POST /blob/remove/ with `blob1..blobN`, from the form body or query
    async fn handle_batch_remove<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let mut fields: HashMap<String, String> = req
            .uri()
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let body = match Limited::new(req.into_body(), MAX_FORM_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return response::error_response(&ApiError::bad_request(
                    "blob",
                    format!("Failed to read form: {}", e),
                ))
            }
        };
        // body fields win over the query string
        fields.extend(url::form_urlencoded::parse(&body).into_owned());

        match collect_remove_refs(&fields) {
            Ok(refs) => self.remove(refs).await,
            Err(err) => response::error_response(&err),
        }
    }

    async fn remove(&self, refs: Vec<Ref>) -> Response<ResponseBody> {
        match self.storage.remove_blobs(&refs).await {
            Ok(()) => {
                info!(count = refs.len(), "Removed blobs");
                response::ok(refs)
            }
            Err(e) => {
                error!(error = %e, "Server error during remove");
                response::error_with_data(&ApiError::from_storage("blob", &e), Vec::<Ref>::new())
            }
        }
    }

    /// GET /blob/fetch/{ref}/
    async fn handle_fetch(&self, raw: &str) -> Response<ResponseBody> {
        let blob_ref = match parse_path_ref(raw) {
            Ok(r) => r,
            Err(err) => return response::error_response(&err),
        };

        let blob = match self.storage.fetch(&blob_ref).await {
            Ok(blob) => blob,
            Err(e) => {
                if !matches!(e, StorageError::NotFound(_)) {
                    error!(blob_ref = %blob_ref, error = %e, "Fetch failed");
                }
                return response::error_response(&ApiError::from_storage("blob", &e));
            }
        };

        debug!(blob_ref = %blob_ref, size = blob.size, "Serving blob");
        // a zero size may just mean the store sent no length
        let size = Some(blob.size).filter(|s| *s > 0);
        response::stream_response("application/octet-stream", size, Some(&blob.etag), blob.reader)
    }

    /// GET /config/
    fn handle_config(&self) -> Response<ResponseBody> {
        match self.storage.config() {
            Some(config) => response::ok(config),
            None => response::not_implemented(),
        }
    }
}

fn upload_failed(err: &ApiError, received: Vec<RefInfo>) -> Response<ResponseBody> {
    warn!(error = %err.message, received = received.len(), "Upload aborted");
    response::error_with_data(err, received)
}

/// Ref text between the route prefix and the optional trailing slash.
fn path_ref<'a>(path: &'a str, route: &str) -> &'a str {
    let rest = path.strip_prefix(route).unwrap_or("");
    rest.strip_suffix('/').unwrap_or(rest)
}

/// Path refs are limited to `[A-Za-z0-9_/.-]+`.
fn is_path_ref(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '.' | '-'))
}

/// Character check, then [`Ref::parse`], which also refuses dot segments.
fn parse_path_ref(raw: &str) -> Result<Ref, ApiError> {
    if !is_path_ref(raw) {
        return Err(ApiError::bad_request("blob", "Invalid blob ref"));
    }
    Ref::parse(raw).ok_or_else(|| ApiError::bad_request("blob", "Invalid blob ref"))
}

fn query_values<B>(req: &Request<B>, key: &str) -> Vec<String> {
    req.uri()
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
                .collect()
        })
        .unwrap_or_default()
}

fn query_flag<B>(req: &Request<B>, key: &str) -> bool {
    query_values(req, key)
        .first()
        .map(|v| !matches!(v.as_str(), "" | "0" | "false"))
        .unwrap_or(false)
}

/// Deduplicated refs for a stat request. Submitted values past the first
/// empty one are ignored; more than [`MAX_REFS_PER_REQUEST`] is refused.
fn parse_stat_refs(values: &[String]) -> Result<Vec<Ref>, ApiError> {
    let mut unique = HashSet::new();

    for (i, value) in values.iter().enumerate() {
        if value.is_empty() {
            break;
        }
        if i + 1 > MAX_REFS_PER_REQUEST {
            return Err(ApiError::rate_limit(MAX_REFS_PER_REQUEST));
        }
        let blob_ref = Ref::parse(value).ok_or_else(|| ApiError::bad_request("blob", "Bogus blobref for value"))?;
        unique.insert(blob_ref);
    }

    let mut refs: Vec<Ref> = unique.into_iter().collect();
    refs.sort();
    Ok(refs)
}

/// Refs named `blob1..blobN`, stopping at the first missing or empty field.
fn collect_remove_refs(fields: &HashMap<String, String>) -> Result<Vec<Ref>, ApiError> {
    let mut refs = Vec::new();

    for n in 1.. {
        let blob_ref = match fields.get(&format!("blob{}", n)).and_then(|v| Ref::parse(v)) {
            Some(r) => r,
            None => break,
        };
        if n > MAX_REFS_PER_REQUEST {
            return Err(ApiError::rate_limit(MAX_REFS_PER_REQUEST));
        }
        refs.push(blob_ref);
    }

    Ok(refs)
}

/// Reject parts whose Content-Disposition is not `form-data`.
fn check_form_data(headers: &header::HeaderMap) -> Result<(), ApiError> {
    let value = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("upload", "invalid Content-Disposition"))?;

    let disposition = value.split(';').next().unwrap_or("").trim();
    if !disposition.eq_ignore_ascii_case("form-data") {
        return Err(ApiError::bad_request(
            "upload",
            format!("Expected Content-Disposition of \"form-data\"; got {:?}", disposition),
        ));
    }
    Ok(())
}

/// Ref for an upload part: server-assigned unless the client asked to keep
/// its filename.
fn part_ref(original: &str, use_filename: bool) -> Result<Ref, ApiError> {
    if original.is_empty() {
        return Err(ApiError::bad_request("upload", "Part has neither a filename nor a name"));
    }
    if use_filename {
        Ref::from_filename(original)
            .ok_or_else(|| ApiError::bad_request("upload", format!("Invalid filename {:?}", original)))
    } else {
        Ok(Ref::generate(original))
    }
}
