//! OpenStack Swift client
//!
//! Speaks the v1 object API over reqwest. Authentication uses the legacy
//! v1 scheme: `GET auth_url` with `X-Auth-User` / `X-Auth-Key`, answered
//! with `X-Storage-Url` and `X-Auth-Token`. An expired token is refreshed
//! and idempotent calls are retried once; uploads are not, since their body
//! has been consumed.

use crate::blob_ref::BlobReader;
use crate::config::SwiftConfig;
use crate::error::ObjectApiError;
use crate::object_api::{ObjectApi, ObjectBody, ObjectInfo, ObjectStream};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, ETAG};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, info, warn};
use url::Url;

const AUTH_USER: &str = "X-Auth-User";
const AUTH_KEY: &str = "X-Auth-Key";
const AUTH_TOKEN: &str = "X-Auth-Token";
const STORAGE_URL: &str = "X-Storage-Url";
const CONTAINER_READ: &str = "X-Container-Read";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What a 404 means for the call that got it.
#[derive(Debug, Clone, Copy)]
enum Missing {
    Container,
    Object,
}

#[derive(Debug, Clone)]
struct Session {
    storage_url: Url,
    token: String,
}

/// Authenticated Swift account.
pub struct SwiftClient {
    http: reqwest::Client,
    config: SwiftConfig,
    session: RwLock<Session>,
}

impl SwiftClient {
    /// Authenticate against `config.auth_url` and return a ready client.
    pub async fn authenticate(config: &SwiftConfig) -> Result<Self, ObjectApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        let session = login(&http, config).await?;
        info!(storage_url = %session.storage_url, user = %config.api_user, "Authenticated with Swift");

        Ok(Self {
            http,
            config: config.clone(),
            session: RwLock::new(session),
        })
    }

    async fn reauthenticate(&self) -> Result<(), ObjectApiError> {
        let session = login(&self.http, &self.config).await?;
        *self.session.write().await = session;
        info!("Refreshed Swift token");
        Ok(())
    }

    async fn request(&self, method: Method, path: &[&str]) -> Result<RequestBuilder, ObjectApiError> {
        let session = self.session.read().await;
        let url = resource_url(&session.storage_url, path)?;
        Ok(self
            .http
            .request(method, url)
            .header(AUTH_TOKEN, session.token.as_str()))
    }

    /// Send a request without a body, refreshing the token once on 401.
    async fn send_idempotent<F>(&self, method: Method, path: &[&str], decorate: F) -> Result<Response, ObjectApiError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let resp = decorate(self.request(method.clone(), path).await?).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        warn!(path = ?path, "Swift token rejected, re-authenticating");
        self.reauthenticate().await?;
        Ok(decorate(self.request(method, path).await?).send().await?)
    }
}

async fn login(http: &reqwest::Client, config: &SwiftConfig) -> Result<Session, ObjectApiError> {
    let resp = http
        .get(&config.auth_url)
        .header(AUTH_USER, &config.api_user)
        .header(AUTH_KEY, &config.api_key)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(status_error(resp.status(), Missing::Container));
    }

    let headers = resp.headers();
    let storage_url = header_str(headers, STORAGE_URL)
        .ok_or_else(|| ObjectApiError::Transport(format!("auth response missing {}", STORAGE_URL)))?;
    let token = header_str(headers, AUTH_TOKEN)
        .ok_or_else(|| ObjectApiError::Transport(format!("auth response missing {}", AUTH_TOKEN)))?;

    Ok(Session {
        storage_url: Url::parse(storage_url)
            .map_err(|e| ObjectApiError::Transport(format!("bad storage url {}: {}", storage_url, e)))?,
        token: token.to_string(),
    })
}

/// Append percent-encoded path segments to the account URL.
/// `base` with each of `path` appended as one percent-encoded segment.
/// Dot segments are refused since URL normalization would drop them.
fn resource_url(base: &Url, path: &[&str]) -> Result<Url, ObjectApiError> {
    if let Some(part) = path.iter().find(|p| **p == "." || **p == "..") {
        return Err(ObjectApiError::Transport(format!("invalid path segment: {}", part)));
    }
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| ObjectApiError::Transport(format!("storage url cannot be a base: {}", base)))?;
        segments.pop_if_empty();
        for part in path {
            segments.push(part);
        }
    }
    Ok(url)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn status_error(status: StatusCode, missing: Missing) -> ObjectApiError {
    match status {
        StatusCode::NOT_FOUND => match missing {
            Missing::Container => ObjectApiError::ContainerNotFound,
            Missing::Object => ObjectApiError::ObjectNotFound,
        },
        StatusCode::UNPROCESSABLE_ENTITY => ObjectApiError::ChecksumMismatch,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ObjectApiError::Unauthorized,
        other => ObjectApiError::Status {
            status: other.as_u16(),
            message: other.canonical_reason().unwrap_or("unknown").to_string(),
        },
    }
}

fn check(resp: Response, missing: Missing) -> Result<Response, ObjectApiError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(status_error(resp.status(), missing))
    }
}

fn object_info(headers: &HeaderMap) -> ObjectInfo {
    let size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let etag = headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_string())
        .unwrap_or_default();
    ObjectInfo { size, etag }
}

#[async_trait]
impl ObjectApi for SwiftClient {
    async fn create_container(&self, container: &str, read_acl: &str) -> Result<(), ObjectApiError> {
        let resp = self
            .send_idempotent(Method::PUT, &[container], |req| req.header(CONTAINER_READ, read_acl))
            .await?;
        check(resp, Missing::Container)?;
        debug!(container = %container, "Container PUT");
        Ok(())
    }

    async fn container_read_acl(&self, container: &str) -> Result<Option<String>, ObjectApiError> {
        let resp = self.send_idempotent(Method::HEAD, &[container], |req| req).await?;
        let resp = check(resp, Missing::Container)?;
        Ok(header_str(resp.headers(), CONTAINER_READ).map(str::to_string))
    }

    async fn put_object(
        &self,
        container: &str,
        name: &str,
        body: ObjectBody,
        etag: Option<&str>,
    ) -> Result<ObjectInfo, ObjectApiError> {
        let mut req = self
            .request(Method::PUT, &[container, name])
            .await?
            .header(CONTENT_LENGTH, body.len)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(body.reader)));
        if let Some(etag) = etag {
            req = req.header(ETAG, etag);
        }

        let resp = req.send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            // the next call picks up the new token
            self.reauthenticate().await?;
            return Err(ObjectApiError::Unauthorized);
        }
        // Swift answers 404 on PUT only when the container is missing
        let resp = check(resp, Missing::Container)?;

        let mut info = object_info(resp.headers());
        info.size = body.len;
        Ok(info)
    }

    async fn get_object(&self, container: &str, name: &str) -> Result<ObjectStream, ObjectApiError> {
        let resp = self.send_idempotent(Method::GET, &[container, name], |req| req).await?;
        let resp = check(resp, Missing::Object)?;
        let ObjectInfo { size, etag } = object_info(resp.headers());

        let stream = resp
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let reader: BlobReader = Box::new(StreamReader::new(Box::pin(stream)));

        Ok(ObjectStream { reader, size, etag })
    }

    async fn head_object(&self, container: &str, name: &str) -> Result<ObjectInfo, ObjectApiError> {
        let resp = self.send_idempotent(Method::HEAD, &[container, name], |req| req).await?;
        let resp = check(resp, Missing::Object)?;
        Ok(object_info(resp.headers()))
    }

    async fn delete_object(&self, container: &str, name: &str) -> Result<(), ObjectApiError> {
        let resp = self.send_idempotent(Method::DELETE, &[container, name], |req| req).await?;
        check(resp, Missing::Object)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("swift({})", self.config.auth_url)
    }
}
