use crate::errors::{Result, StreamError};
use crate::range;
use crate::server::config::ServerConfig;
use crate::server::files::{DataRoot, Lookup};
use crate::types::{ByteRange, DatasetMetadata};
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use log::{error, info, warn};
use percent_encoding::percent_decode_str;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

pub type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// What a validated `/data/<file>` request turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServePlan {
    InvalidName(String),
    NotFound(String),
    Full { path: PathBuf, size: u64 },
    Partial { path: PathBuf, range: ByteRange },
    Unsatisfiable { size: u64, reason: String },
}

/// Streams files from the data root, whole or by byte range.
///
/// Each request opens its own file handle; nothing mutable is shared between
/// requests. Bodies are read chunk by chunk as the connection drains.
pub struct RangeFileServer {
    root: DataRoot,
    content_type: HeaderValue,
    read_buffer: usize,
    metadata_file: Option<PathBuf>,
}

impl RangeFileServer {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let root = DataRoot::open(&config.data_root)?;
        let content_type = HeaderValue::from_str(&config.content_type)
            .map_err(|e| StreamError::Config(format!("invalid content type {:?}: {e}", config.content_type)))?;
        Ok(Self {
            root,
            content_type,
            read_buffer: config.read_buffer_bytes.max(1024),
            metadata_file: config.metadata_file.clone(),
        })
    }

    pub fn data_root(&self) -> &Path {
        self.root.path()
    }

    /// Decides how to answer a request for `filename` with an optional `Range` header.
    pub async fn plan(&self, filename: &str, range_header: Option<&str>) -> ServePlan {
        let (path, size) = match self.root.lookup(filename).await {
            Lookup::InvalidName => return ServePlan::InvalidName(filename.to_string()),
            Lookup::Missing => return ServePlan::NotFound(filename.to_string()),
            Lookup::File { path, size } => (path, size),
        };
        match range_header {
            None => ServePlan::Full { path, size },
            Some(value) => match range::resolve_header(value, size) {
                Ok(range) => ServePlan::Partial { path, range },
                Err(e) => ServePlan::Unsatisfiable { size, reason: e.to_string() },
            },
        }
    }

    /// Answers `GET /data/<filename>`.
    pub async fn serve(&self, filename: &str, range_header: Option<&str>) -> Response<ResponseBody> {
        let plan = self.plan(filename, range_header).await;
        self.respond(plan, true).await
    }

    /// Same status and headers as [`serve`](Self::serve) without a body.
    pub async fn serve_head(&self, filename: &str, range_header: Option<&str>) -> Response<ResponseBody> {
        let plan = self.plan(filename, range_header).await;
        self.respond(plan, false).await
    }

    async fn respond(&self, plan: ServePlan, with_body: bool) -> Response<ResponseBody> {
        match plan {
            ServePlan::InvalidName(name) => text(StatusCode::BAD_REQUEST, format!("Invalid file name: {name}")),
            ServePlan::NotFound(name) => text(StatusCode::NOT_FOUND, format!("File not found: {name}")),
            ServePlan::Unsatisfiable { size, reason } => {
                let mut response = text(StatusCode::RANGE_NOT_SATISFIABLE, reason);
                response.headers_mut().insert(header::CONTENT_RANGE, header_text(&format!("bytes */{size}")));
                response
            }
            ServePlan::Full { path, size } => {
                let body = match self.body(&path, 0, size, with_body).await {
                    Ok(body) => body,
                    Err(response) => return response,
                };
                let mut response = Response::new(body);
                self.content_headers(&mut response, size);
                response
            }
            ServePlan::Partial { path, range } => {
                let body = match self.body(&path, range.start, range.len(), with_body).await {
                    Ok(body) => body,
                    Err(response) => return response,
                };
                let mut response = Response::new(body);
                *response.status_mut() = StatusCode::PARTIAL_CONTENT;
                self.content_headers(&mut response, range.len());
                response.headers_mut().insert(header::CONTENT_RANGE, header_text(&range.content_range()));
                response
            }
        }
    }

    fn content_headers(&self, response: &mut Response<ResponseBody>, len: u64) {
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, self.content_type.clone());
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    }

    async fn body(
        &self,
        path: &Path,
        start: u64,
        len: u64,
        with_body: bool,
    ) -> std::result::Result<ResponseBody, Response<ResponseBody>> {
        if !with_body {
            return Ok(empty());
        }
        match open_span(path, start, len, self.read_buffer).await {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(text(StatusCode::NOT_FOUND, format!("File not found: {}", display_name(path))))
            }
            Err(e) => {
                error!("failed to open {}: {e}", path.display());
                Err(text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file".to_string()))
            }
        }
    }

    /// Answers `GET /api/metadata` from the configured JSON file.
    pub async fn metadata(&self) -> Response<ResponseBody> {
        let Some(file) = &self.metadata_file else {
            return text(StatusCode::NOT_FOUND, "Metadata not configured".to_string());
        };
        let parsed = match tokio::fs::read(file).await {
            Ok(raw) => serde_json::from_slice::<DatasetMetadata>(&raw).and_then(|m| serde_json::to_vec(&m)),
            Err(e) => {
                warn!("metadata file {} unreadable: {e}", file.display());
                return text(StatusCode::NOT_FOUND, "Metadata not available".to_string());
            }
        };
        match parsed {
            Ok(json) => {
                let mut response = Response::new(full(json));
                response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            Err(e) => {
                error!("metadata file {} is invalid: {e}", file.display());
                text(StatusCode::INTERNAL_SERVER_ERROR, "Invalid metadata".to_string())
            }
        }
    }

    /// Routes one HTTP request and writes an access log line for it.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        // A header that is not visible ASCII cannot be a valid range.
        let range_header = req
            .headers()
            .get(header::RANGE)
            .map(|v| v.to_str().unwrap_or("invalid").to_string());

        let response = if let Some(raw) = path.strip_prefix("/data/") {
            // Decoded names still go through the single-component check.
            match (method.clone(), percent_decode_str(raw).decode_utf8()) {
                (Method::GET, Ok(name)) => self.serve(&name, range_header.as_deref()).await,
                (Method::HEAD, Ok(name)) => self.serve_head(&name, range_header.as_deref()).await,
                (Method::GET | Method::HEAD, Err(_)) => {
                    text(StatusCode::BAD_REQUEST, format!("Invalid file name encoding: {raw}"))
                }
                _ => not_allowed("GET, HEAD"),
            }
        } else if path == "/api/metadata" {
            match method {
                Method::GET => self.metadata().await,
                _ => not_allowed("GET"),
            }
        } else {
            text(StatusCode::NOT_FOUND, "Not found".to_string())
        };

        let length = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        info!(
            target: crate::logger::ACCESS_TARGET,
            "{} {} range={} -> {} len={}",
            method,
            path,
            range_header.as_deref().unwrap_or("-"),
            response.status().as_u16(),
            length
        );
        response
    }
}

async fn open_span(path: &Path, start: u64, len: u64, buffer: usize) -> std::io::Result<ResponseBody> {
    let mut file = tokio::fs::File::open(path).await?;
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    let stream = ReaderStream::with_capacity(file.take(len), buffer).map_ok(Frame::data);
    Ok(StreamBody::new(stream).boxed_unsync())
}

fn display_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn header_text(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
}

fn full(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed_unsync()
}

fn empty() -> ResponseBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

fn text(status: StatusCode, message: String) -> Response<ResponseBody> {
    let len = message.len() as u64;
    let mut response = Response::new(full(message));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    response
}

fn not_allowed(allow: &'static str) -> Response<ResponseBody> {
    let mut response = text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string());
    response.headers_mut().insert(header::ALLOW, HeaderValue::from_static(allow));
    response
}
