//! HTTP surface of the viewer.
//!
//! | Route          | Operation                                 |
//! |----------------|-------------------------------------------|
//! | `POST /upload` | store the file in multipart field `dicom` |
//! | `GET /header`  | render the value at `tag` in `file`       |
//! | `GET /image`   | first frame of `file` as PNG              |
use std::io::{self, Read};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, Report, ResultExt};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::{
    Error, ErrorKind, MissingFieldSnafu, MissingFileNameSnafu, MissingParameterSnafu,
    MultipartSnafu, Result, WorkerSnafu,
};
use crate::service::Service;
use crate::store::StorageKey;
use crate::tag::TagAddress;

/// The multipart form field holding the uploaded file.
pub const UPLOAD_FIELD: &str = "dicom";

/// Number of upload chunks buffered ahead of the blob writer.
const UPLOAD_QUEUE_DEPTH: usize = 8;

/// Options of the HTTP layer.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum accepted size of an upload request body, in bytes.
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            max_upload_size: 512 * 1024 * 1024,
        }
    }
}

/// Build the router serving all viewer endpoints.
pub fn router(service: Arc<Service>, config: &ServerConfig) -> Router {
    Router::new()
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(config.max_upload_size)),
        )
        .route("/header", get(header_value))
        .route("/image", get(first_frame_image))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    file: StorageKey,
}

#[derive(Debug, Deserialize)]
struct HeaderQuery {
    file: Option<String>,
    tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageQuery {
    file: Option<String>,
}

async fn upload_file(
    State(service): State<Arc<Service>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut field = loop {
        let field = multipart
            .next_field()
            .await
            .context(MultipartSnafu)?
            .context(MissingFieldSnafu {
                field: UPLOAD_FIELD,
            })?;
        if field.name() == Some(UPLOAD_FIELD) {
            break field;
        }
    };
    let file_name = field
        .file_name()
        .map(str::to_string)
        .context(MissingFileNameSnafu {
            field: UPLOAD_FIELD,
        })?;

    // the blob is written by a blocking task as the chunks arrive
    let (chunks, receiver) = mpsc::channel(UPLOAD_QUEUE_DEPTH);
    let writer = tokio::task::spawn_blocking(move || {
        service.intake(&file_name, ChunkReader::new(receiver))
    });

    let mut failure = None;
    loop {
        let (next, last) = match field.chunk().await {
            Ok(Some(chunk)) => (Ok(Some(chunk)), false),
            Ok(None) => (Ok(None), true),
            Err(e) => {
                let next = Err(io::Error::new(io::ErrorKind::Other, e.to_string()));
                failure = Some(e);
                (next, true)
            }
        };
        // a closed queue means the writer has already given up
        if chunks.send(next).await.is_err() || last {
            break;
        }
    }
    drop(chunks);

    let stored = writer.await.context(WorkerSnafu)?;
    if let Some(e) = failure {
        return Err(e).context(MultipartSnafu);
    }
    Ok(Json(UploadResponse { file: stored? }))
}

/// Blocking reader over the chunks of an upload in progress.
///
/// `Ok(None)` marks the end of the upload.
/// A queue closed before that mark fails the read,
/// so an interrupted upload is never stored as complete.
struct ChunkReader {
    chunks: mpsc::Receiver<io::Result<Option<Bytes>>>,
    current: Bytes,
    finished: bool,
}

impl ChunkReader {
    fn new(chunks: mpsc::Receiver<io::Result<Option<Bytes>>>) -> Self {
        ChunkReader {
            chunks,
            current: Bytes::new(),
            finished: false,
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.current.is_empty() {
            if self.finished {
                return Ok(0);
            }
            match self.chunks.blocking_recv() {
                Some(Ok(Some(chunk))) => self.current = chunk,
                Some(Ok(None)) => self.finished = true,
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "upload ended before its last chunk",
                    ))
                }
            }
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current.split_to(n));
        Ok(n)
    }
}

async fn header_value(
    State(service): State<Arc<Service>>,
    Query(query): Query<HeaderQuery>,
) -> Result<String> {
    let file = required(query.file.as_deref(), "file")?;
    let tag = required(query.tag.as_deref(), "tag")?;
    let key = StorageKey::parse(file)?;
    let address = TagAddress::parse(tag)?;

    let value = run_blocking(move || service.resolve_tag(&key, &address)).await?;
    Ok(value.to_string())
}

async fn first_frame_image(
    State(service): State<Arc<Service>>,
    Query(query): Query<ImageQuery>,
) -> Result<impl IntoResponse> {
    let key = StorageKey::parse(required(query.file.as_deref(), "file")?)?;

    let png = run_blocking(move || service.extract_frame(&key)).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// An absent or empty query parameter is missing.
fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .context(MissingParameterSnafu { name })
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.context(WorkerSnafu)?
}

/// The HTTP status code reported for an error.
///
/// Multipart errors keep the status chosen by the extractor
/// (such as 413 for an oversized body),
/// which always falls in the class of their [`ErrorKind`].
pub fn status_of(err: &Error) -> StatusCode {
    match (err, err.kind()) {
        (Error::Multipart { source }, _) => source.status(),
        (_, ErrorKind::ClientInput) => StatusCode::BAD_REQUEST,
        (_, ErrorKind::NotFound(_)) => StatusCode::NOT_FOUND,
        (_, ErrorKind::StorageIo | ErrorKind::Decode | ErrorKind::Internal) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        if status.is_server_error() {
            error!("{}", Report::from_error(&self));
        } else {
            warn!("{}", self);
        }
        (status, self.to_string()).into_response()
    }
}
