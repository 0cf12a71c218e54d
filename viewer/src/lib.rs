//! A small HTTP service for uploading DICOM files
//! and viewing their attributes and images.
//!
//! Uploaded files are kept as they are in a [`BlobStore`],
//! named by a [`StorageKey`] made of the upload time and the original file name.
//! Every query reads and parses the stored file again:
//!
//! - [`Service::resolve_tag`] renders the value of a single attribute;
//! - [`Service::extract_frame`] decodes the first frame of the pixel data
//!   into a PNG image.
//!
//! The [`http`] module exposes these operations over HTTP.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dicom_viewer::{http, BlobStore, Service};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = BlobStore::open("./uploads")?;
//! let app = http::router(Arc::new(Service::new(store)), &http::ServerConfig::default());
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
pub mod dataset;
pub mod error;
pub mod frames;
pub mod http;
pub mod service;
pub mod store;
pub mod tag;

pub use dataset::{DatasetParser, DicomFileParser};
pub use error::{Error, ErrorKind, NotFoundKind, Result};
pub use frames::{DicomFrameDecoder, FrameDecoder, FrameError, FrameSequence};
pub use service::Service;
pub use store::{BlobStore, Clock, StorageKey, SystemClock};
pub use tag::{TagAddress, TagValue};
