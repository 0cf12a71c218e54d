//! Error types of the viewer service.
//!
//! Every failure is detected at exactly one guard stage
//! and classified into one [`ErrorKind`],
//! which is what the HTTP layer turns into a status code.
use dicom_core::Tag;
use snafu::Snafu;

use crate::frames::FrameError;
use crate::store::StorageKey;

/// The broad category of an [`Error`].
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// Malformed or missing request input.
    /// Storage and parser are never touched.
    ClientInput,
    /// The request is well formed,
    /// but the thing it refers to does not exist.
    NotFound(NotFoundKind),
    /// Failure to write to or read from the blob store.
    StorageIo,
    /// The dataset parser, frame decoder or image encoder
    /// rejected the stored bytes.
    Decode,
    /// A worker task failed to complete,
    /// or the request body could not be received.
    Internal,
}

/// What exactly could not be found.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum NotFoundKind {
    /// No blob is stored under the key.
    Blob,
    /// The dataset has no element with the requested tag.
    Tag,
    /// The dataset has no pixel data element.
    PixelData,
    /// The pixel data decoded into zero frames.
    Frames,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Malformed multipart request"))]
    Multipart {
        source: axum::extract::multipart::MultipartError,
    },
    #[snafu(display("Request must include form field `{}`", field))]
    MissingField { field: &'static str },
    #[snafu(display("Form field `{}` must carry a file name", field))]
    MissingFileName { field: &'static str },
    #[snafu(display("Invalid file name `{}`", name))]
    InvalidFileName { name: String },
    #[snafu(display("Missing `{}` query parameter", name))]
    MissingParameter { name: &'static str },
    #[snafu(display("Invalid storage key `{}`", key))]
    InvalidKey { key: String },
    #[snafu(display("Tag must be 8 hex characters (e.g. 00100010), got `{}`", tag))]
    TagLength { tag: String },
    #[snafu(display("Invalid hex in tag `{}`", tag))]
    TagHex { tag: String },

    #[snafu(display("No file stored as `{}`", key))]
    BlobNotFound { key: StorageKey },
    #[snafu(display("Tag {} not found", tag))]
    TagNotFound { tag: Tag },
    #[snafu(display("No PixelData found"))]
    NoPixelData,
    #[snafu(display("No image frames present"))]
    NoFrames,

    #[snafu(display("Could not write file `{}`", key))]
    WriteBlob {
        key: StorageKey,
        source: std::io::Error,
    },
    #[snafu(display("Could not read file `{}`", key))]
    ReadBlob {
        key: StorageKey,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse DICOM file `{}`", key))]
    ParseDataset {
        key: StorageKey,
        source: dicom_object::ReadError,
    },
    #[snafu(display("Failed to decode pixel data"))]
    DecodeFrames { source: FrameError },
    #[snafu(display("Failed to get image"))]
    ConvertFrame { source: FrameError },
    #[snafu(display("Error encoding PNG"))]
    EncodePng { source: image::ImageError },

    #[snafu(display("Worker task failed"))]
    Worker { source: tokio::task::JoinError },
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            // failures to receive the request body
            Error::Multipart { source } if source.status().is_server_error() => {
                ErrorKind::Internal
            }
            Error::Multipart { .. }
            | Error::MissingField { .. }
            | Error::MissingFileName { .. }
            | Error::InvalidFileName { .. }
            | Error::MissingParameter { .. }
            | Error::InvalidKey { .. }
            | Error::TagLength { .. }
            | Error::TagHex { .. } => ErrorKind::ClientInput,
            Error::BlobNotFound { .. } => ErrorKind::NotFound(NotFoundKind::Blob),
            Error::TagNotFound { .. } => ErrorKind::NotFound(NotFoundKind::Tag),
            Error::NoPixelData => ErrorKind::NotFound(NotFoundKind::PixelData),
            Error::NoFrames => ErrorKind::NotFound(NotFoundKind::Frames),
            Error::WriteBlob { .. } | Error::ReadBlob { .. } => ErrorKind::StorageIo,
            Error::ParseDataset { .. }
            | Error::DecodeFrames { .. }
            | Error::ConvertFrame { .. }
            | Error::EncodePng { .. } => ErrorKind::Decode,
            Error::Worker { .. } => ErrorKind::Internal,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
