//! Turning stored bytes into a queryable DICOM object.
use dicom_object::file::ReadPreamble;
use dicom_object::{DefaultDicomObject, OpenFileOptions, ReadError};

/// The DICOM file magic code, following the 128-byte preamble.
const MAGIC: &[u8; 4] = b"DICM";

/// A capability to parse the full content of a DICOM file.
pub trait DatasetParser: Send + Sync {
    /// Parse all bytes of a file into a DICOM object,
    /// file meta group included.
    fn parse(&self, bytes: &[u8]) -> Result<DefaultDicomObject, ReadError>;
}

/// Parses DICOM files with the standard data dictionary
/// and the built-in transfer syntax registry.
///
/// Files with the 128-byte preamble are expected,
/// but content starting directly at the `DICM` magic code
/// is accepted as well.
#[derive(Debug, Default, Copy, Clone)]
pub struct DicomFileParser;

impl DatasetParser for DicomFileParser {
    fn parse(&self, bytes: &[u8]) -> Result<DefaultDicomObject, ReadError> {
        let preamble = if bytes.starts_with(MAGIC) {
            ReadPreamble::Never
        } else {
            ReadPreamble::Always
        };
        OpenFileOptions::new()
            .read_preamble(preamble)
            .from_reader(bytes)
    }
}
