//! Synthetic DICOM files and test doubles shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dicom_core::value::PixelFragmentSequence;
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::tags;
use dicom_object::mem::InMemElement;
use dicom_object::{DefaultDicomObject, FileMetaTableBuilder, InMemDicomObject, ReadError};
use dicom_viewer::{BlobStore, Clock, DatasetParser, DicomFileParser, Service};
use tempfile::TempDir;

pub const PATIENT_NAME: &str = "Doe^John";

/// Attributes every synthetic object has.
fn base_elements() -> Vec<InMemElement> {
    vec![
        DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            // Secondary Capture Image Storage
            PrimitiveValue::from("1.2.840.10008.5.1.4.1.1.7"),
        ),
        DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("2.25.302768094836264374516386391186476"),
        ),
        DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("OT")),
        DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from(PATIENT_NAME)),
        DataElement::new(
            tags::IMAGE_TYPE,
            VR::CS,
            dicom_core::dicom_value!(Strs, ["DERIVED", "SECONDARY"]),
        ),
    ]
}

/// 8-bit monochrome image attributes, without pixel data.
fn image_attributes(rows: u16, columns: u16, frames: u32) -> Vec<InMemElement> {
    vec![
        DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
        DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ),
        DataElement::new(
            tags::NUMBER_OF_FRAMES,
            VR::IS,
            PrimitiveValue::from(frames.to_string()),
        ),
        DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows)),
        DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(columns)),
        DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(8_u16)),
        DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(8_u16)),
        DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(7_u16)),
        DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
    ]
}

fn to_file_bytes(elements: Vec<InMemElement>) -> Vec<u8> {
    // Explicit VR Little Endian
    to_file_bytes_with_ts("1.2.840.10008.1.2.1", elements)
}

fn to_file_bytes_with_ts(ts: &str, elements: Vec<InMemElement>) -> Vec<u8> {
    let file = InMemDicomObject::from_element_iter(elements)
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(ts)
                .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7"),
        )
        .expect("meta table should be complete");
    let mut out = Vec::new();
    file.write_all(&mut out).expect("should write to memory");
    out
}

/// A DICOM file without any pixel data.
pub fn header_only_file() -> Vec<u8> {
    to_file_bytes(base_elements())
}

/// A DICOM file with a native 8-bit monochrome image
/// of the given dimensions and number of frames.
///
/// Even dimensions keep the pixel data length even.
pub fn image_file(rows: u16, columns: u16, frames: u32) -> Vec<u8> {
    let len = rows as usize * columns as usize * frames as usize;
    let pixels: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let mut elements = base_elements();
    elements.extend(image_attributes(rows, columns, frames));
    elements.push(DataElement::new(
        tags::PIXEL_DATA,
        VR::OB,
        PrimitiveValue::from(pixels),
    ));
    to_file_bytes(elements)
}

/// A DICOM file with image attributes but an empty pixel data element.
pub fn empty_pixel_data_file() -> Vec<u8> {
    let mut elements = base_elements();
    elements.extend(image_attributes(4, 4, 1));
    elements.push(DataElement::new(tags::PIXEL_DATA, VR::OB, PrimitiveValue::Empty));
    to_file_bytes(elements)
}

/// A JPEG Baseline file of 4x4 pixels
/// with encapsulated pixel data made of the given fragments.
pub fn encapsulated_file(fragments: Vec<Vec<u8>>) -> Vec<u8> {
    let mut elements = base_elements();
    elements.extend(image_attributes(4, 4, 1));
    elements.push(DataElement::new(
        tags::PIXEL_DATA,
        VR::OB,
        PixelFragmentSequence::new(Vec::<u32>::new(), fragments),
    ));
    to_file_bytes_with_ts("1.2.840.10008.1.2.4.50", elements)
}

/// A clock advancing by one tick per reading.
#[derive(Debug)]
pub struct StepClock(AtomicU64);

impl StepClock {
    pub fn starting_at(tick: u64) -> Self {
        StepClock(AtomicU64::new(tick))
    }
}

impl Clock for StepClock {
    fn now_nanos(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// A clock frozen at one tick.
#[derive(Debug)]
pub struct FrozenClock(pub u64);

impl Clock for FrozenClock {
    fn now_nanos(&self) -> u64 {
        self.0
    }
}

/// The standard parser, counting how many times it was invoked.
#[derive(Debug, Default, Clone)]
pub struct CountingParser {
    calls: Arc<AtomicUsize>,
}

impl CountingParser {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DatasetParser for CountingParser {
    fn parse(&self, bytes: &[u8]) -> Result<DefaultDicomObject, ReadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DicomFileParser.parse(bytes)
    }
}

/// A service over a fresh temporary store.
/// The directory lives as long as the returned guard.
pub fn temp_service() -> (Service, TempDir) {
    let dir = tempfile::tempdir().expect("should create temporary directory");
    let store = BlobStore::open(dir.path().join("uploads")).expect("should open store");
    (Service::new(store), dir)
}
