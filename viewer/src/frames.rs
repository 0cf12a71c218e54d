//! Decoding pixel data into image frames.
//!
//! The [`FrameDecoder`] trait is the seam between the service
//! and the pixel data codecs;
//! [`DicomFrameDecoder`] implements it with `dicom-pixeldata`.
use dicom_dictionary_std::tags;
use dicom_object::DefaultDicomObject;
use dicom_pixeldata::{DecodedPixelData, PixelDecoder};
use image::DynamicImage;
use snafu::{ensure, ResultExt, Snafu};
use tracing::debug;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum FrameError {
    #[snafu(display("Could not decode pixel data"))]
    DecodePixelData { source: dicom_pixeldata::Error },
    #[snafu(display("Could not convert frame #{} to an image", frame))]
    ConvertFrame {
        frame: u32,
        source: dicom_pixeldata::Error,
    },
    #[snafu(display("Frame #{} is out of range ({} frames)", frame, count))]
    FrameOutOfRange { frame: u32, count: u32 },
    #[snafu(display("Unsupported frame layout: {}", reason))]
    UnsupportedLayout { reason: String },
}

/// An ordered sequence of decoded frames.
pub trait FrameSequence {
    /// The number of frames in the sequence, possibly zero.
    fn frame_count(&self) -> u32;

    /// Convert the frame at `index` into a raster image.
    fn frame_image(&self, index: u32) -> Result<DynamicImage, FrameError>;
}

/// A capability to decode the pixel data of a DICOM object into frames.
pub trait FrameDecoder: Send + Sync {
    /// Decode the pixel data of the given object.
    ///
    /// The object is expected to contain a pixel data element.
    fn decode<'a>(
        &self,
        obj: &'a DefaultDicomObject,
    ) -> Result<Box<dyn FrameSequence + 'a>, FrameError>;
}

/// A sequence without frames.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoFrames;

impl FrameSequence for NoFrames {
    fn frame_count(&self) -> u32 {
        0
    }

    fn frame_image(&self, index: u32) -> Result<DynamicImage, FrameError> {
        FrameOutOfRangeSnafu {
            frame: index,
            count: 0_u32,
        }
        .fail()
    }
}

impl FrameSequence for DecodedPixelData<'_> {
    fn frame_count(&self) -> u32 {
        self.number_of_frames()
    }

    fn frame_image(&self, index: u32) -> Result<DynamicImage, FrameError> {
        let count = self.number_of_frames();
        ensure!(
            index < count,
            FrameOutOfRangeSnafu {
                frame: index,
                count
            }
        );
        self.to_dynamic_image(index)
            .context(ConvertFrameSnafu { frame: index })
    }
}

/// Decodes native and encapsulated pixel data
/// through the transfer syntaxes known to `dicom-pixeldata`.
///
/// Objects declaring zero frames or holding an empty pixel data value
/// yield an empty sequence without invoking the codecs.
#[derive(Debug, Default, Copy, Clone)]
pub struct DicomFrameDecoder;

impl FrameDecoder for DicomFrameDecoder {
    fn decode<'a>(
        &self,
        obj: &'a DefaultDicomObject,
    ) -> Result<Box<dyn FrameSequence + 'a>, FrameError> {
        if declares_no_frames(obj) || has_empty_pixel_data(obj) {
            debug!("Pixel data holds no frames");
            return Ok(Box::new(NoFrames));
        }
        ensure_supported_layout(obj)?;

        let decoded = obj.decode_pixel_data().context(DecodePixelDataSnafu)?;
        debug!(
            "{}x{}x{} image, {}-bit, {} frame(s)",
            decoded.columns(),
            decoded.rows(),
            decoded.samples_per_pixel(),
            decoded.bits_stored(),
            decoded.number_of_frames()
        );
        Ok(Box::new(decoded))
    }
}

fn declares_no_frames(obj: &DefaultDicomObject) -> bool {
    obj.get(tags::NUMBER_OF_FRAMES)
        .and_then(|e| e.to_int::<i32>().ok())
        .map_or(false, |n| n == 0)
}

/// Only monochrome and three-sample color images can become frames.
/// Objects without Samples per Pixel are left for the codecs to reject.
fn ensure_supported_layout(obj: &DefaultDicomObject) -> Result<(), FrameError> {
    let Some(samples) = obj
        .get(tags::SAMPLES_PER_PIXEL)
        .and_then(|e| e.to_int::<u16>().ok())
    else {
        return Ok(());
    };
    ensure!(
        samples == 1 || samples == 3,
        UnsupportedLayoutSnafu {
            reason: format!("{} samples per pixel", samples),
        }
    );
    Ok(())
}

fn has_empty_pixel_data(obj: &DefaultDicomObject) -> bool {
    let Some(pixel_data) = obj.get(tags::PIXEL_DATA) else {
        return false;
    };
    let value = pixel_data.value();
    if let Some(primitive) = value.primitive() {
        primitive.multiplicity() == 0
    } else if let Some(fragments) = value.fragments() {
        fragments.iter().all(|f| f.is_empty())
    } else {
        false
    }
}
