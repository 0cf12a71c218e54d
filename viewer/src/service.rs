//! Intake, tag resolution and frame extraction over a [`BlobStore`].
//!
//! Each read operation runs as a fixed sequence of guard stages:
//!
//! 1. input shape, enforced by the [`StorageKey`] and [`TagAddress`] types;
//! 2. read and parse of the stored file;
//! 3. existence of the requested element;
//! 4. decoding, conversion and encoding of the first frame (images only).
//!
//! The first failing stage ends the operation with its own error,
//! so that "not found" and "could not read" stay distinguishable.
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use dicom_dictionary_std::tags;
use dicom_object::DefaultDicomObject;
use image::{DynamicImage, ImageFormat};
use snafu::{ensure, OptionExt, ResultExt};
use tracing::{debug, info};

use crate::dataset::{DatasetParser, DicomFileParser};
use crate::error::{
    BlobNotFoundSnafu, ConvertFrameSnafu, DecodeFramesSnafu, EncodePngSnafu, NoFramesSnafu,
    NoPixelDataSnafu, ParseDatasetSnafu, ReadBlobSnafu, Result, TagNotFoundSnafu,
    WriteBlobSnafu,
};
use crate::frames::{DicomFrameDecoder, FrameDecoder};
use crate::store::{BlobStore, Clock, StorageKey, SystemClock};
use crate::tag::{find_value, TagAddress, TagValue};

/// The index of the only frame ever extracted.
const FIRST_FRAME: u32 = 0;

/// The viewer service, shared by all request handlers.
pub struct Service {
    store: BlobStore,
    parser: Arc<dyn DatasetParser>,
    decoder: Arc<dyn FrameDecoder>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Service {
    /// Create a service over the given store,
    /// using the standard DICOM parser, frame decoder and system clock.
    pub fn new(store: BlobStore) -> Self {
        Service {
            store,
            parser: Arc::new(DicomFileParser),
            decoder: Arc::new(DicomFrameDecoder),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Replace the dataset parser.
    pub fn with_parser(mut self, parser: impl DatasetParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Replace the frame decoder.
    pub fn with_decoder(mut self, decoder: impl FrameDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Replace the clock used to generate storage keys.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    /// Store an uploaded file,
    /// returning the key under which it can be queried.
    ///
    /// The content is not inspected.
    pub fn intake<R: Read>(&self, original_name: &str, payload: R) -> Result<StorageKey> {
        let key = StorageKey::generate(self.clock.now_nanos(), original_name)?;
        let size = self
            .store
            .put(&key, payload)
            .context(WriteBlobSnafu { key: key.clone() })?;
        info!("Stored {} ({} bytes)", key, size);
        Ok(key)
    }

    /// Look up the element at `address` in the stored file
    /// and render its value as text.
    pub fn resolve_tag(&self, key: &StorageKey, address: &TagAddress) -> Result<TagValue> {
        let obj = self.load(key)?;
        let value = find_value(&obj, address.tag()).context(TagNotFoundSnafu {
            tag: address.tag(),
        })?;
        debug!("{} {} = {:?}", key, address.tag(), value);
        Ok(TagValue {
            address: address.clone(),
            value,
        })
    }

    /// Decode the first frame of the stored file into a PNG image.
    pub fn extract_frame(&self, key: &StorageKey) -> Result<Vec<u8>> {
        let obj = self.load(key)?;
        ensure!(obj.get(tags::PIXEL_DATA).is_some(), NoPixelDataSnafu);

        let frames = self.decoder.decode(&obj).context(DecodeFramesSnafu)?;
        ensure!(frames.frame_count() > 0, NoFramesSnafu);
        debug!("{} has {} frame(s)", key, frames.frame_count());

        let image = frames
            .frame_image(FIRST_FRAME)
            .context(ConvertFrameSnafu)?;
        encode_png(&image)
    }

    /// Read and parse the stored file.
    fn load(&self, key: &StorageKey) -> Result<DefaultDicomObject> {
        let bytes = match self.store.get(key) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return BlobNotFoundSnafu { key: key.clone() }.fail();
            }
            Err(e) => return Err(e).context(ReadBlobSnafu { key: key.clone() }),
        };
        self.parser
            .parse(&bytes)
            .context(ParseDatasetSnafu { key: key.clone() })
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .context(EncodePngSnafu)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    #[test]
    fn encodes_luma_png() {
        let image = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(3, 2, Luma([200_u8])));
        let png = encode_png(&image).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }
}
