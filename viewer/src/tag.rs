//! Tag addressing and text rendering of element values.
use std::fmt;

use dicom_core::value::{PrimitiveValue, Value};
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::{DefaultDicomObject, FileMetaTable};
use snafu::{ensure, OptionExt};

use crate::error::{Result, TagHexSnafu, TagLengthSnafu};

/// Values beyond this count are cut from a rendered value.
const MAX_VALUES: usize = 64;

/// A tag address as received from a client:
/// exactly 8 hexadecimal digits, group then element.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct TagAddress {
    raw: String,
    tag: Tag,
}

impl TagAddress {
    /// Parse a tag address such as `00100010`.
    pub fn parse(raw: &str) -> Result<Self> {
        ensure!(raw.len() == 8, TagLengthSnafu { tag: raw });
        ensure!(
            raw.bytes().all(|b| b.is_ascii_hexdigit()),
            TagHexSnafu { tag: raw }
        );
        let group = parse_half(&raw[..4], raw)?;
        let element = parse_half(&raw[4..], raw)?;
        Ok(TagAddress {
            raw: raw.to_string(),
            tag: Tag(group, element),
        })
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// The address exactly as it was given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn parse_half(half: &str, raw: &str) -> Result<u16> {
    u16::from_str_radix(half, 16)
        .ok()
        .context(TagHexSnafu { tag: raw })
}

impl fmt::Display for TagAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// The rendered value of an element, next to the address it was looked up by.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TagValue {
    pub address: TagAddress,
    pub value: String,
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag {} → {}", self.address, self.value)
    }
}

/// Look up the value at `tag` in a DICOM file object and render it,
/// searching the file meta group for group 0002 tags
/// and the main data set otherwise.
pub fn find_value(obj: &DefaultDicomObject, tag: Tag) -> Option<String> {
    if tag.group() == 0x0002 {
        return meta_value(obj.meta(), tag).map(|v| render_primitive(&v));
    }
    obj.get(tag).map(|e| render_value(e.value()))
}

/// Render an element value in a human readable way.
pub fn render_value<I, P>(value: &Value<I, P>) -> String {
    if let Some(primitive) = value.primitive() {
        render_primitive(primitive)
    } else if let Some(items) = value.items() {
        format!("(Sequence with {} item{})", items.len(), plural(items.len()))
    } else if let Some(fragments) = value.fragments() {
        format!(
            "(PixelSequence with {} fragment{})",
            fragments.len(),
            plural(fragments.len())
        )
    } else {
        String::new()
    }
}

/// Render a primitive value,
/// joining multiple values with a backslash.
///
/// Only the first values up to the limit are ever formatted.
pub fn render_primitive(value: &PrimitiveValue) -> String {
    use PrimitiveValue::*;

    match value {
        Strs(values) => join_values(
            values
                .iter()
                .map(|s| s.trim_end_matches(whitespace_or_null)),
        ),
        Tags(values) => join_values(values),
        U8(values) => join_values(values),
        I16(values) => join_values(values),
        U16(values) => join_values(values),
        I32(values) => join_values(values),
        U32(values) => join_values(values),
        I64(values) => join_values(values),
        U64(values) => join_values(values),
        F32(values) => join_values(values),
        F64(values) => join_values(values),
        _ => join_values(
            value
                .to_multi_str()
                .iter()
                .map(|s| s.trim_end_matches(whitespace_or_null)),
        ),
    }
}

fn join_values<I>(values: I) -> String
where
    I: IntoIterator,
    I::Item: fmt::Display,
{
    let mut out = String::new();
    for (i, value) in values.into_iter().enumerate() {
        if i == MAX_VALUES {
            out.push_str("...");
            break;
        }
        if i > 0 {
            out.push('\\');
        }
        out.push_str(&value.to_string());
    }
    out
}

fn whitespace_or_null(c: char) -> bool {
    c.is_whitespace() || c == '\0'
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn meta_value(meta: &FileMetaTable, tag: Tag) -> Option<PrimitiveValue> {
    let text = |s: &str| Some(PrimitiveValue::from(s));
    match tag {
        tags::FILE_META_INFORMATION_GROUP_LENGTH => {
            Some(PrimitiveValue::from(meta.information_group_length))
        }
        tags::FILE_META_INFORMATION_VERSION => {
            Some(PrimitiveValue::from(meta.information_version.to_vec()))
        }
        tags::MEDIA_STORAGE_SOP_CLASS_UID => text(meta.media_storage_sop_class_uid.as_str()),
        tags::MEDIA_STORAGE_SOP_INSTANCE_UID => text(meta.media_storage_sop_instance_uid.as_str()),
        tags::TRANSFER_SYNTAX_UID => text(meta.transfer_syntax.as_str()),
        tags::IMPLEMENTATION_CLASS_UID => text(meta.implementation_class_uid.as_str()),
        tags::IMPLEMENTATION_VERSION_NAME => {
            meta.implementation_version_name.as_deref().and_then(text)
        }
        tags::SOURCE_APPLICATION_ENTITY_TITLE => {
            meta.source_application_entity_title.as_deref().and_then(text)
        }
        tags::SENDING_APPLICATION_ENTITY_TITLE => {
            meta.sending_application_entity_title.as_deref().and_then(text)
        }
        tags::RECEIVING_APPLICATION_ENTITY_TITLE => {
            meta.receiving_application_entity_title.as_deref().and_then(text)
        }
        tags::PRIVATE_INFORMATION_CREATOR_UID => {
            meta.private_information_creator_uid.as_deref().and_then(text)
        }
        tags::PRIVATE_INFORMATION => meta
            .private_information
            .as_ref()
            .map(|data| PrimitiveValue::from(data.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use dicom_core::value::{DataSetSequence, PixelFragmentSequence};
    use dicom_core::{dicom_value, DataElement, VR};
    use dicom_object::{FileMetaTableBuilder, InMemDicomObject};

    #[test]
    fn parses_tag_address() {
        let address = TagAddress::parse("00100010").unwrap();
        assert_eq!(address.tag(), Tag(0x0010, 0x0010));
        assert_eq!(address.as_str(), "00100010");

        let address = TagAddress::parse("7fE00010").unwrap();
        assert_eq!(address.tag(), tags::PIXEL_DATA);
        // the original spelling is kept
        assert_eq!(address.to_string(), "7fE00010");
    }

    #[test]
    fn rejects_wrong_length() {
        for raw in ["", "12", "0010001", "001000100", "(0010,0010)"] {
            assert!(
                matches!(TagAddress::parse(raw), Err(Error::TagLength { .. })),
                "{:?}",
                raw
            );
        }
    }

    #[test]
    fn rejects_non_hex() {
        for raw in ["GGGGGGGG", "0010001g", "+0100010", " 0100010", "0010 010"] {
            assert!(
                matches!(TagAddress::parse(raw), Err(Error::TagHex { .. })),
                "{:?}",
                raw
            );
        }
    }

    #[test]
    fn multibyte_input_does_not_panic() {
        // 8 bytes, but not on a char boundary at 4
        assert!(TagAddress::parse("001é001").is_err());
        assert!(TagAddress::parse("éééé").is_err());
    }

    #[test]
    fn renders_primitive_values() {
        assert_eq!(render_primitive(&PrimitiveValue::from("Doe^John ")), "Doe^John");
        assert_eq!(render_primitive(&PrimitiveValue::from(512_u16)), "512");
        assert_eq!(render_primitive(&PrimitiveValue::Empty), "");
        let multi = dicom_value!(Strs, ["ORIGINAL", "PRIMARY"]);
        assert_eq!(render_primitive(&multi), "ORIGINAL\\PRIMARY");
    }

    #[test]
    fn long_values_are_cut() {
        let value = PrimitiveValue::from(vec![1_u8; 100]);
        let rendered = render_primitive(&value);
        assert!(rendered.ends_with("..."));
        assert_eq!(rendered.trim_end_matches("...").split('\\').count(), MAX_VALUES);
    }

    #[test]
    fn large_binary_values_are_cut_before_formatting() {
        // one value per pixel of a 4096x4096 8-bit image
        let value = PrimitiveValue::from(vec![7_u8; 4096 * 4096]);
        let rendered = render_primitive(&value);
        assert_eq!(rendered.len(), MAX_VALUES * 2 - 1 + 3);
        assert!(rendered.starts_with("7\\7\\"));
        assert!(rendered.ends_with("7..."));

        let value = PrimitiveValue::U16(vec![1024_u16; 1 << 20].into());
        let rendered = render_primitive(&value);
        assert_eq!(rendered.matches("1024").count(), MAX_VALUES);
    }

    #[test]
    fn exactly_max_values_are_not_cut() {
        let value = PrimitiveValue::from(vec![3_u8; MAX_VALUES]);
        let rendered = render_primitive(&value);
        assert!(!rendered.ends_with("..."));
        assert_eq!(rendered.split('\\').count(), MAX_VALUES);
    }

    #[test]
    fn renders_sequences() {
        let value: Value<InMemDicomObject, Vec<u8>> = Value::from(DataSetSequence::from(vec![
            InMemDicomObject::new_empty(),
            InMemDicomObject::new_empty(),
        ]));
        assert_eq!(render_value(&value), "(Sequence with 2 items)");
    }

    #[test]
    fn renders_pixel_sequences() {
        let value: Value<InMemDicomObject, Vec<u8>> = Value::from(PixelFragmentSequence::new(
            Vec::<u32>::new(),
            vec![vec![0xFF_u8, 0xD8], vec![0xFF, 0xD9]],
        ));
        assert_eq!(render_value(&value), "(PixelSequence with 2 fragments)");

        let value: Value<InMemDicomObject, Vec<u8>> =
            Value::from(PixelFragmentSequence::new(Vec::<u32>::new(), vec![vec![0_u8; 4]]));
        assert_eq!(render_value(&value), "(PixelSequence with 1 fragment)");
    }

    #[test]
    fn finds_values_in_meta_group_and_data_set() {
        let obj = InMemDicomObject::from_element_iter([
            DataElement::new(
                tags::SOP_INSTANCE_UID,
                VR::UI,
                PrimitiveValue::from("2.25.99"),
            ),
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("OT")),
        ])
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax("1.2.840.10008.1.2.1")
                .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7"),
        )
        .unwrap();

        assert_eq!(find_value(&obj, tags::MODALITY).as_deref(), Some("OT"));
        assert_eq!(
            find_value(&obj, tags::TRANSFER_SYNTAX_UID).as_deref(),
            Some("1.2.840.10008.1.2.1")
        );
        assert_eq!(
            find_value(&obj, tags::MEDIA_STORAGE_SOP_INSTANCE_UID).as_deref(),
            Some("2.25.99")
        );
        assert_eq!(find_value(&obj, tags::PATIENT_NAME), None);
        assert_eq!(find_value(&obj, Tag(0x0002, 0x9999)), None);
    }
}
