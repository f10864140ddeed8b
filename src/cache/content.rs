//! Cached object payloads, size estimation and type classification

use lopdf::{Dictionary, Object};
use serde::Serialize;

/// Opaque payload stored in the object cache
#[derive(Debug, Clone)]
pub enum ObjectContent {
    /// Raw object text, e.g. `<< /Type /Page ... >>`
    Text(String),
    /// Raw or decoded byte buffer
    Bytes(Vec<u8>),
    /// Parsed object from the PDF object model
    Object(Object),
}

impl ObjectContent {
    /// Approximate number of bytes this payload occupies.
    ///
    /// Strings and buffers report their length. Parsed objects use a
    /// structural estimate; image XObjects use [`ImageGeometry::estimated_size`]
    /// when the dictionary carries usable dimensions.
    pub fn estimated_size(&self) -> u64 {
        match self {
            ObjectContent::Text(text) => text.len() as u64,
            ObjectContent::Bytes(bytes) => bytes.len() as u64,
            ObjectContent::Object(obj) => estimate_object_size(obj),
        }
    }

    /// Classify the payload by PDF object type
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectContent::Text(text) => detect_text_type(text),
            ObjectContent::Bytes(_) => ObjectType::Unknown,
            ObjectContent::Object(obj) => detect_object_type(obj),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ObjectContent::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ObjectContent::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            ObjectContent::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl From<String> for ObjectContent {
    fn from(text: String) -> Self {
        ObjectContent::Text(text)
    }
}

impl From<&str> for ObjectContent {
    fn from(text: &str) -> Self {
        ObjectContent::Text(text.to_string())
    }
}

impl From<Vec<u8>> for ObjectContent {
    fn from(bytes: Vec<u8>) -> Self {
        ObjectContent::Bytes(bytes)
    }
}

impl From<Object> for ObjectContent {
    fn from(obj: Object) -> Self {
        ObjectContent::Object(obj)
    }
}

/// PDF object classification used for cache metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ObjectType {
    Page,
    Pages,
    Stream,
    Image,
    Form,
    Font,
    Unknown,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Page => "Page",
            ObjectType::Pages => "Pages",
            ObjectType::Stream => "Stream",
            ObjectType::Image => "Image",
            ObjectType::Form => "Form",
            ObjectType::Font => "Font",
            ObjectType::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image XObject dimensions as declared in its stream dictionary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageGeometry {
    pub width: u64,
    pub height: u64,
    pub bits_per_component: u64,
    pub color_space: Option<String>,
    pub filter: Option<String>,
}

impl ImageGeometry {
    /// Read geometry from an image dictionary. Returns `None` unless both
    /// `Width` and `Height` are positive integers.
    pub fn from_dict(dict: &Dictionary) -> Option<Self> {
        let width = positive_int(dict.get(b"Width").ok()?)?;
        let height = positive_int(dict.get(b"Height").ok()?)?;
        let bits_per_component = dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(positive_int)
            .unwrap_or(8);

        Some(Self {
            width,
            height,
            bits_per_component,
            color_space: dict.get(b"ColorSpace").ok().and_then(first_name),
            filter: dict.get(b"Filter").ok().and_then(first_name),
        })
    }

    /// Decoded size estimate: `width * height * (bpc / 8) * 3`.
    ///
    /// NOTE: this is an approximation, not a decode. Three color components
    /// are assumed whatever the declared `ColorSpace`, and the integer
    /// division means sub-byte depths estimate to zero.
    pub fn estimated_size(&self) -> u64 {
        self.width
            .saturating_mul(self.height)
            .saturating_mul(self.bits_per_component / 8)
            .saturating_mul(3)
    }
}

fn positive_int(obj: &Object) -> Option<u64> {
    match obj {
        Object::Integer(i) if *i > 0 => Some(*i as u64),
        Object::Real(r) if *r > 0.0 => Some(*r as u64),
        _ => None,
    }
}

/// A name value, or the first name of an array of names (filter chains,
/// indexed color spaces).
fn first_name(obj: &Object) -> Option<String> {
    match obj {
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        Object::Array(items) => items.first().and_then(first_name),
        _ => None,
    }
}

fn name_eq(dict: &Dictionary, key: &[u8], expected: &[u8]) -> bool {
    matches!(dict.get(key), Ok(Object::Name(name)) if name.as_slice() == expected)
}

fn estimate_dict_size(dict: &Dictionary) -> u64 {
    dict.iter()
        .map(|(key, value)| key.len() as u64 + 2 + estimate_object_size(value))
        .sum::<u64>()
        + 4
}

/// Structural size estimate for a parsed object
pub fn estimate_object_size(obj: &Object) -> u64 {
    match obj {
        Object::Null => 4,
        Object::Boolean(_) => 5,
        Object::Integer(_) | Object::Real(_) => 8,
        Object::Name(name) => name.len() as u64 + 1,
        Object::String(bytes, _) => bytes.len() as u64 + 2,
        Object::Array(items) => items.iter().map(estimate_object_size).sum::<u64>() + 2,
        Object::Dictionary(dict) => estimate_dict_size(dict),
        Object::Stream(stream) => {
            let structural = estimate_dict_size(&stream.dict) + stream.content.len() as u64;
            if name_eq(&stream.dict, b"Subtype", b"Image") {
                match ImageGeometry::from_dict(&stream.dict).map(|g| g.estimated_size()) {
                    Some(decoded) if decoded > 0 => decoded,
                    _ => structural,
                }
            } else {
                structural
            }
        }
        Object::Reference(_) => 12,
    }
}

fn detect_dict_type(dict: &Dictionary) -> Option<ObjectType> {
    if name_eq(dict, b"Type", b"Pages") {
        Some(ObjectType::Pages)
    } else if name_eq(dict, b"Type", b"Page") {
        Some(ObjectType::Page)
    } else if name_eq(dict, b"Type", b"Font") {
        Some(ObjectType::Font)
    } else if name_eq(dict, b"Subtype", b"Image") {
        Some(ObjectType::Image)
    } else if name_eq(dict, b"Subtype", b"Form") || dict.has(b"FT") {
        Some(ObjectType::Form)
    } else {
        None
    }
}

fn detect_object_type(obj: &Object) -> ObjectType {
    match obj {
        Object::Dictionary(dict) => detect_dict_type(dict).unwrap_or(ObjectType::Unknown),
        Object::Stream(stream) => detect_dict_type(&stream.dict).unwrap_or(ObjectType::Stream),
        _ => ObjectType::Unknown,
    }
}

/// True if `text` holds `/key /value` or `/key/value` with `value` not
/// continuing into a longer name (so `/Type /Page` does not match `/Pages`).
fn has_name_entry(text: &str, key: &str, value: &str) -> bool {
    [format!("/{} /{}", key, value), format!("/{}/{}", key, value)]
        .iter()
        .any(|needle| {
            text.match_indices(needle.as_str()).any(|(idx, m)| {
                !text[idx + m.len()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphanumeric())
            })
        })
}

fn detect_text_type(text: &str) -> ObjectType {
    if has_name_entry(text, "Type", "Pages") {
        ObjectType::Pages
    } else if has_name_entry(text, "Type", "Page") {
        ObjectType::Page
    } else if has_name_entry(text, "Type", "Font") {
        ObjectType::Font
    } else if has_name_entry(text, "Subtype", "Image") {
        ObjectType::Image
    } else if text.contains("/FT /") || text.contains("/FT/") {
        ObjectType::Form
    } else if text.contains("stream") {
        ObjectType::Stream
    } else {
        ObjectType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};
    use rstest::rstest;

    #[rstest]
    #[case("<< /Type /Page /MediaBox [0 0 612 792] >>", ObjectType::Page)]
    #[case("<</Type/Page/Parent 2 0 R>>", ObjectType::Page)]
    #[case("<< /Type /Pages /Count 3 >>", ObjectType::Pages)]
    #[case("<< /Type /Font /BaseFont /Helvetica >>", ObjectType::Font)]
    #[case("<< /Subtype /Image /Width 10 >>", ObjectType::Image)]
    #[case("<< /FT /Tx /T (name) >>", ObjectType::Form)]
    #[case("<< /Length 5 >> stream hello endstream", ObjectType::Stream)]
    #[case("just some text", ObjectType::Unknown)]
    fn test_detect_text_type(#[case] text: &str, #[case] expected: ObjectType) {
        assert_eq!(ObjectContent::from(text).object_type(), expected);
    }

    #[test]
    fn test_detect_object_type() {
        let page = Object::Dictionary(dictionary! { "Type" => "Page" });
        assert_eq!(ObjectContent::from(page).object_type(), ObjectType::Page);

        let stream = Object::Stream(Stream::new(dictionary! {}, b"BT ET".to_vec()));
        assert_eq!(ObjectContent::from(stream).object_type(), ObjectType::Stream);

        assert_eq!(
            ObjectContent::from(Object::Integer(3)).object_type(),
            ObjectType::Unknown
        );
    }

    #[test]
    fn test_text_and_bytes_size() {
        assert_eq!(ObjectContent::from("hello").estimated_size(), 5);
        assert_eq!(ObjectContent::from(vec![0u8; 42]).estimated_size(), 42);
    }

    #[test]
    fn test_image_size_assumes_three_components() {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 10,
            "Height" => 20,
            "BitsPerComponent" => 8,
            "ColorSpace" => "DeviceGray",
        };
        let geometry = ImageGeometry::from_dict(&dict).unwrap();
        assert_eq!(geometry.color_space.as_deref(), Some("DeviceGray"));
        assert_eq!(geometry.estimated_size(), 10 * 20 * 3);

        let image = Object::Stream(Stream::new(dict, vec![0u8; 16]));
        let content = ObjectContent::from(image);
        assert_eq!(content.object_type(), ObjectType::Image);
        assert_eq!(content.estimated_size(), 600);
    }

    #[test]
    fn test_image_without_dimensions_falls_back_to_structure() {
        let dict = dictionary! { "Subtype" => "Image" };
        assert!(ImageGeometry::from_dict(&dict).is_none());

        let image = Object::Stream(Stream::new(dict, vec![0u8; 100]));
        assert!(ObjectContent::from(image).estimated_size() >= 100);
    }
}
