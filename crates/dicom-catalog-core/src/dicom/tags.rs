use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A DICOM attribute tag, packed as `(group << 16) | element`.
///
/// Serializes as the 8-hex-digit form ("00100020") so attribute maps become
/// plain JSON objects; parsing also accepts the "0010,0020" display form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub u32);

impl Tag {
    pub const fn new(group: u16, element: u16) -> Self {
        Tag(((group as u32) << 16) | element as u32)
    }

    pub const fn group(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn element(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X},{:04X}", self.group(), self.element())
    }
}

impl FromStr for Tag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| *c != ',').collect();
        if compact.len() != 8 {
            return Err(format!("malformed tag '{}'", s));
        }
        u32::from_str_radix(&compact, 16)
            .map(Tag)
            .map_err(|_| format!("malformed tag '{}'", s))
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:08X}", self.0))
    }
}

struct TagVisitor;

impl Visitor<'_> for TagVisitor {
    type Value = Tag;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a DICOM tag as 8 hex digits")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Tag, E> {
        value.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Tag, D::Error> {
        deserializer.deserialize_str(TagVisitor)
    }
}

/// Extracted attributes of one file, keyed by tag. Ordered so snapshot JSON
/// is deterministic.
pub type AttributeMap = BTreeMap<Tag, String>;

pub const SOP_INSTANCE_UID: Tag = Tag::new(0x0008, 0x0018);
pub const STUDY_DATE: Tag = Tag::new(0x0008, 0x0020);
pub const MODALITY: Tag = Tag::new(0x0008, 0x0060);
pub const STUDY_DESCRIPTION: Tag = Tag::new(0x0008, 0x1030);
pub const SERIES_DESCRIPTION: Tag = Tag::new(0x0008, 0x103E);
pub const PATIENT_NAME: Tag = Tag::new(0x0010, 0x0010);
pub const PATIENT_ID: Tag = Tag::new(0x0010, 0x0020);
pub const STUDY_INSTANCE_UID: Tag = Tag::new(0x0020, 0x000D);
pub const SERIES_INSTANCE_UID: Tag = Tag::new(0x0020, 0x000E);
pub const INSTANCE_NUMBER: Tag = Tag::new(0x0020, 0x0013);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_and_unpack() {
        let tag = Tag::new(0x0010, 0x0020);
        assert_eq!(tag.group(), 0x0010);
        assert_eq!(tag.element(), 0x0020);
        assert_eq!(tag.to_string(), "0010,0020");
    }

    #[test]
    fn test_parse_both_forms() {
        assert_eq!("00100020".parse::<Tag>().unwrap(), PATIENT_ID);
        assert_eq!("0010,0020".parse::<Tag>().unwrap(), PATIENT_ID);
        assert!("10,20".parse::<Tag>().is_err());
        assert!("zzzzzzzz".parse::<Tag>().is_err());
    }

    #[test]
    fn test_attribute_map_serializes_as_object() {
        let mut attributes = AttributeMap::new();
        attributes.insert(PATIENT_ID, "P001".to_string());
        let json = serde_json::to_string(&attributes).unwrap();
        assert_eq!(json, r#"{"00100020":"P001"}"#);
        let back: AttributeMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attributes);
    }
}
