//! Minimal reader for DICOM Part-10 files.
//!
//! Reads the File Meta group, then scans the data set for the identifying
//! and descriptive string attributes the catalog indexes. Explicit and
//! implicit VR little endian only; the scan stops at the first
//! undefined-length element, at PixelData, or once tags pass the indexed
//! range. Full toolkits can replace this via the `AttributeExtractor` seam.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::tags::{self, AttributeMap, Tag};
use super::{AttributeExtractor, ExtractError};

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_BE: &str = "1.2.840.10008.1.2.2";
const DEFLATED_EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1.99";

const META_GROUP_LENGTH: Tag = Tag::new(0x0002, 0x0000);
const TRANSFER_SYNTAX_UID: Tag = Tag::new(0x0002, 0x0010);
const PIXEL_DATA: Tag = Tag::new(0x7FE0, 0x0010);

const UNDEFINED_LEN: u32 = 0xFFFF_FFFF;
/// Identifying attributes are short; anything longer is skipped unread.
const MAX_VALUE_LEN: u32 = 1024;
/// Sanity bound on the File Meta group size.
const MAX_META_LEN: u32 = 1 << 20;

/// Tags the catalog indexes. All are in groups 0008..=0020, so the data-set
/// scan stops once tags pass that range.
const INDEXED_TAGS: [Tag; 10] = [
    tags::SOP_INSTANCE_UID,
    tags::STUDY_DATE,
    tags::MODALITY,
    tags::STUDY_DESCRIPTION,
    tags::SERIES_DESCRIPTION,
    tags::PATIENT_NAME,
    tags::PATIENT_ID,
    tags::STUDY_INSTANCE_UID,
    tags::SERIES_INSTANCE_UID,
    tags::INSTANCE_NUMBER,
];
const LAST_INDEXED_GROUP: u16 = 0x0020;

pub struct PartTenExtractor;

impl AttributeExtractor for PartTenExtractor {
    fn extract(&self, path: &Path) -> Result<AttributeMap, ExtractError> {
        let file = File::open(path)?;
        read_attributes(&mut BufReader::new(file))
    }
}

fn read_attributes<R: Read + Seek>(reader: &mut R) -> Result<AttributeMap, ExtractError> {
    let mut header = [0u8; PREAMBLE_LEN + 4];
    reader
        .read_exact(&mut header)
        .map_err(|_| malformed("shorter than a Part-10 preamble"))?;
    if &header[PREAMBLE_LEN..] != MAGIC {
        return Err(malformed("missing DICM magic"));
    }

    let transfer_syntax = read_file_meta(reader)?;
    let explicit = match transfer_syntax.as_str() {
        EXPLICIT_VR_BE | DEFLATED_EXPLICIT_VR_LE => {
            return Err(ExtractError::Malformed(format!(
                "unsupported transfer syntax {transfer_syntax}"
            )))
        }
        IMPLICIT_VR_LE => false,
        _ => true,
    };

    let mut attributes = AttributeMap::new();
    loop {
        let tag = match read_tag(reader) {
            Ok(tag) => tag,
            Err(_) => break, // EOF ends the scan
        };
        if tag == PIXEL_DATA || tag.group() > LAST_INDEXED_GROUP {
            break;
        }
        let len = if explicit {
            match read_explicit_vr_len(reader) {
                Ok((_vr, len)) => len,
                Err(_) => break,
            }
        } else {
            match read_u32(reader) {
                Ok(len) => len,
                Err(_) => break,
            }
        };
        // sequence bodies are not scanned; defined-length ones are skipped
        // wholesale below, undefined length cannot be skipped without
        // delimiter parsing
        if len == UNDEFINED_LEN {
            break;
        }
        if INDEXED_TAGS.contains(&tag) && len > 0 && len <= MAX_VALUE_LEN {
            let mut raw = vec![0u8; len as usize];
            reader.read_exact(&mut raw)?;
            let value = String::from_utf8_lossy(&raw)
                .trim_end_matches(['\0', ' '])
                .to_string();
            attributes.insert(tag, value);
        } else {
            reader.seek(SeekFrom::Current(i64::from(len)))?;
        }
    }

    Ok(attributes)
}

/// File Meta is always explicit VR little endian; its first element gives
/// the byte length of the rest of the group.
fn read_file_meta<R: Read>(reader: &mut R) -> Result<String, ExtractError> {
    let tag = read_tag(reader)?;
    if tag != META_GROUP_LENGTH {
        return Err(malformed("file meta group length missing"));
    }
    let (_vr, len) = read_explicit_vr_len(reader)?;
    if len != 4 {
        return Err(malformed("bad file meta group length"));
    }
    let meta_len = read_u32(reader)?;
    if meta_len > MAX_META_LEN {
        return Err(malformed("file meta group implausibly large"));
    }
    let mut meta = vec![0u8; meta_len as usize];
    reader.read_exact(&mut meta)?;

    let mut cursor = io::Cursor::new(meta.as_slice());
    let mut transfer_syntax = None;
    while (cursor.position() as usize) < meta.len() {
        let tag = read_tag(&mut cursor)?;
        let (_vr, len) = read_explicit_vr_len(&mut cursor)?;
        if len == UNDEFINED_LEN {
            return Err(malformed("undefined length in file meta"));
        }
        if tag == TRANSFER_SYNTAX_UID {
            let mut raw = vec![0u8; len as usize];
            cursor.read_exact(&mut raw)?;
            transfer_syntax = Some(
                String::from_utf8_lossy(&raw)
                    .trim_end_matches(['\0', ' '])
                    .to_string(),
            );
        } else {
            cursor.seek(SeekFrom::Current(i64::from(len)))?;
        }
    }
    transfer_syntax.ok_or_else(|| malformed("transfer syntax missing from file meta"))
}

fn malformed(msg: &str) -> ExtractError {
    ExtractError::Malformed(msg.to_string())
}

fn read_u16<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_tag<R: Read>(reader: &mut R) -> io::Result<Tag> {
    let group = read_u16(reader)?;
    let element = read_u16(reader)?;
    Ok(Tag::new(group, element))
}

/// VRs that use the reserved + 4-byte length header form.
fn has_long_length(vr: &[u8; 2]) -> bool {
    matches!(vr, b"OB" | b"OW" | b"OF" | b"SQ" | b"UT" | b"UN")
}

fn read_explicit_vr_len<R: Read>(reader: &mut R) -> io::Result<([u8; 2], u32)> {
    let mut vr = [0u8; 2];
    reader.read_exact(&mut vr)?;
    let len = if has_long_length(&vr) {
        let mut reserved = [0u8; 2];
        reader.read_exact(&mut reserved)?;
        read_u32(reader)?
    } else {
        u32::from(read_u16(reader)?)
    };
    Ok((vr, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explicit_element(buf: &mut Vec<u8>, tag: Tag, vr: &[u8; 2], value: &[u8]) {
        buf.extend_from_slice(&tag.group().to_le_bytes());
        buf.extend_from_slice(&tag.element().to_le_bytes());
        buf.extend_from_slice(vr);
        buf.extend_from_slice(&(value.len() as u16).to_le_bytes());
        buf.extend_from_slice(value);
    }

    fn implicit_element(buf: &mut Vec<u8>, tag: Tag, value: &[u8]) {
        buf.extend_from_slice(&tag.group().to_le_bytes());
        buf.extend_from_slice(&tag.element().to_le_bytes());
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(value);
    }

    fn part10_header(transfer_syntax: &str) -> Vec<u8> {
        let mut ts = transfer_syntax.as_bytes().to_vec();
        if ts.len() % 2 == 1 {
            ts.push(0);
        }
        let mut meta = Vec::new();
        explicit_element(&mut meta, TRANSFER_SYNTAX_UID, b"UI", &ts);

        let mut buf = vec![0u8; PREAMBLE_LEN];
        buf.extend_from_slice(MAGIC);
        explicit_element(&mut buf, META_GROUP_LENGTH, b"UL", &(meta.len() as u32).to_le_bytes());
        buf.extend_from_slice(&meta);
        buf
    }

    #[test]
    fn test_reads_explicit_vr_attributes() {
        let mut buf = part10_header("1.2.840.10008.1.2.1");
        explicit_element(&mut buf, tags::SOP_INSTANCE_UID, b"UI", b"1.2.3.40");
        explicit_element(&mut buf, tags::MODALITY, b"CS", b"CT");
        // defined-length sequence is skipped wholesale
        buf.extend_from_slice(&0x0008u16.to_le_bytes());
        buf.extend_from_slice(&0x1110u16.to_le_bytes());
        buf.extend_from_slice(b"SQ");
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        explicit_element(&mut buf, tags::PATIENT_NAME, b"PN", b"DOE^JOHN");
        explicit_element(&mut buf, tags::PATIENT_ID, b"LO", b"P1");
        explicit_element(&mut buf, tags::STUDY_INSTANCE_UID, b"UI", b"1.2.3\0");
        // pixel data ends the scan
        buf.extend_from_slice(&0x7FE0u16.to_le_bytes());
        buf.extend_from_slice(&0x0010u16.to_le_bytes());
        buf.extend_from_slice(b"OW");
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&8u32.to_le_bytes());
        buf.extend_from_slice(&[0xAB; 8]);

        let attributes = read_attributes(&mut io::Cursor::new(buf)).unwrap();
        assert_eq!(attributes.len(), 4);
        assert_eq!(attributes[&tags::SOP_INSTANCE_UID], "1.2.3.40");
        assert_eq!(attributes[&tags::MODALITY], "CT");
        assert_eq!(attributes[&tags::PATIENT_NAME], "DOE^JOHN");
        assert_eq!(attributes[&tags::STUDY_INSTANCE_UID], "1.2.3");
    }

    #[test]
    fn test_reads_implicit_vr_attributes() {
        let mut buf = part10_header("1.2.840.10008.1.2");
        implicit_element(&mut buf, tags::PATIENT_ID, b"P2");
        implicit_element(&mut buf, tags::STUDY_INSTANCE_UID, b"9.8.7.60");

        let attributes = read_attributes(&mut io::Cursor::new(buf)).unwrap();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[&tags::PATIENT_ID], "P2");
        assert_eq!(attributes[&tags::STUDY_INSTANCE_UID], "9.8.7.60");
    }

    #[test]
    fn test_missing_magic_is_malformed() {
        let buf = vec![0u8; 200];
        assert!(matches!(
            read_attributes(&mut io::Cursor::new(buf)),
            Err(ExtractError::Malformed(_))
        ));
    }

    #[test]
    fn test_big_endian_rejected() {
        let buf = part10_header("1.2.840.10008.1.2.2");
        assert!(matches!(
            read_attributes(&mut io::Cursor::new(buf)),
            Err(ExtractError::Malformed(_))
        ));
    }

    #[test]
    fn test_undefined_length_stops_scan() {
        let mut buf = part10_header("1.2.840.10008.1.2.1");
        explicit_element(&mut buf, tags::MODALITY, b"CS", b"MR");
        // undefined-length sequence: scan keeps what it has
        buf.extend_from_slice(&0x0008u16.to_le_bytes());
        buf.extend_from_slice(&0x1115u16.to_le_bytes());
        buf.extend_from_slice(b"SQ");
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&UNDEFINED_LEN.to_le_bytes());
        explicit_element(&mut buf, tags::PATIENT_ID, b"LO", b"P3");

        let attributes = read_attributes(&mut io::Cursor::new(buf)).unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[&tags::MODALITY], "MR");
    }
}
