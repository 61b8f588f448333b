//! HWP 5.0 body text reader.
//!
//! An HWP 5.0 document is a compound file (OLE/CFB). Body text lives in
//! `BodyText/Section<N>` streams as a flat list of tagged records; only
//! paragraph-text records carry prose.

use std::io::{Cursor, Read};

use flate2::read::DeflateDecoder;

use super::ExtractionError;

const FILE_HEADER_STREAM: &str = "/FileHeader";
const SUMMARY_STREAM: &str = "/\u{5}HwpSummaryInformation";
const BODY_TEXT_STORAGE: &str = "/BodyText";
const SECTION_PREFIX: &str = "Section";

/// Offset of the document properties flags inside `FileHeader`.
const PROPERTIES_OFFSET: usize = 36;
const FLAG_COMPRESSED: u8 = 0x01;

/// `HWPTAG_BEGIN (0x10) + 51`.
pub const HWPTAG_PARA_TEXT: u16 = 67;

/// Size field value announcing a following 32-bit size.
const EXTENDED_SIZE: u32 = 0xFFF;

/// UTF-16 units following an inline or extended control code.
const CONTROL_PARAM_UNITS: usize = 7;

/// One record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub tag: u16,
    pub level: u16,
    pub size: u32,
}

impl RecordHeader {
    pub fn parse(word: u32) -> Self {
        Self {
            tag: (word & 0x3FF) as u16,
            level: ((word >> 10) & 0x3FF) as u16,
            size: (word >> 20) & 0xFFF,
        }
    }
}

/// Text of every body section, in section order, one entry per section.
///
/// Fails with [`ExtractionError::Format`] unless `data` is a compound file
/// carrying both the `FileHeader` and `HwpSummaryInformation` streams.
pub fn read_hwp_sections(data: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let mut container = cfb::CompoundFile::open(Cursor::new(data))
        .map_err(|e| ExtractionError::Format(format!("not a compound file: {e}")))?;

    if !container.is_stream(FILE_HEADER_STREAM) || !container.is_stream(SUMMARY_STREAM) {
        return Err(ExtractionError::Format(
            "missing FileHeader or HwpSummaryInformation stream".into(),
        ));
    }

    let header = read_stream(&mut container, FILE_HEADER_STREAM)?;
    let Some(&properties) = header.get(PROPERTIES_OFFSET) else {
        return Err(ExtractionError::Format(format!(
            "FileHeader is {} bytes, too short for the properties field",
            header.len()
        )));
    };
    let compressed = properties & FLAG_COMPRESSED != 0;

    let sections = body_sections(&container);
    tracing::debug!(sections = sections.len(), compressed, "Reading HWP body text");

    let mut texts = Vec::with_capacity(sections.len());
    for path in sections {
        let raw = read_stream(&mut container, &path)?;
        let records = if compressed { inflate(&raw, &path)? } else { raw };
        texts.push(section_text(&records));
    }
    Ok(texts)
}

/// Whole-document text: sections joined by newlines.
pub fn read_hwp_text(data: &[u8]) -> Result<String, ExtractionError> {
    Ok(read_hwp_sections(data)?.join("\n"))
}

fn read_stream<F: Read + std::io::Seek>(
    container: &mut cfb::CompoundFile<F>,
    path: &str,
) -> Result<Vec<u8>, ExtractionError> {
    let mut stream = container
        .open_stream(path)
        .map_err(|e| ExtractionError::Format(format!("cannot open {path}: {e}")))?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    Ok(buf)
}

/// `BodyText/Section<N>` stream paths sorted by `N`.
fn body_sections<F>(container: &cfb::CompoundFile<F>) -> Vec<String> {
    let Ok(entries) = container.read_storage(BODY_TEXT_STORAGE) else {
        return Vec::new();
    };

    let mut numbered: Vec<(u32, String)> = entries
        .filter(|e| e.is_stream())
        .filter_map(|e| {
            let n = e.name().strip_prefix(SECTION_PREFIX)?.parse::<u32>().ok()?;
            Some((n, format!("{BODY_TEXT_STORAGE}/{}", e.name())))
        })
        .collect();
    numbered.sort_by_key(|(n, _)| *n);
    numbered.into_iter().map(|(_, path)| path).collect()
}

fn inflate(raw: &[u8], path: &str) -> Result<Vec<u8>, ExtractionError> {
    let mut out = Vec::with_capacity(raw.len() * 4);
    DeflateDecoder::new(raw)
        .read_to_end(&mut out)
        .map_err(|e| ExtractionError::Decompress(format!("{path}: {e}")))?;
    Ok(out)
}

/// Walk the records of one section and collect paragraph text, one line per
/// paragraph. A record running past the end of the buffer ends the section.
pub fn section_text(records: &[u8]) -> String {
    let mut text = String::new();
    let mut pos = 0usize;

    while let Some(word) = read_u32(records, pos) {
        let header = RecordHeader::parse(word);
        let mut body = pos + 4;
        let mut size = header.size as usize;

        if header.size == EXTENDED_SIZE {
            let Some(extended) = read_u32(records, body) else {
                break;
            };
            size = extended as usize;
            body += 4;
        }

        let end = match body.checked_add(size) {
            Some(end) if end <= records.len() => end,
            _ => {
                tracing::debug!(
                    offset = pos,
                    tag = header.tag,
                    size,
                    "HWP record overruns section, stopping"
                );
                break;
            }
        };

        if header.tag == HWPTAG_PARA_TEXT {
            text.push_str(&para_text(&records[body..end]));
            text.push('\n');
        }
        pos = end;
    }

    text
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decode a `PARA_TEXT` payload, dropping control codes and their parameters.
fn para_text(payload: &[u8]) -> String {
    let units: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let mut kept = Vec::with_capacity(units.len());
    let mut i = 0;
    while i < units.len() {
        let unit = units[i];
        i += 1;
        if unit < 0x20 {
            if takes_parameters(unit) {
                i += CONTROL_PARAM_UNITS;
            }
            continue;
        }
        kept.push(unit);
    }

    char::decode_utf16(kept)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .filter(|c| !matches!(*c as u32, 0x00..=0x1F | 0x7F..=0x9F))
        .collect()
}

/// Inline and extended controls carry 7 units of parameters; char controls
/// (line break, paragraph end, hyphen and the like) are a single unit.
fn takes_parameters(code: u16) -> bool {
    matches!(code, 1..=9 | 11 | 12 | 14..=23)
}


#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use super::fixtures::*;
    use super::*;

    #[test]
    fn header_bit_layout() {
        let word = 67u32 | (2 << 10) | (24 << 20);
        assert_eq!(
            RecordHeader::parse(word),
            RecordHeader { tag: 67, level: 2, size: 24 }
        );
    }

    #[test]
    fn random_bytes_are_format_error() {
        let err = read_hwp_sections(b"%PDF-1.4 definitely not hwp").unwrap_err();
        assert!(matches!(err, ExtractionError::Format(_)));
        assert_eq!(err.kind(), "FormatError");
    }

    #[test]
    fn compound_file_without_signature_streams_is_format_error() {
        let mut comp = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
        {
            let mut s = comp.create_stream("/FileHeader").unwrap();
            s.write_all(&[0u8; 256]).unwrap();
            s.flush().unwrap();
        }
        comp.flush().unwrap();
        let data = comp.into_inner().into_inner();

        let err = read_hwp_sections(&data).unwrap_err();
        assert!(matches!(err, ExtractionError::Format(_)));
    }

    #[test]
    fn sections_read_in_numeric_order() {
        let data = build_hwp(
            &[
                (10, vec!["열 번째"]),
                (2, vec!["두 번째"]),
                (0, vec!["첫 문단", "둘째 문단"]),
            ],
            false,
        );
        let sections = read_hwp_sections(&data).unwrap();
        assert_eq!(sections, vec!["첫 문단\n둘째 문단\n", "두 번째\n", "열 번째\n"]);
    }

    #[test]
    fn compressed_sections_inflate() {
        let data = build_hwp(&[(0, vec!["압축된 본문입니다."])], true);
        assert_eq!(read_hwp_text(&data).unwrap(), "압축된 본문입니다.\n");
    }

    #[test]
    fn sections_joined_with_newline() {
        let data = build_hwp(&[(0, vec!["a"]), (1, vec!["b"])], false);
        assert_eq!(read_hwp_text(&data).unwrap(), "a\n\nb\n");
    }

    #[test]
    fn zero_length_record_advances_four_bytes() {
        let mut records = record(HWPTAG_PARA_TEXT, &[]);
        records.extend(para("after"));
        assert_eq!(section_text(&records), "\nafter\n");
    }

    #[test]
    fn overrunning_record_stops_section() {
        let mut records = para("kept");
        let word = (HWPTAG_PARA_TEXT as u32) | (100 << 20);
        records.extend_from_slice(&word.to_le_bytes());
        records.extend_from_slice(&utf16("short"));
        assert_eq!(section_text(&records), "kept\n");
    }

    #[test]
    fn extended_size_record() {
        let long = "가".repeat(3000);
        let records = para(&long);
        assert_eq!(section_text(&records), format!("{long}\n"));
    }

    #[test]
    fn control_codes_and_parameters_dropped() {
        // Extended control 0x0B (table) followed by 7 parameter units that
        // spell out "tbl " as raw UTF-16, then a char control 0x0D.
        let mut units: Vec<u16> = "앞".encode_utf16().collect();
        units.push(0x0B);
        units.extend(" lbt".encode_utf16());
        units.extend([0, 0, 0]);
        units.extend("뒤".encode_utf16());
        units.push(0x0D);
        let payload: Vec<u8> = units.iter().flat_map(|u| u.to_le_bytes()).collect();

        assert_eq!(section_text(&record(HWPTAG_PARA_TEXT, &payload)), "앞뒤\n");
    }

    #[test]
    fn c1_controls_stripped() {
        let records = para("a\u{85}b\u{9F}c");
        assert_eq!(section_text(&records), "abc\n");
    }

    #[test]
    fn missing_body_text_yields_no_sections() {
        let data = build_hwp(&[], false);
        assert!(read_hwp_sections(&data).unwrap().is_empty());
    }
}
