//! Cross-reference parsing.
//!
//! Reads classic xref tables, cross-reference streams, hybrid files
//! (`/XRefStm`) and follows `/Prev` chains. When the same object number
//! appears in several sections the newest section wins.

use std::collections::{BTreeMap, HashSet};

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dict, Object};
use crate::parser::{parse_indirect_object, parse_object, rfind_keyword};

/// Cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free object slot
    Free {
        /// Generation to use on reuse
        generation: u16,
    },
    /// Object stored at a byte offset
    Uncompressed {
        /// Byte offset of `n g obj`
        offset: u64,
        /// Generation number
        generation: u16,
    },
    /// Object stored inside an object stream
    Compressed {
        /// Object number of the object stream
        stream: u32,
        /// Index inside the stream
        index: u32,
    },
}

/// How the newest revision stores its cross-reference data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefKind {
    /// `xref` keyword table followed by `trailer`
    Table,
    /// `/Type /XRef` stream
    Stream,
}

/// Merged cross-reference data of a whole file.
#[derive(Debug, Clone)]
pub struct CrossRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Dict,
    kind: XRefKind,
    startxref: u64,
}

impl CrossRefTable {
    /// Look up an object number.
    pub fn get(&self, id: u32) -> Option<&XRefEntry> {
        self.entries.get(&id)
    }

    /// Trailer dictionary of the newest section. For xref streams this is the stream dictionary.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Storage kind of the newest section.
    pub fn kind(&self) -> XRefKind {
        self.kind
    }

    /// Offset recorded after the final `startxref`.
    pub fn startxref(&self) -> u64 {
        self.startxref
    }

    /// Value of /Size: one more than the highest object number.
    pub fn size(&self) -> u32 {
        let declared = self
            .trailer
            .get("Size")
            .and_then(Object::as_integer)
            .unwrap_or(0)
            .max(0) as u32;
        let highest = self.entries.keys().next_back().map(|id| id + 1).unwrap_or(0);
        declared.max(highest)
    }

    /// Object numbers in use.
    pub fn in_use(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|(_, e)| !matches!(e, XRefEntry::Free { .. }))
            .map(|(id, _)| *id)
    }

    fn merge_older(&mut self, entries: BTreeMap<u32, XRefEntry>) {
        for (id, entry) in entries {
            self.entries.entry(id).or_insert(entry);
        }
    }
}

/// Locate the offset recorded after the last `startxref` keyword.
pub fn find_startxref(data: &[u8]) -> Result<u64> {
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];
    let pos = rfind_keyword(tail, b"startxref").ok_or(Error::InvalidXref)?;
    match token(&tail[pos + b"startxref".len()..]) {
        Ok((_, Token::Integer(offset))) if offset >= 0 => Ok(offset as u64),
        _ => Err(Error::InvalidXref),
    }
}

/// Parse every cross-reference section reachable from the final `startxref`.
pub fn parse_xref_chain(data: &[u8]) -> Result<CrossRefTable> {
    let startxref = find_startxref(data)?;
    let mut visited = HashSet::new();
    let mut pending = vec![startxref];
    let mut table: Option<CrossRefTable> = None;

    while let Some(offset) = pending.pop() {
        if !visited.insert(offset) {
            log::warn!("cross-reference loop at offset {}", offset);
            continue;
        }
        let section = parse_section(data, offset)?;
        let prev = section
            .trailer
            .get("Prev")
            .and_then(Object::as_integer)
            .filter(|p| *p >= 0);
        let hybrid = section
            .trailer
            .get("XRefStm")
            .and_then(Object::as_integer)
            .filter(|p| *p >= 0);

        match table.as_mut() {
            None => {
                table = Some(CrossRefTable {
                    entries: section.entries,
                    trailer: section.trailer,
                    kind: section.kind,
                    startxref,
                });
            },
            Some(t) => t.merge_older(section.entries),
        }

        // Older data is processed after the hybrid stream of the same revision
        if let Some(prev) = prev {
            pending.push(prev as u64);
        }
        if let Some(stm) = hybrid {
            pending.push(stm as u64);
        }
    }

    let table = table.ok_or(Error::InvalidXref)?;
    log::debug!(
        "cross-reference: {} entries, newest section is {:?}",
        table.entries.len(),
        table.kind
    );
    Ok(table)
}

struct Section {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Dict,
    kind: XRefKind,
}

fn parse_section(data: &[u8], offset: u64) -> Result<Section> {
    let start = usize::try_from(offset).map_err(|_| Error::InvalidXref)?;
    let input = data.get(start..).ok_or(Error::InvalidXref)?;
    let trimmed = input.iter().position(|c| !c.is_ascii_whitespace()).unwrap_or(0);
    if input[trimmed..].starts_with(b"xref") {
        parse_table(data, start + trimmed)
    } else {
        parse_stream_section(data, start)
    }
}

fn parse_table(data: &[u8], start: usize) -> Result<Section> {
    let mut input = &data[start + b"xref".len()..];
    let mut entries = BTreeMap::new();

    loop {
        let Ok((rest, Token::Integer(first))) = token(input) else {
            break;
        };
        let (rest, count) = match token(rest) {
            Ok((rest, Token::Integer(count))) => (rest, count),
            _ => return Err(Error::InvalidXref),
        };
        input = rest;
        for i in 0..count.max(0) {
            let (rest, a) = read_int(input)?;
            let (rest, b) = read_int(rest)?;
            let rest = skip_spaces(rest);
            let flag = *rest.first().ok_or(Error::InvalidXref)?;
            input = &rest[1..];
            let id = (first + i) as u32;
            let entry = match flag {
                b'n' => XRefEntry::Uncompressed {
                    offset: a as u64,
                    generation: b as u16,
                },
                b'f' => XRefEntry::Free {
                    generation: b as u16,
                },
                _ => return Err(Error::InvalidXref),
            };
            entries.insert(id, entry);
        }
    }

    let pos = crate::parser::find_keyword(input, b"trailer").ok_or(Error::InvalidXref)?;
    let (_, trailer) = parse_object(&input[pos + b"trailer".len()..]).map_err(|_| Error::InvalidXref)?;
    let trailer = match trailer {
        Object::Dictionary(d) => d,
        _ => return Err(Error::InvalidXref),
    };
    Ok(Section {
        entries,
        trailer,
        kind: XRefKind::Table,
    })
}

fn skip_spaces(input: &[u8]) -> &[u8] {
    let n = input.iter().take_while(|c| c.is_ascii_whitespace()).count();
    &input[n..]
}

fn read_int(input: &[u8]) -> Result<(&[u8], i64)> {
    match token(input) {
        Ok((rest, Token::Integer(v))) => Ok((rest, v)),
        _ => Err(Error::InvalidXref),
    }
}

fn parse_stream_section(data: &[u8], start: usize) -> Result<Section> {
    let (_, obj) = parse_indirect_object(data, start)?;
    let dict = obj.as_dict().ok_or(Error::InvalidXref)?.clone();
    if dict.get("Type").and_then(Object::as_name) != Some("XRef") {
        return Err(Error::InvalidXref);
    }
    let decoded = obj.decode_stream_data()?;

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .ok_or(Error::InvalidXref)?
        .iter()
        .map(|w| w.as_integer().unwrap_or(0).max(0) as usize)
        .collect();
    if widths.len() != 3 {
        return Err(Error::InvalidXref);
    }
    let size = dict.get("Size").and_then(Object::as_integer).unwrap_or(0);
    let index: Vec<i64> = match dict.get("Index").and_then(Object::as_array) {
        Some(arr) => arr.iter().filter_map(Object::as_integer).collect(),
        None => vec![0, size],
    };

    let row = widths.iter().sum::<usize>();
    if row == 0 {
        return Err(Error::InvalidXref);
    }
    let mut rows = decoded.chunks_exact(row);
    let mut entries = BTreeMap::new();
    for pair in index.chunks(2) {
        let (first, count) = match pair {
            [first, count] => (*first, *count),
            _ => return Err(Error::InvalidXref),
        };
        for i in 0..count.max(0) {
            let Some(bytes) = rows.next() else {
                break;
            };
            let (f1, rest) = bytes.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            // Type defaults to 1 when its field width is zero
            let kind = if widths[0] == 0 { 1 } else { be_int(f1) };
            let id = (first + i) as u32;
            let entry = match kind {
                0 => XRefEntry::Free {
                    generation: be_int(f3) as u16,
                },
                1 => XRefEntry::Uncompressed {
                    offset: be_int(f2),
                    generation: be_int(f3) as u16,
                },
                2 => XRefEntry::Compressed {
                    stream: be_int(f2) as u32,
                    index: be_int(f3) as u32,
                },
                _ => continue,
            };
            entries.insert(id, entry);
        }
    }

    Ok(Section {
        entries,
        trailer: dict,
        kind: XRefKind::Stream,
    })
}

fn be_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

/// Extract the objects stored in an object stream (`/Type /ObjStm`).
pub fn parse_object_stream(stream: &Object) -> Result<Vec<(u32, Object)>> {
    let dict = stream.as_dict().ok_or_else(|| Error::InvalidObjectType {
        expected: "Stream".to_string(),
        found: stream.type_name().to_string(),
    })?;
    let n = dict.get("N").and_then(Object::as_integer).unwrap_or(0).max(0) as usize;
    let first = dict.get("First").and_then(Object::as_integer).unwrap_or(0).max(0) as usize;
    let data = stream.decode_stream_data()?;
    let body = data
        .get(first..)
        .ok_or_else(|| Error::InvalidPdf("object stream /First beyond data".into()))?;

    let mut header = &data[..first.min(data.len())];
    let mut offsets = Vec::with_capacity(n);
    for _ in 0..n {
        let (rest, id) = read_int(header).map_err(|_| Error::InvalidPdf("object stream header".into()))?;
        let (rest, off) = read_int(rest).map_err(|_| Error::InvalidPdf("object stream header".into()))?;
        offsets.push((id as u32, off.max(0) as usize));
        header = rest;
    }

    let mut objects = Vec::with_capacity(n);
    for (id, off) in offsets {
        let input = body
            .get(off..)
            .ok_or_else(|| Error::InvalidPdf(format!("object {} offset outside object stream", id)))?;
        let (_, obj) = parse_object(input).map_err(|_| Error::ParseError {
            offset: first + off,
            reason: format!("object {} in object stream", id),
        })?;
        objects.push((id, obj));
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSIC: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\nxref\n0 2\n0000000000 65535 f \n0000000009 00000 n \ntrailer\n<< /Size 2 /Root 1 0 R >>\nstartxref\n45\n%%EOF\n";

    #[test]
    fn test_find_startxref() {
        assert_eq!(find_startxref(CLASSIC).unwrap(), 45);
        assert!(find_startxref(b"%PDF-1.4 nothing").is_err());
    }

    #[test]
    fn test_parse_classic_table() {
        let table = parse_xref_chain(CLASSIC).unwrap();
        assert_eq!(table.kind(), XRefKind::Table);
        assert_eq!(
            table.get(1),
            Some(&XRefEntry::Uncompressed {
                offset: 9,
                generation: 0
            })
        );
        assert!(matches!(table.get(0), Some(XRefEntry::Free { .. })));
        assert_eq!(table.size(), 2);
        assert_eq!(table.in_use().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_newest_section_wins() {
        let mut data = CLASSIC.to_vec();
        let obj_offset = data.len();
        data.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /V 2 >>\nendobj\n");
        let xref_offset = data.len();
        data.extend_from_slice(
            format!(
                "xref\n1 1\n{:010} 00000 n \ntrailer\n<< /Size 2 /Root 1 0 R /Prev 45 >>\nstartxref\n{}\n%%EOF\n",
                obj_offset, xref_offset
            )
            .as_bytes(),
        );
        let table = parse_xref_chain(&data).unwrap();
        assert_eq!(
            table.get(1),
            Some(&XRefEntry::Uncompressed {
                offset: obj_offset as u64,
                generation: 0
            })
        );
        assert!(table.get(0).is_some());
        assert_eq!(table.trailer().get("Prev").and_then(Object::as_integer), Some(45));
    }

    #[test]
    fn test_be_int() {
        assert_eq!(be_int(&[0x01, 0x00]), 256);
        assert_eq!(be_int(&[]), 0);
    }
}
