//! PDF object serialization.
//!
//! Serializes PDF objects to their byte representation according to
//! ISO 32000-1:2008, section 7.3. Dictionary keys are written in sorted
//! order so the same object always produces the same bytes, which the
//! signing path depends on when a revision is written twice.

use std::io::Write;

use crate::object::{Dict, Object};

/// Serializer for PDF objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Whether to use compact formatting (minimal whitespace)
    compact: bool,
}

impl ObjectSerializer {
    /// Create a new object serializer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (for debugging).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).to_string()
    }

    /// Serialize an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(&self, id: u32, gen: u16, obj: &Object) -> Vec<u8> {
        let mut buf = format!("{} {} obj\n", id, gen).into_bytes();
        self.write_object(&mut buf, obj);
        buf.extend_from_slice(b"\nendobj\n");
        buf
    }

    /// Serialize an indirect dictionary followed by entries whose values are
    /// written verbatim. Used for values patched in place later, such as
    /// `/ByteRange` and `/Contents` placeholders.
    pub fn serialize_indirect_with_raw(&self, id: u32, gen: u16, dict: &Dict, raw: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = format!("{} {} obj\n", id, gen).into_bytes();
        buf.extend_from_slice(b"<<");
        self.write_entries(&mut buf, dict);
        for (key, value) in raw {
            self.separator(&mut buf);
            self.write_name(&mut buf, key);
            buf.push(b' ');
            buf.extend_from_slice(value);
        }
        if !self.compact {
            buf.push(b'\n');
        }
        buf.extend_from_slice(b">>\nendobj\n");
        buf
    }

    /// Write a serialized object to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W, obj: &Object) -> std::io::Result<()> {
        w.write_all(&self.serialize(obj))
    }

    fn write_object(&self, buf: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => buf.extend_from_slice(b"null"),
            Object::Boolean(b) => buf.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => buf.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => self.write_real(buf, *r),
            Object::String(s) => self.write_string(buf, s),
            Object::Name(n) => self.write_name(buf, n),
            Object::Array(arr) => self.write_array(buf, arr),
            Object::Dictionary(dict) => self.write_dictionary(buf, dict),
            Object::Stream { dict, data } => self.write_stream(buf, dict, data),
            Object::Reference(r) => buf.extend_from_slice(format!("{} {} R", r.id, r.gen).as_bytes()),
        }
    }

    /// Write a real number with at most five decimals, trailing zeros trimmed.
    fn write_real(&self, buf: &mut Vec<u8>, value: f64) {
        if value.fract() == 0.0 {
            buf.extend_from_slice((value as i64).to_string().as_bytes());
        } else {
            let formatted = format!("{:.5}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            buf.extend_from_slice(trimmed.as_bytes());
        }
    }

    /// Literal `(...)` for printable ASCII, hex `<...>` otherwise.
    fn write_string(&self, buf: &mut Vec<u8>, data: &[u8]) {
        let is_printable = data
            .iter()
            .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

        if is_printable {
            buf.push(b'(');
            for &byte in data {
                match byte {
                    b'(' => buf.extend_from_slice(b"\\("),
                    b')' => buf.extend_from_slice(b"\\)"),
                    b'\\' => buf.extend_from_slice(b"\\\\"),
                    b'\n' => buf.extend_from_slice(b"\\n"),
                    b'\r' => buf.extend_from_slice(b"\\r"),
                    b'\t' => buf.extend_from_slice(b"\\t"),
                    _ => buf.push(byte),
                }
            }
            buf.push(b')');
        } else {
            buf.push(b'<');
            buf.extend_from_slice(hex::encode_upper(data).as_bytes());
            buf.push(b'>');
        }
    }

    /// Names start with `/`; delimiters, `#` and bytes outside `!`..`~` are
    /// written as `#xx`.
    fn write_name(&self, buf: &mut Vec<u8>, name: &str) {
        buf.push(b'/');
        for byte in name.bytes() {
            match byte {
                b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#' => {
                    buf.extend_from_slice(format!("#{:02X}", byte).as_bytes())
                },
                b'!'..=b'~' => buf.push(byte),
                _ => buf.extend_from_slice(format!("#{:02X}", byte).as_bytes()),
            }
        }
    }

    fn write_array(&self, buf: &mut Vec<u8>, arr: &[Object]) {
        buf.push(b'[');
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                buf.push(b' ');
            }
            self.write_object(buf, obj);
        }
        buf.push(b']');
    }

    fn separator(&self, buf: &mut Vec<u8>) {
        if self.compact {
            buf.push(b' ');
        } else {
            buf.extend_from_slice(b"\n  ");
        }
    }

    fn write_entries(&self, buf: &mut Vec<u8>, dict: &Dict) {
        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();
        for key in keys {
            if let Some(value) = dict.get(key) {
                self.separator(buf);
                self.write_name(buf, key);
                buf.push(b' ');
                self.write_object(buf, value);
            }
        }
    }

    fn write_dictionary(&self, buf: &mut Vec<u8>, dict: &Dict) {
        buf.extend_from_slice(b"<<");
        self.write_entries(buf, dict);
        if self.compact {
            buf.extend_from_slice(b" >>");
        } else {
            if !dict.is_empty() {
                buf.push(b'\n');
            }
            buf.extend_from_slice(b">>");
        }
    }

    /// `/Length` always reflects `data`, whatever the dictionary says.
    fn write_stream(&self, buf: &mut Vec<u8>, dict: &Dict, data: &[u8]) {
        let mut dict_with_length = dict.clone();
        dict_with_length.insert("Length".to_string(), Object::Integer(data.len() as i64));
        self.write_dictionary(buf, &dict_with_length);
        buf.extend_from_slice(b"\nstream\n");
        buf.extend_from_slice(data);
        buf.extend_from_slice(b"\nendstream");
    }
}
