//! PDF object types.
//!
//! Only the filters needed to read cross-reference streams, object streams
//! and validation streams are decoded: FlateDecode, optionally with a PNG or
//! TIFF predictor.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::{DeflateDecoder, ZlibDecoder};

use crate::error::{Error, Result};

/// Dictionary type shared by dictionaries and stream headers.
pub type Dict = HashMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (starting with /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dict),
    /// Stream (dictionary + data)
    Stream {
        /// Stream dictionary
        dict: Dict,
        /// Raw (still encoded) stream data
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Shorthand for a name object.
    pub fn name(name: &str) -> Object {
        Object::Name(name.to_string())
    }

    /// Shorthand for a reference object.
    pub fn reference(r: ObjectRef) -> Object {
        Object::Reference(r)
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Decode stream data using the filters in the stream dictionary.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        let Object::Stream { dict, data } = self else {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: self.type_name().to_string(),
            });
        };

        let filters = dict.get("Filter").map(filter_names).unwrap_or_default();
        let mut decoded = data.to_vec();
        for filter in &filters {
            decoded = match filter.as_str() {
                "FlateDecode" | "Fl" => inflate(&decoded)?,
                other => return Err(Error::Unsupported(format!("stream filter {}", other))),
            };
        }

        if let Some(params) = decode_params(dict.get("DecodeParms")) {
            decoded = params.unpredict(&decoded)?;
        }
        Ok(decoded)
    }
}

fn filter_names(filter: &Object) -> Vec<String> {
    match filter {
        Object::Name(name) => vec![name.clone()],
        Object::Array(arr) => arr
            .iter()
            .filter_map(|obj| obj.as_name().map(str::to_string))
            .collect(),
        _ => vec![],
    }
}

fn inflate(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    if ZlibDecoder::new(input).read_to_end(&mut output).is_ok() {
        return Ok(output);
    }
    // Some producers emit raw deflate without the zlib wrapper
    output.clear();
    DeflateDecoder::new(input)
        .read_to_end(&mut output)
        .map_err(|e| Error::Decode(format!("FlateDecode: {}", e)))?;
    Ok(output)
}

/// Predictor parameters from /DecodeParms.
#[derive(Debug, Clone, Copy)]
struct DecodeParams {
    predictor: i64,
    columns: usize,
    colors: usize,
    bits_per_component: usize,
}

fn decode_params(params: Option<&Object>) -> Option<DecodeParams> {
    let dict = match params? {
        Object::Dictionary(d) => d,
        Object::Array(arr) => arr.iter().find_map(|obj| obj.as_dict())?,
        _ => return None,
    };
    let get = |key: &str, default: i64| dict.get(key).and_then(Object::as_integer).unwrap_or(default);
    let predictor = get("Predictor", 1);
    if predictor <= 1 {
        return None;
    }
    Some(DecodeParams {
        predictor,
        columns: get("Columns", 1).max(1) as usize,
        colors: get("Colors", 1).max(1) as usize,
        bits_per_component: get("BitsPerComponent", 8).max(1) as usize,
    })
}

impl DecodeParams {
    fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    fn pixel_bytes(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }

    fn unpredict(&self, data: &[u8]) -> Result<Vec<u8>> {
        let row = self.row_bytes();
        let bpp = self.pixel_bytes();

        if self.predictor == 2 {
            // TIFF predictor 2, 8-bit components only
            let mut out = data.to_vec();
            for line in out.chunks_mut(row) {
                for i in bpp..line.len() {
                    line[i] = line[i].wrapping_add(line[i - bpp]);
                }
            }
            return Ok(out);
        }

        let mut out = Vec::with_capacity(data.len());
        let mut prev = vec![0u8; row];
        for chunk in data.chunks(row + 1) {
            if chunk.len() < 2 {
                break;
            }
            let tag = chunk[0];
            let mut line = chunk[1..].to_vec();
            line.resize(row, 0);
            for i in 0..row {
                let left = if i >= bpp { line[i - bpp] } else { 0 };
                let up = prev[i];
                let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
                line[i] = match tag {
                    0 => line[i],
                    1 => line[i].wrapping_add(left),
                    2 => line[i].wrapping_add(up),
                    3 => line[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                    4 => line[i].wrapping_add(paeth(left, up, up_left)),
                    other => {
                        return Err(Error::Decode(format!("invalid PNG predictor tag {}", other)))
                    },
                };
            }
            out.extend_from_slice(&line);
            prev = line;
        }
        Ok(out)
    }
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
