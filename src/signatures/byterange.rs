//! ByteRange handling for PDF signatures.
//!
//! A signature covers two spans of the file: everything before the
//! `/Contents` hex string and everything after it. The `/ByteRange` array
//! `[offset1 length1 offset2 length2]` names them. Both the array and the
//! hex string are written as fixed-width placeholders first and patched in
//! place once the final layout is known.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result};
use crate::object::Object;

/// Placeholder written for `/ByteRange` before offsets are known.
pub const BYTE_RANGE_PLACEHOLDER: &str = "[0 0000000000 0000000000 0000000000]";

/// The two signed spans of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Start of the first span (always 0 for well-formed signatures)
    pub offset1: usize,
    /// Length of the first span
    pub length1: usize,
    /// Start of the second span
    pub offset2: usize,
    /// Length of the second span
    pub length2: usize,
}

impl ByteRange {
    /// Build the range for a `/Contents` value occupying
    /// `contents_offset..contents_offset + contents_len` of a file of `file_len` bytes.
    pub fn around_contents(file_len: usize, contents_offset: usize, contents_len: usize) -> Result<Self> {
        let offset2 = contents_offset + contents_len;
        if offset2 > file_len {
            return Err(Error::InvalidPdf(format!(
                "/Contents ends at {} beyond file size {}",
                offset2, file_len
            )));
        }
        Ok(Self {
            offset1: 0,
            length1: contents_offset,
            offset2,
            length2: file_len - offset2,
        })
    }

    /// Read a `/ByteRange` array.
    pub fn from_object(obj: &Object) -> Result<Self> {
        let items = obj
            .as_array()
            .ok_or_else(|| Error::InvalidPdf("/ByteRange is not an array".to_string()))?;
        let values: Vec<usize> = items
            .iter()
            .filter_map(Object::as_integer)
            .filter(|v| *v >= 0)
            .map(|v| v as usize)
            .collect();
        if items.len() != 4 || values.len() != 4 {
            return Err(Error::InvalidPdf(format!(
                "/ByteRange must hold 4 non-negative integers, got {:?}",
                items
            )));
        }
        Ok(Self {
            offset1: values[0],
            length1: values[1],
            offset2: values[2],
            length2: values[3],
        })
    }

    /// The array as PDF integers.
    pub fn to_array(&self) -> [i64; 4] {
        [
            self.offset1 as i64,
            self.length1 as i64,
            self.offset2 as i64,
            self.length2 as i64,
        ]
    }

    /// Byte span excluded from the signature (the `/Contents` string, brackets included).
    pub fn gap(&self) -> std::ops::Range<usize> {
        self.offset1 + self.length1..self.offset2
    }

    /// Offset one past the end of the second span.
    pub fn end(&self) -> usize {
        self.offset2 + self.length2
    }

    /// Whether the spans run from the first to the last byte of a file of `file_len` bytes.
    pub fn covers_whole(&self, file_len: usize) -> bool {
        self.offset1 == 0 && self.end() == file_len
    }

    /// Structural checks against the file the range belongs to.
    pub fn validate(&self, file_len: usize) -> Result<()> {
        if self.offset1 != 0 {
            return Err(Error::InvalidPdf(format!("ByteRange must start at 0, got {}", self.offset1)));
        }
        if self.offset1 + self.length1 > self.offset2 {
            return Err(Error::InvalidPdf(format!(
                "ByteRange first span ({}) overlaps second span start ({})",
                self.length1, self.offset2
            )));
        }
        if self.end() > file_len {
            return Err(Error::InvalidPdf(format!(
                "ByteRange ends at {} beyond file size {}",
                self.end(),
                file_len
            )));
        }
        Ok(())
    }

    /// Concatenate the two spans of `data`.
    pub fn signed_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.validate(data.len())?;
        let mut out = Vec::with_capacity(self.length1 + self.length2);
        out.extend_from_slice(&data[self.offset1..self.offset1 + self.length1]);
        out.extend_from_slice(&data[self.offset2..self.end()]);
        Ok(out)
    }

    /// Stream the two spans out of a seekable source without buffering them.
    pub fn reader<R: Read + Seek>(&self, inner: R) -> ByteRangeReader<R> {
        ByteRangeReader {
            inner,
            spans: [(self.offset1, self.length1), (self.offset2, self.length2)],
            span: 0,
            remaining: None,
        }
    }

    /// Format for in-place patching of [`BYTE_RANGE_PLACEHOLDER`]; trailing
    /// spaces keep the width unchanged.
    pub fn format_padded(&self) -> Result<String> {
        let [a, b, c, d] = self.to_array();
        let text = format!("[{} {} {} {}]", a, b, c, d);
        let width = BYTE_RANGE_PLACEHOLDER.len();
        if text.len() > width {
            return Err(Error::InvalidPdf(format!("ByteRange {} does not fit its placeholder", text)));
        }
        Ok(format!("{:<width$}", text, width = width))
    }
}

/// Reads the concatenation of the two spans of a [`ByteRange`].
pub struct ByteRangeReader<R> {
    inner: R,
    spans: [(usize, usize); 2],
    span: usize,
    remaining: Option<usize>,
}

impl<R: Read + Seek> Read for ByteRangeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.span < self.spans.len() {
            let (offset, len) = self.spans[self.span];
            let remaining = match self.remaining {
                Some(r) => r,
                None => {
                    self.inner.seek(SeekFrom::Start(offset as u64))?;
                    self.remaining = Some(len);
                    len
                },
            };
            if remaining == 0 {
                self.span += 1;
                self.remaining = None;
                continue;
            }
            let want = remaining.min(buf.len());
            let n = self.inner.read(&mut buf[..want])?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "file shorter than its ByteRange",
                ));
            }
            self.remaining = Some(remaining - n);
            return Ok(n);
        }
        Ok(0)
    }
}

/// Sizes and fills the `/Contents` placeholder.
#[derive(Debug, Clone, Copy)]
pub struct ByteRangeCalculator {
    /// Bytes of DER the placeholder can hold
    reserved: usize,
}

impl ByteRangeCalculator {
    /// Reserve room for a container of `reserved` DER bytes.
    pub fn new(reserved: usize) -> Self {
        Self { reserved }
    }

    /// DER bytes the placeholder holds.
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Width of the `/Contents` value on disk: two hex digits per byte plus brackets.
    pub fn placeholder_len(&self) -> usize {
        self.reserved * 2 + 2
    }

    /// Zero-filled hex string.
    pub fn generate_placeholder(&self) -> String {
        format!("<{}>", "0".repeat(self.reserved * 2))
    }

    /// The bytes that replace the placeholder: `<`, the container in upper-case
    /// hex, zero padding, `>`.
    pub fn encode_container(&self, container: &[u8]) -> Result<Vec<u8>> {
        if container.len() > self.reserved {
            return Err(Error::ContainerTooLarge {
                reserved: self.reserved,
                actual: container.len(),
            });
        }
        let mut out = Vec::with_capacity(self.placeholder_len());
        out.push(b'<');
        out.extend_from_slice(hex::encode_upper(container).as_bytes());
        out.resize(self.placeholder_len() - 1, b'0');
        out.push(b'>');
        Ok(out)
    }

    /// Write `container` over the placeholder at `contents_offset`, padding with zeros.
    pub fn insert_container(&self, pdf_data: &mut [u8], contents_offset: usize, container: &[u8]) -> Result<()> {
        let encoded = self.encode_container(container)?;
        let end = contents_offset + self.placeholder_len();
        if end > pdf_data.len() || pdf_data[contents_offset] != b'<' || pdf_data[end - 1] != b'>' {
            return Err(Error::InvalidPdf(format!(
                "no /Contents placeholder of {} bytes at offset {}",
                self.placeholder_len(),
                contents_offset
            )));
        }
        pdf_data[contents_offset..end].copy_from_slice(&encoded);
        Ok(())
    }

    /// Locate the `<` that opens `/Contents` in a signature dictionary starting at `sig_dict_offset`.
    pub fn find_contents_offset(pdf_data: &[u8], sig_dict_offset: usize) -> Option<usize> {
        let window_end = (sig_dict_offset + 4096).min(pdf_data.len());
        let window = pdf_data.get(sig_dict_offset..window_end)?;
        let key = b"/Contents";
        let pos = window.windows(key.len()).position(|w| w == key)?;
        window[pos + key.len()..]
            .iter()
            .position(|c| !c.is_ascii_whitespace())
            .map(|skip| sig_dict_offset + pos + key.len() + skip)
            .filter(|&at| pdf_data[at] == b'<')
    }
}
