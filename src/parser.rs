//! PDF object parser.
//!
//! Recursive descent over lexer tokens. Composite objects (arrays,
//! dictionaries, streams) recurse through [`parse_object`].

use nom::IResult;

use crate::error::{Error, Result};
use crate::lexer::{skip_ws, token, Token};
use crate::object::{Dict, Object, ObjectRef};

/// Decode escape sequences in a literal string body.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let c = raw[i];
        if c != b'\\' || i + 1 >= raw.len() {
            out.push(c);
            i += 1;
            continue;
        }
        let next = raw[i + 1];
        i += 2;
        match next {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'\r' => {
                // Line continuation, CRLF counts as one EOL
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'\n' => {},
            b'0'..=b'7' => {
                let mut value = (next - b'0') as u32;
                let mut digits = 1;
                while digits < 3 && i < raw.len() && (b'0'..=b'7').contains(&raw[i]) {
                    value = value * 8 + (raw[i] - b'0') as u32;
                    i += 1;
                    digits += 1;
                }
                out.push((value & 0xFF) as u8);
            },
            other => out.push(other),
        }
    }
    out
}

/// Decode a hex string body, ignoring whitespace. An odd final digit is padded with 0.
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .copied()
        .filter(|c| !c.is_ascii_whitespace() && *c != 0)
        .collect();
    let mut out = Vec::with_capacity(digits.len().div_ceil(2));
    for pair in digits.chunks(2) {
        let hi = hex_value(pair[0])?;
        let lo = match pair.get(1) {
            Some(&c) => hex_value(c)?,
            None => 0,
        };
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn hex_value(c: u8) -> Result<u8> {
    (c as char)
        .to_digit(16)
        .map(|d| d as u8)
        .ok_or_else(|| Error::Decode(format!("invalid hex digit 0x{:02x}", c)))
}

fn tag_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// Parse one direct object, an indirect reference, or a stream.
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, tok) = token(input)?;
    match tok {
        Token::Null => Ok((rest, Object::Null)),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Integer(i) => {
            // `n g R` is a reference, otherwise a plain integer
            if let Ok((after_gen, Token::Integer(gen))) = token(rest) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if i >= 0 && (0..=u16::MAX as i64).contains(&gen) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(i as u32, gen as u16))));
                    }
                }
            }
            Ok((rest, Object::Integer(i)))
        },
        Token::Real(r) => Ok((rest, Object::Real(r))),
        Token::LiteralString(raw) => Ok((rest, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(raw) => match decode_hex(raw) {
            Ok(bytes) => Ok((rest, Object::String(bytes))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::HexDigit,
            ))),
        },
        Token::Name(name) => Ok((rest, Object::Name(name))),
        Token::ArrayStart => parse_array(rest),
        Token::DictStart => {
            let (after_dict, dict) = parse_dictionary(rest)?;
            match token(after_dict) {
                Ok((stream_body, Token::StreamStart)) => {
                    let (after_stream, data) = parse_stream_data(stream_body, &dict)?;
                    Ok((
                        after_stream,
                        Object::Stream {
                            dict,
                            data: bytes::Bytes::from(data),
                        },
                    ))
                },
                _ => Ok((after_dict, Object::Dictionary(dict))),
            }
        },
        _ => Err(tag_error(input)),
    }
}

fn parse_array(mut input: &[u8]) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    loop {
        if let Ok((rest, Token::ArrayEnd)) = token(input) {
            return Ok((rest, Object::Array(items)));
        }
        let (rest, obj) = parse_object(input)?;
        items.push(obj);
        input = rest;
    }
}

fn parse_dictionary(mut input: &[u8]) -> IResult<&[u8], Dict> {
    let mut dict = Dict::new();
    loop {
        let (rest, tok) = token(input)?;
        match tok {
            Token::DictEnd => return Ok((rest, dict)),
            Token::Name(key) => {
                let (rest, value) = parse_object(rest)?;
                // A null value is equivalent to an absent key
                if !value.is_null() {
                    dict.insert(key, value);
                }
                input = rest;
            },
            _ => return Err(tag_error(input)),
        }
    }
}

fn parse_stream_data<'a>(input: &'a [u8], dict: &Dict) -> IResult<&'a [u8], Vec<u8>> {
    let body = if let Some(rest) = input.strip_prefix(b"\r\n") {
        rest
    } else if let Some(rest) = input.strip_prefix(b"\n").or_else(|| input.strip_prefix(b"\r")) {
        rest
    } else {
        input
    };

    // /Length given as an indirect reference is not resolvable here; fall
    // back to scanning for the keyword in that case.
    if let Some(length) = dict.get("Length").and_then(Object::as_integer) {
        let length = length.max(0) as usize;
        if body.len() >= length {
            let (rest, _) = skip_ws(&body[length..])?;
            if let Some(rest) = rest.strip_prefix(b"endstream") {
                return Ok((rest, body[..length].to_vec()));
            }
            log::debug!("stream /Length {} does not end at endstream, scanning", length);
        }
    }

    let pos = find_keyword(body, b"endstream").ok_or_else(|| {
        nom::Err::Error(nom::error::Error::new(body, nom::error::ErrorKind::Eof))
    })?;
    let mut end = pos;
    if end > 0 && body[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && body[end - 1] == b'\r' {
        end -= 1;
    }
    Ok((&body[pos + b"endstream".len()..], body[..end].to_vec()))
}

/// Find the first occurrence of `keyword` in `haystack`.
pub fn find_keyword(haystack: &[u8], keyword: &[u8]) -> Option<usize> {
    haystack.windows(keyword.len()).position(|w| w == keyword)
}

/// Find the last occurrence of `keyword` in `haystack`.
pub fn rfind_keyword(haystack: &[u8], keyword: &[u8]) -> Option<usize> {
    haystack.windows(keyword.len()).rposition(|w| w == keyword)
}

/// Parse `n g obj ... endobj` starting at `offset` of `data`.
pub fn parse_indirect_object(data: &[u8], offset: usize) -> Result<(ObjectRef, Object)> {
    let input = data.get(offset..).ok_or(Error::ParseError {
        offset,
        reason: "offset beyond end of file".to_string(),
    })?;
    let fail = |reason: &str| Error::ParseError {
        offset,
        reason: reason.to_string(),
    };

    let (rest, id) = match token(input) {
        Ok((rest, Token::Integer(id))) if id >= 0 => (rest, id as u32),
        _ => return Err(fail("expected object number")),
    };
    let (rest, gen) = match token(rest) {
        Ok((rest, Token::Integer(gen))) if (0..=u16::MAX as i64).contains(&gen) => {
            (rest, gen as u16)
        },
        _ => return Err(fail("expected generation number")),
    };
    let rest = match token(rest) {
        Ok((rest, Token::ObjStart)) => rest,
        _ => return Err(fail("expected 'obj' keyword")),
    };
    let (_, object) = parse_object(rest).map_err(|e| fail(&format!("malformed object: {:?}", e)))?;
    Ok((ObjectRef::new(id, gen), object))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Object {
        parse_object(input).unwrap().1
    }

    #[test]
    fn test_literal_escapes() {
        assert_eq!(decode_literal_string_escapes(b"a\\nb"), b"a\nb");
        assert_eq!(decode_literal_string_escapes(b"\\(x\\)"), b"(x)");
        assert_eq!(decode_literal_string_escapes(b"\\247"), vec![0xA7]);
        assert_eq!(decode_literal_string_escapes(b"line\\\r\nnext"), b"linenext");
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex(b"48 65 6C").unwrap(), b"Hel");
        assert_eq!(decode_hex(b"7").unwrap(), vec![0x70]);
        assert!(decode_hex(b"zz").is_err());
    }

    #[test]
    fn test_reference_vs_integers() {
        assert_eq!(parse(b"12 0 R"), Object::Reference(ObjectRef::new(12, 0)));
        let arr = parse(b"[1 2 3 0 R 4]");
        let items = arr.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[2], Object::Reference(ObjectRef::new(3, 0)));
    }

    #[test]
    fn test_dictionary_with_nested_values() {
        let obj = parse(b"<< /Type /Sig /ByteRange [0 10 20 30] /Sub << /A null /B true >> >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("Type").unwrap().as_name(), Some("Sig"));
        assert_eq!(dict.get("ByteRange").unwrap().as_array().unwrap().len(), 4);
        let sub = dict.get("Sub").unwrap().as_dict().unwrap();
        assert!(sub.get("A").is_none());
        assert_eq!(sub.get("B").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn test_stream_with_length() {
        let obj = parse(b"<< /Length 5 >>\nstream\nhello\nendstream");
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"hello"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_with_indirect_length() {
        let obj = parse(b"<< /Length 9 0 R >>\r\nstream\r\nab\r\ncd\r\nendstream");
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"ab\r\ncd"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_indirect_object_at_offset() {
        let data = b"junk 7 0 obj\n<< /Type /Catalog >>\nendobj";
        let (r, obj) = parse_indirect_object(data, 5).unwrap();
        assert_eq!(r, ObjectRef::new(7, 0));
        assert_eq!(obj.as_dict().unwrap().get("Type").unwrap().as_name(), Some("Catalog"));

        match parse_indirect_object(data, 0) {
            Err(Error::ParseError { offset, .. }) => assert_eq!(offset, 0),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_find_keywords() {
        assert_eq!(find_keyword(b"a startxref b startxref", b"startxref"), Some(2));
        assert_eq!(rfind_keyword(b"a startxref b startxref", b"startxref"), Some(14));
    }
}
