//! PDF document model.
//!
//! A read-only view of a complete file held in memory: cross-reference
//! data, object loading (including object streams), the page tree, AcroForm
//! fields and the signatures already embedded. Writing goes through
//! [`crate::writer::IncrementalUpdate`], which appends to [`PdfDocument::data`].
//!
//! # Example
//!
//! ```no_run
//! use pades_oxide::document::PdfDocument;
//!
//! let doc = PdfDocument::open("contract.pdf")?;
//! println!("PDF {}.{}, {} pages", doc.version().0, doc.version().1, doc.page_count()?);
//! for sig in doc.signatures()? {
//!     println!("{} covers {} bytes", sig.field_name, sig.byte_range.end());
//! }
//! # Ok::<(), pades_oxide::error::Error>(())
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::parser::{find_keyword, parse_indirect_object};
use crate::signatures::byterange::ByteRange;
use crate::signatures::types::{SignatureKind, SignatureSubFilter};
use crate::xref::{parse_object_stream, parse_xref_chain, CrossRefTable, XRefEntry};

/// Maximum depth when following chains of references
const MAX_RESOLVE_DEPTH: usize = 32;

/// Maximum depth of page and field trees
const MAX_TREE_DEPTH: usize = 64;

/// The interactive form dictionary and where it lives.
#[derive(Debug, Clone)]
pub struct AcroForm {
    /// Indirect object holding the dictionary, `None` when inline in the catalog
    pub reference: Option<ObjectRef>,
    /// The dictionary itself
    pub dict: Dict,
}

/// A terminal form field.
#[derive(Debug, Clone)]
pub struct FormField {
    /// Fully qualified name (`parent.child`)
    pub name: String,
    /// Field object
    pub reference: ObjectRef,
    /// Field dictionary (merged field/widget when they share an object)
    pub dict: Dict,
    /// Field type, inherited from ancestors when absent
    pub field_type: Option<String>,
}

impl FormField {
    /// `/FT /Sig`
    pub fn is_signature(&self) -> bool {
        self.field_type.as_deref() == Some("Sig")
    }

    /// The raw `/V` entry.
    pub fn value(&self) -> Option<&Object> {
        self.dict.get("V")
    }
}

/// A signature already present in the document.
#[derive(Debug, Clone)]
pub struct EmbeddedSignature {
    /// Fully qualified field name
    pub field_name: String,
    /// Field object
    pub field_ref: ObjectRef,
    /// Signature dictionary object, `None` when stored inline in the field
    pub dict_ref: Option<ObjectRef>,
    /// Signature dictionary
    pub dict: Dict,
    /// Signed spans
    pub byte_range: ByteRange,
    /// Decoded `/Contents`, including trailing zero padding
    pub contents: Vec<u8>,
    /// `/SubFilter`
    pub sub_filter: Option<SignatureSubFilter>,
    /// Ordinary signature or document timestamp
    pub kind: SignatureKind,
}

impl EmbeddedSignature {
    /// Whether this is a `/DocTimeStamp`.
    pub fn is_document_timestamp(&self) -> bool {
        self.kind == SignatureKind::DocumentTimestamp
    }
}

/// PDF document held in memory.
pub struct PdfDocument {
    data: Bytes,
    version: (u8, u8),
    xref: CrossRefTable,
    object_cache: RefCell<HashMap<ObjectRef, Object>>,
    object_streams: RefCell<HashMap<u32, HashMap<u32, Object>>>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("len", &self.data.len())
            .field("xref_kind", &self.xref.kind())
            .field("cached_objects", &self.object_cache.borrow().len())
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    /// Read and parse a file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("opening {}", path.display());
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Parse a complete file.
    ///
    /// Encrypted documents are rejected: signing them would need the
    /// security handler to encrypt every string written in the new revision.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let version = parse_header(&data)?;
        let xref = parse_xref_chain(&data)?;
        if xref.trailer().contains_key("Encrypt") {
            return Err(Error::Unsupported("encrypted documents".to_string()));
        }
        if !xref.trailer().contains_key("Root") {
            return Err(Error::InvalidPdf("Trailer missing /Root entry".to_string()));
        }
        log::debug!("parsed PDF {}.{}, {} bytes, /Size {}", version.0, version.1, data.len(), xref.size());
        Ok(Self {
            data,
            version,
            xref,
            object_cache: RefCell::new(HashMap::new()),
            object_streams: RefCell::new(HashMap::new()),
        })
    }

    /// The whole file.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the file bytes.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// File length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty buffer (never the case for a parsed document).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Header version (major, minor).
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Cross-reference data.
    pub fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// Trailer dictionary of the newest revision.
    pub fn trailer(&self) -> &Dict {
        self.xref.trailer()
    }

    /// Load an object by reference. Free or missing entries yield
    /// [`Error::ObjectNotFound`].
    pub fn load_object(&self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(obj) = self.object_cache.borrow().get(&obj_ref) {
            return Ok(obj.clone());
        }
        let object = match self.xref.get(obj_ref.id) {
            Some(XRefEntry::Uncompressed { offset, generation }) if *generation == obj_ref.gen => {
                let offset = usize::try_from(*offset).map_err(|_| Error::InvalidXref)?;
                let (found, object) = parse_indirect_object(&self.data, offset)?;
                if found != obj_ref {
                    log::warn!("xref points {} at {}, found {}", obj_ref, offset, found);
                }
                object
            },
            Some(XRefEntry::Compressed { stream, .. }) if obj_ref.gen == 0 => self.load_compressed(obj_ref, *stream)?,
            _ => return Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
        };
        self.object_cache.borrow_mut().insert(obj_ref, object.clone());
        Ok(object)
    }

    fn load_compressed(&self, obj_ref: ObjectRef, stream_id: u32) -> Result<Object> {
        if !self.object_streams.borrow().contains_key(&stream_id) {
            let stream = self.load_object(ObjectRef::new(stream_id, 0))?;
            let objects: HashMap<u32, Object> = parse_object_stream(&stream)?.into_iter().collect();
            log::debug!("object stream {} holds {} objects", stream_id, objects.len());
            self.object_streams.borrow_mut().insert(stream_id, objects);
        }
        self.object_streams
            .borrow()
            .get(&stream_id)
            .and_then(|objects| objects.get(&obj_ref.id))
            .cloned()
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))
    }

    /// Follow references until a direct object is reached.
    pub fn resolve(&self, obj: &Object) -> Result<Object> {
        let mut current = obj.clone();
        for _ in 0..MAX_RESOLVE_DEPTH {
            match current {
                Object::Reference(r) => current = self.load_object(r)?,
                other => return Ok(other),
            }
        }
        Err(Error::InvalidPdf("reference chain too deep".to_string()))
    }

    /// Resolve `dict[key]` to a dictionary, `None` when absent or not a dictionary.
    pub fn resolve_dict(&self, dict: &Dict, key: &str) -> Result<Option<Dict>> {
        match dict.get(key) {
            Some(obj) => Ok(self.resolve(obj)?.as_dict().cloned()),
            None => Ok(None),
        }
    }

    /// Reference of the document catalog.
    pub fn root_ref(&self) -> Result<ObjectRef> {
        self.trailer()
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("/Root is not a reference".to_string()))
    }

    /// The document catalog.
    pub fn catalog(&self) -> Result<Dict> {
        let root = self.load_object(self.root_ref()?)?;
        root.as_dict().cloned().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: root.type_name().to_string(),
        })
    }

    /// Page references in document order.
    pub fn pages(&self) -> Result<Vec<ObjectRef>> {
        let pages_ref = self
            .catalog()?
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("Catalog missing /Pages reference".to_string()))?;
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        self.collect_pages(pages_ref, 0, &mut visited, &mut pages)?;
        Ok(pages)
    }

    fn collect_pages(
        &self,
        node_ref: ObjectRef,
        depth: usize,
        visited: &mut HashSet<ObjectRef>,
        pages: &mut Vec<ObjectRef>,
    ) -> Result<()> {
        if depth > MAX_TREE_DEPTH || !visited.insert(node_ref) {
            log::warn!("page tree loop or excessive depth at {}, skipping", node_ref);
            return Ok(());
        }
        let node = self.load_object(node_ref)?;
        let dict = node
            .as_dict()
            .ok_or_else(|| Error::InvalidPdf(format!("page tree node {} is not a dictionary", node_ref)))?;
        match dict.get("Kids").and_then(Object::as_array) {
            // Some producers omit /Type on intermediate nodes, /Kids is authoritative
            Some(kids) if dict.get("Type").and_then(Object::as_name) != Some("Page") => {
                for kid in kids.iter().filter_map(Object::as_reference) {
                    self.collect_pages(kid, depth + 1, visited, pages)?;
                }
            },
            _ => pages.push(node_ref),
        }
        Ok(())
    }

    /// Number of pages.
    pub fn page_count(&self) -> Result<usize> {
        Ok(self.pages()?.len())
    }

    /// Reference of the zero-based page `index`.
    pub fn page_ref(&self, index: usize) -> Result<ObjectRef> {
        let pages = self.pages()?;
        pages
            .get(index)
            .copied()
            .ok_or_else(|| Error::InvalidPdf(format!("page {} out of range, document has {}", index, pages.len())))
    }

    /// The interactive form, if any.
    pub fn acroform(&self) -> Result<Option<AcroForm>> {
        let catalog = self.catalog()?;
        match catalog.get("AcroForm") {
            Some(Object::Reference(r)) => {
                let obj = self.load_object(*r)?;
                Ok(obj.as_dict().map(|dict| AcroForm {
                    reference: Some(*r),
                    dict: dict.clone(),
                }))
            },
            Some(Object::Dictionary(dict)) => Ok(Some(AcroForm {
                reference: None,
                dict: dict.clone(),
            })),
            _ => Ok(None),
        }
    }

    /// Terminal fields of the form, walking `/Kids` hierarchies.
    pub fn fields(&self) -> Result<Vec<FormField>> {
        let Some(form) = self.acroform()? else {
            return Ok(Vec::new());
        };
        let roots = match form.dict.get("Fields") {
            Some(obj) => self.resolve(obj)?,
            None => return Ok(Vec::new()),
        };
        let mut fields = Vec::new();
        let mut visited = HashSet::new();
        for root in roots.as_array().into_iter().flatten().filter_map(Object::as_reference) {
            self.collect_fields(root, "", None, 0, &mut visited, &mut fields)?;
        }
        Ok(fields)
    }

    fn collect_fields(
        &self,
        field_ref: ObjectRef,
        parent_name: &str,
        inherited_type: Option<&str>,
        depth: usize,
        visited: &mut HashSet<ObjectRef>,
        out: &mut Vec<FormField>,
    ) -> Result<()> {
        if depth > MAX_TREE_DEPTH || !visited.insert(field_ref) {
            log::warn!("field tree loop or excessive depth at {}, skipping", field_ref);
            return Ok(());
        }
        let obj = match self.load_object(field_ref) {
            Ok(obj) => obj,
            Err(Error::ObjectNotFound(..)) => {
                log::warn!("form field {} is missing, skipping", field_ref);
                return Ok(());
            },
            Err(e) => return Err(e),
        };
        let Some(dict) = obj.as_dict() else {
            return Ok(());
        };

        let partial = dict.get("T").and_then(Object::as_string).map(text_string);
        let name = match (&partial, parent_name.is_empty()) {
            (Some(t), true) => t.clone(),
            (Some(t), false) => format!("{}.{}", parent_name, t),
            (None, _) => parent_name.to_string(),
        };
        let field_type = dict.get("FT").and_then(Object::as_name).or(inherited_type);

        // Kids carrying /T are fields, kids without it are widgets of this field
        let child_fields: Vec<ObjectRef> = dict
            .get("Kids")
            .and_then(Object::as_array)
            .into_iter()
            .flatten()
            .filter_map(Object::as_reference)
            .filter(|kid| {
                self.load_object(*kid)
                    .ok()
                    .and_then(|k| k.as_dict().map(|d| d.contains_key("T")))
                    .unwrap_or(false)
            })
            .collect();

        if child_fields.is_empty() {
            out.push(FormField {
                name,
                reference: field_ref,
                dict: dict.clone(),
                field_type: field_type.map(str::to_string),
            });
        } else {
            for kid in child_fields {
                self.collect_fields(kid, &name, field_type, depth + 1, visited, out)?;
            }
        }
        Ok(())
    }

    /// Signature fields, signed or not.
    pub fn signature_fields(&self) -> Result<Vec<FormField>> {
        Ok(self.fields()?.into_iter().filter(FormField::is_signature).collect())
    }

    /// Look up a field by fully qualified name.
    pub fn field(&self, name: &str) -> Result<Option<FormField>> {
        Ok(self.fields()?.into_iter().find(|f| f.name == name))
    }

    /// Signatures present in the document, ordered by where their signed
    /// range ends (the last one covers the most bytes).
    pub fn signatures(&self) -> Result<Vec<EmbeddedSignature>> {
        let mut signatures = Vec::new();
        for field in self.signature_fields()? {
            let Some(value) = field.value() else {
                continue;
            };
            let dict_ref = value.as_reference();
            let resolved = self.resolve(value)?;
            let Some(dict) = resolved.as_dict() else {
                continue;
            };
            let (Some(range), Some(contents)) = (dict.get("ByteRange"), dict.get("Contents").and_then(Object::as_string))
            else {
                log::warn!("signature field {} has an incomplete value, skipping", field.name);
                continue;
            };
            let byte_range = ByteRange::from_object(range)?;
            let kind = match dict.get("Type").and_then(Object::as_name) {
                Some("DocTimeStamp") => SignatureKind::DocumentTimestamp,
                _ => SignatureKind::Signature,
            };
            signatures.push(EmbeddedSignature {
                field_name: field.name.clone(),
                field_ref: field.reference,
                dict_ref,
                sub_filter: dict
                    .get("SubFilter")
                    .and_then(Object::as_name)
                    .and_then(SignatureSubFilter::from_pdf_name),
                contents: contents.to_vec(),
                byte_range,
                kind,
                dict: dict.clone(),
            });
        }
        signatures.sort_by_key(|s| s.byte_range.end());
        Ok(signatures)
    }

    /// `/P` of the DocMDP transform if the document is certified. A
    /// transform without `/P` means 2.
    pub fn docmdp_permission(&self) -> Result<Option<i64>> {
        let catalog = self.catalog()?;
        let Some(perms) = self.resolve_dict(&catalog, "Perms")? else {
            return Ok(None);
        };
        let Some(sig) = self.resolve_dict(&perms, "DocMDP")? else {
            return Ok(None);
        };
        let references = match sig.get("Reference") {
            Some(obj) => self.resolve(obj)?,
            None => return Ok(Some(2)),
        };
        for reference in references.as_array().into_iter().flatten() {
            let Some(reference) = self.resolve(reference)?.as_dict().cloned() else {
                continue;
            };
            if reference.get("TransformMethod").and_then(Object::as_name) != Some("DocMDP") {
                continue;
            }
            let permission = self
                .resolve_dict(&reference, "TransformParams")?
                .and_then(|params| params.get("P").and_then(Object::as_integer))
                .unwrap_or(2);
            return Ok(Some(permission));
        }
        Ok(Some(2))
    }

    /// The catalog's `/Extensions` dictionary.
    pub fn extensions(&self) -> Result<Option<Dict>> {
        self.resolve_dict(&self.catalog()?, "Extensions")
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, UTF-8 with BOM, or
/// PDFDocEncoding (treated as Latin-1).
pub fn text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    bytes.iter().map(|b| *b as char).collect()
}

/// Encode a text string, using UTF-16BE for anything beyond ASCII.
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if text.chars().all(|c| (c as u32) < 0x80) {
        return text.as_bytes().to_vec();
    }
    let mut out = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

/// Parse the `%PDF-M.m` header found in the first kilobyte.
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(1024)];
    let pos = find_keyword(window, b"%PDF-")
        .ok_or_else(|| Error::InvalidPdf("missing %PDF- header".to_string()))?;
    match window.get(pos + 5..pos + 8) {
        Some([major, b'.', minor]) if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Ok((major - b'0', minor - b'0'))
        },
        _ => Err(Error::InvalidPdf("invalid version in %PDF- header".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)).unwrap()
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header(b"%PDF-1.7\n").unwrap(), (1, 7));
        assert_eq!(parse_header(b"junk%PDF-2.0\n").unwrap(), (2, 0));
        assert!(parse_header(b"%PDF-x.y").is_err());
        assert!(parse_header(b"hello").is_err());
    }

    #[test]
    fn test_classic_document() {
        let doc = PdfDocument::from_bytes(fixture("one_page.pdf")).unwrap();
        assert_eq!(doc.version(), (1, 7));
        assert_eq!(doc.page_count().unwrap(), 1);
        assert_eq!(doc.page_ref(0).unwrap(), ObjectRef::new(3, 0));
        assert!(doc.page_ref(1).is_err());
        assert!(doc.acroform().unwrap().is_none());
        assert!(doc.signatures().unwrap().is_empty());
        assert_eq!(doc.docmdp_permission().unwrap(), None);
    }

    #[test]
    fn test_compressed_objects() {
        let doc = PdfDocument::from_bytes(fixture("xref_stream.pdf")).unwrap();
        assert_eq!(doc.page_count().unwrap(), 1);
        let catalog = doc.catalog().unwrap();
        assert_eq!(catalog.get("Type").and_then(Object::as_name), Some("Catalog"));
    }

    #[test]
    fn test_missing_object() {
        let doc = PdfDocument::from_bytes(fixture("one_page.pdf")).unwrap();
        assert!(matches!(doc.load_object(ObjectRef::new(99, 0)), Err(Error::ObjectNotFound(99, 0))));
    }

    #[test]
    fn test_encrypted_rejected() {
        let pdf = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\nxref\n0 2\n0000000000 65535 f \n0000000009 00000 n \ntrailer\n<< /Size 2 /Root 1 0 R /Encrypt << /Filter /Standard >> >>\nstartxref\n45\n%%EOF\n";
        assert!(matches!(PdfDocument::from_bytes(pdf.to_vec()), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_text_strings() {
        assert_eq!(text_string(b"Signature1"), "Signature1");
        assert_eq!(text_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE9]), "A\u{e9}");
        assert_eq!(text_string(&encode_text_string("Zürich")), "Zürich");
        assert_eq!(encode_text_string("plain"), b"plain");
    }
}
