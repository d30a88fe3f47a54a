//! Incremental updates and full rewrites.
//!
//! An incremental update appends changed and new objects after the
//! original bytes, followed by a cross-reference section in the same form
//! as the newest existing one (classic table or xref stream) whose `/Prev`
//! points at the previous section. Earlier bytes are never touched.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use md5::{Digest, Md5};

use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::parser::rfind_keyword;
use crate::signatures::types::WriteMode;
use crate::writer::ObjectSerializer;
use crate::xref::{XRefEntry, XRefKind};

/// Trailer keys carried from the previous trailer into the new one.
const CARRIED_TRAILER_KEYS: [&str; 2] = ["Root", "Info"];

enum Body {
    Object(Object),
    /// Dictionary plus entries written verbatim after it
    Raw(Dict, Vec<(String, Vec<u8>)>),
}

/// Where the written objects landed.
#[derive(Debug, Clone, Default)]
pub struct RevisionLayout {
    /// File offset of each written object
    pub offsets: BTreeMap<u32, u64>,
    /// Offset of the new cross-reference section
    pub xref_offset: u64,
    /// Total length of the output
    pub len: u64,
    /// File offset of each verbatim value, by object number and key
    pub raw_offsets: BTreeMap<(u32, String), u64>,
}

impl RevisionLayout {
    /// Offset of an object written by this revision.
    pub fn offset_of(&self, obj_ref: ObjectRef) -> Result<u64> {
        self.offsets
            .get(&obj_ref.id)
            .copied()
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))
    }

    /// Offset of the verbatim value written for `key` in an object.
    pub fn raw_offset(&self, obj_ref: ObjectRef, key: &str) -> Result<u64> {
        self.raw_offsets
            .get(&(obj_ref.id, key.to_string()))
            .copied()
            .ok_or_else(|| Error::InvalidPdf(format!("no verbatim /{} written in {}", key, obj_ref)))
    }
}

/// Collects object changes against a document and writes them out.
pub struct IncrementalUpdate<'a> {
    doc: &'a PdfDocument,
    next_id: u32,
    objects: BTreeMap<u32, (u16, Body)>,
}

impl<'a> IncrementalUpdate<'a> {
    /// Start an update of `doc`.
    pub fn new(doc: &'a PdfDocument) -> Self {
        Self {
            doc,
            next_id: doc.xref().size().max(1),
            objects: BTreeMap::new(),
        }
    }

    /// The document being updated.
    pub fn document(&self) -> &'a PdfDocument {
        self.doc
    }

    /// Reserve a fresh object number.
    pub fn allocate(&mut self) -> ObjectRef {
        let id = self.next_id;
        self.next_id += 1;
        ObjectRef::new(id, 0)
    }

    /// Add a new object.
    pub fn add(&mut self, obj: Object) -> ObjectRef {
        let r = self.allocate();
        self.objects.insert(r.id, (r.gen, Body::Object(obj)));
        r
    }

    /// Replace (or define, for an allocated reference) an object.
    pub fn set(&mut self, r: ObjectRef, obj: Object) {
        self.objects.insert(r.id, (r.gen, Body::Object(obj)));
    }

    /// Define a dictionary object with entries written verbatim after the
    /// regular ones. Raw values must be syntactically valid PDF.
    pub fn set_raw(&mut self, r: ObjectRef, dict: Dict, raw: Vec<(String, Vec<u8>)>) {
        self.objects.insert(r.id, (r.gen, Body::Raw(dict, raw)));
    }

    /// Current value of an object: the pending change if any, otherwise
    /// the document's. Raw bodies are returned without their raw entries.
    pub fn get(&self, r: ObjectRef) -> Result<Object> {
        match self.objects.get(&r.id) {
            Some((_, Body::Object(obj))) => Ok(obj.clone()),
            Some((_, Body::Raw(dict, _))) => Ok(Object::Dictionary(dict.clone())),
            None => self.doc.load_object(r),
        }
    }

    /// Whether anything changed.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Serialized object plus the relative offsets of its verbatim values.
    fn serialize(&self, serializer: &ObjectSerializer, id: u32, gen: u16, body: &Body) -> (Vec<u8>, Vec<(String, usize)>) {
        match body {
            Body::Object(obj) => (serializer.serialize_indirect(id, gen, obj), Vec::new()),
            Body::Raw(dict, raw) => {
                let entries: Vec<(&str, &[u8])> = raw.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
                let bytes = serializer.serialize_indirect_with_raw(id, gen, dict, &entries);
                let positions = raw
                    .iter()
                    .filter_map(|(key, value)| {
                        let mut needle = format!("/{} ", key).into_bytes();
                        needle.extend_from_slice(value);
                        rfind_keyword(&bytes, &needle).map(|pos| (key.clone(), pos + key.len() + 2))
                    })
                    .collect();
                (bytes, positions)
            },
        }
    }

    /// New trailer `/ID`: the first element is preserved, the second
    /// changes with every revision. Derived from the revision content so
    /// the same changes always produce the same file.
    fn file_id(&self, revision: &[Vec<u8>]) -> Object {
        let mut hasher = Md5::new();
        hasher.update(self.doc.len().to_le_bytes());
        for bytes in revision {
            hasher.update(bytes);
        }
        let fresh = hasher.finalize().to_vec();
        let first = self
            .doc
            .trailer()
            .get("ID")
            .and_then(Object::as_array)
            .and_then(|ids| ids.first())
            .and_then(Object::as_string)
            .map(<[u8]>::to_vec)
            .unwrap_or_else(|| fresh.clone());
        Object::Array(vec![Object::String(first), Object::String(fresh)])
    }

    fn base_trailer(&self, size: u32, id: Object) -> Dict {
        let mut trailer = Dict::new();
        for key in CARRIED_TRAILER_KEYS {
            if let Some(value) = self.doc.trailer().get(key) {
                trailer.insert(key.to_string(), value.clone());
            }
        }
        trailer.insert("Size".to_string(), Object::Integer(size as i64));
        trailer.insert("ID".to_string(), id);
        trailer
    }

    /// Write the whole output (original plus revision, or a rewrite) to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W, mode: WriteMode) -> Result<RevisionLayout> {
        match mode {
            WriteMode::Append => self.write_append(w),
            WriteMode::FullRewrite => self.write_full(w),
        }
    }

    /// Convenience: write into memory.
    pub fn to_bytes(&self, mode: WriteMode) -> Result<(Vec<u8>, RevisionLayout)> {
        let mut out = Vec::with_capacity(self.doc.len() + 4096);
        let layout = self.write_to(&mut out, mode)?;
        Ok((out, layout))
    }

    fn write_append<W: Write>(&self, w: &mut W) -> Result<RevisionLayout> {
        let serializer = ObjectSerializer::new();
        let mut w = CountingWriter::new(w);
        w.write_all(self.doc.data())?;
        if !matches!(self.doc.data().last(), Some(b'\n') | Some(b'\r')) {
            w.write_all(b"\n")?;
        }

        let serialized: Vec<(u32, u16, (Vec<u8>, Vec<(String, usize)>))> = self
            .objects
            .iter()
            .map(|(id, (gen, body))| (*id, *gen, self.serialize(&serializer, *id, *gen, body)))
            .collect();
        let id = self.file_id(&serialized.iter().map(|(_, _, (b, _))| b.clone()).collect::<Vec<_>>());

        let mut layout = RevisionLayout::default();
        let mut entries = BTreeMap::new();
        for (obj_id, gen, (bytes, raw)) in &serialized {
            let start = w.position();
            layout.offsets.insert(*obj_id, start);
            for (key, rel) in raw {
                layout.raw_offsets.insert((*obj_id, key.clone()), start + *rel as u64);
            }
            entries.insert(*obj_id, (start, *gen));
            w.write_all(bytes)?;
        }

        let prev = self.doc.xref().startxref();
        match self.doc.xref().kind() {
            XRefKind::Table => {
                let size = self.next_id.max(self.doc.xref().size());
                let mut trailer = self.base_trailer(size, id);
                trailer.insert("Prev".to_string(), Object::Integer(prev as i64));
                layout.xref_offset = w.position();
                write_xref_table(&mut w, &entries)?;
                w.write_all(b"trailer\n")?;
                w.write_all(&serializer.serialize(&Object::Dictionary(trailer)))?;
            },
            XRefKind::Stream => {
                // The xref stream is itself an object of the revision
                let stream_id = self.next_id;
                let size = (stream_id + 1).max(self.doc.xref().size());
                layout.xref_offset = w.position();
                entries.insert(stream_id, (w.position(), 0));
                let mut dict = self.base_trailer(size, id);
                dict.insert("Prev".to_string(), Object::Integer(prev as i64));
                let stream = xref_stream(dict, &entries)?;
                layout.offsets.insert(stream_id, w.position());
                w.write_all(&serializer.serialize_indirect(stream_id, 0, &stream))?;
            },
        }
        write!(w, "\nstartxref\n{}\n%%EOF\n", layout.xref_offset)?;
        layout.len = w.position();
        log::debug!(
            "appended revision with {} objects, xref at {}, file now {} bytes",
            self.objects.len(),
            layout.xref_offset,
            layout.len
        );
        Ok(layout)
    }

    fn write_full<W: Write>(&self, w: &mut W) -> Result<RevisionLayout> {
        let serializer = ObjectSerializer::new();
        let mut w = CountingWriter::new(w);
        let (major, minor) = self.doc.version();
        write!(w, "%PDF-{}.{}\n", major, minor)?;
        // Binary marker (bytes > 127 flag binary content)
        w.write_all(b"%\x80\x81\x82\x83\n")?;

        let mut serialized: BTreeMap<u32, (u16, (Vec<u8>, Vec<(String, usize)>))> = BTreeMap::new();
        for id in self.doc.xref().in_use() {
            if self.objects.contains_key(&id) {
                continue;
            }
            let gen = match self.doc.xref().get(id) {
                Some(XRefEntry::Uncompressed { generation, .. }) => *generation,
                _ => 0,
            };
            let obj = self.doc.load_object(ObjectRef::new(id, gen))?;
            // Container objects of the old layout are not carried over
            if let Object::Stream { dict, .. } = &obj {
                if matches!(dict.get("Type").and_then(Object::as_name), Some("ObjStm") | Some("XRef")) {
                    continue;
                }
            }
            serialized.insert(id, (gen, (serializer.serialize_indirect(id, gen, &obj), Vec::new())));
        }
        for (id, (gen, body)) in &self.objects {
            serialized.insert(*id, (*gen, self.serialize(&serializer, *id, *gen, body)));
        }
        let file_id = self.file_id(&serialized.values().map(|(_, (b, _))| b.clone()).collect::<Vec<_>>());

        let mut layout = RevisionLayout::default();
        for (id, (_, (bytes, raw))) in &serialized {
            let start = w.position();
            layout.offsets.insert(*id, start);
            for (key, rel) in raw {
                layout.raw_offsets.insert((*id, key.clone()), start + *rel as u64);
            }
            w.write_all(bytes)?;
        }

        let size = serialized.keys().next_back().map(|id| id + 1).unwrap_or(1);
        layout.xref_offset = w.position();
        write!(w, "xref\n0 {}\n", size)?;
        let free: Vec<u32> = (1..size).filter(|id| !serialized.contains_key(id)).collect();
        let next_free = |after: u32| free.iter().copied().find(|f| *f > after).unwrap_or(0);
        write!(w, "{:010} 65535 f\r\n", next_free(0))?;
        for id in 1..size {
            match serialized.get(&id) {
                Some((gen, _)) => write!(w, "{:010} {:05} n\r\n", layout.offsets[&id], gen)?,
                None => write!(w, "{:010} 00001 f\r\n", next_free(id))?,
            }
        }
        w.write_all(b"trailer\n")?;
        let trailer = self.base_trailer(size, file_id);
        w.write_all(&serializer.serialize(&Object::Dictionary(trailer)))?;
        write!(w, "\nstartxref\n{}\n%%EOF\n", layout.xref_offset)?;
        layout.len = w.position();
        log::debug!("rewrote document with {} objects, {} bytes", serialized.len(), layout.len);
        Ok(layout)
    }
}

/// Contiguous runs of object numbers, as `(first, count)`.
fn subsections(entries: &BTreeMap<u32, (u64, u16)>) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for id in entries.keys() {
        match runs.last_mut() {
            Some((first, count)) if *first + *count == *id => *count += 1,
            _ => runs.push((*id, 1)),
        }
    }
    runs
}

fn write_xref_table<W: Write>(w: &mut W, entries: &BTreeMap<u32, (u64, u16)>) -> std::io::Result<()> {
    w.write_all(b"xref\n")?;
    for (first, count) in subsections(entries) {
        write!(w, "{} {}\n", first, count)?;
        for id in first..first + count {
            if let Some((offset, gen)) = entries.get(&id) {
                // Entries are exactly 20 bytes including the two-byte EOL
                write!(w, "{:010} {:05} n\r\n", offset, gen)?;
            }
        }
    }
    Ok(())
}

fn xref_stream(mut dict: Dict, entries: &BTreeMap<u32, (u64, u16)>) -> Result<Object> {
    let max_offset = entries.values().map(|(o, _)| *o).max().unwrap_or(0);
    let width = (1..=8).find(|w| max_offset < 1u64 << (8 * w)).unwrap_or(8);

    let mut rows = Vec::with_capacity(entries.len() * (3 + width));
    let mut index = Vec::new();
    for (first, count) in subsections(entries) {
        index.push(Object::Integer(first as i64));
        index.push(Object::Integer(count as i64));
        for id in first..first + count {
            if let Some((offset, gen)) = entries.get(&id) {
                rows.push(1u8);
                rows.extend_from_slice(&offset.to_be_bytes()[8 - width..]);
                rows.extend_from_slice(&gen.to_be_bytes());
            }
        }
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&rows)?;
    let data = encoder.finish()?;

    dict.insert("Type".to_string(), Object::name("XRef"));
    dict.insert(
        "W".to_string(),
        Object::Array(vec![Object::Integer(1), Object::Integer(width as i64), Object::Integer(2)]),
    );
    dict.insert("Index".to_string(), Object::Array(index));
    dict.insert("Filter".to_string(), Object::name("FlateDecode"));
    Ok(Object::Stream {
        dict,
        data: bytes::Bytes::from(data),
    })
}

struct CountingWriter<'w, W: Write> {
    inner: &'w mut W,
    written: u64,
}

impl<'w, W: Write> CountingWriter<'w, W> {
    fn new(inner: &'w mut W) -> Self {
        Self { inner, written: 0 }
    }

    fn position(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
