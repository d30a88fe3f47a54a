//! Writing signature revisions.
//!
//! [`ByteRangeDocumentWriter::prepare`] appends one revision holding a
//! signature dictionary whose `/Contents` is a zero-filled hex string of
//! fixed width and whose `/ByteRange` excludes exactly that string. The
//! resulting [`PreparedRevision`] digests the two spans as a stream and
//! later receives the container in place, so no byte covered by the digest
//! moves after it was computed.
//!
//! When [`SigningConfig::temp_dir`] is set the output is buffered in a
//! temporary file there instead of memory.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use chrono::{DateTime, Utc};

use super::algorithms::{merge_extensions, DeveloperExtension};
use super::byterange::{ByteRange, ByteRangeCalculator, BYTE_RANGE_PLACEHOLDER};
use super::provider::CryptoProvider;
use super::types::{
    CertificationLevel, DigestAlgorithm, SignOptions, SignatureKind, SignatureSubFilter, WriteMode,
};
use crate::config::SigningConfig;
use crate::document::{encode_text_string, PdfDocument};
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::writer::IncrementalUpdate;

/// Annotation flags of the invisible widget: Print | Locked.
const WIDGET_FLAGS: i64 = 132;

/// AcroForm `/SigFlags`: SignaturesExist | AppendOnly.
const SIG_FLAGS: i64 = 3;

/// What to put in the new revision.
#[derive(Debug, Clone)]
pub struct PlaceholderRequest {
    /// `/Sig` or `/DocTimeStamp`
    pub kind: SignatureKind,
    /// Target field; generated (`Signature{n}`) when `None`
    pub field_name: Option<String>,
    /// Zero-based page receiving a new field's widget
    pub page: usize,
    /// `/SubFilter`
    pub sub_filter: SignatureSubFilter,
    /// DER bytes reserved for the container
    pub reserved: usize,
    /// `/M`
    pub signing_time: Option<DateTime<Utc>>,
    /// `/Name`
    pub name: Option<String>,
    /// `/Reason`
    pub reason: Option<String>,
    /// `/Location`
    pub location: Option<String>,
    /// `/ContactInfo`
    pub contact_info: Option<String>,
    /// DocMDP certification
    pub certification: CertificationLevel,
    /// Developer extensions to declare in the catalog
    pub extensions: Vec<DeveloperExtension>,
    /// Append or rewrite
    pub write_mode: WriteMode,
}

impl PlaceholderRequest {
    /// Request for an ordinary signature described by `options`.
    pub fn signature(options: &SignOptions, signing_time: DateTime<Utc>, reserved: usize) -> Self {
        Self {
            kind: SignatureKind::Signature,
            field_name: options.field_name.clone(),
            page: options.page,
            sub_filter: options.standard.sub_filter(),
            reserved,
            signing_time: Some(signing_time),
            name: options.name.clone(),
            reason: options.reason.clone(),
            location: options.location.clone(),
            contact_info: options.contact_info.clone(),
            certification: options.certification,
            extensions: Vec::new(),
            write_mode: options.write_mode,
        }
    }

    /// Request for a document timestamp.
    pub fn document_timestamp(field_name: Option<String>, reserved: usize) -> Self {
        Self {
            kind: SignatureKind::DocumentTimestamp,
            field_name,
            page: 0,
            sub_filter: SignatureSubFilter::Rfc3161,
            reserved,
            signing_time: None,
            name: None,
            reason: None,
            location: None,
            contact_info: None,
            certification: CertificationLevel::NotCertified,
            extensions: Vec::new(),
            write_mode: WriteMode::Append,
        }
    }

    /// Add developer extension declarations.
    pub fn with_extensions(mut self, extensions: Vec<DeveloperExtension>) -> Self {
        self.extensions = extensions;
        self
    }
}

/// Output storage of a revision.
enum RevisionBuffer {
    Memory(Vec<u8>),
    File(tempfile::NamedTempFile),
}

impl RevisionBuffer {
    fn create(config: &SigningConfig) -> Result<Self> {
        match &config.temp_dir {
            Some(dir) => {
                let file = tempfile::Builder::new().prefix("pades-").suffix(".pdf").tempfile_in(dir)?;
                log::debug!("buffering revision in {}", file.path().display());
                Ok(RevisionBuffer::File(file))
            },
            None => Ok(RevisionBuffer::Memory(Vec::new())),
        }
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        match self {
            RevisionBuffer::Memory(data) => {
                let target = data
                    .get_mut(offset..offset + bytes.len())
                    .ok_or_else(|| Error::InvalidPdf(format!("patch at {} beyond end of output", offset)))?;
                target.copy_from_slice(bytes);
            },
            RevisionBuffer::File(file) => {
                let file = file.as_file_mut();
                file.seek(SeekFrom::Start(offset as u64))?;
                file.write_all(bytes)?;
                file.flush()?;
            },
        }
        Ok(())
    }

    fn read_at(&mut self, offset: usize, len: usize) -> Result<Vec<u8>> {
        match self {
            RevisionBuffer::Memory(data) => data
                .get(offset..offset + len)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| Error::InvalidPdf(format!("read at {} beyond end of output", offset))),
            RevisionBuffer::File(file) => {
                let file = file.as_file_mut();
                file.seek(SeekFrom::Start(offset as u64))?;
                let mut out = vec![0u8; len];
                file.read_exact(&mut out)?;
                Ok(out)
            },
        }
    }

    fn digest(&mut self, range: &ByteRange, provider: &dyn CryptoProvider, algorithm: DigestAlgorithm) -> Result<Vec<u8>> {
        match self {
            RevisionBuffer::Memory(data) => provider.digest_reader(algorithm, &mut range.reader(Cursor::new(data.as_slice()))),
            RevisionBuffer::File(file) => provider.digest_reader(algorithm, &mut range.reader(file.as_file_mut())),
        }
    }

    fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            RevisionBuffer::Memory(data) => Ok(data),
            RevisionBuffer::File(mut file) => {
                let file = file.as_file_mut();
                file.seek(SeekFrom::Start(0))?;
                let mut out = Vec::new();
                file.read_to_end(&mut out)?;
                Ok(out)
            },
        }
    }
}

/// A document whose newest revision carries an unfilled placeholder.
pub struct PreparedRevision {
    buffer: RevisionBuffer,
    byte_range: ByteRange,
    calculator: ByteRangeCalculator,
    field_name: String,
    kind: SignatureKind,
}

impl std::fmt::Debug for PreparedRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedRevision")
            .field("field_name", &self.field_name)
            .field("kind", &self.kind)
            .field("byte_range", &self.byte_range)
            .field("reserved", &self.calculator.reserved())
            .finish_non_exhaustive()
    }
}

impl PreparedRevision {
    /// Re-open prepared bytes for completion of `field_name`.
    ///
    /// The field must hold the most recent signature, its range must cover
    /// the whole file and its placeholder must still be empty.
    pub fn reopen(data: Vec<u8>, field_name: &str) -> Result<Self> {
        let doc = PdfDocument::from_bytes(data)?;
        let signatures = doc.signatures()?;
        let (index, signature) = signatures
            .iter()
            .enumerate()
            .find(|(_, s)| s.field_name == field_name)
            .ok_or_else(|| Error::FieldNotFound(field_name.to_string()))?;
        if index + 1 != signatures.len() {
            return Err(Error::FieldNotLast {
                field: field_name.to_string(),
            });
        }
        if !signature.byte_range.covers_whole(doc.len()) {
            return Err(Error::FieldNotCoveringDocument {
                field: field_name.to_string(),
            });
        }
        if signature.contents.iter().any(|b| *b != 0) {
            return Err(Error::SessionClosed);
        }
        let gap = signature.byte_range.gap();
        if gap.len() < 2 {
            return Err(Error::InvalidPdf(format!("/Contents gap of field '{}' is empty", field_name)));
        }
        let reserved = (gap.len() - 2) / 2;
        Ok(Self {
            byte_range: signature.byte_range,
            calculator: ByteRangeCalculator::new(reserved),
            field_name: field_name.to_string(),
            kind: signature.kind,
            buffer: RevisionBuffer::Memory(doc.data().to_vec()),
        })
    }

    /// Field holding the new signature.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Signature or document timestamp.
    pub fn kind(&self) -> SignatureKind {
        self.kind
    }

    /// The signed spans.
    pub fn byte_range(&self) -> ByteRange {
        self.byte_range
    }

    /// DER bytes the placeholder holds.
    pub fn reserved(&self) -> usize {
        self.calculator.reserved()
    }

    /// Digest of the two spans, streamed from the buffer.
    pub fn digest(&mut self, provider: &dyn CryptoProvider, algorithm: DigestAlgorithm) -> Result<Vec<u8>> {
        let digest = self.buffer.digest(&self.byte_range, provider, algorithm)?;
        log::debug!(
            "{} digest over {} signed bytes: {}",
            algorithm,
            self.byte_range.length1 + self.byte_range.length2,
            hex::encode(&digest)
        );
        Ok(digest)
    }

    /// Write `container` into the placeholder. Fails with
    /// [`Error::ContainerTooLarge`] when it does not fit.
    pub fn fill(&mut self, container: &[u8]) -> Result<()> {
        let encoded = self.calculator.encode_container(container)?;
        let gap = self.byte_range.gap();
        let current = self.buffer.read_at(gap.start, 1)?;
        if current.first() != Some(&b'<') || encoded.len() != gap.len() {
            return Err(Error::InvalidPdf(format!("no /Contents placeholder at offset {}", gap.start)));
        }
        self.buffer.write_at(gap.start, &encoded)?;
        log::info!(
            "filled placeholder of '{}' with {} of {} reserved bytes",
            self.field_name,
            container.len(),
            self.calculator.reserved()
        );
        Ok(())
    }

    /// The complete output.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.buffer.into_bytes()
    }
}

/// Appends signature revisions with a reserved placeholder.
#[derive(Debug, Clone, Default)]
pub struct ByteRangeDocumentWriter {
    config: SigningConfig,
}

impl ByteRangeDocumentWriter {
    /// Writer using `config` for buffering.
    pub fn new(config: SigningConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    /// Append a revision with an empty signature of `request.reserved` bytes.
    pub fn prepare(&self, doc: &PdfDocument, request: &PlaceholderRequest) -> Result<PreparedRevision> {
        if request.reserved == 0 {
            return Err(Error::PlaceholderTooSmall {
                requested: 0,
                estimated: 1,
            });
        }
        let existing = doc.signatures()?;
        if request.write_mode == WriteMode::FullRewrite && !existing.is_empty() {
            return Err(Error::FullRewriteNotAllowed);
        }
        ensure_changes_allowed(doc)?;
        if request.certification != CertificationLevel::NotCertified && !existing.is_empty() {
            return Err(Error::CertifyingSignedDocument);
        }

        let mut update = IncrementalUpdate::new(doc);
        let sig_ref = update.allocate();
        let field_name = attach_field(doc, &mut update, request, sig_ref)?;

        let root = doc.root_ref()?;
        let mut catalog = update
            .get(root)?
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("catalog is not a dictionary".to_string()))?;
        let mut catalog_changed = ensure_acroform_flags(doc, &mut update, &mut catalog)?;

        let mut sig_dict = signature_dictionary(request);
        if let Some(permission) = request.certification.permission() {
            sig_dict.insert("Reference".to_string(), docmdp_reference(permission));
            let mut perms = doc.resolve_dict(&catalog, "Perms")?.unwrap_or_default();
            perms.insert("DocMDP".to_string(), Object::Reference(sig_ref));
            catalog.insert("Perms".to_string(), Object::Dictionary(perms));
            catalog_changed = true;
        }
        if declare_extensions(doc, &mut update, &mut catalog, &request.extensions)? {
            catalog_changed = true;
        }
        if catalog_changed {
            update.set(root, Object::Dictionary(catalog));
        }

        let calculator = ByteRangeCalculator::new(request.reserved);
        update.set_raw(
            sig_ref,
            sig_dict,
            vec![
                ("ByteRange".to_string(), BYTE_RANGE_PLACEHOLDER.as_bytes().to_vec()),
                ("Contents".to_string(), calculator.generate_placeholder().into_bytes()),
            ],
        );

        let mut buffer = RevisionBuffer::create(&self.config)?;
        let layout = match &mut buffer {
            RevisionBuffer::Memory(data) => update.write_to(data, request.write_mode)?,
            RevisionBuffer::File(file) => {
                let mut writer = std::io::BufWriter::new(file.as_file_mut());
                let layout = update.write_to(&mut writer, request.write_mode)?;
                writer.flush()?;
                layout
            },
        };

        let to_usize = |v: u64| usize::try_from(v).map_err(|_| Error::InvalidPdf("offset overflow".to_string()));
        let contents_offset = to_usize(layout.raw_offset(sig_ref, "Contents")?)?;
        let range_offset = to_usize(layout.raw_offset(sig_ref, "ByteRange")?)?;
        let byte_range = ByteRange::around_contents(to_usize(layout.len)?, contents_offset, calculator.placeholder_len())?;
        buffer.write_at(range_offset, byte_range.format_padded()?.as_bytes())?;

        log::info!(
            "prepared {:?} in field '{}': ByteRange {:?}, {} bytes reserved",
            request.kind,
            field_name,
            byte_range.to_array(),
            request.reserved
        );
        Ok(PreparedRevision {
            buffer,
            byte_range,
            calculator,
            field_name,
            kind: request.kind,
        })
    }
}

/// Fails when an existing certification forbids any further revision.
pub fn ensure_changes_allowed(doc: &PdfDocument) -> Result<()> {
    if doc.docmdp_permission()? == Some(1) {
        return Err(Error::CertificationForbidsChanges);
    }
    Ok(())
}

/// PDF date string `D:YYYYMMDDHHmmSS+00'00'`.
pub fn pdf_date(time: DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}

fn signature_dictionary(request: &PlaceholderRequest) -> Dict {
    let mut dict = Dict::new();
    let type_name = match request.kind {
        SignatureKind::Signature => "Sig",
        SignatureKind::DocumentTimestamp => "DocTimeStamp",
    };
    dict.insert("Type".to_string(), Object::name(type_name));
    dict.insert("Filter".to_string(), Object::name("Adobe.PPKLite"));
    dict.insert("SubFilter".to_string(), Object::name(request.sub_filter.as_pdf_name()));
    if request.kind == SignatureKind::DocumentTimestamp {
        return dict;
    }

    if let Some(time) = request.signing_time {
        dict.insert("M".to_string(), Object::String(pdf_date(time).into_bytes()));
    }
    let text_entries = [
        ("Name", &request.name),
        ("Reason", &request.reason),
        ("Location", &request.location),
        ("ContactInfo", &request.contact_info),
    ];
    for (key, value) in text_entries {
        if let Some(value) = value {
            dict.insert(key.to_string(), Object::String(encode_text_string(value)));
        }
    }

    let mut app = Dict::new();
    app.insert("Name".to_string(), Object::name(crate::NAME));
    app.insert("REx".to_string(), Object::String(crate::VERSION.as_bytes().to_vec()));
    let mut prop_build = Dict::new();
    prop_build.insert("App".to_string(), Object::Dictionary(app));
    dict.insert("Prop_Build".to_string(), Object::Dictionary(prop_build));
    dict
}

fn docmdp_reference(permission: i64) -> Object {
    let mut params = Dict::new();
    params.insert("Type".to_string(), Object::name("TransformParams"));
    params.insert("P".to_string(), Object::Integer(permission));
    params.insert("V".to_string(), Object::name("1.2"));

    let mut reference = Dict::new();
    reference.insert("Type".to_string(), Object::name("SigRef"));
    reference.insert("TransformMethod".to_string(), Object::name("DocMDP"));
    reference.insert("TransformParams".to_string(), Object::Dictionary(params));
    Object::Array(vec![Object::Dictionary(reference)])
}

/// Append `item` to the array at `dict[key]`; indirect arrays are updated in place.
fn push_to_array(update: &mut IncrementalUpdate, dict: &mut Dict, key: &str, item: Object) -> Result<()> {
    match dict.get(key) {
        Some(Object::Reference(r)) => {
            let r = *r;
            let mut items = update.get(r)?.as_array().cloned().unwrap_or_default();
            items.push(item);
            update.set(r, Object::Array(items));
        },
        Some(Object::Array(items)) => {
            let mut items = items.clone();
            items.push(item);
            dict.insert(key.to_string(), Object::Array(items));
        },
        _ => {
            dict.insert(key.to_string(), Object::Array(vec![item]));
        },
    }
    Ok(())
}

fn next_field_name(doc: &PdfDocument) -> Result<String> {
    let names: Vec<String> = doc.fields()?.into_iter().map(|f| f.name).collect();
    let n = (1..)
        .find(|n| !names.iter().any(|name| *name == format!("Signature{}", n)))
        .unwrap_or(1);
    Ok(format!("Signature{}", n))
}

/// Point an existing empty signature field at `sig_ref`, or create a new
/// field with an invisible widget. Returns the field name.
fn attach_field(
    doc: &PdfDocument,
    update: &mut IncrementalUpdate,
    request: &PlaceholderRequest,
    sig_ref: ObjectRef,
) -> Result<String> {
    if let Some(name) = &request.field_name {
        if let Some(field) = doc.field(name)? {
            if !field.is_signature() {
                return Err(Error::InvalidPdf(format!("field '{}' is not a signature field", name)));
            }
            if field.value().is_some() {
                return Err(Error::FieldAlreadySigned(name.clone()));
            }
            let mut dict = update
                .get(field.reference)?
                .as_dict()
                .cloned()
                .ok_or_else(|| Error::InvalidPdf(format!("field '{}' is not a dictionary", name)))?;
            dict.insert("V".to_string(), Object::Reference(sig_ref));
            update.set(field.reference, Object::Dictionary(dict));
            log::debug!("reusing empty signature field '{}' ({})", name, field.reference);
            return Ok(name.clone());
        }
    }
    let name = match &request.field_name {
        Some(name) => name.clone(),
        None => next_field_name(doc)?,
    };

    let page_ref = doc.page_ref(request.page)?;
    let field_ref = update.allocate();
    let mut field = Dict::new();
    field.insert("FT".to_string(), Object::name("Sig"));
    field.insert("T".to_string(), Object::String(encode_text_string(&name)));
    field.insert("V".to_string(), Object::Reference(sig_ref));
    field.insert("Type".to_string(), Object::name("Annot"));
    field.insert("Subtype".to_string(), Object::name("Widget"));
    field.insert(
        "Rect".to_string(),
        Object::Array(vec![Object::Integer(0); 4]),
    );
    field.insert("F".to_string(), Object::Integer(WIDGET_FLAGS));
    field.insert("P".to_string(), Object::Reference(page_ref));
    update.set(field_ref, Object::Dictionary(field));

    let mut page = update
        .get(page_ref)?
        .as_dict()
        .cloned()
        .ok_or_else(|| Error::InvalidPdf(format!("page {} is not a dictionary", page_ref)))?;
    push_to_array(update, &mut page, "Annots", Object::Reference(field_ref))?;
    update.set(page_ref, Object::Dictionary(page));

    let root = doc.root_ref()?;
    match doc.acroform()? {
        Some(form) => {
            let mut dict = match form.reference {
                Some(r) => update.get(r)?.as_dict().cloned().unwrap_or_default(),
                None => form.dict,
            };
            push_to_array(update, &mut dict, "Fields", Object::Reference(field_ref))?;
            match form.reference {
                Some(r) => update.set(r, Object::Dictionary(dict)),
                None => {
                    let mut catalog = update.get(root)?.as_dict().cloned().unwrap_or_default();
                    catalog.insert("AcroForm".to_string(), Object::Dictionary(dict));
                    update.set(root, Object::Dictionary(catalog));
                },
            }
        },
        None => {
            let mut dict = Dict::new();
            dict.insert("Fields".to_string(), Object::Array(vec![Object::Reference(field_ref)]));
            let form_ref = update.add(Object::Dictionary(dict));
            let mut catalog = update.get(root)?.as_dict().cloned().unwrap_or_default();
            catalog.insert("AcroForm".to_string(), Object::Reference(form_ref));
            update.set(root, Object::Dictionary(catalog));
        },
    }
    log::debug!("created signature field '{}' ({}) on page {}", name, field_ref, request.page);
    Ok(name)
}

/// Set `/SigFlags 3` on the form. Returns whether `catalog` changed (inline form).
fn ensure_acroform_flags(doc: &PdfDocument, update: &mut IncrementalUpdate, catalog: &mut Dict) -> Result<bool> {
    match catalog.get("AcroForm") {
        Some(Object::Reference(r)) => {
            let r = *r;
            let mut dict = update.get(r)?.as_dict().cloned().unwrap_or_default();
            if dict.get("SigFlags").and_then(Object::as_integer) != Some(SIG_FLAGS) {
                dict.insert("SigFlags".to_string(), Object::Integer(SIG_FLAGS));
                update.set(r, Object::Dictionary(dict));
            }
            Ok(false)
        },
        Some(Object::Dictionary(dict)) => {
            if dict.get("SigFlags").and_then(Object::as_integer) == Some(SIG_FLAGS) {
                return Ok(false);
            }
            let mut dict = dict.clone();
            dict.insert("SigFlags".to_string(), Object::Integer(SIG_FLAGS));
            catalog.insert("AcroForm".to_string(), Object::Dictionary(dict));
            Ok(true)
        },
        _ => Err(Error::InvalidPdf(format!(
            "document {:?} has no /AcroForm after field creation",
            doc.version()
        ))),
    }
}

/// Union developer extensions into the catalog. Returns whether `catalog` changed.
pub(crate) fn declare_extensions(
    doc: &PdfDocument,
    update: &mut IncrementalUpdate,
    catalog: &mut Dict,
    extensions: &[DeveloperExtension],
) -> Result<bool> {
    if extensions.is_empty() {
        return Ok(false);
    }
    match catalog.get("Extensions") {
        Some(Object::Reference(r)) => {
            let r = *r;
            let existing = update.get(r)?.as_dict().cloned();
            if let Some(merged) = merge_extensions(existing.as_ref(), extensions) {
                update.set(r, Object::Dictionary(merged));
            }
            Ok(false)
        },
        other => {
            let existing = match other {
                Some(obj) => doc.resolve(obj)?.as_dict().cloned(),
                None => None,
            };
            match merge_extensions(existing.as_ref(), extensions) {
                Some(merged) => {
                    catalog.insert("Extensions".to_string(), Object::Dictionary(merged));
                    Ok(true)
                },
                None => Ok(false),
            }
        },
    }
}
