//! Document Security Store.
//!
//! The DSS is a catalog-level dictionary holding the certificates, CRLs and
//! OCSP responses needed to validate every signature in the document
//! offline. Each extension pass reads the existing store, merges the newly
//! gathered evidence and writes the union in a new incremental revision.
//! Existing streams are referenced again rather than copied, including
//! entries whose filters cannot be decoded here.
//!
//! ```text
//! /DSS <<
//!   /Certs [12 0 R ...]  /CRLs [...]  /OCSPs [...]
//!   /VRI << /<SHA-1 of /Contents, upper-case hex> << /Cert [...] /CRL [...] /OCSP [...] /TU (D:...) >> >>
//! >>
//! ```

use std::collections::HashMap;
use std::io::Write;

use chrono::{DateTime, Utc};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use indexmap::IndexMap;

use super::algorithms::ESIC_LEVEL_5;
use super::container::trim_der;
use super::document_writer::{declare_extensions, ensure_changes_allowed, pdf_date};
use super::provider::CryptoProvider;
use super::types::{DigestAlgorithm, SignatureSubFilter, WriteMode};
use crate::document::{EmbeddedSignature, PdfDocument};
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::revocation::RevocationEvidenceStore;
use crate::writer::IncrementalUpdate;

/// Evidence attached to one signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VriEntry {
    /// DER certificates
    pub certificates: Vec<Vec<u8>>,
    /// DER CRLs
    pub crls: Vec<Vec<u8>>,
    /// DER OCSP responses
    pub ocsps: Vec<Vec<u8>>,
    /// When the entry was written
    pub time: Option<DateTime<Utc>>,
}

impl VriEntry {
    fn push_unique(list: &mut Vec<Vec<u8>>, der: &[u8]) {
        if !list.iter().any(|existing| existing == der) {
            list.push(der.to_vec());
        }
    }

    fn merge(&mut self, other: &VriEntry) {
        for der in &other.certificates {
            Self::push_unique(&mut self.certificates, der);
        }
        for der in &other.crls {
            Self::push_unique(&mut self.crls, der);
        }
        for der in &other.ocsps {
            Self::push_unique(&mut self.ocsps, der);
        }
        if other.time.is_some() {
            self.time = other.time;
        }
    }
}

/// In-memory view of a document's DSS.
#[derive(Debug, Clone, Default)]
pub struct ValidationDictionary {
    store: RevocationEvidenceStore,
    vri: IndexMap<String, VriEntry>,
    existing_streams: HashMap<Vec<u8>, ObjectRef>,
    /// Undecodable entries by array path (`Certs`, `VRI/<key>/OCSP`, ...).
    undecoded: HashMap<String, Vec<Object>>,
    dss_ref: Option<ObjectRef>,
}

/// VRI key of a signature: upper-case hex SHA-1 of its `/Contents`. RFC 3161
/// tokens are hashed without their zero padding.
pub fn vri_key(provider: &dyn CryptoProvider, signature: &EmbeddedSignature) -> Result<String> {
    let contents = match signature.sub_filter {
        Some(SignatureSubFilter::Rfc3161) => trim_der(&signature.contents)?,
        _ => signature.contents.as_slice(),
    };
    Ok(hex::encode_upper(provider.digest(DigestAlgorithm::Sha1, contents)?))
}

impl ValidationDictionary {
    /// Empty DSS.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the DSS of `doc`, or an empty one.
    pub fn read(doc: &PdfDocument) -> Result<Self> {
        let catalog = doc.catalog()?;
        let dss_ref = catalog.get("DSS").and_then(Object::as_reference);
        let Some(dss) = doc.resolve_dict(&catalog, "DSS")? else {
            return Ok(Self::new());
        };
        let mut existing_streams = HashMap::new();
        let mut undecoded = HashMap::new();
        let mut streams = |dict: &Dict, key: &str, path: String| -> Result<Vec<Vec<u8>>> {
            let (decoded, kept) = read_streams(doc, dict, key, &mut existing_streams)?;
            if !kept.is_empty() {
                undecoded.insert(path, kept);
            }
            Ok(decoded)
        };
        let certificates = streams(&dss, "Certs", "Certs".to_string())?;
        let crls = streams(&dss, "CRLs", "CRLs".to_string())?;
        let ocsps = streams(&dss, "OCSPs", "OCSPs".to_string())?;

        let mut vri = IndexMap::new();
        if let Some(entries) = doc.resolve_dict(&dss, "VRI")? {
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();
            for key in keys {
                let Some(entry) = entries.get(key).map(|e| doc.resolve(e)).transpose()? else {
                    continue;
                };
                let Some(entry) = entry.as_dict() else {
                    continue;
                };
                let time = entry
                    .get("TU")
                    .and_then(Object::as_string)
                    .and_then(parse_pdf_date);
                let key = key.to_uppercase();
                let entry = VriEntry {
                    certificates: streams(entry, "Cert", vri_path(&key, "Cert"))?,
                    crls: streams(entry, "CRL", vri_path(&key, "CRL"))?,
                    ocsps: streams(entry, "OCSP", vri_path(&key, "OCSP"))?,
                    time,
                };
                vri.insert(key, entry);
            }
        }
        log::debug!(
            "read DSS: {} certificate(s), {} CRL(s), {} OCSP response(s), {} VRI entr(ies), {} undecoded",
            certificates.len(),
            crls.len(),
            ocsps.len(),
            vri.len(),
            undecoded.values().map(Vec::len).sum::<usize>()
        );
        Ok(Self {
            store: RevocationEvidenceStore::from_existing(&certificates, &crls, &ocsps),
            vri,
            existing_streams,
            undecoded,
            dss_ref,
        })
    }

    /// Pooled evidence.
    pub fn store(&self) -> &RevocationEvidenceStore {
        &self.store
    }

    /// Per-signature entries.
    pub fn vri(&self) -> &IndexMap<String, VriEntry> {
        &self.vri
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty() && self.vri.is_empty()
    }

    /// Union `store` into the pools.
    pub fn merge_store(&mut self, store: &RevocationEvidenceStore) {
        self.store.merge(store);
    }

    /// Record evidence for the signature identified by `key`: the given
    /// certificates plus every CRL and OCSP response `store` attaches to them.
    pub fn add_vri(&mut self, key: &str, certificates: &[Vec<u8>], store: &RevocationEvidenceStore, time: DateTime<Utc>) {
        let mut entry = VriEntry {
            time: Some(time),
            ..VriEntry::default()
        };
        for cert in certificates {
            VriEntry::push_unique(&mut entry.certificates, cert);
            for crl in store.crls_for(cert) {
                VriEntry::push_unique(&mut entry.crls, crl);
            }
            for ocsp in store.ocsps_for(cert) {
                VriEntry::push_unique(&mut entry.ocsps, ocsp);
            }
        }
        self.vri.entry(key.to_uppercase()).or_default().merge(&entry);
    }

    /// Write the DSS into `update`, returning the modified catalog. The
    /// caller stores the catalog.
    pub fn write(&self, update: &mut IncrementalUpdate, mut catalog: Dict) -> Result<Dict> {
        let mut streams: HashMap<Vec<u8>, ObjectRef> = self.existing_streams.clone();
        let mut stream_ref = |update: &mut IncrementalUpdate, der: &[u8]| -> Result<Object> {
            if let Some(r) = streams.get(der) {
                return Ok(Object::Reference(*r));
            }
            let r = update.add(evidence_stream(der)?);
            streams.insert(der.to_vec(), r);
            Ok(Object::Reference(r))
        };

        let mut dss = Dict::new();
        dss.insert("Type".to_string(), Object::name("DSS"));
        let pools: [(&str, Vec<&[u8]>); 3] = [
            ("Certs", self.store.certificates().collect()),
            ("CRLs", self.store.crls().map(|(der, _)| der).collect()),
            ("OCSPs", self.store.ocsps().map(|(der, _)| der).collect()),
        ];
        for (key, items) in pools {
            let mut refs = items
                .into_iter()
                .map(|der| stream_ref(update, der))
                .collect::<Result<Vec<_>>>()?;
            refs.extend(self.undecoded.get(key).into_iter().flatten().cloned());
            if !refs.is_empty() {
                dss.insert(key.to_string(), Object::Array(refs));
            }
        }

        if !self.vri.is_empty() {
            let mut vri = Dict::new();
            for (key, entry) in &self.vri {
                let mut dict = Dict::new();
                for (name, items) in [("Cert", &entry.certificates), ("CRL", &entry.crls), ("OCSP", &entry.ocsps)] {
                    let mut refs = items
                        .iter()
                        .map(|der| stream_ref(update, der))
                        .collect::<Result<Vec<_>>>()?;
                    refs.extend(self.undecoded.get(&vri_path(key, name)).into_iter().flatten().cloned());
                    if !refs.is_empty() {
                        dict.insert(name.to_string(), Object::Array(refs));
                    }
                }
                if let Some(time) = entry.time {
                    dict.insert("TU".to_string(), Object::String(pdf_date(time).into_bytes()));
                }
                vri.insert(key.clone(), Object::Dictionary(dict));
            }
            dss.insert("VRI".to_string(), Object::Dictionary(vri));
        }

        match self.dss_ref {
            Some(r) => update.set(r, Object::Dictionary(dss)),
            None => {
                let r = update.add(Object::Dictionary(dss));
                catalog.insert("DSS".to_string(), Object::Reference(r));
            },
        }
        Ok(catalog)
    }

    /// Append a revision holding this DSS to `doc`.
    pub fn write_revision(&self, doc: &PdfDocument) -> Result<Vec<u8>> {
        ensure_changes_allowed(doc)?;
        let mut update = IncrementalUpdate::new(doc);
        let root = doc.root_ref()?;
        let catalog = update
            .get(root)?
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("catalog is not a dictionary".to_string()))?;
        let mut catalog = self.write(&mut update, catalog)?;
        declare_extensions(doc, &mut update, &mut catalog, &[ESIC_LEVEL_5])?;
        update.set(root, Object::Dictionary(catalog));
        let (bytes, layout) = update.to_bytes(WriteMode::Append)?;
        let (certs, crls, ocsps) = self.store.counts();
        log::info!(
            "wrote DSS revision at offset {}: {} certificate(s), {} CRL(s), {} OCSP response(s), {} VRI entr(ies)",
            layout.xref_offset,
            certs,
            crls,
            ocsps,
            self.vri.len()
        );
        Ok(bytes)
    }
}

fn evidence_stream(der: &[u8]) -> Result<Object> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(der)?;
    let data = encoder.finish()?;
    let mut dict = Dict::new();
    dict.insert("Filter".to_string(), Object::name("FlateDecode"));
    Ok(Object::Stream {
        dict,
        data: data.into(),
    })
}

fn vri_path(key: &str, name: &str) -> String {
    format!("VRI/{}/{}", key, name)
}

/// Decoded DER of every stream in `dict[key]`, plus the array items that
/// could not be decoded. Those are returned as found so they can be
/// written back untouched.
fn read_streams(
    doc: &PdfDocument,
    dict: &Dict,
    key: &str,
    seen: &mut HashMap<Vec<u8>, ObjectRef>,
) -> Result<(Vec<Vec<u8>>, Vec<Object>)> {
    let Some(array) = dict.get(key).map(|a| doc.resolve(a)).transpose()? else {
        return Ok((Vec::new(), Vec::new()));
    };
    let mut decoded = Vec::new();
    let mut kept = Vec::new();
    for item in array.as_array().into_iter().flatten() {
        let stream = doc.resolve(item)?;
        let der = match stream.decode_stream_data() {
            Ok(der) => der,
            Err(e) => {
                log::warn!("keeping undecodable /{} entry in DSS as is: {}", key, e);
                kept.push(item.clone());
                continue;
            },
        };
        if let Some(r) = item.as_reference() {
            seen.entry(der.clone()).or_insert(r);
        }
        decoded.push(der);
    }
    Ok((decoded, kept))
}

/// Parse `D:YYYYMMDDHHmmSS` with an optional `Z` or `+00'00'` suffix.
fn parse_pdf_date(raw: &[u8]) -> Option<DateTime<Utc>> {
    let text = std::str::from_utf8(raw).ok()?;
    let digits = text.strip_prefix("D:").unwrap_or(text);
    let stamp = digits.get(..14)?;
    chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::identity::CertificateInfo;
    use chrono::TimeZone;

    fn fixture(name: &str) -> Vec<u8> {
        std::fs::read(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)).unwrap()
    }

    fn evidence() -> RevocationEvidenceStore {
        let signer = CertificateInfo::parse(&fixture("signer-rsa.cer")).unwrap();
        let mut store = RevocationEvidenceStore::new();
        store.add_certificate(&fixture("root.cer"));
        store.add_ocsp(&signer, fixture("signer-rsa.ocsp"), None);
        store.add_crl(&signer, fixture("root.crl"), Utc::now());
        store
    }

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_write_and_read_back() {
        let doc = PdfDocument::from_bytes(fixture("one_page.pdf")).unwrap();
        let mut dss = ValidationDictionary::read(&doc).unwrap();
        assert!(dss.is_empty());
        let store = evidence();
        dss.merge_store(&store);
        dss.add_vri("abcdef", &[fixture("signer-rsa.cer")], &store, time());

        let bytes = dss.write_revision(&doc).unwrap();
        let updated = PdfDocument::from_bytes(bytes).unwrap();
        let reread = ValidationDictionary::read(&updated).unwrap();
        assert_eq!(reread.store().counts(), (2, 1, 1));
        let entry = reread.vri().get("ABCDEF").unwrap();
        assert_eq!(entry.certificates, vec![fixture("signer-rsa.cer")]);
        assert_eq!(entry.ocsps, vec![fixture("signer-rsa.ocsp")]);
        assert_eq!(entry.crls, vec![fixture("root.crl")]);
        assert_eq!(entry.time, Some(time()));
        assert!(updated.extensions().unwrap().unwrap().contains_key("ESIC"));
    }

    #[test]
    fn test_second_pass_adds_no_duplicates() {
        let doc = PdfDocument::from_bytes(fixture("one_page.pdf")).unwrap();
        let store = evidence();
        let mut dss = ValidationDictionary::read(&doc).unwrap();
        dss.merge_store(&store);
        let first = PdfDocument::from_bytes(dss.write_revision(&doc).unwrap()).unwrap();

        let mut again = ValidationDictionary::read(&first).unwrap();
        again.merge_store(&store);
        let second_bytes = again.write_revision(&first).unwrap();
        let appended = &second_bytes[first.len()..];
        assert!(!appended.windows(11).any(|w| w == b"/FlateDecod"));
        let second = PdfDocument::from_bytes(second_bytes).unwrap();
        assert_eq!(ValidationDictionary::read(&second).unwrap().store().counts(), (2, 1, 1));
    }

    /// Append a revision that adds an ASCIIHex-filtered stream to the DSS
    /// `Certs` pool and to the `OCSP` list of the `ABCDEF` VRI entry.
    fn with_hex_certificate(doc: &PdfDocument) -> (Vec<u8>, ObjectRef) {
        let mut update = IncrementalUpdate::new(doc);
        let mut dict = Dict::new();
        dict.insert("Filter".to_string(), Object::name("ASCIIHexDecode"));
        let hex_ref = update.add(Object::Stream {
            dict,
            data: format!("{}>", hex::encode(fixture("tsa.cer"))).into_bytes().into(),
        });
        let dss_ref = doc.catalog().unwrap().get("DSS").and_then(Object::as_reference).unwrap();
        let mut dss = update.get(dss_ref).unwrap().as_dict().cloned().unwrap();
        let Some(Object::Array(certs)) = dss.get_mut("Certs") else {
            panic!("no /Certs");
        };
        certs.push(Object::Reference(hex_ref));
        let Some(Object::Dictionary(vri)) = dss.get_mut("VRI") else {
            panic!("no /VRI");
        };
        let Some(Object::Dictionary(entry)) = vri.get_mut("ABCDEF") else {
            panic!("no VRI entry");
        };
        let Some(Object::Array(ocsps)) = entry.get_mut("OCSP") else {
            panic!("no VRI /OCSP");
        };
        ocsps.push(Object::Reference(hex_ref));
        update.set(dss_ref, Object::Dictionary(dss));
        (update.to_bytes(WriteMode::Append).unwrap().0, hex_ref)
    }

    #[test]
    fn test_undecodable_entries_survive_rewrite() {
        let doc = PdfDocument::from_bytes(fixture("one_page.pdf")).unwrap();
        let store = evidence();
        let mut dss = ValidationDictionary::read(&doc).unwrap();
        dss.merge_store(&store);
        dss.add_vri("abcdef", &[fixture("signer-rsa.cer")], &store, time());
        let first = PdfDocument::from_bytes(dss.write_revision(&doc).unwrap()).unwrap();
        let (seeded, hex_ref) = with_hex_certificate(&first);
        let seeded = PdfDocument::from_bytes(seeded).unwrap();

        let mut again = ValidationDictionary::read(&seeded).unwrap();
        assert_eq!(again.store().counts(), (2, 1, 1));
        again.add_vri("abcdef", &[fixture("root.cer")], &store, time());
        let rewritten = PdfDocument::from_bytes(again.write_revision(&seeded).unwrap()).unwrap();

        let catalog = rewritten.catalog().unwrap();
        let dss = rewritten.resolve_dict(&catalog, "DSS").unwrap().unwrap();
        let certs = dss.get("Certs").and_then(Object::as_array).unwrap();
        assert_eq!(certs.len(), 3);
        assert!(certs.contains(&Object::Reference(hex_ref)));
        let vri = rewritten.resolve_dict(&dss, "VRI").unwrap().unwrap();
        let entry = vri.get("ABCDEF").and_then(Object::as_dict).unwrap();
        let ocsps = entry.get("OCSP").and_then(Object::as_array).unwrap();
        assert!(ocsps.contains(&Object::Reference(hex_ref)));
        assert_eq!(ocsps.len(), 2);
        assert_eq!(entry.get("Cert").and_then(Object::as_array).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_pdf_date() {
        assert_eq!(parse_pdf_date(b"D:20240501120000+00'00'"), Some(time()));
        assert_eq!(parse_pdf_date(b"D:20240501120000Z"), Some(time()));
        assert_eq!(parse_pdf_date(b"garbage"), None);
    }
}
