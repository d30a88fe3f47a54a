//! Placeholder layout properties of appended signature revisions.

mod common;

use common::*;
use pades_oxide::document::{text_string, PdfDocument};
use pades_oxide::signatures::{
    default_provider, ByteRangeDocumentWriter, DigestAlgorithm, PlaceholderRequest, PreparedRevision, SignOptions,
};
use pades_oxide::Error;
use proptest::prelude::*;

fn request(reserved: usize, reason: &str) -> PlaceholderRequest {
    let time = chrono::DateTime::from_timestamp(1_714_564_800, 0).unwrap();
    PlaceholderRequest::signature(&SignOptions::default().with_reason(reason), time, reserved)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// The range always spans the file minus exactly the hex placeholder,
    /// and survives a reopen unchanged.
    #[test]
    fn placeholder_layout(reserved in 1usize..40_000, xref_stream_input in any::<bool>()) {
        let doc = if xref_stream_input { xref_stream() } else { one_page() };
        let prepared = ByteRangeDocumentWriter::default().prepare(&doc, &request(reserved, "ok")).unwrap();
        let range = prepared.byte_range();
        let field = prepared.field_name().to_string();
        let bytes = prepared.into_bytes().unwrap();

        prop_assert!(bytes.starts_with(doc.data()));
        prop_assert_eq!(range.offset1, 0);
        prop_assert!(range.covers_whole(bytes.len()));
        prop_assert_eq!(range.gap().len(), 2 * reserved + 2);
        prop_assert!(bytes[range.gap()][1..2 * reserved + 1].iter().all(|b| *b == b'0'));

        let reopened = PreparedRevision::reopen(bytes, &field).unwrap();
        prop_assert_eq!(reopened.byte_range(), range);
        prop_assert_eq!(reopened.reserved(), reserved);
    }

    /// Filling never changes the signed bytes; overflowing never writes.
    #[test]
    fn fill_only_touches_gap(reserved in 8usize..512, extra in 0usize..64, under in any::<bool>()) {
        let mut prepared = ByteRangeDocumentWriter::default().prepare(&one_page(), &request(reserved, "fill")).unwrap();
        let provider = default_provider();
        let before = prepared.digest(provider.as_ref(), DigestAlgorithm::Sha256).unwrap();
        let size = if under { reserved.saturating_sub(extra).max(1) } else { reserved + extra + 1 };
        match prepared.fill(&vec![0x5A; size]) {
            Ok(()) => prop_assert!(size <= reserved),
            Err(Error::ContainerTooLarge { reserved: r, actual }) => {
                prop_assert_eq!(r, reserved);
                prop_assert_eq!(actual, size);
            },
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
        let after = prepared.digest(provider.as_ref(), DigestAlgorithm::Sha256).unwrap();
        prop_assert_eq!(before, after);
    }

    /// Reasons with delimiters and non-Latin text read back unchanged.
    #[test]
    fn reason_text_survives(reason in "[\\PC()\\\\]{0,40}") {
        let bytes = ByteRangeDocumentWriter::default()
            .prepare(&one_page(), &request(64, &reason))
            .unwrap()
            .into_bytes()
            .unwrap();
        let doc = PdfDocument::from_bytes(bytes).unwrap();
        let sig = &doc.signatures().unwrap()[0];
        let stored = sig.dict.get("Reason").and_then(|o| o.as_string()).unwrap();
        prop_assert_eq!(text_string(stored), reason);
    }
}

#[test]
fn test_zero_placeholder_is_rejected() {
    let err = ByteRangeDocumentWriter::default()
        .prepare(&one_page(), &request(0, "none"))
        .unwrap_err();
    assert!(err.is_sizing());
}
