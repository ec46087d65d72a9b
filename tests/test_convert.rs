//! End-to-end conversion tests through the public entry points.

mod common;

use common::{minimal_pdf, pdf_with_font, synthetic_ttf, PdfBuilder, SYNTHETIC_ADVANCES};
use pdfa_oxide::compliance::{PdfAValidator, PdfAStandard};
use pdfa_oxide::convert::{ConversionOptions, ConversionRequest, ConversionResult, Converter};
use pdfa_oxide::embedder::{DirectoryFontSource, MemoryFontSource, XmpMetadata};
use pdfa_oxide::object::{Object, ObjectRef};
use pdfa_oxide::parser_config::ParserOptions;
use pdfa_oxide::{convert, Document, ErrorKind};

fn reparse(bytes: &[u8]) -> Document {
    Document::load(bytes, &ParserOptions::strict()).expect("converted output must re-parse strictly")
}

fn font_of_first_page(doc: &Document) -> ObjectRef {
    let page = doc.pages()[0];
    let resources = doc.page_resources(page).unwrap();
    let fonts = doc.lookup(resources, "Font").and_then(|f| f.as_dict()).unwrap();
    fonts.get("F1").and_then(|f| f.as_reference()).unwrap()
}

#[test]
fn test_every_standard_converts_minimal_pdf() {
    let input = minimal_pdf();
    for standard in PdfAStandard::ALL {
        let output = convert(&input, &standard.code()).unwrap();
        let doc = reparse(&output);

        assert_eq!(doc.version(), standard.pdf_version(), "{}", standard);
        let xmp = XmpMetadata::from_document(&doc).unwrap().unwrap();
        assert_eq!(xmp.pdfaid_part.as_deref(), Some(standard.xmp_part()));
        assert_eq!(xmp.pdfaid_conformance.as_deref(), Some(standard.xmp_conformance()));
        assert_eq!(xmp.standard(), Some(standard));
        assert!(doc.trailer().get("ID").is_some());
    }
}

#[test]
fn test_second_pass_is_clean() {
    let input = minimal_pdf();
    for standard in PdfAStandard::ALL {
        let first = convert(&input, &standard.code()).unwrap();
        let report = PdfAValidator::new().validate(&reparse(&first), standard);
        assert!(report.violations.is_empty(), "{}: {:?}", standard, report.violations);

        let request = ConversionRequest::with_standard(&first, standard).unwrap();
        let outcome = Converter::default().convert_detailed(&request).unwrap();
        assert!(outcome.report.violations.is_empty(), "{}", standard);
        assert!(outcome.report.fixes.is_empty(), "{}", standard);
    }
}

#[test]
fn test_argument_errors() {
    assert_eq!(convert(b"", "2b").unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(convert(b"", "4X").unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(
        convert(&minimal_pdf(), "4X").unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(convert(&minimal_pdf(), "").unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert!(convert(&minimal_pdf(), "1a").is_ok());
    assert!(convert(&minimal_pdf(), "PDF/A-3B").is_ok());
}

#[test]
fn test_garbage_input_is_malformed() {
    let err = convert(b"this is not a pdf at all", "2b").unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::MalformedSyntax | ErrorKind::UnrecoverableDocument | ErrorKind::InvalidXRef
    ));
}

#[test]
fn test_unembedded_font_without_source_fails() {
    let input = pdf_with_font("TestSans");
    for standard in PdfAStandard::ALL {
        let err = convert(&input, &standard.code()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnembeddableResource, "{}", standard);
        assert!(err.to_string().contains("TestSans"));
    }
}

#[test]
fn test_unembedded_font_is_embedded_from_source() {
    let input = pdf_with_font("ABCDEF+TestSans");
    let source = MemoryFontSource::new()
        .with_font("TestSans", synthetic_ttf("TestSans"))
        .unwrap();
    let converter = Converter::new(ConversionOptions::default().with_font_source(source));
    let request = ConversionRequest::new(&input, "1b").unwrap();
    let outcome = converter.convert_detailed(&request).unwrap();
    assert!(outcome.report.passed);

    let doc = reparse(&outcome.bytes);
    let font = doc.get(font_of_first_page(&doc)).and_then(|f| f.as_dict()).unwrap();
    assert_eq!(font.get("BaseFont").and_then(|b| b.as_name()), Some("TestSans"));

    let widths = doc.lookup(font, "Widths").and_then(|w| w.as_array()).unwrap();
    assert_eq!(widths.len(), 35);
    assert_eq!(widths[0].as_integer(), Some(SYNTHETIC_ADVANCES[1] as i64));
    assert_eq!(widths[33].as_integer(), Some(SYNTHETIC_ADVANCES[2] as i64));
    assert_eq!(widths[34].as_integer(), Some(SYNTHETIC_ADVANCES[3] as i64));

    let descriptor = doc.lookup(font, "FontDescriptor").and_then(|d| d.as_dict()).unwrap();
    let program = doc.lookup(descriptor, "FontFile2").unwrap();
    assert_eq!(program.decode_stream_data().unwrap(), synthetic_ttf("TestSans"));
    assert_eq!(descriptor.get("Ascent").and_then(|a| a.as_integer()), Some(800));
}

#[test]
fn test_font_directory_source() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("test-sans.ttf"), synthetic_ttf("TestSans")).unwrap();
    std::fs::write(dir.path().join("broken.ttf"), b"not a font").unwrap();

    let source = DirectoryFontSource::scan(&[dir.path()]).unwrap();
    assert!(!source.is_empty());

    let converter = Converter::new(ConversionOptions::default().with_font_source(source));
    let input = pdf_with_font("TestSans");
    let request = ConversionRequest::new(&input, "2b").unwrap();
    assert!(converter.convert(&request).is_success());
}

#[test]
fn test_encrypted_input_is_unsupported() {
    let input = common::minimal_builder("0 g")
        .object(
            9,
            "<< /Filter /Standard /V 1 /R 2 /O <00112233445566778899AABBCCDDEEFF00112233445566778899AABBCCDDEEFF> \
             /U <00112233445566778899AABBCCDDEEFF00112233445566778899AABBCCDDEEFF> /P -4 >>",
        )
        .trailer("/Encrypt 9 0 R /ID [<0123456789ABCDEF0123456789ABCDEF> <0123456789ABCDEF0123456789ABCDEF>]")
        .build();
    for standard in PdfAStandard::ALL {
        let err = convert(&input, &standard.code()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature, "{}", standard);
    }
}

#[test]
fn test_failure_result_carries_kind() {
    let input = common::minimal_builder("0 g")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /XObject << /PS1 5 0 R >> >> >>")
        .stream(5, "/Type /XObject /Subtype /PS", b"%!PS")
        .build();
    let request = ConversionRequest::new(&input, "2b").unwrap();
    match Converter::default().convert(&request) {
        ConversionResult::Failure { kind, message } => {
            assert_eq!(kind, ErrorKind::UnsupportedFeature);
            assert!(!message.is_empty());
        },
        ConversionResult::Success(_) => panic!("PostScript XObject must not convert"),
    }
}

#[test]
fn test_info_and_xmp_stay_in_step() {
    let input = common::minimal_builder("0 g")
        .object(9, "<< /Title (Quarterly Report) /Author (Jane Doe) /CreationDate (D:20240102030405Z) >>")
        .trailer("/Info 9 0 R")
        .build();
    let output = convert(&input, "2b").unwrap();
    let doc = reparse(&output);

    let xmp = XmpMetadata::from_document(&doc).unwrap().unwrap();
    assert_eq!(xmp.dc_title.as_deref(), Some("Quarterly Report"));
    assert_eq!(xmp.dc_creator, vec!["Jane Doe".to_string()]);
    assert!(xmp.xmp_create_date.as_deref().is_some_and(|d| d.starts_with("2024-01-02T03:04:05")));

    let info = doc.info().unwrap();
    assert_eq!(
        info.get("Title").and_then(|t| t.as_text()).as_deref(),
        Some("Quarterly Report")
    );
}

#[test]
fn test_identifiers_follow_the_input() {
    let identifiers = |input: &[u8], code: &str| {
        let doc = reparse(&convert(input, code).unwrap());
        let xmp = XmpMetadata::from_document(&doc).unwrap().unwrap();
        let id = doc.trailer().get("ID").cloned().unwrap();
        (xmp.xmpmm_document_id.unwrap(), xmp.xmpmm_instance_id.unwrap(), xmp.xmp_metadata_date, id)
    };
    let input = minimal_pdf();
    let first = identifiers(&input, "2b");
    assert_eq!(first, identifiers(&input, "2b"));
    assert_eq!(first.2, None);

    let other = identifiers(&input, "1b");
    assert_eq!(other.0, first.0);
    assert_ne!(other.1, first.1);

    let changed = identifiers(&common::minimal_builder("1 g").build(), "2b");
    assert_ne!(changed.0, first.0);
    assert_ne!(changed.3, first.3);
}

#[test]
fn test_output_intent_installed() {
    let output = convert(&minimal_pdf(), "3b").unwrap();
    let doc = reparse(&output);
    let catalog = doc.catalog().unwrap();
    let intents = doc.lookup(catalog, "OutputIntents").and_then(|o| o.as_array()).unwrap();
    assert_eq!(intents.len(), 1);
    let intent = doc.resolve_dict(&intents[0]).unwrap();
    assert_eq!(intent.get("S").and_then(|s| s.as_name()), Some("GTS_PDFA1"));
    let profile = doc.lookup(intent, "DestOutputProfile").unwrap();
    assert!(profile.is_stream());
    assert!(matches!(profile.as_dict().and_then(|d| d.get("N")), Some(Object::Integer(3))));
}

#[test]
fn test_parallel_conversions() {
    let converter = Converter::default();
    let input = minimal_pdf();
    let results: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = ["1b", "2b", "3a"]
            .iter()
            .map(|code| {
                let converter = &converter;
                let input = &input;
                scope.spawn(move || {
                    let request = ConversionRequest::new(input, code).unwrap();
                    converter.convert(&request).is_success()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(results, vec![true, true, true]);
}
