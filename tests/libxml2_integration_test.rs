use std::io::Write;

use rayon::prelude::*;
use tempfile::NamedTempFile;

use xml_session::{
    CompiledSchema, DocumentLoader, DocumentSession, ErrorKind, NodeKind, SessionOptions,
    XPathEngine, XPathValue, node_to_string,
};

const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root" type="xs:string"/>
</xs:schema>"#;

const VALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root>Hello World</root>"#;

const INVALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root><invalid>content</invalid></root>"#;

fn temp_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_init_is_idempotent() {
    for _ in 0..3 {
        xml_session::init();
    }

    let document = DocumentLoader::default()
        .load_from_memory(VALID_XML.as_bytes(), "root.xml")
        .unwrap();
    assert_eq!(document.root().unwrap().name(), "root");
}

#[test]
fn test_init_from_many_threads() {
    (0..32).into_par_iter().for_each(|_| xml_session::init());

    let names: Vec<_> = (0..32)
        .into_par_iter()
        .map(|i| {
            let xml = format!("<doc{0}>value</doc{0}>", i);
            let document = DocumentLoader::default()
                .load_from_memory(xml.as_bytes(), format!("doc{}.xml", i))
                .unwrap();
            document.root().unwrap().name()
        })
        .collect();

    for (i, name) in names.iter().enumerate() {
        assert_eq!(name, &format!("doc{}", i));
    }
}

#[test]
fn test_end_to_end_validation() {
    let schema_file = temp_file(SIMPLE_XSD);
    let valid = temp_file(VALID_XML);
    let invalid = temp_file(INVALID_XML);

    let session =
        DocumentSession::open(SessionOptions::new(valid.path()).with_schema(schema_file.path()))
            .unwrap();
    assert!(session.validation_report().is_empty());

    let err =
        DocumentSession::open(SessionOptions::new(invalid.path()).with_schema(schema_file.path()))
            .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaValidation);
    assert!(err.report().unwrap().has_errors());
}

#[test]
fn test_concurrent_sessions() {
    let schema_file = temp_file(SIMPLE_XSD);
    let files: Vec<_> = (0..8)
        .map(|i| temp_file(if i % 2 == 0 { VALID_XML } else { INVALID_XML }))
        .collect();

    // Each thread compiles its own schema and owns its own tree
    let outcomes: Vec<_> = files
        .par_iter()
        .map(|file| {
            DocumentSession::open(
                SessionOptions::new(file.path()).with_schema(schema_file.path()),
            )
            .map(|session| session.xpath("/root").map(|nodes| nodes.len()))
        })
        .collect();

    for (i, outcome) in outcomes.into_iter().enumerate() {
        if i % 2 == 0 {
            assert_eq!(outcome.unwrap().unwrap(), 1, "file {}", i);
        } else {
            let err = outcome.unwrap_err();
            assert_eq!(err.report().map(|r| r.errors.len()), Some(1), "file {}", i);
        }
    }
}

#[test]
fn test_concurrent_schema_compilation() {
    // Compiled schemas stay on the thread that built them
    let compiled: Vec<bool> = (0..16)
        .into_par_iter()
        .map(|i| {
            CompiledSchema::compile_from_memory(SIMPLE_XSD.as_bytes(), format!("s{}.xsd", i))
                .is_ok()
        })
        .collect();

    assert!(compiled.into_iter().all(|ok| ok));
}

#[test]
fn test_schema_reuse() {
    let mut schema = CompiledSchema::compile_from_memory(SIMPLE_XSD.as_bytes(), "simple.xsd").unwrap();
    let loader = DocumentLoader::default();

    for i in 0..3 {
        let document = loader
            .load_from_memory(VALID_XML.as_bytes(), "root.xml")
            .unwrap();
        assert!(schema.validate(&document).is_ok(), "Validation {} failed", i);
    }
}

#[test]
fn test_external_entities_are_refused() {
    let secret = temp_file("TOP SECRET");
    let xml = format!(
        r#"<?xml version="1.0"?>
<!DOCTYPE root [<!ENTITY leak SYSTEM "file://{}">]>
<root>&leak;</root>"#,
        secret.path().display()
    );

    let document = DocumentLoader::default()
        .load_from_memory(xml.as_bytes(), "xxe.xml")
        .unwrap();
    let root = document.root().unwrap();

    // The reference stays an unexpanded entity node
    let kinds: Vec<_> = root.children().map(|n| n.kind()).collect();
    assert_eq!(kinds, vec![NodeKind::EntityRef]);
    assert!(!root.content().contains("TOP SECRET"));

    let text = XPathEngine::new()
        .evaluate_value(&document, "string(/root)")
        .unwrap();
    match text {
        XPathValue::String(text) => assert!(!text.contains("TOP SECRET")),
        other => panic!("Expected a string, got {:?}", other),
    }

    let markup = String::from_utf8(node_to_string(&root).unwrap()).unwrap();
    assert!(markup.contains("&leak;"));
    assert!(!markup.contains("TOP SECRET"));
}

#[test]
fn test_schema_include_is_not_fetched() {
    let included = temp_file(SIMPLE_XSD);
    let xsd = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:include schemaLocation="file://{}"/>
</xs:schema>"#,
        included.path().display()
    );

    let outcome = CompiledSchema::compile_from_memory(xsd.as_bytes(), "including.xsd").and_then(|mut schema| {
        let document = DocumentLoader::default()
            .load_from_memory(VALID_XML.as_bytes(), "root.xml")
            .unwrap();
        schema.validate(&document)
    });

    // With the include refused there is no declaration for <root>
    assert!(outcome.is_err());
}
