//! Error type tests
//!
//! Tests for error types and error reporting.

use std::path::PathBuf;
use xml_session::error_reporter::ErrorReporter;
use xml_session::{ErrorKind, SessionOptions, ValidationReport, VerbosityLevel, XmlSessionError};

use crate::common::test_helpers::TestFixtures;

#[test]
fn test_error_messages_carry_context() {
    let schema_error = XmlSessionError::SchemaInit {
        path: PathBuf::from("file1.xsd"),
        details: "No such file or directory".to_string(),
    };
    let parse_error = XmlSessionError::XmlParse {
        path: PathBuf::from("file1.xml"),
        details: "Premature end of data".to_string(),
    };
    let xpath_error = XmlSessionError::XPathContext {
        query: "//item[".to_string(),
        details: "Invalid predicate".to_string(),
    };

    assert!(schema_error.to_string().contains("file1.xsd"));
    assert!(parse_error.to_string().contains("Premature end of data"));
    assert!(xpath_error.to_string().contains("//item["));
}

#[test]
fn test_validation_error_carries_full_report() {
    let report = ValidationReport {
        errors: vec!["e1\n".to_string(), "e2\n".to_string()],
        warnings: vec!["w1\n".to_string()],
    };
    let error = XmlSessionError::SchemaValidation(report.clone());

    assert_eq!(error.kind(), ErrorKind::SchemaValidation);
    assert_eq!(error.report(), Some(&report));
}

#[test]
fn test_session_errors_by_stage() {
    let fixtures = TestFixtures::new();

    let schema_stage = xml_session::DocumentSession::open(
        SessionOptions::new(fixtures.cart_xml()).with_schema(fixtures.xml_dir().join("missing.xsd")),
    )
    .unwrap_err();
    assert_eq!(schema_stage.kind(), ErrorKind::SchemaInit);

    let load_stage = xml_session::DocumentSession::open(
        SessionOptions::new(fixtures.xml_dir().join("missing.xml")).with_schema(fixtures.cart_schema()),
    )
    .unwrap_err();
    assert_eq!(load_stage.kind(), ErrorKind::XmlParse);

    let validate_stage = xml_session::DocumentSession::open(
        SessionOptions::new(fixtures.invalid_cart_xml()).with_schema(fixtures.cart_schema()),
    )
    .unwrap_err();
    assert_eq!(validate_stage.kind(), ErrorKind::SchemaValidation);
}

#[test]
fn test_reporter_formats_by_verbosity() {
    let error = XmlSessionError::XmlParse {
        path: PathBuf::from("cart.xml"),
        details: "Start tag expected".to_string(),
    };

    let normal = ErrorReporter::new(VerbosityLevel::Normal)
        .format_session_error(&error)
        .unwrap();
    assert_eq!(normal, error.to_string());

    let verbose = ErrorReporter::new(VerbosityLevel::Verbose)
        .format_session_error(&error)
        .unwrap();
    assert!(verbose.starts_with(&normal));
    assert!(verbose.contains("Suggestion:"));

    let quiet = ErrorReporter::new(VerbosityLevel::Quiet)
        .format_session_error(&error)
        .unwrap();
    assert_eq!(quiet, "PARSE ERROR: cart.xml");
}
