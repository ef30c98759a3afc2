use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test fixture paths
pub struct TestFixtures {
    pub fixtures_dir: PathBuf,
}

impl TestFixtures {
    pub fn new() -> Self {
        let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures");

        Self { fixtures_dir }
    }

    pub fn xml_dir(&self) -> PathBuf {
        self.fixtures_dir.join("xml")
    }

    /// Valid cart with literal non-ASCII text
    pub fn cart_xml(&self) -> PathBuf {
        self.xml_dir().join("example1.xml")
    }

    /// Valid cart with non-ASCII text as character references
    pub fn cart_escaped_xml(&self) -> PathBuf {
        self.xml_dir().join("example2.xml")
    }

    /// Cart violating the schema in six places
    pub fn invalid_cart_xml(&self) -> PathBuf {
        self.xml_dir().join("example3.xml")
    }

    pub fn cart_schema(&self) -> PathBuf {
        self.xml_dir().join("example.xsd")
    }
}

impl Default for TestFixtures {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a temporary directory holding a single config file
pub fn create_temp_config(name: &str, content: &str) -> std::io::Result<(TempDir, PathBuf)> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join(name);
    fs::write(&path, content)?;
    Ok((temp_dir, path))
}

pub fn create_test_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

#[test]
fn test_fixtures_exist() {
    let fixtures = TestFixtures::new();
    for path in [
        fixtures.cart_xml(),
        fixtures.cart_escaped_xml(),
        fixtures.invalid_cart_xml(),
        fixtures.cart_schema(),
    ] {
        assert!(path.exists(), "missing fixture {}", path.display());
    }
}
