// ABOUTME: Append-only delivery manifest referencing built packages in creation order.
// ABOUTME: Each build appends one fsynced "package <name>" line for the external delivery tool.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

const ENTRY_PREFIX: &str = "package ";

/// Errors that can occur during delivery manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An append-only `.delivery` file.
pub struct DeliveryManifest {
    path: PathBuf,
    file: File,
}

impl DeliveryManifest {
    /// Where the manifest with the given stem lives in `dir`.
    pub fn path_for(dir: &Path, stem: &str) -> PathBuf {
        dir.join(format!("{}.delivery", stem))
    }

    /// Open (or create) the manifest `<dir>/<stem>.delivery` in append mode.
    pub fn open(dir: &Path, stem: &str) -> Result<Self, ManifestError> {
        fs::create_dir_all(dir)?;
        let path = Self::path_for(dir, stem);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a `package <name>` line and fsync it.
    pub fn append(&mut self, package_name: &str) -> Result<(), ManifestError> {
        writeln!(self.file, "{}{}", ENTRY_PREFIX, package_name)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Read the package names referenced by a manifest, in file order.
    /// Blank lines and lines that are not package entries are skipped.
    pub fn entries(path: &Path) -> Result<Vec<String>, ManifestError> {
        let reader = BufReader::new(File::open(path)?);
        let mut names = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if let Some(name) = line.trim().strip_prefix(ENTRY_PREFIX) {
                names.push(name.trim().to_string());
            }
        }

        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_writes_package_lines_in_order() {
        let dir = TempDir::new().unwrap();

        let mut manifest = DeliveryManifest::open(dir.path(), "deploy").unwrap();
        manifest.append("first").unwrap();
        manifest.append("second").unwrap();
        drop(manifest);

        let path = DeliveryManifest::path_for(dir.path(), "deploy");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "package first\npackage second\n"
        );
        assert_eq!(
            DeliveryManifest::entries(&path).unwrap(),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[test]
    fn reopening_appends_rather_than_truncates() {
        let dir = TempDir::new().unwrap();

        DeliveryManifest::open(dir.path(), "deploy")
            .unwrap()
            .append("one")
            .unwrap();
        let mut reopened = DeliveryManifest::open(dir.path(), "deploy").unwrap();
        reopened.append("two").unwrap();

        let entries = DeliveryManifest::entries(reopened.path()).unwrap();
        assert_eq!(entries, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn entries_skip_unrelated_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.delivery");
        fs::write(&path, "\n# comment\npackage kept\nsomething else\n").unwrap();

        assert_eq!(
            DeliveryManifest::entries(&path).unwrap(),
            vec!["kept".to_string()]
        );
    }

    #[test]
    fn open_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");

        let manifest = DeliveryManifest::open(&nested, "deploy").unwrap();
        assert!(manifest.path().exists());
    }
}
