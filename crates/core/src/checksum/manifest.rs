//! Checksum manifest parsing and discovery.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::ChecksumError;

/// File extension identifying manifest files.
pub const MANIFEST_EXTENSION: &str = "md5sum";

/// Expected digests keyed by file basename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumManifest {
    source: Option<PathBuf>,
    entries: BTreeMap<String, String>,
}

impl ChecksumManifest {
    /// Parses `md5sum` output: `<hex-digest>  <filename>` per line.
    ///
    /// Filenames are reduced to their basename. The binary-mode marker
    /// (`<digest> *<filename>`) is accepted. Blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self, ChecksumError> {
        let mut entries = BTreeMap::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let (digest, name) = line
                .split_once("  ")
                .or_else(|| line.split_once(" *"))
                .ok_or_else(|| ChecksumError::ManifestParse {
                    line: line_no,
                    reason: format!("expected '<digest>  <filename>', got {:?}", line),
                })?;

            let digest = parse_digest(digest, line_no)?;
            let name = basename(name.trim().trim_start_matches('*')).ok_or_else(|| {
                ChecksumError::ManifestParse {
                    line: line_no,
                    reason: "missing file name".to_string(),
                }
            })?;

            if entries.insert(name.clone(), digest).is_some() {
                return Err(ChecksumError::ManifestParse {
                    line: line_no,
                    reason: format!("duplicate entry for {}", name),
                });
            }
        }

        Ok(Self {
            source: None,
            entries,
        })
    }

    /// Parses a manifest that sits next to an archive.
    ///
    /// The analysis framework writes `<name>.md5sum` holding only the bare
    /// digest of `<name>.zip`; such a manifest is attributed to `archive_name`.
    /// Regular `md5sum`-format manifests are parsed as usual.
    pub fn parse_for_archive(text: &str, archive_name: &str) -> Result<Self, ChecksumError> {
        let trimmed = text.trim();
        let is_bare_digest =
            !trimmed.is_empty() && !trimmed.contains(char::is_whitespace);

        if !is_bare_digest {
            return Self::parse(text);
        }

        let digest = parse_digest(trimmed, 1)?;
        Ok(Self::from_entries([(archive_name.to_string(), digest)]))
    }

    /// Builds a manifest from `(file, digest)` pairs.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            source: None,
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into().to_ascii_lowercase()))
                .collect(),
        }
    }

    /// Manifest file this was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Expected digest for `file`.
    pub fn get(&self, file: &str) -> Option<&str> {
        self.entries.get(file).map(String::as_str)
    }

    /// Entries in file-name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks that `files` and the manifest correspond one to one.
    ///
    /// Manifest files among `files` are ignored; they travel with the data
    /// but do not describe themselves.
    pub fn check_coverage<S: AsRef<str>>(&self, files: &[S]) -> Result<(), ChecksumError> {
        let data_files: Vec<&str> = files
            .iter()
            .map(AsRef::as_ref)
            .filter(|f| !is_manifest_file(f))
            .collect();

        let mut missing: Vec<String> = data_files
            .iter()
            .filter(|f| !self.entries.contains_key(**f))
            .map(|f| f.to_string())
            .collect();
        missing.sort();

        let unexpected: Vec<String> = self
            .entries
            .keys()
            .filter(|name| !data_files.contains(&name.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(ChecksumError::ManifestIncomplete {
                missing,
                unexpected,
            })
        }
    }

    fn with_source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }
}

/// Whether `name` is a manifest file.
pub fn is_manifest_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext == MANIFEST_EXTENSION)
}

/// Locates the single manifest in `dir`.
pub async fn find_manifest(dir: &Path) -> Result<PathBuf, ChecksumError> {
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ChecksumError::io(dir, e))?;

    let mut candidates = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| ChecksumError::io(dir, e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_manifest_file(&name) {
            continue;
        }
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| ChecksumError::io(entry.path(), e))?;
        if file_type.is_file() {
            candidates.push(name);
        }
    }
    candidates.sort();

    match candidates.len() {
        0 => Err(ChecksumError::ManifestMissing {
            dir: dir.to_path_buf(),
        }),
        1 => Ok(dir.join(&candidates[0])),
        _ => Err(ChecksumError::ManifestAmbiguous {
            dir: dir.to_path_buf(),
            candidates,
        }),
    }
}

/// Finds and parses the single manifest in `dir`.
pub async fn load_manifest(dir: &Path) -> Result<ChecksumManifest, ChecksumError> {
    let path = find_manifest(dir).await?;
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| ChecksumError::io(&path, e))?;

    let manifest = ChecksumManifest::parse(&text)?.with_source(path.clone());
    debug!(
        manifest = %path.display(),
        entries = manifest.len(),
        "Loaded checksum manifest"
    );
    Ok(manifest)
}

fn parse_digest(raw: &str, line: usize) -> Result<String, ChecksumError> {
    let digest = raw.trim();
    if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ChecksumError::ManifestParse {
            line,
            reason: format!("invalid hex digest {:?}", digest),
        });
    }
    Ok(digest.to_ascii_lowercase())
}

fn basename(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_two_space_line() {
        let manifest = ChecksumManifest::parse("abc123  seq.fasta\n").unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get("seq.fasta"), Some("abc123"));
    }

    #[test]
    fn test_parse_strips_directories_and_blank_lines() {
        let text = "\n0cc175b9c0f1b6a831c399e269772661  ./upload/a.txt\n\n\
                    92EB5FFEE6AE2FEC3AD71C777531578F  /abs/path/b.txt\n";
        let manifest = ChecksumManifest::parse(text).unwrap();
        assert_eq!(manifest.get("a.txt"), Some("0cc175b9c0f1b6a831c399e269772661"));
        assert_eq!(manifest.get("b.txt"), Some("92eb5ffee6ae2fec3ad71c777531578f"));
    }

    #[test]
    fn test_parse_binary_marker() {
        let manifest = ChecksumManifest::parse("abc123 *reads.fastq.gz").unwrap();
        assert_eq!(manifest.get("reads.fastq.gz"), Some("abc123"));
    }

    #[test]
    fn test_parse_rejects_single_space_separator() {
        let result = ChecksumManifest::parse("abc123 seq.fasta");
        assert!(matches!(
            result,
            Err(ChecksumError::ManifestParse { line: 1, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_hex_digest() {
        let result = ChecksumManifest::parse("a.txt  abc123");
        assert!(matches!(result, Err(ChecksumError::ManifestParse { .. })));
    }

    #[test]
    fn test_parse_rejects_duplicate_entries() {
        let result = ChecksumManifest::parse("abc  a.txt\ndef  dir/a.txt\n");
        assert!(matches!(
            result,
            Err(ChecksumError::ManifestParse { line: 2, .. })
        ));
    }

    #[test]
    fn test_parse_for_archive_bare_digest() {
        let manifest =
            ChecksumManifest::parse_for_archive("D41D8CD98F00B204E9800998ECF8427E\n", "S1.zip")
                .unwrap();
        assert_eq!(manifest.get("S1.zip"), Some("d41d8cd98f00b204e9800998ecf8427e"));
    }

    #[test]
    fn test_parse_for_archive_regular_format() {
        let manifest = ChecksumManifest::parse_for_archive("abc  S1.zip\n", "S1.zip").unwrap();
        assert_eq!(manifest.get("S1.zip"), Some("abc"));
    }

    #[test]
    fn test_check_coverage_ignores_manifest_file() {
        let manifest = ChecksumManifest::from_entries([("a.txt", "abc")]);
        assert!(manifest.check_coverage(&["a.txt", "a.txt.md5sum"]).is_ok());
    }

    #[test]
    fn test_check_coverage_reports_both_directions() {
        let manifest = ChecksumManifest::from_entries([("a.txt", "abc"), ("gone.txt", "def")]);
        let err = manifest
            .check_coverage(&["a.txt", "extra.txt", "S1.md5sum"])
            .unwrap_err();

        match err {
            ChecksumError::ManifestIncomplete {
                missing,
                unexpected,
            } => {
                assert_eq!(missing, vec!["extra.txt".to_string()]);
                assert_eq!(unexpected, vec!["gone.txt".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_is_manifest_file() {
        assert!(is_manifest_file("S1.md5sum"));
        assert!(is_manifest_file("a.txt.md5sum"));
        assert!(!is_manifest_file("md5sum.txt"));
        assert!(!is_manifest_file("S1.zip"));
    }

    #[tokio::test]
    async fn test_load_manifest_from_directory() {
        let temp = TempDir::new().unwrap();
        tokio::fs::write(temp.path().join("a.txt"), "a").await.unwrap();
        tokio::fs::write(
            temp.path().join("S1.md5sum"),
            "0cc175b9c0f1b6a831c399e269772661  a.txt\n",
        )
        .await
        .unwrap();

        let manifest = load_manifest(temp.path()).await.unwrap();
        assert_eq!(manifest.get("a.txt"), Some("0cc175b9c0f1b6a831c399e269772661"));
        assert_eq!(manifest.source(), Some(temp.path().join("S1.md5sum").as_path()));
    }

    #[tokio::test]
    async fn test_load_manifest_missing() {
        let temp = TempDir::new().unwrap();
        tokio::fs::write(temp.path().join("a.txt"), "a").await.unwrap();

        let result = load_manifest(temp.path()).await;
        assert!(matches!(result, Err(ChecksumError::ManifestMissing { .. })));
    }

    #[tokio::test]
    async fn test_load_manifest_ambiguous() {
        let temp = TempDir::new().unwrap();
        tokio::fs::write(temp.path().join("one.md5sum"), "abc  a.txt\n")
            .await
            .unwrap();
        tokio::fs::write(temp.path().join("two.md5sum"), "abc  a.txt\n")
            .await
            .unwrap();

        match load_manifest(temp.path()).await {
            Err(ChecksumError::ManifestAmbiguous { candidates, .. }) => {
                assert_eq!(candidates, vec!["one.md5sum", "two.md5sum"]);
            }
            other => panic!("expected ManifestAmbiguous, got {other:?}"),
        }
    }
}
