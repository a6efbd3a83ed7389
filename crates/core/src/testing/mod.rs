//! Testing utilities and mock implementations.
//!
//! Mocks for the transfer and notification seams let a whole stage run
//! without a network or a mail service.
//!
//! # Example
//!
//! ```rust,ignore
//! use shuttle_core::testing::{fixtures, MockNotifier, MockTransferClient};
//!
//! let client = MockTransferClient::new();
//! let notifier = MockNotifier::new();
//!
//! fixtures::write_upload(&uploads_dir, "alice", "S1", &[("a.txt", b"a")]);
//! client.set_corrupt_uploads(true).await;
//! ```

mod mock_notifier;
mod mock_transfer_client;

pub use mock_notifier::MockNotifier;
pub use mock_transfer_client::{MockTransferClient, RecordedTransfer};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use crate::checksum::{digest_reader, MANIFEST_EXTENSION};

    /// Hex MD5 of `data`.
    pub fn md5_hex(data: &[u8]) -> String {
        digest_reader(data).unwrap()
    }

    /// `md5sum`-format manifest text for `files`.
    pub fn manifest_text(files: &[(&str, &[u8])]) -> String {
        files
            .iter()
            .map(|(name, data)| format!("{}  {}\n", md5_hex(data), name))
            .collect()
    }

    /// Writes `<base>/<owner>/<name>/` with `files` and a matching
    /// `<name>.md5sum`. Returns the submission directory.
    pub fn write_upload(base: &Path, owner: &str, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
        let dir = base.join(owner).join(name);
        fs::create_dir_all(&dir).unwrap();
        for (file, data) in files {
            fs::write(dir.join(file), data).unwrap();
        }
        fs::write(
            dir.join(format!("{}.{}", name, MANIFEST_EXTENSION)),
            manifest_text(files),
        )
        .unwrap();
        dir
    }

    /// Zip archive bytes holding `entries`.
    pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// Writes a zip archive of `entries` to `path`.
    pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut file = File::create(path).unwrap();
        file.write_all(&zip_bytes(entries)).unwrap();
    }
}
