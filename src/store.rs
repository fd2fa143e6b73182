use std::fs;
use std::io::{self, Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::error::IbeError;
use crate::source::SourceBinding;

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Download cache: search results and data files, grouped per mission table.
#[derive(Debug, Clone)]
pub struct Store {
    cache_root: Utf8PathBuf,
}

impl Store {
    /// `cache_dir` when given, else `~/.cache/firefly-ibe`.
    pub fn new(cache_dir: Option<&Utf8Path>) -> Result<Self, IbeError> {
        if let Some(dir) = cache_dir {
            return Ok(Self::new_with_root(dir.to_owned()));
        }
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("firefly-ibe")).ok()
            })
            .ok_or_else(|| IbeError::Filesystem("unable to resolve cache directory".to_string()))?;
        Ok(Self { cache_root })
    }

    pub fn new_with_root(cache_root: Utf8PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn data_dir(&self, binding: &SourceBinding) -> Utf8PathBuf {
        self.cache_root
            .join("data")
            .join(&binding.mission)
            .join(&binding.dataset)
            .join(&binding.table_name)
    }

    pub fn results_path(&self, binding: &SourceBinding, name: &str) -> Utf8PathBuf {
        self.cache_root
            .join("results")
            .join(&binding.mission)
            .join(format!("{}-{name}.tbl", binding.table_name))
    }

    pub fn metadata_path(file: &Utf8Path) -> Utf8PathBuf {
        let mut name = file.file_name().unwrap_or("download").to_string();
        name.push_str(".json");
        file.with_file_name(name)
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), IbeError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| IbeError::Filesystem(format!("create {path}: {err}")))
    }

    /// Streams `reader` into a temp file next to `dest`, then renames it into
    /// place. A failed transfer never leaves a partial file at `dest`.
    ///
    /// Errors raised by `reader` go through `read_error`; errors writing the
    /// temp file are reported as [`IbeError::Filesystem`].
    pub fn write_stream_atomic(
        dest: &Utf8Path,
        reader: &mut dyn Read,
        read_error: impl Fn(io::Error) -> IbeError,
    ) -> Result<u64, IbeError> {
        let parent = dest
            .parent()
            .ok_or_else(|| IbeError::Filesystem(format!("invalid destination path {dest}")))?;
        Self::ensure_dir(parent)?;
        let mut temp = Builder::new()
            .prefix(".firefly-ibe")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| IbeError::Filesystem(err.to_string()))?;

        let mut buffer = vec![0u8; COPY_BUFFER_BYTES];
        let mut written = 0u64;
        loop {
            let count = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(count) => count,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(read_error(err)),
            };
            temp.as_file_mut()
                .write_all(&buffer[..count])
                .map_err(|err| IbeError::Filesystem(format!("write {dest}: {err}")))?;
            written += count as u64;
        }

        temp.persist(dest.as_std_path())
            .map_err(|err| IbeError::Filesystem(err.to_string()))?;
        Ok(written)
    }

    pub fn write_bytes_atomic(dest: &Utf8Path, content: &[u8]) -> Result<(), IbeError> {
        let mut reader = content;
        Self::write_stream_atomic(dest, &mut reader, |err| {
            IbeError::Filesystem(err.to_string())
        })
        .map(|_| ())
    }

    pub fn write_metadata(file: &Utf8Path, metadata: &Metadata) -> Result<Utf8PathBuf, IbeError> {
        let path = Self::metadata_path(file);
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| IbeError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(&path, &content)?;
        Ok(path)
    }
}

/// Sidecar written next to every fetched file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub mission: String,
    pub dataset: String,
    pub table: String,
    pub url: Option<String>,
    pub origin: String,
    pub response_code: u16,
    pub fetched_at: String,
    pub tool: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_root(Utf8PathBuf::from("/tmp/ibe-cache"));
        let binding = SourceBinding::new("https://host/ibe", "wise", "allsky", "4band_p1bm_frm");

        assert_eq!(
            store.data_dir(&binding),
            Utf8PathBuf::from("/tmp/ibe-cache/data/wise/allsky/4band_p1bm_frm")
        );
        assert!(
            store
                .results_path(&binding, "query")
                .ends_with("results/wise/4band_p1bm_frm-query.tbl")
        );
        assert_eq!(
            Store::metadata_path(Utf8Path::new("/x/y/frame.fits.gz")),
            Utf8PathBuf::from("/x/y/frame.fits.gz.json")
        );
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let dest = root.join("nested/out.tbl");

        Store::write_bytes_atomic(&dest, b"first").unwrap();
        Store::write_bytes_atomic(&dest, b"second").unwrap();
        assert_eq!(fs::read_to_string(dest.as_std_path()).unwrap(), "second");

        let leftovers = fs::read_dir(root.join("nested").as_std_path())
            .unwrap()
            .count();
        assert_eq!(leftovers, 1);
    }

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"))
        }
    }

    #[test]
    fn read_errors_are_mapped_by_caller() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let dest = root.join("frame.fits");

        let err = Store::write_stream_atomic(&dest, &mut BrokenReader, |source| IbeError::Body {
            url: "https://host/ibe/data/frame.fits".to_string(),
            source,
        })
        .unwrap_err();
        assert!(matches!(err, IbeError::Body { ref source, .. } if source.kind() == io::ErrorKind::UnexpectedEof));
        assert!(!dest.as_std_path().exists());
        assert_eq!(fs::read_dir(root.as_std_path()).unwrap().count(), 0);
    }
}
