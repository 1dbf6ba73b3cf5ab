use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

use crate::entry::MftEntry;
use crate::error::Result;

/// Provenance of one input `$MFT` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    /// xxh3-64 of the whole file, lowercase hex.
    pub hash: String,
    pub modify_time: Option<DateTime<Utc>>,
    pub access_time: Option<DateTime<Utc>>,
    pub create_time: Option<DateTime<Utc>>,
}

impl SourceFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)?;
        let hash = hash_file(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("ledger {}: {} bytes, xxh3 {}", path.display(), metadata.len(), hash);
        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            size: metadata.len(),
            hash,
            modify_time: metadata.modified().ok().map(DateTime::<Utc>::from),
            access_time: metadata.accessed().ok().map(DateTime::<Utc>::from),
            create_time: metadata.created().ok().map(DateTime::<Utc>::from),
        })
    }
}

fn hash_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Xxh3::new();
    let mut chunk = vec![0u8; 1 << 16];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(format!("{:016x}", hasher.digest()))
}

/// An entry together with where it came from.
#[derive(Debug, Clone)]
pub struct LocatedEntry {
    pub source: Arc<SourceFile>,
    pub record_index: u64,
    pub entry: MftEntry,
}

/// Expand the given sources into input files: files are taken as-is,
/// directories contribute their immediate, non-hidden regular files.
pub fn frontier(sources: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for src in sources {
        let src = fs::canonicalize(src).unwrap_or_else(|_| src.clone());
        if src.is_file() {
            out.push(src);
        } else if src.is_dir() {
            let children = match fs::read_dir(&src) {
                Ok(children) => children,
                Err(e) => {
                    warn!("cannot list {}: {}", src.display(), e);
                    continue;
                }
            };
            let mut found: Vec<PathBuf> = children
                .filter_map(|c| c.ok().map(|c| c.path()))
                .filter(|p| {
                    !p.file_name()
                        .map(|n| n.to_string_lossy().starts_with('.'))
                        .unwrap_or(true)
                })
                .filter(|p| {
                    if p.is_file() {
                        true
                    } else {
                        warn!("skipping {}: not a regular file", p.display());
                        false
                    }
                })
                .collect();
            found.sort();
            out.extend(found);
        } else {
            warn!("source {} does not exist", src.display());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn ledger_hashes_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("$MFT");
        File::create(&path).unwrap().write_all(b"FILE0").unwrap();
        let source = SourceFile::from_path(&path).unwrap();
        assert_eq!(source.file_name, "$MFT");
        assert_eq!(source.size, 5);
        assert_eq!(
            source.hash,
            format!("{:016x}", xxhash_rust::xxh3::xxh3_64(b"FILE0"))
        );
        assert!(source.modify_time.is_some());
    }

    #[test]
    fn frontier_keeps_only_regular_files_one_level_down() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.mft"), b"").unwrap();
        fs::write(dir.path().join("a.mft"), b"").unwrap();
        fs::write(dir.path().join(".hidden"), b"").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.mft"), b"").unwrap();
        let single = dir.path().join("nested").join("c.mft");

        let found = frontier(&[dir.path().to_path_buf(), single, dir.path().join("missing")]);
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.mft", "b.mft", "c.mft"]);
        assert!(found.iter().all(|p| p.is_file()));
    }
}
