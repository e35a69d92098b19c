//! Directory walk + content-addressed file records (SPEC_FULL.md §4.1).

use crate::config::FileCompassConfig;
use crate::error::EngineResult;
use crate::types::{FileRecord, FileType};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Walks `roots`, applying `config`'s skip-dir and extension rules, and
/// returns one [`FileRecord`] per readable text file. `id` is left `0` — the
/// caller (the metadata store) assigns real ids on insert.
pub fn scan_files(roots: &[PathBuf], config: &FileCompassConfig) -> Vec<FileRecord> {
    let visited: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));
    let results: Arc<Mutex<Vec<FileRecord>>> = Arc::new(Mutex::new(Vec::new()));

    for root in roots {
        if !root.exists() {
            warn!(root = %root.display(), "scan root does not exist, skipping");
            continue;
        }
        let skip = config.skip_dirs.clone();
        let extensions = config.extensions.clone();

        WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(true)
            .threads(rayon::current_num_threads().min(12))
            .filter_entry(move |entry| {
                if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                    let name = entry.file_name().to_string_lossy();
                    return !skip.contains(name.as_ref());
                }
                true
            })
            .build_parallel()
            .run(|| {
                let extensions = extensions.clone();
                let root = root.clone();
                let visited = Arc::clone(&visited);
                let results = Arc::clone(&results);
                Box::new(move |entry| {
                    let entry = match entry {
                        Ok(e) => e,
                        Err(_) => return ignore::WalkState::Continue,
                    };
                    if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                        return ignore::WalkState::Continue;
                    }
                    let path = entry.path();
                    let Ok(canonical) = path.canonicalize() else {
                        return ignore::WalkState::Continue;
                    };
                    {
                        let mut seen = visited.lock().unwrap();
                        if !seen.insert(canonical) {
                            return ignore::WalkState::Continue;
                        }
                    }

                    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                    if !extensions.is_empty() && !extensions.contains(ext) {
                        return ignore::WalkState::Continue;
                    }
                    if !is_text_file(path) {
                        return ignore::WalkState::Continue;
                    }

                    match build_record(path, &root) {
                        Ok(record) => results.lock().unwrap().push(record),
                        Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable file"),
                    }
                    ignore::WalkState::Continue
                })
            });
    }

    Arc::try_unwrap(results).unwrap().into_inner().unwrap()
}

/// Heuristic binary-file detector: a NUL byte in the first 8KB means binary.
fn is_text_file(path: &Path) -> bool {
    let mut file = match fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    let mut buf = [0u8; 8192];
    let n = match std::io::Read::read(&mut file, &mut buf) {
        Ok(n) => n,
        Err(_) => return false,
    };
    !buf[..n].contains(&0)
}

fn build_record(path: &Path, root: &Path) -> EngineResult<FileRecord> {
    let bytes = fs::read(path)?;
    let metadata = fs::metadata(path)?;
    let content_hash = hex_sha256(&bytes);
    let relative_path = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let modified_at = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Ok(FileRecord {
        id: 0,
        path: path.to_path_buf(),
        relative_path,
        file_type: FileType::from_extension(ext),
        size_bytes: metadata.len(),
        modified_at,
        content_hash,
    })
}

pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Checks that `path` is contained in one of `roots`, then canonicalizes it.
///
/// Containment is checked first, against a lexically-normalized (`.`/`..`
/// collapsed, no filesystem access) form of `path` compared to each root's
/// canonical form — this never requires `path` itself to exist, so a
/// nonexistent path outside every root is rejected as `AccessDenied` rather
/// than leaking `NotFound` (which would confirm-or-deny existence for paths
/// callers should never have been able to probe at all). Existence is only
/// checked once containment is established.
pub fn validate_path(path: &Path, roots: &[PathBuf]) -> EngineResult<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };
    let normalized = lexically_normalize(&absolute);

    let contained = roots.iter().any(|root| match root.canonicalize() {
        Ok(canonical_root) => normalized.starts_with(&canonical_root),
        Err(_) => false,
    });
    if !contained {
        return Err(crate::error::EngineError::access_denied("path is outside configured roots"));
    }

    path.canonicalize()
        .map_err(|_| crate::error::EngineError::not_found(format!("no such path: {}", path.display())))
}

/// Collapses `.`/`..` components without touching the filesystem.
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_hash_identically_regardless_of_path() {
        let a = hex_sha256(b"def hello(): pass");
        let b = hex_sha256(b"def hello(): pass");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_hash_differently() {
        assert_ne!(hex_sha256(b"a"), hex_sha256(b"b"));
    }

    #[test]
    fn scan_is_deterministic_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def hello(): pass").unwrap();
        let cfg = FileCompassConfig::default();
        let roots = vec![dir.path().to_path_buf()];

        let mut first: Vec<_> = scan_files(&roots, &cfg).into_iter().map(|f| f.relative_path).collect();
        let mut second: Vec<_> = scan_files(&roots, &cfg).into_iter().map(|f| f.relative_path).collect();
        first.sort();
        second.sort();
        assert_eq!(first, second);
    }

    #[test]
    fn validate_path_rejects_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "x").unwrap();
        let roots = vec![dir.path().to_path_buf()];
        let outside = Path::new("/etc/hosts");
        if outside.exists() {
            let err = validate_path(outside, &roots).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::AccessDenied);
        }
    }

    #[test]
    fn validate_path_rejects_nonexistent_path_outside_root_as_access_denied() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "x").unwrap();
        let roots = vec![dir.path().to_path_buf()];
        let outside = Path::new("/definitely/does/not/exist/anywhere.py");
        let err = validate_path(outside, &roots).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::AccessDenied);
    }

    #[test]
    fn validate_path_rejects_nonexistent_path_inside_root_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let roots = vec![dir.path().to_path_buf()];
        let missing = dir.path().join("missing.py");
        let err = validate_path(&missing, &roots).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn validate_path_accepts_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "x").unwrap();
        let roots = vec![dir.path().to_path_buf()];
        assert!(validate_path(&file, &roots).is_ok());
    }
}
