//! Git-tracked-file detection backing the `git_only` query filter
//! (SPEC_FULL.md §6). Generalized from this codebase's repository-discovery
//! and status-flag handling in its git intelligence module down to the one
//! fact the query executor needs: is this file part of the repository's
//! tracked tree.

use git2::{Repository, Status};
use std::path::Path;

/// True if `absolute_path` sits inside a git work tree and is neither
/// untracked, ignored, nor mid-conflict. Any failure to open a repository or
/// resolve status (not a repo, detached path, bare repo) is treated as "not
/// tracked" rather than propagated — `git_only` is a best-effort filter, not
/// a hard dependency on git being present.
pub fn is_tracked(absolute_path: &Path) -> bool {
    let Ok(repo) = Repository::discover(absolute_path) else { return false };
    let Some(workdir) = repo.workdir() else { return false };
    let Ok(relative) = absolute_path.strip_prefix(workdir) else { return false };
    let Ok(status) = repo.status_file(relative) else { return false };
    !status.intersects(Status::WT_NEW | Status::IGNORED | Status::CONFLICTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn run(dir: &Path, args: &[&str]) {
        let status = Command::new("git").args(args).current_dir(dir).status().expect("git available");
        assert!(status.success());
    }

    #[test]
    fn tracked_file_is_reported_tracked() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init", "-q"]);
        run(dir.path(), &["config", "user.email", "test@example.com"]);
        run(dir.path(), &["config", "user.name", "test"]);
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();
        run(dir.path(), &["add", "a.txt"]);
        run(dir.path(), &["commit", "-q", "-m", "init"]);

        assert!(is_tracked(&file));
    }

    #[test]
    fn untracked_file_is_reported_untracked() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init", "-q"]);
        let file = dir.path().join("untracked.txt");
        std::fs::write(&file, "hello").unwrap();

        assert!(!is_tracked(&file));
    }

    #[test]
    fn path_outside_any_repo_is_not_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();
        assert!(!is_tracked(&file));
    }
}
