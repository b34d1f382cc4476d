//! Git operations for task checkouts.
//!
//! Wraps the libgit2 calls the runner needs:
//! - Clone-or-reuse a repository and force it to a detached commit
//! - Capture the working-tree patch the agent produced

use std::fs;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{DiffFormat, DiffOptions, ErrorCode, Object, Repository};
use tracing::{debug, info};

use crate::error::Result;

/// Directory name for a repository checkout (`owner/name` -> `owner__name`).
pub fn checkout_dir_name(repo: &str) -> String {
    repo.replace('/', "__")
}

/// Clone `url` into `dest` (unless already cloned) and check out `commit`.
///
/// The checkout is forced: local edits from a previous task are discarded
/// and untracked or ignored files are removed. HEAD ends up detached.
pub fn checkout_at_commit(url: &str, dest: &Path, commit: &str) -> Result<PathBuf> {
    let repo = if dest.join(".git").exists() {
        debug!(path = %dest.display(), "reusing existing clone");
        Repository::open(dest)?
    } else {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        info!(url, path = %dest.display(), "cloning repository");
        Repository::clone(url, dest)?
    };

    let target = resolve_commit(&repo, commit)?;
    let commit_id = target.peel_to_commit()?.id();

    let mut checkout = CheckoutBuilder::new();
    checkout.force().remove_untracked(true).remove_ignored(true);
    repo.checkout_tree(&target, Some(&mut checkout))?;
    repo.set_head_detached(commit_id)?;

    Ok(dest.to_path_buf())
}

fn resolve_commit<'r>(repo: &'r Repository, commit: &str) -> Result<Object<'r>> {
    match repo.revparse_single(commit) {
        Ok(object) => Ok(object),
        Err(err) if err.code() == ErrorCode::NotFound => {
            // Reused clones can predate the commit; fetch once and retry.
            debug!(commit, "commit not found locally, fetching origin");
            let mut remote = repo.find_remote("origin")?;
            let refspecs: [&str; 0] = [];
            remote.fetch(&refspecs, None, None)?;
            Ok(repo.revparse_single(commit)?)
        }
        Err(err) => Err(err.into()),
    }
}

/// Patch of the working tree (index and untracked files included) against HEAD.
pub fn working_tree_diff(repo_dir: &Path) -> Result<String> {
    let repo = Repository::open(repo_dir)?;
    let head_tree = repo.head()?.peel_to_tree()?;

    let mut options = DiffOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .show_untracked_content(true);

    let diff = repo.diff_tree_to_workdir_with_index(Some(&head_tree), Some(&mut options))?;

    let mut patch = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+' | '-' | ' ') {
            patch.push(line.origin());
        }
        patch.push_str(&String::from_utf8_lossy(line.content()));
        true
    })?;

    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{IndexAddOption, Signature};
    use tempfile::TempDir;

    fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("bench", "bench@example.com").unwrap();
        let parent = repo
            .head()
            .ok()
            .and_then(|head| head.target())
            .and_then(|oid| repo.find_commit(oid).ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    #[test]
    fn checkout_dir_name_flattens_owner() {
        assert_eq!(
            checkout_dir_name("matplotlib/matplotlib"),
            "matplotlib__matplotlib"
        );
    }

    #[test]
    fn checkout_resets_reused_clone_and_diff_captures_edits() {
        let upstream_dir = TempDir::new().unwrap();
        let upstream = Repository::init(upstream_dir.path()).unwrap();
        fs::write(upstream_dir.path().join("lib.py"), "x = 1\n").unwrap();
        let first = commit_all(&upstream, "first");
        fs::write(upstream_dir.path().join("lib.py"), "x = 2\n").unwrap();
        commit_all(&upstream, "second");

        let work = TempDir::new().unwrap();
        let dest = work.path().join(checkout_dir_name("acme/lib"));
        let url = upstream_dir.path().to_string_lossy().to_string();

        let dir = checkout_at_commit(&url, &dest, &first.to_string()).unwrap();
        assert_eq!(fs::read_to_string(dir.join("lib.py")).unwrap(), "x = 1\n");

        // Agent edits, plus a stray file.
        fs::write(dir.join("lib.py"), "x = 3\n").unwrap();
        fs::write(dir.join("notes.txt"), "scratch\n").unwrap();
        let patch = working_tree_diff(&dir).unwrap();
        assert!(patch.contains("-x = 1"));
        assert!(patch.contains("+x = 3"));
        assert!(patch.contains("+scratch"));

        // Reuse resets everything.
        checkout_at_commit(&url, &dest, &first.to_string()).unwrap();
        assert_eq!(fs::read_to_string(dir.join("lib.py")).unwrap(), "x = 1\n");
        assert!(!dir.join("notes.txt").exists());
        assert!(working_tree_diff(&dir).unwrap().is_empty());
    }
}
