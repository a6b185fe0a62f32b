//! Read-only repository facts via `git2`.
//!
//! [`GitRepo`] answers the questions the registry needs from the VCS: which
//! branch is checked out, which branches exist, which files a branch changed,
//! and what a file looked like at a branch tip or merge base.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use git2::{BranchType, Commit, ErrorCode, Oid, Repository};
use tracing::{debug, info, instrument};

use crate::conflict::VersionSource;
use crate::errors::GitError;

/// High-level wrapper around a `git2::Repository`.
pub struct GitRepo {
    repo: Repository,
    root: PathBuf,
}

impl GitRepo {
    /// Open the repository containing `path`, searching parent directories.
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        let repo = Repository::discover(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        let root = repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| repo.path().to_path_buf());
        info!(root = %root.display(), "opened git repository");
        Ok(Self { repo, root })
    }

    /// Working-tree root (the `.git` directory for bare repositories).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the checked-out branch.
    pub fn current_branch(&self) -> Result<String, GitError> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                // No commits yet: HEAD still names the branch symbolically.
                let head = self.repo.find_reference("HEAD")?;
                return head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(str::to_string)
                    .ok_or(GitError::DetachedHead);
            }
            Err(e) => return Err(e.into()),
        };
        if !head.is_branch() {
            return Err(GitError::DetachedHead);
        }
        head.shorthand()
            .map(str::to_string)
            .ok_or(GitError::DetachedHead)
    }

    /// All local branch names.
    pub fn local_branches(&self) -> Result<BTreeSet<String>, GitError> {
        let mut names = BTreeSet::new();
        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                names.insert(name.to_string());
            }
        }
        debug!(count = names.len(), "listed local branches");
        Ok(names)
    }

    /// Files changed on `branch` since it diverged from `against`.
    #[instrument(skip(self))]
    pub fn changed_files(&self, branch: &str, against: &str) -> Result<BTreeSet<String>, GitError> {
        let tip = self.tip(branch)?;
        let base = self.repo.find_commit(self.merge_base(branch, against)?)?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&base.tree()?), Some(&tip.tree()?), None)?;

        let mut files = BTreeSet::new();
        for delta in diff.deltas() {
            for file in [delta.old_file(), delta.new_file()] {
                if let Some(path) = file.path().and_then(Path::to_str) {
                    files.insert(path.to_string());
                }
            }
        }
        info!(count = files.len(), "collected changed files");
        Ok(files)
    }

    /// Merge base of the tips of `a` and `b`.
    pub fn merge_base(&self, a: &str, b: &str) -> Result<Oid, GitError> {
        let a = self.tip(a)?.id();
        let b = self.tip(b)?.id();
        Ok(self.repo.merge_base(a, b)?)
    }

    fn tip(&self, branch: &str) -> Result<Commit<'_>, GitError> {
        let branch = self
            .repo
            .find_branch(branch, BranchType::Local)
            .map_err(|e| match e.code() {
                ErrorCode::NotFound => GitError::RefNotFound(branch.to_string()),
                _ => e.into(),
            })?;
        Ok(branch.get().peel_to_commit()?)
    }

    /// Contents of `path` in `commit`, `None` if absent.
    fn read_file(&self, commit: &Commit<'_>, path: &str) -> Result<Option<String>, GitError> {
        let tree = commit.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let object = entry.to_object(&self.repo)?;
        let Some(blob) = object.as_blob() else {
            return Ok(None);
        };
        let text = std::str::from_utf8(blob.content()).map_err(|_| {
            GitError::Git2Error(git2::Error::from_str(&format!("{path} is not valid UTF-8")))
        })?;
        Ok(Some(text.to_string()))
    }
}

impl VersionSource for GitRepo {
    #[instrument(skip(self))]
    fn branch_file(&self, branch: &str, path: &str) -> Result<Option<String>, GitError> {
        let tip = self.tip(branch)?;
        self.read_file(&tip, path)
    }

    #[instrument(skip(self))]
    fn base_file(&self, a: &str, b: &str, path: &str) -> Result<Option<String>, GitError> {
        let base = self.repo.find_commit(self.merge_base(a, b)?)?;
        self.read_file(&base, path)
    }
}
