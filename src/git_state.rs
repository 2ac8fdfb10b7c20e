//! Local repository state and pre-session warnings
//!
//! Wraps git plumbing behind a small inspector trait so the "detached
//! HEAD" and "no upstream" edge cases stay explicit nullable fields, and
//! tests can run against canned snapshots. Every capture degrades to safe
//! defaults when the directory is not a repository; nothing here throws.

use std::path::PathBuf;

use git2::{Repository, StatusOptions};
use tracing::debug;

/// Branches a work session should never commit to directly.
pub const PROTECTED_BRANCHES: &[&str] = &["main", "master", "develop"];

pub fn is_protected_branch(name: &str) -> bool {
    PROTECTED_BRANCHES.contains(&name)
}

/// One recent commit, hash abbreviated.
#[derive(Debug, Clone)]
pub struct Commit {
    pub hash: String,
    pub message: String,
}

/// Read-only view of a working directory's version control state.
pub trait VcsInspector {
    /// Current branch name, `None` when detached or not a repository.
    fn current_branch(&self) -> Option<String>;

    /// Porcelain-style status lines for uncommitted work.
    fn uncommitted_changes(&self) -> Vec<String>;

    /// Commits ahead of upstream, `None` when no upstream is configured.
    fn commits_ahead(&self) -> Option<usize>;

    /// Up to `limit` most recent commits, newest first.
    fn recent_commits(&self, limit: usize) -> Vec<Commit>;

    /// The branch feature work is based on, probing main then master.
    fn base_branch(&self) -> Option<String>;
}

/// Inspector backed by libgit2.
pub struct GitInspector {
    repo_path: PathBuf,
}

impl GitInspector {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    fn open(&self) -> Option<Repository> {
        match Repository::open(&self.repo_path) {
            Ok(repo) => Some(repo),
            Err(err) => {
                debug!(path = %self.repo_path.display(), "not a git repository: {}", err);
                None
            }
        }
    }
}

impl VcsInspector for GitInspector {
    fn current_branch(&self) -> Option<String> {
        let repo = self.open()?;
        let head = repo.head().ok()?;
        if !head.is_branch() {
            return None;
        }
        head.shorthand().map(|s| s.to_string())
    }

    fn uncommitted_changes(&self) -> Vec<String> {
        let Some(repo) = self.open() else {
            return Vec::new();
        };
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        let statuses = match repo.statuses(Some(&mut opts)) {
            Ok(s) => s,
            Err(err) => {
                debug!("failed to read git status: {}", err);
                return Vec::new();
            }
        };

        let mut lines = Vec::new();
        for entry in statuses.iter() {
            let path = entry.path().unwrap_or("").to_string();
            let s = entry.status();
            let code = if s.is_wt_new() {
                "??"
            } else if s.is_index_new() {
                "A "
            } else if s.is_index_modified() {
                "M "
            } else if s.is_index_deleted() {
                "D "
            } else if s.is_wt_modified() {
                " M"
            } else if s.is_wt_deleted() {
                " D"
            } else {
                continue;
            };
            lines.push(format!("{} {}", code, path));
        }
        lines
    }

    fn commits_ahead(&self) -> Option<usize> {
        let repo = self.open()?;
        let head = repo.head().ok()?;
        if !head.is_branch() {
            return None;
        }
        let branch_name = head.shorthand()?.to_string();
        let local_oid = head.target()?;

        let branch = repo.find_branch(&branch_name, git2::BranchType::Local).ok()?;
        let upstream = branch.upstream().ok()?;
        let upstream_oid = upstream.get().target()?;

        let (ahead, _behind) = repo.graph_ahead_behind(local_oid, upstream_oid).ok()?;
        Some(ahead)
    }

    fn recent_commits(&self, limit: usize) -> Vec<Commit> {
        let Some(repo) = self.open() else {
            return Vec::new();
        };
        let mut walk = match repo.revwalk() {
            Ok(w) => w,
            Err(_) => return Vec::new(),
        };
        if walk.push_head().is_err() {
            return Vec::new();
        }

        let mut commits = Vec::new();
        for oid in walk.flatten().take(limit) {
            if let Ok(commit) = repo.find_commit(oid) {
                let hash = oid.to_string().chars().take(7).collect();
                let message = commit.summary().unwrap_or("").to_string();
                commits.push(Commit { hash, message });
            }
        }
        commits
    }

    fn base_branch(&self) -> Option<String> {
        let repo = self.open()?;
        for name in ["main", "master"] {
            if repo.find_branch(name, git2::BranchType::Local).is_ok() {
                return Some(name.to_string());
            }
        }
        None
    }
}

/// Basic snapshot of the working directory.
#[derive(Debug, Clone, Default)]
pub struct GitSnapshot {
    pub current_branch: Option<String>,
    pub uncommitted_changes: Vec<String>,
    pub has_uncommitted_changes: bool,
}

impl GitSnapshot {
    pub fn capture(vcs: &dyn VcsInspector) -> Self {
        let uncommitted_changes = vcs.uncommitted_changes();
        Self {
            current_branch: vcs.current_branch(),
            has_uncommitted_changes: !uncommitted_changes.is_empty(),
            uncommitted_changes,
        }
    }
}

/// Extended snapshot taken before a session starts or ends.
#[derive(Debug, Clone, Default)]
pub struct PreflightGitSnapshot {
    pub current_branch: Option<String>,
    pub base_branch: Option<String>,
    pub is_feature_branch: bool,
    pub uncommitted_changes: Vec<String>,
    pub has_uncommitted_changes: bool,
    /// `None` means no upstream configured, indeterminate.
    pub unpushed_commits: Option<usize>,
    pub recent_commits: Vec<Commit>,
}

impl PreflightGitSnapshot {
    pub fn capture(vcs: &dyn VcsInspector) -> Self {
        let current_branch = vcs.current_branch();
        let uncommitted_changes = vcs.uncommitted_changes();
        let is_feature_branch = current_branch
            .as_deref()
            .map(|b| !is_protected_branch(b))
            .unwrap_or(false);
        Self {
            base_branch: vcs.base_branch(),
            is_feature_branch,
            has_uncommitted_changes: !uncommitted_changes.is_empty(),
            uncommitted_changes,
            unpushed_commits: vcs.commits_ahead(),
            recent_commits: vcs.recent_commits(10),
            current_branch,
        }
    }
}

/// Turn a preflight snapshot plus the backup count into warnings, in a
/// fixed order: branch, uncommitted, unpushed, backups. All conditions are
/// independent and may co-occur.
pub fn generate_preflight_warnings(snapshot: &PreflightGitSnapshot, backup_count: usize) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(branch) = &snapshot.current_branch {
        if !snapshot.is_feature_branch {
            warnings.push(format!(
                "Working directly on protected branch '{}' - consider switching to a feature branch",
                branch
            ));
        }
    }

    if snapshot.has_uncommitted_changes {
        warnings.push(format!(
            "{} uncommitted change(s) in the working tree",
            snapshot.uncommitted_changes.len()
        ));
    }

    match snapshot.unpushed_commits {
        Some(count) if count > 0 => {
            warnings.push(format!(
                "{} commit(s) not pushed to upstream - push before ending the session",
                count
            ));
        }
        _ => {}
    }

    if backup_count > 0 {
        warnings.push(format!(
            "{} PreCompact backup(s) found - a previous session may have been interrupted",
            backup_count
        ));
    }

    warnings
}
