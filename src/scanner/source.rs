//! Resolve an analyze input to a directory on disk.

use anyhow::{Context, Result, bail};
use git2::Repository;
use git2::build::{CheckoutBuilder, RepoBuilder};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::schema::{AnalyzeInput, SourceType};

static GITHUB_REPO: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"github\.com[:/](?P<owner>[^/]+)/(?P<repo>[^/.]+)").ok());

/// A repository location ready for scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub repo_name: String,
    pub resolved_path: PathBuf,
}

/// Repository name from a GitHub URL (`https://github.com/o/r(.git)` or `git@github.com:o/r`).
pub fn github_repo_name(url: &str) -> Option<String> {
    let pattern = GITHUB_REPO.as_ref()?;
    pattern
        .captures(url)
        .and_then(|caps| caps.name("repo"))
        .map(|m| m.as_str().to_string())
}

/// Where a run's source lives without touching the network.
///
/// Local paths are canonicalized when possible. GitHub sources map to their
/// clone destination under `workspace_root`.
pub fn expected_location(
    input: &AnalyzeInput,
    run_id: &str,
    workspace_root: &Path,
) -> ResolvedSource {
    match input.source_type {
        SourceType::LocalPath => {
            let raw = PathBuf::from(input.local_path.as_deref().unwrap_or("."));
            let resolved_path = raw.canonicalize().unwrap_or(raw);
            ResolvedSource {
                repo_name: dir_name(&resolved_path),
                resolved_path,
            }
        }
        SourceType::GithubUrl => {
            let repo_name = input
                .github_url
                .as_deref()
                .and_then(github_repo_name)
                .unwrap_or_else(|| "unknown-repo".to_string());
            let resolved_path = clone_destination(workspace_root, &repo_name, run_id);
            ResolvedSource {
                repo_name,
                resolved_path,
            }
        }
    }
}

/// Resolve the input into a local directory, cloning GitHub sources.
///
/// An existing clone destination is reused as-is so resumed runs scan the
/// same tree.
pub fn resolve(
    input: &AnalyzeInput,
    run_id: &str,
    workspace_root: &Path,
) -> Result<ResolvedSource> {
    match input.source_type {
        SourceType::LocalPath => {
            let raw = input
                .local_path
                .as_deref()
                .context("local_path is required for local_path sources")?;
            let resolved_path = Path::new(raw)
                .canonicalize()
                .with_context(|| format!("Invalid local path: {}", raw))?;
            if !resolved_path.is_dir() {
                bail!("Invalid local path: {}", resolved_path.display());
            }
            Ok(ResolvedSource {
                repo_name: dir_name(&resolved_path),
                resolved_path,
            })
        }
        SourceType::GithubUrl => {
            let url = input
                .github_url
                .as_deref()
                .context("github_url is required for github_url sources")?;
            let repo_name = github_repo_name(url)
                .with_context(|| format!("Unsupported GitHub URL: {}", url))?;
            let destination = clone_destination(workspace_root, &repo_name, run_id);
            if !destination.exists() {
                std::fs::create_dir_all(workspace_root).with_context(|| {
                    format!("Failed to create workspace {}", workspace_root.display())
                })?;
                clone_into_place(
                    url,
                    &destination,
                    input.branch.as_deref(),
                    input.commit.as_deref(),
                )?;
            }
            Ok(ResolvedSource {
                repo_name,
                resolved_path: destination,
            })
        }
    }
}

/// Clone into a staging directory next to `destination` and move it into
/// place only once the branch and commit checkouts have both succeeded.
///
/// A failed attempt leaves nothing at `destination`, so a retry clones again
/// instead of reusing a tree at the wrong revision.
fn clone_into_place(
    url: &str,
    destination: &Path,
    branch: Option<&str>,
    commit: Option<&str>,
) -> Result<()> {
    let staging = staging_path(destination);
    if staging.exists() {
        std::fs::remove_dir_all(&staging)
            .with_context(|| format!("Failed to clear stale clone {}", staging.display()))?;
    }

    if let Err(e) = clone_repository(url, &staging, branch, commit) {
        if staging.exists() {
            if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                tracing::warn!(
                    path = %staging.display(),
                    error = %cleanup,
                    "Failed to remove partial clone"
                );
            }
        }
        return Err(e);
    }

    std::fs::rename(&staging, destination).with_context(|| {
        format!(
            "Failed to move clone from {} to {}",
            staging.display(),
            destination.display()
        )
    })
}

fn staging_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    destination.with_file_name(name)
}

/// Clone `url` into `destination`, then optionally check out a branch and a commit.
pub fn clone_repository(
    url: &str,
    destination: &Path,
    branch: Option<&str>,
    commit: Option<&str>,
) -> Result<Repository> {
    let mut builder = RepoBuilder::new();
    if let Some(branch) = branch {
        builder.branch(branch);
    }
    let repo = builder
        .clone(url, destination)
        .with_context(|| format!("git clone failed for {}", url))?;

    if let Some(commit) = commit {
        checkout_detached(&repo, commit)
            .with_context(|| format!("git checkout commit failed: {}", commit))?;
    }
    Ok(repo)
}

fn checkout_detached(repo: &Repository, rev: &str) -> Result<()> {
    let object = repo.revparse_single(rev)?;
    let commit = object.peel_to_commit()?;
    repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
    repo.set_head_detached(commit.id())?;
    Ok(())
}

/// HEAD commit sha when `path` is inside a git repository.
pub fn head_commit_sha(path: &Path) -> Option<String> {
    let repo = Repository::discover(path).ok()?;
    let head = repo.head().ok()?;
    head.peel_to_commit().ok().map(|c| c.id().to_string())
}

fn clone_destination(workspace_root: &Path, repo_name: &str, run_id: &str) -> PathBuf {
    workspace_root.join(format!("{}-{}", repo_name, run_id))
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown-repo".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn commit_file(repo: &Repository, dir: &Path, name: &str, content: &str, msg: &str) -> String {
        fs::write(dir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        let parents: Vec<git2::Commit<'_>> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &parent_refs)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_github_repo_name_variants() {
        assert_eq!(
            github_repo_name("https://github.com/acme/widgets").as_deref(),
            Some("widgets")
        );
        assert_eq!(
            github_repo_name("https://github.com/acme/widgets.git").as_deref(),
            Some("widgets")
        );
        assert_eq!(
            github_repo_name("git@github.com:acme/widgets.git").as_deref(),
            Some("widgets")
        );
        assert_eq!(github_repo_name("https://gitlab.com/acme/widgets"), None);
    }

    #[test]
    fn test_resolve_local_directory() {
        let dir = tempdir().unwrap();
        let input = AnalyzeInput::local(dir.path().to_string_lossy());
        let resolved = resolve(&input, "run-1", dir.path()).unwrap();
        assert_eq!(resolved.resolved_path, dir.path().canonicalize().unwrap());
        assert_eq!(resolved.repo_name, dir_name(&resolved.resolved_path));
    }

    #[test]
    fn test_resolve_rejects_missing_or_file_path() {
        let dir = tempdir().unwrap();
        let missing = AnalyzeInput::local(dir.path().join("nope").to_string_lossy());
        let err = resolve(&missing, "run-1", dir.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid local path"));

        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        let not_dir = AnalyzeInput::local(file.to_string_lossy());
        assert!(resolve(&not_dir, "run-1", dir.path()).is_err());
    }

    #[test]
    fn test_resolve_rejects_unsupported_url() {
        let dir = tempdir().unwrap();
        let input = AnalyzeInput::github("https://example.com/acme/widgets");
        let err = resolve(&input, "run-1", dir.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported GitHub URL"));
    }

    #[test]
    fn test_existing_clone_destination_is_reused() {
        let workspace = tempdir().unwrap();
        let dest = workspace.path().join("widgets-run-1");
        fs::create_dir_all(&dest).unwrap();
        let input = AnalyzeInput::github("https://github.com/acme/widgets");
        let resolved = resolve(&input, "run-1", workspace.path()).unwrap();
        assert_eq!(resolved.repo_name, "widgets");
        assert_eq!(resolved.resolved_path, dest);
    }

    #[test]
    fn test_expected_location_for_github_without_network() {
        let workspace = tempdir().unwrap();
        let input = AnalyzeInput::github("https://github.com/acme/widgets.git");
        let loc = expected_location(&input, "r9", workspace.path());
        assert_eq!(loc.repo_name, "widgets");
        assert_eq!(loc.resolved_path, workspace.path().join("widgets-r9"));
    }

    #[test]
    fn test_clone_and_checkout_commit_from_local_origin() {
        let origin = tempdir().unwrap();
        let repo = Repository::init(origin.path()).unwrap();
        let first = commit_file(&repo, origin.path(), "a.txt", "one", "first");
        commit_file(&repo, origin.path(), "a.txt", "two", "second");

        let target = tempdir().unwrap();
        let dest = target.path().join("clone");
        let url = origin.path().to_string_lossy().to_string();
        clone_repository(&url, &dest, None, Some(&first)).unwrap();

        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "one");
        assert_eq!(head_commit_sha(&dest).as_deref(), Some(first.as_str()));
    }

    #[test]
    fn test_failed_commit_checkout_leaves_no_clone_behind() {
        let origin = tempdir().unwrap();
        let repo = Repository::init(origin.path()).unwrap();
        commit_file(&repo, origin.path(), "a.txt", "one", "first");

        let workspace = tempdir().unwrap();
        let dest = workspace.path().join("demo-run-1");
        let url = origin.path().to_string_lossy().to_string();
        let bad = "0000000000000000000000000000000000000bad";

        let err = clone_into_place(&url, &dest, None, Some(bad)).unwrap_err();
        assert!(format!("{:#}", err).contains("git checkout commit failed"));
        assert!(!dest.exists());
        assert!(!staging_path(&dest).exists());

        // A second attempt must fail the same way rather than reuse a tree at HEAD.
        assert!(clone_into_place(&url, &dest, None, Some(bad)).is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn test_resolve_retry_after_bad_commit_still_fails() {
        let root = tempdir().unwrap();
        let origin_path = root.path().join("github.com/acme/demo");
        fs::create_dir_all(&origin_path).unwrap();
        let repo = Repository::init(&origin_path).unwrap();
        commit_file(&repo, &origin_path, "a.txt", "one", "first");

        let workspace = root.path().join("workspace");
        let mut input = AnalyzeInput::github(origin_path.to_string_lossy());
        input.commit = Some("0000000000000000000000000000000000000bad".to_string());

        assert!(resolve(&input, "run-7", &workspace).is_err());
        let second = resolve(&input, "run-7", &workspace);
        assert!(second.is_err(), "retry scanned {:?}", second.ok());
        assert!(!workspace.join("demo-run-7").exists());
    }

    #[test]
    fn test_clone_into_place_replaces_stale_staging_dir() {
        let origin = tempdir().unwrap();
        let repo = Repository::init(origin.path()).unwrap();
        let head = commit_file(&repo, origin.path(), "a.txt", "one", "first");

        let workspace = tempdir().unwrap();
        let dest = workspace.path().join("demo-run-2");
        fs::create_dir_all(staging_path(&dest)).unwrap();
        fs::write(staging_path(&dest).join("junk"), "x").unwrap();

        let url = origin.path().to_string_lossy().to_string();
        clone_into_place(&url, &dest, None, Some(&head)).unwrap();
        assert_eq!(head_commit_sha(&dest).as_deref(), Some(head.as_str()));
        assert!(!dest.join("junk").exists());
        assert!(!staging_path(&dest).exists());
    }

    #[test]
    fn test_head_commit_sha_outside_repo_is_none() {
        let dir = tempdir().unwrap();
        // tempdirs normally live outside any repository
        if Repository::discover(dir.path()).is_err() {
            assert!(head_commit_sha(dir.path()).is_none());
        }
    }
}
