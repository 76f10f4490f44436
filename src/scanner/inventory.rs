//! Deterministic file inventory with include/exclude policy and skip accounting.

use anyhow::{Context, Result};
use glob::Pattern;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::ScanPolicy;
use crate::schema::ScanStats;

/// Path segments that are never scanned regardless of configured globs.
pub const HARD_EXCLUDED_SEGMENTS: [&str; 7] = [
    ".git",
    "node_modules",
    "dist",
    "build",
    "vendor",
    ".venv",
    "__pycache__",
];

/// Files whose content the heuristics read.
pub const MANIFEST_FILES: [&str; 7] = [
    "package.json",
    "requirements.txt",
    "pyproject.toml",
    "pom.xml",
    "build.gradle",
    "Cargo.toml",
    "go.mod",
];

const BINARY_SNIFF_BYTES: usize = 1024;

/// Language for a file extension (case-insensitive).
pub fn language_for(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "py" => Some("Python"),
        "js" | "jsx" => Some("JavaScript"),
        "ts" | "tsx" => Some("TypeScript"),
        "java" => Some("Java"),
        "go" => Some("Go"),
        "rs" => Some("Rust"),
        "cs" => Some("C#"),
        _ => None,
    }
}

/// A file that passed every inventory check.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Forward-slash path relative to the repository root.
    pub rel_path: String,
    pub size_bytes: u64,
    pub language: Option<&'static str>,
    /// Content, kept only for manifest files.
    pub content: Option<String>,
}

impl FileRecord {
    pub fn file_name(&self) -> &str {
        self.rel_path.rsplit('/').next().unwrap_or(&self.rel_path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub files: Vec<FileRecord>,
    pub top_level_dirs: Vec<String>,
    pub stats: ScanStats,
}

/// Compiled include/exclude policy.
#[derive(Debug, Clone)]
pub struct IgnorePolicy {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl IgnorePolicy {
    pub fn from_config(policy: &ScanPolicy) -> Result<Self> {
        Ok(Self {
            include: compile(&policy.include_globs)?,
            exclude: compile(&policy.exclude_globs)?,
        })
    }

    pub fn should_skip(&self, rel_path: &str) -> bool {
        if rel_path
            .split('/')
            .any(|segment| HARD_EXCLUDED_SEGMENTS.contains(&segment))
        {
            return true;
        }
        if self.exclude.iter().any(|p| p.matches(rel_path)) {
            return true;
        }
        !self.include.is_empty() && !self.include.iter().any(|p| p.matches(rel_path))
    }
}

fn compile(globs: &[String]) -> Result<Vec<Pattern>> {
    globs
        .iter()
        .map(|g| Pattern::new(g).with_context(|| format!("Invalid scan glob: {}", g)))
        .collect()
}

/// Walks a repository and applies the scan policy.
pub struct InventoryEngine {
    policy: IgnorePolicy,
    max_file_size_bytes: u64,
    max_files: usize,
}

impl InventoryEngine {
    pub fn new(scan_policy: &ScanPolicy) -> Result<Self> {
        Ok(Self {
            policy: IgnorePolicy::from_config(scan_policy)?,
            max_file_size_bytes: scan_policy.max_file_size_bytes,
            max_files: scan_policy.max_files,
        })
    }

    /// Collect files in sorted relative-path order.
    ///
    /// Skip checks run in a fixed order: policy, stat, size, binary sniff,
    /// UTF-8 decode. Collection stops once `max_files` records are kept.
    pub fn collect(&self, repo_path: &Path) -> Result<Inventory> {
        let mut inventory = Inventory::default();
        let mut top_level = BTreeSet::new();

        for rel in list_files(repo_path)? {
            if inventory.files.len() >= self.max_files {
                break;
            }
            let stats = &mut inventory.stats;
            stats.total_files_seen += 1;

            if self.policy.should_skip(&rel) {
                stats.files_skipped += 1;
                stats.skipped_reasons.ignored_pathspec += 1;
                continue;
            }

            let full_path = repo_path.join(&rel);
            let size_bytes = match std::fs::metadata(&full_path) {
                Ok(meta) => meta.len(),
                Err(_) => {
                    stats.files_skipped += 1;
                    stats.skipped_reasons.encoding_error += 1;
                    continue;
                }
            };

            if size_bytes > self.max_file_size_bytes {
                stats.files_skipped += 1;
                stats.skipped_reasons.too_large += 1;
                continue;
            }

            match is_binary(&full_path) {
                Ok(true) => {
                    stats.files_skipped += 1;
                    stats.skipped_reasons.binary += 1;
                    continue;
                }
                Ok(false) => {}
                Err(_) => {
                    stats.files_skipped += 1;
                    stats.skipped_reasons.encoding_error += 1;
                    continue;
                }
            }

            let content = match std::fs::read(&full_path).map(String::from_utf8) {
                Ok(Ok(text)) => text,
                _ => {
                    stats.files_skipped += 1;
                    stats.skipped_reasons.encoding_error += 1;
                    continue;
                }
            };

            let record = FileRecord {
                language: language_for(&rel),
                size_bytes,
                content: None,
                rel_path: rel,
            };
            let keep_content = MANIFEST_FILES.contains(&record.file_name());
            top_level.insert(match record.rel_path.split_once('/') {
                Some((first, _)) => first.to_string(),
                None => ".".to_string(),
            });
            inventory.files.push(FileRecord {
                content: keep_content.then_some(content),
                ..record
            });
            stats.files_scanned += 1;
        }

        inventory.top_level_dirs = top_level.into_iter().collect();
        Ok(inventory)
    }
}

/// All regular files under `root` as sorted forward-slash relative paths.
/// `.git` directories are pruned from the walk.
fn list_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() > 0 && e.file_type().is_dir() && e.file_name() == ".git"));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(parts.join("/"));
    }
    files.sort();
    Ok(files)
}

fn is_binary(path: &Path) -> std::io::Result<bool> {
    let mut buf = [0u8; BINARY_SNIFF_BYTES];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(buf[..filled].contains(&0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn policy() -> ScanPolicy {
        ScanPolicy {
            include_globs: vec!["**/*".into()],
            exclude_globs: vec!["tests/fixtures/**".into()],
            max_file_size_bytes: 64,
            max_files: 100,
        }
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(language_for("src/app.PY"), Some("Python"));
        assert_eq!(language_for("web/App.tsx"), Some("TypeScript"));
        assert_eq!(language_for("lib.rs"), Some("Rust"));
        assert_eq!(language_for("README.md"), None);
        assert_eq!(language_for("Makefile"), None);
    }

    #[test]
    fn test_hard_excludes_and_globs() {
        let policy = IgnorePolicy::from_config(&policy()).unwrap();
        assert!(policy.should_skip("node_modules/x/index.js"));
        assert!(policy.should_skip("pkg/__pycache__/a.pyc"));
        assert!(policy.should_skip("tests/fixtures/sample.py"));
        assert!(!policy.should_skip("src/main.py"));
        assert!(!policy.should_skip("main.py"));
    }

    #[test]
    fn test_include_globs_restrict_when_present() {
        let mut cfg = policy();
        cfg.include_globs = vec!["src/**".into()];
        let policy = IgnorePolicy::from_config(&cfg).unwrap();
        assert!(!policy.should_skip("src/main.py"));
        assert!(policy.should_skip("docs/readme.md"));

        cfg.include_globs.clear();
        let policy = IgnorePolicy::from_config(&cfg).unwrap();
        assert!(!policy.should_skip("docs/readme.md"));
    }

    #[test]
    fn test_invalid_glob_is_an_error() {
        let mut cfg = policy();
        cfg.exclude_globs = vec!["[".into()];
        assert!(InventoryEngine::new(&cfg).is_err());
    }

    #[test]
    fn test_collect_counts_each_skip_reason() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "main.py", b"print('hi')\n");
        write(root, "src/app.js", b"console.log(1)\n");
        write(root, "node_modules/lib/index.js", b"x\n");
        write(root, "big.txt", &[b'a'; 100]);
        write(root, "image.bin", b"abc\0def");
        write(root, "latin1.txt", &[0xff, 0xfe, 0x41]);
        write(root, "package.json", br#"{"dependencies":{}}"#);

        let inventory = InventoryEngine::new(&policy()).unwrap().collect(root).unwrap();
        let stats = &inventory.stats;
        assert_eq!(stats.total_files_seen, 7);
        assert_eq!(stats.files_scanned, 3);
        assert_eq!(stats.files_skipped, 4);
        assert_eq!(stats.skipped_reasons.ignored_pathspec, 1);
        assert_eq!(stats.skipped_reasons.too_large, 1);
        assert_eq!(stats.skipped_reasons.binary, 1);
        assert_eq!(stats.skipped_reasons.encoding_error, 1);

        let paths: Vec<&str> = inventory.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, ["main.py", "package.json", "src/app.js"]);
        assert_eq!(inventory.top_level_dirs, [".", "src"]);
        assert!(inventory.files[1].content.is_some());
        assert!(inventory.files[0].content.is_none());
    }

    #[test]
    fn test_git_directory_is_not_walked() {
        let dir = tempdir().unwrap();
        write(dir.path(), ".git/HEAD", b"ref: refs/heads/main\n");
        write(dir.path(), "a.py", b"x = 1\n");
        let inventory = InventoryEngine::new(&policy()).unwrap().collect(dir.path()).unwrap();
        assert_eq!(inventory.stats.total_files_seen, 1);
    }

    #[test]
    fn test_max_files_stops_collection() {
        let dir = tempdir().unwrap();
        for name in ["a.py", "b.py", "c.py", "d.py"] {
            write(dir.path(), name, b"pass\n");
        }
        let mut cfg = policy();
        cfg.max_files = 2;
        let inventory = InventoryEngine::new(&cfg).unwrap().collect(dir.path()).unwrap();
        assert_eq!(inventory.files.len(), 2);
        assert_eq!(inventory.stats.total_files_seen, 2);
        assert_eq!(inventory.files[1].rel_path, "b.py");
    }
}
