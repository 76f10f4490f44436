//! Repository profiling rules: languages, entry points, frameworks, layout hints.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::inventory::FileRecord;
use crate::schema::{FolderSummary, ManifestSummary};

const ENTRYPOINT_NAMES: [&str; 7] = [
    "main.py",
    "app.py",
    "server.py",
    "index.js",
    "server.js",
    "main.ts",
    "manage.py",
];

const FRAMEWORK_KEYWORDS: [(&str, &str); 8] = [
    ("express", "Express"),
    ("nestjs", "NestJS"),
    ("next", "Next.js"),
    ("react", "React"),
    ("fastapi", "FastAPI"),
    ("django", "Django"),
    ("flask", "Flask"),
    ("spring-boot", "Spring Boot"),
];

const PYTHON_FRAMEWORKS: [&str; 3] = ["fastapi", "django", "flask"];

static PYPROJECT_DEP: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*"[A-Za-z0-9_.\-]+"#).ok());

pub fn detect_languages(files: &[FileRecord]) -> Vec<String> {
    files
        .iter()
        .filter_map(|f| f.language)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn detect_entry_points(files: &[FileRecord]) -> Vec<String> {
    files
        .iter()
        .filter(|f| ENTRYPOINT_NAMES.contains(&f.file_name()))
        .map(|f| f.rel_path.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Frameworks named in `package.json` dependencies or Python manifests.
pub fn detect_frameworks(files: &[FileRecord]) -> Vec<String> {
    let mut found = BTreeSet::new();
    for file in files {
        let Some(content) = file.content.as_deref() else {
            continue;
        };
        match file.file_name() {
            "package.json" => found.extend(frameworks_from_package_json(content)),
            "requirements.txt" | "pyproject.toml" => {
                found.extend(frameworks_from_python_manifest(content))
            }
            _ => {}
        }
    }
    found.into_iter().map(str::to_string).collect()
}

pub fn detect_architecture_hints(files: &[FileRecord]) -> Vec<String> {
    let paths: Vec<String> = files.iter().map(|f| f.rel_path.to_lowercase()).collect();
    let under = |segment: &str| {
        let nested = format!("/{}/", segment);
        let leading = format!("{}/", segment);
        paths
            .iter()
            .any(|p| p.contains(&nested) || p.starts_with(&leading))
    };

    let mut hints = BTreeSet::new();
    if under("services") {
        hints.insert("layered-service-structure");
    }
    if under("routes") {
        hints.insert("route-controller-pattern");
    }
    if paths.iter().any(|p| p.ends_with("dockerfile")) {
        hints.insert("containerized-runtime");
    }
    hints.into_iter().map(str::to_string).collect()
}

pub fn summarize_folders(top_level_dirs: &[String]) -> Vec<FolderSummary> {
    top_level_dirs
        .iter()
        .map(|folder| {
            let (purpose, confidence) = match folder.as_str() {
                "src" => ("Core application source", 0.95),
                "api" => ("API handlers and endpoints", 0.85),
                "routes" => ("Route/controller definitions", 0.85),
                "services" => ("Service/business logic layer", 0.85),
                "models" => ("Domain and data models", 0.85),
                "tests" => ("Test suites", 0.9),
                "." => ("Repository root and entry assets", 0.6),
                _ => ("General project assets", 0.5),
            };
            FolderSummary {
                path: folder.clone(),
                purpose_guess: purpose.to_string(),
                confidence,
            }
        })
        .collect()
}

/// Direct dependency counts for npm, pip, pyproject, and maven manifests.
pub fn summarize_manifests(files: &[FileRecord]) -> Vec<ManifestSummary> {
    files
        .iter()
        .filter_map(|file| {
            let content = file.content.as_deref()?;
            let (ecosystem, count) = dependency_count(file.file_name(), content)?;
            Some(ManifestSummary {
                path: file.rel_path.clone(),
                ecosystem: ecosystem.to_string(),
                direct_dependency_count: count,
            })
        })
        .collect()
}

fn dependency_count(file_name: &str, content: &str) -> Option<(&'static str, u64)> {
    let counted = match file_name {
        "package.json" => {
            let count = serde_json::from_str::<Value>(content)
                .map(|payload| {
                    ["dependencies", "devDependencies"]
                        .iter()
                        .filter_map(|key| payload.get(key).and_then(Value::as_object))
                        .map(|deps| deps.len() as u64)
                        .sum::<u64>()
                })
                .unwrap_or(0);
            ("npm", count)
        }
        "requirements.txt" => {
            let count = content
                .lines()
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .count();
            ("pip", count as u64)
        }
        "pyproject.toml" => {
            let count = PYPROJECT_DEP
                .as_ref()
                .map(|re| re.find_iter(content).count())
                .unwrap_or(0);
            ("python", count as u64)
        }
        "pom.xml" => ("maven", content.matches("<dependency>").count() as u64),
        _ => return None,
    };
    Some(counted)
}

fn frameworks_from_package_json(content: &str) -> Vec<&'static str> {
    let Ok(payload) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };
    let names: BTreeSet<String> = ["dependencies", "devDependencies"]
        .iter()
        .filter_map(|key| payload.get(key).and_then(Value::as_object))
        .flat_map(|deps| deps.keys().map(|k| k.to_lowercase()))
        .collect();
    FRAMEWORK_KEYWORDS
        .iter()
        .filter(|(keyword, _)| names.contains(*keyword))
        .map(|(_, framework)| *framework)
        .collect()
}

fn frameworks_from_python_manifest(content: &str) -> Vec<&'static str> {
    let lower = content.to_lowercase();
    FRAMEWORK_KEYWORDS
        .iter()
        .filter(|(keyword, _)| PYTHON_FRAMEWORKS.contains(keyword))
        .filter(|(keyword, _)| {
            Regex::new(&format!(r"\b{}\b", regex::escape(keyword)))
                .map(|re| re.is_match(&lower))
                .unwrap_or(false)
        })
        .map(|(_, framework)| *framework)
        .collect()
}
