//! Server path to local file resolution for a project on disk
//!
//! A server path is tried as a project-relative path, then under each source
//! root, then by searching the project for a file with the same name.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use clouddebug_core::{
    cloud_path, file_name_from_path, java_package_declaration, normalize_path,
    package_from_path, path_to_string,
};

use crate::model::FileResolver;

/// Conventional source roots, relative to the project root
const SOURCE_ROOTS: &[&str] = &["src/main/java", "src/test/java", "src"];

/// Directories never searched
const SKIP_DIRS: &[&str] = &["target", "build", "out", "node_modules"];

pub struct ProjectFileResolver {
    project_root: PathBuf,
    source_roots: Vec<PathBuf>,
}

impl ProjectFileResolver {
    /// Resolver with the conventional source roots that exist under `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let source_roots = SOURCE_ROOTS
            .iter()
            .map(|root| project_root.join(root))
            .filter(|root| root.is_dir())
            .collect();
        Self {
            project_root,
            source_roots,
        }
    }

    pub fn with_source_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.source_roots = roots;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn search_by_file_name(&self, server_path: &str) -> Option<PathBuf> {
        let file_name = file_name_from_path(server_path);
        if file_name.is_empty() {
            return None;
        }
        let package = package_from_path(server_path);

        let candidates: Vec<PathBuf> = WalkDir::new(&self.project_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_skipped(entry))
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && entry.file_name().to_string_lossy() == file_name)
            .map(|entry| entry.into_path())
            .collect();

        // Prefer a source whose package matches the server path
        if !package.is_empty() {
            if let Some(exact) = candidates
                .iter()
                .find(|path| declared_package(path).as_deref() == Some(package.as_str()))
            {
                return Some(exact.clone());
            }
        }
        candidates.into_iter().next()
    }

    fn relative_to_roots(&self, file: &Path) -> Option<String> {
        self.source_roots
            .iter()
            .chain(std::iter::once(&self.project_root))
            .find_map(|root| file.strip_prefix(root).ok())
            .map(path_to_string)
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIP_DIRS.contains(&name.as_ref())
}

fn declared_package(path: &Path) -> Option<String> {
    let source = std::fs::read_to_string(path).ok()?;
    java_package_declaration(&source)
}

fn is_java(path: &Path) -> bool {
    path.extension().map(|ext| ext == "java").unwrap_or(false)
}

impl FileResolver for ProjectFileResolver {
    fn local_file(&self, server_path: &str) -> Option<PathBuf> {
        let relative = normalize_path(server_path);
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() {
            return None;
        }

        let direct = self.project_root.join(relative);
        if direct.is_file() {
            return Some(direct);
        }

        if let Some(found) = self
            .source_roots
            .iter()
            .map(|root| root.join(relative))
            .find(|candidate| candidate.is_file())
        {
            return Some(found);
        }

        let found = self.search_by_file_name(relative);
        if found.is_none() {
            tracing::debug!("No local file for server path {}", server_path);
        }
        found
    }

    fn server_path(&self, file: &Path) -> Option<String> {
        let file_name = file.file_name()?.to_string_lossy().to_string();
        if is_java(file) {
            if let Some(package) = declared_package(file) {
                return Some(cloud_path(&package, &file_name));
            }
        }
        self.relative_to_roots(file).or(Some(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_project_relative_path() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "path/to/prj/Class.java", "class Class {}");
        let resolver = ProjectFileResolver::new(dir.path());
        assert_eq!(resolver.local_file("path/to/prj/Class.java"), Some(file));
    }

    #[test]
    fn test_source_root_package_path() {
        let dir = TempDir::new().unwrap();
        let file = write(
            dir.path(),
            "src/main/java/com/java/pkg/Class.java",
            "package com.java.pkg;\nclass Class {}",
        );
        let resolver = ProjectFileResolver::new(dir.path());
        assert_eq!(resolver.local_file("com/java/pkg/Class.java"), Some(file.clone()));
        assert_eq!(resolver.server_path(&file).as_deref(), Some("com/java/pkg/Class.java"));
    }

    #[test]
    fn test_file_name_search_prefers_matching_package() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/Class.java", "package other;\nclass Class {}");
        let wanted = write(dir.path(), "b/Class.java", "package com.java.pkg;\nclass Class {}");
        write(dir.path(), "target/Class.java", "package com.java.pkg;\nclass Class {}");

        let resolver = ProjectFileResolver::new(dir.path());
        assert_eq!(resolver.local_file("com/java/pkg/Class.java"), Some(wanted));
        assert_eq!(
            resolver.local_file("Class.java"),
            Some(dir.path().join("a/Class.java"))
        );
    }

    #[test]
    fn test_unresolvable_path() {
        let dir = TempDir::new().unwrap();
        let resolver = ProjectFileResolver::new(dir.path());
        assert_eq!(resolver.local_file("com/missing/Nope.java"), None);
        assert_eq!(resolver.local_file(""), None);
    }

    #[test]
    fn test_server_path_without_package_is_root_relative() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "src/main/java/tools/Helper.kt", "fun main() {}");
        let resolver = ProjectFileResolver::new(dir.path());
        assert_eq!(resolver.server_path(&file).as_deref(), Some("tools/Helper.kt"));
    }
}
