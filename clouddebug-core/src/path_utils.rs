//! Path translation helpers
//!
//! The debugger service identifies sources by package-relative paths with forward
//! slashes (`com/example/Foo.java`). Local paths may use backslashes on Windows.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

/// Normalize path to forward slashes
#[inline]
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Convert a path to a normalized string
#[inline]
pub fn path_to_string(path: &Path) -> String {
    normalize_path(&path.to_string_lossy())
}

/// Dotted package name for a server path: `com/java/pkg/Class.java` -> `com.java.pkg`.
///
/// Empty segments are ignored, so leading and doubled slashes are harmless.
pub fn package_from_path(path: &str) -> String {
    let normalized = normalize_path(path);
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    match segments.split_last() {
        Some((_, dirs)) => dirs.join("."),
        None => String::new(),
    }
}

/// Last path segment, as used by the service for file name lookups.
pub fn file_name_from_path(path: &str) -> String {
    normalize_path(path)
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Server path for a source file in `package`: `com.java.pkg` + `Class.java` -> `com/java/pkg/Class.java`.
pub fn cloud_path(package: &str, file_name: &str) -> String {
    if package.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", package.replace('.', "/"), file_name)
    }
}

/// Extract the `package` declaration from Java source text.
pub fn java_package_declaration(source: &str) -> Option<String> {
    static PACKAGE: OnceLock<Regex> = OnceLock::new();
    let re = PACKAGE.get_or_init(|| {
        Regex::new(r"(?m)^\s*package\s+([\w.]+)\s*;").expect("static regex")
    });
    re.captures(source).map(|caps| caps[1].to_string())
}
