//! Input validation for branch names and file paths.
//!
//! Every registry backend runs these checks before touching storage, so a
//! rejected request never leaves a partially-applied change behind.

use std::collections::BTreeSet;

use crate::errors::ValidationError;

/// Check that `name` is usable as a local git branch name.
pub fn validate_branch_name(name: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidBranchName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.starts_with('-') {
        return Err(invalid("name must not start with '-'"));
    }
    if name == "HEAD" {
        return Err(invalid("'HEAD' is reserved"));
    }
    if !git2::Reference::is_valid_name(&format!("refs/heads/{name}")) {
        return Err(invalid("not a valid git ref name"));
    }
    Ok(())
}

/// Normalize a repository-relative path and reject anything that could
/// escape the repository root.
///
/// Backslashes become `/`, `.` and empty segments are dropped. Absolute
/// paths and `..` segments are rejected.
pub fn normalize_path(path: &str) -> Result<String, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let unified = path.trim().replace('\\', "/");
    if unified.starts_with('/') {
        return Err(invalid("absolute paths are not allowed"));
    }
    let bytes = unified.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return Err(invalid("absolute paths are not allowed"));
    }
    if unified.chars().any(char::is_control) {
        return Err(invalid("control characters are not allowed"));
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid("'..' segments are not allowed")),
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Err(invalid("path must name a file"));
    }
    Ok(segments.join("/"))
}

/// Normalize a batch of paths, collapsing duplicates.
pub fn normalize_paths<I, S>(paths: I) -> Result<BTreeSet<String>, ValidationError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    paths
        .into_iter()
        .map(|p| normalize_path(p.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_branch_names() {
        for name in ["main", "feat/login", "agent-3/fix_parser", "release-1.2"] {
            assert!(validate_branch_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_branch_names() {
        for name in ["", "-x", "a..b", "has space", "ends/", "x.lock", "a~b", "HEAD", "a@{1}"] {
            assert!(
                matches!(
                    validate_branch_name(name),
                    Err(ValidationError::InvalidBranchName { .. })
                ),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("src/lib.rs").unwrap(), "src/lib.rs");
        assert_eq!(normalize_path("./src//lib.rs").unwrap(), "src/lib.rs");
        assert_eq!(normalize_path("src\\app\\main.ts").unwrap(), "src/app/main.ts");
        assert_eq!(normalize_path("  docs/readme.md ").unwrap(), "docs/readme.md");
    }

    #[test]
    fn test_normalize_rejects_traversal_and_absolute() {
        for bad in ["../x", "a/../../b", "/etc/passwd", "C:\\x", "", ".", "./"] {
            assert!(normalize_path(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_normalize_paths_collapses_duplicates() {
        let set = normalize_paths(["a.js", "./a.js", "b.js"]).unwrap();
        assert_eq!(set.len(), 2);
    }
}
