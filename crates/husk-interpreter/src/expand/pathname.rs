//! Pathname expansion

use std::path::Path;

use glob::{MatchOptions, Pattern};

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

pub(crate) fn has_glob_chars(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

/// Escape `text` so it only ever matches itself
pub(crate) fn escape(text: &str) -> String {
    Pattern::escape(text)
}

/// Paths matching `pattern`, sorted. Relative patterns are matched against
/// `cwd` and reported relative to it. An invalid pattern matches nothing.
pub(crate) fn matches(pattern: &str, cwd: &Path) -> Vec<String> {
    let absolute = pattern.starts_with('/');
    let prefix = format!("{}/", cwd.display());
    let full = if absolute {
        pattern.to_string()
    } else {
        format!("{}{pattern}", Pattern::escape(&prefix))
    };

    let Ok(paths) = glob::glob_with(&full, OPTIONS) else {
        return Vec::new();
    };
    let mut found: Vec<String> = paths
        .filter_map(Result::ok)
        .map(|path| {
            let text = path.display().to_string();
            if absolute {
                return text;
            }
            match text.strip_prefix(&prefix) {
                Some(relative) => relative.to_string(),
                None => text,
            }
        })
        .collect();
    found.sort_unstable();
    found
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_relative_matches_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "c.log", ".hidden.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(matches("*.txt", dir.path()), ["a.txt", "b.txt"]);
        assert_eq!(matches("?.log", dir.path()), ["c.log"]);
        assert_eq!(matches(".*.txt", dir.path()), [".hidden.txt"]);
        assert!(matches("*.md", dir.path()).is_empty());
    }

    #[test]
    fn test_nested_and_absolute() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/x.rs"), "").unwrap();
        assert_eq!(matches("sub/*.rs", dir.path()), ["sub/x.rs"]);

        let absolute = format!("{}/sub/*.rs", escape(&dir.path().display().to_string()));
        assert_eq!(
            matches(&absolute, Path::new("/")),
            [dir.path().join("sub/x.rs").display().to_string()]
        );
    }

    #[test]
    fn test_escaped_text_is_literal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a*"), "").unwrap();
        fs::write(dir.path().join("ab"), "").unwrap();
        assert_eq!(matches(&escape("a*"), dir.path()), ["a*"]);
        assert!(has_glob_chars("a[bc]"));
        assert!(!has_glob_chars("plain"));
    }
}
