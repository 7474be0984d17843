//! Remote path helpers. Remote paths are always absolute and `/`-separated.

/// Normalize a remote path: collapse duplicate separators, resolve `.` and
/// `..` (never above the root) and drop any trailing separator.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Parent of a normalized path, `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" || path.is_empty() {
        return None;
    }
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Final component of a path, empty for the root.
pub fn name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Join a remote path and a child component.
pub fn join(base: &str, component: &str) -> String {
    let component = component.trim_start_matches('/');
    if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// True if `path` equals `ancestor` or lies beneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path.starts_with('/');
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// Strip a URI scheme and authority (`file:///data` -> `/data`,
/// `memory://` -> `/`). Plain paths are returned normalized.
pub fn strip_scheme(uri: &str) -> String {
    match uri.find("://") {
        Some(idx) => {
            let rest = &uri[idx + 3..];
            match rest.find('/') {
                Some(slash) => normalize(&rest[slash..]),
                None => "/".to_string(),
            }
        }
        None => normalize(uri),
    }
}

/// Scheme of a URI, lowercased; plain paths have no scheme.
pub fn scheme(uri: &str) -> Option<String> {
    uri.find("://").map(|idx| uri[..idx].to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("//a///b/"), "/a/b");
        assert_eq!(normalize("/a/./b/../c"), "/a/c");
        assert_eq!(normalize("/../../etc"), "/etc");
        assert_eq!(normalize("relative/x"), "/relative/x");
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/a/b/c"), Some("/a/b"));
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/"), None);
    }

    #[test]
    fn test_name_and_join() {
        assert_eq!(name("/a/b/file.txt"), "file.txt");
        assert_eq!(name("/"), "");
        assert_eq!(join("/", "home"), "/home");
        assert_eq!(join("/home/", "file.txt"), "/home/file.txt");
        assert_eq!(join("/home", "/file.txt"), "/home/file.txt");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(is_within("/anything", "/"));
    }

    #[test]
    fn test_scheme_handling() {
        assert_eq!(scheme("file:///srv/data"), Some("file".to_string()));
        assert_eq!(scheme("MEMORY://"), Some("memory".to_string()));
        assert_eq!(scheme("/plain"), None);
        assert_eq!(strip_scheme("file:///srv/data/"), "/srv/data");
        assert_eq!(strip_scheme("memory://"), "/");
        assert_eq!(strip_scheme("hdfs://namenode:8020/user"), "/user");
    }
}
