//! Lexical path helpers.
//!
//! Requests are plain strings (they may carry queries and loader syntax), so
//! these helpers work on `/`-separated strings and never touch the filesystem.

/// Join `request` onto `base` and normalize `.` and `..` segments.
///
/// An absolute `request` replaces `base`. Leading `..` segments that would
/// climb above the root of an absolute path are dropped; on a relative base
/// they are kept.
#[must_use]
pub fn join(base: &str, request: &str) -> String {
    let joined = if request.starts_with('/') || base.is_empty() {
        request.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), request)
    };
    normalize(&joined)
}

/// Normalize `.` and `..` segments and collapse repeated separators.
#[must_use]
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let body = parts.join("/");
    match (absolute, body.is_empty()) {
        (true, _) => format!("/{body}"),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

/// Whether a request is relative to its context (`./` or `../`).
#[must_use]
pub fn is_relative(request: &str) -> bool {
    request.starts_with("./") || request.starts_with("../")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_relative() {
        assert_eq!(join("/app/src", "./a.js"), "/app/src/a.js");
        assert_eq!(join("/app/src", "../lib/b.js"), "/app/lib/b.js");
        assert_eq!(join("/app/src/", "c.js"), "/app/src/c.js");
    }

    #[test]
    fn test_join_absolute_request_wins() {
        assert_eq!(join("/app", "/etc/x.js"), "/etc/x.js");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a/./b//c/../d"), "/a/b/d");
        assert_eq!(normalize("/../a"), "/a");
        assert_eq!(normalize("../a/../../b"), "../../b");
        assert_eq!(normalize("a/.."), ".");
    }

    #[test]
    fn test_is_relative() {
        assert!(is_relative("./x"));
        assert!(is_relative("../x"));
        assert!(!is_relative(".x"));
        assert!(!is_relative("x/./y"));
    }
}
