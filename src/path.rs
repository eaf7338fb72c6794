use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

/// The path portion of a request target, without query or fragment.
pub fn url_path(target: &str) -> &str {
    let end = target.find(&['?', '#'][..]).unwrap_or(target.len());
    &target[..end]
}

/// The query portion of a request target including its leading `?`, if any.
pub fn url_query(target: &str) -> &str {
    let target = target.split('#').next().unwrap_or_default();
    target.find('?').map_or("", |start| &target[start..])
}

/// Map a request target onto the filesystem below `root`.
///
/// `..` pops the previous segment but never climbs above `root`.
pub fn translate(root: &Path, target: &str) -> PathBuf {
    let decoded = percent_decode_str(url_path(target)).decode_utf8_lossy();

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let mut path = root.to_path_buf();
    for segment in segments {
        if segment.contains('\\')
            || Path::new(segment).has_root()
            || (cfg!(windows) && segment.contains(':'))
        {
            continue;
        }
        path.push(segment);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_query_and_fragment() {
        assert_eq!(url_path("/a/b.html?x=1#top"), "/a/b.html");
        assert_eq!(url_path("/a#frag?not-query"), "/a");
        assert_eq!(url_query("/a/b?x=1&y=2#top"), "?x=1&y=2");
        assert_eq!(url_query("/a#frag?not-query"), "");
        assert_eq!(url_query("/a"), "");
    }

    #[test]
    fn joins_segments_under_root() {
        let root = Path::new("/srv/www");
        assert_eq!(translate(root, "/"), PathBuf::from("/srv/www"));
        assert_eq!(
            translate(root, "/css/site.css?v=3"),
            PathBuf::from("/srv/www/css/site.css")
        );
    }

    #[test]
    fn decodes_percent_escapes() {
        let root = Path::new("/srv/www");
        assert_eq!(
            translate(root, "/my%20notes/caf%C3%A9.txt"),
            PathBuf::from("/srv/www/my notes/café.txt")
        );
    }

    #[test]
    fn resolves_parent_segments() {
        let root = Path::new("/srv/www");
        assert_eq!(translate(root, "/a/../b"), PathBuf::from("/srv/www/b"));
        assert_eq!(translate(root, "/a/%2e%2e/b"), PathBuf::from("/srv/www/b"));
        assert_eq!(translate(root, "/a/./b/../c"), PathBuf::from("/srv/www/a/c"));
        assert_eq!(translate(root, "/../../b"), PathBuf::from("/srv/www/b"));
    }

    #[test]
    fn never_escapes_root() {
        let root = Path::new("/srv/www");
        for target in [
            "/../etc/passwd",
            "/a/../../etc/passwd",
            "/%2e%2e/etc/passwd",
            "/..%2f..%2fetc/passwd",
            "//etc/passwd",
            "/a\\..\\..\\etc/passwd",
        ] {
            let path = translate(root, target);
            assert!(path.starts_with(root), "{} -> {}", target, path.display());
            assert!(!path.components().any(|c| c.as_os_str() == ".."));
        }
    }
}
