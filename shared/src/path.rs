use std::path::{Path, PathBuf};
use sugar_path::SugarPath;

/// Canonicalizes `path`, dropping the `\\?\` verbatim prefix Windows adds so
/// the result can be compared with paths reported by the file watcher.
pub fn canonicalize_with_strip<P: AsRef<Path>>(path: P) -> std::io::Result<PathBuf> {
    let canonical = fs_err::canonicalize(path.as_ref())?;
    let text = canonical.to_string_lossy();

    match text.strip_prefix(r"\\?\") {
        Some(stripped) => Ok(PathBuf::from(stripped)),
        None => Ok(canonical),
    }
}

/// Renders a path with forward slashes regardless of the host separator.
pub fn to_slash<P: AsRef<Path>>(path: P) -> String {
    path.as_ref().to_slash_lossy().into_owned()
}

/// Joins a specifier found in source text onto `base`.
///
/// A leading `/` does not escape `base`: `/components/a` under `src` stays
/// inside `src`.
pub fn join_specifier<P: AsRef<Path>>(base: P, specifier: &str) -> PathBuf {
    let trimmed = specifier.trim_start_matches(['/', '\\']);
    base.as_ref().join(trimmed).normalize()
}

/// The specifier a file living in `from_dir` uses to reach `to`, always in
/// `./` or `../` form with forward slashes.
pub fn relative_specifier<P: AsRef<Path>, Q: AsRef<Path>>(from_dir: P, to: Q) -> String {
    let relative = to_slash(to.as_ref().relative(from_dir.as_ref()));

    if relative.starts_with("../") || relative == ".." {
        relative
    } else {
        format!("./{relative}")
    }
}

/// Moves `path` from under `from` to the same place under `to`.
pub fn rebase<P: AsRef<Path>>(path: P, from: &Path, to: &Path) -> Option<PathBuf> {
    path.as_ref()
        .strip_prefix(from)
        .ok()
        .map(|rest| to.join(rest))
}

/// Swaps the extension of `path`; `extname` may be given with or without the
/// leading dot.
pub fn with_extname<P: AsRef<Path>>(path: P, extname: &str) -> PathBuf {
    path.as_ref()
        .with_extension(extname.trim_start_matches('.'))
}

pub fn strip_bom(content: &[u8]) -> &[u8] {
    content.strip_prefix(&[0xef, 0xbb, 0xbf]).unwrap_or(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_specifier_always_dotted() {
        assert_eq!(
            relative_specifier("/out/pages/index", "/out/pages/index/a.wxss"),
            "./a.wxss"
        );
        assert_eq!(
            relative_specifier("/out/pages/index", "/out/bundler.js"),
            "../../bundler.js"
        );
    }

    #[test]
    fn join_specifier_keeps_root_absolute_inside_base() {
        assert_eq!(
            join_specifier("/src", "/components/card/card"),
            PathBuf::from("/src/components/card/card")
        );
        assert_eq!(
            join_specifier("/src/pages/index", "../../utils/a.js"),
            PathBuf::from("/src/utils/a.js")
        );
    }

    #[test]
    fn rebase_moves_between_roots() {
        let moved = rebase("/src/pages/a.js", Path::new("/src"), Path::new("/out"));
        assert_eq!(moved, Some(PathBuf::from("/out/pages/a.js")));
        assert_eq!(rebase("/other/a.js", Path::new("/src"), Path::new("/out")), None);
    }

    #[test]
    fn strips_utf8_bom() {
        assert_eq!(strip_bom(b"\xef\xbb\xbfabc"), b"abc");
        assert_eq!(strip_bom(b"abc"), b"abc");
    }

    #[test]
    fn with_extname_accepts_dot() {
        assert_eq!(with_extname("a/b.scss", ".wxss"), PathBuf::from("a/b.wxss"));
    }
}
