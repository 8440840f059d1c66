//! Per-format dependency extraction and specifier rewriting.
//!
//! Every format is matched with targeted patterns rather than a full parser.
//! A resolver only reads the file system to check which candidate path
//! exists; it never writes.

mod json;
mod markup;
mod script;
mod style;
mod wxs;

pub use json::JsonResolver;
pub use markup::MarkupResolver;
pub use script::ScriptResolver;
pub use style::StyleResolver;
pub use wxs::WxsResolver;

use crate::chunk::Dependency;
use crate::config::BuildConfig;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tessera_shared::{TesseraResult, join_specifier, relative_specifier};

/// Rewritten source plus the references found in it.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    pub content: Vec<u8>,
    pub dependencies: Vec<Dependency>,
}

pub trait Resolver: Send + Sync {
    fn resolve(&self, source: &[u8], file: &Path, config: &BuildConfig)
    -> TesseraResult<Resolved>;
}

static JSON: JsonResolver = JsonResolver;
static STYLE: StyleResolver = StyleResolver;
static MARKUP: MarkupResolver = MarkupResolver;
static WXS: WxsResolver = WxsResolver;
static SCRIPT: ScriptResolver = ScriptResolver;

/// Picks the resolver for a file by extension. Files without one (images,
/// fonts, ...) are copied as they are.
pub fn resolver_for(file: &Path) -> Option<&'static dyn Resolver> {
    let ext = file
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match ext.as_str() {
        "json" => Some(&JSON),
        "wxss" | "css" | "scss" | "sass" | "less" => Some(&STYLE),
        "wxml" => Some(&MARKUP),
        "wxs" => Some(&WXS),
        "js" | "ts" => Some(&SCRIPT),
        _ => None,
    }
}

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));

pub(crate) fn strip_block_comments(source: &str) -> Cow<'_, str> {
    BLOCK_COMMENT.replace_all(source, "")
}

/// Drops `//` and `/* */` comments from script source, leaving string
/// literals alone. Line breaks ending a line comment are kept.
pub(crate) fn strip_script_comments(source: &str) -> String {
    let mut output = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut quote = None;

    while let Some(c) = chars.next() {
        if let Some(open) = quote {
            output.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    output.push(escaped);
                }
            } else if c == open {
                quote = None;
            }
            continue;
        }

        match (c, chars.peek().copied()) {
            ('"' | '\'' | '`', _) => {
                quote = Some(c);
                output.push(c);
            }
            ('/', Some('/')) => while chars.next_if(|next| *next != '\n').is_some() {},
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            _ => output.push(c),
        }
    }
    output
}

/// Replaces capture group `group` of every match of `re` with what `rewrite`
/// returns. `None` keeps the original text.
pub(crate) fn rewrite_captures<F>(
    re: &Regex,
    source: &str,
    group: usize,
    mut rewrite: F,
) -> TesseraResult<String>
where
    F: FnMut(&Captures<'_>) -> TesseraResult<Option<String>>,
{
    let mut output = String::with_capacity(source.len());
    let mut last = 0;

    for captures in re.captures_iter(source) {
        let Some(matched) = captures.get(group) else {
            continue;
        };
        if let Some(replacement) = rewrite(&captures)? {
            output.push_str(&source[last..matched.start()]);
            output.push_str(&replacement);
            last = matched.end();
        }
    }
    output.push_str(&source[last..]);
    Ok(output)
}

/// Path a specifier written in `file` points at. A leading `/` is taken
/// from the source root.
pub(crate) fn locate(file: &Path, specifier: &str, config: &BuildConfig) -> PathBuf {
    if specifier.starts_with('/') {
        join_specifier(config.src_dir(), specifier)
    } else {
        join_specifier(file.parent().unwrap_or(config.src_dir()), specifier)
    }
}

/// Specifier `file` uses to reach `dependency` once both are compiled.
pub(crate) fn compiled_specifier(file: &Path, dependency: &Path, config: &BuildConfig) -> String {
    let from = config.destination_for(file);
    let from_dir = from.parent().unwrap_or(config.out_dir());
    relative_specifier(from_dir, config.destination_for(dependency))
}

/// Reference to a binary resource. It is copied below the static directory
/// and addressed by its public URL.
pub(crate) fn static_dependency(
    file: &Path,
    target: PathBuf,
    required: &str,
    config: &BuildConfig,
) -> Dependency {
    let destination = config.static_destination_for(&target);
    let url = config.public_url_for(&destination);
    Dependency::new(file, target, destination, required).with_rewritten(url)
}

pub(crate) fn is_remote(specifier: &str) -> bool {
    specifier.starts_with("http://")
        || specifier.starts_with("https://")
        || specifier.starts_with("//")
        || specifier.starts_with("data:")
}

/// Files sharing `name`'s basename in its folder, sorted. `None` when the
/// folder itself does not exist.
pub(crate) fn find_module(
    name: &str,
    base: &Path,
    config: &BuildConfig,
) -> TesseraResult<Option<Vec<PathBuf>>> {
    let target = join_specifier(base, name);
    let (Some(folder), Some(stem)) = (target.parent(), target.file_name()) else {
        return Ok(None);
    };
    if !folder.is_dir() {
        return Ok(None);
    }

    let mut files = Vec::new();
    for entry in fs_err::read_dir(folder)? {
        let path = entry?.path();
        if !path.is_file() || path.file_stem() != Some(stem) {
            continue;
        }
        let known = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext, "json" | "js" | "ts" | "wxml" | "wxss"));
        if known || config.match_rule(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(Some(files))
}

const SCRIPT_EXTENSIONS: [&str; 3] = ["js", "ts", "json"];

/// Tries `path` as written, then with a script extension appended, then as a
/// directory holding an index file.
pub(crate) fn resolve_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    for ext in SCRIPT_EXTENSIONS {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    ["index.js", "index.ts"]
        .iter()
        .map(|index| path.join(index))
        .find(|candidate| candidate.is_file())
}

/// Looks `specifier` up in every `node_modules` folder from `from_dir`
/// upwards, honouring the package's `main` field.
/// `~pkg/file` and `@scope/pkg/file` name files inside `node_modules`.
pub(crate) fn is_package(specifier: &str) -> bool {
    specifier.starts_with('~') || specifier.starts_with('@')
}

/// A package file referenced as an asset. It is compiled into the npm output
/// and referenced relative to `file`.
pub(crate) fn package_asset(file: &Path, specifier: &str, config: &BuildConfig) -> Option<PathBuf> {
    resolve_package(specifier, file.parent().unwrap_or(config.src_dir()))
        .filter(|target| target.is_file())
}

pub(crate) fn resolve_package(specifier: &str, from_dir: &Path) -> Option<PathBuf> {
    let specifier = specifier.trim_start_matches('~').trim_start_matches('/');

    for ancestor in from_dir.ancestors() {
        let candidate = ancestor.join("node_modules").join(specifier);
        if let Some(main) = package_main(&candidate) {
            return Some(main);
        }
        if let Some(found) = resolve_file(&candidate) {
            return Some(found);
        }
    }
    None
}

fn package_main(package_dir: &Path) -> Option<PathBuf> {
    let manifest = fs_err::read(package_dir.join("package.json")).ok()?;
    let manifest: serde_json::Value = serde_json::from_slice(&manifest).ok()?;
    let main = manifest
        .get("main")
        .and_then(|main| main.as_str())
        .unwrap_or("index.js");
    resolve_file(&join_specifier(package_dir, main))
}
