use super::{
    Resolved, Resolver, compiled_specifier, is_package, is_remote, locate, package_asset,
    rewrite_captures, static_dependency, strip_block_comments,
};
use crate::chunk::Dependency;
use crate::config::BuildConfig;
use log::warn;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tessera_shared::{TesseraError, TesseraResult};

static IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"@import\s+['"]([^'"]+)['"]"#).expect("valid regex"));
static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*['"]?([^'"()\s]+)['"]?\s*\)"#).expect("valid regex")
});

/// Stylesheets: `@import` targets are compiled alongside, `url()` resources
/// are published under the static directory.
pub struct StyleResolver;

impl Resolver for StyleResolver {
    fn resolve(
        &self,
        source: &[u8],
        file: &Path,
        config: &BuildConfig,
    ) -> TesseraResult<Resolved> {
        let source = String::from_utf8(source.to_vec())?;
        let source = strip_block_comments(&source);
        let mut dependencies = Vec::new();

        let imported = rewrite_captures(&IMPORT, &source, 1, |caps| {
            let required = &caps[1];
            if is_remote(required) {
                return Ok(None);
            }
            let Some(target) = resolve_import(file, required, config) else {
                warn!(target: "tessera::resolver", "{}: cannot resolve @import \"{required}\"", file.display());
                return Ok(None);
            };

            let rewritten = compiled_specifier(file, &target, config);
            let destination = config.destination_for(&target);
            dependencies.push(
                Dependency::new(file, target, destination, required).with_rewritten(&rewritten),
            );
            Ok(Some(rewritten))
        })?;

        let content = rewrite_captures(&URL, &imported, 1, |caps| {
            let specifier = &caps[1];
            if is_remote(specifier) || specifier.starts_with('#') {
                return Ok(None);
            }
            let (path, suffix) = split_suffix(specifier);

            if is_package(path) {
                let target = package_asset(file, path, config).ok_or_else(|| {
                    TesseraError::resolve(file, format!("cannot resolve url({specifier})"))
                })?;
                let rewritten = compiled_specifier(file, &target, config);
                let destination = config.destination_for(&target);
                dependencies.push(
                    Dependency::new(file, target, destination, specifier)
                        .with_rewritten(format!("{rewritten}{suffix}")),
                );
                return Ok(Some(format!("{rewritten}{suffix}")));
            }

            let target = locate(file, path, config);
            if !target.is_file() {
                return Err(TesseraError::resolve(
                    file,
                    format!("cannot resolve url({specifier}), {} does not exist", target.display()),
                ));
            }
            let dependency = static_dependency(file, target, specifier, config);
            let url = format!(
                "{}{suffix}",
                config.public_url_for(&dependency.destination)
            );
            dependencies.push(dependency.with_rewritten(&url));
            Ok(Some(url))
        })?;

        Ok(Resolved {
            content: content.trim().as_bytes().to_vec(),
            dependencies,
        })
    }
}

fn parent<'a>(file: &'a Path, config: &'a BuildConfig) -> &'a Path {
    file.parent().unwrap_or(config.src_dir())
}

/// Splits `font.woff?v=1#iefix` into the path and its query or fragment.
fn split_suffix(specifier: &str) -> (&str, &str) {
    match specifier.find(['?', '#']) {
        Some(index) => specifier.split_at(index),
        None => (specifier, ""),
    }
}

fn resolve_import(file: &Path, required: &str, config: &BuildConfig) -> Option<PathBuf> {
    let extname = file.extension().and_then(|ext| ext.to_str()).unwrap_or("wxss");

    if is_package(required) {
        let required = required.trim_start_matches('~');
        return parent(file, config)
            .ancestors()
            .find_map(|dir| resolve_style(&dir.join("node_modules").join(required), extname));
    }
    resolve_style(&locate(file, required, config), extname)
}

/// `path`, `path.<ext>`, `path.wxss`, then the sass partial `_name.<ext>`.
fn resolve_style(path: &Path, extname: &str) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let name = path.file_name()?.to_string_lossy().into_owned();
    [
        format!("{name}.{extname}"),
        format!("{name}.wxss"),
        format!("_{name}.{extname}"),
    ]
    .into_iter()
    .map(|candidate| path.with_file_name(candidate))
    .find(|candidate| candidate.is_file())
}
