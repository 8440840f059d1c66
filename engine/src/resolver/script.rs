use super::wxs::REQUIRE;
use super::{
    Resolved, Resolver, compiled_specifier, locate, resolve_file, resolve_package, rewrite_captures,
    strip_script_comments,
};
use crate::chunk::{ChunkType, Dependency};
use crate::config::BuildConfig;
use log::debug;
use std::path::{Path, PathBuf};
use tessera_shared::{TesseraError, TesseraResult};

/// Script files. Every `require` is resolved through the alias table, then
/// relative to the file, then as a package, and rewritten to the compiled
/// location of its target.
pub struct ScriptResolver;

impl Resolver for ScriptResolver {
    fn resolve(
        &self,
        source: &[u8],
        file: &Path,
        config: &BuildConfig,
    ) -> TesseraResult<Resolved> {
        let source = String::from_utf8(source.to_vec())?;
        let source = strip_script_comments(&source);
        let mut dependencies = Vec::new();

        let content = rewrite_captures(&REQUIRE, &source, 1, |caps| {
            let required = &caps[1];
            let target = resolve_require(file, required, config).ok_or_else(|| {
                TesseraError::resolve(file, format!("cannot resolve require(\"{required}\")"))
            })?;

            let rewritten = compiled_specifier(file, &target, config);
            let destination = config.destination_for(&target);
            dependencies.push(
                Dependency::new(file, target, destination, required)
                    .with_kind(ChunkType::Bundle)
                    .with_rewritten(&rewritten),
            );
            Ok(Some(rewritten))
        })?;

        Ok(Resolved {
            content: content.into_bytes(),
            dependencies,
        })
    }
}

fn resolve_require(file: &Path, required: &str, config: &BuildConfig) -> Option<PathBuf> {
    if let Some(target) = resolve_alias(required, config) {
        return Some(target);
    }
    if required.starts_with('.') || required.starts_with('/') {
        return resolve_file(&locate(file, required, config));
    }
    resolve_package(required, file.parent().unwrap_or(config.src_dir()))
}

/// Resolves through the first alias whose key matches `required`. The text
/// matched by `*` is carried into each candidate and the first candidate
/// naming an existing file wins. Later keys are never consulted.
fn resolve_alias(required: &str, config: &BuildConfig) -> Option<PathBuf> {
    let (key, candidates) = config.alias().iter().find(|(key, _)| {
        glob::Pattern::new(key)
            .map(|pattern| pattern.matches(required))
            .unwrap_or_else(|_| {
                debug!(target: "tessera::resolver", "alias {key} is not a valid pattern");
                false
            })
    })?;

    let captured = wildcard_capture(key, required).unwrap_or_default();
    let found = candidates.iter().find_map(|candidate| {
        expand_candidate(&config.root_dir().join(candidate.replacen('*', captured, 1)))
    });
    if found.is_none() {
        debug!(
            target: "tessera::resolver",
            "alias {key} matched {required} but no candidate exists, falling back"
        );
    }
    found
}

fn wildcard_capture<'a>(key: &str, required: &'a str) -> Option<&'a str> {
    let (prefix, suffix) = key.split_once('*')?;
    required
        .strip_prefix(prefix)?
        .strip_suffix(suffix)
}

fn expand_candidate(candidate: &Path) -> Option<PathBuf> {
    let text = candidate.to_string_lossy();
    if text.contains(['*', '?', '[']) {
        return glob::glob(&text)
            .ok()?
            .filter_map(Result::ok)
            .find(|path| path.is_file());
    }
    resolve_file(candidate)
}
