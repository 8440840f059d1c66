use super::{
    Resolved, Resolver, compiled_specifier, is_package, locate, package_asset, rewrite_captures,
    static_dependency,
};
use crate::chunk::Dependency;
use crate::config::BuildConfig;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tessera_shared::{TesseraError, TesseraResult};

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static SOURCE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(wxs|import|include|image|cover-image)\b[^>]*?\bsrc\s*=\s*['"]([@~\w\-./]+)['"]"#)
        .expect("valid regex")
});

/// Templates: script and template includes stay relative to the compiled
/// output, media sources are published under the static directory.
pub struct MarkupResolver;

impl Resolver for MarkupResolver {
    fn resolve(
        &self,
        source: &[u8],
        file: &Path,
        config: &BuildConfig,
    ) -> TesseraResult<Resolved> {
        let source = String::from_utf8(source.to_vec())?;
        let source = COMMENT.replace_all(&source, "");
        let mut dependencies = Vec::new();

        let content = rewrite_captures(&SOURCE_TAG, &source, 2, |caps| {
            let tag = &caps[1];
            let required = &caps[2];

            if is_compiled_reference(tag, required, config) {
                let target = resolve_template(file, tag, required, config).ok_or_else(|| {
                    TesseraError::resolve(file, format!("<{tag} src=\"{required}\"> does not exist"))
                })?;
                let rewritten = compiled_specifier(file, &target, config);
                let destination = config.destination_for(&target);
                dependencies.push(
                    Dependency::new(file, target, destination, required).with_rewritten(&rewritten),
                );
                return Ok(Some(rewritten));
            }

            if is_package(required) {
                let target = package_asset(file, required, config).ok_or_else(|| {
                    TesseraError::resolve(file, format!("<{tag} src=\"{required}\"> does not exist"))
                })?;
                let rewritten = compiled_specifier(file, &target, config);
                let destination = config.destination_for(&target);
                dependencies.push(
                    Dependency::new(file, target, destination, required).with_rewritten(&rewritten),
                );
                return Ok(Some(rewritten));
            }

            let target = locate(file, required, config);
            if !target.is_file() {
                return Err(TesseraError::resolve(
                    file,
                    format!("<{tag} src=\"{required}\">, {} does not exist", target.display()),
                ));
            }
            let dependency = static_dependency(file, target, required, config);
            let url = config.public_url_for(&dependency.destination);
            dependencies.push(dependency);
            Ok(Some(url))
        })?;

        Ok(Resolved {
            content: content.into_bytes(),
            dependencies,
        })
    }
}

fn is_compiled_reference(tag: &str, required: &str, config: &BuildConfig) -> bool {
    if !matches!(tag, "wxs" | "import" | "include") {
        return false;
    }
    match Path::new(required).extension().and_then(|ext| ext.to_str()) {
        None | Some("wxml" | "wxs") => true,
        Some(_) => config.match_rule(Path::new(required)).is_some(),
    }
}

/// An extensionless template include means `.wxml`, a module one `.wxs`.
fn resolve_template(file: &Path, tag: &str, required: &str, config: &BuildConfig) -> Option<PathBuf> {
    let target = locate(file, required, config);
    if target.is_file() {
        return Some(target);
    }
    if target.extension().is_some() {
        return None;
    }
    let extname = if tag == "wxs" { "wxs" } else { "wxml" };
    let candidate = target.with_extension(extname);
    candidate.is_file().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::{config, write};
    use tempfile::TempDir;

    #[test]
    fn rewrites_template_and_media_sources() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let file = write(root, "src/pages/index/index.wxml", "");
        write(root, "src/templates/item.wxml", "");
        write(root, "src/pages/index/tools.wxs", "");
        write(root, "src/images/logo.png", "");
        let config = config(root);

        let source = concat!(
            "<!-- <image src=\"/images/gone.png\" /> -->\n",
            "<import src=\"../../templates/item\" />\n",
            "<wxs module=\"tools\" src=\"./tools.wxs\"></wxs>\n",
            "<image class=\"logo\" src=\"/images/logo.png\" />\n",
            "<image src=\"{{dynamic}}\" />\n",
        );
        let resolved = MarkupResolver
            .resolve(source.as_bytes(), &file, &config)
            .unwrap();
        let content = String::from_utf8(resolved.content).unwrap();

        assert!(!content.contains("gone.png"));
        assert!(content.contains("<import src=\"../../templates/item.wxml\" />"));
        assert!(content.contains("src=\"./tools.wxs\""));
        assert!(content.contains("src=\"https://cdn.example.com/images/logo.png\""));
        assert!(content.contains("src=\"{{dynamic}}\""));
        assert_eq!(resolved.dependencies.len(), 3);
        assert_eq!(
            resolved.dependencies[2].destination,
            root.join("static/images/logo.png")
        );
    }

    #[test]
    fn package_media_goes_to_npm_output() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let file = write(root, "src/pages/index/index.wxml", "");
        write(root, "node_modules/icons/home.png", "");
        let config = config(root);

        let resolved = MarkupResolver
            .resolve(b"<image src=\"~icons/home.png\" />", &file, &config)
            .unwrap();

        assert_eq!(
            String::from_utf8(resolved.content).unwrap(),
            "<image src=\"../../npm/icons/home.png\" />"
        );
        assert_eq!(
            resolved.dependencies[0].destination,
            root.join("app/npm/icons/home.png")
        );
    }

    #[test]
    fn missing_include_is_an_error() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let file = write(root, "src/pages/index/index.wxml", "");
        let config = config(root);

        let err = MarkupResolver
            .resolve(b"<include src=\"./header.wxml\" />", &file, &config)
            .unwrap_err();
        assert!(matches!(err, TesseraError::Resolve { .. }));
    }
}
