use super::{Resolved, Resolver, compiled_specifier, locate, rewrite_captures, strip_script_comments};
use crate::chunk::{ChunkType, Dependency};
use crate::config::BuildConfig;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tessera_shared::{TesseraError, TesseraResult};

pub(crate) static REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"require\(\s*['"]([@~\w\-./]+?)['"]\s*\)"#).expect("valid regex")
});

/// Template script modules. They run inside the view layer and are never
/// bundled, so every dependency is emitted standalone.
pub struct WxsResolver;

impl Resolver for WxsResolver {
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
            let mut target = locate(file, required, config);
            if !target.is_file() && target.extension().is_none() {
                target.set_extension("wxs");
            }
            if !target.is_file() {
                return Err(TesseraError::resolve(
                    file,
                    format!("cannot resolve require(\"{required}\")"),
                ));
            }

            let rewritten = compiled_specifier(file, &target, config);
            let destination = config.destination_for(&target);
            dependencies.push(
                Dependency::new(file, target, destination, required)
                    .with_kind(ChunkType::Scatter)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::{config, write};
    use tempfile::TempDir;

    #[test]
    fn requires_become_scatter_dependencies() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let file = write(root, "src/utils/format.wxs", "");
        write(root, "src/utils/number.wxs", "");
        let config = config(root);

        let resolved = WxsResolver
            .resolve(
                b"/* require('./gone') */\n// require('./old')\nvar number = require('./number');\nmodule.exports = {};",
                &file,
                &config,
            )
            .unwrap();

        assert_eq!(
            String::from_utf8(resolved.content).unwrap(),
            "\n\nvar number = require('./number.wxs');\nmodule.exports = {};"
        );
        assert_eq!(resolved.dependencies.len(), 1);
        assert_eq!(resolved.dependencies[0].kind, Some(ChunkType::Scatter));
        assert_eq!(resolved.dependencies[0].required, "./number");
    }
}
