use crate::chunk::ChunkType;
use crate::loader::Loader;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tessera_shared::{TesseraError, TesseraResult, to_slash};

/// A loader together with its options and chunk-type restriction.
#[derive(Clone)]
pub struct LoaderBinding {
    pub loader: Arc<dyn Loader>,
    pub options: serde_json::Value,
    /// `None` runs the loader for every chunk type.
    pub for_types: Option<Vec<ChunkType>>,
}

impl LoaderBinding {
    pub fn new(loader: Arc<dyn Loader>) -> Self {
        Self {
            loader,
            options: serde_json::Value::Object(Default::default()),
            for_types: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn for_types(mut self, types: impl IntoIterator<Item = ChunkType>) -> Self {
        self.for_types = Some(types.into_iter().collect());
        self
    }

    /// Unrestricted bindings apply to everything.
    pub fn applies_to(&self, ty: ChunkType) -> bool {
        self.for_types.as_ref().is_none_or(|types| types.contains(&ty))
    }

    /// True only when the binding lists `ty` by name.
    pub fn targets(&self, ty: ChunkType) -> bool {
        self.for_types.as_ref().is_some_and(|types| types.contains(&ty))
    }
}

impl fmt::Debug for LoaderBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderBinding")
            .field("loader", &self.loader.name())
            .field("options", &self.options)
            .field("for_types", &self.for_types)
            .finish()
    }
}

/// Binds files matching `test` to an ordered loader pipeline.
#[derive(Debug, Clone)]
pub struct Rule {
    pub test: Regex,
    pub extname: Option<String>,
    pub exclude: Vec<Regex>,
    pub loaders: Vec<LoaderBinding>,
}

impl Rule {
    pub fn new(test: &str) -> TesseraResult<Self> {
        Ok(Self {
            test: compile_pattern(test)?,
            extname: None,
            exclude: Vec::new(),
            loaders: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_extname(mut self, extname: impl Into<String>) -> Self {
        self.extname = Some(extname.into());
        self
    }

    pub fn with_exclude(mut self, pattern: &str) -> TesseraResult<Self> {
        self.exclude.push(compile_pattern(pattern)?);
        Ok(self)
    }

    #[must_use]
    pub fn with_loader(mut self, binding: LoaderBinding) -> Self {
        self.loaders.push(binding);
        self
    }

    /// Tested against the forward-slash form of the path.
    pub fn matches(&self, file: &Path) -> bool {
        let file = to_slash(file);
        self.test.is_match(&file) && !self.exclude.iter().any(|re| re.is_match(&file))
    }

    pub fn validate(&self) -> TesseraResult {
        if self.test.as_str().is_empty() {
            return Err(TesseraError::Config(format!(
                "rule test is not provided, please check this rule: {self:?}"
            )));
        }
        if self.loaders.is_empty() {
            return Err(TesseraError::Config(format!(
                "rule /{}/ has no loaders",
                self.test.as_str()
            )));
        }
        Ok(())
    }
}

fn compile_pattern(pattern: &str) -> TesseraResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| TesseraError::Config(format!("invalid rule pattern /{pattern}/: {e}")))
}

/// First rule matching `file`; rules are evaluated in order.
pub fn match_rule<'a>(rules: &'a [Arc<Rule>], file: &Path) -> Option<&'a Arc<Rule>> {
    rules.iter().find(|rule| rule.matches(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::EnvifyLoader;

    fn rule(test: &str) -> Rule {
        Rule::new(test)
            .unwrap()
            .with_loader(LoaderBinding::new(Arc::new(EnvifyLoader)))
    }

    #[test]
    fn first_match_wins() {
        let rules = vec![
            Arc::new(rule(r"\.scss$").with_extname(".wxss")),
            Arc::new(rule(r"\.s?css$").with_extname(".css")),
        ];

        let matched = match_rule(&rules, Path::new("/src/a.scss")).unwrap();
        assert_eq!(matched.extname.as_deref(), Some(".wxss"));
        assert!(match_rule(&rules, Path::new("/src/a.js")).is_none());
    }

    #[test]
    fn exclude_removes_match() {
        let rule = rule(r"\.js$").with_exclude("node_modules/").unwrap();
        assert!(rule.matches(Path::new("/src/app.js")));
        assert!(!rule.matches(Path::new("/node_modules/lodash/index.js")));
    }

    #[test]
    fn rule_without_loaders_is_invalid() {
        let rule = Rule::new(r"\.js$").unwrap();
        assert!(matches!(rule.validate(), Err(TesseraError::Config(_))));
        assert!(matches!(Rule::new("").unwrap().validate(), Err(TesseraError::Config(_))));
    }

    #[test]
    fn restriction_semantics() {
        let open = LoaderBinding::new(Arc::new(EnvifyLoader));
        let bundler_only =
            LoaderBinding::new(Arc::new(EnvifyLoader)).for_types([ChunkType::Bundler]);

        assert!(open.applies_to(ChunkType::Entry));
        assert!(!open.targets(ChunkType::Bundler));
        assert!(!bundler_only.applies_to(ChunkType::Entry));
        assert!(bundler_only.targets(ChunkType::Bundler));
    }
}
