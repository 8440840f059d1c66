use super::{Loader, LoaderInput, LoaderOptions, LoaderOutput};
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tessera_shared::LoaderError;

static ENV_REGEXP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bprocess\.env\.([A-Za-z_][A-Za-z0-9_]*)\b").expect("valid env regexp")
});

/// Inlines `process.env.NAME` references as JSON string literals.
///
/// Values come from the `env` table of the loader options first and the
/// process environment second; unknown names are left untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvifyLoader;

#[async_trait]
impl Loader for EnvifyLoader {
    fn name(&self) -> &str {
        "envify"
    }

    async fn transform(
        &self,
        input: LoaderInput<'_>,
        options: &LoaderOptions,
    ) -> Result<LoaderOutput, LoaderError> {
        let source = std::str::from_utf8(input.content)
            .map_err(|e| LoaderError::new(format!("source is not valid UTF-8: {e}")))?;
        let overrides = options.options.get("env");

        let code = ENV_REGEXP.replace_all(source, |caps: &Captures| {
            let name = &caps[1];
            let value = overrides
                .and_then(|env| env.get(name))
                .and_then(|value| value.as_str().map(str::to_owned))
                .or_else(|| std::env::var(name).ok());

            match value {
                Some(value) => serde_json::Value::String(value).to_string(),
                None => caps[0].to_string(),
            }
        });

        Ok(LoaderOutput::new(code.into_owned()))
    }
}
