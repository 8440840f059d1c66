use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use tessera_engine::config::{LoaderBinding, Rule};
use tessera_engine::{BuildConfig, ChunkType, loader, plugin};
use tessera_shared::{TesseraError, TesseraResult};

pub const CONFIG_FILE: &str = "tessera.toml";

/// Contents of `tessera.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectFile {
    pub src: Option<String>,
    pub out: Option<String>,
    #[serde(rename = "static")]
    pub static_dir: Option<String>,
    pub temp: Option<String>,
    pub npm: Option<String>,
    pub public_path: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub bundle: Option<bool>,
    pub source_map: Option<bool>,
    pub ignore: Vec<String>,
    pub alias: IndexMap<String, Vec<String>>,
    pub rules: Vec<RuleEntry>,
    pub plugins: Vec<PluginEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    pub test: String,
    pub extname: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub loaders: Vec<LoaderEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderEntry {
    #[serde(rename = "use")]
    pub name: String,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
    #[serde(default, rename = "for")]
    pub for_types: Option<OneOrMany>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(ChunkType),
    Many(Vec<ChunkType>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<ChunkType> {
        match self {
            OneOrMany::One(ty) => vec![ty],
            OneOrMany::Many(types) => types,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginEntry {
    pub name: String,
    #[serde(default)]
    pub options: serde_json::Value,
}

impl ProjectFile {
    /// Reads `file`, or `<root>/tessera.toml` when present. A project without
    /// a configuration file builds with defaults.
    pub fn load(root: &Path, file: Option<&Path>) -> TesseraResult<Self> {
        let path = match file {
            Some(file) => root.join(file),
            None => {
                let default = root.join(CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let source = fs_err::read_to_string(&path)?;
        Self::parse(&source)
            .map_err(|e| TesseraError::Config(format!("{}: {e}", path.display())))
    }

    pub fn parse(source: &str) -> TesseraResult<Self> {
        toml::from_str(source).map_err(|e| TesseraError::Config(e.to_string()))
    }

    pub fn into_build_config(self, root: &Path) -> TesseraResult<BuildConfig> {
        let mut config = BuildConfig::new(root);

        if let Some(dir) = &self.src {
            config = config.with_src_dir(dir);
        }
        if let Some(dir) = &self.out {
            config = config.with_out_dir(dir);
        }
        if let Some(dir) = &self.static_dir {
            config = config.with_static_dir(dir);
        }
        if let Some(dir) = &self.temp {
            config = config.with_temp_dir(dir);
        }
        if let Some(name) = self.npm {
            config = config.with_npm_dir(name);
        }
        if let Some(public_path) = self.public_path {
            config = config.with_public_path(public_path);
        }
        if let Some(host) = self.host {
            config = config.with_host(host);
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(bundle) = self.bundle {
            config = config.with_bundle(bundle);
        }
        if let Some(source_map) = self.source_map {
            config = config.with_source_map(source_map);
        }
        for pattern in &self.ignore {
            config = config.with_ignore(pattern)?;
        }
        for (pattern, candidates) in self.alias {
            config = config.with_alias(pattern, candidates);
        }
        for entry in self.rules {
            config = config.with_rule(entry.into_rule()?);
        }
        for entry in self.plugins {
            config = config.with_plugin(plugin::builtin(&entry.name, &entry.options)?);
        }

        Ok(config)
    }
}

impl RuleEntry {
    fn into_rule(self) -> TesseraResult<Rule> {
        let mut rule = Rule::new(&self.test)?;
        if let Some(extname) = self.extname {
            rule = rule.with_extname(extname);
        }
        for pattern in &self.exclude {
            rule = rule.with_exclude(pattern)?;
        }

        for entry in self.loaders {
            let loader = loader::builtin(&entry.name).ok_or_else(|| {
                TesseraError::Config(format!("unknown loader {} in rule /{}/", entry.name, self.test))
            })?;
            let mut binding = LoaderBinding::new(loader);
            if let Some(options) = entry.options {
                binding = binding.with_options(options);
            }
            if let Some(types) = entry.for_types {
                binding = binding.for_types(types.into_vec());
            }
            rule = rule.with_loader(binding);
        }
        Ok(rule)
    }
}
