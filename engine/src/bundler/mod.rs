mod source_map;

pub use source_map::CompositeSourceMap;

use crate::chunk::{Chunk, ChunkType};
use crate::config::BuildConfig;
use crate::loader::{LoaderPass, run_chain};
use async_trait::async_trait;
use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tessera_shared::{TesseraResult, relative_specifier, to_slash};

const PRELUDE: &str = include_str!("prelude.js");
pub const BUNDLER_FILE: &str = "bundler.js";

/// Packs compiled chunks into fewer output files.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Consumes `chunks` and returns what should be written instead.
    async fn bundle(&self, chunks: Vec<Chunk>, config: &BuildConfig) -> TesseraResult<Vec<Chunk>>;
}

/// Packs script chunks into a single module table at `<out>/bundler.js` and
/// leaves a one-line stub at every entry script's destination.
#[derive(Debug, Default)]
pub struct JsBundler;

impl JsBundler {
    pub fn new() -> Self {
        Self
    }

    /// Whether `chunk` is packed into the module table.
    pub fn participates(chunk: &Chunk) -> bool {
        chunk.is_script() && !matches!(chunk.ty, ChunkType::Scatter | ChunkType::Bundler)
    }
}

/// Compact module ids, handed out per destination in first-seen order.
#[derive(Debug, Default)]
struct ModuleIds {
    ids: HashMap<PathBuf, String>,
}

impl ModuleIds {
    fn id_for(&mut self, destination: &Path) -> String {
        let next = self.ids.len();
        self.ids
            .entry(destination.to_path_buf())
            .or_insert_with(|| to_base32(next))
            .clone()
    }
}

fn to_base32(mut value: usize) -> String {
    const DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";
    let mut digits = Vec::new();
    loop {
        digits.push(DIGITS[value % 32]);
        value /= 32;
        if value == 0 {
            break;
        }
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

fn line_count(text: &str) -> u32 {
    text.bytes().filter(|b| *b == b'\n').count() as u32
}

#[async_trait]
impl Bundler for JsBundler {
    async fn bundle(&self, chunks: Vec<Chunk>, config: &BuildConfig) -> TesseraResult<Vec<Chunk>> {
        let (mut modules, mut output): (Vec<Chunk>, Vec<Chunk>) =
            chunks.into_iter().partition(Self::participates);
        if modules.is_empty() {
            return Ok(output);
        }
        modules.sort_by(|a, b| a.file.cmp(&b.file));

        let bundler_path = config.out_dir().join(BUNDLER_FILE);
        let mut ids = ModuleIds::default();
        let bundled: HashSet<PathBuf> = modules
            .iter()
            .filter_map(|chunk| chunk.destination().map(Path::to_path_buf))
            .collect();
        for destination in modules.iter().filter_map(Chunk::destination) {
            ids.id_for(destination);
        }

        let mut code = PRELUDE.trim_end().to_string();
        code.push_str("({\n");
        let mut source_map = config
            .source_map()
            .then(|| CompositeSourceMap::new(BUNDLER_FILE));

        for chunk in &modules {
            let Some(destination) = chunk.destination() else {
                continue;
            };
            let id = ids.id_for(destination);

            let mut requires = BTreeMap::new();
            for dependency in &chunk.dependencies {
                if !bundled.contains(&dependency.destination) {
                    continue;
                }
                let target = ids.id_for(&dependency.destination);
                for specifier in dependency.specifiers() {
                    requires.insert(specifier.to_string(), target.clone());
                }
            }

            code.push_str(&format!("\"{id}\": [function(require, module, exports) {{\n"));
            let line_offset = line_count(&code);
            let content = chunk.content_str();
            if let Some(composite) = source_map.as_mut() {
                let parsed = chunk
                    .source_map
                    .as_deref()
                    .map(source_map::parse)
                    .transpose()?;
                match parsed {
                    Some(map) => composite.add_map(&map, line_offset),
                    None => {
                        let name = chunk.file.strip_prefix(config.root_dir()).unwrap_or(&chunk.file);
                        composite.add_identity(&to_slash(name), &content, line_offset);
                    }
                }
            }
            code.push_str(&content);
            code.push_str(&format!("\n}}, {}],\n", serde_json::to_string(&requires)?));
        }
        code.push_str("}, {});\n");
        debug!(target: "tessera::bundler", "packed {} module(s) into {}", modules.len(), bundler_path.display());

        let source_map = source_map.map(CompositeSourceMap::into_json).transpose()?;
        let bindings = config
            .match_rule(&bundler_path)
            .map(|rule| rule.loaders.clone())
            .unwrap_or_default();
        let transformed = run_chain(
            &bindings,
            LoaderPass::Explicit,
            &bundler_path,
            ChunkType::Bundler,
            code.into_bytes(),
            source_map,
            config,
        )
        .await?;

        let mut bundler = Chunk::new(&bundler_path, ChunkType::Bundler)
            .with_content(transformed.content)
            .with_destination(&bundler_path);
        bundler.source_map = transformed.source_map;
        output.push(bundler);

        let bundler_module = bundler_path.with_extension("");
        for chunk in modules.into_iter().filter(|chunk| chunk.ty != ChunkType::Bundle) {
            let Some(destination) = chunk.destination() else {
                continue;
            };
            let id = ids.id_for(destination);
            let from_dir = destination.parent().unwrap_or(config.out_dir());
            let specifier = relative_specifier(from_dir, &bundler_module);

            let mut stub = Chunk::new(&chunk.file, ChunkType::Entry)
                .with_content(format!("require(\"{specifier}\")(\"{id}\")\n"));
            stub.destinations = chunk.destinations;
            stub.dependencies = chunk.dependencies;
            stub.rule = chunk.rule;
            stub.hash = chunk.hash;
            output.push(stub);
        }

        Ok(output)
    }
}
