use super::{Resolved, Resolver, find_module, locate};
use crate::chunk::Dependency;
use crate::config::{BuildConfig, Manifest};
use log::debug;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use tessera_shared::{TesseraError, TesseraResult};

const PLUGIN_PROTOCOL: &str = "plugin://";
const ROOT_FIELDS: [&str; 2] = ["miniprogramRoot", "pluginRoot"];

/// Follows the named modules declared by app, page, component, plugin and
/// project json files.
pub struct JsonResolver;

impl Resolver for JsonResolver {
    fn resolve(
        &self,
        source: &[u8],
        file: &Path,
        config: &BuildConfig,
    ) -> TesseraResult<Resolved> {
        let document: Value = serde_json::from_slice(source).map_err(|e| {
            TesseraError::resolve(file, format!("{} is not valid json: {e}", file.display()))
        })?;

        if file == config.project_config_file() {
            return rewrite_project_config(document, config);
        }

        let folder = file.parent().unwrap_or(config.src_dir());
        let mut dependencies = Vec::new();

        if file == config.manifest_file() {
            let manifest = Manifest::from_value(&document)
                .map_err(|e| TesseraError::resolve(file, e.to_string()))?;
            if manifest.pages.is_empty() {
                return Err(TesseraError::resolve(
                    file,
                    "No entry pages found, the pages field must list at least one page",
                ));
            }
            for page in manifest.all_pages() {
                page_dependencies(file, &page, folder, config, &mut dependencies)?;
            }
            for icon in manifest.tab_icons() {
                let target = locate(file, &icon, config);
                dependencies.push(super::static_dependency(file, target, &icon, config));
            }
        } else {
            for page in string_values(document.get("pages")) {
                page_dependencies(file, page, folder, config, &mut dependencies)?;
            }
            if let Some(main) = document.get("main").and_then(Value::as_str) {
                let target = locate(file, main, config);
                let destination = config.destination_for(&target);
                dependencies.push(Dependency::new(file, target, destination, main));
            }
        }

        let components = string_values(document.get("usingComponents"))
            .into_iter()
            .chain(string_values(document.get("publicComponents")));
        for component in components {
            component_dependencies(file, component, folder, config, &mut dependencies)?;
        }

        Ok(Resolved {
            content: source.to_vec(),
            dependencies,
        })
    }
}

/// Strings of an array, or the values of an object (plugin json declares
/// pages as a name map).
fn string_values(value: Option<&Value>) -> Vec<&str> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(Value::Object(map)) => map.values().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn module_dependencies(
    file: &Path,
    name: &str,
    files: Vec<PathBuf>,
    config: &BuildConfig,
    dependencies: &mut Vec<Dependency>,
) {
    for target in files {
        let destination = config.destination_for(&target);
        dependencies.push(Dependency::new(file, target, destination, name));
    }
}

fn page_dependencies(
    file: &Path,
    page: &str,
    folder: &Path,
    config: &BuildConfig,
    dependencies: &mut Vec<Dependency>,
) -> TesseraResult {
    let base = if page.starts_with('/') { config.src_dir() } else { folder };
    match find_module(page, base, config)? {
        Some(files) => {
            module_dependencies(file, page, files, config, dependencies);
            Ok(())
        }
        None => Err(TesseraError::resolve(
            file,
            format!("folder of page {page} does not exist"),
        )),
    }
}

/// Components are looked up next to the referencing json first, then from
/// the source root.
fn component_dependencies(
    file: &Path,
    component: &str,
    folder: &Path,
    config: &BuildConfig,
    dependencies: &mut Vec<Dependency>,
) -> TesseraResult {
    if component.starts_with(PLUGIN_PROTOCOL) {
        return Ok(());
    }

    let bases: &[&Path] = if component.starts_with('/') {
        &[config.src_dir()]
    } else {
        &[folder, config.src_dir()]
    };
    for base in bases {
        if let Some(files) = find_module(component, base, config)? {
            module_dependencies(file, component, files, config, dependencies);
            return Ok(());
        }
    }

    debug!(target: "tessera::resolver", "component {component} of {} not found locally", file.display());
    Ok(())
}

fn rewrite_project_config(mut document: Value, config: &BuildConfig) -> TesseraResult<Resolved> {
    if let Some(fields) = document.as_object_mut() {
        for field in ROOT_FIELDS {
            if let Some(Value::String(root)) = fields.get_mut(field) {
                *root = strip_build_dir(root, config);
            }
        }
    }

    let mut content = serde_json::to_vec_pretty(&document)?;
    content.push(b'\n');
    Ok(Resolved {
        content,
        dependencies: Vec::new(),
    })
}

/// Roots are declared from the project root (`src/plugin/`). The compiled
/// project config sits in the output root, so the leading source or output
/// directory name is dropped.
fn strip_build_dir(root: &str, config: &BuildConfig) -> String {
    let names = [config.src_dir(), config.out_dir()].map(|dir| dir.file_name());
    let mut components = Path::new(root)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .peekable();

    let leading_build_dir = matches!(
        components.peek(),
        Some(Component::Normal(first)) if names.contains(&Some(*first))
    );
    if leading_build_dir {
        components.next();
    }

    let rest: PathBuf = components.collect();
    let rest = tessera_shared::to_slash(rest);
    if rest.is_empty() {
        "./".to_string()
    } else if root.ends_with('/') {
        format!("{rest}/")
    } else {
        rest
    }
}
