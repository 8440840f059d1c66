use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use tessera_shared::{TesseraError, TesseraResult, to_slash};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubPackage {
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub pages: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabItem {
    #[serde(default)]
    pub icon_path: Option<String>,
    #[serde(default)]
    pub selected_icon_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TabBar {
    #[serde(default)]
    pub list: Vec<TabItem>,
}

/// The parts of an app/page/component json descriptor the build follows.
///
/// Unknown keys are ignored; the json resolver keeps the full document for
/// output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default)]
    sub_packages: Vec<SubPackage>,
    // The platform documents the lowercase key while its samples use
    // camelCase; both are accepted.
    #[serde(default, rename = "subpackages")]
    subpackages_lowercase: Vec<SubPackage>,
    #[serde(default)]
    pub using_components: IndexMap<String, String>,
    #[serde(default)]
    pub public_components: IndexMap<String, String>,
    #[serde(default)]
    pub tab_bar: Option<TabBar>,
}

impl Manifest {
    pub fn from_value(value: &serde_json::Value) -> TesseraResult<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn load(file: &Path) -> TesseraResult<Self> {
        if !file.is_file() {
            return Err(TesseraError::Config(format!(
                "File {} is not found, please ensure it is valid.",
                file.display()
            )));
        }
        let source = fs_err::read(file)?;
        serde_json::from_slice(&source).map_err(|e| {
            TesseraError::Config(format!(
                "File {} is invalid json, please check the json corrected.\n{e}",
                file.display()
            ))
        })
    }

    pub fn sub_packages(&self) -> &[SubPackage] {
        if self.sub_packages.is_empty() {
            &self.subpackages_lowercase
        } else {
            &self.sub_packages
        }
    }

    /// Top-level pages followed by sub-package pages prefixed with their
    /// package root.
    pub fn all_pages(&self) -> Vec<String> {
        let sub_pages = self.sub_packages().iter().flat_map(|package| {
            package.pages.iter().map(move |page| match &package.root {
                Some(root) if !root.is_empty() => to_slash(Path::new(root).join(page)),
                _ => page.clone(),
            })
        });

        self.pages.iter().cloned().chain(sub_pages).collect()
    }

    /// Icon paths of the tab bar, de-duplicated, in declaration order.
    pub fn tab_icons(&self) -> Vec<String> {
        let mut icons: Vec<String> = Vec::new();
        let items = self.tab_bar.iter().flat_map(|bar| bar.list.iter());

        for item in items {
            for icon in [&item.icon_path, &item.selected_icon_path].into_iter().flatten() {
                if !icons.contains(icon) {
                    icons.push(icon.clone());
                }
            }
        }
        icons
    }

    /// Using and public component references.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.using_components
            .values()
            .chain(self.public_components.values())
            .map(String::as_str)
    }
}
