//! Template Registry: in-memory catalog of templates, populated once at startup.
//!
//! Templates are immutable after load. The registry is shared read-only (behind an
//! `Arc`) so it needs no locking; adding templates at runtime is not supported.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::templates::latex::declared_package_names;
use crate::templates::profiles::{ProfileTable, TemplateProfile};

/// Substitute used for any image reference without an explicit mapping.
pub const DEFAULT_IMAGE_PLACEHOLDER: &str = "/placeholder-user.jpg";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("error reading template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A LaTeX template and its declared requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    pub source_path: PathBuf,
    pub latex_source: String,
    pub description: Option<String>,
    #[serde(rename = "sourceURL")]
    pub source_url: Option<String>,
    pub image_placeholders: HashMap<String, String>,
    pub required_fonts: Vec<String>,
    pub custom_packages: Vec<String>,
    pub preview_image_path: Option<PathBuf>,
    pub is_default: bool,
}

/// Returns the substitute for `image_path`, or the default placeholder if unmapped.
pub fn get_image_placeholder<'a>(template: &'a Template, image_path: &str) -> &'a str {
    template
        .image_placeholders
        .get(image_path)
        .map(String::as_str)
        .unwrap_or(DEFAULT_IMAGE_PLACEHOLDER)
}

/// Lowercases and collapses every run of non-alphanumerics to `_`.
///
/// Used to name output artifacts deterministically.
pub fn normalized_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut in_gap = false;
    for c in id.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            in_gap = false;
        } else if !in_gap {
            out.push('_');
            in_gap = true;
        }
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Static catalog
// ────────────────────────────────────────────────────────────────────────────

/// Static metadata for a known template, matched to a source file by id (file stem).
#[derive(Debug, Clone, Default)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub description: Option<&'static str>,
    pub source_url: Option<&'static str>,
    pub image_placeholders: &'static [(&'static str, &'static str)],
    pub required_fonts: &'static [&'static str],
    pub custom_packages: &'static [&'static str],
    pub is_default: bool,
}

pub const BUILTIN_CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "Default_Resume",
        name: "Default Resume",
        description: Some("Clean and professional resume template with modern typography"),
        source_url: None,
        image_placeholders: &[],
        required_fonts: &["Charter"],
        custom_packages: &[],
        is_default: true,
    },
    CatalogEntry {
        id: "John_Miller_CV",
        name: "John Miller CV",
        description: Some("Two-column CV template with a modern design"),
        source_url: Some("https://www.overleaf.com/latex/templates/jakes-resume/syzfjbzwjncs"),
        image_placeholders: &[("joh.png.jpg", DEFAULT_IMAGE_PLACEHOLDER)],
        required_fonts: &["FiraSans"],
        custom_packages: &[],
        is_default: false,
    },
    CatalogEntry {
        id: "Modular_professional_CV",
        name: "Modular Professional CV",
        description: Some("Highly customizable professional CV template"),
        source_url: Some(
            "https://www.overleaf.com/latex/templates/modular-professional-cv/cffcktvtxxmr",
        ),
        image_placeholders: &[],
        required_fonts: &["FiraSans", "FontAwesome"],
        custom_packages: &["fontawesome"],
        is_default: false,
    },
];

const BUILTIN_SOURCES: &[(&str, &str)] = &[
    (
        "Default_Resume",
        include_str!("../../templates/latex/Default_Resume.tex"),
    ),
    (
        "John_Miller_CV",
        include_str!("../../templates/latex/John_Miller_CV.tex"),
    ),
    (
        "Modular_professional_CV",
        include_str!("../../templates/latex/Modular_professional_CV.tex"),
    ),
];

impl CatalogEntry {
    fn to_template(&self, source_path: PathBuf, latex_source: String) -> Template {
        Template {
            id: self.id.to_string(),
            name: self.name.to_string(),
            source_path,
            latex_source,
            description: self.description.map(str::to_string),
            source_url: self.source_url.map(str::to_string),
            image_placeholders: self
                .image_placeholders
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            required_fonts: self.required_fonts.iter().map(|s| s.to_string()).collect(),
            custom_packages: self.custom_packages.iter().map(|s| s.to_string()).collect(),
            preview_image_path: None,
            is_default: self.is_default,
        }
    }
}

/// Builds a template for a file with no catalog entry.
///
/// Every package the source declares becomes a custom package requirement.
fn uncatalogued_template(id: &str, source_path: PathBuf, latex_source: String) -> Template {
    Template {
        id: id.to_string(),
        name: id.to_string(),
        source_path,
        custom_packages: declared_package_names(&latex_source),
        latex_source,
        description: None,
        source_url: None,
        image_placeholders: HashMap::new(),
        required_fonts: Vec::new(),
        preview_image_path: None,
        is_default: false,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Template>,
    profiles: ProfileTable,
}

impl TemplateRegistry {
    pub fn new(templates: Vec<Template>, profiles: ProfileTable) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.id.clone(), t)).collect(),
            profiles,
        }
    }

    /// The built-in catalog with sources embedded at build time.
    pub fn builtin() -> Self {
        let templates = BUILTIN_CATALOG
            .iter()
            .filter_map(|entry| {
                let (_, source) = BUILTIN_SOURCES.iter().find(|(id, _)| *id == entry.id)?;
                let path = PathBuf::from(format!("templates/latex/{}.tex", entry.id));
                Some(entry.to_template(path, source.to_string()))
            })
            .collect();
        Self::new(templates, ProfileTable::builtin())
    }

    /// Loads every `.tex` file in `dir`, merging catalog metadata by file stem.
    pub fn load_dir(
        dir: &Path,
        catalog: &[CatalogEntry],
        profiles: ProfileTable,
    ) -> Result<Self, TemplateError> {
        if !dir.is_dir() {
            return Err(TemplateError::DirectoryNotFound {
                path: dir.to_path_buf(),
            });
        }

        let entries = std::fs::read_dir(dir).map_err(|source| TemplateError::Read {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut templates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| TemplateError::Read {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("tex") {
                continue;
            }
            templates.push(load_template(&path, catalog)?);
        }

        info!("Loaded {} templates from {}", templates.len(), dir.display());
        Ok(Self::new(templates, profiles))
    }

    /// All templates, sorted by id.
    pub fn list(&self) -> Vec<&Template> {
        self.templates.values().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    /// Looks up a template by its source path (exact, or by file name).
    pub fn get_by_path(&self, path: &Path) -> Option<&Template> {
        self.templates.values().find(|t| {
            t.source_path == path
                || (path.file_name().is_some() && t.source_path.file_name() == path.file_name())
        })
    }

    pub fn default_template(&self) -> Option<&Template> {
        self.templates.values().find(|t| t.is_default)
    }

    pub fn profile(&self, template_id: &str) -> &TemplateProfile {
        self.profiles.profile_for(template_id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Reads a single template file as UTF-8.
pub fn load_template(path: &Path, catalog: &[CatalogEntry]) -> Result<Template, TemplateError> {
    let latex_source = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    debug!("Loaded template source {}", path.display());

    Ok(match catalog.iter().find(|entry| entry.id == stem) {
        Some(entry) => entry.to_template(path.to_path_buf(), latex_source),
        None => uncatalogued_template(&stem, path.to_path_buf(), latex_source),
    })
}
