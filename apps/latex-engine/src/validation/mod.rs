//! Requirement Validator: structural, advisory and toolchain checks for a template.
//!
//! Never fails: every problem becomes an entry in `ValidationResult`.
//!
//! # Checks
//! - Structure (errors): `\documentclass` present; `\begin{document}` and `\end{document}`
//!   both present.
//! - Recommended packages (warnings): fontenc, inputenc, geometry.
//! - Requirements (errors, via `Toolchain`): each required font and custom package.
//!   Fonts and packages are checked in two concurrent tasks, joined before returning.
//!   A check that could not run counts as missing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::templates::latex::{declared_package_names, has_document_class, has_document_environment};
use crate::templates::registry::Template;
use crate::toolchain::{Availability, Toolchain};

pub const MISSING_DOCUMENT_CLASS: &str = "Missing document class declaration";
pub const MISSING_DOCUMENT_ENVIRONMENT: &str = "Missing document environment";

/// Baseline packages every template should declare.
pub const RECOMMENDED_PACKAGES: &[&str] = &["fontenc", "inputenc", "geometry"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Structural errors for a LaTeX source, in a fixed order.
pub fn structural_errors(source: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if !has_document_class(source) {
        errors.push(MISSING_DOCUMENT_CLASS.to_string());
    }
    if !has_document_environment(source) {
        errors.push(MISSING_DOCUMENT_ENVIRONMENT.to_string());
    }
    errors
}

/// One warning per recommended package the source does not declare.
pub fn recommended_package_warnings(source: &str) -> Vec<String> {
    let declared = declared_package_names(source);
    RECOMMENDED_PACKAGES
        .iter()
        .filter(|pkg| !declared.iter().any(|name| name == *pkg))
        .map(|pkg| format!("Missing recommended package: {pkg}"))
        .collect()
}

fn font_error(font: &str) -> String {
    format!("Required font not installed: {font}")
}

fn package_error(pkg: &str) -> String {
    format!("Required LaTeX package not installed: {pkg}")
}

fn log_unchecked(kind: &str, name: &str, availability: &Availability) {
    if let Availability::Unchecked(reason) = availability {
        warn!("Could not verify {kind} '{name}', treating as missing: {reason}");
    }
}

async fn missing_fonts(toolchain: Arc<dyn Toolchain>, fonts: Vec<String>) -> Vec<String> {
    let mut errors = Vec::new();
    for font in fonts {
        let availability = toolchain.probe_font(&font).await;
        log_unchecked("font", &font, &availability);
        if !availability.is_available() {
            errors.push(font_error(&font));
        }
    }
    errors
}

async fn missing_packages(toolchain: Arc<dyn Toolchain>, packages: Vec<String>) -> Vec<String> {
    let mut errors = Vec::new();
    for pkg in packages {
        let availability = toolchain.probe_package(&pkg).await;
        log_unchecked("package", &pkg, &availability);
        if !availability.is_available() {
            errors.push(package_error(&pkg));
        }
    }
    errors
}

/// Checks required fonts and custom packages against the toolchain.
///
/// Font errors come first, then package errors, each in declaration order.
pub async fn check_requirements(template: &Template, toolchain: Arc<dyn Toolchain>) -> Vec<String> {
    let fonts = tokio::spawn(missing_fonts(
        Arc::clone(&toolchain),
        template.required_fonts.clone(),
    ));
    let packages = tokio::spawn(missing_packages(
        Arc::clone(&toolchain),
        template.custom_packages.clone(),
    ));

    let (fonts, packages) = tokio::join!(fonts, packages);

    let mut errors = Vec::new();
    match fonts {
        Ok(mut found) => errors.append(&mut found),
        Err(e) => {
            warn!("Font requirement check for '{}' failed: {e}", template.id);
            errors.push(format!("Failed to check font requirements: {e}"));
        }
    }
    match packages {
        Ok(mut found) => errors.append(&mut found),
        Err(e) => {
            warn!("Package requirement check for '{}' failed: {e}", template.id);
            errors.push(format!("Failed to check package requirements: {e}"));
        }
    }
    errors
}

/// Validates `template` and returns the aggregated result.
pub async fn validate_template(template: &Template, toolchain: Arc<dyn Toolchain>) -> ValidationResult {
    let source = &template.latex_source;

    let mut errors = structural_errors(source);
    let warnings = recommended_package_warnings(source);
    errors.extend(check_requirements(template, toolchain).await);

    debug!(
        "Validated '{}': {} errors, {} warnings",
        template.id,
        errors.len(),
        warnings.len()
    );
    ValidationResult::from_parts(errors, warnings)
}
