//! Package Resolver: deduplicates and orders competing package declarations.
//!
//! Pure and deterministic. Malformed input never fails the pass; it is reported
//! back in `Resolution::skipped` so the caller can log it.
//!
//! # Rules
//! 1. Group by package name. A higher-priority declaration replaces a lower one;
//!    ties keep the first seen. The surviving entry keeps the slot of the first
//!    declaration of that name.
//! 2. Supersession: `fontspec` drops `fontenc`, `unicode-math` drops `amsmath`.
//! 3. Common packages are emitted first, everything else after, each partition
//!    in slot order.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use tracing::warn;

use crate::templates::package::PackageDeclaration;

/// Baseline preamble every preview document gets unless the template already
/// declares the same package.
pub const COMMON_PACKAGES: &[&str] = &[
    "\\usepackage[T1]{fontenc}",
    "\\usepackage[utf8]{inputenc}",
    "\\usepackage{microtype}",
    "\\usepackage[margin=1cm]{geometry}",
    "\\usepackage{fancyhdr}",
    "\\usepackage{graphicx}",
    "\\usepackage[dvipsnames]{xcolor}",
    "\\usepackage{enumitem}",
    "\\usepackage{titlesec}",
    "\\usepackage{hyperref}",
    "\\usepackage{fontawesome}",
    "\\usepackage{calc}",
    "\\usepackage{array}",
    "\\usepackage{etoolbox}",
];

/// (superseding, superseded)
const SUPERSEDES: &[(&str, &str)] = &[("fontspec", "fontenc"), ("unicode-math", "amsmath")];

static COMMON_PACKAGE_NAMES: LazyLock<HashSet<String>> = LazyLock::new(|| {
    COMMON_PACKAGES
        .iter()
        .filter_map(|raw| PackageDeclaration::parse(raw))
        .map(|decl| decl.name)
        .collect()
});

/// Returns true if `name` is one of the built-in common packages.
pub fn is_common_package(name: &str) -> bool {
    COMMON_PACKAGE_NAMES.contains(name)
}

/// Output of a resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Surviving declarations, raw text, common packages first.
    pub packages: Vec<String>,
    /// Inputs that did not parse as a package declaration.
    pub skipped: Vec<String>,
}

/// Resolves `declarations` into a deduplicated, conflict-free, ordered list.
pub fn resolve_declarations<S: AsRef<str>>(declarations: &[S]) -> Resolution {
    let mut slots: Vec<PackageDeclaration> = Vec::new();
    let mut index_by_name: HashMap<String, usize> = HashMap::new();
    let mut skipped = Vec::new();

    for raw in declarations {
        let raw = raw.as_ref();
        let Some(decl) = PackageDeclaration::parse(raw) else {
            skipped.push(raw.to_string());
            continue;
        };

        match index_by_name.get(&decl.name) {
            Some(&idx) => {
                if decl.priority > slots[idx].priority {
                    slots[idx] = decl;
                }
            }
            None => {
                index_by_name.insert(decl.name.clone(), slots.len());
                slots.push(decl);
            }
        }
    }

    let dropped: HashSet<&str> = SUPERSEDES
        .iter()
        .filter(|(winner, loser)| {
            index_by_name.contains_key(*winner) && index_by_name.contains_key(*loser)
        })
        .map(|(_, loser)| *loser)
        .collect();

    let (common, other): (Vec<_>, Vec<_>) = slots
        .into_iter()
        .filter(|decl| !dropped.contains(decl.name.as_str()))
        .partition(|decl| is_common_package(&decl.name));

    Resolution {
        packages: common
            .into_iter()
            .chain(other)
            .map(|decl| decl.raw_text)
            .collect(),
        skipped,
    }
}

/// Convenience wrapper returning only the resolved list; skipped inputs are logged.
pub fn resolve<S: AsRef<str>>(declarations: &[S]) -> Vec<String> {
    let resolution = resolve_declarations(declarations);
    for raw in &resolution.skipped {
        warn!("Skipping invalid package declaration: {raw}");
    }
    resolution.packages
}
