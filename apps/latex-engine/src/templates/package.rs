//! Package Declaration Model: a single `\usepackage` statement as a structured record.

use serde::{Deserialize, Serialize};

use crate::templates::latex::PACKAGE_PATTERN;

/// Priority of a declaration carrying explicit options.
pub const PRIORITY_WITH_OPTIONS: u8 = 2;
/// Priority of a bare declaration.
pub const PRIORITY_BARE: u8 = 1;

/// A parsed package declaration.
///
/// Derived on every resolution pass and never cached across templates.
/// A declaration with options outranks a bare one for the same package name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDeclaration {
    pub name: String,
    pub options: Option<String>,
    pub raw_text: String,
    pub priority: u8,
}

impl PackageDeclaration {
    /// Parses a raw declaration such as `\usepackage[T1]{fontenc}`.
    ///
    /// Returns `None` when no package statement is found or the name is empty.
    /// Empty brackets (`\usepackage[]{x}`) count as no options.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = PACKAGE_PATTERN.captures(raw)?;
        let name = caps.get(2)?.as_str().trim();
        if name.is_empty() {
            return None;
        }

        let options = caps
            .get(1)
            .map(|m| m.as_str().trim())
            .filter(|opts| !opts.is_empty())
            .map(str::to_string);

        let priority = if options.is_some() {
            PRIORITY_WITH_OPTIONS
        } else {
            PRIORITY_BARE
        };

        Some(Self {
            name: name.to_string(),
            options,
            raw_text: raw.to_string(),
            priority,
        })
    }
}
