//! Preview document builder: a self-contained, compilable rendering of a template.
//!
//! The preview keeps the template's document class, packages and preamble, tops up the
//! package set with the common baseline through the resolver, and fills the body with
//! sample content so the thumbnail shows a realistic page.

use tracing::warn;

use crate::templates::latex::{
    declared_package_names, document_body, package_declarations, BEGIN_DOCUMENT, COLOR_COMMAND,
    DOCUMENT_CLASS, DOCUMENT_CLASS_PATTERN,
};
use crate::templates::package::PackageDeclaration;
use crate::templates::profiles::TemplateProfile;
use crate::templates::registry::Template;
use crate::templates::resolver::{resolve_declarations, COMMON_PACKAGES};
use crate::templates::transform::transform;

const DEFAULT_DOCUMENT_CLASS: &str = "\\documentclass{article}";

const COMMON_LATEX_COMMANDS: &str = r"% Common commands and settings
\setlength{\parindent}{0pt}
\pagestyle{empty}
\raggedbottom
\raggedright

% Custom commands for CV/Resume
\newcommand{\cvSection}[1]{\section*{#1}\vspace{-0.5em}}
\newcommand{\cvItem}[2]{\textbf{#1} & #2 \\}
\newcommand{\cvEntry}[4]{\textbf{#1} & #2 & #3 & #4 \\}";

/// Knobs for a preview document.
#[derive(Debug, Clone)]
pub struct PreviewOptions {
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    /// Body to use instead of the template's own document body.
    pub content: Option<String>,
    pub additional_packages: Vec<String>,
    pub include_common_commands: bool,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            title: None,
            author: None,
            date: None,
            content: None,
            additional_packages: Vec::new(),
            include_common_commands: true,
        }
    }
}

/// What a template needs in its preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRequirements {
    pub document_class: String,
    pub packages: Vec<String>,
    pub preamble_commands: Vec<String>,
}

/// Scans a template source for its class, packages and preamble commands.
///
/// Packages implied by the body (tabularx, longtable, colour commands, `\setmainfont`)
/// are added after the explicit ones.
pub fn extract_requirements(source: &str) -> TemplateRequirements {
    let document_class = DOCUMENT_CLASS_PATTERN
        .find(source)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_DOCUMENT_CLASS.to_string());

    let mut packages = package_declarations(source);
    if source.contains("\\begin{tabularx}") {
        packages.push("\\usepackage{tabularx}".to_string());
    }
    if source.contains("\\begin{longtable}") {
        packages.push("\\usepackage{longtable}".to_string());
    }
    if COLOR_COMMAND.is_match(source) {
        packages.push("\\usepackage[dvipsnames]{xcolor}".to_string());
    }
    if source.contains("\\setmainfont") {
        packages.push("\\usepackage{fontspec}".to_string());
    }

    TemplateRequirements {
        document_class,
        packages,
        preamble_commands: preamble_commands(source),
    }
}

fn preamble_commands(source: &str) -> Vec<String> {
    let lines: Vec<&str> = source.lines().collect();
    let class_idx = lines.iter().position(|l| l.contains(DOCUMENT_CLASS));
    let begin_idx = lines.iter().position(|l| l.contains(BEGIN_DOCUMENT));

    let (Some(start), Some(end)) = (class_idx, begin_idx) else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    lines[start + 1..end]
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('%') && !l.starts_with("\\usepackage"))
        .map(str::to_string)
        .collect()
}

/// Builds the full preview document for `template`.
pub fn build_preview_source(
    template: &Template,
    profile: &TemplateProfile,
    options: &PreviewOptions,
) -> String {
    let requirements = extract_requirements(&template.latex_source);

    let declared: Vec<String> = requirements
        .packages
        .iter()
        .flat_map(|raw| declared_package_names(raw))
        .collect();
    let essentials = COMMON_PACKAGES.iter().filter(|raw| {
        PackageDeclaration::parse(raw)
            .map(|decl| !declared.contains(&decl.name))
            .unwrap_or(false)
    });

    let mut all_packages: Vec<String> = requirements.packages.clone();
    all_packages.extend(essentials.map(|s| s.to_string()));
    all_packages.extend(options.additional_packages.iter().cloned());

    let resolution = resolve_declarations(&all_packages);
    for raw in &resolution.skipped {
        warn!("Skipping invalid package declaration in preview of '{}': {raw}", template.id);
    }

    let mut preamble: Vec<String> = Vec::new();
    if options.include_common_commands {
        preamble.push(COMMON_LATEX_COMMANDS.to_string());
    }
    preamble.extend(requirements.preamble_commands.iter().cloned());

    let body = match &options.content {
        Some(content) => content.clone(),
        None => sample_body(template, profile),
    };

    let mut out = String::new();
    out.push_str(&requirements.document_class);
    out.push_str("\n\n% Essential packages\n");
    out.push_str(&resolution.packages.join("\n"));
    out.push_str("\n\n% Original preamble commands\n");
    out.push_str(&preamble.join("\n"));
    out.push_str("\n\n\\begin{document}\n");
    if let Some(title) = title_block(options) {
        out.push_str(&title);
        out.push('\n');
    }
    out.push_str(&body);
    out.push_str("\n\\end{document}\n");
    out
}

/// The template's own body with the content placeholder filled by the profile's sample.
fn sample_body(template: &Template, profile: &TemplateProfile) -> String {
    let body = document_body(&template.latex_source).unwrap_or_default();
    if body.contains(&profile.content_placeholder) {
        let sample = transform(template, profile, &profile.sample_content);
        body.replacen(&profile.content_placeholder, &sample, 1)
    } else {
        body.to_string()
    }
}

fn title_block(options: &PreviewOptions) -> Option<String> {
    let title = options.title.as_ref()?;
    let mut lines = vec![format!("\\title{{{title}}}")];
    if let Some(author) = &options.author {
        lines.push(format!("\\author{{{author}}}"));
    }
    lines.push(match &options.date {
        Some(date) => format!("\\date{{{date}}}"),
        None => "\\date{}".to_string(),
    });
    lines.push("\\maketitle".to_string());
    Some(lines.join("\n"))
}
