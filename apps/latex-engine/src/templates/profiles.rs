//! Template profiles: per-template rendering behavior, keyed by template id.
//!
//! The table is built by the caller and handed to the registry at construction, so a
//! new template registers its rewrite rule without touching the transformer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::templates::latex::SECTION_PATTERN;

/// Placeholder marking where resume content goes in a template source.
pub const DEFAULT_CONTENT_PLACEHOLDER: &str = "%RESUME_CONTENT%";

/// A pure source rewrite applied to content before it is placed in a template.
pub type RewriteFn = Arc<dyn Fn(&str) -> anyhow::Result<String> + Send + Sync>;

#[derive(Clone)]
pub struct TemplateProfile {
    pub content_placeholder: String,
    pub sample_content: String,
    pub rewrite: Option<RewriteFn>,
    /// Adds a note before `\begin{document}` when `\input{glyphtounicode}` is absent.
    pub requires_glyph_to_unicode: bool,
    /// CSS snippet the UI uses around an HTML rendering of this template.
    pub preview_styles: Option<String>,
}

impl Default for TemplateProfile {
    fn default() -> Self {
        Self {
            content_placeholder: DEFAULT_CONTENT_PLACEHOLDER.to_string(),
            sample_content: "% No specific template configuration found".to_string(),
            rewrite: None,
            requires_glyph_to_unicode: false,
            preview_styles: None,
        }
    }
}

impl fmt::Debug for TemplateProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateProfile")
            .field("content_placeholder", &self.content_placeholder)
            .field("has_rewrite", &self.rewrite.is_some())
            .field("requires_glyph_to_unicode", &self.requires_glyph_to_unicode)
            .finish_non_exhaustive()
    }
}

impl TemplateProfile {
    pub fn with_rewrite<F>(mut self, rewrite: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.rewrite = Some(Arc::new(rewrite));
        self
    }
}

/// Mapping from template id to profile. Unknown ids fall back to the default profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileTable {
    profiles: HashMap<String, TemplateProfile>,
    fallback: TemplateProfile,
}

impl ProfileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template_id: impl Into<String>, profile: TemplateProfile) {
        self.profiles.insert(template_id.into(), profile);
    }

    /// Looks up a profile by exact template id.
    pub fn get(&self, template_id: &str) -> Option<&TemplateProfile> {
        self.profiles.get(template_id)
    }

    /// Looks up a profile, returning the default profile for unknown ids.
    pub fn profile_for(&self, template_id: &str) -> &TemplateProfile {
        self.get(template_id).unwrap_or(&self.fallback)
    }

    /// The profiles shipped with the built-in template catalog.
    pub fn builtin() -> Self {
        let mut table = Self::new();

        table.register(
            "Default_Resume",
            TemplateProfile {
                sample_content: DEFAULT_RESUME_SAMPLE.trim_start().to_string(),
                preview_styles: Some(
                    ".preview-container {\n  font-family: \"Charter\", serif;\n  line-height: 1.5;\n}"
                        .to_string(),
                ),
                ..TemplateProfile::default()
            },
        );

        table.register(
            "John_Miller_CV",
            TemplateProfile {
                sample_content: JOHN_MILLER_SAMPLE.trim_start().to_string(),
                preview_styles: Some(
                    ".preview-container {\n  font-family: \"Fira Sans\", sans-serif;\n  background: #fff;\n}"
                        .to_string(),
                ),
                ..TemplateProfile::default()
            }
            .with_rewrite(sections_to_headright),
        );

        table
    }
}

/// `\section{Title}` → `\headright{Title}{\workIcon}`.
fn sections_to_headright(content: &str) -> anyhow::Result<String> {
    Ok(SECTION_PATTERN
        .replace_all(content, r"\headright{${1}}{\workIcon}")
        .into_owned())
}

const DEFAULT_RESUME_SAMPLE: &str = r"
\section{Work Experience}
\entry
  {2020-Present}
  {Senior Software Engineer}
  {Tech Company}
  {
    \begin{itemize}
      \item Led development of key features
      \item Improved system performance by 50\%
    \end{itemize}
  }";

const JOHN_MILLER_SAMPLE: &str = r"
\section{Work Experience}
\textsc{Senior Developer} at \textit{Tech Corp.}  \dates{2020--Present} \\
\smaller{Led development of key features and improved system performance}

\is
\smaller{Managed team of 5 developers and implemented new architecture}";
