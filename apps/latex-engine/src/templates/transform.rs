//! Content Transformer: turns resume content into template-ready LaTeX.
//!
//! Pipeline (in order):
//! 1. Per-template rewrite from the profile table, if registered.
//! 2. glyphtounicode note, if the profile asks for it.
//! 3. Image substitution: every `\includegraphics{path}` gets the template's placeholder
//!    for `path`. A bad mapping only affects its own match: the default placeholder is
//!    used and a comment records the failure.
//! 4. Missing-font warnings injected after the `\documentclass` line, in declaration order.
//!
//! `transform` never fails. Any fault is logged and the content comes back unchanged.

use regex::Captures;
use thiserror::Error;
use tracing::{debug, warn};

use crate::templates::latex::{
    declared_package_names, BEGIN_DOCUMENT, DOCUMENT_CLASS_LINE, END_DOCUMENT, IMAGE_PATTERN,
};
use crate::templates::profiles::TemplateProfile;
use crate::templates::registry::{get_image_placeholder, Template, DEFAULT_IMAGE_PLACEHOLDER};

const GLYPH_TO_UNICODE_INPUT: &str = "\\input{glyphtounicode}";
const GLYPH_TO_UNICODE_NOTE: &str =
    "% Note: glyphtounicode functionality is handled by the PDF generator\n";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("rewrite for template '{template_id}' failed: {source}")]
    Rewrite {
        template_id: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
enum ImageError {
    #[error("placeholder for '{0}' is empty")]
    EmptyPlaceholder(String),
    #[error("placeholder '{0}' contains characters that break the LaTeX argument")]
    UnsafePlaceholder(String),
}

/// Transforms `content` for `template`. Returns `content` unchanged on any fault.
pub fn transform(template: &Template, profile: &TemplateProfile, content: &str) -> String {
    match try_transform(template, profile, content) {
        Ok(out) => out,
        Err(e) => {
            warn!("Error transforming template content: {e}");
            content.to_string()
        }
    }
}

pub fn try_transform(
    template: &Template,
    profile: &TemplateProfile,
    content: &str,
) -> Result<String, TransformError> {
    let mut out = match &profile.rewrite {
        Some(rewrite) => rewrite(content).map_err(|source| TransformError::Rewrite {
            template_id: template.id.clone(),
            source,
        })?,
        None => content.to_string(),
    };

    if profile.requires_glyph_to_unicode && !content.contains(GLYPH_TO_UNICODE_INPUT) {
        out = out.replacen(BEGIN_DOCUMENT, &format!("{GLYPH_TO_UNICODE_NOTE}{BEGIN_DOCUMENT}"), 1);
    }

    if !template.image_placeholders.is_empty() && IMAGE_PATTERN.is_match(&out) {
        out = substitute_images(template, &out);
    }

    Ok(inject_font_warnings(template, out))
}

fn substitute_images(template: &Template, content: &str) -> String {
    IMAGE_PATTERN
        .replace_all(content, |caps: &Captures| {
            let options = caps.get(1).map_or("", |m| m.as_str());
            let image_path = &caps[2];
            match checked_placeholder(template, image_path) {
                Ok(placeholder) => format!("\\includegraphics{options}{{{placeholder}}}"),
                Err(e) => {
                    warn!("Error processing image {image_path}: {e}");
                    format!(
                        "% Failed to process image: {image_path}\n% Using default placeholder\n\\includegraphics{options}{{{DEFAULT_IMAGE_PLACEHOLDER}}}"
                    )
                }
            }
        })
        .into_owned()
}

fn checked_placeholder<'a>(template: &'a Template, image_path: &str) -> Result<&'a str, ImageError> {
    let placeholder = get_image_placeholder(template, image_path);
    if placeholder.trim().is_empty() {
        return Err(ImageError::EmptyPlaceholder(image_path.to_string()));
    }
    if placeholder.contains(['{', '}', '\n']) {
        return Err(ImageError::UnsafePlaceholder(placeholder.to_string()));
    }
    Ok(placeholder)
}

fn inject_font_warnings(template: &Template, content: String) -> String {
    if template.required_fonts.is_empty() {
        return content;
    }

    let declared = declared_package_names(&content);
    let warnings: Vec<String> = template
        .required_fonts
        .iter()
        .filter(|font| !declared.iter().any(|name| name == *font))
        .map(|font| format!("% Warning: Template requires {font} font package"))
        .collect();

    if warnings.is_empty() {
        return content;
    }

    let Some(class_line) = DOCUMENT_CLASS_LINE.find(&content) else {
        debug!(
            "No \\documentclass line in content for '{}'; skipping {} font warnings",
            template.id,
            warnings.len()
        );
        return content;
    };

    let mut out = String::with_capacity(content.len() + warnings.len() * 64);
    out.push_str(&content[..class_line.end()]);
    for warning in &warnings {
        out.push_str(warning);
        out.push('\n');
    }
    out.push_str(&content[class_line.end()..]);
    out
}

/// Places transformed `content` into the template source.
///
/// Substitutes the profile's content placeholder (first occurrence). Without a placeholder
/// the content goes right before `\end{document}`; without that too the source is returned
/// as-is.
pub fn render_document(template: &Template, profile: &TemplateProfile, content: &str) -> String {
    let body = transform(template, profile, content);
    let source = &template.latex_source;

    if source.contains(&profile.content_placeholder) {
        return source.replacen(&profile.content_placeholder, &body, 1);
    }

    if let Some(pos) = source.rfind(END_DOCUMENT) {
        let mut out = String::with_capacity(source.len() + body.len() + 2);
        out.push_str(&source[..pos]);
        out.push_str(&body);
        out.push('\n');
        out.push_str(&source[pos..]);
        return out;
    }

    warn!(
        "Template '{}' has neither a content placeholder nor \\end{{document}}; content not placed",
        template.id
    );
    source.clone()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;
    use crate::templates::profiles::ProfileTable;

    fn template(fonts: &[&str], images: &[(&str, &str)]) -> Template {
        Template {
            id: "Test".to_string(),
            name: "Test".to_string(),
            source_path: PathBuf::from("templates/latex/Test.tex"),
            latex_source: "\\documentclass{article}\n\\begin{document}\n%RESUME_CONTENT%\n\\end{document}\n"
                .to_string(),
            description: None,
            source_url: None,
            image_placeholders: images
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            required_fonts: fonts.iter().map(|s| s.to_string()).collect(),
            custom_packages: vec![],
            preview_image_path: None,
            is_default: false,
        }
    }

    #[test]
    fn test_no_rewrite_rule_passes_content_through() {
        let t = template(&[], &[]);
        let content = "\\section{Work}\n\\item Did things";
        assert_eq!(transform(&t, &TemplateProfile::default(), content), content);
    }

    #[test]
    fn test_only_font_warnings_are_added_without_rewrite() {
        let t = template(&["Charter", "FiraSans"], &[]);
        let content = "\\documentclass{article}\n\\usepackage{FiraSans}\nBody\n";
        let out = transform(&t, &TemplateProfile::default(), content);
        assert_eq!(
            out,
            "\\documentclass{article}\n% Warning: Template requires Charter font package\n\\usepackage{FiraSans}\nBody\n"
        );
    }

    #[test]
    fn test_font_warnings_follow_declaration_order() {
        let t = template(&["Zeta", "Alpha"], &[]);
        let out = transform(&t, &TemplateProfile::default(), "\\documentclass{article}\nx");
        let zeta = out.find("Zeta").unwrap();
        let alpha = out.find("Alpha").unwrap();
        assert!(zeta < alpha);
    }

    #[test]
    fn test_font_package_with_options_counts_as_present() {
        let t = template(&["FiraSans"], &[]);
        let content = "\\documentclass{article}\n\\usepackage[sfdefault]{FiraSans}\n";
        assert_eq!(transform(&t, &TemplateProfile::default(), content), content);
    }

    #[test]
    fn test_no_class_line_means_no_font_warnings() {
        let t = template(&["Charter"], &[]);
        assert_eq!(transform(&t, &TemplateProfile::default(), "body only"), "body only");
    }

    #[test]
    fn test_rewrite_rule_is_applied() {
        let t = template(&[], &[]);
        let profiles = ProfileTable::builtin();
        let out = transform(&t, profiles.get("John_Miller_CV").unwrap(), "\\section{Skills}");
        assert_eq!(out, "\\headright{Skills}{\\workIcon}");
    }

    #[test]
    fn test_failing_rewrite_returns_content_unchanged() {
        let t = template(&["Charter"], &[]);
        let profile =
            TemplateProfile::default().with_rewrite(|_| Err(anyhow::anyhow!("rule exploded")));
        let content = "\\documentclass{article}\nBody";
        assert_eq!(transform(&t, &profile, content), content);
        assert!(try_transform(&t, &profile, content).is_err());
    }

    #[test]
    fn test_mapped_image_is_substituted() {
        let t = template(&[], &[("me.png", "/img/anon.png")]);
        let out = transform(
            &t,
            &TemplateProfile::default(),
            "\\includegraphics[width=2cm]{me.png}",
        );
        assert_eq!(out, "\\includegraphics[width=2cm]{/img/anon.png}");
    }

    #[test]
    fn test_unmapped_image_uses_default_placeholder() {
        let t = template(&[], &[("me.png", "/img/anon.png")]);
        let out = transform(&t, &TemplateProfile::default(), "\\includegraphics{broken.jpg}");
        assert_eq!(out, "\\includegraphics{/placeholder-user.jpg}");
    }

    #[test]
    fn test_images_untouched_without_declared_placeholders() {
        let t = template(&[], &[]);
        let content = "\\includegraphics{photo.jpg}";
        assert_eq!(transform(&t, &TemplateProfile::default(), content), content);
    }

    #[test]
    fn test_bad_mapping_fails_locally_and_annotates() {
        let t = template(&[], &[("bad.png", "{oops}"), ("good.png", "/ok.png")]);
        let out = transform(
            &t,
            &TemplateProfile::default(),
            "\\includegraphics{bad.png}\n\\includegraphics{good.png}",
        );
        assert!(out.contains("% Failed to process image: bad.png"));
        assert!(out.contains("\\includegraphics{/placeholder-user.jpg}"));
        assert!(out.contains("\\includegraphics{/ok.png}"));
    }

    #[test]
    fn test_glyph_to_unicode_note() {
        let t = template(&[], &[]);
        let profile = TemplateProfile {
            requires_glyph_to_unicode: true,
            ..TemplateProfile::default()
        };
        let out = transform(&t, &profile, "\\begin{document}\nx");
        assert!(out.starts_with("% Note: glyphtounicode"));

        let already = "\\input{glyphtounicode}\n\\begin{document}\nx";
        assert_eq!(transform(&t, &profile, already), already);
    }

    #[test]
    fn test_render_document_fills_placeholder() {
        let t = template(&[], &[]);
        let out = render_document(&t, &TemplateProfile::default(), "\\section{A}");
        assert_eq!(
            out,
            "\\documentclass{article}\n\\begin{document}\n\\section{A}\n\\end{document}\n"
        );
    }

    #[test]
    fn test_render_document_without_placeholder_inserts_before_end() {
        let mut t = template(&[], &[]);
        t.latex_source = "\\begin{document}\nHead\n\\end{document}".to_string();
        let out = render_document(&t, &TemplateProfile::default(), "Body");
        assert_eq!(out, "\\begin{document}\nHead\nBody\n\\end{document}");
    }

    #[test]
    fn test_transform_does_not_touch_template() {
        let t = template(&["Charter"], &[("a", "b")]);
        let before = t.clone();
        let _ = transform(&t, &TemplateProfile::default(), "\\documentclass{x}\n\\includegraphics{a}");
        assert_eq!(t, before);
    }
}
