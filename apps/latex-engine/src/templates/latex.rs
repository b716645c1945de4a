//! LaTeX pattern contract: the exact textual shapes this engine recognizes.
//!
//! The engine never interprets TeX. It only matches these patterns:
//! - package inclusion: `\usepackage[opts]{name}` (options optional, name may be a comma list)
//! - image inclusion: `\includegraphics[opts]{path}`
//! - document class: `\documentclass[opts]{class}` and the full line carrying it
//! - document environment markers: `\begin{document}` / `\end{document}`
//! - section markers: `\section{title}`
//!
//! Anything else in the source is opaque text.

use std::sync::LazyLock;

use regex::Regex;

pub const BEGIN_DOCUMENT: &str = "\\begin{document}";
pub const END_DOCUMENT: &str = "\\end{document}";
pub const DOCUMENT_CLASS: &str = "\\documentclass";

/// Captures: 1 = options (without brackets), 2 = package name(s).
pub static PACKAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\usepackage(?:\[([^\]]*)\])?\{([^}]*)\}").expect("package pattern is valid")
});

/// Captures: 1 = bracketed options (with brackets), 2 = image path.
pub static IMAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\includegraphics(\[[^\]]*\])?\{([^}]+)\}").expect("image pattern is valid")
});

/// The whole `\documentclass` declaration, options included.
pub static DOCUMENT_CLASS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\documentclass(?:\[[^\]]*\])?\{[^}]*\}").expect("class pattern is valid")
});

/// The line holding `\documentclass`, through its trailing newline.
pub static DOCUMENT_CLASS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\documentclass[^\n]*\n").expect("class line pattern is valid")
});

/// Captures: 1 = body between the document markers.
pub static DOCUMENT_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\\begin\{document\}(.*?)\\end\{document\}").expect("body pattern is valid")
});

/// Captures: 1 = section title.
pub static SECTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\section\{([^}]+)\}").expect("section pattern is valid"));

pub static COLOR_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:textcolor|color)\{").expect("colour pattern is valid")
});

/// Every package name declared in `source`, in order of appearance.
///
/// Comma lists (`\usepackage{a,b}`) contribute each name separately.
pub fn declared_package_names(source: &str) -> Vec<String> {
    PACKAGE_PATTERN
        .captures_iter(source)
        .filter_map(|caps| caps.get(2))
        .flat_map(|m| m.as_str().split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Every raw package declaration in `source`, verbatim.
pub fn package_declarations(source: &str) -> Vec<String> {
    PACKAGE_PATTERN
        .find_iter(source)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn has_document_class(source: &str) -> bool {
    source.contains(DOCUMENT_CLASS)
}

pub fn has_document_environment(source: &str) -> bool {
    source.contains(BEGIN_DOCUMENT) && source.contains(END_DOCUMENT)
}

/// Text between `\begin{document}` and `\end{document}`, trimmed.
pub fn document_body(source: &str) -> Option<&str> {
    DOCUMENT_BODY
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_package_names_handles_options_and_lists() {
        let src = "\\usepackage[T1]{fontenc}\n\\usepackage{amsmath, amssymb}\n";
        assert_eq!(
            declared_package_names(src),
            vec!["fontenc", "amsmath", "amssymb"]
        );
    }

    #[test]
    fn test_package_declarations_are_verbatim() {
        let src = "x \\usepackage[margin=1cm]{geometry} y \\usepackage{calc}";
        assert_eq!(
            package_declarations(src),
            vec!["\\usepackage[margin=1cm]{geometry}", "\\usepackage{calc}"]
        );
    }

    #[test]
    fn test_document_body_extraction() {
        let src = "\\documentclass{article}\n\\begin{document}\n  Hello\n\\end{document}\n";
        assert_eq!(document_body(src), Some("Hello"));
        assert_eq!(document_body("no markers"), None);
    }

    #[test]
    fn test_document_environment_requires_both_markers() {
        assert!(has_document_environment("\\begin{document}\\end{document}"));
        assert!(!has_document_environment("\\begin{document}"));
        assert!(!has_document_environment("\\end{document}"));
    }

    #[test]
    fn test_class_line_stops_at_newline() {
        let src = "\\documentclass[11pt]{article}\n\\usepackage{x}\n";
        let m = DOCUMENT_CLASS_LINE.find(src).unwrap();
        assert_eq!(m.as_str(), "\\documentclass[11pt]{article}\n");
    }
}
