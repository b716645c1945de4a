//! LaTeX template handling: declaration model, resolver, registry, transformer and
//! preview builder. Everything here is pure text processing; nothing shells out.

pub mod latex;
pub mod package;
pub mod preview;
pub mod profiles;
pub mod registry;
pub mod resolver;
pub mod transform;

pub use package::PackageDeclaration;
pub use preview::{build_preview_source, PreviewOptions};
pub use profiles::{ProfileTable, TemplateProfile};
pub use registry::{
    get_image_placeholder, normalized_id, Template, TemplateError, TemplateRegistry,
    BUILTIN_CATALOG,
};
pub use resolver::{resolve, resolve_declarations, Resolution};
pub use transform::{render_document, transform};
