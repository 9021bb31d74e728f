//! Locate and bind the pdfium shared library.
//!
//! Resolution order:
//!
//! 1. the configured `pdfium_lib_path` (a library file, or a directory that
//!    contains the platform library name),
//! 2. the platform library in the current working directory,
//! 3. the system library search path.
//!
//! Binding happens inside the blocking task that uses it, once per call, the
//! same way the rasteriser always worked; `thread_safe` in pdfium-render
//! serialises access to the library itself.

use crate::error::Pdf2HtmlError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bind pdfium, trying the configured path first.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, Pdf2HtmlError> {
    let bindings = match lib_path {
        Some(path) => {
            let lib = library_file(path);
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib).map_err(|e| {
                Pdf2HtmlError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e))
            })?
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| Pdf2HtmlError::PdfiumBindingFailed(format!("{:?}", e)))?,
    };
    Ok(Pdfium::new(bindings))
}

/// Turn a configured path into a library file path.
///
/// Directories get the platform file name appended (`libpdfium.so`,
/// `libpdfium.dylib`, `pdfium.dll`).
fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}
