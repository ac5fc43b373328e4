//! Library collections linked as fallback for unresolved references.

use crate::error::CompileError;
use crate::pipeline::{build_translation_unit, Pipeline, PipelineError, PipelineOptions};
use cwasm_diagnostics::ice;
use cwasm_link::library::IrLibrary;
use std::collections::BTreeMap;
use std::sync::OnceLock;

const STANDARD_HEADERS: [(&str, &str); 5] = [
    ("stdarg.h", include_str!("../runtime/include/stdarg.h")),
    ("stddef.h", include_str!("../runtime/include/stddef.h")),
    ("stdio.h", include_str!("../runtime/include/stdio.h")),
    ("stdlib.h", include_str!("../runtime/include/stdlib.h")),
    ("string.h", include_str!("../runtime/include/string.h")),
];

const STANDARD_SOURCES: [(&str, &str); 3] = [
    ("stdio.c", include_str!("../runtime/src/stdio.c")),
    ("stdlib.c", include_str!("../runtime/src/stdlib.c")),
    ("string.c", include_str!("../runtime/src/string.c")),
];

static STANDARD: OnceLock<Library> = OnceLock::new();

/// A prebuilt library: headers available to `#include`, and the IR of its translation units.
///
/// Building a library runs the front end once. Linking only reads it, so one library can serve
/// any number of compilations.
#[derive(Debug)]
pub struct Library {
    headers: BTreeMap<String, String>,
    ir: IrLibrary,
}

impl Library {
    /// Build a library from its headers and sources. Sources see the headers and nothing else.
    pub fn build(
        name: &str,
        headers: BTreeMap<String, String>,
        sources: &BTreeMap<String, String>,
    ) -> Result<Self, CompileError> {
        let _span = tracing::debug_span!("library", name).entered();
        let opts = PipelineOptions::default();
        let pipeline = Pipeline::new(&opts, &headers, None);
        let units = sources
            .iter()
            .map(|(file, source)| build_translation_unit(&pipeline, file, source))
            .collect::<Result<Vec<_>, _>>()?;
        let ir = IrLibrary::new(name, units).map_err(PipelineError::from)?;
        Ok(Self { headers, ir })
    }

    /// The bundled C runtime, built on first use and shared by every compilation in the process.
    pub fn standard() -> &'static Library {
        STANDARD.get_or_init(|| {
            let headers = collect(&STANDARD_HEADERS);
            let sources = collect(&STANDARD_SOURCES);
            Self::build("libc", headers, &sources)
                .unwrap_or_else(|e| ice!("bundled runtime library failed to build: {e}"))
        })
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn ir(&self) -> &IrLibrary {
        &self.ir
    }
}

fn collect(files: &[(&str, &str)]) -> BTreeMap<String, String> {
    files
        .iter()
        .map(|(name, source)| (name.to_string(), source.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwasm_macros::{assert_err, assert_matches, assert_ok, assert_some};

    #[test]
    fn test_standard_library_provides_runtime() {
        let library = Library::standard();
        for name in ["malloc", "calloc", "free", "printf", "puts", "strlen", "memcpy"] {
            assert_some!(library.ir().defining_unit(name));
        }
        assert!(library.headers().contains_key("stdio.h"));
        assert!(std::ptr::eq(library, Library::standard()));
    }

    #[test]
    fn test_duplicate_library_definitions_are_rejected() {
        let sources = BTreeMap::from([
            ("a.c".to_owned(), "int twice(int x) { return x * 2; }".to_owned()),
            ("b.c".to_owned(), "int twice(int x) { return x + x; }".to_owned()),
        ]);
        let err = assert_err!(Library::build("dup", BTreeMap::new(), &sources));
        assert_matches!(err.kind, PipelineError::Link(_));
        assert_eq!(err.file, None);
    }

    #[test]
    fn test_library_sources_see_their_headers() {
        let headers = BTreeMap::from([("seven.h".to_owned(), "#define SEVEN 7".to_owned())]);
        let sources = BTreeMap::from([(
            "seven.c".to_owned(),
            "#include <seven.h>\nint seven(void) { return SEVEN; }".to_owned(),
        )]);
        let library = assert_ok!(Library::build("seven", headers, &sources));
        assert_eq!(library.ir().definitions().collect::<Vec<_>>(), vec!["seven"]);
    }
}
