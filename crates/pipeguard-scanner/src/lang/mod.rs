pub mod javascript;
pub mod python;

use crate::records::FileScan;
use std::path::Path;

/// Dispatch a source file to its language extractor by extension.
/// Returns `None` for unsupported languages.
pub fn scan_file(root: &Path, path: &Path, content: &str) -> Option<FileScan> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "py" => Some(python::scan(root, path, content)),
        "js" | "jsx" | "ts" | "tsx" => Some(javascript::scan(root, path, content)),
        _ => None,
    }
}

pub fn supported_extensions(languages: &[String]) -> Vec<&'static str> {
    if languages.is_empty() {
        return vec!["py", "js", "jsx", "ts", "tsx"];
    }
    let mut exts = Vec::new();
    for language in languages {
        match language.as_str() {
            "python" => exts.push("py"),
            "javascript" => exts.extend(["js", "jsx"]),
            "typescript" => exts.extend(["ts", "tsx"]),
            _ => {}
        }
    }
    exts
}
