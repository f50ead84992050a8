//! Capability registry: which conversions are valid for which file types.
//!
//! The registry is built exactly once, from the enumerated tables at the
//! bottom of this file, and is read-only afterwards. Every session in the
//! process shares the same [`CapabilityRegistry::builtin`] instance, which is
//! safe because nothing can mutate it after initialisation.
//!
//! Two views are kept:
//!
//! * the **extension index** — extension → ordered operations. This is the
//!   choice list offered after a file is selected, and the only thing
//!   [`CapabilityRegistry::lookup`] consults.
//! * the **operation table** — every operation by id, including tool-only
//!   operations (merge, rotate, OCR) that are reachable from a dedicated tool
//!   entry point but never offered in the generic choice list.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Remote conversion endpoints exposed by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Endpoint {
    PdfToWord,
    WordToPdf,
    ExcelToPdf,
    ImageToPdf,
    PdfToImage,
    ImageFormat,
    ImageToText,
    MergePdf,
    CompressPdf,
    RotatePdf,
}

impl Endpoint {
    /// Path relative to the API base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::PdfToWord => "/convert/pdf-to-word",
            Endpoint::WordToPdf => "/convert/word-to-pdf",
            Endpoint::ExcelToPdf => "/convert/excel-to-pdf",
            Endpoint::ImageToPdf => "/convert/image-to-pdf",
            Endpoint::PdfToImage => "/convert/pdf-to-image",
            Endpoint::ImageFormat => "/convert/image-format",
            Endpoint::ImageToText => "/convert/image-to-text",
            Endpoint::MergePdf => "/convert/merge-pdf",
            Endpoint::CompressPdf => "/convert/compress-pdf",
            Endpoint::RotatePdf => "/convert/rotate-pdf",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// How an extra parameter is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Text,
    Select,
    /// Fixed by the operation; always sent with its default.
    Hidden,
}

/// One allowed value of a select parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// Schema entry for an extra form field sent alongside the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: ParameterKind,
    pub required: bool,
    pub default: Option<&'static str>,
    /// Allowed values. Empty means any value is accepted.
    pub options: &'static [SelectOption],
}

impl ParameterSpec {
    /// Whether `value` is acceptable for this parameter.
    pub fn allows(&self, value: &str) -> bool {
        self.options.is_empty() || self.options.iter().any(|o| o.value == value)
    }

    /// Comma-separated option values, for error messages.
    pub fn allowed_values(&self) -> String {
        self.options
            .iter()
            .map(|o| o.value)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A user-supplied value for one of an operation's extra parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterValue {
    pub name: String,
    pub value: String,
}

impl ParameterValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Shape of a successful response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// The body is the converted file.
    Binary,
    /// The body is a JSON payload carrying extracted text.
    Text,
}

/// A named conversion capability bound to a remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub id: &'static str,
    pub label: &'static str,
    /// Lowercase extensions (without the dot) this operation accepts.
    pub source_extensions: &'static [&'static str],
    /// Extension of the produced file, e.g. `"docx"`.
    pub target_format: &'static str,
    pub endpoint: Endpoint,
    pub parameters: &'static [ParameterSpec],
    /// Upper bound on files per submission. 1 for single-file tools.
    pub max_files: usize,
    pub result: ResultKind,
}

impl Operation {
    /// Case-insensitive check against [`Operation::source_extensions`].
    pub fn accepts(&self, extension: &str) -> bool {
        let ext = normalize_extension(extension);
        self.source_extensions.iter().any(|e| *e == ext)
    }

    /// Multipart field name used for the uploaded file(s).
    pub fn upload_field(&self) -> &'static str {
        if self.max_files > 1 {
            "files"
        } else {
            "file"
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&'static ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// MIME type of the converted output.
    pub fn target_mime(&self) -> &'static str {
        mime_for_format(self.target_format)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id)
    }
}

/// Static extension → operations lookup table.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    operations: Vec<&'static Operation>,
    by_extension: HashMap<String, Vec<&'static Operation>>,
}

static BUILTIN: Lazy<CapabilityRegistry> = Lazy::new(CapabilityRegistry::from_tables);

impl CapabilityRegistry {
    /// The process-wide registry built from the built-in tool table.
    pub fn builtin() -> &'static CapabilityRegistry {
        &BUILTIN
    }

    fn from_tables() -> Self {
        let mut registry = CapabilityRegistry::default();
        for op in OPERATIONS {
            registry.add_operation(op);
        }
        for (extension, ids) in EXTENSION_TABLE {
            for id in *ids {
                if let Some(op) = OPERATIONS.iter().find(|op| op.id == *id) {
                    registry.register(extension, op);
                }
            }
        }
        registry
    }

    fn add_operation(&mut self, op: &'static Operation) {
        if !self.operations.iter().any(|o| o.id == op.id) {
            self.operations.push(op);
        }
    }

    /// Append `operation` to the choice list for `extension`.
    ///
    /// Only used while building; a built registry is never mutated.
    fn register(&mut self, extension: &str, operation: &'static Operation) {
        self.add_operation(operation);
        let entry = self
            .by_extension
            .entry(normalize_extension(extension))
            .or_default();
        if !entry.iter().any(|o| o.id == operation.id) {
            entry.push(operation);
        }
    }

    /// Ordered operations offered for `extension`. Empty for unknown types.
    pub fn lookup(&self, extension: &str) -> &[&'static Operation] {
        self.by_extension
            .get(&normalize_extension(extension))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First operation offered for `extension`, used when no choice is made.
    pub fn auto_route(&self, extension: &str) -> Option<&'static Operation> {
        self.lookup(extension).first().copied()
    }

    /// Any operation by id, including tool-only operations.
    pub fn operation(&self, id: &str) -> Option<&'static Operation> {
        self.operations.iter().find(|o| o.id == id).copied()
    }

    pub fn operations(&self) -> impl Iterator<Item = &'static Operation> + '_ {
        self.operations.iter().copied()
    }

    /// Extensions with at least one operation, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.by_extension.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

/// Lowercase and strip a leading dot: `".PDF"` → `"pdf"`.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// MIME type for a target format extension.
pub fn mime_for_format(format: &str) -> &'static str {
    match normalize_extension(format).as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

// ── Built-in tables ──────────────────────────────────────────────────────

const OUTPUT_FORMATS: &[SelectOption] = &[
    SelectOption { value: "jpg", label: "JPG" },
    SelectOption { value: "png", label: "PNG" },
];

const ROTATIONS: &[SelectOption] = &[
    SelectOption { value: "90", label: "90° Clockwise" },
    SelectOption { value: "180", label: "180°" },
    SelectOption { value: "270", label: "270° Clockwise (90° Counter)" },
];

const fn output_format(default: &'static str) -> ParameterSpec {
    ParameterSpec {
        name: "output_format",
        label: "Output Format",
        kind: ParameterKind::Hidden,
        required: true,
        default: Some(default),
        options: OUTPUT_FORMATS,
    }
}

const TO_JPG: &[ParameterSpec] = &[output_format("jpg")];
const TO_PNG: &[ParameterSpec] = &[output_format("png")];
const ROTATION: &[ParameterSpec] = &[ParameterSpec {
    name: "rotation",
    label: "Rotation Angle",
    kind: ParameterKind::Select,
    required: true,
    default: Some("90"),
    options: ROTATIONS,
}];

const fn single(
    id: &'static str,
    label: &'static str,
    source_extensions: &'static [&'static str],
    target_format: &'static str,
    endpoint: Endpoint,
    parameters: &'static [ParameterSpec],
) -> Operation {
    Operation {
        id,
        label,
        source_extensions,
        target_format,
        endpoint,
        parameters,
        max_files: 1,
        result: ResultKind::Binary,
    }
}

static OPERATIONS: &[Operation] = &[
    single("pdf-to-word", "PDF to Word", &["pdf"], "docx", Endpoint::PdfToWord, &[]),
    single("pdf-to-jpg", "PDF to JPG", &["pdf"], "jpg", Endpoint::PdfToImage, &[]),
    single("compress-pdf", "Compress PDF", &["pdf"], "pdf", Endpoint::CompressPdf, &[]),
    single("word-to-pdf", "Word to PDF", &["docx", "doc"], "pdf", Endpoint::WordToPdf, &[]),
    single("jpg-to-pdf", "JPG to PDF", &["jpg", "jpeg"], "pdf", Endpoint::ImageToPdf, &[]),
    single("png-to-pdf", "PNG to PDF", &["png"], "pdf", Endpoint::ImageToPdf, &[]),
    single("png-to-jpg", "PNG to JPG", &["png"], "jpg", Endpoint::ImageFormat, TO_JPG),
    single("webp-to-jpg", "WEBP to JPG", &["webp"], "jpg", Endpoint::ImageFormat, TO_JPG),
    single("webp-to-png", "WEBP to PNG", &["webp"], "png", Endpoint::ImageFormat, TO_PNG),
    single("excel-to-pdf", "Excel to PDF", &["xlsx", "xls"], "pdf", Endpoint::ExcelToPdf, &[]),
    // Tool-only operations: reachable through `ConversionSession::for_tool`.
    Operation {
        id: "merge-pdf",
        label: "Merge PDF",
        source_extensions: &["pdf"],
        target_format: "pdf",
        endpoint: Endpoint::MergePdf,
        parameters: &[],
        max_files: 10,
        result: ResultKind::Binary,
    },
    single("rotate-pdf", "Rotate PDF", &["pdf"], "pdf", Endpoint::RotatePdf, ROTATION),
    Operation {
        id: "image-to-text",
        label: "Image to Text (OCR)",
        source_extensions: &["jpg", "jpeg", "png", "tiff", "bmp"],
        target_format: "txt",
        endpoint: Endpoint::ImageToText,
        parameters: &[],
        max_files: 1,
        result: ResultKind::Text,
    },
];

static EXTENSION_TABLE: &[(&str, &[&str])] = &[
    ("pdf", &["pdf-to-word", "pdf-to-jpg", "compress-pdf"]),
    ("docx", &["word-to-pdf"]),
    ("doc", &["word-to-pdf"]),
    ("jpg", &["jpg-to-pdf"]),
    ("jpeg", &["jpg-to-pdf"]),
    ("png", &["png-to-pdf", "png-to-jpg"]),
    ("webp", &["webp-to-jpg", "webp-to-png"]),
    ("xlsx", &["excel-to-pdf"]),
    ("xls", &["excel-to-pdf"]),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ops: &[&Operation]) -> Vec<&'static str> {
        ops.iter().map(|o| o.id).collect()
    }

    #[test]
    fn pdf_lookup_is_ordered() {
        let reg = CapabilityRegistry::builtin();
        assert_eq!(
            ids(reg.lookup("pdf")),
            vec!["pdf-to-word", "pdf-to-jpg", "compress-pdf"]
        );
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = CapabilityRegistry::builtin();
        assert_eq!(ids(reg.lookup("PNG")), ids(reg.lookup("png")));
        assert_eq!(ids(reg.lookup(".Webp")), vec!["webp-to-jpg", "webp-to-png"]);
    }

    #[test]
    fn unknown_extension_is_empty() {
        let reg = CapabilityRegistry::builtin();
        for ext in ["zip", "", "tar.gz", "exe", "pptx"] {
            assert!(reg.lookup(ext).is_empty(), "{ext} should have no operations");
            assert!(reg.auto_route(ext).is_none());
        }
    }

    #[test]
    fn word_and_excel_aliases_share_operation() {
        let reg = CapabilityRegistry::builtin();
        assert_eq!(ids(reg.lookup("doc")), ids(reg.lookup("docx")));
        assert_eq!(ids(reg.lookup("xls")), vec!["excel-to-pdf"]);
        assert_eq!(ids(reg.lookup("jpeg")), vec!["jpg-to-pdf"]);
    }

    #[test]
    fn every_operation_has_endpoint_and_target() {
        let reg = CapabilityRegistry::builtin();
        for op in reg.operations() {
            assert!(!op.endpoint.path().is_empty(), "{}", op.id);
            assert!(op.endpoint.path().starts_with("/convert/"), "{}", op.id);
            assert!(!op.target_format.is_empty(), "{}", op.id);
            assert!(op.max_files >= 1, "{}", op.id);
        }
    }

    #[test]
    fn indexed_operations_accept_their_extension() {
        let reg = CapabilityRegistry::builtin();
        for ext in reg.extensions() {
            for op in reg.lookup(ext) {
                assert!(op.accepts(ext), "{} should accept {ext}", op.id);
            }
        }
    }

    #[test]
    fn tool_only_operations_are_not_offered_by_extension() {
        let reg = CapabilityRegistry::builtin();
        for id in ["merge-pdf", "rotate-pdf", "image-to-text"] {
            assert!(reg.operation(id).is_some(), "{id} missing");
            for ext in reg.extensions() {
                assert!(!ids(reg.lookup(ext)).contains(&id));
            }
        }
    }

    #[test]
    fn upload_field_depends_on_max_files() {
        let reg = CapabilityRegistry::builtin();
        assert_eq!(reg.operation("merge-pdf").unwrap().upload_field(), "files");
        assert_eq!(reg.operation("pdf-to-jpg").unwrap().upload_field(), "file");
    }

    #[test]
    fn image_format_operations_fix_output_format() {
        let reg = CapabilityRegistry::builtin();
        let op = reg.operation("webp-to-png").unwrap();
        let p = op.parameter("output_format").unwrap();
        assert_eq!(p.kind, ParameterKind::Hidden);
        assert_eq!(p.default, Some("png"));
        assert!(p.allows("jpg"));
        assert!(!p.allows("gif"));
    }

    #[test]
    fn register_deduplicates() {
        let mut reg = CapabilityRegistry::default();
        let op = &OPERATIONS[0];
        reg.register("PDF", op);
        reg.register("pdf", op);
        assert_eq!(reg.lookup("pdf").len(), 1);
        assert_eq!(reg.operations().count(), 1);
    }

    #[test]
    fn auto_route_picks_first() {
        let reg = CapabilityRegistry::builtin();
        assert_eq!(reg.auto_route("png").map(|o| o.id), Some("png-to-pdf"));
    }

    #[test]
    fn target_mime_types() {
        let reg = CapabilityRegistry::builtin();
        assert_eq!(reg.operation("pdf-to-jpg").unwrap().target_mime(), "image/jpeg");
        assert_eq!(reg.operation("word-to-pdf").unwrap().target_mime(), "application/pdf");
        assert!(reg
            .operation("image-to-text")
            .unwrap()
            .target_mime()
            .starts_with("text/plain"));
    }
}
