//! Template loading: binary document in, HTML fragment out.

use std::borrow::Cow;
use std::fmt::Display;
use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

/// Largest `word/document.xml` accepted, uncompressed.
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Unsupported template file: {0} (expected .docx)")]
    UnsupportedType(String),

    #[error("Template is not a valid DOCX container: {0}")]
    Container(String),

    #[error("Template has no document body")]
    MissingBody,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts a clinician-provided template into an HTML fragment.
pub trait TemplateConverter: Send + Sync {
    /// `file_name` is checked before `bytes` are looked at.
    fn convert(&self, file_name: &str, bytes: &[u8]) -> Result<String, TemplateError>;
}

/// Read a template from disk and convert it.
pub fn load_template(converter: &dyn TemplateConverter, path: &Path) -> Result<String, TemplateError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // Reject by name before touching the file
    if !is_docx_name(&name) {
        return Err(TemplateError::UnsupportedType(name));
    }
    let bytes = std::fs::read(path)?;
    converter.convert(&name, &bytes)
}

fn is_docx_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".docx")
}

/// WordprocessingML converter: paragraphs become `<p>`, bold runs `<strong>`.
#[derive(Debug, Default)]
pub struct DocxConverter;

impl DocxConverter {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateConverter for DocxConverter {
    fn convert(&self, file_name: &str, bytes: &[u8]) -> Result<String, TemplateError> {
        if !is_docx_name(file_name) {
            return Err(TemplateError::UnsupportedType(file_name.to_string()));
        }
        let xml = read_document_xml(bytes)?;
        let html = document_to_html(&xml)?;
        tracing::debug!(file = file_name, html_len = html.len(), "Template converted");
        Ok(html)
    }
}

fn container(e: impl Display) -> TemplateError {
    TemplateError::Container(e.to_string())
}

fn read_document_xml(bytes: &[u8]) -> Result<String, TemplateError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(container)?;
    let entry = match archive.by_name("word/document.xml") {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(TemplateError::MissingBody),
        Err(e) => return Err(container(e)),
    };
    if entry.size() > MAX_BODY_BYTES {
        return Err(TemplateError::Container(format!("document body is {} bytes", entry.size())));
    }
    let mut xml = Vec::new();
    entry.take(MAX_BODY_BYTES).read_to_end(&mut xml)?;
    String::from_utf8(xml).map_err(container)
}

#[derive(Default)]
struct RunText {
    html: String,
    bold: bool,
}

impl RunText {
    fn write_to(self, out: &mut String) {
        if self.html.is_empty() {
            return;
        }
        if self.bold {
            out.push_str("<strong>");
            out.push_str(&self.html);
            out.push_str("</strong>");
        } else {
            out.push_str(&self.html);
        }
    }
}

/// `<w:b/>` is on unless `w:val` says otherwise.
fn toggle_on(e: &BytesStart<'_>) -> Result<bool, TemplateError> {
    match e.try_get_attribute("w:val").map_err(container)? {
        None => Ok(true),
        Some(attr) => {
            let value = attr.unescape_value().map_err(container)?;
            Ok(!matches!(value.as_ref(), "0" | "false" | "off"))
        }
    }
}

fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;"))
}

fn document_to_html(xml: &str) -> Result<String, TemplateError> {
    let mut reader = Reader::from_str(xml);
    let mut html = String::new();
    let mut paragraph: Option<String> = None;
    let mut run: Option<RunText> = None;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(container)? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => paragraph = Some(String::new()),
                b"w:r" => run = Some(RunText::default()),
                b"w:t" => in_text = true,
                b"w:b" => {
                    if let Some(r) = run.as_mut() {
                        r.bold = toggle_on(&e)?;
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => html.push_str("<p></p>"),
                b"w:b" => {
                    if let Some(r) = run.as_mut() {
                        r.bold = toggle_on(&e)?;
                    }
                }
                b"w:tab" => {
                    if let Some(r) = run.as_mut() {
                        r.html.push(' ');
                    }
                }
                b"w:br" => {
                    if let Some(r) = run.as_mut() {
                        r.html.push_str("<br/>");
                    }
                }
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(r) = run.as_mut() {
                    let text = t.unescape().map_err(container)?;
                    r.html.push_str(&escape_html(&text));
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:r" => {
                    if let (Some(r), Some(p)) = (run.take(), paragraph.as_mut()) {
                        r.write_to(p);
                    }
                }
                b"w:p" => {
                    if let Some(p) = paragraph.take() {
                        html.push_str("<p>");
                        html.push_str(&p);
                        html.push_str("</p>");
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(html)
}
