//! Local file extraction: plain text, PDF, DOCX and XLSX.
//!
//! [`FileTextSource`] reads the file a document was uploaded from and
//! returns its running text (with line breaks preserved, since clause
//! detection is line-based) plus spreadsheet rows as tables. Errors are
//! typed as [`ExtractError`] and never panic.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use tracing::debug;

use contract_harness_core::models::{ContractDocument, META_SOURCE_PATH};
use contract_harness_core::source::{ExtractedTable, ExtractedText, TextSource};

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// File formats [`extract_bytes`] understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Text,
    Pdf,
    Docx,
    Xlsx,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" | "md" | "text" => Ok(FileFormat::Text),
            "pdf" => Ok(FileFormat::Pdf),
            "docx" => Ok(FileFormat::Docx),
            "xlsx" => Ok(FileFormat::Xlsx),
            other => Err(ExtractError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Extraction error: no panic; the caller marks the document failed.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFormat(String),
    Encoding(String),
    Pdf(String),
    Ooxml(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFormat(ext) => {
                write!(f, "unsupported file type: '{}'", ext)
            }
            ExtractError::Encoding(e) => write!(f, "text is not valid UTF-8: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract text and tables from file bytes of a known format.
pub fn extract_bytes(bytes: &[u8], format: FileFormat) -> Result<ExtractedText, ExtractError> {
    match format {
        FileFormat::Text => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| ExtractError::Encoding(e.to_string()))?;
            Ok(ExtractedText::from_text(text.replace("\r\n", "\n")))
        }
        FileFormat::Pdf => extract_pdf(bytes),
        FileFormat::Docx => extract_docx(bytes).map(ExtractedText::from_text),
        FileFormat::Xlsx => {
            let tables = extract_xlsx(bytes)?;
            Ok(ExtractedText {
                tables,
                ..Default::default()
            })
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
    let text =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    // Form feeds separate pages when the PDF carries them.
    let pages: Vec<String> = text
        .split('\u{c}')
        .map(|p| p.to_string())
        .filter(|p| !p.trim().is_empty())
        .collect();
    Ok(ExtractedText {
        text: pages.join("\n"),
        pages,
        ..Default::default()
    })
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<std::io::Cursor<&[u8]>>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

/// DOCX body text, one line per `w:p` paragraph.
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" => out.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// XLSX sheets as row tables. Shared strings, inline strings and numeric
/// values are all kept; BOQ quantities and rates are numbers.
fn extract_xlsx(bytes: &[u8]) -> Result<Vec<ExtractedTable>, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = if archive.by_name("xl/sharedStrings.xml").is_ok() {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };

    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut tables = Vec::new();
    for name in names.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let rows = extract_sheet_rows(&xml, &shared_strings)?;
        let table_name = name
            .trim_start_matches("xl/worksheets/")
            .trim_end_matches(".xml")
            .to_string();
        tables.push(ExtractedTable {
            name: table_name,
            rows,
        });
    }
    Ok(tables)
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn extract_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut cell_type: Option<Vec<u8>> = None;
    let mut in_value = false;
    let mut cell_count = 0usize;
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    cell_type = e
                        .attributes()
                        .filter_map(|a| a.ok())
                        .find(|a| a.key.as_ref() == b"t")
                        .map(|a| a.value.to_vec());
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                let cell = match cell_type.as_deref() {
                    Some(b"s") => value
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i).cloned())
                        .unwrap_or_default(),
                    _ => value.to_string(),
                };
                row.push(cell);
                cell_count += 1;
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => cell_type = None,
                b"row" => {
                    if row.iter().any(|c| !c.is_empty()) {
                        rows.push(std::mem::take(&mut row));
                    } else {
                        row.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

/// Reads documents from the local filesystem.
///
/// The path comes from the document's `source_path` metadata, falling back
/// to `root/file_name`.
pub struct FileTextSource {
    root: PathBuf,
}

impl FileTextSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, document: &ContractDocument) -> Result<PathBuf> {
        if let Some(path) = document.metadata.get(META_SOURCE_PATH) {
            return Ok(PathBuf::from(path));
        }
        let file_name = document
            .file_name
            .as_deref()
            .ok_or_else(|| anyhow!("document {} has no file to read", document.id))?;
        Ok(self.root.join(file_name))
    }
}

#[async_trait]
impl TextSource for FileTextSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn extract(&self, document: &ContractDocument) -> Result<ExtractedText> {
        let path = self.path_for(document)?;
        let format = FileFormat::from_path(&path)?;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        debug!(path = %path.display(), bytes = bytes.len(), "extracting");
        let extracted = tokio::task::spawn_blocking(move || extract_bytes(&bytes, format))
            .await
            .map_err(|e| anyhow!("extraction task failed: {}", e))?
            .with_context(|| format!("Failed to extract {}", path.display()))?;
        Ok(extracted)
    }
}
