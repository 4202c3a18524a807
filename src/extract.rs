//! Multi-format text extraction.
//!
//! Document formats (PDF, DOCX, PPTX) are parsed in memory and return plain
//! UTF-8 text in source document order. Media formats are handed to the
//! [`Transcriber`]. Every strategy returns `Result<String, ExtractionError>`;
//! an aggregate that is empty after trimming is [`ExtractionError::EmptyContent`],
//! while individually blank pages, slides, or paragraphs are fine.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

use crate::error::ExtractionError;
use crate::models::FileFormat;
use crate::transcribe::Transcriber;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY: &str = "word/document.xml";
const PPTX_PRESENTATION: &str = "ppt/presentation.xml";
const PPTX_PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

type OoxmlArchive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

/// Format dispatcher: one handler per [`FileFormat`] variant.
pub struct Extractor {
    transcriber: Transcriber,
}

impl Extractor {
    pub fn new(transcriber: Transcriber) -> Self {
        Self { transcriber }
    }

    /// Extract plain text from `bytes` declared as `format`.
    ///
    /// Document parsing is CPU-bound and runs on the blocking pool; media
    /// goes through the transcriber, which applies its own timeout.
    pub async fn extract(
        &self,
        bytes: Arc<[u8]>,
        format: FileFormat,
    ) -> Result<String, ExtractionError> {
        match format {
            FileFormat::Pdf | FileFormat::Docx | FileFormat::Pptx => {
                tokio::task::spawn_blocking(move || extract_document(&bytes, format))
                    .await
                    .map_err(|e| {
                        ExtractionError::malformed(format, format!("extraction task failed: {}", e))
                    })?
            }
            FileFormat::Mp4 => self.transcriber.video_to_text(&bytes).await,
            FileFormat::Mp3 | FileFormat::Wav => {
                self.transcriber.audio_to_text(&bytes, format).await
            }
        }
    }
}

/// Extract text from a document format synchronously.
///
/// Media formats cannot be parsed here; they need the async [`Extractor`].
pub fn extract_document(bytes: &[u8], format: FileFormat) -> Result<String, ExtractionError> {
    let text = match format {
        FileFormat::Pdf => extract_pdf(bytes)?,
        FileFormat::Docx => extract_docx(bytes)?,
        FileFormat::Pptx => extract_pptx(bytes)?,
        FileFormat::Mp4 | FileFormat::Mp3 | FileFormat::Wav => {
            return Err(ExtractionError::UnsupportedFormat(
                format.extension().to_string(),
            ))
        }
    };
    require_text(text, format)
}

/// Empty aggregate text is the only extraction-level "no content" failure.
pub(crate) fn require_text(text: String, format: FileFormat) -> Result<String, ExtractionError> {
    if text.trim().is_empty() {
        Err(ExtractionError::EmptyContent(format))
    } else {
        Ok(text)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// PDF
// ═══════════════════════════════════════════════════════════════════════

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| ExtractionError::malformed(FileFormat::Pdf, e.to_string()))?;

    // BTreeMap keyed by page number, so iteration is page order.
    let pages = doc.get_pages();
    let mut page_texts = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) => page_texts.push(text.trim_end().to_string()),
            Err(e) => {
                warn!(page = page_number, error = %e, "PDF page text not decodable, treating as blank");
                page_texts.push(String::new());
            }
        }
    }
    Ok(page_texts.join("\n"))
}

// ═══════════════════════════════════════════════════════════════════════
// OOXML helpers
// ═══════════════════════════════════════════════════════════════════════

fn open_archive(bytes: &[u8], format: FileFormat) -> Result<OoxmlArchive<'_>, ExtractionError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractionError::malformed(format, e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut OoxmlArchive<'_>,
    name: &str,
    format: FileFormat,
) -> Result<Vec<u8>, ExtractionError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractionError::malformed(format, format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractionError::malformed(format, e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractionError::malformed(
            format,
            format!(
                "ZIP entry {} exceeds size limit ({} bytes)",
                name, MAX_XML_ENTRY_BYTES
            ),
        ));
    }
    Ok(out)
}

fn xml_error(format: FileFormat, e: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::malformed(format, format!("invalid XML: {}", e))
}

// ═══════════════════════════════════════════════════════════════════════
// DOCX
// ═══════════════════════════════════════════════════════════════════════

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = open_archive(bytes, FileFormat::Docx)?;
    let doc_xml = read_zip_entry_bounded(&mut archive, DOCX_BODY, FileFormat::Docx)?;
    Ok(docx_paragraphs(&doc_xml)?.join("\n"))
}

/// Paragraph texts of `word/document.xml`, in document order.
///
/// Whitespace inside `w:t` is significant, so text is never trimmed. Tabs and
/// breaks only count inside runs (`w:tab` also appears in tab-stop definitions).
/// Text-box paragraphs follow the paragraph that anchors them. `mc:Fallback`
/// repeats the `mc:Choice` content and is skipped.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut open: Vec<OpenParagraph> = Vec::new();
    let mut run_depth = 0usize;
    let mut in_text = false;
    let mut fallback_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf);
        if fallback_depth > 0 {
            match event {
                Ok(Event::Start(e)) if e.local_name().as_ref() == b"Fallback" => {
                    fallback_depth += 1
                }
                Ok(Event::End(e)) if e.local_name().as_ref() == b"Fallback" => {
                    fallback_depth -= 1
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_error(FileFormat::Docx, e)),
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => open.push(OpenParagraph::default()),
                b"r" => run_depth += 1,
                b"t" => in_text = true,
                b"Fallback" => fallback_depth = 1,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" => close_paragraph(&mut open, &mut paragraphs, OpenParagraph::default()),
                b"tab" if run_depth > 0 => push_to_open(&mut open, "\t"),
                b"br" | b"cr" if run_depth > 0 => push_to_open(&mut open, "\n"),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| xml_error(FileFormat::Docx, e))?;
                push_to_open(&mut open, &text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"p" => {
                    if let Some(paragraph) = open.pop() {
                        close_paragraph(&mut open, &mut paragraphs, paragraph);
                    }
                }
                b"r" => run_depth = run_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(FileFormat::Docx, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

#[derive(Default)]
struct OpenParagraph {
    text: String,
    /// Finished text-box paragraphs anchored in this one.
    nested: Vec<String>,
}

/// Hand a finished paragraph to its host, or to the output at top level.
fn close_paragraph(open: &mut [OpenParagraph], out: &mut Vec<String>, done: OpenParagraph) {
    let target = match open.last_mut() {
        Some(host) => &mut host.nested,
        None => out,
    };
    target.push(done.text);
    target.extend(done.nested);
}

fn push_to_open(open: &mut [OpenParagraph], text: &str) {
    if let Some(paragraph) = open.last_mut() {
        paragraph.text.push_str(text);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// PPTX
// ═══════════════════════════════════════════════════════════════════════

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = open_archive(bytes, FileFormat::Pptx)?;
    let slides = slide_order(&mut archive)?;
    let mut shape_texts = Vec::new();
    for name in slides {
        let xml = read_zip_entry_bounded(&mut archive, &name, FileFormat::Pptx)?;
        shape_texts.extend(slide_shape_texts(&xml)?);
    }
    Ok(shape_texts.join("\n"))
}

/// Slide part names in presentation order.
///
/// The authoritative order is `p:sldIdLst` in `ppt/presentation.xml`; when the
/// package lacks it, fall back to the numeric suffix of `ppt/slides/slideN.xml`.
fn slide_order(archive: &mut OoxmlArchive<'_>) -> Result<Vec<String>, ExtractionError> {
    let present: HashSet<String> = archive.file_names().map(str::to_string).collect();

    if present.contains(PPTX_PRESENTATION) && present.contains(PPTX_PRESENTATION_RELS) {
        let rels_xml = read_zip_entry_bounded(archive, PPTX_PRESENTATION_RELS, FileFormat::Pptx)?;
        let targets = relationship_targets(&rels_xml)?;
        let pres_xml = read_zip_entry_bounded(archive, PPTX_PRESENTATION, FileFormat::Pptx)?;
        let ordered: Vec<String> = slide_relationship_ids(&pres_xml)?
            .iter()
            .filter_map(|rid| targets.get(rid))
            .filter(|part| present.contains(*part))
            .cloned()
            .collect();
        if !ordered.is_empty() {
            return Ok(ordered);
        }
    }

    let mut names: Vec<String> = present
        .into_iter()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    Ok(names)
}

/// `Id → part name` for every relationship in `presentation.xml.rels`.
fn relationship_targets(xml: &[u8]) -> Result<HashMap<String, String>, ExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value).into_owned();
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = Some(value),
                        b"Target" => target = Some(value),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, resolve_ppt_target(&target));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(FileFormat::Pptx, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

/// Relationship targets are relative to `ppt/` unless absolute.
fn resolve_ppt_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{}", target.trim_start_matches("./")),
    }
}

/// The `r:id` of every `p:sldId`, in list order.
fn slide_relationship_ids(xml: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut ids = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sldId" => {
                // The bare `id` attribute is a numeric slide id; the prefixed one is the relationship.
                let rel = e.attributes().flatten().find(|a| {
                    a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id"
                });
                if let Some(attr) = rel {
                    ids.push(String::from_utf8_lossy(&attr.value).into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(FileFormat::Pptx, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(ids)
}

/// Text of each text-bearing shape (`p:sp`, `p:graphicFrame`) in document order.
///
/// A shape's paragraphs are joined with `\n`; shapes without text are skipped.
fn slide_shape_texts(xml: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut shapes = Vec::new();
    let mut shape_depth = 0usize;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut paragraph: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sp" | b"graphicFrame" => shape_depth += 1,
                b"p" if shape_depth > 0 => paragraph = Some(String::new()),
                b"t" if paragraph.is_some() => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" if shape_depth > 0 => paragraphs.push(String::new()),
                b"br" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| xml_error(FileFormat::Pptx, e))?;
                if let Some(p) = paragraph.as_mut() {
                    p.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(p) = paragraph.take() {
                        paragraphs.push(p);
                    }
                }
                b"sp" | b"graphicFrame" => {
                    shape_depth = shape_depth.saturating_sub(1);
                    if shape_depth == 0 {
                        let text = paragraphs.join("\n");
                        if !text.trim().is_empty() {
                            shapes.push(text);
                        }
                        paragraphs.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(FileFormat::Pptx, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(shapes)
}
