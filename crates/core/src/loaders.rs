use crate::chunking::normalize_whitespace;
use crate::error::IngestError;
use crate::models::Document;
use regex::Regex;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

/// One loader per supported format: extracts text and per-unit provenance.
/// May fail on malformed input; the ingestion pipeline treats that as a
/// per-file skip, never as a run failure.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<Document>, IngestError>;
}

/// Selects a loader by file extension, case-insensitive. Unsupported
/// extensions yield `None`; the caller decides to warn and move on.
pub fn loader_for_extension(extension: &str) -> Option<&'static dyn DocumentLoader> {
    static TEXT: TextLoader = TextLoader;
    static PDF: PdfLoader = PdfLoader;
    static DOCX: DocxLoader = DocxLoader;

    match extension.to_ascii_lowercase().as_str() {
        "txt" | "md" => Some(&TEXT),
        "pdf" => Some(&PDF),
        "docx" | "doc" => Some(&DOCX),
        _ => None,
    }
}

/// Plain text and Markdown files, read whole.
#[derive(Default)]
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> Result<Vec<Document>, IngestError> {
        let text = fs::read_to_string(path)?;
        Ok(vec![Document::new(text, path.to_string_lossy())])
    }
}

/// PDF files via lopdf, one document per non-empty page so retrieval stays
/// traceable to a page.
#[derive(Default)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<Document>, IngestError> {
        let pdf = lopdf::Document::load(path)
            .map_err(|error| IngestError::Parse(error.to_string()))?;

        let mut documents = Vec::new();
        for (page_no, _page_id) in pdf.get_pages() {
            let text = pdf
                .extract_text(&[page_no])
                .map_err(|error| IngestError::Parse(error.to_string()))?;

            if text.trim().is_empty() {
                continue;
            }

            let mut document = Document::new(normalize_whitespace(&text), path.to_string_lossy());
            document
                .metadata
                .insert("page".to_string(), page_no.to_string());
            documents.push(document);
        }

        Ok(documents)
    }
}

/// Word documents: the docx container is a zip archive whose main body lives
/// in `word/document.xml`. Paragraph closes become newlines, remaining markup
/// is stripped.
#[derive(Default)]
pub struct DocxLoader;

impl DocumentLoader for DocxLoader {
    fn load(&self, path: &Path) -> Result<Vec<Document>, IngestError> {
        let file = File::open(path)?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|error| IngestError::Parse(error.to_string()))?;

        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|error| IngestError::Parse(error.to_string()))?
            .read_to_string(&mut xml)?;

        let text = strip_xml_markup(&xml)?;
        Ok(vec![Document::new(text, path.to_string_lossy())])
    }
}

fn strip_xml_markup(xml: &str) -> Result<String, IngestError> {
    let tag_re = Regex::new(r"<[^>]+>")?;
    let with_breaks = xml.replace("</w:p>", "\n");
    let stripped = tag_re.replace_all(&with_breaks, "");

    // Decode &amp; last so already-decoded ampersands are not re-expanded.
    let decoded = stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    Ok(decoded.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::META_SOURCE;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn dispatch_is_case_insensitive() {
        assert!(loader_for_extension("TXT").is_some());
        assert!(loader_for_extension("Md").is_some());
        assert!(loader_for_extension("PDF").is_some());
        assert!(loader_for_extension("DocX").is_some());
        assert!(loader_for_extension("xyz").is_none());
    }

    #[test]
    fn text_loader_stamps_source_metadata() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, "remote work policy")?;

        let documents = TextLoader.load(&path)?;

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].text, "remote work policy");
        assert_eq!(
            documents[0].metadata.get(META_SOURCE),
            Some(&path.to_string_lossy().to_string())
        );
        Ok(())
    }

    #[test]
    fn docx_loader_extracts_paragraph_text() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("handbook.docx");

        let file = File::create(&path)?;
        let mut writer = zip::ZipWriter::new(file);
        writer.start_file("word/document.xml", zip::write::FileOptions::default())?;
        writer.write_all(
            b"<w:document><w:body>\
              <w:p><w:r><w:t>Vacation days &amp; leave</w:t></w:r></w:p>\
              <w:p><w:r><w:t>Twenty per year</w:t></w:r></w:p>\
              </w:body></w:document>",
        )?;
        writer.finish()?;

        let documents = DocxLoader.load(&path)?;

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].text, "Vacation days & leave\nTwenty per year");
        Ok(())
    }

    #[test]
    fn corrupt_docx_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.docx");
        fs::write(&path, b"not a zip archive")?;

        assert!(matches!(
            DocxLoader.load(&path),
            Err(IngestError::Parse(_))
        ));
        Ok(())
    }
}
