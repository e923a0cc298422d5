use crate::error::RagError;
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

impl PageText {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub trait PdfExtractor: Send + Sync {
    /// Returns every page in document order. Pages without extractable text
    /// are returned with empty text rather than treated as failures.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, RagError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, RagError> {
        let document = Document::load(path).map_err(|error| RagError::Extraction {
            source_id: path.display().to_string(),
            details: error.to_string(),
        })?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        page = page_no,
                        error = %error,
                        "page has no extractable text"
                    );
                    String::new()
                }
            };

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        debug!(path = %path.display(), pages = pages.len(), "pdf pages extracted");
        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, RagError> {
    LopdfExtractor.extract_pages(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn corrupt_pdf_is_an_extraction_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        match extract_page_texts(&path) {
            Err(RagError::Extraction { source_id, .. }) => {
                assert!(source_id.ends_with("broken.pdf"));
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn missing_file_is_an_extraction_error() {
        let result = extract_page_texts(Path::new("/definitely/not/here.pdf"));
        assert!(matches!(result, Err(RagError::Extraction { .. })));
    }

    #[test]
    fn blank_pages_are_detected() {
        let page = PageText {
            number: 2,
            text: " \n\t".to_string(),
        };
        assert!(page.is_blank());
    }
}
