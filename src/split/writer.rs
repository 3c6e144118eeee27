//! Page-subset PDF writing with lopdf.

use std::collections::BTreeSet;
use std::path::Path;

use lopdf::Document;
use thiserror::Error;

/// Errors that can occur while reading or writing PDF pages.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("Failed to load PDF: {0}")]
    Load(String),

    #[error("Failed to save PDF {path}: {message}")]
    Save { path: String, message: String },

    #[error("Page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: u32 },

    #[error("No pages selected")]
    NoPages,
}

/// A loaded source document that page subsets are cut from.
#[derive(Debug, Clone)]
pub struct PdfSource {
    document: Document,
    page_count: u32,
}

impl PdfSource {
    pub fn open(path: &Path) -> Result<Self, PdfError> {
        let document = Document::load(path).map_err(|e| PdfError::Load(e.to_string()))?;
        let page_count = document.get_pages().len() as u32;
        Ok(Self {
            document,
            page_count,
        })
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Write the given 1-based pages, in document order, to `dest`.
    pub fn write_pages(&self, pages: &[u32], dest: &Path) -> Result<(), PdfError> {
        if pages.is_empty() {
            return Err(PdfError::NoPages);
        }
        let keep: BTreeSet<u32> = pages.iter().copied().collect();
        if let Some(&page) = keep.iter().find(|&&p| p == 0 || p > self.page_count) {
            return Err(PdfError::PageOutOfRange {
                page,
                count: self.page_count,
            });
        }

        let mut subset = self.document.clone();
        let drop: Vec<u32> = (1..=self.page_count).filter(|p| !keep.contains(p)).collect();
        if !drop.is_empty() {
            subset.delete_pages(&drop);
            subset.prune_objects();
            subset.renumber_objects();
        }
        subset.compress();
        subset.save(dest).map_err(|e| PdfError::Save {
            path: dest.display().to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!("Wrote {} pages to {}", keep.len(), dest.display());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a PDF with one page per entry, each showing its text near the top.
    pub fn build_pdf(page_texts: &[&str]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in page_texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 760.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let encoded = content.encode().unwrap_or_default();
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::build_pdf;
    use super::*;
    use tempfile::TempDir;

    fn source(dir: &TempDir, pages: &[&str]) -> PdfSource {
        let path = dir.path().join("source.pdf");
        build_pdf(pages).save(&path).unwrap();
        PdfSource::open(&path).unwrap()
    }

    #[test]
    fn test_write_subset() {
        let dir = TempDir::new().unwrap();
        let src = source(&dir, &["one", "two", "three", "four"]);
        assert_eq!(src.page_count(), 4);

        let dest = dir.path().join("subset.pdf");
        src.write_pages(&[4, 2], &dest).unwrap();

        let written = Document::load(&dest).unwrap();
        assert_eq!(written.get_pages().len(), 2);
    }

    #[test]
    fn test_write_all_pages() {
        let dir = TempDir::new().unwrap();
        let src = source(&dir, &["one", "two"]);
        let dest = dir.path().join("all.pdf");
        src.write_pages(&[1, 2], &dest).unwrap();
        assert_eq!(Document::load(&dest).unwrap().get_pages().len(), 2);
    }

    #[test]
    fn test_rejects_bad_page_lists() {
        let dir = TempDir::new().unwrap();
        let src = source(&dir, &["one"]);
        let dest = dir.path().join("bad.pdf");

        assert!(matches!(src.write_pages(&[], &dest), Err(PdfError::NoPages)));
        assert!(matches!(
            src.write_pages(&[2], &dest),
            Err(PdfError::PageOutOfRange { page: 2, count: 1 })
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = PdfSource::open(&dir.path().join("missing.pdf"));
        assert!(matches!(result, Err(PdfError::Load(_))));
    }
}
