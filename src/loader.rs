//! PDF loading.
//!
//! Turns an uploaded PDF into one [`LoadedPage`] per page. Every page from
//! a single load shares the same metadata, including one `uploaded_at`
//! timestamp taken when the load starts.
//!
//! Text extraction uses `pdf-extract`, which is CPU-bound and may panic on
//! malformed input, so it runs on the blocking pool and a panic surfaces as
//! [`RagError::Load`].

use std::path::Path;

use chrono::Utc;

use policy_assistant_core::error::{RagError, RagResult};
use policy_assistant_core::models::{ChunkMetadata, LoadedPage};

/// Returns `true` when `name` has a `.pdf` extension (case-insensitive).
pub fn is_pdf_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Load a PDF from disk. `filename` is the declared document name stamped
/// into metadata, independent of where the bytes live.
pub async fn load_pdf(path: &Path, filename: &str, policy_type: &str) -> RagResult<Vec<LoadedPage>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| RagError::Load(format!("cannot read {}: {}", path.display(), e)))?;
    load_pdf_bytes(bytes, filename, policy_type).await
}

/// Load a PDF held in memory.
pub async fn load_pdf_bytes(
    bytes: Vec<u8>,
    filename: &str,
    policy_type: &str,
) -> RagResult<Vec<LoadedPage>> {
    let metadata = ChunkMetadata::new(filename, policy_type, Utc::now());

    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| RagError::Load(format!("{}: PDF extraction aborted: {}", filename, e)))?
    .map_err(|e| RagError::Load(format!("{}: {}", filename, e)))?;

    if pages.is_empty() {
        return Err(RagError::Load(format!("{}: document has no pages", filename)));
    }

    tracing::debug!(filename, pages = pages.len(), "loaded PDF");

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(page, text)| LoadedPage {
            page,
            text,
            metadata: metadata.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_pdf_name() {
        assert!(is_pdf_name("leave.pdf"));
        assert!(is_pdf_name("Leave Policy.PDF"));
        assert!(!is_pdf_name("leave.docx"));
        assert!(!is_pdf_name("pdf"));
        assert!(!is_pdf_name("leave.pdf.txt"));
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_load_error() {
        let err = load_pdf_bytes(b"not a pdf at all".to_vec(), "bad.pdf", "HR")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Load(_)));
        assert_eq!(err.stage(), "load");
    }

    #[tokio::test]
    async fn test_missing_file_is_load_error() {
        let err = load_pdf(Path::new("/nonexistent/leave.pdf"), "leave.pdf", "HR")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Load(_)));
    }
}
