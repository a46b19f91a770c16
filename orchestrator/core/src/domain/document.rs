// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Document format classification and the text-extraction port used by
//! `LLMProvider::analyze_document`.

use async_trait::async_trait;
use std::path::Path;

use crate::domain::llm::LLMError;

/// How an adapter should ship a file to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Inlined as base64 image part
    Image { mime_type: &'static str },
    /// Native document part where supported, text extraction otherwise
    Pdf,
    /// Always converted to text by the extraction collaborator
    Text,
}

impl DocumentFormat {
    pub const PDF_MIME: &'static str = "application/pdf";

    /// Classify by file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Result<Self, LLMError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "png" => Ok(Self::Image { mime_type: "image/png" }),
            "jpg" | "jpeg" => Ok(Self::Image { mime_type: "image/jpeg" }),
            "gif" => Ok(Self::Image { mime_type: "image/gif" }),
            "webp" => Ok(Self::Image { mime_type: "image/webp" }),
            "pdf" => Ok(Self::Pdf),
            "txt" | "md" | "docx" => Ok(Self::Text),
            "" => Err(LLMError::UnsupportedFormat(format!(
                "{} has no file extension",
                path.display()
            ))),
            other => Err(LLMError::UnsupportedFormat(format!(".{}", other))),
        }
    }
}

/// Plain-text extraction collaborator for formats a vendor cannot take natively
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, path: &Path) -> Result<String, LLMError>;
}

/// Prompt segment used when a document is embedded as text
pub fn embed_document_text(instruction: &str, text: &str) -> String {
    format!("{}\n\n---\nDocument content:\n{}", instruction, text)
}
