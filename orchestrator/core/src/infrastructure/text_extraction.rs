// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Text Extraction
//!
//! Implementations of the `TextExtractor` port.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Turn documents into prompt text for vendors that cannot take
//!   the file natively
//!
//! # Available Implementations
//!
//! - **PlainTextExtractor** - UTF-8 text files (`.txt`, `.md`)
//! - **DocumentTextExtractor** - adds PDF (`pdf-extract`) and DOCX (`docx-rs`)
//!   on top of plain text. Used by the CLI.

use async_trait::async_trait;
use docx_rs::{DocumentChild, Paragraph, ParagraphChild, RunChild};
use std::path::Path;
use tracing::debug;

use crate::domain::document::TextExtractor;
use crate::domain::llm::LLMError;

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

async fn read_file(path: &Path) -> Result<Vec<u8>, LLMError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| LLMError::Document(format!("Failed to read {}: {}", path.display(), e)))
}

/// Reads UTF-8 text files (`.txt`, `.md`)
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract_text(&self, path: &Path) -> Result<String, LLMError> {
        let ext = extension(path);
        if !matches!(ext.as_str(), "txt" | "md") {
            return Err(LLMError::Document(format!(
                "No text extractor available for .{} ({})",
                ext,
                path.display()
            )));
        }

        let bytes = read_file(path).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        debug!(path = %path.display(), chars = text.len(), "Extracted document text");
        Ok(text)
    }
}

#[derive(Debug, Clone, Copy)]
enum BinaryFormat {
    Pdf,
    Docx,
}

/// PDF and DOCX text extraction, falling back to `PlainTextExtractor` for
/// everything else. Parsing runs on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct DocumentTextExtractor {
    plain: PlainTextExtractor,
}

impl DocumentTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TextExtractor for DocumentTextExtractor {
    async fn extract_text(&self, path: &Path) -> Result<String, LLMError> {
        let format = match extension(path).as_str() {
            "pdf" => BinaryFormat::Pdf,
            "docx" => BinaryFormat::Docx,
            _ => return self.plain.extract_text(path).await,
        };

        let bytes = read_file(path).await?;
        // pdf-extract can panic on malformed files; the join error catches it
        let text = tokio::task::spawn_blocking(move || match format {
            BinaryFormat::Pdf => pdf_text(&bytes),
            BinaryFormat::Docx => docx_text(&bytes),
        })
        .await
        .map_err(|e| {
            LLMError::Document(format!("Text extraction of {} aborted: {}", path.display(), e))
        })?
        .map_err(|reason| {
            LLMError::Document(format!(
                "Failed to extract text from {}: {}",
                path.display(),
                reason
            ))
        })?;

        if text.trim().is_empty() {
            return Err(LLMError::Document(format!(
                "{} has no extractable text (scanned pages need a vendor with native document support)",
                path.display()
            )));
        }
        debug!(path = %path.display(), format = ?format, chars = text.len(), "Extracted document text");
        Ok(text)
    }
}

fn pdf_text(bytes: &[u8]) -> Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())
}

/// Body paragraphs in document order, one per line
fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| e.to_string())?;
    let lines: Vec<String> = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            DocumentChild::Paragraph(paragraph) => Some(paragraph_text(paragraph)),
            _ => None,
        })
        .collect();
    Ok(lines.join("\n"))
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    paragraph
        .children
        .iter()
        .filter_map(|child| match child {
            ParagraphChild::Run(run) => Some(run),
            _ => None,
        })
        .flat_map(|run| run.children.iter())
        .filter_map(|child| match child {
            RunChild::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect()
}
