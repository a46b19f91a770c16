// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contract for the grading aggregates. The interface is defined
//! in the domain layer and implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregates | Implementations |
//! |-------|-----------|----------------|
//! | `GradingRepository` | `Document`, `Question`, `Correction` | `InMemoryGradingRepository` |
//!
//! The document store behind this port owns its own write safety; the
//! pipeline never holds a lock across a call into it.

use async_trait::async_trait;

use crate::domain::grading::{
    Correction, CorrectionId, Document, DocumentId, Question, QuestionId,
};

/// Repository interface for grading records
#[async_trait]
pub trait GradingRepository: Send + Sync {
    /// Store a source or generated document
    async fn save_document(&self, document: &Document) -> Result<DocumentId, RepositoryError>;

    async fn find_document(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError>;

    /// Store an answer-key document together with all of its questions.
    /// Either everything is stored or nothing is.
    async fn save_answer_key(
        &self,
        document: &Document,
        questions: &[Question],
    ) -> Result<DocumentId, RepositoryError>;

    /// Store a question extracted from an answer-key document
    async fn save_question(
        &self,
        question: &Question,
        document_id: DocumentId,
    ) -> Result<QuestionId, RepositoryError>;

    /// Append a correction. Repeated calls for the same question add records.
    async fn save_correction(&self, correction: &Correction) -> Result<CorrectionId, RepositoryError>;

    /// Questions of an answer key, ordered by question number
    async fn get_questions_for_document(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<Question>, RepositoryError>;

    /// Corrections of a student submission, in insertion order
    async fn get_corrections_for_submission(
        &self,
        submission_id: DocumentId,
    ) -> Result<Vec<Correction>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Storage(err.to_string())
    }
}
