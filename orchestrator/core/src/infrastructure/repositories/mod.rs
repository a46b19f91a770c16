// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the persistence port defined in the
//! domain layer, following the Repository pattern from DDD.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve grading records
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **InMemoryGradingRepository** - Thread-safe, ephemeral storage used by the
//!   CLI and tests. Production document stores implement `GradingRepository`
//!   outside this crate.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::grading::{
    Correction, CorrectionId, Document, DocumentId, Question, QuestionId,
};
use crate::domain::repository::{GradingRepository, RepositoryError};

#[derive(Default)]
struct GradingTables {
    documents: HashMap<DocumentId, Document>,
    /// answer-key document -> questions
    questions: HashMap<DocumentId, Vec<Question>>,
    /// Append-only; order is insertion order
    corrections: Vec<Correction>,
}

#[derive(Clone, Default)]
pub struct InMemoryGradingRepository {
    tables: Arc<RwLock<GradingTables>>,
}

impl InMemoryGradingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_count(&self) -> usize {
        self.tables.read().documents.len()
    }

    pub fn correction_count(&self) -> usize {
        self.tables.read().corrections.len()
    }
}

#[async_trait]
impl GradingRepository for InMemoryGradingRepository {
    async fn save_document(&self, document: &Document) -> Result<DocumentId, RepositoryError> {
        let mut tables = self.tables.write();
        tables.documents.insert(document.id, document.clone());
        Ok(document.id)
    }

    async fn find_document(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError> {
        Ok(self.tables.read().documents.get(&id).cloned())
    }

    async fn save_answer_key(
        &self,
        document: &Document,
        questions: &[Question],
    ) -> Result<DocumentId, RepositoryError> {
        let mut tables = self.tables.write();
        tables.documents.insert(document.id, document.clone());
        tables.questions.insert(document.id, questions.to_vec());
        Ok(document.id)
    }

    async fn save_question(
        &self,
        question: &Question,
        document_id: DocumentId,
    ) -> Result<QuestionId, RepositoryError> {
        let mut tables = self.tables.write();
        if !tables.documents.contains_key(&document_id) {
            return Err(RepositoryError::NotFound(format!("document {}", document_id)));
        }
        let questions = tables.questions.entry(document_id).or_default();
        match questions.iter_mut().find(|q| q.id == question.id) {
            Some(existing) => *existing = question.clone(),
            None => questions.push(question.clone()),
        }
        Ok(question.id)
    }

    async fn save_correction(&self, correction: &Correction) -> Result<CorrectionId, RepositoryError> {
        let mut tables = self.tables.write();
        tables.corrections.push(correction.clone());
        Ok(correction.id)
    }

    async fn get_questions_for_document(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<Question>, RepositoryError> {
        let mut questions = self
            .tables
            .read()
            .questions
            .get(&document_id)
            .cloned()
            .unwrap_or_default();
        questions.sort_by_key(|q| q.number);
        Ok(questions)
    }

    async fn get_corrections_for_submission(
        &self,
        submission_id: DocumentId,
    ) -> Result<Vec<Correction>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .corrections
            .iter()
            .filter(|c| c.submission_id == submission_id)
            .cloned()
            .collect())
    }
}
