// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end runs of the correction pipeline against scripted providers.
//!
//! Covers the fail-fast extraction stages, fail-soft per-question grading,
//! blank-answer substitution and run provenance.

mod common;

use async_trait::async_trait;
use common::{grading_reply, ScriptedProvider, ANSWER_KEY_REPLY, STUDENT_ANSWERS_REPLY};
use gradeflow_core::application::{CorrectionPipeline, GradingRun};
use gradeflow_core::domain::grading::{
    Correction, CorrectionId, Document, DocumentId, PipelineStage, Question, QuestionId,
    RunStatus, StudentAnswer,
};
use gradeflow_core::domain::repository::{GradingRepository, RepositoryError};
use gradeflow_core::infrastructure::llm::ProviderRegistry;
use gradeflow_core::infrastructure::repositories::InMemoryGradingRepository;
use std::path::Path;
use std::sync::Arc;

fn setup(
    providers: Vec<(&str, Arc<ScriptedProvider>)>,
) -> (CorrectionPipeline, InMemoryGradingRepository) {
    let registry = ProviderRegistry::new();
    for (name, provider) in providers {
        registry.register(name, provider, false).unwrap();
    }
    let repository = InMemoryGradingRepository::new();
    let pipeline = CorrectionPipeline::new(Arc::new(registry), Arc::new(repository.clone()));
    (pipeline, repository)
}

fn run() -> GradingRun {
    GradingRun {
        answer_key: "fixtures/key.pdf".into(),
        submission: "fixtures/ana.pdf".into(),
        subject: "math".into(),
        student_id: "ana-01".into(),
        student_name: "Ana".into(),
    }
}

fn document_id(value: &serde_json::Value) -> DocumentId {
    DocumentId::from_string(value["document_id"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_answer_key_in_prose_is_extracted_and_persisted() {
    let provider = ScriptedProvider::new("gpt-4o-mini")
        .reply("Here are the questions:\n```json\n{\"questoes\":[{\"numero\":1,\"enunciado\":\"2+2=?\",\"resposta_geral\":\"4\",\"pontuacao\":1.0}],\"total_questoes\":1}\n```")
        .shared();
    let (pipeline, repository) = setup(vec![("default", provider)]);

    let result = pipeline
        .extract_answer_key(Path::new("key.pdf"), "math")
        .await;

    assert!(result.success(), "{:?}", result.error());
    assert_eq!(result.stage(), PipelineStage::ExtractAnswerKey);
    let payload = result.payload().unwrap();
    assert_eq!(payload["total"], 1);

    let questions = repository
        .get_questions_for_document(document_id(payload))
        .await
        .unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].statement, "2+2=?");
    assert_eq!(questions[0].expected_answer, "4");
    assert_eq!(questions[0].max_score, 1.0);
}

#[tokio::test]
async fn test_invalid_answer_key_aborts_run() {
    let provider = ScriptedProvider::new("gpt-4o-mini")
        .reply("```json\n{\"questoes\": [{\"numero\": 1, \"enunciado\": \"2+2\n```")
        .reply(STUDENT_ANSWERS_REPLY)
        .shared();
    let (pipeline, repository) = setup(vec![("default", provider.clone())]);

    let report = pipeline.run_full_pipeline(&run()).await;

    assert_eq!(report.status, RunStatus::Aborted);
    assert!(!report.success());
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("Failed to parse"));
    assert!(report.stages.answer_key.is_none());
    assert!(report.stages.student_answers.is_none());
    assert!(report.stages.corrections.is_empty());
    assert_eq!(provider.calls(), 1);
    assert_eq!(repository.document_count(), 0);

    let history = pipeline.history();
    assert_eq!(history.len(), 1);
    assert!(!history[0].success());
    assert!(history[0].response().is_some());
}

#[tokio::test]
async fn test_failed_submission_extraction_aborts_before_grading() {
    let provider = ScriptedProvider::new("gpt-4o-mini")
        .reply(ANSWER_KEY_REPLY)
        .fail("HTTP 400 | POST https://api.example/chat | request-id: none | body: bad image")
        .shared();
    let (pipeline, _) = setup(vec![("default", provider.clone())]);

    let report = pipeline.run_full_pipeline(&run()).await;

    assert_eq!(report.status, RunStatus::Aborted);
    assert!(report.stages.answer_key.is_some());
    assert!(report.errors[0].starts_with("Student answer extraction failed"));
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_one_failed_question_does_not_stop_the_run() {
    let provider = ScriptedProvider::new("gpt-4o-mini")
        .reply(ANSWER_KEY_REPLY)
        .reply(STUDENT_ANSWERS_REPLY)
        .reply(&grading_reply(1.0, 1.0))
        .reply("I cannot grade a blank answer, sorry.")
        .reply(&grading_reply(1.5, 2.0))
        .reply("# Report for Ana\n\nSolid arithmetic.")
        .shared();
    let (pipeline, repository) = setup(vec![("default", provider.clone())]);

    let report = pipeline.run_full_pipeline(&run()).await;

    assert_eq!(report.status, RunStatus::CompletedWithErrors);
    assert_eq!(report.stages.corrections.len(), 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("Question 2:"));
    assert_eq!(report.warnings, vec!["page 2 is blurry".to_string()]);

    assert_eq!(report.summary.final_score, Some(2.5));
    assert_eq!(report.summary.max_score, Some(3.0));
    assert!(report.summary.report_document_id.is_some());
    assert_eq!(report.summary.providers_used, vec!["openai/gpt-4o-mini".to_string()]);
    let history_total: u64 = pipeline.history().iter().map(|r| r.duration_ms()).sum();
    assert_eq!(report.summary.total_duration_ms, history_total);

    let submission_id = document_id(report.stages.student_answers.as_ref().unwrap());
    let corrections = repository
        .get_corrections_for_submission(submission_id)
        .await
        .unwrap();
    let numbers: Vec<u32> = corrections.iter().map(|c| c.question_number).collect();
    assert_eq!(numbers, vec![1, 3]);
    // Item reference picks the item's expected answer
    assert_eq!(corrections[1].expected_answer, "2");
    assert_eq!(corrections[1].item_id.as_deref(), Some("a"));

    // Question 2 had no answer and was graded as blank
    let prompts = provider.prompts();
    assert!(prompts[3].starts_with("QUESTION 2:"));
    assert!(prompts[3].contains(StudentAnswer::BLANK));

    let report_doc = repository
        .find_document(report.summary.report_document_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report_doc.content.as_deref(), Some("# Report for Ana\n\nSolid arithmetic."));
    assert_eq!(report_doc.subject, "math");
}

#[tokio::test]
async fn test_stage_assignments_show_up_in_provenance() {
    let reader = ScriptedProvider::new("gpt-4o")
        .reply(ANSWER_KEY_REPLY)
        .reply(STUDENT_ANSWERS_REPLY)
        .shared();
    let grader = ScriptedProvider::new("gpt-4o-mini")
        .reply(&grading_reply(1.0, 1.0))
        .reply(&grading_reply(0.0, 1.0))
        .reply(&grading_reply(2.0, 2.0))
        .reply("# Report")
        .shared();
    let (pipeline, _) = setup(vec![("grader", grader.clone()), ("reader", reader.clone())]);
    pipeline
        .set_stage_provider(PipelineStage::ExtractAnswerKey, "reader")
        .unwrap();
    pipeline
        .set_stage_provider(PipelineStage::ExtractStudentAnswers, "reader")
        .unwrap();

    let report = pipeline.run_full_pipeline(&run()).await;

    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.errors);
    assert_eq!(
        report.summary.providers_used,
        vec!["openai/gpt-4o".to_string(), "openai/gpt-4o-mini".to_string()]
    );
    assert_eq!(reader.calls(), 2);
    assert_eq!(grader.calls(), 4);
}

#[tokio::test]
async fn test_regrading_appends_a_second_correction() {
    let provider = ScriptedProvider::new("gpt-4o-mini")
        .reply(ANSWER_KEY_REPLY)
        .reply(&grading_reply(1.0, 1.0))
        .reply(&grading_reply(0.5, 1.0))
        .shared();
    let (pipeline, repository) = setup(vec![("default", provider)]);

    let key = pipeline
        .extract_answer_key(Path::new("key.pdf"), "math")
        .await;
    let key_id = document_id(key.payload().unwrap());
    let questions = repository.get_questions_for_document(key_id).await.unwrap();
    let submission = DocumentId::new();
    let answer = StudentAnswer::blank(1);

    for _ in 0..2 {
        let result = pipeline
            .grade_question(key_id, &questions[0], &answer, submission)
            .await
            .unwrap();
        assert!(result.success(), "{:?}", result.error());
    }

    let corrections = repository
        .get_corrections_for_submission(submission)
        .await
        .unwrap();
    assert_eq!(corrections.len(), 2);
    assert_eq!(corrections[0].score, 1.0);
    assert_eq!(corrections[1].score, 0.5);
}

#[tokio::test]
async fn test_missing_default_provider_is_a_failed_stage() {
    let (pipeline, _) = setup(vec![]);

    let result = pipeline
        .extract_answer_key(Path::new("key.pdf"), "math")
        .await;

    assert!(!result.success());
    assert!(result.response().is_none());
    assert!(result.error().unwrap().contains("No default provider"));
}

/// Document store whose answer-key writes always fail
struct RejectingAnswerKeys {
    inner: InMemoryGradingRepository,
}

#[async_trait]
impl GradingRepository for RejectingAnswerKeys {
    async fn save_document(&self, document: &Document) -> Result<DocumentId, RepositoryError> {
        self.inner.save_document(document).await
    }

    async fn find_document(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError> {
        self.inner.find_document(id).await
    }

    async fn save_answer_key(
        &self,
        _document: &Document,
        _questions: &[Question],
    ) -> Result<DocumentId, RepositoryError> {
        Err(RepositoryError::Storage("disk full".to_string()))
    }

    async fn save_question(
        &self,
        question: &Question,
        document_id: DocumentId,
    ) -> Result<QuestionId, RepositoryError> {
        self.inner.save_question(question, document_id).await
    }

    async fn save_correction(&self, correction: &Correction) -> Result<CorrectionId, RepositoryError> {
        self.inner.save_correction(correction).await
    }

    async fn get_questions_for_document(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<Question>, RepositoryError> {
        self.inner.get_questions_for_document(document_id).await
    }

    async fn get_corrections_for_submission(
        &self,
        submission_id: DocumentId,
    ) -> Result<Vec<Correction>, RepositoryError> {
        self.inner.get_corrections_for_submission(submission_id).await
    }
}

#[tokio::test]
async fn test_storage_failure_leaves_no_partial_answer_key() {
    let provider = ScriptedProvider::new("gpt-4o-mini")
        .reply(ANSWER_KEY_REPLY)
        .reply(STUDENT_ANSWERS_REPLY)
        .shared();
    let registry = ProviderRegistry::new();
    registry.register("default", provider.clone(), false).unwrap();
    let inner = InMemoryGradingRepository::new();
    let pipeline = CorrectionPipeline::new(
        Arc::new(registry),
        Arc::new(RejectingAnswerKeys {
            inner: inner.clone(),
        }),
    );

    let report = pipeline.run_full_pipeline(&run()).await;

    assert_eq!(report.status, RunStatus::Aborted);
    assert!(report.errors[0].contains("disk full"));
    assert_eq!(inner.document_count(), 0);
    assert_eq!(provider.calls(), 1);

    let history = pipeline.history();
    assert!(!history[0].success());
    assert!(history[0].payload().is_none());
}

#[tokio::test]
async fn test_duplicate_question_numbers_are_rejected_before_saving() {
    let provider = ScriptedProvider::new("gpt-4o-mini")
        .reply(r#"{"questoes": [
            {"numero": 1, "enunciado": "2+2=?", "resposta_geral": "4"},
            {"numero": 1, "enunciado": "3+3=?", "resposta_geral": "6"}
        ]}"#)
        .shared();
    let (pipeline, repository) = setup(vec![("default", provider)]);

    let result = pipeline
        .extract_answer_key(Path::new("key.pdf"), "math")
        .await;

    assert!(!result.success());
    assert!(result.error().unwrap().contains("question 1 more than once"));
    assert_eq!(repository.document_count(), 0);
}
