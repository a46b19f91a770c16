// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Correction Pipeline
//!
//! Sequences the grading stages of one exam:
//! extract answer key → extract student answers → grade each question →
//! synthesize report.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Stage orchestration with per-stage provider resolution
//! - **Integration:** `ProviderRegistry` → `LLMProvider` → response interpreter
//!   → `GradingRepository`
//!
//! # Failure semantics
//!
//! Stage failures are returned as data (`PipelineStageResult::failed`), never
//! as `Err`. `run_full_pipeline` aborts when either extraction stage fails and
//! keeps going when a single question cannot be graded. `PipelineError` is
//! reserved for caller mistakes such as grading against an answer key that
//! was never extracted.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::application::response_interpreter::{extract_json_object, ResponseParseError};
use crate::application::stage_outputs::{
    AnswerKeyOutput, GradingOutput, StudentAnswersOutput, DEFAULT_CONFIDENCE,
};
use crate::domain::grading::{
    Correction, CorrectionId, Document, DocumentId, DocumentKind, PipelineReport, PipelineStage,
    PipelineStageResult, Question, RunStatus, RunSummary, StageOutputs, StudentAnswer,
};
use crate::domain::llm::{CompletionRequest, CompletionResponse, LLMError, LLMProvider};
use crate::domain::repository::{GradingRepository, RepositoryError};
use crate::infrastructure::llm::{ProviderRegistry, RegistryError};
use crate::infrastructure::prompt_templates::{
    GradingPromptContext, ReportPromptContext, StagePrompts, GRADING_SYSTEM_PROMPT,
    REPORT_SYSTEM_PROMPT,
};

/// Feedback characters kept per question in the report prompt
const REPORT_FEEDBACK_CHARS: usize = 200;
/// Errors listed per question in the report prompt
const REPORT_ERRORS_PER_QUESTION: usize = 3;

/// Caller mistakes. Everything else is reported inside a stage result.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Question {question_number} is not part of answer key {answer_key_id}; extract the answer key first")]
    AnswerKeyNotExtracted {
        answer_key_id: DocumentId,
        question_number: u32,
    },

    #[error("Cannot assign stage {stage}: provider '{name}' is not registered")]
    UnknownProvider { stage: PipelineStage, name: String },
}

#[derive(Debug, thiserror::Error)]
enum StageError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Llm(#[from] LLMError),

    #[error(transparent)]
    Parse(#[from] ResponseParseError),

    #[error("Model output does not match the {stage} schema: {source}")]
    Schema {
        stage: PipelineStage,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Prompt rendering failed: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

type StageOutcome<T> = Result<(Value, T), StageError>;

/// Inputs of a full run
#[derive(Debug, Clone)]
pub struct GradingRun {
    pub answer_key: PathBuf,
    pub submission: PathBuf,
    pub subject: String,
    pub student_id: String,
    pub student_name: String,
}

struct ExtractedAnswerKey {
    document_id: DocumentId,
    questions: Vec<Question>,
}

struct ExtractedSubmission {
    document_id: DocumentId,
    answers: Vec<StudentAnswer>,
    problems: Vec<String>,
}

struct SynthesizedReport {
    document_id: DocumentId,
    final_score: f64,
    max_score: f64,
}

pub struct CorrectionPipeline {
    registry: Arc<ProviderRegistry>,
    repository: Arc<dyn GradingRepository>,
    prompts: StagePrompts,
    stage_providers: RwLock<HashMap<PipelineStage, String>>,
    history: Mutex<Vec<PipelineStageResult>>,
}

impl CorrectionPipeline {
    pub fn new(registry: Arc<ProviderRegistry>, repository: Arc<dyn GradingRepository>) -> Self {
        Self {
            registry,
            repository,
            prompts: StagePrompts::new(),
            stage_providers: RwLock::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Apply a stage → provider map, e.g. from `PipelineSettings`
    pub fn with_stage_providers(
        self,
        assignments: &HashMap<PipelineStage, String>,
    ) -> Result<Self, PipelineError> {
        for (stage, name) in assignments {
            self.set_stage_provider(*stage, name)?;
        }
        Ok(self)
    }

    /// Route `stage` to a registered provider
    pub fn set_stage_provider(&self, stage: PipelineStage, name: &str) -> Result<(), PipelineError> {
        if !self.registry.contains(name) {
            return Err(PipelineError::UnknownProvider {
                stage,
                name: name.to_string(),
            });
        }
        info!(stage = %stage, provider = name, "Stage provider assigned");
        self.stage_providers.write().insert(stage, name.to_string());
        Ok(())
    }

    /// Send `stage` back to the registry default
    pub fn clear_stage_provider(&self, stage: PipelineStage) -> Option<String> {
        self.stage_providers.write().remove(&stage)
    }

    pub fn stage_provider(&self, stage: PipelineStage) -> Option<String> {
        self.stage_providers.read().get(&stage).cloned()
    }

    /// Every stage result produced by this pipeline, oldest first
    pub fn history(&self) -> Vec<PipelineStageResult> {
        self.history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    fn provider_for(&self, stage: PipelineStage) -> Result<Arc<dyn LLMProvider>, RegistryError> {
        let assigned = self.stage_providers.read().get(&stage).cloned();
        self.registry.get(assigned.as_deref())
    }

    fn finish<T>(
        &self,
        stage: PipelineStage,
        started: Instant,
        outcome: StageOutcome<T>,
        response: Option<CompletionResponse>,
    ) -> (PipelineStageResult, Option<T>) {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let provenance = response.as_ref().map(CompletionResponse::provenance);

        let (result, typed) = match outcome {
            Ok((payload, typed)) => {
                info!(
                    stage = %stage,
                    provider = ?provenance,
                    duration_ms,
                    "Pipeline stage completed"
                );
                (
                    PipelineStageResult::succeeded(stage, payload, response, duration_ms),
                    Some(typed),
                )
            }
            Err(e) => {
                warn!(
                    stage = %stage,
                    provider = ?provenance,
                    duration_ms,
                    error = %e,
                    "Pipeline stage failed"
                );
                (
                    PipelineStageResult::failed(stage, e.to_string(), response, duration_ms),
                    None,
                )
            }
        };

        self.history.lock().push(result.clone());
        (result, typed)
    }

    // ---------------------------------------------------------------------
    // Extract answer key
    // ---------------------------------------------------------------------

    /// Extract every question of an answer key and persist them
    pub async fn extract_answer_key(&self, path: &Path, subject: &str) -> PipelineStageResult {
        self.answer_key_stage(path, subject).await.0
    }

    async fn answer_key_stage(
        &self,
        path: &Path,
        subject: &str,
    ) -> (PipelineStageResult, Option<ExtractedAnswerKey>) {
        let started = Instant::now();
        let mut response = None;
        let outcome = self.try_extract_answer_key(path, subject, &mut response).await;
        self.finish(PipelineStage::ExtractAnswerKey, started, outcome, response)
    }

    async fn try_extract_answer_key(
        &self,
        path: &Path,
        subject: &str,
        response: &mut Option<CompletionResponse>,
    ) -> StageOutcome<ExtractedAnswerKey> {
        let stage = PipelineStage::ExtractAnswerKey;
        let provider = self.provider_for(stage)?;
        let instruction = self.prompts.answer_key_instruction(subject)?;

        debug!(stage = %stage, provider = %provider.identifier(), file = %path.display(), "Analyzing answer key");
        let content = response
            .insert(provider.analyze_document(path, &instruction).await?)
            .content
            .clone();

        let object = extract_json_object(&content)?;
        let AnswerKeyOutput {
            questoes,
            total_questoes,
            pontuacao_total,
            observacoes,
        } = decode(stage, &object)?;
        let questions: Vec<Question> = questoes.into_iter().map(|q| q.into_question()).collect();
        check_question_numbers(&questions)?;

        let document = Document::new(
            path.display().to_string(),
            DocumentKind::AnswerKey,
            subject,
            provider.identifier(),
        )
        .with_metadata(json!({
            "total_questoes": total_questoes.unwrap_or(questions.len() as u32),
            "pontuacao_total": pontuacao_total,
            "observacoes": observacoes,
        }));
        let document_id = self.repository.save_answer_key(&document, &questions).await?;

        let payload = json!({
            "document_id": document_id,
            "subject": subject,
            "total": questions.len(),
            "total_score": questions.iter().map(|q| q.max_score).sum::<f64>(),
            "questions": questions,
        });
        Ok((
            payload,
            ExtractedAnswerKey {
                document_id,
                questions,
            },
        ))
    }

    // ---------------------------------------------------------------------
    // Extract student answers
    // ---------------------------------------------------------------------

    /// Extract what the student answered and persist the submission
    pub async fn extract_student_answers(
        &self,
        path: &Path,
        subject: &str,
        student_id: &str,
    ) -> PipelineStageResult {
        self.student_answers_stage(path, subject, student_id).await.0
    }

    async fn student_answers_stage(
        &self,
        path: &Path,
        subject: &str,
        student_id: &str,
    ) -> (PipelineStageResult, Option<ExtractedSubmission>) {
        let started = Instant::now();
        let mut response = None;
        let outcome = self
            .try_extract_student_answers(path, subject, student_id, &mut response)
            .await;
        self.finish(PipelineStage::ExtractStudentAnswers, started, outcome, response)
    }

    async fn try_extract_student_answers(
        &self,
        path: &Path,
        subject: &str,
        student_id: &str,
        response: &mut Option<CompletionResponse>,
    ) -> StageOutcome<ExtractedSubmission> {
        let stage = PipelineStage::ExtractStudentAnswers;
        let provider = self.provider_for(stage)?;
        let instruction = self.prompts.student_answers_instruction(subject, student_id)?;

        debug!(stage = %stage, provider = %provider.identifier(), file = %path.display(), "Analyzing submission");
        let content = response
            .insert(provider.analyze_document(path, &instruction).await?)
            .content
            .clone();

        let object = extract_json_object(&content)?;
        let StudentAnswersOutput {
            respostas,
            questoes_em_branco,
            problemas_identificados,
            legibilidade,
        } = decode(stage, &object)?;

        let document = Document::new(
            path.display().to_string(),
            DocumentKind::StudentSubmission,
            subject,
            provider.identifier(),
        )
        .with_metadata(json!({
            "student_id": student_id,
            "respostas": respostas,
            "questoes_em_branco": questoes_em_branco,
            "problemas_identificados": problemas_identificados,
            "legibilidade": legibilidade,
        }));
        let document_id = self.repository.save_document(&document).await?;

        let payload = json!({
            "document_id": document_id,
            "student_id": student_id,
            "total": respostas.len(),
            "answers": respostas,
            "blank_questions": questoes_em_branco,
            "problems": problemas_identificados,
            "legibility": legibilidade,
        });
        Ok((
            payload,
            ExtractedSubmission {
                document_id,
                answers: respostas,
                problems: problemas_identificados,
            },
        ))
    }

    // ---------------------------------------------------------------------
    // Grade question
    // ---------------------------------------------------------------------

    /// Grade one answer against a question of an extracted answer key.
    ///
    /// Every call appends a new correction, even for a question that was
    /// already graded.
    pub async fn grade_question(
        &self,
        answer_key_id: DocumentId,
        question: &Question,
        answer: &StudentAnswer,
        submission_id: DocumentId,
    ) -> Result<PipelineStageResult, PipelineError> {
        let stored = match self.repository.get_questions_for_document(answer_key_id).await {
            Ok(stored) => stored,
            Err(e) => {
                let outcome: StageOutcome<Correction> = Err(e.into());
                return Ok(self
                    .finish(PipelineStage::GradeQuestion, Instant::now(), outcome, None)
                    .0);
            }
        };
        if !stored.iter().any(|q| q.id == question.id) {
            return Err(PipelineError::AnswerKeyNotExtracted {
                answer_key_id,
                question_number: question.number,
            });
        }

        Ok(self.grading_stage(question, answer, submission_id).await.0)
    }

    async fn grading_stage(
        &self,
        question: &Question,
        answer: &StudentAnswer,
        submission_id: DocumentId,
    ) -> (PipelineStageResult, Option<Correction>) {
        let started = Instant::now();
        let mut response = None;
        let outcome = self
            .try_grade_question(question, answer, submission_id, &mut response)
            .await;
        self.finish(PipelineStage::GradeQuestion, started, outcome, response)
    }

    async fn try_grade_question(
        &self,
        question: &Question,
        answer: &StudentAnswer,
        submission_id: DocumentId,
        response: &mut Option<CompletionResponse>,
    ) -> StageOutcome<Correction> {
        let stage = PipelineStage::GradeQuestion;
        let provider = self.provider_for(stage)?;
        let expected_answer = question
            .expected_answer_for(answer.item_ref.as_deref())
            .to_string();

        let prompt = self.prompts.grading_prompt(&GradingPromptContext {
            question_number: question.number,
            statement: question.statement.clone(),
            expected_answer: expected_answer.clone(),
            student_answer: answer.answer.clone(),
            notes: answer.notes.clone(),
            max_score: question.max_score,
        })?;
        let request = CompletionRequest::new(prompt).with_system_prompt(GRADING_SYSTEM_PROMPT);

        debug!(stage = %stage, provider = %provider.identifier(), question = question.number, "Grading question");
        let content = response
            .insert(provider.complete(&request).await?)
            .content
            .clone();

        let object = extract_json_object(&content)?;
        let output: GradingOutput = decode(stage, &object)?;

        let correction = Correction {
            id: CorrectionId::new(),
            submission_id,
            question_id: question.id,
            question_number: question.number,
            item_id: answer.item_ref.clone(),
            student_answer: answer.answer.clone(),
            expected_answer,
            score: output.nota,
            max_score: output.nota_maxima.unwrap_or(question.max_score),
            feedback: output.feedback,
            errors: output
                .erros
                .iter()
                .map(|e| e.description().to_string())
                .collect(),
            demonstrated_skills: output.habilidades_demonstradas,
            missing_skills: output.habilidades_faltantes,
            graded_by: provider.identifier(),
            confidence: output.confianca.unwrap_or(DEFAULT_CONFIDENCE),
            timestamp: Utc::now(),
            metadata: json!({
                "acertos": output.acertos,
                "erros_detalhados": output.erros,
            }),
        };
        self.repository.save_correction(&correction).await?;

        let payload = serde_json::to_value(&correction)?;
        Ok((payload, correction))
    }

    // ---------------------------------------------------------------------
    // Synthesize report
    // ---------------------------------------------------------------------

    /// Aggregate the corrections of a submission into a Markdown report
    pub async fn synthesize_report(
        &self,
        submission_id: DocumentId,
        student_name: &str,
    ) -> PipelineStageResult {
        self.report_stage(submission_id, student_name).await.0
    }

    async fn report_stage(
        &self,
        submission_id: DocumentId,
        student_name: &str,
    ) -> (PipelineStageResult, Option<SynthesizedReport>) {
        let started = Instant::now();
        let mut response = None;
        let outcome = self
            .try_synthesize_report(submission_id, student_name, &mut response)
            .await;
        self.finish(PipelineStage::SynthesizeReport, started, outcome, response)
    }

    async fn try_synthesize_report(
        &self,
        submission_id: DocumentId,
        student_name: &str,
        response: &mut Option<CompletionResponse>,
    ) -> StageOutcome<SynthesizedReport> {
        let stage = PipelineStage::SynthesizeReport;
        let corrections = self
            .repository
            .get_corrections_for_submission(submission_id)
            .await?;
        if corrections.is_empty() {
            return Err(StageError::Invalid(format!(
                "No corrections found for submission {}",
                submission_id
            )));
        }

        let final_score: f64 = corrections.iter().map(|c| c.score).sum();
        let max_score: f64 = corrections.iter().map(|c| c.max_score).sum();
        let percentage = if max_score > 0.0 {
            final_score / max_score * 100.0
        } else {
            0.0
        };

        let summary: Vec<Value> = corrections
            .iter()
            .map(|c| {
                json!({
                    "question": c.question_number,
                    "score": format!("{}/{}", c.score, c.max_score),
                    "feedback": c.feedback.chars().take(REPORT_FEEDBACK_CHARS).collect::<String>(),
                    "errors": c.errors.iter().take(REPORT_ERRORS_PER_QUESTION).collect::<Vec<_>>(),
                })
            })
            .collect();

        let provider = self.provider_for(stage)?;
        let prompt = self.prompts.report_prompt(&ReportPromptContext {
            student_name: student_name.to_string(),
            submission_id: submission_id.to_string(),
            final_score,
            max_score,
            percentage: format!("{:.1}", percentage),
            graded_count: corrections.len(),
            demonstrated_skills: unique(corrections.iter().flat_map(|c| &c.demonstrated_skills))
                .join(", "),
            missing_skills: unique(corrections.iter().flat_map(|c| &c.missing_skills)).join(", "),
            question_summary: serde_json::to_string_pretty(&summary)?,
        })?;
        let request = CompletionRequest::new(prompt).with_system_prompt(REPORT_SYSTEM_PROMPT);

        debug!(stage = %stage, provider = %provider.identifier(), corrections = corrections.len(), "Writing report");
        let markdown = response
            .insert(provider.complete(&request).await?)
            .content
            .clone();
        if markdown.trim().is_empty() {
            return Err(StageError::Invalid("Model returned an empty report".to_string()));
        }

        let subject = self
            .repository
            .find_document(submission_id)
            .await?
            .map(|d| d.subject)
            .unwrap_or_default();
        let document = Document::new(
            format!("report_{}.md", submission_id),
            DocumentKind::Report,
            subject,
            provider.identifier(),
        )
        .with_content(markdown.clone())
        .with_metadata(json!({
            "submission_id": submission_id,
            "student_name": student_name,
            "final_score": final_score,
            "max_score": max_score,
            "percentage": round_one(percentage),
        }));
        let document_id = self.repository.save_document(&document).await?;

        let payload = json!({
            "document_id": document_id,
            "final_score": final_score,
            "max_score": max_score,
            "percentage": round_one(percentage),
            "graded_count": corrections.len(),
            "content": markdown,
        });
        Ok((
            payload,
            SynthesizedReport {
                document_id,
                final_score,
                max_score,
            },
        ))
    }

    // ---------------------------------------------------------------------
    // Full run
    // ---------------------------------------------------------------------

    /// Run every stage for one student.
    ///
    /// Aborts when either extraction fails. A question that cannot be graded
    /// is recorded as an error and the run moves on.
    pub async fn run_full_pipeline(&self, run: &GradingRun) -> PipelineReport {
        info!(
            subject = %run.subject,
            student_id = %run.student_id,
            "Starting correction pipeline"
        );
        let mut tracker = RunTracker::default();

        let (key_result, answer_key) = self.answer_key_stage(&run.answer_key, &run.subject).await;
        tracker.record(&key_result);
        tracker.stages.answer_key = key_result.payload().cloned();
        let Some(answer_key) = answer_key else {
            tracker.abort("Answer key extraction failed", &key_result);
            return tracker.into_report(RunStatus::Aborted, None);
        };

        let (answers_result, submission) = self
            .student_answers_stage(&run.submission, &run.subject, &run.student_id)
            .await;
        tracker.record(&answers_result);
        tracker.stages.student_answers = answers_result.payload().cloned();
        let Some(submission) = submission else {
            tracker.abort("Student answer extraction failed", &answers_result);
            return tracker.into_report(RunStatus::Aborted, None);
        };
        tracker.warnings.extend(submission.problems.iter().cloned());

        let mut questions = answer_key.questions;
        questions.sort_by_key(|q| q.number);
        debug!(
            answer_key = %answer_key.document_id,
            questions = questions.len(),
            answers = submission.answers.len(),
            "Grading questions"
        );

        for question in &questions {
            let answer = submission
                .answers
                .iter()
                .find(|a| a.refers_to(question))
                .cloned()
                .unwrap_or_else(|| StudentAnswer::blank(question.number));

            let (result, _) = self
                .grading_stage(question, &answer, submission.document_id)
                .await;
            tracker.record(&result);
            match result.payload() {
                Some(payload) => tracker.stages.corrections.push(payload.clone()),
                None => tracker.errors.push(format!(
                    "Question {}: {}",
                    question.number,
                    result.error().unwrap_or("unknown error")
                )),
            }
        }

        let (report_result, report) = self
            .report_stage(submission.document_id, &run.student_name)
            .await;
        tracker.record(&report_result);
        tracker.stages.report = report_result.payload().cloned();
        if let Some(error) = report_result.error() {
            tracker.errors.push(format!("Report synthesis failed: {}", error));
        }

        let status = if tracker.errors.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        };
        info!(
            status = ?status,
            errors = tracker.errors.len(),
            duration_ms = tracker.total_duration_ms,
            "Correction pipeline finished"
        );
        tracker.into_report(status, report)
    }
}

/// Per-run accumulator, independent of the shared history
#[derive(Default)]
struct RunTracker {
    stages: StageOutputs,
    errors: Vec<String>,
    warnings: Vec<String>,
    providers: BTreeSet<String>,
    total_duration_ms: u64,
}

impl RunTracker {
    fn record(&mut self, result: &PipelineStageResult) {
        if let Some(response) = result.response() {
            self.providers.insert(response.provenance());
        }
        self.total_duration_ms = self.total_duration_ms.saturating_add(result.duration_ms());
    }

    fn abort(&mut self, context: &str, result: &PipelineStageResult) {
        let message = format!("{}: {}", context, result.error().unwrap_or("unknown error"));
        error!(stage = %result.stage(), "{}", message);
        self.errors.push(message);
    }

    fn into_report(self, status: RunStatus, report: Option<SynthesizedReport>) -> PipelineReport {
        PipelineReport {
            status,
            stages: self.stages,
            errors: self.errors,
            warnings: self.warnings,
            summary: RunSummary {
                final_score: report.as_ref().map(|r| r.final_score),
                max_score: report.as_ref().map(|r| r.max_score),
                report_document_id: report.as_ref().map(|r| r.document_id),
                providers_used: self.providers.into_iter().collect(),
                total_duration_ms: self.total_duration_ms,
            },
        }
    }
}

fn decode<T: DeserializeOwned>(stage: PipelineStage, object: &Map<String, Value>) -> Result<T, StageError> {
    serde_json::from_value(Value::Object(object.clone()))
        .map_err(|source| StageError::Schema { stage, source })
}

/// First occurrence wins
/// Answers are matched by question number, so numbers must be unique
fn check_question_numbers(questions: &[Question]) -> Result<(), StageError> {
    let mut seen = BTreeSet::new();
    match questions.iter().find(|q| !seen.insert(q.number)) {
        Some(duplicate) => Err(StageError::Invalid(format!(
            "Answer key lists question {} more than once",
            duplicate.number
        ))),
        None => Ok(()),
    }
}

fn unique<'a>(values: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen: BTreeSet<&'a String> = BTreeSet::new();
    values
        .filter(|v| seen.insert(*v))
        .cloned()
        .collect()
}

fn round_one(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
