// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Grading
//!
//! Records produced by the correction pipeline: source documents, answer-key
//! questions, student answers, per-question corrections, stage results and
//! the aggregated run report.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Aggregates persisted through `GradingRepository`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::llm::CompletionResponse;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id!(
    /// Stored source document (answer key, submission or report)
    DocumentId
);
entity_id!(QuestionId);
entity_id!(CorrectionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    AnswerKey,
    StudentSubmission,
    Report,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub path: String,
    pub kind: DocumentKind,
    pub subject: String,
    /// Provider identifier that processed the file
    pub processed_by: String,
    /// Inline body for generated documents (reports)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        path: impl Into<String>,
        kind: DocumentKind,
        subject: impl Into<String>,
        processed_by: impl Into<String>,
    ) -> Self {
        Self {
            id: DocumentId::new(),
            path: path.into(),
            kind,
            subject: subject.into(),
            processed_by: processed_by.into(),
            content: None,
            metadata: serde_json::Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Sub-item of a question (a, b, c...) with its own expected answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionItem {
    pub item: String,
    #[serde(default, alias = "texto")]
    pub text: String,
    #[serde(default, alias = "resposta")]
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub number: u32,
    pub statement: String,
    #[serde(default)]
    pub items: Vec<QuestionItem>,
    /// Expected answer when no item-specific one applies
    #[serde(default)]
    pub expected_answer: String,
    #[serde(default)]
    pub max_score: f64,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl Question {
    /// Expected answer for an optional item reference
    pub fn expected_answer_for(&self, item_ref: Option<&str>) -> &str {
        item_ref
            .and_then(|r| self.items.iter().find(|i| i.item.eq_ignore_ascii_case(r)))
            .map(|i| i.answer.as_str())
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.expected_answer)
    }
}

/// One answer read off a student's submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAnswer {
    /// Question number as written by the student
    #[serde(alias = "questao_ref", deserialize_with = "string_or_number")]
    pub question_ref: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub item_ref: Option<String>,
    #[serde(default, alias = "resposta")]
    pub answer: String,
    #[serde(default, alias = "observacoes")]
    pub notes: Option<String>,
}

impl StudentAnswer {
    pub const BLANK: &'static str = "[BLANK]";

    pub fn blank(question_number: u32) -> Self {
        Self {
            question_ref: question_number.to_string(),
            item_ref: None,
            answer: Self::BLANK.to_string(),
            notes: None,
        }
    }

    pub fn refers_to(&self, question: &Question) -> bool {
        self.question_ref.trim() == question.number.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub id: CorrectionId,
    /// Student submission document the answer came from
    pub submission_id: DocumentId,
    pub question_id: QuestionId,
    pub question_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub student_answer: String,
    pub expected_answer: String,
    pub score: f64,
    pub max_score: f64,
    pub feedback: String,
    pub errors: Vec<String>,
    pub demonstrated_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub graded_by: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Grading workflow stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    ExtractAnswerKey,
    ExtractStudentAnswers,
    GradeQuestion,
    SynthesizeReport,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 4] = [
        Self::ExtractAnswerKey,
        Self::ExtractStudentAnswers,
        Self::GradeQuestion,
        Self::SynthesizeReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractAnswerKey => "extract_answer_key",
            Self::ExtractStudentAnswers => "extract_student_answers",
            Self::GradeQuestion => "grade_question",
            Self::SynthesizeReport => "synthesize_report",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("Unknown pipeline stage: {}", s))
    }
}

/// Outcome of one stage invocation. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStageResult {
    success: bool,
    stage: PipelineStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<CompletionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    duration_ms: u64,
}

impl PipelineStageResult {
    pub fn succeeded(
        stage: PipelineStage,
        payload: serde_json::Value,
        response: Option<CompletionResponse>,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: true,
            stage,
            payload: Some(payload),
            response,
            error: None,
            duration_ms,
        }
    }

    /// Failed results carry no payload. The provenance of a call that did
    /// come back (e.g. unparseable output) is still kept.
    pub fn failed(
        stage: PipelineStage,
        error: impl Into<String>,
        response: Option<CompletionResponse>,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: false,
            stage,
            payload: None,
            response,
            error: Some(error.into()),
            duration_ms,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }

    pub fn response(&self) -> Option<&CompletionResponse> {
        self.response.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Ran to the end but some questions or the report failed
    CompletedWithErrors,
    /// An extraction stage failed; later stages never ran
    Aborted,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageOutputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_key: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_answers: Option<serde_json::Value>,
    pub corrections: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub final_score: Option<f64>,
    pub max_score: Option<f64>,
    pub report_document_id: Option<DocumentId>,
    /// Deduplicated `vendor/model` strings, sorted
    pub providers_used: Vec<String>,
    pub total_duration_ms: u64,
}

/// Aggregated outcome of `run_full_pipeline`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub status: RunStatus,
    pub stages: StageOutputs,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub summary: RunSummary,
}

impl PipelineReport {
    pub fn success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    opt_string_or_number(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected a string or number, found null"))
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, found {}",
            other
        ))),
    }
}
