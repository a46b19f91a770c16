// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Model-facing output schemas of the grading stages.
//
// Keys follow the answer-key wire format (Portuguese). Models are sloppy with
// types, so numbers are accepted as JSON numbers or numeric strings.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::grading::{Question, QuestionId, QuestionItem, StudentAnswer};

/// Score assumed when the answer key does not state one
pub const DEFAULT_QUESTION_SCORE: f64 = 0.0;
/// Confidence assumed when the grader omits `confianca`
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerKeyOutput {
    pub questoes: Vec<ExtractedQuestion>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total_questoes: Option<u32>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pontuacao_total: Option<f64>,
    #[serde(default)]
    pub observacoes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedQuestion {
    #[serde(deserialize_with = "required_u32")]
    pub numero: u32,
    pub enunciado: String,
    #[serde(default)]
    pub itens: Vec<QuestionItem>,
    #[serde(default)]
    pub resposta_geral: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pontuacao: Option<f64>,
    #[serde(default)]
    pub habilidades: Vec<String>,
}

impl ExtractedQuestion {
    pub fn into_question(self) -> Question {
        Question {
            id: QuestionId::new(),
            number: self.numero,
            statement: self.enunciado,
            items: self.itens,
            expected_answer: self.resposta_geral.unwrap_or_default(),
            max_score: self.pontuacao.unwrap_or(DEFAULT_QUESTION_SCORE),
            skills: self.habilidades,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudentAnswersOutput {
    pub respostas: Vec<StudentAnswer>,
    #[serde(default)]
    pub questoes_em_branco: Vec<Value>,
    #[serde(default)]
    pub problemas_identificados: Vec<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub legibilidade: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradingOutput {
    #[serde(deserialize_with = "required_f64")]
    pub nota: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub nota_maxima: Option<f64>,
    #[serde(default)]
    pub acertos: Vec<String>,
    #[serde(default)]
    pub erros: Vec<GradingErrorDetail>,
    #[serde(default)]
    pub habilidades_demonstradas: Vec<String>,
    #[serde(default)]
    pub habilidades_faltantes: Vec<String>,
    #[serde(default)]
    pub feedback: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confianca: Option<f64>,
}

/// An error the grader found, either a bare description or the full record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GradingErrorDetail {
    Detailed {
        descricao: String,
        #[serde(default)]
        gravidade: Option<String>,
        #[serde(default)]
        causa_provavel: Option<String>,
    },
    Text(String),
}

impl GradingErrorDetail {
    pub fn description(&self) -> &str {
        match self {
            Self::Detailed { descricao, .. } => descricao,
            Self::Text(text) => text,
        }
    }
}

fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    number_from_value(&value)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a number, found {}", value)))
}

fn required_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_f64(deserializer)?.ok_or_else(|| serde::de::Error::custom("expected a number, found null"))
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match lenient_f64(deserializer)? {
        None => Ok(None),
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => Ok(Some(n as u32)),
        Some(n) => Err(serde::de::Error::custom(format!(
            "expected a whole number, found {}",
            n
        ))),
    }
}

fn required_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_u32(deserializer)?.ok_or_else(|| serde::de::Error::custom("expected a number, found null"))
}
