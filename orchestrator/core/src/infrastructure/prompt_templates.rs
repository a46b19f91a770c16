// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Stage Prompt Templates
//!
//! System prompts and Handlebars instruction templates for each grading stage.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Turn stage inputs into the text sent to the model
//! - **Integration:** `CorrectionPipeline` stage methods → `LLMProvider`
//!
//! # Wire format
//!
//! The JSON the model is asked to return keeps the Portuguese keys of the
//! answer-key format (`questoes`, `numero`, `enunciado`, ...), which the
//! pipeline parses as-is.

use handlebars::{Handlebars, RenderError};
use serde::Serialize;

pub const ANSWER_KEY_SYSTEM_PROMPT: &str = r#"You are an expert in analysing exams and educational assessments.

Extract EVERY question from the exam / answer key in structured form. For each question identify:
1. Question number
2. Full statement
3. Items or alternatives, if any (a, b, c...)
4. Expected answer
5. Score, when indicated
6. Skills assessed, inferred from the content

Be precise, preserve mathematical notation and leave the answer empty when the key gives none.

Return JSON with this structure:
{
    "questoes": [
        {
            "numero": 1,
            "enunciado": "...",
            "itens": [
                {"item": "a", "texto": "...", "resposta": "..."}
            ],
            "resposta_geral": "...",
            "pontuacao": 2.0,
            "habilidades": ["reading comprehension"]
        }
    ],
    "total_questoes": 5,
    "pontuacao_total": 10.0,
    "observacoes": "..."
}"#;

pub const STUDENT_ANSWERS_SYSTEM_PROMPT: &str = r#"You are an expert in reading exams answered by students.

Extract EVERY answer the student gave, identifying:
1. Which question / item each answer refers to
2. The exact content of the answer
3. Drafts or crossed-out parts
4. Questions left blank

Preserve exactly what the student wrote, keep the numbering even when inconsistent,
note missing or illegible pages and mark uncertainty explicitly.

Return JSON:
{
    "respostas": [
        {
            "questao_ref": "1",
            "item_ref": "a",
            "resposta": "the student's answer",
            "observacoes": "crossed out"
        }
    ],
    "questoes_em_branco": [2, 3],
    "problemas_identificados": ["page 2 looks cut off"],
    "legibilidade": 0.9
}"#;

pub const GRADING_SYSTEM_PROMPT: &str = r#"You are an experienced teacher grading an exam question in detail.

For the question:
1. Analyse the student's answer carefully
2. Compare it with the expected answer
3. Award a score proportional to what is correct
4. Identify specific errors and their likely causes
5. Assess which skills the student demonstrated
6. Write constructive, educational feedback

Be fair and consistent, value correct reasoning even with small slips and point out
error patterns that reveal learning gaps.

Return JSON:
{
    "nota": 1.5,
    "nota_maxima": 2.0,
    "acertos": ["correctly identified X"],
    "erros": [
        {
            "descricao": "confused A with B",
            "gravidade": "leve|moderado|grave",
            "causa_provavel": "conceptual confusion between..."
        }
    ],
    "habilidades_demonstradas": ["interpretation"],
    "habilidades_faltantes": ["advanced algebra"],
    "feedback": "Good work on... To improve, review...",
    "confianca": 0.95
}"#;

pub const REPORT_SYSTEM_PROMPT: &str = r#"You are an expert in educational assessment.

Write a professional, constructive performance report that presents the results clearly,
highlights the student's strengths, identifies areas for improvement and suggests next
study steps. Be encouraging but honest.

The report is addressed to the teacher, who may share it with the student or guardians."#;

const ANSWER_KEY_INSTRUCTION: &str = "{{system}}\n\n\
Analyse this exam / answer key for the subject \"{{subject}}\".\n\
Extract every question in the JSON format above.\n\
Be meticulous: every detail matters for automated grading.";

const STUDENT_ANSWERS_INSTRUCTION: &str = "{{system}}\n\n\
Analyse this exam answered by student \"{{student_id}}\" for the subject \"{{subject}}\".\n\
Extract every answer in the JSON format above.\n\
Be precise when deciding which question each answer belongs to.";

const GRADING_TEMPLATE: &str = "QUESTION {{question_number}}:\n\
{{statement}}\n\n\
EXPECTED ANSWER:\n\
{{expected_answer}}\n\n\
STUDENT ANSWER:\n\
{{student_answer}}\n\n\
Notes on the answer: {{#if notes}}{{notes}}{{else}}None{{/if}}\n\n\
Maximum score for this question: {{max_score}}\n\n\
Grade this question following the criteria above.";

const REPORT_TEMPLATE: &str = "Write an assessment report for:\n\
Student: {{student_name}}\n\
Submission ID: {{submission_id}}\n\n\
OVERALL RESULT:\n\
- Final score: {{final_score}}/{{max_score}} ({{percentage}}%)\n\
- Questions graded: {{graded_count}}\n\n\
SKILLS DEMONSTRATED:\n\
{{#if demonstrated_skills}}{{demonstrated_skills}}{{else}}None identified{{/if}}\n\n\
SKILLS TO DEVELOP:\n\
{{#if missing_skills}}{{missing_skills}}{{else}}None identified{{/if}}\n\n\
PER-QUESTION BREAKDOWN:\n\
{{question_summary}}\n\n\
Write a complete report in Markdown.";

#[derive(Debug, Clone, Serialize)]
pub struct GradingPromptContext {
    pub question_number: u32,
    pub statement: String,
    pub expected_answer: String,
    pub student_answer: String,
    pub notes: Option<String>,
    pub max_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPromptContext {
    pub student_name: String,
    pub submission_id: String,
    pub final_score: f64,
    pub max_score: f64,
    /// Already formatted with one decimal
    pub percentage: String,
    pub graded_count: usize,
    /// Comma-separated, empty when none
    pub demonstrated_skills: String,
    pub missing_skills: String,
    /// Pretty-printed JSON array of per-question summaries
    pub question_summary: String,
}

pub struct StagePrompts {
    handlebars: Handlebars<'static>,
}

impl StagePrompts {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        // Prompts are plain text; HTML escaping would mangle quotes and math
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    pub fn render<T: Serialize>(&self, template: &str, context: &T) -> Result<String, RenderError> {
        self.handlebars.render_template(template, context)
    }

    /// Full instruction for answer-key extraction (schema included)
    pub fn answer_key_instruction(&self, subject: &str) -> Result<String, RenderError> {
        self.render(
            ANSWER_KEY_INSTRUCTION,
            &serde_json::json!({ "system": ANSWER_KEY_SYSTEM_PROMPT, "subject": subject }),
        )
    }

    pub fn student_answers_instruction(
        &self,
        subject: &str,
        student_id: &str,
    ) -> Result<String, RenderError> {
        self.render(
            STUDENT_ANSWERS_INSTRUCTION,
            &serde_json::json!({
                "system": STUDENT_ANSWERS_SYSTEM_PROMPT,
                "subject": subject,
                "student_id": student_id,
            }),
        )
    }

    pub fn grading_prompt(&self, context: &GradingPromptContext) -> Result<String, RenderError> {
        self.render(GRADING_TEMPLATE, context)
    }

    pub fn report_prompt(&self, context: &ReportPromptContext) -> Result<String, RenderError> {
        self.render(REPORT_TEMPLATE, context)
    }
}

impl Default for StagePrompts {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_key_instruction_embeds_schema() {
        let prompts = StagePrompts::new();
        let text = prompts.answer_key_instruction("Math & \"Physics\"").unwrap();
        assert!(text.contains("\"questoes\""));
        assert!(text.contains("subject \"Math & \"Physics\"\""));
        assert!(!text.contains("&amp;"));
    }

    #[test]
    fn test_grading_prompt_defaults_notes() {
        let prompts = StagePrompts::new();
        let text = prompts
            .grading_prompt(&GradingPromptContext {
                question_number: 2,
                statement: "x < 3?".into(),
                expected_answer: "yes".into(),
                student_answer: "[BLANK]".into(),
                notes: None,
                max_score: 1.5,
            })
            .unwrap();
        assert!(text.starts_with("QUESTION 2:\nx < 3?"));
        assert!(text.contains("STUDENT ANSWER:\n[BLANK]"));
        assert!(text.contains("Notes on the answer: None"));
        assert!(text.contains("Maximum score for this question: 1.5"));
    }

    #[test]
    fn test_report_prompt_empty_skills() {
        let prompts = StagePrompts::new();
        let text = prompts
            .report_prompt(&ReportPromptContext {
                student_name: "Ana".into(),
                submission_id: "abc".into(),
                final_score: 7.5,
                max_score: 10.0,
                percentage: "75.0".into(),
                graded_count: 4,
                demonstrated_skills: "algebra".into(),
                missing_skills: String::new(),
                question_summary: "[]".into(),
            })
            .unwrap();
        assert!(text.contains("Final score: 7.5/10.0 (75.0%)"));
        assert!(text.contains("SKILLS DEMONSTRATED:\nalgebra"));
        assert!(text.contains("SKILLS TO DEVELOP:\nNone identified"));
    }
}
