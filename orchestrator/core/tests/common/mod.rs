// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use gradeflow_core::domain::llm::{
    CompletionRequest, CompletionResponse, LLMError, LLMProvider,
};
use gradeflow_core::domain::provider::ProviderType;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

/// Provider that replays a script of replies, one per call.
/// `Err` entries surface as fatal vendor errors.
pub struct ScriptedProvider {
    model: String,
    script: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, content: &str) -> Self {
        self.script.lock().push_back(Ok(content.to_string()));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.script.lock().push_back(Err(message.to_string()));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of calls received so far
    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    /// Prompt (or instruction) of every call, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn next(&self, prompt: &str) -> Result<CompletionResponse, LLMError> {
        self.prompts.lock().push(prompt.to_string());
        match self.script.lock().pop_front() {
            Some(Ok(content)) => Ok(CompletionResponse {
                content,
                provider: "openai".to_string(),
                model: self.model.clone(),
                total_tokens: 30,
                input_tokens: 20,
                output_tokens: 10,
                latency_ms: 5,
                timestamp: Utc::now(),
                metadata: HashMap::new(),
            }),
            Some(Err(message)) => Err(LLMError::FatalVendor {
                status: Some(500),
                diagnostic: message,
                request_id: None,
            }),
            None => Err(LLMError::InvalidResponse("script exhausted".to_string())),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LLMError> {
        self.next(&request.prompt)
    }

    async fn analyze_document(
        &self,
        _path: &Path,
        instruction: &str,
    ) -> Result<CompletionResponse, LLMError> {
        self.next(instruction)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn has_credentials(&self) -> bool {
        true
    }
}

pub const ANSWER_KEY_REPLY: &str = r#"Here are the questions:
```json
{"questoes":[
  {"numero":1,"enunciado":"2+2=?","resposta_geral":"4","pontuacao":1.0},
  {"numero":2,"enunciado":"3*3=?","resposta_geral":"9","pontuacao":1.0},
  {"numero":3,"enunciado":"Name a prime","itens":[{"item":"a","texto":"even prime","resposta":"2"}],"resposta_geral":"any prime","pontuacao":2.0}
],"total_questoes":3}
```"#;

pub const STUDENT_ANSWERS_REPLY: &str = r#"```json
{"respostas":[
  {"questao_ref":1,"resposta":"4"},
  {"questao_ref":"3","item_ref":"a","resposta":"2","observacoes":"crossed out once"}
],"questoes_em_branco":[2],"problemas_identificados":["page 2 is blurry"],"legibilidade":0.8}
```"#;

pub fn grading_reply(score: f64, max: f64) -> String {
    format!(
        r#"{{"nota": {score}, "nota_maxima": {max}, "acertos": ["result"], "erros": [], "habilidades_demonstradas": ["arithmetic"], "habilidades_faltantes": [], "feedback": "Well done", "confianca": 0.9}}"#
    )
}
