// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provider registry wired to real adapters talking to mock vendor endpoints.

use gradeflow_core::domain::config::RegistrySettings;
use gradeflow_core::domain::llm::{CompletionRequest, RetryPolicy};
use gradeflow_core::domain::provider::{
    HealthReport, ProviderDescriptor, ProviderType, ProvidersDocument, RegistryStatus,
};
use gradeflow_core::infrastructure::llm::ProviderRegistry;
use gradeflow_core::infrastructure::provider_store::ProviderStore;
use gradeflow_core::infrastructure::secrets_manager::SecretsManager;
use gradeflow_core::infrastructure::text_extraction::PlainTextExtractor;
use mockito::Matcher;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

fn settings(providers_file: &Path) -> RegistrySettings {
    RegistrySettings {
        providers_file: providers_file.to_path_buf(),
        disable_local_models: true,
        ..Default::default()
    }
}

fn secrets() -> SecretsManager {
    SecretsManager::new()
        .with_secret(ProviderType::OpenAI, "sk-test")
        .with_secret(ProviderType::Anthropic, "sk-ant-test")
}

fn load(providers_file: &Path) -> ProviderRegistry {
    load_with(providers_file, &secrets())
}

fn load_with(providers_file: &Path, secrets: &SecretsManager) -> ProviderRegistry {
    ProviderRegistry::load(
        &settings(providers_file),
        secrets,
        RetryPolicy::immediate(3),
        Arc::new(PlainTextExtractor::new()),
    )
    .unwrap()
}

fn chat_body(content: &str) -> String {
    json!({
        "choices": [{ "message": { "content": content }, "finish_reason": "stop" }],
        "usage": { "prompt_tokens": 8, "completion_tokens": 2, "total_tokens": 10 }
    })
    .to_string()
}

fn write_providers(path: &Path, default: &str, providers: Vec<ProviderDescriptor>) {
    ProviderStore::new(path)
        .save(&ProvidersDocument {
            default_provider: Some(default.to_string()),
            providers,
        })
        .unwrap();
}

#[tokio::test]
async fn test_reasoning_provider_recovers_from_empty_output() {
    let mut server = mockito::Server::new_async().await;
    let empty = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(json!({ "reasoning_effort": "low" })))
        .with_status(200)
        .with_body(chat_body(""))
        .expect(1)
        .create_async()
        .await;
    let answered = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(json!({ "reasoning_effort": "medium" })))
        .with_status(200)
        .with_body(chat_body("{\"nota\": 1.0}"))
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("providers.json");
    write_providers(
        &file,
        "reasoner",
        vec![ProviderDescriptor {
            name: "reasoner".into(),
            provider_type: ProviderType::OpenAI,
            model: "o3-mini".into(),
            base_url: Some(server.url()),
        }],
    );

    let registry = load(&file);
    let provider = registry.get(None).unwrap();
    let response = provider
        .complete(&CompletionRequest::new("grade this").with_temperature(0.3))
        .await
        .unwrap();

    assert!(!response.content.is_empty());
    assert!(response.metadata["attempts"].as_u64().unwrap() <= 3);
    empty.assert_async().await;
    answered.assert_async().await;
}

#[tokio::test]
async fn test_health_probe_fails_over_to_reachable_vendor() {
    let mut server = mockito::Server::new_async().await;
    let rejected = server
        .mock("POST", "/anthropic/messages")
        .with_status(401)
        .with_header("request-id", "req_123")
        .with_body(r#"{"type":"error","error":{"type":"authentication_error"}}"#)
        .expect(1)
        .create_async()
        .await;
    let healthy = server
        .mock("POST", "/openai/chat/completions")
        .match_body(Matcher::PartialJson(json!({ "temperature": 0.0 })))
        .with_status(200)
        .with_body(chat_body("OK"))
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("providers.json");
    write_providers(
        &file,
        "claude",
        vec![
            ProviderDescriptor {
                name: "claude".into(),
                provider_type: ProviderType::Anthropic,
                model: "claude-haiku-4-5-20251001".into(),
                base_url: Some(format!("{}/anthropic", server.url())),
            },
            ProviderDescriptor {
                name: "gpt".into(),
                provider_type: ProviderType::OpenAI,
                model: "gpt-4o-mini".into(),
                base_url: Some(format!("{}/openai", server.url())),
            },
        ],
    );

    let registry = load(&file);
    assert_eq!(registry.default_name().as_deref(), Some("claude"));

    let report = registry.probe_health().await;

    assert_eq!(report.status, RegistryStatus::FailedOver);
    assert_eq!(registry.default_name().as_deref(), Some("gpt"));
    let map = report.to_map();
    assert_eq!(map[HealthReport::FAILOVER_KEY], "claude -> gpt");
    assert_eq!(map["gpt"], "ok");
    assert!(map["claude"].starts_with("error: "));
    assert!(map["claude"].contains("req_123"));
    rejected.assert_async().await;
    healthy.assert_async().await;
}

#[test]
fn test_registrations_round_trip_through_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("providers.json");
    write_providers(
        &file,
        "gpt",
        vec![ProviderDescriptor {
            name: "gpt".into(),
            provider_type: ProviderType::OpenAI,
            model: "gpt-4o-mini".into(),
            base_url: None,
        }],
    );

    let registry = load(&file);
    let sonnet = gradeflow_core::infrastructure::llm::create_provider(
        &ProviderDescriptor {
            name: "sonnet".into(),
            provider_type: ProviderType::Anthropic,
            model: "claude-sonnet-4-5-20250929".into(),
            base_url: None,
        },
        Some("sk-ant-test".into()),
        &settings(&file),
        RetryPolicy::immediate(1),
        Arc::new(PlainTextExtractor::new()),
    )
    .unwrap();
    registry.register("sonnet", sonnet, true).unwrap();
    assert!(registry.unregister("gpt").unwrap());

    let raw = std::fs::read_to_string(&file).unwrap();
    assert!(!raw.contains("sk-ant-test"));

    let reloaded = load(&file);
    assert_eq!(reloaded.list(), vec!["sonnet".to_string()]);
    assert_eq!(reloaded.default_name().as_deref(), Some("sonnet"));
    let info = &reloaded.describe()[0];
    assert_eq!(info.identifier, "anthropic_claude-sonnet-4-5-20250929");
    assert!(info.has_credentials);
}

#[test]
fn test_synthesized_defaults_are_not_written_back() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("providers.json");

    let registry = load(&file);

    let names = registry.list();
    assert!(names.contains(&"openai-gpt4o-mini".to_string()));
    assert!(names.contains(&"claude-sonnet".to_string()));
    assert!(!names.iter().any(|n| n.starts_with("ollama-")));
    assert!(!file.exists());
}

#[test]
fn test_changes_to_synthesized_defaults_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("providers.json");
    let anthropic_only = SecretsManager::new().with_secret(ProviderType::Anthropic, "sk-ant-test");

    let registry = load_with(&file, &anthropic_only);
    let generated = registry.list();
    assert!(generated.contains(&"claude-haiku".to_string()));
    assert!(generated.contains(&"claude-sonnet".to_string()));
    assert!(registry.set_default("claude-sonnet").unwrap());

    let reloaded = load_with(&file, &anthropic_only);
    assert_eq!(reloaded.list(), generated);
    assert_eq!(reloaded.default_name().as_deref(), Some("claude-sonnet"));

    assert!(reloaded.unregister("claude-haiku").unwrap());
    let reloaded = load_with(&file, &anthropic_only);
    let remaining: Vec<String> = generated.into_iter().filter(|n| n != "claude-haiku").collect();
    assert_eq!(reloaded.list(), remaining);
    assert_eq!(reloaded.default_name().as_deref(), Some("claude-sonnet"));

    let raw = std::fs::read_to_string(&file).unwrap();
    assert!(!raw.contains("sk-ant-test"));
}

#[test]
fn test_adding_a_provider_keeps_synthesized_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("providers.json");
    let anthropic_only = SecretsManager::new().with_secret(ProviderType::Anthropic, "sk-ant-test");

    let registry = load_with(&file, &anthropic_only);
    let mut expected = registry.list();
    let generated_default = registry.default_name();
    let extra = gradeflow_core::infrastructure::llm::create_provider(
        &ProviderDescriptor {
            name: "vllm".into(),
            provider_type: ProviderType::OpenAICompatible,
            model: "qwen2.5".into(),
            base_url: Some("http://localhost:8000/v1".into()),
        },
        None,
        &settings(&file),
        RetryPolicy::immediate(1),
        Arc::new(PlainTextExtractor::new()),
    )
    .unwrap();
    registry.register("vllm", extra, false).unwrap();

    expected.push("vllm".to_string());

    let reloaded = load_with(&file, &anthropic_only);
    assert!(expected.contains(&"claude-sonnet".to_string()));
    assert_eq!(reloaded.list(), expected);
    assert_eq!(reloaded.default_name(), generated_default);
}

#[tokio::test]
async fn test_o_series_default_passes_health_probe() {
    let mut server = mockito::Server::new_async().await;
    let probe = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(json!({ "reasoning_effort": "low" })))
        .with_status(200)
        .with_body(chat_body("OK"))
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("providers.json");
    write_providers(
        &file,
        "o3",
        vec![ProviderDescriptor {
            name: "o3".into(),
            provider_type: ProviderType::OpenAI,
            model: "o3".into(),
            base_url: Some(server.url()),
        }],
    );

    let registry = load(&file);
    let report = registry.probe_health().await;

    assert_eq!(report.status, RegistryStatus::Healthy);
    assert_eq!(report.to_map()["o3"], "ok");
    probe.assert_async().await;
}
