//! 后端注册表：在入口处按配置构建一次，以引用传递
//!
//! 维护已注册后端（按注册顺序）与当前后端；没有可用后端时各操作返回失败的 AiResponse。

use std::sync::Arc;

use crate::action::Action;
use crate::ai::gemini::GeminiProvider;
use crate::ai::openai::OpenAiProvider;
use crate::ai::provider::{AiProvider, OperationTimeouts};
use crate::ai::response::AiResponse;
use crate::config::{AiSection, ProviderSection};

const NO_PROVIDER_GENERATE: &str = "No AI provider available. Please configure an API key.";
const NO_PROVIDER: &str = "No AI provider available";

/// 内置后端：名称 → API key 环境变量
const BUILTIN: [(&str, &str); 2] = [("gemini", "GEMINI_API_KEY"), ("openai", "OPENAI_API_KEY")];

#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn AiProvider>>,
    current: Option<String>,
    settings: AiSection,
}

fn builtin_section<'a>(settings: &'a AiSection, name: &str) -> Option<&'a ProviderSection> {
    match name {
        "gemini" => Some(&settings.gemini),
        "openai" => Some(&settings.openai),
        _ => None,
    }
}

fn build_builtin(
    name: &str,
    api_key: String,
    section: &ProviderSection,
    timeouts: OperationTimeouts,
) -> Option<Arc<dyn AiProvider>> {
    match name {
        "gemini" => Some(Arc::new(GeminiProvider::new(api_key, section, timeouts))),
        "openai" => Some(Arc::new(OpenAiProvider::new(api_key, section, timeouts))),
        _ => None,
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置注册内置后端
    ///
    /// 段内 enabled=true 且能取到 key 时注册；段内未写 api_key 而环境变量提供了 key 时也注册。
    /// 当前后端优先取 `[ai].provider`，否则取第一个注册成功的。
    pub fn from_config(settings: &AiSection) -> Self {
        let mut registry = Self {
            settings: settings.clone(),
            ..Self::default()
        };
        let timeouts = OperationTimeouts::from(settings.timeouts);

        for (name, env_var) in BUILTIN {
            let Some(section) = builtin_section(settings, name) else {
                continue;
            };
            let key = section.resolve_api_key(env_var);
            let from_env = section.api_key.is_none() && key.is_some();
            match key {
                Some(key) if section.enabled || from_env => {
                    if let Some(provider) = build_builtin(name, key, section, timeouts) {
                        tracing::info!(provider = name, model = provider.model(), "AI provider initialized");
                        registry.register(provider);
                    }
                }
                None if section.enabled => {
                    tracing::warn!(provider = name, "Provider enabled but no API key configured ({env_var})");
                }
                _ => {}
            }
        }

        if let Some(preferred) = settings.provider.as_deref() {
            if !registry.set_current(preferred) {
                tracing::warn!(
                    provider = preferred,
                    fallback = ?registry.current_name(),
                    "Preferred AI provider not available"
                );
            }
        }
        registry
    }

    /// 注册（同名替换）；尚无当前后端时设为当前
    pub fn register(&mut self, provider: Arc<dyn AiProvider>) {
        let name = provider.name().to_string();
        match self.providers.iter_mut().find(|p| p.name() == name) {
            Some(slot) => *slot = provider,
            None => self.providers.push(provider),
        }
        if self.current.is_none() {
            self.current = Some(name);
        }
    }

    pub fn available_providers(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AiProvider>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    pub fn set_current(&mut self, name: &str) -> bool {
        if self.get(name).is_none() {
            return false;
        }
        self.current = Some(name.to_string());
        tracing::info!(provider = name, "Switched AI provider");
        true
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&Arc<dyn AiProvider>> {
        self.current.as_deref().and_then(|name| self.get(name))
    }

    pub fn is_available(&self) -> bool {
        self.current().is_some()
    }

    pub async fn generate_actions_from_text(&self, prompt: &str) -> AiResponse {
        let Some(provider) = self.current() else {
            return AiResponse::failure(NO_PROVIDER_GENERATE);
        };
        let preview: String = prompt.chars().take(100).collect();
        tracing::info!(provider = provider.name(), prompt = %preview, "Generating actions from prompt");
        provider.generate_actions(prompt).await
    }

    pub async fn explain_action_sequence(&self, actions: &[Action]) -> AiResponse {
        let Some(provider) = self.current() else {
            return AiResponse::failure(NO_PROVIDER);
        };
        tracing::info!(provider = provider.name(), actions = actions.len(), "Explaining sequence");
        provider.explain_actions(actions).await
    }

    pub async fn suggest_optimizations(&self, actions: &[Action]) -> AiResponse {
        let Some(provider) = self.current() else {
            return AiResponse::failure(NO_PROVIDER);
        };
        tracing::info!(provider = provider.name(), actions = actions.len(), "Suggesting optimizations");
        provider.optimize_sequence(actions).await
    }

    /// 以一次真实生成请求测试连通性；name 为空时测当前后端
    pub async fn test_connection(&self, name: Option<&str>) -> Result<String, String> {
        let provider = match name {
            Some(name) => self.get(name),
            None => self.current(),
        }
        .ok_or_else(|| "Provider not available".to_string())?;

        let response = provider.generate_actions("test connection").await;
        if response.success {
            Ok("Connection successful".to_string())
        } else {
            Err(response.error.unwrap_or_else(|| "Unknown error".to_string()))
        }
    }

    /// 替换内置后端的 API key 并重建；空白 key 会移除该后端。未知后端返回 false
    pub fn update_api_key(&mut self, name: &str, api_key: &str) -> bool {
        let Some(section) = builtin_section(&self.settings, name).cloned() else {
            return false;
        };

        if api_key.trim().is_empty() {
            self.providers.retain(|p| p.name() != name);
            if self.current.as_deref() == Some(name) {
                self.current = self.providers.first().map(|p| p.name().to_string());
            }
            tracing::info!(provider = name, "Removed AI provider (blank API key)");
            return true;
        }

        let section = ProviderSection {
            enabled: true,
            api_key: Some(api_key.to_string()),
            ..section
        };
        let timeouts = OperationTimeouts::from(self.settings.timeouts);
        match build_builtin(name, api_key.to_string(), &section, timeouts) {
            Some(provider) => {
                match name {
                    "gemini" => self.settings.gemini = section,
                    _ => self.settings.openai = section,
                }
                self.register(provider);
                tracing::info!(provider = name, "Updated API key");
                true
            }
            None => false,
        }
    }
}
