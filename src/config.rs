//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AUTOTYPER__*` 覆盖（双下划线表示嵌套，如 `AUTOTYPER__AI__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub engine: EngineSection,
    pub ai: AiSection,
}

/// [app] 段：应用名、序列文件目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// generate -o 给出相对路径时的根目录
    #[serde(default = "default_sequences_dir")]
    pub sequences_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            sequences_dir: default_sequences_dir(),
        }
    }
}

fn default_app_name() -> String {
    "Autotyper".to_string()
}

fn default_sequences_dir() -> PathBuf {
    PathBuf::from("sequences")
}

/// [engine] 段：新序列的默认执行策略与输入驱动
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default)]
    pub loop_enabled: bool,
    #[serde(default = "default_loop_count")]
    pub loop_count: u32,
    #[serde(default)]
    pub repeat_interval: f64,
    #[serde(default = "default_true")]
    pub stop_on_error: bool,
    /// 开始前倒计时（秒）
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u64,
    /// dry-run / enigo
    #[serde(default = "default_driver")]
    pub driver: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            loop_enabled: false,
            loop_count: default_loop_count(),
            repeat_interval: 0.0,
            stop_on_error: true,
            countdown_secs: default_countdown_secs(),
            driver: default_driver(),
        }
    }
}

fn default_loop_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_countdown_secs() -> u64 {
    3
}

fn default_driver() -> String {
    "dry-run".to_string()
}

/// [ai] 段：首选后端、各后端参数、各操作超时
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AiSection {
    /// 首选后端名；为空或不可用时取第一个已配置的后端（gemini 优先）
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub gemini: ProviderSection,
    #[serde(default)]
    pub openai: ProviderSection,
    #[serde(default)]
    pub timeouts: AiTimeoutsSection,
}

/// [ai.gemini] / [ai.openai] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSection {
    #[serde(default)]
    pub enabled: bool,
    /// 未设置时读取 GEMINI_API_KEY / OPENAI_API_KEY
    pub api_key: Option<String>,
    /// 未设置时用后端默认模型（gemini-pro / gpt-3.5-turbo）
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            model: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1000
}

/// [ai.timeouts] 段（秒）
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AiTimeoutsSection {
    #[serde(default = "default_generate_timeout")]
    pub generate: u64,
    #[serde(default = "default_explain_timeout")]
    pub explain: u64,
    #[serde(default = "default_optimize_timeout")]
    pub optimize: u64,
}

impl Default for AiTimeoutsSection {
    fn default() -> Self {
        Self {
            generate: default_generate_timeout(),
            explain: default_explain_timeout(),
            optimize: default_optimize_timeout(),
        }
    }
}

fn default_generate_timeout() -> u64 {
    30
}

fn default_explain_timeout() -> u64 {
    20
}

fn default_optimize_timeout() -> u64 {
    25
}

impl ProviderSection {
    /// 配置中的 key，缺省时回退到环境变量；空白视为未设置
    pub fn resolve_api_key(&self, env_var: &str) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// 从 config 目录加载配置，环境变量 AUTOTYPER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AUTOTYPER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, ignoring");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AUTOTYPER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.loop_count, 1);
        assert!(config.engine.stop_on_error);
        assert_eq!(config.engine.countdown_secs, 3);
        assert_eq!(config.engine.driver, "dry-run");
        assert!(!config.ai.gemini.enabled);
        assert_eq!(config.ai.openai.max_tokens, 1000);
        assert_eq!(config.ai.timeouts.generate, 30);
        assert_eq!(config.ai.timeouts.explain, 20);
        assert_eq!(config.ai.timeouts.optimize, 25);
    }

    #[test]
    fn test_explicit_file_overrides_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[engine]
countdown_secs = 0
driver = "enigo"

[ai]
provider = "openai"

[ai.openai]
enabled = true
api_key = "sk-test"
model = "gpt-4o-mini"
base_url = "http://localhost:8080/v1"

[ai.timeouts]
generate = 5
"#,
        )
        .unwrap();

        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.engine.countdown_secs, 0);
        assert_eq!(config.engine.driver, "enigo");
        assert_eq!(config.engine.loop_count, 1);
        assert_eq!(config.ai.provider.as_deref(), Some("openai"));
        assert!(config.ai.openai.enabled);
        assert_eq!(config.ai.openai.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.ai.openai.temperature, 0.3);
        assert_eq!(config.ai.timeouts.generate, 5);
        assert_eq!(config.ai.timeouts.explain, 20);
    }

    #[test]
    fn test_resolve_api_key_ignores_blank() {
        let mut section = ProviderSection::default();
        section.api_key = Some("   ".into());
        assert_eq!(section.resolve_api_key("AUTOTYPER_TEST_UNSET_KEY"), None);
        section.api_key = Some("key".into());
        assert_eq!(
            section.resolve_api_key("AUTOTYPER_TEST_UNSET_KEY").as_deref(),
            Some("key")
        );
    }
}
