use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use abram_llm::{
    GEMINI_PROVIDER_ID, GenerationOptions, ProviderConfig, RigBackend, default_model_for,
};
use abram_session::Subject;
use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use gpui::*;
use gpui_component::{Theme, ThemeMode, ThemeRegistry};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_PROVIDER_ID: &str = GEMINI_PROVIDER_ID;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const SETTINGS_DIRECTORY_NAME: &str = "abram";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    /// Custom base URL; empty means the provider default.
    #[serde(default)]
    pub endpoint: String,
    /// Model id; empty means the provider default.
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_subject_slug")]
    pub default_subject: String,
    #[serde(
        default = "default_theme_mode",
        serialize_with = "serialize_theme_mode",
        deserialize_with = "deserialize_theme_mode"
    )]
    pub theme_mode: ThemeMode,
    #[serde(default)]
    pub theme_name: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: String::new(),
            model: String::new(),
            temperature: None,
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
            default_subject: default_subject_slug(),
            theme_mode: default_theme_mode(),
            theme_name: String::new(),
        }
    }
}

impl AppSettings {
    pub fn to_provider_config(&self) -> Option<ProviderConfig> {
        if self.api_key.trim().is_empty() {
            return None;
        }

        Some(
            ProviderConfig::new(&self.provider_id, &self.api_key, &self.endpoint)
                .with_model(&self.model),
        )
    }

    pub fn is_valid(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn model_name(&self) -> String {
        if self.model.trim().is_empty() {
            default_model_for(&self.provider_id).to_string()
        } else {
            self.model.trim().to_string()
        }
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// `None` when the timeout is disabled with `0`.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn initial_subject(&self) -> Subject {
        match self.default_subject.parse::<Subject>() {
            Ok(subject) => subject,
            Err(error) => {
                tracing::warn!(%error, "unknown default subject in settings, using Algebra");
                Subject::default()
            }
        }
    }

    /// Fills a missing API key (and, for OpenAI, endpoint and model) from the
    /// process environment.
    pub fn with_environment_fallback(self) -> Self {
        self.with_fallback_from(|name| std::env::var(name).ok())
    }

    fn with_fallback_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.is_valid() {
            return self;
        }

        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        // Aliases such as `rig-openai` read the same variables as their canonical id.
        if RigBackend::for_provider_id(&self.provider_id) == Some(RigBackend::OpenAi) {
            let Some(api_key) = read("OPENAI_API_KEY") else {
                return self;
            };
            self.api_key = api_key;
            if self.endpoint.is_empty()
                && let Some(endpoint) = read("OPENAI_BASE_URL")
            {
                self.endpoint = endpoint;
            }
            if self.model.is_empty()
                && let Some(model) = read("OPENAI_MODEL")
            {
                self.model = model;
            }
        } else if let Some(api_key) = read("GEMINI_API_KEY") {
            self.api_key = api_key;
        } else {
            return self;
        }

        tracing::info!(provider_id = %self.provider_id, "using API key from environment");
        self
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = if self.provider_id.trim().is_empty() {
            default_provider_id()
        } else {
            self.provider_id.trim().to_ascii_lowercase()
        };
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = self.endpoint.trim().to_string();
        self.model = self.model.trim().to_string();
        self.temperature = self
            .temperature
            .filter(|value| value.is_finite())
            .map(|value| value.clamp(0.0, 2.0));
        self.max_tokens = self.max_tokens.filter(|value| *value > 0);
        self.default_subject = self
            .default_subject
            .parse::<Subject>()
            .map(|subject| subject.slug().to_string())
            .unwrap_or_else(|_| default_subject_slug());
        self.theme_name = self.theme_name.trim().to_string();
        self
    }

    pub fn apply_theme(&self, window: Option<&mut Window>, cx: &mut App) {
        if let Some(theme_config) = ThemeRegistry::global(cx)
            .themes()
            .get(&SharedString::from(self.theme_name.trim().to_string()))
            .cloned()
        {
            let mode = theme_config.mode;
            let theme = Theme::global_mut(cx);
            if mode.is_dark() {
                theme.dark_theme = theme_config;
            } else {
                theme.light_theme = theme_config;
            }
            Theme::change(mode, window, cx);
            return;
        }

        Theme::change(self.theme_mode, window, cx);
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<AppSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".abram"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        let store = Self::new(Self::default_config_path());
        store.write_template_if_missing();
        store
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<AppSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: AppSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// First run leaves a file with every field so the API key has somewhere to go.
    fn write_template_if_missing(&self) {
        if self.config_path.exists() {
            return;
        }

        if let Err(error) = self.persist(&self.settings()) {
            tracing::warn!(%error, "failed to write settings template");
        }
    }

    fn load_from_disk(path: &Path) -> AppSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            return AppSettings::default();
        }

        let figment =
            Figment::from(Serialized::defaults(AppSettings::default())).merge(Json::file(path));

        match figment.extract::<AppSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                AppSettings::default()
            }
        }
    }

    fn persist(&self, settings: &AppSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_subject_slug() -> String {
    Subject::default().slug().to_string()
}

fn default_theme_mode() -> ThemeMode {
    ThemeMode::Dark
}

fn serialize_theme_mode<S>(value: &ThemeMode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.name())
}

fn deserialize_theme_mode<'de, D>(deserializer: D) -> Result<ThemeMode, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(parse_theme_mode(&value))
}

fn parse_theme_mode(value: &str) -> ThemeMode {
    if value.trim().eq_ignore_ascii_case("light") {
        ThemeMode::Light
    } else {
        ThemeMode::Dark
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use abram_llm::OPENAI_PROVIDER_ID;

    use super::*;

    fn temp_settings_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("abram-settings-{}-{name}", std::process::id()))
            .join(SETTINGS_FILE_NAME)
    }

    #[::core::prelude::v1::test]
    fn normalized_fills_blank_fields_and_clamps_sampling() {
        let settings = AppSettings {
            provider_id: "  OpenAI ".to_string(),
            api_key: " sk-test ".to_string(),
            model: "  ".to_string(),
            temperature: Some(7.5),
            max_tokens: Some(0),
            default_subject: "nonsense".to_string(),
            theme_name: " Catppuccin ".to_string(),
            ..AppSettings::default()
        }
        .normalized();

        assert_eq!(settings.provider_id, "openai");
        assert_eq!(settings.api_key, "sk-test");
        assert_eq!(settings.model, "");
        assert_eq!(settings.model_name(), default_model_for("openai"));
        assert_eq!(settings.temperature, Some(2.0));
        assert_eq!(settings.max_tokens, None);
        assert_eq!(settings.default_subject, "algebra");
        assert_eq!(settings.theme_name, "Catppuccin");
    }

    #[::core::prelude::v1::test]
    fn blank_provider_defaults_to_gemini() {
        let settings = AppSettings {
            provider_id: " ".to_string(),
            ..AppSettings::default()
        }
        .normalized();

        assert_eq!(settings.provider_id, GEMINI_PROVIDER_ID);
        assert!(settings.to_provider_config().is_none());
    }

    #[::core::prelude::v1::test]
    fn zero_timeout_disables_it() {
        let mut settings = AppSettings::default();
        assert_eq!(
            settings.request_timeout(),
            Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
        );

        settings.request_timeout_secs = 0;
        assert_eq!(settings.request_timeout(), None);
    }

    #[::core::prelude::v1::test]
    fn default_subject_accepts_slug_or_display_name() {
        let mut settings = AppSettings::default();
        settings.default_subject = "Chemistry".to_string();
        assert_eq!(settings.initial_subject(), Subject::Chemistry);

        settings.default_subject = "history".to_string();
        assert_eq!(settings.initial_subject(), Subject::History);

        settings.default_subject = "latin".to_string();
        assert_eq!(settings.initial_subject(), Subject::Algebra);
    }

    #[::core::prelude::v1::test]
    fn environment_fallback_only_fills_a_missing_key() {
        let env = HashMap::from([
            ("GEMINI_API_KEY", "gemini-env"),
            ("OPENAI_API_KEY", "openai-env"),
            ("OPENAI_BASE_URL", "https://proxy.test/v1"),
            ("OPENAI_MODEL", "gpt-4o"),
        ]);
        let lookup = |name: &str| env.get(name).map(|value| value.to_string());

        let gemini = AppSettings::default().with_fallback_from(lookup);
        assert_eq!(gemini.api_key, "gemini-env");
        assert_eq!(gemini.endpoint, "");

        let openai = AppSettings {
            provider_id: OPENAI_PROVIDER_ID.to_string(),
            ..AppSettings::default()
        }
        .with_fallback_from(lookup);
        assert_eq!(openai.api_key, "openai-env");
        assert_eq!(openai.endpoint, "https://proxy.test/v1");
        assert_eq!(openai.model_name(), "gpt-4o");

        let alias = AppSettings {
            provider_id: "rig-openai".to_string(),
            ..AppSettings::default()
        }
        .with_fallback_from(lookup);
        assert_eq!(alias.api_key, "openai-env");
        assert_eq!(alias.endpoint, "https://proxy.test/v1");

        let configured = AppSettings {
            api_key: "from-file".to_string(),
            ..AppSettings::default()
        }
        .with_fallback_from(lookup);
        assert_eq!(configured.api_key, "from-file");
    }

    #[::core::prelude::v1::test]
    fn provider_config_carries_model_override() {
        let settings = AppSettings {
            api_key: "key".to_string(),
            model: "gemini-2.5-pro".to_string(),
            ..AppSettings::default()
        };

        let config = settings.to_provider_config().unwrap();
        assert_eq!(config.provider_id, GEMINI_PROVIDER_ID);
        assert_eq!(config.model_id.as_deref(), Some("gemini-2.5-pro"));
    }

    #[::core::prelude::v1::test]
    fn settings_round_trip_through_disk() {
        let path = temp_settings_path("round-trip");
        let _ = std::fs::remove_file(&path);

        let store = SettingsStore::new(path.clone());
        assert_eq!(*store.settings(), AppSettings::default());

        let updated = AppSettings {
            api_key: "key".to_string(),
            temperature: Some(0.4),
            request_timeout_secs: 30,
            default_subject: "physics".to_string(),
            theme_mode: ThemeMode::Light,
            ..AppSettings::default()
        };
        store.update(updated.clone()).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = SettingsStore::new(path.clone());
        assert_eq!(*reloaded.settings(), updated.normalized());
        assert_eq!(reloaded.settings().initial_subject(), Subject::Physics);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[::core::prelude::v1::test]
    fn partial_file_is_merged_over_defaults() {
        let path = temp_settings_path("partial");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{ "api_key": "abc", "theme_mode": "light" }"#).unwrap();

        let settings = SettingsStore::new(path.clone()).settings();
        assert_eq!(settings.api_key, "abc");
        assert_eq!(settings.theme_mode, ThemeMode::Light);
        assert_eq!(settings.provider_id, GEMINI_PROVIDER_ID);
        assert_eq!(settings.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[::core::prelude::v1::test]
    fn unparsable_file_falls_back_to_defaults() {
        let path = temp_settings_path("broken");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let settings = SettingsStore::new(path.clone()).settings();
        assert_eq!(*settings, AppSettings::default());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
