use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Json, Toml},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

use crate::session::UserMetadata;

pub const DEFAULT_WIDGET_TITLE: &str = "Chatbot";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const ENV_PREFIX: &str = "CHATWIDGET_";

/// Host-supplied widget options.
///
/// Field names follow the host option names (`widgetTitle`, `responseIsAStream`, ...).
/// Environment variables use the snake-case aliases, e.g. `CHATWIDGET_WIDGET_TITLE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WidgetConfig {
    /// Request target. Empty disables submission.
    pub url: String,
    /// Pre-seeds the conversation thread.
    #[serde(alias = "thread_id")]
    pub thread_id: Option<String>,
    #[serde(alias = "response_is_a_stream")]
    pub response_is_a_stream: bool,
    /// Merged into every outgoing request.
    pub user: UserMetadata,
    #[serde(alias = "widget_title")]
    pub widget_title: String,
    #[serde(alias = "greeting_message")]
    pub greeting_message: Option<String>,
    #[serde(alias = "disable_error_alert")]
    pub disable_error_alert: bool,
    #[serde(alias = "close_on_outside_click")]
    pub close_on_outside_click: bool,
    #[serde(alias = "open_on_load")]
    pub open_on_load: bool,
    /// Upper bound for the response head and for each stream chunk. `0` disables it.
    #[serde(alias = "request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            thread_id: None,
            response_is_a_stream: false,
            user: UserMetadata::default(),
            widget_title: DEFAULT_WIDGET_TITLE.to_string(),
            greeting_message: None,
            disable_error_alert: false,
            close_on_outside_click: true,
            open_on_load: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl WidgetConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_streaming(mut self, response_is_a_stream: bool) -> Self {
        self.response_is_a_stream = response_is_a_stream;
        self
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting_message = Some(greeting.into());
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn normalized(mut self) -> Self {
        self.url = self.url.trim().to_string();
        self.widget_title = match self.widget_title.trim() {
            "" => DEFAULT_WIDGET_TITLE.to_string(),
            title => title.to_string(),
        };
        self.greeting_message = self
            .greeting_message
            .filter(|greeting| !greeting.trim().is_empty());
        self.thread_id = self
            .thread_id
            .map(|thread_id| thread_id.trim().to_string())
            .filter(|thread_id| !thread_id.is_empty());
        self
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("configuration file {path:?} does not exist"))]
    MissingFile { stage: &'static str, path: PathBuf },
    #[snafu(display("failed to load widget configuration on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        source: figment::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Layers defaults, an optional JSON/TOML file and prefixed environment variables.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    file_required: bool,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            file: None,
            file_required: false,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file layer. A missing `required` file is an error; a missing optional
    /// one is skipped.
    pub fn with_file(mut self, path: impl Into<PathBuf>, required: bool) -> Self {
        self.file = Some(path.into());
        self.file_required = required;
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn figment(&self) -> ConfigResult<Figment> {
        let mut figment = Figment::new();

        if let Some(path) = &self.file {
            if path.exists() {
                figment = Self::merge_file(figment, path);
            } else {
                ensure!(
                    !self.file_required,
                    MissingFileSnafu {
                        stage: "config-file-exists",
                        path: path.clone(),
                    }
                );
                tracing::info!("widget config file not found at {:?}, skipping", path);
            }
        }

        Ok(figment.merge(Env::prefixed(&self.env_prefix)))
    }

    pub fn load(&self) -> ConfigResult<WidgetConfig> {
        let config = self
            .figment()?
            .extract::<WidgetConfig>()
            .context(ExtractSnafu {
                stage: "extract-widget-config",
            })?;

        Ok(config.normalized())
    }

    fn merge_file(figment: Figment, path: &Path) -> Figment {
        let is_json = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

        if is_json {
            figment.merge(Json::file(path))
        } else {
            figment.merge(Toml::file(path))
        }
    }
}
