pub mod config;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_WIDGET_TITLE,
    ENV_PREFIX, WidgetConfig,
};
