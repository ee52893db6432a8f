use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chatwidget_transport::ChatTransport;

use crate::chat::EntryChange;
use crate::session::{SessionController, TurnOutcome};
use crate::settings::WidgetConfig;

/// Delay between the host finishing its load and the auto-open.
pub const OPEN_ON_LOAD_DELAY: Duration = Duration::from_millis(500);

/// Element that triggered an open; the surface positions the panel relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub id: String,
}

impl Anchor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Everything the widget needs from its host rendering layer.
///
/// Placement, focus containment and the panel template live behind this trait.
pub trait WidgetSurface {
    fn show_panel(&mut self, title: &str, anchor: Option<&Anchor>);
    fn hide_panel(&mut self);
    fn show_backdrop(&mut self);
    fn hide_backdrop(&mut self);
    /// Thinking indicator, visible only while a reply is awaited.
    fn set_thinking(&mut self, thinking: bool);
    fn set_input_enabled(&mut self, enabled: bool);
    fn reset_input(&mut self);
    /// Re-render exactly one entry, either new at the head or replaced in place.
    fn render_entry(&mut self, change: &EntryChange);
    /// Replace the whole visible timeline. Entries are most recent first.
    fn render_timeline(&mut self, entries: &[EntryChange]);
    fn alert(&mut self, message: &str);
}

/// Shared, swappable configuration snapshot.
///
/// Clones point at the same slot, so a host can replace the configuration from
/// another task while a turn is in flight. The widget picks the new snapshot up at
/// its next interaction; a running turn keeps the snapshot it started with.
#[derive(Debug, Clone)]
pub struct ConfigHandle(Arc<ArcSwap<WidgetConfig>>);

impl ConfigHandle {
    pub fn new(config: Arc<WidgetConfig>) -> Self {
        Self(Arc::new(ArcSwap::new(config)))
    }

    pub fn load(&self) -> Arc<WidgetConfig> {
        self.0.load_full()
    }

    pub fn store(&self, config: WidgetConfig) {
        self.0.store(Arc::new(config.normalized()));
    }
}

/// Host-facing handle: `init`, `open`, `close` and swappable configuration.
pub struct WidgetHandle<S: WidgetSurface> {
    config: ConfigHandle,
    controller: SessionController<S>,
}

impl<S: WidgetSurface> WidgetHandle<S> {
    pub fn new(config: WidgetConfig, transport: Arc<dyn ChatTransport>, surface: S) -> Self {
        Self::from_controller(SessionController::new(config, transport, surface))
    }

    pub fn from_controller(controller: SessionController<S>) -> Self {
        let config = ConfigHandle::new(Arc::clone(controller.config()));
        Self { config, controller }
    }

    /// Installs a new configuration and applies it right away.
    pub fn init(&mut self, config: WidgetConfig) {
        self.set_config(config);
        self.sync_config();
        tracing::info!(url = %self.controller.config().url, "widget initialized");
    }

    pub fn config(&self) -> Arc<WidgetConfig> {
        self.config.load()
    }

    /// Replaces the configuration; it takes effect at the next interaction.
    pub fn set_config(&self, config: WidgetConfig) {
        self.config.store(config);
    }

    /// Configuration slot that stays usable while the handle itself is borrowed.
    pub fn config_handle(&self) -> ConfigHandle {
        self.config.clone()
    }

    pub fn controller(&self) -> &SessionController<S> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SessionController<S> {
        &mut self.controller
    }

    pub fn open(&mut self, anchor: Option<&Anchor>) {
        self.sync_config();
        self.controller.open(anchor);
    }

    pub fn close(&mut self) {
        self.controller.close();
    }

    pub fn outside_click(&mut self) {
        self.sync_config();
        self.controller.outside_click();
    }

    pub async fn submit(&mut self, input: &str) -> TurnOutcome {
        self.sync_config();
        self.controller.submit(input).await
    }

    /// Called once the host finished loading; auto-opens when configured to.
    pub async fn on_host_loaded(&mut self) -> bool {
        self.sync_config();
        if !self.controller.config().open_on_load {
            return false;
        }

        tokio::time::sleep(OPEN_ON_LOAD_DELAY).await;
        self.open(None);
        true
    }

    fn sync_config(&mut self) {
        let latest = self.config.load();
        if !Arc::ptr_eq(&latest, self.controller.config()) {
            tracing::debug!("applying updated widget configuration");
            self.controller.replace_config(latest);
        }
    }
}
