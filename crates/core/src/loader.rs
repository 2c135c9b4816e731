//! Plugin loader - discovery, capability typing, setup
//!
//! Plugins describe themselves with a [`PluginDescriptor`]: a name plus one
//! setup function per capability they provide. The descriptors live in a
//! [`PluginRegistry`] built once at startup and immutable afterwards.
//!
//! [`load_plugins`] walks a configuration section and pairs each entry with
//! its setup function. Entries with a missing `type`, an unknown name, or a
//! missing capability are logged at error level and skipped; the remaining
//! plugins still start.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use ffwd_channel::PluginChannel;
use ffwd_config::PluginConfig;
use ffwd_metrics::Reporter;
use ffwd_transport::TransportError;

/// Errors from plugin setup
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin-level misconfiguration
    #[error("plugin config error: {0}")]
    Config(String),

    /// Transport construction or bind failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PluginError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Plugin capability kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Input,
    Output,
    Tunnel,
}

impl PluginKind {
    /// Configuration section name for this kind
    pub fn section(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Tunnel => "tunnel",
        }
    }
}

/// An inbound plugin: binds sockets and publishes onto the input channel.
#[async_trait]
pub trait InputPlugin: Send {
    /// Plugin name for logs
    fn name(&self) -> &'static str;

    /// Bind and start accepting; returns once listening
    async fn start(
        &mut self,
        input: Arc<PluginChannel>,
        output: Arc<PluginChannel>,
        cancel: &CancellationToken,
    ) -> Result<(), PluginError>;
}

/// An outbound plugin: subscribes to the output channel and owns a sink.
pub trait OutputPlugin: Send {
    /// Plugin name for logs
    fn name(&self) -> &'static str;

    /// Subscribe to the output channel and begin connecting
    fn start(&mut self, output: &PluginChannel) -> Result<(), PluginError>;

    /// Counters for the statistics reporter, if any
    fn reporter(&self) -> Option<Arc<dyn Reporter>> {
        None
    }

    /// Close the sink; part of the supervisor's shutdown hook
    fn close(&self);
}

/// A constructed plugin instance of either capability.
pub enum PluginInstance {
    Input(Box<dyn InputPlugin>),
    Output(Box<dyn OutputPlugin>),
}

/// Builds a plugin instance from one configuration entry.
pub type SetupFn = fn(&PluginConfig) -> Result<PluginInstance, PluginError>;

/// What one plugin can do.
#[derive(Clone, Copy)]
pub struct PluginDescriptor {
    /// Plugin name used in `type = "..."`
    pub name: &'static str,
    /// Input capability, if provided
    pub setup_input: Option<SetupFn>,
    /// Output capability, if provided
    pub setup_output: Option<SetupFn>,
    /// Tunnel capability, if provided (no built-in plugin carries one)
    pub setup_tunnel: Option<SetupFn>,
}

impl PluginDescriptor {
    /// Whether the plugin provides the given capability
    pub fn can(&self, kind: PluginKind) -> bool {
        self.setup(kind).is_some()
    }

    /// The setup function for a capability
    pub fn setup(&self, kind: PluginKind) -> Option<SetupFn> {
        match kind {
            PluginKind::Input => self.setup_input,
            PluginKind::Output => self.setup_output,
            PluginKind::Tunnel => self.setup_tunnel,
        }
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("input", &self.can(PluginKind::Input))
            .field("output", &self.can(PluginKind::Output))
            .field("tunnel", &self.can(PluginKind::Tunnel))
            .finish()
    }
}

/// Name-keyed table of loaded plugins.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: HashMap<&'static str, PluginDescriptor>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor
    pub fn register(&mut self, descriptor: PluginDescriptor) {
        self.plugins.insert(descriptor.name, descriptor);
    }

    /// Look up a plugin by name
    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(name)
    }

    /// Number of loaded plugins
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Descriptors sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        let mut descriptors: Vec<_> = self.plugins.values().collect();
        descriptors.sort_by_key(|d| d.name);
        descriptors.into_iter()
    }
}

/// One accepted configuration entry, ready to instantiate.
pub struct PluginSetup {
    /// Plugin name
    pub name: String,
    /// The entry's configuration
    pub config: PluginConfig,
    setup: SetupFn,
}

impl PluginSetup {
    /// Instantiate the plugin
    pub fn setup(&self) -> Result<PluginInstance, PluginError> {
        (self.setup)(&self.config)
    }
}

impl std::fmt::Debug for PluginSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSetup").field("name", &self.name).finish()
    }
}

/// Pair configuration entries with their setup functions.
///
/// Bad entries are logged and skipped so one broken block cannot keep the
/// rest of the daemon down.
pub fn load_plugins(
    registry: &PluginRegistry,
    kind: PluginKind,
    configs: &[PluginConfig],
) -> Vec<PluginSetup> {
    let mut setups = Vec::new();

    for (index, config) in configs.iter().enumerate() {
        let section = kind.section();

        let Some(name) = config.plugin_type.as_deref() else {
            tracing::error!(section, index, "plugin entry has no `type`, skipping");
            continue;
        };

        let Some(descriptor) = registry.get(name) else {
            tracing::error!(section, index, plugin = name, "unknown plugin, skipping");
            continue;
        };

        let Some(setup) = descriptor.setup(kind) else {
            tracing::error!(
                section,
                index,
                plugin = name,
                "plugin does not support this capability, skipping"
            );
            continue;
        };

        setups.push(PluginSetup {
            name: name.to_string(),
            config: config.clone(),
            setup,
        });
    }

    setups
}
