//! Core supervisor - boot order and shutdown
//!
//! Boots the daemon strictly bottom-up: channels, processors and the core
//! pipeline, plugin instances, then the event-loop attachments (dispatcher
//! subscription, reporters, binds, connects, statistics, debug monitors).
//! Runs until the shutdown token fires; teardown closes every connect
//! client and stops the channels, which walks their stopping callbacks.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ffwd_channel::PluginChannel;
use ffwd_config::Config;
use ffwd_metrics::Statistics;
use ffwd_processor::{Emitter, ProcessorError, ProcessorRegistry};

use crate::{
    load_plugins, ChannelMonitor, CoreEmitter, CoreProcessor, InputPlugin, OutputPlugin,
    PluginError, PluginInstance, PluginKind, PluginRegistry,
};

/// Fatal supervisor errors; anything here is construction-time
/// misconfiguration.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// A configured plugin failed to construct or bind
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// A processor failed to construct
    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

/// Boots and runs the daemon.
pub struct Supervisor {
    config: Config,
    plugins: PluginRegistry,
    processors: ProcessorRegistry,
}

impl Supervisor {
    /// Create a supervisor over loaded registries
    pub fn new(config: Config, plugins: PluginRegistry, processors: ProcessorRegistry) -> Self {
        Self {
            config,
            plugins,
            processors,
        }
    }

    /// Run until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), SupervisorError> {
        let output = Arc::new(PluginChannel::new("output"));
        let input = Arc::new(PluginChannel::new("input"));

        // Processors, emitter, dispatcher
        let mut processors = Vec::new();
        for name in self.processors.names() {
            let opts = self
                .config
                .processor_opts(name)
                .cloned()
                .unwrap_or_default();
            processors.push(self.processors.create(name, &opts)?);
        }
        let emitter = Arc::new(CoreEmitter::new(
            self.config.core.clone(),
            Arc::clone(&output),
        ));
        let core = Arc::new(CoreProcessor::new(
            processors,
            emitter as Arc<dyn Emitter>,
        ));

        // Plugin instances; setup failures are fatal, nothing else is
        let mut inputs: Vec<Box<dyn InputPlugin>> = Vec::new();
        for setup in load_plugins(&self.plugins, PluginKind::Input, &self.config.input) {
            match setup.setup()? {
                PluginInstance::Input(plugin) => inputs.push(plugin),
                PluginInstance::Output(_) => {
                    tracing::error!(plugin = %setup.name, "input setup produced an output plugin");
                }
            }
        }
        let mut outputs: Vec<Box<dyn OutputPlugin>> = Vec::new();
        for setup in load_plugins(&self.plugins, PluginKind::Output, &self.config.output) {
            match setup.setup()? {
                PluginInstance::Output(plugin) => outputs.push(plugin),
                PluginInstance::Input(_) => {
                    tracing::error!(plugin = %setup.name, "output setup produced an input plugin");
                }
            }
        }

        let cancel = CancellationToken::new();

        // Event loop attachments, in order
        core.start(&input, &cancel);

        let mut statistics = Statistics::new(self.config.report_interval());
        for reporter in core.reporters() {
            statistics.register(reporter);
        }
        for plugin in &outputs {
            if let Some(reporter) = plugin.reporter() {
                statistics.register(reporter);
            }
        }
        tracing::info!(reporters = statistics.reporter_count(), "reporters collected");

        for plugin in &mut inputs {
            tracing::info!(plugin = plugin.name(), "starting input plugin");
            plugin
                .start(Arc::clone(&input), Arc::clone(&output), &cancel)
                .await?;
        }
        for plugin in &mut outputs {
            tracing::info!(plugin = plugin.name(), "starting output plugin");
            plugin.start(&output)?;
        }

        if let Some(statistics_config) = &self.config.statistics {
            statistics.emit_to(Arc::clone(&input), statistics_config.prefix.clone());
        }

        let _monitors = self.config.debug.as_ref().map(|_| {
            tracing::info!("attaching debug channel monitors");
            (ChannelMonitor::attach(&input), ChannelMonitor::attach(&output))
        });

        tokio::spawn(statistics.run(cancel.clone()));

        input.start();
        output.start();

        tracing::info!(
            inputs = inputs.len(),
            outputs = outputs.len(),
            processors = core.processor_count(),
            "ffwd running"
        );

        shutdown.cancelled().await;
        tracing::info!("shutting down");

        for plugin in &outputs {
            plugin.close();
        }
        cancel.cancel();
        input.stop();
        output.stop();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_empty_config_boots_and_stops() {
        let config = Config::from_toml("").unwrap();
        let supervisor = Supervisor::new(config, PluginRegistry::new(), ProcessorRegistry::builtin());

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        supervisor.run(shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_processor_opts_are_fatal() {
        let config = Config::from_toml(
            r#"
[processor_opts.count]
cache_limit = "lots"
"#,
        )
        .unwrap();
        let supervisor = Supervisor::new(config, PluginRegistry::new(), ProcessorRegistry::builtin());

        let result = supervisor.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(SupervisorError::Processor(_))));
    }

    #[tokio::test]
    async fn test_unknown_plugin_entries_are_skipped() {
        // An unknown output plugin is logged and skipped, not fatal
        let config = Config::from_toml(
            r#"
[[output]]
type = "mystery"
host = "127.0.0.1"
port = 1
"#,
        )
        .unwrap();
        let supervisor = Supervisor::new(config, PluginRegistry::new(), ProcessorRegistry::builtin());

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        supervisor.run(shutdown).await.unwrap();
    }
}
