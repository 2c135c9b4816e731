//! json plugin
//!
//! Output side only: a connect client rendering events and metrics as
//! newline-delimited JSON objects with a `type` discriminator.

use std::sync::Arc;

use ffwd_channel::PluginChannel;
use ffwd_config::PluginConfig;
use ffwd_core::{OutputPlugin, PluginError, PluginInstance};
use ffwd_metrics::Reporter;
use ffwd_protocol::JsonHandler;
use ffwd_transport::{ConnectClient, ConnectConfig, Peer, ProtocolRegistry};

/// Build the json output plugin from a config entry
pub fn setup_output(config: &PluginConfig) -> Result<PluginInstance, PluginError> {
    let registry = ProtocolRegistry::builtin();
    let peer = Peer::from_config(&registry, config)?;
    let client = ConnectClient::new(
        peer,
        Arc::new(JsonHandler),
        ConnectConfig::from_plugin_config(config),
    )?;
    Ok(PluginInstance::Output(Box::new(JsonOutputPlugin { client })))
}

struct JsonOutputPlugin {
    client: ConnectClient,
}

impl OutputPlugin for JsonOutputPlugin {
    fn name(&self) -> &'static str {
        "json"
    }

    fn start(&mut self, output: &PluginChannel) -> Result<(), PluginError> {
        self.client.start(output);
        Ok(())
    }

    fn reporter(&self) -> Option<Arc<dyn Reporter>> {
        Some(self.client.reporter())
    }

    fn close(&self) {
        self.client.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_output_builds_client() {
        let config = PluginConfig {
            plugin_type: Some("json".into()),
            host: Some("127.0.0.1".into()),
            port: Some(19000),
            ..Default::default()
        };
        assert!(matches!(
            setup_output(&config).unwrap(),
            PluginInstance::Output(_)
        ));
    }

    #[test]
    fn test_setup_output_missing_port_fails() {
        let config = PluginConfig {
            plugin_type: Some("json".into()),
            host: Some("127.0.0.1".into()),
            ..Default::default()
        };
        assert!(setup_output(&config).is_err());
    }
}
