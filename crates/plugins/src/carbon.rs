//! carbon plugin
//!
//! Input side: a line server speaking the carbon plaintext protocol,
//! `"<path> <value> <timestamp>\n"`, over any bindable protocol family.
//! Malformed lines are logged and dropped by the transport; well-formed
//! lines land on the input channel as metrics.
//!
//! Output side: a connect client rendering metrics back into carbon lines
//! (events have no carbon form and are dropped by the handler contract).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use ffwd_channel::PluginChannel;
use ffwd_config::PluginConfig;
use ffwd_core::{InputPlugin, OutputPlugin, PluginError, PluginInstance};
use ffwd_metrics::Reporter;
use ffwd_protocol::{carbon, CarbonHandler, ProtocolError};
use ffwd_transport::{
    BindEndpoint, BindServer, ConnectClient, ConnectConfig, DatagramServer, FrameDecoder,
    LineConnectionFactory, Peer, ProtocolRegistry, RetryConfig,
};

/// Build the carbon input plugin from a config entry
pub fn setup_input(config: &PluginConfig) -> Result<PluginInstance, PluginError> {
    Ok(PluginInstance::Input(Box::new(CarbonInputPlugin {
        config: config.clone(),
    })))
}

/// Build the carbon output plugin from a config entry
pub fn setup_output(config: &PluginConfig) -> Result<PluginInstance, PluginError> {
    let registry = ProtocolRegistry::builtin();
    let peer = Peer::from_config(&registry, config)?;
    let client = ConnectClient::new(
        peer,
        Arc::new(CarbonHandler),
        ConnectConfig::from_plugin_config(config),
    )?;
    Ok(PluginInstance::Output(Box::new(CarbonOutputPlugin {
        client,
    })))
}

/// Parses carbon lines onto the input channel.
pub struct CarbonDecoder {
    input: Arc<PluginChannel>,
}

impl CarbonDecoder {
    /// Create a decoder publishing onto `input`
    pub fn new(input: Arc<PluginChannel>) -> Self {
        Self { input }
    }
}

impl FrameDecoder for CarbonDecoder {
    fn name(&self) -> &'static str {
        "carbon"
    }

    fn decode_line(&self, line: &str) -> Result<(), ProtocolError> {
        let metric = carbon::parse_line(line)?;
        self.input.metric.publish(&metric);
        Ok(())
    }
}

struct CarbonInputPlugin {
    config: PluginConfig,
}

#[async_trait]
impl InputPlugin for CarbonInputPlugin {
    fn name(&self) -> &'static str {
        "carbon"
    }

    async fn start(
        &mut self,
        input: Arc<PluginChannel>,
        _output: Arc<PluginChannel>,
        cancel: &CancellationToken,
    ) -> Result<(), PluginError> {
        let registry = ProtocolRegistry::builtin();
        let endpoint = BindEndpoint::from_config(&registry, &self.config)?;
        let decoder = Arc::new(CarbonDecoder::new(input));
        let retry = RetryConfig {
            timeout: self.config.bind_timeout.map(Duration::from_secs),
            ..Default::default()
        };

        if endpoint.family().is_datagram() {
            DatagramServer::new(endpoint, decoder, retry)
                .start(cancel.clone())
                .await?;
        } else {
            BindServer::new(endpoint, Arc::new(LineConnectionFactory::new(decoder)), retry)
                .start(cancel.clone())
                .await?;
        }
        Ok(())
    }
}

struct CarbonOutputPlugin {
    client: ConnectClient,
}

impl OutputPlugin for CarbonOutputPlugin {
    fn name(&self) -> &'static str {
        "carbon"
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
