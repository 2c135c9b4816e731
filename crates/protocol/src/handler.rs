//! Handler contract - outbound serialization
//!
//! A [`Handler`] turns events and metrics into the byte form a downstream
//! sink speaks. Connect clients hold one handler and never know the wire
//! syntax themselves; streaming mode uses the per-item methods, buffered
//! mode uses [`Handler::serialize_batch`].

use bytes::Bytes;
use serde::Serialize;

use crate::{carbon, Event, Metric, ProtocolError};

/// Serializes events and metrics into bytes for a transport.
pub trait Handler: Send + Sync {
    /// Handler name, used in log context and reporter ids
    fn name(&self) -> &'static str;

    /// Serialize a single event
    fn serialize_event(&self, event: &Event) -> Result<Bytes, ProtocolError>;

    /// Serialize a single metric
    fn serialize_metric(&self, metric: &Metric) -> Result<Bytes, ProtocolError>;

    /// Serialize a batch of events and metrics as one write.
    ///
    /// Within the batch, event order and metric order are each preserved;
    /// how the two interleave is up to the format.
    fn serialize_batch(&self, events: &[Event], metrics: &[Metric]) -> Result<Bytes, ProtocolError>;
}

/// JSON-lines handler: one JSON object per record, newline-terminated,
/// with a `type` discriminator field.
#[derive(Debug, Default)]
pub struct JsonHandler;

#[derive(Serialize)]
struct Tagged<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    record: &'a T,
}

impl JsonHandler {
    fn line<T: Serialize>(kind: &'static str, record: &T) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = serde_json::to_vec(&Tagged { kind, record })?;
        buf.push(b'\n');
        Ok(buf)
    }
}

impl Handler for JsonHandler {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize_event(&self, event: &Event) -> Result<Bytes, ProtocolError> {
        Ok(Self::line("event", event)?.into())
    }

    fn serialize_metric(&self, metric: &Metric) -> Result<Bytes, ProtocolError> {
        Ok(Self::line("metric", metric)?.into())
    }

    fn serialize_batch(&self, events: &[Event], metrics: &[Metric]) -> Result<Bytes, ProtocolError> {
        let mut buf = Vec::new();
        for event in events {
            buf.extend_from_slice(&Self::line("event", event)?);
        }
        for metric in metrics {
            buf.extend_from_slice(&Self::line("metric", metric)?);
        }
        Ok(buf.into())
    }
}

/// Carbon plaintext handler.
///
/// Carbon has no event representation; serializing an event is an error and
/// the client's error path drops it.
#[derive(Debug, Default)]
pub struct CarbonHandler;

impl Handler for CarbonHandler {
    fn name(&self) -> &'static str {
        "carbon"
    }

    fn serialize_event(&self, event: &Event) -> Result<Bytes, ProtocolError> {
        Err(ProtocolError::Unsupported(format!(
            "carbon cannot carry events ({})",
            event.key
        )))
    }

    fn serialize_metric(&self, metric: &Metric) -> Result<Bytes, ProtocolError> {
        Ok(carbon::format_line(metric).into_bytes().into())
    }

    fn serialize_batch(&self, events: &[Event], metrics: &[Metric]) -> Result<Bytes, ProtocolError> {
        if !events.is_empty() {
            return Err(ProtocolError::Unsupported(format!(
                "carbon cannot carry events ({} batched)",
                events.len()
            )));
        }
        let mut buf = String::new();
        for metric in metrics {
            buf.push_str(&carbon::format_line(metric));
        }
        Ok(buf.into_bytes().into())
    }
}
