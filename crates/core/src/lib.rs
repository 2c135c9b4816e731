//! FFWD core - the pipeline between input and output
//!
//! Inbound records land on the input channel; the [`CoreProcessor`] routes
//! metrics through their named processor (or straight through), the
//! [`CoreEmitter`] stamps configured defaults, and everything is republished
//! on the output channel where the connect clients listen.
//!
//! The [`PluginRegistry`] and loader turn configuration entries into typed
//! plugin instances, and the [`Supervisor`] boots the whole daemon in
//! dependency order and tears it down again.

mod dispatch;
mod emitter;
mod loader;
mod monitor;
mod supervisor;

pub use dispatch::CoreProcessor;
pub use emitter::CoreEmitter;
pub use loader::{
    load_plugins, InputPlugin, OutputPlugin, PluginDescriptor, PluginError, PluginInstance,
    PluginKind, PluginRegistry, PluginSetup, SetupFn,
};
pub use monitor::ChannelMonitor;
pub use supervisor::{Supervisor, SupervisorError};
