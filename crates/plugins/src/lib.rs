//! FFWD built-in plugins
//!
//! - `carbon` - input (line server over tcp/unix+tcp, datagram server over
//!   udp/unix+udp) and output (carbon plaintext sink)
//! - `json` - output (JSON-lines sink)
//!
//! [`builtin_registry`] assembles the descriptor table the supervisor loads
//! from; it is built once at startup and immutable afterwards.

pub mod carbon;
pub mod json;

use ffwd_core::{PluginDescriptor, PluginRegistry};

/// The built-in plugin table.
pub fn builtin_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register(PluginDescriptor {
        name: "carbon",
        setup_input: Some(carbon::setup_input),
        setup_output: Some(carbon::setup_output),
        setup_tunnel: None,
    });
    registry.register(PluginDescriptor {
        name: "json",
        setup_input: None,
        setup_output: Some(json::setup_output),
        setup_tunnel: None,
    });
    registry
}

#[cfg(test)]
mod tests {
    use ffwd_core::PluginKind;

    use super::*;

    #[test]
    fn test_builtin_capabilities() {
        let registry = builtin_registry();

        let carbon = registry.get("carbon").unwrap();
        assert!(carbon.can(PluginKind::Input));
        assert!(carbon.can(PluginKind::Output));
        assert!(!carbon.can(PluginKind::Tunnel));

        let json = registry.get("json").unwrap();
        assert!(!json.can(PluginKind::Input));
        assert!(json.can(PluginKind::Output));

        assert!(registry.get("statsd").is_none());
    }
}
