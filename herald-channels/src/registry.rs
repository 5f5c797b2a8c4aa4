//! Process-wide channel registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::{ChannelAdapter, ChannelError, Result};
use herald_core::ChannelKind;

/// Maps channel names to adapter instances within a worker process.
///
/// Mutation is expected only during worker startup; afterwards the
/// registry is effectively read-only and lookups are cheap clones of the
/// adapter handle.
pub struct ChannelRegistry {
    adapters: RwLock<HashMap<ChannelKind, Arc<dyn ChannelAdapter>>>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Register an adapter under its channel.
    ///
    /// Re-registration overwrites the previous adapter and logs a warning.
    pub fn register(&self, adapter: Arc<dyn ChannelAdapter>) {
        let kind = adapter.kind();
        let mut adapters = self.adapters.write().unwrap();
        if adapters.insert(kind, adapter).is_some() {
            warn!(component = "registry", channel = %kind, "channel re-registered, replacing adapter");
        } else {
            debug!(component = "registry", channel = %kind, "channel registered");
        }
    }

    /// Resolve the adapter for a channel.
    pub fn get(&self, kind: ChannelKind) -> Result<Arc<dyn ChannelAdapter>> {
        self.adapters
            .read()
            .unwrap()
            .get(&kind)
            .cloned()
            .ok_or_else(|| ChannelError::UnknownChannel(kind.to_string()))
    }

    /// Remove an adapter. Returns whether one was registered.
    pub fn unregister(&self, kind: ChannelKind) -> bool {
        self.adapters.write().unwrap().remove(&kind).is_some()
    }

    /// Channels with a registered adapter.
    pub fn list(&self) -> Vec<ChannelKind> {
        self.adapters.read().unwrap().keys().copied().collect()
    }

    /// Remove all adapters. Test-only.
    pub fn clear(&self) {
        self.adapters.write().unwrap().clear();
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use herald_core::{MessageMeta, SendOutcome};

    struct FakeAdapter {
        kind: ChannelKind,
        tag: &'static str,
    }

    #[async_trait]
    impl ChannelAdapter for FakeAdapter {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn send(&self, recipients: &[String], _metas: &[MessageMeta]) -> Vec<SendOutcome> {
            recipients
                .iter()
                .map(|r| SendOutcome::success(r, serde_json::json!(self.tag)))
                .collect()
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(FakeAdapter {
            kind: ChannelKind::Telegram,
            tag: "a",
        }));

        assert!(registry.get(ChannelKind::Telegram).is_ok());
        assert!(registry.get(ChannelKind::Email).is_err());
    }

    #[test]
    fn test_unknown_channel_error() {
        let registry = ChannelRegistry::new();
        let err = match registry.get(ChannelKind::Web) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(err.to_string().contains("web"));
    }

    #[tokio::test]
    async fn test_reregistration_wins() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(FakeAdapter {
            kind: ChannelKind::Telegram,
            tag: "first",
        }));
        registry.register(Arc::new(FakeAdapter {
            kind: ChannelKind::Telegram,
            tag: "second",
        }));

        let adapter = registry.get(ChannelKind::Telegram).unwrap();
        let outcomes = adapter.send(&["x".to_string()], &[]).await;
        assert_eq!(outcomes[0].response, Some(serde_json::json!("second")));
    }

    #[test]
    fn test_unregister_and_list() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(FakeAdapter {
            kind: ChannelKind::Telegram,
            tag: "a",
        }));
        registry.register(Arc::new(FakeAdapter {
            kind: ChannelKind::Web,
            tag: "b",
        }));

        let mut listed = registry.list();
        listed.sort_by_key(|k| k.as_str());
        assert_eq!(listed, vec![ChannelKind::Telegram, ChannelKind::Web]);

        assert!(registry.unregister(ChannelKind::Web));
        assert!(!registry.unregister(ChannelKind::Web));
        assert_eq!(registry.list(), vec![ChannelKind::Telegram]);
    }

    #[test]
    fn test_clear() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(FakeAdapter {
            kind: ChannelKind::Telegram,
            tag: "a",
        }));

        registry.clear();
        assert!(registry.list().is_empty());
    }
}
