//! In-process registry of running bulk dispatches

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::info;
use zapcast_common::types::CampaignId;

/// Cancellation handles of the dispatches running in this process
#[derive(Debug, Default)]
pub struct DispatchRegistry {
    runs: Mutex<HashMap<CampaignId, CancellationToken>>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<CampaignId, CancellationToken>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a run. Returns `None` if this process already runs the
    /// campaign. The entry is removed when the returned guard drops.
    pub fn register(self: &Arc<Self>, campaign_id: CampaignId) -> Option<RegisteredRun> {
        let mut runs = self.runs();
        if runs.contains_key(&campaign_id) {
            return None;
        }

        let token = CancellationToken::new();
        runs.insert(campaign_id, token.clone());

        Some(RegisteredRun {
            registry: Arc::clone(self),
            campaign_id,
            token,
        })
    }

    /// Signal a running dispatch to stop. Returns `false` if the campaign
    /// is not running in this process.
    pub fn cancel(&self, campaign_id: CampaignId) -> bool {
        match self.runs().get(&campaign_id) {
            Some(token) => {
                info!("Cancellation requested for campaign {}", campaign_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, campaign_id: CampaignId) -> bool {
        self.runs().contains_key(&campaign_id)
    }

    /// Campaigns currently dispatching in this process
    pub fn running(&self) -> Vec<CampaignId> {
        self.runs().keys().copied().collect()
    }
}

/// A registered run; unregisters itself on drop
#[derive(Debug)]
pub struct RegisteredRun {
    registry: Arc<DispatchRegistry>,
    campaign_id: CampaignId,
    token: CancellationToken,
}

impl RegisteredRun {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RegisteredRun {
    fn drop(&mut self) {
        self.registry.runs().remove(&self.campaign_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_register_cancel_and_drop() {
        let registry = Arc::new(DispatchRegistry::new());
        let id = Uuid::new_v4();

        let run = registry.register(id).unwrap();
        assert!(registry.is_running(id));
        assert!(registry.register(id).is_none());
        assert_eq!(registry.running(), vec![id]);

        assert!(registry.cancel(id));
        assert!(run.token().is_cancelled());

        drop(run);
        assert!(!registry.is_running(id));
        assert!(!registry.cancel(id));
        assert!(registry.register(id).is_some());
    }
}
