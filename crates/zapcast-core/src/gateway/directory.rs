//! Resolves instance ids to gateway targets

use super::GatewayTarget;
use std::sync::Arc;
use zapcast_common::config::GatewayConfig;
use zapcast_common::types::InstanceId;
use zapcast_common::{Error, Result};
use zapcast_storage::InstanceDirectory;

/// Combines instance rows with the configured gateway defaults
#[derive(Clone)]
pub struct GatewayDirectory {
    instances: Arc<dyn InstanceDirectory>,
    defaults: GatewayConfig,
}

impl GatewayDirectory {
    pub fn new(instances: Arc<dyn InstanceDirectory>, defaults: GatewayConfig) -> Self {
        Self {
            instances,
            defaults,
        }
    }

    /// Resolve where messages for `instance_id` are submitted.
    ///
    /// Fails with [`Error::Config`] when the instance does not exist or
    /// neither the instance nor the defaults provide a URL and API key.
    pub async fn resolve(&self, instance_id: InstanceId) -> Result<GatewayTarget> {
        let instance = self
            .instances
            .instance(instance_id)
            .await?
            .ok_or_else(|| Error::Config(format!("Instance {} not found", instance_id)))?;

        let base_url = pick(instance.api_url.as_deref(), self.defaults.url.as_deref())
            .ok_or_else(|| Error::Config("Gateway URL is not configured".to_string()))?;
        let api_key = pick(instance.api_key.as_deref(), self.defaults.api_key.as_deref())
            .ok_or_else(|| Error::Config("Gateway API key is not configured".to_string()))?;

        Ok(GatewayTarget {
            base_url,
            api_key,
            instance_name: instance.instance_name,
        })
    }
}

fn pick(own: Option<&str>, fallback: Option<&str>) -> Option<String> {
    own.map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| fallback.map(str::trim).filter(|v| !v.is_empty()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use uuid::Uuid;
    use zapcast_storage::models::Instance;

    struct StaticInstances(HashMap<InstanceId, Instance>);

    #[async_trait]
    impl InstanceDirectory for StaticInstances {
        async fn instance(&self, id: InstanceId) -> Result<Option<Instance>> {
            Ok(self.0.get(&id).cloned())
        }
    }

    fn instance(api_url: Option<&str>, api_key: Option<&str>) -> Instance {
        Instance {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            instance_name: "vendas".to_string(),
            api_url: api_url.map(str::to_string),
            api_key: api_key.map(str::to_string),
            phone_number: None,
            status: "active".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn directory(instance: &Instance, defaults: GatewayConfig) -> GatewayDirectory {
        let map = HashMap::from([(instance.id, instance.clone())]);
        GatewayDirectory::new(Arc::new(StaticInstances(map)), defaults)
    }

    fn defaults() -> GatewayConfig {
        GatewayConfig {
            url: Some("https://gw.example.com".to_string()),
            api_key: Some("global".to_string()),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_instance_values_override_defaults() {
        let inst = instance(Some("https://own.example.com"), Some("own-key"));
        let target = directory(&inst, defaults()).resolve(inst.id).await.unwrap();
        assert_eq!(
            target,
            GatewayTarget {
                base_url: "https://own.example.com".to_string(),
                api_key: "own-key".to_string(),
                instance_name: "vendas".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_defaults() {
        let inst = instance(None, Some(" "));
        let target = directory(&inst, defaults()).resolve(inst.id).await.unwrap();
        assert_eq!(target.base_url, "https://gw.example.com");
        assert_eq!(target.api_key, "global");
    }

    #[tokio::test]
    async fn test_missing_configuration() {
        let inst = instance(None, None);
        let dir = directory(&inst, GatewayConfig::default());

        let err = dir.resolve(inst.id).await.unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("URL")));

        let err = dir.resolve(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("not found")));
    }
}
