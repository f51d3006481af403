//! Kubernetes-backed [`InventorySource`]

use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, ListParams};
use kube::Client;

use super::{slice_key, BackingInstance, InventorySource};
use crate::crd::{SharedService, SharedServiceSlice};
use crate::deadline::with_deadline;
use crate::Error;

/// Reads candidate instances from SharedServices and holders from slices
pub struct KubeInventory {
    client: Client,
    namespace: String,
    default_capacity: u32,
    timeout: Duration,
}

impl KubeInventory {
    /// Create an inventory over `namespace`
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        default_capacity: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            default_capacity,
            timeout,
        }
    }
}

/// Ready SharedServices of `service_type` as backing instances, sorted by name
pub(crate) fn backing_instances(
    services: &[SharedService],
    service_type: &str,
    default_capacity: u32,
) -> Vec<BackingInstance> {
    let mut instances: Vec<_> = services
        .iter()
        .filter(|s| s.service_type() == service_type)
        .filter_map(|s| {
            let status = s.status.as_ref().filter(|st| st.ready)?;
            let instance_ref = status.instance_ref.clone().filter(|r| !r.is_empty())?;
            Some(BackingInstance {
                instance_ref,
                capacity: s.spec.capacity.unwrap_or(default_capacity),
            })
        })
        .collect();
    instances.sort_by(|a, b| a.instance_ref.cmp(&b.instance_ref));
    instances
}

#[async_trait]
impl InventorySource for KubeInventory {
    async fn candidates(&self, service_type: &str) -> Result<Vec<BackingInstance>, Error> {
        let api: Api<SharedService> = Api::namespaced(self.client.clone(), &self.namespace);
        let list = with_deadline(
            self.timeout,
            "list shared services",
            api.list(&ListParams::default()),
        )
        .await?;
        Ok(backing_instances(
            &list.items,
            service_type,
            self.default_capacity,
        ))
    }

    async fn holders(&self, instance_ref: &str) -> Result<Vec<String>, Error> {
        let api: Api<SharedServiceSlice> = Api::namespaced(self.client.clone(), &self.namespace);
        let list = with_deadline(
            self.timeout,
            "list shared service slices",
            api.list(&ListParams::default()),
        )
        .await?;
        Ok(list
            .items
            .iter()
            .filter(|slice| {
                slice
                    .status
                    .as_ref()
                    .and_then(|s| s.shared_instance())
                    == Some(instance_ref)
            })
            .map(slice_key)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Phase, SharedServiceSpec, SharedServiceStatus};

    fn service(name: &str, class: &str, ready: bool, capacity: Option<u32>) -> SharedService {
        let mut s = SharedService::new(
            name,
            SharedServiceSpec {
                image: "img".to_string(),
                class_external_name: class.to_string(),
                capacity,
                ..Default::default()
            },
        );
        s.status = Some(
            SharedServiceStatus::with_phase(if ready { Phase::Complete } else { Phase::Provisioning })
                .instance_ref(format!("{}-inst", name))
                .ready(ready),
        );
        s
    }

    #[test]
    fn test_only_ready_services_of_matching_type_are_candidates() {
        let services = vec![
            service("kc-b", "keycloak", true, Some(3)),
            service("kc-a", "keycloak", true, None),
            service("kc-c", "keycloak", false, None),
            service("redis", "redis", true, None),
        ];
        let candidates = backing_instances(&services, "keycloak", 10);
        assert_eq!(
            candidates,
            vec![
                BackingInstance {
                    instance_ref: "kc-a-inst".to_string(),
                    capacity: 10
                },
                BackingInstance {
                    instance_ref: "kc-b-inst".to_string(),
                    capacity: 3
                },
            ]
        );
    }

    #[test]
    fn test_service_without_instance_ref_is_skipped() {
        let mut s = service("kc-a", "keycloak", true, None);
        if let Some(status) = s.status.as_mut() {
            status.instance_ref = None;
        }
        assert!(backing_instances(&[s], "keycloak", 10).is_empty());
    }
}
