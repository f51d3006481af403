//! Capacity allocation of slices onto shared instances
//!
//! Every ready SharedService is a backing instance that accepts up to its
//! capacity in slices. The allocator keeps a ledger of which slices hold a
//! place on each instance. All allocations go through one async mutex, so two
//! concurrent reconciles can never both take the last free place.
//!
//! The ledger for an instance is seeded from the slices that already
//! reference it the first time the instance is considered. This makes an
//! operator restart pick up existing allocations.

mod inventory;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
#[cfg(test)]
use mockall::automock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::crd::SharedServiceSlice;
use crate::provisioning::ProvisioningClient;
use crate::Error;

pub use inventory::KubeInventory;

/// A shared instance slices can be allocated onto
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackingInstance {
    /// ServiceInstance name of the shared instance
    pub instance_ref: String,
    /// Maximum number of slices
    pub capacity: u32,
}

/// Source of candidate instances and their current holders
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Ready shared instances serving `service_type`
    async fn candidates(&self, service_type: &str) -> Result<Vec<BackingInstance>, Error>;

    /// Keys of slices whose status already references `instance_ref`
    async fn holders(&self, instance_ref: &str) -> Result<Vec<String>, Error>;
}

/// Ledger key for a slice
pub fn slice_key(slice: &SharedServiceSlice) -> String {
    format!(
        "{}/{}",
        slice.namespace().unwrap_or_default(),
        slice.name_any()
    )
}

/// Allocates slices onto shared instances without exceeding capacity
pub struct CapacityAllocator {
    inventory: Arc<dyn InventorySource>,
    provisioning: Arc<dyn ProvisioningClient>,
    namespace: String,
    fallback: Option<String>,
    ledger: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl CapacityAllocator {
    /// Create an allocator over the given inventory
    ///
    /// When `fallback` is set every allocation returns it after checking the
    /// instance exists in `namespace`; capacity is not tracked.
    pub fn new(
        inventory: Arc<dyn InventorySource>,
        provisioning: Arc<dyn ProvisioningClient>,
        namespace: impl Into<String>,
        fallback: Option<String>,
    ) -> Self {
        Self {
            inventory,
            provisioning,
            namespace: namespace.into(),
            fallback,
            ledger: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a place for `slice_key` on an instance of `service_type`
    ///
    /// Idempotent per slice: a slice that already holds a place gets the
    /// same instance back.
    pub async fn allocate(&self, slice_key: &str, service_type: &str) -> Result<String, Error> {
        if let Some(fallback) = &self.fallback {
            return self.allocate_fallback(fallback).await;
        }

        let candidates = self.inventory.candidates(service_type).await?;
        let mut ledger = self.ledger.lock().await;

        for candidate in &candidates {
            if !ledger.contains_key(&candidate.instance_ref) {
                let holders = self.inventory.holders(&candidate.instance_ref).await?;
                debug!(
                    instance = %candidate.instance_ref,
                    holders = holders.len(),
                    "Seeded capacity ledger"
                );
                ledger.insert(candidate.instance_ref.clone(), holders.into_iter().collect());
            }
        }

        if let Some(held) = candidates.iter().find(|c| {
            ledger
                .get(&c.instance_ref)
                .is_some_and(|holders| holders.contains(slice_key))
        }) {
            return Ok(held.instance_ref.clone());
        }

        for candidate in &candidates {
            let Some(holders) = ledger.get_mut(&candidate.instance_ref) else {
                continue;
            };
            if holders.len() < candidate.capacity as usize {
                holders.insert(slice_key.to_string());
                info!(
                    slice = %slice_key,
                    instance = %candidate.instance_ref,
                    used = holders.len(),
                    capacity = candidate.capacity,
                    "Allocated slice onto shared instance"
                );
                return Ok(candidate.instance_ref.clone());
            }
        }

        Err(Error::capacity_exhausted(service_type))
    }

    /// Give back the place `slice_key` holds on `instance_ref`
    ///
    /// Returns whether a place was actually held.
    pub async fn release(&self, slice_key: &str, instance_ref: &str) -> bool {
        let mut ledger = self.ledger.lock().await;
        let released = ledger
            .get_mut(instance_ref)
            .is_some_and(|holders| holders.remove(slice_key));
        if released {
            info!(slice = %slice_key, instance = %instance_ref, "Released shared instance capacity");
        }
        released
    }

    /// Give back whatever place `slice_key` holds, on any instance
    ///
    /// Covers slices that were allocated but never recorded the instance
    /// in their status.
    pub async fn release_slice(&self, slice_key: &str) -> bool {
        let mut ledger = self.ledger.lock().await;
        let mut released = false;
        for (instance_ref, holders) in ledger.iter_mut() {
            if holders.remove(slice_key) {
                info!(slice = %slice_key, instance = %instance_ref, "Released shared instance capacity");
                released = true;
            }
        }
        released
    }

    /// Number of places held on `instance_ref`, if the ledger knows it
    pub async fn usage(&self, instance_ref: &str) -> Option<usize> {
        self.ledger.lock().await.get(instance_ref).map(BTreeSet::len)
    }

    async fn allocate_fallback(&self, fallback: &str) -> Result<String, Error> {
        match self.provisioning.get_instance(&self.namespace, fallback).await? {
            Some(_) => {
                debug!(instance = %fallback, "Using shared instance override");
                Ok(fallback.to_string())
            }
            None => Err(Error::validation(format!(
                "shared instance override '{}' does not exist in namespace {}",
                fallback, self.namespace
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ServiceInstance, ServiceInstanceSpec};
    use crate::provisioning::MockProvisioningClient;
    use mockall::predicate::*;

    fn backing(name: &str, capacity: u32) -> BackingInstance {
        BackingInstance {
            instance_ref: name.to_string(),
            capacity,
        }
    }

    fn allocator_over(candidates: Vec<BackingInstance>, holders: Vec<String>) -> CapacityAllocator {
        let mut inventory = MockInventorySource::new();
        inventory
            .expect_candidates()
            .returning(move |_| Ok(candidates.clone()));
        inventory
            .expect_holders()
            .returning(move |_| Ok(holders.clone()));
        CapacityAllocator::new(
            Arc::new(inventory),
            Arc::new(MockProvisioningClient::new()),
            "mobile",
            None,
        )
    }

    // =========================================================================
    // Allocation Stories
    // =========================================================================

    /// Story: a new slice lands on the first instance with room
    #[tokio::test]
    async fn story_first_instance_with_room_is_chosen() {
        let allocator = allocator_over(vec![backing("kc-a", 1), backing("kc-b", 2)], vec![]);

        assert_eq!(allocator.allocate("mobile/t1", "keycloak").await.unwrap(), "kc-a");
        assert_eq!(allocator.allocate("mobile/t2", "keycloak").await.unwrap(), "kc-b");
        assert_eq!(allocator.allocate("mobile/t3", "keycloak").await.unwrap(), "kc-b");

        let err = allocator.allocate("mobile/t4", "keycloak").await.unwrap_err();
        assert!(matches!(err, Error::CapacityExhausted { .. }));
        assert_eq!(allocator.usage("kc-a").await, Some(1));
        assert_eq!(allocator.usage("kc-b").await, Some(2));
    }

    /// Story: reconciling the same slice again does not consume more capacity
    #[tokio::test]
    async fn story_allocation_is_idempotent_per_slice() {
        let allocator = allocator_over(vec![backing("kc-a", 1)], vec![]);

        let first = allocator.allocate("mobile/t1", "keycloak").await.unwrap();
        let second = allocator.allocate("mobile/t1", "keycloak").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(allocator.usage("kc-a").await, Some(1));
    }

    /// Story: after a restart, existing slices still count against capacity
    #[tokio::test]
    async fn story_ledger_is_seeded_from_existing_slices() {
        let allocator = allocator_over(
            vec![backing("kc-a", 2)],
            vec!["mobile/old-1".to_string(), "mobile/old-2".to_string()],
        );

        let err = allocator.allocate("mobile/new", "keycloak").await.unwrap_err();
        assert!(matches!(err, Error::CapacityExhausted { .. }));

        let reused = allocator.allocate("mobile/old-1", "keycloak").await.unwrap();
        assert_eq!(reused, "kc-a");
    }

    /// Story: two slices race for the last place and only one wins
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn story_concurrent_allocations_never_overbook() {
        let allocator = Arc::new(allocator_over(
            vec![backing("kc-a", 2)],
            vec!["mobile/existing".to_string()],
        ));

        let a = {
            let allocator = allocator.clone();
            tokio::spawn(async move { allocator.allocate("mobile/t1", "keycloak").await })
        };
        let b = {
            let allocator = allocator.clone();
            tokio::spawn(async move { allocator.allocate("mobile/t2", "keycloak").await })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!(
            [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(),
            1,
            "exactly one allocation must win the last place"
        );
        assert_eq!(allocator.usage("kc-a").await, Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_concurrent_allocations_respect_capacity() {
        let allocator = Arc::new(allocator_over(vec![backing("kc-a", 5)], vec![]));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let allocator = allocator.clone();
                tokio::spawn(async move {
                    allocator
                        .allocate(&format!("mobile/t{}", i), "keycloak")
                        .await
                })
            })
            .collect();

        let mut won = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                won += 1;
            }
        }
        assert_eq!(won, 5);
        assert_eq!(allocator.usage("kc-a").await, Some(5));
    }

    #[tokio::test]
    async fn test_release_frees_a_place() {
        let allocator = allocator_over(vec![backing("kc-a", 1)], vec![]);
        allocator.allocate("mobile/t1", "keycloak").await.unwrap();

        assert!(allocator.release("mobile/t1", "kc-a").await);
        assert!(!allocator.release("mobile/t1", "kc-a").await);

        assert_eq!(allocator.allocate("mobile/t2", "keycloak").await.unwrap(), "kc-a");
    }

    #[tokio::test]
    async fn test_release_slice_finds_the_place_without_an_instance_ref() {
        let allocator = allocator_over(vec![backing("kc-a", 1), backing("kc-b", 1)], vec![]);
        allocator.allocate("mobile/t1", "keycloak").await.unwrap();
        assert_eq!(allocator.allocate("mobile/t2", "keycloak").await.unwrap(), "kc-b");

        assert!(allocator.release_slice("mobile/t2").await);
        assert!(!allocator.release_slice("mobile/t2").await);
        assert_eq!(allocator.usage("kc-a").await, Some(1));
        assert_eq!(allocator.usage("kc-b").await, Some(0));
    }

    #[tokio::test]
    async fn test_no_candidates_means_exhausted() {
        let allocator = allocator_over(vec![], vec![]);
        let err = allocator.allocate("mobile/t1", "redis").await.unwrap_err();
        assert!(err.to_string().contains("'redis'"));
    }

    // =========================================================================
    // Fallback Override
    // =========================================================================

    #[tokio::test]
    async fn test_fallback_override_bypasses_inventory() {
        let mut inventory = MockInventorySource::new();
        inventory.expect_candidates().never();
        let mut provisioning = MockProvisioningClient::new();
        provisioning
            .expect_get_instance()
            .with(eq("mobile"), eq("kc-bootstrap"))
            .returning(|_, name| {
                Ok(Some(ServiceInstance::new(name, ServiceInstanceSpec::default())))
            });

        let allocator = CapacityAllocator::new(
            Arc::new(inventory),
            Arc::new(provisioning),
            "mobile",
            Some("kc-bootstrap".to_string()),
        );
        assert_eq!(
            allocator.allocate("mobile/t1", "keycloak").await.unwrap(),
            "kc-bootstrap"
        );
    }

    #[tokio::test]
    async fn test_missing_fallback_instance_is_validation_error() {
        let mut provisioning = MockProvisioningClient::new();
        provisioning.expect_get_instance().returning(|_, _| Ok(None));

        let allocator = CapacityAllocator::new(
            Arc::new(MockInventorySource::new()),
            Arc::new(provisioning),
            "mobile",
            Some("kc-bootstrap".to_string()),
        );
        let err = allocator.allocate("mobile/t1", "keycloak").await.unwrap_err();
        assert!(err.is_validation());
    }
}
