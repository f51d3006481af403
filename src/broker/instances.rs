//! In-memory table of broker-issued instances
//!
//! Records live only as long as the process. Writers (create/remove) hold
//! the lock exclusively; binds read under a shared lock.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use super::types::Credentials;
use crate::Error;

/// One broker-issued instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceRecord {
    /// Broker-issued instance ID
    pub name: String,
    /// Credentials returned on bind
    pub credentials: Credentials,
}

/// Process-local store of broker instances keyed by ID
#[derive(Debug, Default)]
pub struct InstanceTable {
    instances: RwLock<HashMap<String, InstanceRecord>>,
}

impl InstanceTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record instance `id`
    ///
    /// With `credentials` absent, an existing record is kept as is and a
    /// new one gets `default_credentials()`. Re-creating with the same
    /// credentials succeeds; different ones are an [`Error::InstanceConflict`].
    pub async fn create(
        &self,
        id: &str,
        credentials: Option<Credentials>,
        default_credentials: impl FnOnce() -> Credentials,
    ) -> Result<InstanceRecord, Error> {
        let mut instances = self.instances.write().await;

        if let Some(existing) = instances.get(id) {
            return match credentials {
                None => Ok(existing.clone()),
                Some(requested) if requested == existing.credentials => Ok(existing.clone()),
                Some(_) => Err(Error::instance_conflict(id)),
            };
        }

        let record = InstanceRecord {
            name: id.to_string(),
            credentials: credentials.unwrap_or_else(default_credentials),
        };
        instances.insert(id.to_string(), record.clone());
        debug!(instance_id = %id, "Recorded broker instance");
        Ok(record)
    }

    /// Credentials of instance `id`, if recorded
    pub async fn credentials(&self, id: &str) -> Option<Credentials> {
        self.instances
            .read()
            .await
            .get(id)
            .map(|record| record.credentials.clone())
    }

    /// Forget instance `id`, returning whether it was recorded
    pub async fn remove(&self, id: &str) -> bool {
        self.instances.write().await.remove(id).is_some()
    }

    /// Number of recorded instances
    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Whether the table is empty
    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(pairs: &[(&str, &str)]) -> Credentials {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn no_default() -> Credentials {
        panic!("default credentials should not be synthesized")
    }

    #[tokio::test]
    async fn story_create_read_remove() {
        let table = InstanceTable::new();
        table
            .create("abc", Some(creds(&[("user", "admin")])), no_default)
            .await
            .unwrap();
        assert_eq!(table.credentials("abc").await, Some(creds(&[("user", "admin")])));

        assert!(table.remove("abc").await);
        assert!(!table.remove("abc").await);
        assert_eq!(table.credentials("abc").await, None);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_absent_credentials_use_default_once() {
        let table = InstanceTable::new();
        let first = table
            .create("abc", None, || creds(&[("user", "generated")]))
            .await
            .unwrap();
        let second = table.create("abc", None, no_default).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_identical_recreate_succeeds() {
        let table = InstanceTable::new();
        let c = creds(&[("user", "admin")]);
        table.create("abc", Some(c.clone()), no_default).await.unwrap();
        table.create("abc", Some(c), no_default).await.unwrap();
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_conflicting_recreate_is_rejected() {
        let table = InstanceTable::new();
        table
            .create("abc", Some(creds(&[("user", "admin")])), no_default)
            .await
            .unwrap();
        let err = table
            .create("abc", Some(creds(&[("user", "other")])), no_default)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InstanceConflict { .. }));
        assert_eq!(table.credentials("abc").await, Some(creds(&[("user", "admin")])));
    }
}
