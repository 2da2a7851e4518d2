//! Tenant container naming.
//!
//! Names have the form `{prefix}-{tenant_id}-{suffix}` where the suffix is a
//! random number drawn per creation attempt. Lookups scan the provider's
//! container listing for the `{prefix}-{tenant_id}-` prefix, trailing dash
//! included, so tenant 7 never matches tenant 70.

use rand::Rng;
use sharespace_core::constants::{CONTAINER_SUFFIX_MAX, CONTAINER_SUFFIX_MIN};
use sharespace_core::{ContainerRef, TenantId};
use sharespace_storage::{ContainerInfo, ObjectStore, StorageResult};
use std::sync::Arc;

type SuffixFn = dyn Fn() -> u32 + Send + Sync;

pub struct NamingResolver {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    suffixes: Box<SuffixFn>,
}

impl NamingResolver {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            suffixes: Box::new(|| rand::rng().random_range(CONTAINER_SUFFIX_MIN..=CONTAINER_SUFFIX_MAX)),
        }
    }

    /// Replace the random suffix source, e.g. with a fixed sequence in tests.
    pub fn with_suffix_source(mut self, source: impl Fn() -> u32 + Send + Sync + 'static) -> Self {
        self.suffixes = Box::new(source);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}-{tenant_id}-`
    pub fn tenant_prefix(&self, tenant: TenantId) -> String {
        format!("{}-{}-", self.prefix, tenant)
    }

    /// A fresh candidate name for a creation attempt.
    pub fn candidate(&self, tenant: TenantId) -> ContainerRef {
        ContainerRef::new(format!("{}{}", self.tenant_prefix(tenant), (self.suffixes)()))
    }

    /// Whether `name` is a container of `tenant`.
    pub fn belongs_to(&self, tenant: TenantId, name: &str) -> bool {
        name.strip_prefix(&self.tenant_prefix(tenant))
            .is_some_and(is_suffix)
    }

    /// Tenant encoded in a container name, if it follows this resolver's scheme.
    pub fn tenant_of(&self, name: &str) -> Option<TenantId> {
        let rest = name.strip_prefix(&self.prefix)?.strip_prefix('-')?;
        let (tenant, suffix) = rest.split_once('-')?;
        if tenant.is_empty() || !tenant.bytes().all(|b| b.is_ascii_digit()) || !is_suffix(suffix) {
            return None;
        }
        tenant.parse().ok().map(TenantId)
    }

    /// Every container of `tenant`, oldest first (creation time, then name).
    pub async fn find_all(&self, tenant: TenantId) -> StorageResult<Vec<ContainerInfo>> {
        let mut matches: Vec<ContainerInfo> = self
            .store
            .list_containers()
            .await?
            .into_iter()
            .filter(|c| self.belongs_to(tenant, &c.name))
            .collect();
        sort_oldest_first(&mut matches);
        Ok(matches)
    }

    /// The tenant's container. With duplicates present the oldest one wins.
    pub async fn resolve_existing(&self, tenant: TenantId) -> StorageResult<Option<ContainerRef>> {
        let found = self.find_all(tenant).await?;
        if found.len() > 1 {
            tracing::warn!(
                tenant_id = %tenant,
                count = found.len(),
                "Tenant has duplicate containers; using the oldest"
            );
        }
        Ok(found.into_iter().next().map(|c| ContainerRef::new(c.name)))
    }
}

fn is_suffix(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Containers without a creation time sort after dated ones.
pub(crate) fn sort_oldest_first(containers: &mut [ContainerInfo]) {
    containers.sort_by(|a, b| {
        (a.created_at.is_none(), a.created_at, &a.name).cmp(&(
            b.created_at.is_none(),
            b.created_at,
            &b.name,
        ))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sharespace_storage::InMemoryObjectStore;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    fn resolver() -> (Arc<InMemoryObjectStore>, NamingResolver) {
        let store = Arc::new(InMemoryObjectStore::new(SECRET));
        let resolver = NamingResolver::new(store.clone(), "tenant-id");
        (store, resolver)
    }

    #[test]
    fn candidates_carry_five_digit_suffix() {
        let (_store, resolver) = resolver();
        for _ in 0..50 {
            let name = resolver.candidate(TenantId(7)).into_name();
            let suffix = name.strip_prefix("tenant-id-7-").unwrap();
            assert_eq!(suffix.len(), 5);
            let n: u32 = suffix.parse().unwrap();
            assert!((CONTAINER_SUFFIX_MIN..=CONTAINER_SUFFIX_MAX).contains(&n));
        }
    }

    #[test]
    fn prefix_match_requires_exact_tenant() {
        let (_store, resolver) = resolver();
        assert!(resolver.belongs_to(TenantId(7), "tenant-id-7-12345"));
        assert!(!resolver.belongs_to(TenantId(7), "tenant-id-70-12345"));
        assert!(!resolver.belongs_to(TenantId(70), "tenant-id-7-12345"));
        assert!(!resolver.belongs_to(TenantId(7), "tenant-id-7-"));
        assert!(!resolver.belongs_to(TenantId(7), "tenant-id-7-abc"));
        assert!(!resolver.belongs_to(TenantId(7), "other-7-12345"));
    }

    #[test]
    fn tenant_parsed_from_container_name() {
        let (_store, resolver) = resolver();
        assert_eq!(resolver.tenant_of("tenant-id-70-12345"), Some(TenantId(70)));
        assert_eq!(resolver.tenant_of("tenant-id-x-12345"), None);
        assert_eq!(resolver.tenant_of("sharespace-staging"), None);
    }

    #[tokio::test]
    async fn resolve_ignores_other_tenants() {
        let (store, resolver) = resolver();
        store.create_container("tenant-id-70-11111").await.unwrap();
        assert!(resolver.resolve_existing(TenantId(7)).await.unwrap().is_none());

        store.create_container("tenant-id-7-22222").await.unwrap();
        assert_eq!(
            resolver
                .resolve_existing(TenantId(7))
                .await
                .unwrap()
                .unwrap()
                .name(),
            "tenant-id-7-22222"
        );
    }

    #[tokio::test]
    async fn oldest_duplicate_wins() {
        let (store, resolver) = resolver();
        store.create_container("tenant-id-7-99999").await.unwrap();
        store.create_container("tenant-id-7-11111").await.unwrap();

        let resolved = resolver.resolve_existing(TenantId(7)).await.unwrap().unwrap();
        assert_eq!(resolved.name(), "tenant-id-7-99999");
    }

    #[test]
    fn undated_containers_sort_last() {
        let at = |s| Some(Utc.timestamp_opt(s, 0).unwrap());
        let mut containers = vec![
            ContainerInfo { name: "c".into(), created_at: None },
            ContainerInfo { name: "b".into(), created_at: at(20) },
            ContainerInfo { name: "a".into(), created_at: at(20) },
            ContainerInfo { name: "d".into(), created_at: at(10) },
        ];
        sort_oldest_first(&mut containers);
        let names: Vec<&str> = containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn suffix_source_can_be_replaced() {
        let (_store, resolver) = resolver();
        let resolver = resolver.with_suffix_source(|| 12345);
        assert_eq!(resolver.candidate(TenantId(7)).name(), "tenant-id-7-12345");
    }
}
