use crate::access::MediaAccess;
use crate::collaborators::{Authorizer, PostDirectory};
use crate::gateway::UploadGateway;
use crate::migration::Migrator;
use crate::naming::NamingResolver;
use crate::provisioner::ContainerProvisioner;
use crate::reconcile::Reconciler;
use crate::staging::StagingStore;
use crate::teardown::TenantTeardown;
use sharespace_core::Config;
use sharespace_queue::MigrationQueue;
use sharespace_storage::ObjectStore;
use std::sync::Arc;
use std::time::Duration;

/// Every pipeline component, wired to one object store and one queue.
#[derive(Clone)]
pub struct MediaPipeline {
    pub staging: Arc<StagingStore>,
    pub naming: Arc<NamingResolver>,
    pub provisioner: Arc<ContainerProvisioner>,
    pub gateway: Arc<UploadGateway>,
    pub access: Arc<MediaAccess>,
    pub migrator: Arc<Migrator>,
    pub teardown: Arc<TenantTeardown>,
    pub reconciler: Arc<Reconciler>,
}

impl MediaPipeline {
    pub fn new(
        config: &Config,
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn MigrationQueue>,
        authorizer: Arc<dyn Authorizer>,
        posts: Arc<dyn PostDirectory>,
    ) -> Self {
        let naming = NamingResolver::new(store.clone(), config.media.container_prefix.as_str());
        Self::with_naming(config, store, queue, authorizer, posts, naming)
    }

    /// Like [`MediaPipeline::new`] with a caller-built [`NamingResolver`].
    pub fn with_naming(
        config: &Config,
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn MigrationQueue>,
        authorizer: Arc<dyn Authorizer>,
        posts: Arc<dyn PostDirectory>,
        naming: NamingResolver,
    ) -> Self {
        let media = &config.media;
        let naming = Arc::new(naming);
        let staging = Arc::new(StagingStore::new(
            store.clone(),
            media.staging_container.as_str(),
            media.extension.as_str(),
        ));
        let provisioner = Arc::new(ContainerProvisioner::new(
            store.clone(),
            naming.clone(),
            media.provision_max_attempts,
        ));

        Self {
            gateway: Arc::new(UploadGateway::new(
                authorizer.clone(),
                posts.clone(),
                staging.clone(),
                queue.clone(),
            )),
            access: Arc::new(MediaAccess::new(
                store.clone(),
                naming.clone(),
                staging.clone(),
                authorizer,
                posts,
                Duration::from_secs(media.signed_url_expiry_secs),
            )),
            migrator: Arc::new(Migrator::new(
                store.clone(),
                staging.clone(),
                provisioner.clone(),
            )),
            teardown: Arc::new(TenantTeardown::new(
                store.clone(),
                naming.clone(),
                staging.clone(),
            )),
            reconciler: Arc::new(Reconciler::new(
                store,
                naming.clone(),
                staging.clone(),
                queue,
                Duration::from_secs(config.worker.staging_orphan_grace_secs),
            )),
            staging,
            naming,
            provisioner,
        }
    }
}
