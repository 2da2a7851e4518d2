use sharespace_core::{AppError, PostId, TenantId};
use sharespace_queue::QueueError;
use sharespace_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Every candidate name was already taken in the global namespace.
    #[error("Gave up provisioning a container for tenant {tenant_id} after {attempts} attempts")]
    AttemptsExhausted { tenant_id: TenantId, attempts: u32 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Post {0} not found")]
    PostNotFound(PostId),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

pub type MediaResult<T> = Result<T, MediaError>;

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Forbidden(msg) => AppError::Forbidden(msg),
            MediaError::PostNotFound(post_id) => {
                AppError::NotFound(format!("Post {} not found", post_id))
            }
            MediaError::Provision(ProvisionError::AttemptsExhausted {
                tenant_id,
                attempts,
            }) => AppError::ProvisioningExhausted {
                tenant_id: tenant_id.get(),
                attempts,
            },
            MediaError::Provision(ProvisionError::Storage(e)) | MediaError::Storage(e) => {
                AppError::Storage(e.to_string())
            }
            MediaError::Queue(e) => AppError::Queue(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharespace_core::ErrorMetadata;

    #[test]
    fn media_errors_map_to_app_errors() {
        let forbidden: AppError = MediaError::Forbidden("not the owner".into()).into();
        assert_eq!(forbidden.http_status_code(), 403);

        let missing: AppError = MediaError::PostNotFound(PostId(42)).into();
        assert_eq!(missing.http_status_code(), 404);

        let exhausted: AppError = MediaError::Provision(ProvisionError::AttemptsExhausted {
            tenant_id: TenantId(7),
            attempts: 20,
        })
        .into();
        assert_eq!(exhausted.error_code(), "PROVISIONING_EXHAUSTED");

        let storage: AppError =
            MediaError::Storage(StorageError::BackendError("timeout".into())).into();
        assert!(storage.is_recoverable());
    }
}
