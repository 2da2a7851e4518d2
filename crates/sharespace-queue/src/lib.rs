//! Sharespace Queue Library
//!
//! Durable at-least-once queue carrying migration notifications from the upload
//! path to the migration workers. A delivery stays owned by the consumer until it
//! is acknowledged; unacknowledged deliveries reappear after the visibility
//! timeout and move to a dead-letter queue after too many receives.

pub mod factory;
pub mod memory;
pub mod notification;
#[cfg(feature = "queue-sqs")]
pub mod sqs;
pub mod traits;

pub use factory::create_queue;
pub use memory::InMemoryQueue;
pub use notification::{decode_body, encode_notification, NotificationError};
pub use sharespace_core::QueueBackend;
#[cfg(feature = "queue-sqs")]
pub use sqs::SqsQueue;
pub use traits::{Delivery, MigrationQueue, QueueError, QueueResult};
