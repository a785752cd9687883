pub mod auth;
pub mod error;
pub mod events;
pub mod format;
pub mod processor;
pub mod pubsub;
pub mod resolver;
pub mod scratch;
pub mod storage;
#[cfg(test)]
mod test_support;
pub mod workers;

pub use auth::Credentials;
pub use error::{RelayError, Result};
pub use events::{EventType, ObjectPayload, PayloadFormat, StorageEvent};
pub use format::summarize;
pub use processor::{HttpImageProcessor, ImageProcessor, ProcessorConfig};
pub use pubsub::{Delivery, PubSubSubscription, Subscription, subscription_path};
pub use resolver::{ProcessingRequest, resolve_destination, resolve_rotation_angle};
pub use storage::{GcsObjectStore, ObjectStore};
pub use workers::{Consumer, ConsumerConfig, Outcome, RotateImageConfig, RotateImageWorker, Worker};
