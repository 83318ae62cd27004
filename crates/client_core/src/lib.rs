//! Client-side orchestration for the image gateway: backend transport, typed
//! remote operations, and the store that drives login, upload/process,
//! publish and delete workflows.

pub mod catalog;
pub mod config;
pub mod error;
pub mod persistence;
pub mod store;
pub mod transport;
pub mod validation;

pub use catalog::RemoteCatalog;
pub use config::{load_settings, ClientSettings};
pub use error::{ActionError, TransportError};
pub use persistence::{FileSettingsStore, MemorySettingsStore, PersistenceBridge, SettingsStore};
pub use store::{AppStore, Notification, NotificationLevel, StoreSnapshot, SubmitOptions};
pub use transport::{EndpointHandle, HttpTransport, Transport};
pub use validation::{Credentials, Endpoint, ImageUpload, ValidationError};

#[cfg(test)]
mod test_support;
