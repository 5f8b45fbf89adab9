//! Persistence: two interchangeable backends behind one gateway.

pub mod backend;
pub mod gateway;
pub mod local;
pub mod remote;
pub mod subscriptions;

pub use backend::{BackendKind, Listener, StorageBackend, Subscription};
pub use gateway::{GatewayOptions, GatewayState, PersistenceGateway};
pub use subscriptions::SubscriptionKey;
