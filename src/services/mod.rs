pub mod auth_service;
pub mod file_service;
pub mod lifecycle_service;
pub mod query_service;
pub mod realtime_service;

pub use auth_service::AuthService;
pub use file_service::FileService;
pub use realtime_service::{ChangeEvent, ChangeScope, RealtimeBus, Subscription};
