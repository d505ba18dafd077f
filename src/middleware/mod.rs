pub mod auth;

pub use auth::{auth_middleware, require_admin, resolve_acting_account, AppState, AuthUser};
