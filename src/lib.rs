//! Social group management: creation, public/private membership, a single
//! administrator per group, and a request/approval workflow for private
//! groups, all behind a read-through cache with explicit busting.

pub mod cache;
pub mod error;
pub mod events;
pub mod group;
pub mod guard;
pub mod membership;
pub mod request;
pub mod state;
pub mod store;

pub use error::{AppError, Result};
pub use state::{AppState, Config};
