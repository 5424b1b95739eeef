pub mod group_models;
pub mod group_service;

pub use group_models::{CreateGroupRequest, Group, PRIVATE, PUBLIC};
pub use group_service::GroupService;
