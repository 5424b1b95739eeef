pub mod membership_models;
pub mod membership_service;

pub use membership_models::{Membership, NavigationTarget, ADMIN, PARTICIPANT};
pub use membership_service::{get_group_admin, set_group_admin, MembershipService};
