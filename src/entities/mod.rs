//! SeaORM entities for the catalog, identity, social and commerce stores.
//!
//! `users` and `refresh_tokens` live under [`crate::auth`].

pub mod address;
pub mod catalog;
pub mod commerce;
pub mod social;
pub mod user_profile;

pub use address::{AddressType, Entity as Address, Model as AddressModel};
pub use user_profile::{Entity as UserProfile, Model as UserProfileModel, ProfileGender, UserRole};
