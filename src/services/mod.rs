// Catalog and commerce
pub mod commerce;

// Identity
pub mod address_service;
pub mod profile_service;

// Likes, comments, shares
pub mod social_service;

pub use address_service::AddressService;
pub use profile_service::ProfileService;
pub use social_service::SocialService;
