use crate::auth::TokenPair;
use crate::entities::{ProfileGender, UserRole};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&crate::auth::user::Model> for UserResponse {
    fn from(user: &crate::auth::user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessTokenResponse {
    pub access: String,
}

/// The caller's own profile, including private contact fields
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub role: UserRole,
    pub bio: String,
    pub location: String,
    pub website: Option<String>,
    pub business_name: Option<String>,
    pub profile_image: Option<String>,
    pub cover_image: Option<String>,
    pub phone: Option<String>,
    pub alternate_email: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<ProfileGender>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile as shown to other users
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicProfileResponse {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub verified: bool,
    pub bio: String,
    pub location: String,
    pub website: Option<String>,
    pub business_name: Option<String>,
    pub profile_image: Option<String>,
    pub cover_image: Option<String>,
    pub gender: Option<ProfileGender>,
    pub products_count: u64,
}
