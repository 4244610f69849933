use crate::{
    auth::{password::hash_password_blocking, user},
    db::get_or_create,
    dto::{ProfileResponse, PublicProfileResponse, UserResponse},
    entities::{
        catalog::{product, Product},
        user_profile, ProfileGender, UserProfile, UserRole,
    },
    errors::{DbErrExt, ServiceError},
    events::{Event, EventSender},
    media::{decode_image, ImageUpload, MediaStore, StoredFile},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@.+-_".contains(c))
    {
        Ok(())
    } else {
        Err(ValidationError::new("username_characters"))
    }
}

fn validate_website(website: &str) -> Result<(), ValidationError> {
    if website.is_empty() || website.starts_with("http://") || website.starts_with("https://") {
        Ok(())
    } else {
        Err(ValidationError::new("url"))
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 150), custom = "validate_username")]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub last_name: String,
}

/// Partial profile update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileInput {
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
    pub bio: Option<String>,
    #[validate(length(max = 100))]
    pub location: Option<String>,
    #[validate(length(max = 200), custom = "validate_website")]
    pub website: Option<String>,
    #[validate(length(max = 100))]
    pub business_name: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[validate(email)]
    pub alternate_email: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<ProfileGender>,
    pub profile_image: Option<ImageUpload>,
    pub cover_image: Option<ImageUpload>,
}

/// Role recorded on the user's profile; users without one are buyers.
pub async fn role_of<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<UserRole, ServiceError> {
    Ok(UserProfile::find()
        .filter(user_profile::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .map(|p| p.role)
        .unwrap_or_default())
}

/// Whether `current` may switch to `requested`. Only admins grant admin.
pub fn role_change_allowed(current: UserRole, requested: UserRole) -> bool {
    requested != UserRole::Admin || current == UserRole::Admin
}

fn empty_profile(user_id: Uuid) -> user_profile::ActiveModel {
    let now = Utc::now();
    user_profile::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        role: Set(UserRole::default()),
        bio: Set(String::new()),
        location: Set(String::new()),
        website: Set(None),
        business_name: Set(None),
        profile_image: Set(None),
        cover_image: Set(None),
        phone: Set(None),
        alternate_email: Set(None),
        date_of_birth: Set(None),
        gender: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

fn profile_response(account: &user::Model, profile: user_profile::Model) -> ProfileResponse {
    ProfileResponse {
        user: UserResponse::from(account),
        role: profile.role,
        bio: profile.bio,
        location: profile.location,
        website: profile.website,
        business_name: profile.business_name,
        profile_image: profile.profile_image,
        cover_image: profile.cover_image,
        phone: profile.phone,
        alternate_email: profile.alternate_email,
        date_of_birth: profile.date_of_birth,
        gender: profile.gender,
        created_at: profile.created_at,
        updated_at: profile.updated_at,
    }
}

/// Accounts and profiles
#[derive(Clone)]
pub struct ProfileService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    media: Arc<MediaStore>,
}

impl ProfileService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        media: Arc<MediaStore>,
    ) -> Self {
        Self {
            db,
            event_sender,
            media,
        }
    }

    async fn find_user(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    /// Creates a user and an empty profile in one transaction.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn register(&self, input: RegisterInput) -> Result<user::Model, ServiceError> {
        let email = input.email.trim().to_lowercase();
        let username = input.username.trim().to_string();

        let taken_username = user::Entity::find()
            .filter(user::Column::Username.eq(username.as_str()))
            .count(&*self.db)
            .await?;
        if taken_username > 0 {
            return Err(ServiceError::ValidationError(
                "A user with that username already exists.".to_string(),
            ));
        }
        let taken_email = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .count(&*self.db)
            .await?;
        if taken_email > 0 {
            return Err(ServiceError::ValidationError(
                "A user with that email already exists.".to_string(),
            ));
        }

        let password_hash = hash_password_blocking(input.password)
            .await
            .map_err(|e| ServiceError::HashError(e.to_string()))?;

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let account = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username),
            email: Set(email),
            password_hash: Set(password_hash),
            first_name: Set(input.first_name.trim().to_string()),
            last_name: Set(input.last_name.trim().to_string()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                ServiceError::Conflict("A user with that username or email already exists.".to_string())
            } else {
                e.into()
            }
        })?;
        empty_profile(account.id).insert(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::UserRegistered(account.id))
            .await;
        info!("Registered user: {}", account.id);
        Ok(account)
    }

    async fn ensure_profile(&self, user_id: Uuid) -> Result<user_profile::Model, ServiceError> {
        get_or_create::<_, UserProfile, user_profile::ActiveModel, _>(
            &*self.db,
            user_profile::Column::UserId,
            user_id,
            || empty_profile(user_id),
        )
        .await
    }

    /// The caller's profile, created on first access.
    #[instrument(skip(self))]
    pub async fn get_profile(&self, user_id: Uuid) -> Result<ProfileResponse, ServiceError> {
        let account = self.find_user(user_id).await?;
        let profile = self.ensure_profile(user_id).await?;
        Ok(profile_response(&account, profile))
    }

    #[instrument(skip(self, input))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        input: UpdateProfileInput,
    ) -> Result<ProfileResponse, ServiceError> {
        let account = self.find_user(user_id).await?;
        let profile = self.ensure_profile(user_id).await?;

        if let Some(requested) = input.role {
            if !role_change_allowed(profile.role, requested) {
                return Err(ServiceError::Forbidden(
                    "Only administrators can grant the admin role".to_string(),
                ));
            }
        }

        let profile_image = input
            .profile_image
            .as_ref()
            .map(|u| decode_image("profile_image", u))
            .transpose()?;
        let cover_image = input
            .cover_image
            .as_ref()
            .map(|u| decode_image("cover_image", u))
            .transpose()?;

        let mut stored: Vec<StoredFile> = Vec::new();
        let mut new_avatar = None;
        let mut new_cover = None;
        if let Some(image) = &profile_image {
            let file = self.media.save("profiles", image).await?;
            new_avatar = Some(file.url.clone());
            stored.push(file);
        }
        if let Some(image) = &cover_image {
            match self.media.save("covers", image).await {
                Ok(file) => {
                    new_cover = Some(file.url.clone());
                    stored.push(file);
                }
                Err(e) => {
                    self.media.discard(&stored).await;
                    return Err(e);
                }
            }
        }

        let mut replaced = Vec::new();
        if new_avatar.is_some() {
            replaced.extend(profile.profile_image.clone());
        }
        if new_cover.is_some() {
            replaced.extend(profile.cover_image.clone());
        }

        let result = async {
            let txn = self.db.begin().await?;

            let mut acct = account.into_active_model();
            if let Some(first) = input.first_name {
                acct.first_name = Set(first);
            }
            if let Some(last) = input.last_name {
                acct.last_name = Set(last);
            }
            acct.updated_at = Set(Utc::now());
            let account = acct.update(&txn).await?;

            let mut active = profile.into_active_model();
            if let Some(role) = input.role {
                active.role = Set(role);
            }
            if let Some(bio) = input.bio {
                active.bio = Set(bio);
            }
            if let Some(location) = input.location {
                active.location = Set(location);
            }
            if let Some(website) = input.website {
                active.website = Set(Some(website).filter(|w| !w.is_empty()));
            }
            if let Some(business) = input.business_name {
                active.business_name = Set(Some(business).filter(|b| !b.is_empty()));
            }
            if let Some(phone) = input.phone {
                active.phone = Set(Some(phone).filter(|p| !p.is_empty()));
            }
            if let Some(alt) = input.alternate_email {
                active.alternate_email = Set(Some(alt));
            }
            if let Some(dob) = input.date_of_birth {
                active.date_of_birth = Set(Some(dob));
            }
            if let Some(gender) = input.gender {
                active.gender = Set(Some(gender));
            }
            if let Some(url) = new_avatar {
                active.profile_image = Set(Some(url));
            }
            if let Some(url) = new_cover {
                active.cover_image = Set(Some(url));
            }
            active.updated_at = Set(Utc::now());
            let profile = active.update(&txn).await?;

            txn.commit().await?;
            Ok::<_, ServiceError>((account, profile))
        }
        .await;

        let (account, profile) = match result {
            Ok(updated) => updated,
            Err(e) => {
                self.media.discard(&stored).await;
                return Err(e);
            }
        };
        self.media.remove_urls(&replaced).await;

        self.event_sender
            .send_or_log(Event::ProfileUpdated(user_id))
            .await;
        info!("Updated profile for user: {}", user_id);
        Ok(profile_response(&account, profile))
    }

    /// Profile as seen by anyone. Contact details and birth date stay private.
    #[instrument(skip(self))]
    pub async fn public_profile(&self, user_id: Uuid) -> Result<PublicProfileResponse, ServiceError> {
        let account = self.find_user(user_id).await?;
        if !account.is_active {
            return Err(ServiceError::NotFound(format!("User {} not found", user_id)));
        }
        let profile = UserProfile::find()
            .filter(user_profile::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;
        let products_count = Product::find()
            .filter(product::Column::SellerId.eq(user_id))
            .count(&*self.db)
            .await?;

        let role = profile.as_ref().map(|p| p.role).unwrap_or_default();
        Ok(PublicProfileResponse {
            id: account.id,
            username: account.username,
            first_name: account.first_name,
            last_name: account.last_name,
            role,
            verified: role.is_verified_seller(),
            bio: profile.as_ref().map(|p| p.bio.clone()).unwrap_or_default(),
            location: profile.as_ref().map(|p| p.location.clone()).unwrap_or_default(),
            website: profile.as_ref().and_then(|p| p.website.clone()),
            business_name: profile.as_ref().and_then(|p| p.business_name.clone()),
            profile_image: profile.as_ref().and_then(|p| p.profile_image.clone()),
            cover_image: profile.as_ref().and_then(|p| p.cover_image.clone()),
            gender: profile.as_ref().and_then(|p| p.gender),
            products_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(UserRole::Buyer, UserRole::Seller, true)]
    #[case(UserRole::Seller, UserRole::Buyer, true)]
    #[case(UserRole::Buyer, UserRole::Admin, false)]
    #[case(UserRole::Seller, UserRole::Admin, false)]
    #[case(UserRole::Admin, UserRole::Admin, true)]
    #[case(UserRole::Admin, UserRole::Buyer, true)]
    fn role_changes(#[case] current: UserRole, #[case] requested: UserRole, #[case] allowed: bool) {
        assert_eq!(role_change_allowed(current, requested), allowed);
    }

    #[test]
    fn register_input_rules() {
        let ok = RegisterInput {
            username: "alice".into(),
            email: "alice@x.com".into(),
            password: "wonderland".into(),
            first_name: String::new(),
            last_name: String::new(),
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterInput {
            username: "al ice".into(),
            email: "not-an-email".into(),
            password: "short".into(),
            ..ok
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn website_may_be_blank() {
        let input = UpdateProfileInput {
            website: Some(String::new()),
            ..Default::default()
        };
        assert!(input.validate().is_ok());

        let input = UpdateProfileInput {
            website: Some("example.com".into()),
            ..Default::default()
        };
        assert!(input.validate().is_err());
    }
}
