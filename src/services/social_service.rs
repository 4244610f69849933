use crate::{
    auth::user,
    db::MAX_INSERT_ATTEMPTS,
    dto::{
        CommentAuthor, CommentResponse, LikeResponse, LikeToggleResponse, ShareRecordResponse,
        ShareResponse,
    },
    entities::{
        catalog::{product, Product},
        social::{
            product_comment, product_like, product_share, ProductComment, ProductLike, ProductShare,
        },
    },
    errors::{DbErrExt, ServiceError},
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_SHARE_PLATFORM: &str = "copy_link";

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateLikeInput {
    pub product: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCommentInput {
    pub product: Uuid,
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    pub parent: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateCommentInput {
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct ShareInput {
    #[validate(length(min = 1, max = 50))]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateShareInput {
    pub product: Uuid,
    #[validate(length(min = 1, max = 50))]
    pub platform: Option<String>,
}

/// Groups comments under the requested roots.
///
/// Every descendant of a root, however deep, is listed under that root in
/// chronological order. Roots keep the order of `root_ids`.
pub fn thread_comments(
    comments: &[product_comment::Model],
    root_ids: &[Uuid],
) -> Vec<(product_comment::Model, Vec<product_comment::Model>)> {
    let by_id: HashMap<Uuid, &product_comment::Model> =
        comments.iter().map(|c| (c.id, c)).collect();
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for c in comments {
        if let Some(parent) = c.parent_id {
            children.entry(parent).or_default().push(c.id);
        }
    }

    root_ids
        .iter()
        .filter_map(|root| by_id.get(root))
        .map(|root| {
            let mut seen = HashSet::from([root.id]);
            let mut stack: Vec<Uuid> = children.get(&root.id).cloned().unwrap_or_default();
            let mut descendants = Vec::new();
            while let Some(id) = stack.pop() {
                if !seen.insert(id) {
                    continue;
                }
                if let Some(c) = by_id.get(&id) {
                    descendants.push((*c).clone());
                }
                if let Some(kids) = children.get(&id) {
                    stack.extend(kids.iter().copied());
                }
            }
            descendants.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            ((*root).clone(), descendants)
        })
        .collect()
}

fn author_of(users: &HashMap<Uuid, user::Model>, id: Uuid) -> CommentAuthor {
    match users.get(&id) {
        Some(u) => CommentAuthor {
            id: u.id,
            username: u.username.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
        },
        None => CommentAuthor {
            id,
            username: String::new(),
            first_name: String::new(),
            last_name: String::new(),
        },
    }
}

fn comment_response(
    c: product_comment::Model,
    replies: Vec<CommentResponse>,
    users: &HashMap<Uuid, user::Model>,
) -> CommentResponse {
    CommentResponse {
        id: c.id,
        user: author_of(users, c.user_id),
        product: c.product_id,
        content: c.content,
        parent: c.parent_id,
        replies,
        created_at: c.created_at,
        updated_at: c.updated_at,
    }
}

async fn ensure_product<C: ConnectionTrait>(conn: &C, product_id: Uuid) -> Result<(), ServiceError> {
    let exists = Product::find()
        .filter(product::Column::Id.eq(product_id))
        .count(conn)
        .await?;
    if exists == 0 {
        return Err(ServiceError::NotFound(format!("Product {} not found", product_id)));
    }
    Ok(())
}

/// Missing products named in a request body are a client error, not a 404.
async fn referenced_product<C: ConnectionTrait>(conn: &C, product_id: Uuid) -> Result<(), ServiceError> {
    ensure_product(conn, product_id).await.map_err(|e| match e {
        ServiceError::NotFound(_) => {
            ServiceError::ValidationError(format!("product: product {} does not exist", product_id))
        }
        other => other,
    })
}

fn share_platform(platform: Option<String>) -> String {
    platform
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_SHARE_PLATFORM.to_string())
}

/// Likes, comments and shares
#[derive(Clone)]
pub struct SocialService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl SocialService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn likes_count(&self, product_id: Uuid) -> Result<u64, ServiceError> {
        Ok(ProductLike::find()
            .filter(product_like::Column::ProductId.eq(product_id))
            .count(&*self.db)
            .await?)
    }

    /// Flips the caller's like on a product.
    ///
    /// Deleting first decides the direction: a removed row means "unliked".
    /// Otherwise the like is inserted, and a concurrent insert of the same pair
    /// sends us around the loop again.
    #[instrument(skip(self))]
    pub async fn toggle_like(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<LikeToggleResponse, ServiceError> {
        ensure_product(&*self.db, product_id).await?;

        let mut liked = None;
        for _ in 0..MAX_INSERT_ATTEMPTS {
            let removed = ProductLike::delete_many()
                .filter(product_like::Column::UserId.eq(user_id))
                .filter(product_like::Column::ProductId.eq(product_id))
                .exec(&*self.db)
                .await?;
            if removed.rows_affected > 0 {
                liked = Some(false);
                break;
            }

            let like = product_like::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                product_id: Set(product_id),
                created_at: Set(Utc::now()),
            };
            match like.insert(&*self.db).await {
                Ok(_) => {
                    liked = Some(true);
                    break;
                }
                Err(e) if e.is_unique_violation() => {
                    debug!("Like raced for product {}, retrying", product_id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        let liked = liked.ok_or_else(|| {
            ServiceError::Conflict("Like toggle did not settle; please retry".to_string())
        })?;

        self.event_sender
            .send_or_log(Event::LikeToggled {
                product_id,
                user_id,
                liked,
            })
            .await;
        Ok(LikeToggleResponse {
            liked,
            likes_count: self.likes_count(product_id).await?,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_likes(&self, user_id: Uuid) -> Result<Vec<LikeResponse>, ServiceError> {
        Ok(ProductLike::find()
            .filter(product_like::Column::UserId.eq(user_id))
            .order_by_desc(product_like::Column::CreatedAt)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(like_response)
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn create_like(
        &self,
        user_id: Uuid,
        input: CreateLikeInput,
    ) -> Result<LikeResponse, ServiceError> {
        referenced_product(&*self.db, input.product).await?;
        let like = product_like::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(input.product),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                ServiceError::Conflict("You already like this product".to_string())
            } else {
                e.into()
            }
        })?;

        self.event_sender
            .send_or_log(Event::LikeToggled {
                product_id: like.product_id,
                user_id,
                liked: true,
            })
            .await;
        Ok(like_response(like))
    }

    #[instrument(skip(self))]
    pub async fn delete_like(&self, user_id: Uuid, like_id: Uuid) -> Result<(), ServiceError> {
        let removed = ProductLike::delete_many()
            .filter(product_like::Column::Id.eq(like_id))
            .filter(product_like::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        if removed.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Like {} not found", like_id)));
        }
        Ok(())
    }

    async fn users_by_id(&self, ids: HashSet<Uuid>) -> Result<HashMap<Uuid, user::Model>, ServiceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(user::Entity::find()
            .filter(user::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect())
    }

    /// Loads every comment on `product_ids` and threads them under `root_ids`.
    async fn threads(
        &self,
        product_ids: HashSet<Uuid>,
        root_ids: &[Uuid],
    ) -> Result<Vec<CommentResponse>, ServiceError> {
        if root_ids.is_empty() {
            return Ok(Vec::new());
        }
        let comments = ProductComment::find()
            .filter(product_comment::Column::ProductId.is_in(product_ids))
            .order_by_asc(product_comment::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        let users = self
            .users_by_id(comments.iter().map(|c| c.user_id).collect())
            .await?;

        Ok(thread_comments(&comments, root_ids)
            .into_iter()
            .map(|(root, replies)| {
                let replies = replies
                    .into_iter()
                    .map(|r| comment_response(r, Vec::new(), &users))
                    .collect();
                comment_response(root, replies, &users)
            })
            .collect())
    }

    /// Root comments of a product, newest first, each with its replies.
    #[instrument(skip(self))]
    pub async fn product_comments(&self, product_id: Uuid) -> Result<Vec<CommentResponse>, ServiceError> {
        let roots: Vec<Uuid> = ProductComment::find()
            .filter(product_comment::Column::ProductId.eq(product_id))
            .filter(product_comment::Column::ParentId.is_null())
            .order_by_desc(product_comment::Column::CreatedAt)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        self.threads(HashSet::from([product_id]), &roots).await
    }

    /// Comments written by the caller, newest first.
    #[instrument(skip(self))]
    pub async fn own_comments(&self, user_id: Uuid) -> Result<Vec<CommentResponse>, ServiceError> {
        let own = ProductComment::find()
            .filter(product_comment::Column::UserId.eq(user_id))
            .order_by_desc(product_comment::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        let products = own.iter().map(|c| c.product_id).collect();
        let roots: Vec<Uuid> = own.iter().map(|c| c.id).collect();
        self.threads(products, &roots).await
    }

    #[instrument(skip(self))]
    pub async fn get_comment(&self, comment_id: Uuid) -> Result<CommentResponse, ServiceError> {
        let comment = self.find_comment(comment_id).await?;
        self.threads(HashSet::from([comment.product_id]), &[comment.id])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound(format!("Comment {} not found", comment_id)))
    }

    async fn find_comment(&self, comment_id: Uuid) -> Result<product_comment::Model, ServiceError> {
        ProductComment::find_by_id(comment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Comment {} not found", comment_id)))
    }

    async fn authored(
        &self,
        user_id: Uuid,
        comment_id: Uuid,
    ) -> Result<product_comment::Model, ServiceError> {
        let comment = self.find_comment(comment_id).await?;
        if comment.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "You can only modify your own comments".to_string(),
            ));
        }
        Ok(comment)
    }

    #[instrument(skip(self, input))]
    pub async fn create_comment(
        &self,
        user_id: Uuid,
        input: CreateCommentInput,
    ) -> Result<CommentResponse, ServiceError> {
        referenced_product(&*self.db, input.product).await?;
        if let Some(parent_id) = input.parent {
            let parent = ProductComment::find_by_id(parent_id).one(&*self.db).await?;
            match parent {
                Some(p) if p.product_id == input.product => {}
                Some(_) => {
                    return Err(ServiceError::ValidationError(
                        "parent: reply must belong to the same product".to_string(),
                    ))
                }
                None => {
                    return Err(ServiceError::ValidationError(format!(
                        "parent: comment {} does not exist",
                        parent_id
                    )))
                }
            }
        }

        let now = Utc::now();
        let comment = product_comment::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(input.product),
            parent_id: Set(input.parent),
            content: Set(input.content),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::CommentPosted {
                product_id: comment.product_id,
                comment_id: comment.id,
                parent_id: comment.parent_id,
            })
            .await;
        info!("Created comment: {}", comment.id);
        self.get_comment(comment.id).await
    }

    #[instrument(skip(self, input))]
    pub async fn update_comment(
        &self,
        user_id: Uuid,
        comment_id: Uuid,
        input: UpdateCommentInput,
    ) -> Result<CommentResponse, ServiceError> {
        let comment = self.authored(user_id, comment_id).await?;
        let mut active = comment.into_active_model();
        active.content = Set(input.content);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        self.get_comment(comment_id).await
    }

    /// Deletes a comment and, through the foreign key, its replies.
    #[instrument(skip(self))]
    pub async fn delete_comment(&self, user_id: Uuid, comment_id: Uuid) -> Result<(), ServiceError> {
        let comment = self.authored(user_id, comment_id).await?;
        comment.into_active_model().delete(&*self.db).await?;
        info!("Deleted comment: {}", comment_id);
        Ok(())
    }

    async fn record_share(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        platform: Option<String>,
    ) -> Result<product_share::Model, ServiceError> {
        let share = product_share::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(product_id),
            platform: Set(share_platform(platform)),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::ProductShared {
                product_id,
                user_id,
                platform: share.platform.clone(),
            })
            .await;
        Ok(share)
    }

    /// Records a share of a product; shares are never deduplicated.
    #[instrument(skip(self, input))]
    pub async fn share_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        input: ShareInput,
    ) -> Result<ShareResponse, ServiceError> {
        ensure_product(&*self.db, product_id).await?;
        let share = self.record_share(user_id, product_id, input.platform).await?;
        let shares_count = ProductShare::find()
            .filter(product_share::Column::ProductId.eq(product_id))
            .count(&*self.db)
            .await?;
        Ok(ShareResponse {
            shared: true,
            platform: share.platform,
            shares_count,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_shares(&self, user_id: Uuid) -> Result<Vec<ShareRecordResponse>, ServiceError> {
        Ok(ProductShare::find()
            .filter(product_share::Column::UserId.eq(user_id))
            .order_by_desc(product_share::Column::CreatedAt)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(share_record)
            .collect())
    }

    #[instrument(skip(self, input))]
    pub async fn create_share(
        &self,
        user_id: Uuid,
        input: CreateShareInput,
    ) -> Result<ShareRecordResponse, ServiceError> {
        referenced_product(&*self.db, input.product).await?;
        let share = self.record_share(user_id, input.product, input.platform).await?;
        Ok(share_record(share))
    }
}

fn like_response(like: product_like::Model) -> LikeResponse {
    LikeResponse {
        id: like.id,
        user: like.user_id,
        product: like.product_id,
        created_at: like.created_at,
    }
}

fn share_record(share: product_share::Model) -> ShareRecordResponse {
    ShareRecordResponse {
        id: share.id,
        user: share.user_id,
        product: share.product_id,
        platform: share.platform,
        created_at: share.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn comment(id: u128, parent: Option<u128>, minute: i64) -> product_comment::Model {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        product_comment::Model {
            id: Uuid::from_u128(id),
            user_id: Uuid::nil(),
            product_id: Uuid::nil(),
            parent_id: parent.map(Uuid::from_u128),
            content: format!("comment {}", id),
            created_at: t0 + Duration::minutes(minute),
            updated_at: t0 + Duration::minutes(minute),
        }
    }

    #[test]
    fn nested_replies_flatten_under_their_root() {
        // 1 <- 2 <- 4, 1 <- 3; 5 is a separate root
        let all = vec![
            comment(1, None, 0),
            comment(2, Some(1), 1),
            comment(3, Some(1), 3),
            comment(4, Some(2), 2),
            comment(5, None, 4),
        ];
        let threads = thread_comments(&all, &[Uuid::from_u128(5), Uuid::from_u128(1)]);
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].0.id, Uuid::from_u128(5));
        assert!(threads[0].1.is_empty());

        let reply_ids: Vec<Uuid> = threads[1].1.iter().map(|c| c.id).collect();
        assert_eq!(
            reply_ids,
            vec![Uuid::from_u128(2), Uuid::from_u128(4), Uuid::from_u128(3)]
        );
    }

    #[test]
    fn unknown_roots_are_skipped() {
        let all = vec![comment(1, None, 0)];
        assert!(thread_comments(&all, &[Uuid::from_u128(9)]).is_empty());
    }

    #[test]
    fn share_platform_defaults_to_copy_link() {
        assert_eq!(share_platform(None), "copy_link");
        assert_eq!(share_platform(Some("  ".into())), "copy_link");
        assert_eq!(share_platform(Some("instagram".into())), "instagram");
    }
}
