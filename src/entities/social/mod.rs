pub mod product_comment;
pub mod product_like;
pub mod product_share;
pub mod product_view;

pub use product_comment::{Entity as ProductComment, Model as ProductCommentModel};
pub use product_like::{Entity as ProductLike, Model as ProductLikeModel};
pub use product_share::{Entity as ProductShare, Model as ProductShareModel};
pub use product_view::{Entity as ProductView, Model as ProductViewModel};
