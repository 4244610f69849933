pub mod category;
pub mod color;
pub mod product;
pub mod product_category;
pub mod product_image;
pub mod product_size;
pub mod product_variant;
pub mod size;

pub use category::{Entity as Category, Model as CategoryModel};
pub use color::{Entity as Color, Model as ColorModel};
pub use product::{
    Entity as Product, Model as ProductModel, ProductGender, ProductStatus,
};
pub use product_category::Entity as ProductCategory;
pub use product_image::{Entity as ProductImage, Model as ProductImageModel};
pub use product_size::Entity as ProductSize;
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use size::{Entity as Size, Model as SizeModel};
