use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // categories
        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Categories::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Categories::Name)
                            .string_len(100)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Categories::Description)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Categories::Image).string_len(500))
                    .col(ColumnDef::new(Categories::ParentId).uuid())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_categories_parent")
                            .from(Categories::Table, Categories::ParentId)
                            .to(Categories::Table, Categories::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // sizes
        manager
            .create_table(
                Table::create()
                    .table(Sizes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Sizes::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Sizes::Name)
                            .string_len(20)
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        // colors
        manager
            .create_table(
                Table::create()
                    .table(Colors::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Colors::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Colors::Name)
                            .string_len(50)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Colors::HexCode).string_len(7))
                    .to_owned(),
            )
            .await?;

        // products
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Products::SellerId).uuid())
                    .col(
                        ColumnDef::new(Products::ProductName)
                            .string_len(200)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Products::Slug)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Products::Description)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Products::Gender)
                            .string_len(10)
                            .not_null()
                            .default("Unisex"),
                    )
                    .col(
                        ColumnDef::new(Products::Tags)
                            .string_len(500)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Products::BasePrice)
                            .decimal_len(10, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Products::DiscountPercentage)
                            .decimal_len(5, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Products::FinalPrice)
                            .decimal_len(10, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Products::StockQuantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Products::LowStockThreshold)
                            .integer()
                            .not_null()
                            .default(10),
                    )
                    .col(ColumnDef::new(Products::Sku).string_len(100))
                    .col(ColumnDef::new(Products::Barcode).string_len(100))
                    .col(ColumnDef::new(Products::Weight).decimal_len(8, 2))
                    .col(ColumnDef::new(Products::Dimensions).string_len(100))
                    .col(
                        ColumnDef::new(Products::Status)
                            .string_len(20)
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Products::IsFeatured)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Products::IsDigital)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Products::Views)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Products::AverageRating)
                            .decimal_len(3, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Products::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Products::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_products_seller")
                            .from(Products::Table, Products::SellerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_products_seller_id")
                    .table(Products::Table)
                    .col(Products::SellerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_products_created_at")
                    .table(Products::Table)
                    .col(Products::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // product_categories
        manager
            .create_table(
                Table::create()
                    .table(ProductCategories::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ProductCategories::ProductId).uuid().not_null())
                    .col(ColumnDef::new(ProductCategories::CategoryId).uuid().not_null())
                    .primary_key(
                        Index::create()
                            .col(ProductCategories::ProductId)
                            .col(ProductCategories::CategoryId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_categories_product")
                            .from(ProductCategories::Table, ProductCategories::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_categories_category")
                            .from(ProductCategories::Table, ProductCategories::CategoryId)
                            .to(Categories::Table, Categories::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // product_sizes
        manager
            .create_table(
                Table::create()
                    .table(ProductSizes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ProductSizes::ProductId).uuid().not_null())
                    .col(ColumnDef::new(ProductSizes::SizeId).uuid().not_null())
                    .primary_key(
                        Index::create()
                            .col(ProductSizes::ProductId)
                            .col(ProductSizes::SizeId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_sizes_product")
                            .from(ProductSizes::Table, ProductSizes::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_sizes_size")
                            .from(ProductSizes::Table, ProductSizes::SizeId)
                            .to(Sizes::Table, Sizes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // product_images
        manager
            .create_table(
                Table::create()
                    .table(ProductImages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductImages::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProductImages::ProductId).uuid().not_null())
                    .col(ColumnDef::new(ProductImages::Image).string_len(500).not_null())
                    .col(
                        ColumnDef::new(ProductImages::AltText)
                            .string_len(255)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ProductImages::IsMain)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ProductImages::Order)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_images_product")
                            .from(ProductImages::Table, ProductImages::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_product_images_product_id")
                    .table(ProductImages::Table)
                    .col(ProductImages::ProductId)
                    .to_owned(),
            )
            .await?;

        // At most one main image per product.
        let backend = manager.get_database_backend();
        manager
            .get_connection()
            .execute_unprepared(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_product_images_main \
                 ON product_images (product_id) WHERE is_main = {}",
                super::sql_true(backend)
            ))
            .await?;

        // product_variants
        manager
            .create_table(
                Table::create()
                    .table(ProductVariants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductVariants::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProductVariants::ProductId).uuid().not_null())
                    .col(ColumnDef::new(ProductVariants::SizeId).uuid())
                    .col(ColumnDef::new(ProductVariants::ColorId).uuid())
                    .col(
                        ColumnDef::new(ProductVariants::PriceAdjustment)
                            .decimal_len(10, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProductVariants::StockQuantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProductVariants::Sku)
                            .string_len(100)
                            .not_null()
                            .unique_key(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_variants_product")
                            .from(ProductVariants::Table, ProductVariants::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_variants_size")
                            .from(ProductVariants::Table, ProductVariants::SizeId)
                            .to(Sizes::Table, Sizes::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_variants_color")
                            .from(ProductVariants::Table, ProductVariants::ColorId)
                            .to(Colors::Table, Colors::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_product_variants_product_id")
                    .table(ProductVariants::Table)
                    .col(ProductVariants::ProductId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProductVariants::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductImages::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductSizes::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductCategories::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Products::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Colors::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sizes::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Categories::Table).if_exists().to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Categories {
    Table,
    Id,
    Name,
    Description,
    Image,
    ParentId,
}

#[derive(DeriveIden)]
enum Sizes {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Colors {
    Table,
    Id,
    Name,
    HexCode,
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    SellerId,
    ProductName,
    Slug,
    Description,
    Gender,
    Tags,
    BasePrice,
    DiscountPercentage,
    FinalPrice,
    StockQuantity,
    LowStockThreshold,
    Sku,
    Barcode,
    Weight,
    Dimensions,
    Status,
    IsFeatured,
    IsDigital,
    Views,
    AverageRating,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProductCategories {
    Table,
    ProductId,
    CategoryId,
}

#[derive(DeriveIden)]
enum ProductSizes {
    Table,
    ProductId,
    SizeId,
}

#[derive(DeriveIden)]
enum ProductImages {
    Table,
    Id,
    ProductId,
    Image,
    AltText,
    IsMain,
    Order,
}

#[derive(DeriveIden)]
enum ProductVariants {
    Table,
    Id,
    ProductId,
    SizeId,
    ColorId,
    PriceAdjustment,
    StockQuantity,
    Sku,
}
