use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // product_likes
        manager
            .create_table(
                Table::create()
                    .table(ProductLikes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ProductLikes::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(ProductLikes::UserId).uuid().not_null())
                    .col(ColumnDef::new(ProductLikes::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(ProductLikes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_likes_user")
                            .from(ProductLikes::Table, ProductLikes::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_likes_product")
                            .from(ProductLikes::Table, ProductLikes::ProductId)
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
                    .unique()
                    .name("uq_product_likes_user_product")
                    .table(ProductLikes::Table)
                    .col(ProductLikes::UserId)
                    .col(ProductLikes::ProductId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_product_likes_product_id")
                    .table(ProductLikes::Table)
                    .col(ProductLikes::ProductId)
                    .to_owned(),
            )
            .await?;

        // product_comments
        manager
            .create_table(
                Table::create()
                    .table(ProductComments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductComments::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProductComments::UserId).uuid().not_null())
                    .col(ColumnDef::new(ProductComments::ProductId).uuid().not_null())
                    .col(ColumnDef::new(ProductComments::ParentId).uuid())
                    .col(ColumnDef::new(ProductComments::Content).text().not_null())
                    .col(
                        ColumnDef::new(ProductComments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductComments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_comments_user")
                            .from(ProductComments::Table, ProductComments::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_comments_product")
                            .from(ProductComments::Table, ProductComments::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_comments_parent")
                            .from(ProductComments::Table, ProductComments::ParentId)
                            .to(ProductComments::Table, ProductComments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_product_comments_product_id")
                    .table(ProductComments::Table)
                    .col(ProductComments::ProductId)
                    .to_owned(),
            )
            .await?;

        // product_shares
        manager
            .create_table(
                Table::create()
                    .table(ProductShares::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductShares::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProductShares::UserId).uuid().not_null())
                    .col(ColumnDef::new(ProductShares::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(ProductShares::Platform)
                            .string_len(50)
                            .not_null()
                            .default("copy_link"),
                    )
                    .col(
                        ColumnDef::new(ProductShares::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_shares_user")
                            .from(ProductShares::Table, ProductShares::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_shares_product")
                            .from(ProductShares::Table, ProductShares::ProductId)
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
                    .name("idx_product_shares_product_id")
                    .table(ProductShares::Table)
                    .col(ProductShares::ProductId)
                    .to_owned(),
            )
            .await?;

        // product_views
        manager
            .create_table(
                Table::create()
                    .table(ProductViews::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductViews::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProductViews::UserId).uuid())
                    .col(ColumnDef::new(ProductViews::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(ProductViews::SessionId)
                            .string_len(100)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ProductViews::ViewedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_views_user")
                            .from(ProductViews::Table, ProductViews::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_views_product")
                            .from(ProductViews::Table, ProductViews::ProductId)
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
                    .unique()
                    .name("uq_product_views_user_product_session")
                    .table(ProductViews::Table)
                    .col(ProductViews::UserId)
                    .col(ProductViews::ProductId)
                    .col(ProductViews::SessionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProductViews::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductShares::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductComments::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductLikes::Table).if_exists().to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum ProductLikes {
    Table,
    Id,
    UserId,
    ProductId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ProductComments {
    Table,
    Id,
    UserId,
    ProductId,
    ParentId,
    Content,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProductShares {
    Table,
    Id,
    UserId,
    ProductId,
    Platform,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ProductViews {
    Table,
    Id,
    UserId,
    ProductId,
    SessionId,
    ViewedAt,
}
