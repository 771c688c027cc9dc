//! Create `elegant_kv` table.
//!
//! Two columns: a unique text key and the JSON-encoded value.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ElegantKv::Table)
                    .if_not_exists()
                    .col(string_len(ElegantKv::KeyColumn, 255).primary_key())
                    .col(text_null(ElegantKv::ValueColumn))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(ElegantKv::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum ElegantKv { Table, KeyColumn, ValueColumn }
