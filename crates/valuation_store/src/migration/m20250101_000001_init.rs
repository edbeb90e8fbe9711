use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        create_reference_table(
            manager,
            ValuationFamily::Table,
            ValuationFamily::Name,
            ValuationFamily::Description,
            ValuationFamily::InternalCode,
        )
        .await?;
        create_reference_table(
            manager,
            ValuationSeries::Table,
            ValuationSeries::Name,
            ValuationSeries::Description,
            ValuationSeries::InternalCode,
        )
        .await?;
        create_reference_table(
            manager,
            ValuationAttribute::Table,
            ValuationAttribute::Name,
            ValuationAttribute::Description,
            ValuationAttribute::InternalCode,
        )
        .await?;
        create_reference_table(
            manager,
            ValuationSourceFile::Table,
            ValuationSourceFile::Name,
            ValuationSourceFile::Description,
            ValuationSourceFile::InternalCode,
        )
        .await?;

        manager
            .create_table(
                Table::create()
                    .table(ValuationValue::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ValuationValue::Family).string().not_null())
                    .col(ColumnDef::new(ValuationValue::Series).string().not_null())
                    .col(
                        ColumnDef::new(ValuationValue::Attribute)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ValuationValue::SourceFile).string().null())
                    .col(amount_col(backend))
                    .col(ColumnDef::new(ValuationValue::ValidFrom).date().not_null())
                    .col(ColumnDef::new(ValuationValue::ValidTo).date().not_null())
                    .col(
                        ColumnDef::new(ValuationValue::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("valuation_value_logical_key_idx")
                    .table(ValuationValue::Table)
                    .if_not_exists()
                    .col(ValuationValue::Series)
                    .col(ValuationValue::Attribute)
                    .col(ValuationValue::ValidFrom)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("valuation_value_family_date_idx")
                    .table(ValuationValue::Table)
                    .if_not_exists()
                    .col(ValuationValue::Family)
                    .col(ValuationValue::ValidFrom)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("valuation_value_series_family_idx")
                    .table(ValuationValue::Table)
                    .if_not_exists()
                    .col(ValuationValue::Series)
                    .col(ValuationValue::Family)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ValuationValue::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ValuationSourceFile::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ValuationAttribute::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ValuationSeries::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ValuationFamily::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

async fn create_reference_table<T: Iden + Clone>(
    manager: &SchemaManager<'_>,
    table: T,
    name: T,
    description: T,
    internal_code: T,
) -> Result<(), DbErr> {
    manager
        .create_table(
            Table::create()
                .table(table)
                .if_not_exists()
                .col(ColumnDef::new(name).string().not_null().primary_key())
                .col(ColumnDef::new(description).string().not_null())
                .col(ColumnDef::new(internal_code).string().not_null())
                .to_owned(),
        )
        .await
}

// SQLite has no exact decimal type, so amounts are stored as canonical text.
fn amount_col(backend: DatabaseBackend) -> ColumnDef {
    let mut col_def = ColumnDef::new(ValuationValue::Amount);
    match backend {
        DatabaseBackend::Postgres => {
            col_def.decimal_len(28, 10);
        }
        _ => {
            col_def.string();
        }
    }
    col_def.not_null();
    col_def.to_owned()
}
