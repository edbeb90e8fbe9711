use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum ValuationFamily {
    Table,
    Name,
    Description,
    InternalCode,
}

#[derive(Iden, Clone, Copy)]
pub enum ValuationSeries {
    Table,
    Name,
    Description,
    InternalCode,
}

#[derive(Iden, Clone, Copy)]
pub enum ValuationAttribute {
    Table,
    Name,
    Description,
    InternalCode,
}

#[derive(Iden, Clone, Copy)]
pub enum ValuationSourceFile {
    Table,
    Name,
    Description,
    InternalCode,
}

#[derive(Iden, Clone, Copy)]
pub enum ValuationValue {
    Table,
    Family,
    Series,
    Attribute,
    SourceFile,
    Amount,
    ValidFrom,
    ValidTo,
    UpdatedAt,
}
