use sea_orm::sea_query::{Condition, Expr, ExprTrait};

use finbench_valuation_core::{FilterField, FilterValue, ValuationResult, ValueFilter};

use crate::db::ValuationValue;

/// WHERE clause for a filter: one bound equality per active predicate, all
/// ANDed. A composite token is decoded into its attribute and date so it
/// selects the same rows the key-value sort key does.
pub fn condition(filter: &ValueFilter) -> ValuationResult<Condition> {
    let composite = filter.composite_parts()?;
    let mut condition = Condition::all();
    for predicate in filter.predicates() {
        condition = match (predicate.field, predicate.value) {
            (FilterField::CompositeAttributeDate, _) => match &composite {
                Some((attribute, valid_from)) => condition
                    .add(column(ValuationValue::Attribute).eq(attribute.clone()))
                    .add(column(ValuationValue::ValidFrom).eq(*valid_from)),
                None => condition,
            },
            (field, FilterValue::Text(value)) => condition.add(column(text_column(field)).eq(value)),
            (FilterField::ValidTo, FilterValue::Date(value)) => {
                condition.add(column(ValuationValue::ValidTo).eq(value))
            }
            (_, FilterValue::Date(value)) => {
                condition.add(column(ValuationValue::ValidFrom).eq(value))
            }
        };
    }
    Ok(condition)
}

pub(crate) fn column(col: ValuationValue) -> Expr {
    Expr::col((ValuationValue::Table, col))
}

fn text_column(field: FilterField) -> ValuationValue {
    match field {
        FilterField::Family => ValuationValue::Family,
        FilterField::Series => ValuationValue::Series,
        _ => ValuationValue::Attribute,
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::sea_query::{
        PostgresQueryBuilder, Query, QueryStatementWriter, SqliteQueryBuilder,
    };
    use time::macros::date;

    use super::*;

    fn where_sql(filter: &ValueFilter) -> String {
        Query::select()
            .column(ValuationValue::Amount)
            .from(ValuationValue::Table)
            .cond_where(condition(filter).expect("condition"))
            .to_string(PostgresQueryBuilder)
    }

    #[test]
    fn one_equality_per_predicate() {
        let sql = where_sql(
            &ValueFilter::new()
                .family("JUROS")
                .series("CDI")
                .valid_to(date!(2024 - 01 - 31)),
        );
        assert!(sql.contains(r#""valuation_value"."family" = 'JUROS'"#), "{sql}");
        assert!(sql.contains(r#""valuation_value"."series" = 'CDI'"#), "{sql}");
        assert!(sql.contains(r#""valuation_value"."valid_to" = '2024-01-31'"#), "{sql}");
        assert_eq!(sql.matches(" AND ").count(), 2, "{sql}");
    }

    #[test]
    fn composite_token_splits_into_attribute_and_date() {
        let sql = where_sql(&ValueFilter::new().composite_attribute_date("TAXA#20240101"));
        assert!(sql.contains(r#""valuation_value"."attribute" = 'TAXA'"#), "{sql}");
        assert!(sql.contains(r#""valuation_value"."valid_from" = '2024-01-01'"#), "{sql}");
    }

    #[test]
    fn values_are_bound_as_parameters() {
        let (sql, values) = Query::select()
            .column(ValuationValue::Amount)
            .from(ValuationValue::Table)
            .cond_where(condition(&ValueFilter::new().series("CDI")).expect("condition"))
            .build(SqliteQueryBuilder);
        assert!(sql.contains("?"), "{sql}");
        assert_eq!(values.0.len(), 1);
    }
}
