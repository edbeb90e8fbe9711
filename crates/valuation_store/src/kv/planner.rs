//! Access-path selection for the key-value backend.
//!
//! Rules are evaluated top to bottom and the first match wins. Predicates the
//! chosen key condition does not consume travel as a residual filter, so every
//! path returns the same rows a full scan with the whole filter would.

use std::fmt;

use finbench_valuation_core::key::composite_sort_key;
use finbench_valuation_core::{
    FilterField, FilterValue, KEY_SEPARATOR, Predicate, ValuationResult, ValueFilter,
};

use super::schema::SecondaryIndex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessPath {
    /// Base-table query on the full primary key.
    KeyLookup,
    Index(SecondaryIndex),
    FullScan,
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPath::KeyLookup => f.write_str("key lookup"),
            AccessPath::Index(index) => write!(f, "index {}", index.name()),
            AccessPath::FullScan => f.write_str("full scan"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryPlan {
    pub path: AccessPath,
    pub key: Vec<Predicate>,
    pub residual: Vec<Predicate>,
}

pub fn plan(filter: &ValueFilter) -> ValuationResult<QueryPlan> {
    let predicates = canonical_predicates(filter)?;
    let value = |field: FilterField| {
        predicates
            .iter()
            .find(|p| p.field == field)
            .map(|p| p.value.clone())
    };
    let has = |field: FilterField| predicates.iter().any(|p| p.field == field);
    let series = has(FilterField::Series);
    let family = has(FilterField::Family);
    let attribute = has(FilterField::Attribute);
    let valid_from = has(FilterField::ValidFrom);
    let composite = has(FilterField::CompositeAttributeDate);

    if series && composite {
        return Ok(split(AccessPath::KeyLookup, &predicates, |field| {
            matches!(
                field,
                FilterField::Series | FilterField::CompositeAttributeDate
            )
        }));
    }
    if series
        && valid_from
        && let (Some(FilterValue::Text(attr)), Some(FilterValue::Date(date))) =
            (value(FilterField::Attribute), value(FilterField::ValidFrom))
        && !attr.contains(KEY_SEPARATOR)
    {
        let sort = composite_sort_key(&attr, date)?;
        let mut key: Vec<Predicate> = predicates
            .iter()
            .filter(|p| p.field == FilterField::Series)
            .cloned()
            .collect();
        key.push(Predicate {
            field: FilterField::CompositeAttributeDate,
            value: FilterValue::Text(sort),
        });
        let residual = predicates
            .iter()
            .filter(|p| {
                !matches!(
                    p.field,
                    FilterField::Series | FilterField::Attribute | FilterField::ValidFrom
                )
            })
            .cloned()
            .collect();
        return Ok(QueryPlan {
            path: AccessPath::KeyLookup,
            key,
            residual,
        });
    }
    if family && valid_from && !series {
        return Ok(split(
            AccessPath::Index(SecondaryIndex::FamilyDate),
            &predicates,
            |field| matches!(field, FilterField::Family | FilterField::ValidFrom),
        ));
    }
    if series && family {
        return Ok(split(
            AccessPath::Index(SecondaryIndex::SeriesFamily),
            &predicates,
            |field| matches!(field, FilterField::Series | FilterField::Family),
        ));
    }
    if series && attribute && !valid_from {
        return Ok(split(
            AccessPath::Index(SecondaryIndex::SeriesAttribute),
            &predicates,
            |field| matches!(field, FilterField::Series | FilterField::Attribute),
        ));
    }
    if series && valid_from && !attribute {
        return Ok(split(
            AccessPath::Index(SecondaryIndex::SeriesDate),
            &predicates,
            |field| matches!(field, FilterField::Series | FilterField::ValidFrom),
        ));
    }
    Ok(QueryPlan {
        path: AccessPath::FullScan,
        key: Vec::new(),
        residual: predicates,
    })
}

/// Active predicates with any composite token re-encoded in canonical form.
/// A token that does not decode fails here, before any backend call.
pub fn canonical_predicates(filter: &ValueFilter) -> ValuationResult<Vec<Predicate>> {
    let composite = filter.composite_parts()?;
    filter
        .predicates()
        .into_iter()
        .map(|predicate| match (&predicate.field, &composite) {
            (FilterField::CompositeAttributeDate, Some((attribute, valid_from))) => {
                Ok(Predicate {
                    field: predicate.field,
                    value: FilterValue::Text(composite_sort_key(attribute, *valid_from)?),
                })
            }
            _ => Ok(predicate),
        })
        .collect()
}

fn split(
    path: AccessPath,
    predicates: &[Predicate],
    in_key: impl Fn(FilterField) -> bool,
) -> QueryPlan {
    let (key, residual) = predicates
        .iter()
        .cloned()
        .partition(|predicate| in_key(predicate.field));
    QueryPlan {
        path,
        key,
        residual,
    }
}

#[cfg(test)]
mod tests {
    use finbench_valuation_core::ValuationError;
    use time::macros::date;

    use super::*;

    fn fields(predicates: &[Predicate]) -> Vec<FilterField> {
        predicates.iter().map(|p| p.field).collect()
    }

    #[test]
    fn decision_table() {
        let day = date!(2024 - 01 - 01);
        let cases = [
            (
                ValueFilter::new()
                    .series("CDI")
                    .composite_attribute_date("TAXA#20240101"),
                AccessPath::KeyLookup,
            ),
            (
                ValueFilter::new()
                    .series("CDI")
                    .attribute("TAXA")
                    .valid_from(day),
                AccessPath::KeyLookup,
            ),
            (
                ValueFilter::new().family("JUROS").valid_from(day),
                AccessPath::Index(SecondaryIndex::FamilyDate),
            ),
            (
                ValueFilter::new().series("CDI").family("JUROS"),
                AccessPath::Index(SecondaryIndex::SeriesFamily),
            ),
            (
                ValueFilter::new()
                    .series("CDI")
                    .family("JUROS")
                    .valid_from(day),
                AccessPath::Index(SecondaryIndex::SeriesFamily),
            ),
            (
                ValueFilter::new().series("CDI").attribute("TAXA"),
                AccessPath::Index(SecondaryIndex::SeriesAttribute),
            ),
            (
                ValueFilter::new().series("CDI").valid_from(day),
                AccessPath::Index(SecondaryIndex::SeriesDate),
            ),
            (ValueFilter::new().family("JUROS"), AccessPath::FullScan),
            (ValueFilter::new().series("CDI"), AccessPath::FullScan),
            (ValueFilter::new(), AccessPath::FullScan),
        ];
        for (filter, expected) in cases {
            let plan = plan(&filter).expect("plan");
            assert_eq!(plan.path, expected, "{filter:?}");
        }
    }

    #[test]
    fn key_lookup_encodes_attribute_and_date() {
        let filter = ValueFilter::new()
            .series("CDI")
            .attribute("TAXA")
            .valid_from(date!(2024 - 01 - 01))
            .valid_to(date!(2024 - 01 - 31));
        let plan = plan(&filter).expect("plan");
        assert_eq!(
            plan.key[1].value,
            FilterValue::Text("TAXA#20240101".to_string())
        );
        assert_eq!(fields(&plan.residual), vec![FilterField::ValidTo]);
    }

    #[test]
    fn unconsumed_predicates_become_residual() {
        let filter = ValueFilter::new()
            .family("JUROS")
            .valid_from(date!(2024 - 01 - 01))
            .attribute("TAXA");
        let plan = plan(&filter).expect("plan");
        assert_eq!(
            fields(&plan.key),
            vec![FilterField::Family, FilterField::ValidFrom]
        );
        assert_eq!(fields(&plan.residual), vec![FilterField::Attribute]);
    }

    #[test]
    fn malformed_composite_fails_planning() {
        let filter = ValueFilter::new()
            .series("CDI")
            .composite_attribute_date("TAXA");
        let err = plan(&filter).expect_err("malformed");
        assert!(matches!(err, ValuationError::MalformedKey { .. }));
    }
}
