use serde::{Deserialize, Serialize};
use time::Date;

use crate::key::{date_token, split_composite};
use crate::{LogicalKey, ValuationResult, ValueRecord};

/// Sparse predicate set accepted by every read path. Only non-blank fields
/// participate; an empty filter selects everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueFilter {
    pub family: Option<String>,
    pub series: Option<String>,
    pub attribute: Option<String>,
    pub composite_attribute_date: Option<String>,
    pub valid_from: Option<Date>,
    pub valid_to: Option<Date>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterField {
    Family,
    Series,
    Attribute,
    CompositeAttributeDate,
    ValidFrom,
    ValidTo,
}

impl FilterField {
    /// Placeholder stem shared by both backends' bound parameters.
    pub fn placeholder(self) -> &'static str {
        match self {
            FilterField::Family => "nomeFamilia",
            FilterField::Series => "nomeSerie",
            FilterField::Attribute => "nomeAtributo",
            FilterField::CompositeAttributeDate => "nomeAtributoDataInicioVigencia",
            FilterField::ValidFrom => "dataInicioVigencia",
            FilterField::ValidTo => "dataFimVigencia",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Date(Date),
}

impl FilterValue {
    /// Rendering used where the backend stores values as strings: text as is,
    /// dates as `YYYYMMDD` tokens.
    pub fn as_key_string(&self) -> String {
        match self {
            FilterValue::Text(value) => value.clone(),
            FilterValue::Date(value) => date_token(*value),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    pub field: FilterField,
    pub value: FilterValue,
}

impl ValueFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    pub fn series(mut self, series: impl Into<String>) -> Self {
        self.series = Some(series.into());
        self
    }

    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn composite_attribute_date(mut self, composite: impl Into<String>) -> Self {
        self.composite_attribute_date = Some(composite.into());
        self
    }

    pub fn valid_from(mut self, valid_from: Date) -> Self {
        self.valid_from = Some(valid_from);
        self
    }

    pub fn valid_to(mut self, valid_to: Date) -> Self {
        self.valid_to = Some(valid_to);
        self
    }

    pub fn for_key(key: &LogicalKey) -> Self {
        Self::new()
            .series(key.series.clone())
            .attribute(key.attribute.clone())
            .valid_from(key.valid_from)
    }

    /// Active predicates in a fixed field order. Blank strings are treated as
    /// absent.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        let mut push_text = |field: FilterField, value: &Option<String>| {
            if let Some(value) = non_blank(value) {
                predicates.push(Predicate {
                    field,
                    value: FilterValue::Text(value.to_string()),
                });
            }
        };
        push_text(FilterField::Family, &self.family);
        push_text(FilterField::Series, &self.series);
        push_text(FilterField::Attribute, &self.attribute);
        push_text(
            FilterField::CompositeAttributeDate,
            &self.composite_attribute_date,
        );
        if let Some(valid_from) = self.valid_from {
            predicates.push(Predicate {
                field: FilterField::ValidFrom,
                value: FilterValue::Date(valid_from),
            });
        }
        if let Some(valid_to) = self.valid_to {
            predicates.push(Predicate {
                field: FilterField::ValidTo,
                value: FilterValue::Date(valid_to),
            });
        }
        predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates().is_empty()
    }

    pub fn has(&self, field: FilterField) -> bool {
        self.predicates().iter().any(|p| p.field == field)
    }

    /// Decoded form of the composite attribute/date token, if one is set.
    pub fn composite_parts(&self) -> ValuationResult<Option<(String, Date)>> {
        non_blank(&self.composite_attribute_date)
            .map(split_composite)
            .transpose()
    }

    /// Reference semantics of the filter, evaluated in memory.
    pub fn matches(&self, record: &ValueRecord) -> ValuationResult<bool> {
        let composite = self.composite_parts()?;
        Ok(self.predicates().iter().all(|predicate| {
            match (&predicate.field, &predicate.value) {
                (FilterField::Family, FilterValue::Text(v)) => record.family == *v,
                (FilterField::Series, FilterValue::Text(v)) => record.series == *v,
                (FilterField::Attribute, FilterValue::Text(v)) => record.attribute == *v,
                (FilterField::CompositeAttributeDate, _) => composite
                    .as_ref()
                    .is_some_and(|(attribute, valid_from)| {
                        record.attribute == *attribute && record.valid_from == *valid_from
                    }),
                (FilterField::ValidFrom, FilterValue::Date(v)) => record.valid_from == *v,
                (FilterField::ValidTo, FilterValue::Date(v)) => record.valid_to == *v,
                _ => false,
            }
        }))
    }
}

/// Blank values are absent; anything else is bound exactly as given.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .filter(|value| !value.trim().is_empty())
}
