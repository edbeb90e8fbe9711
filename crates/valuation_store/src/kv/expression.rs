use finbench_valuation_core::Predicate;

use super::client::{AttributeValue, ExpressionAttributes};
use super::schema::attribute_for;

/// One `#name = :value` equality clause.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clause {
    pub attribute: &'static str,
    pub placeholder: &'static str,
    pub value: AttributeValue,
}

impl Clause {
    pub fn from_predicate(predicate: &Predicate) -> Self {
        // Dates are stored as YYYYMMDD strings.
        Self {
            attribute: attribute_for(predicate.field),
            placeholder: predicate.field.placeholder(),
            value: AttributeValue::S(predicate.value.as_key_string()),
        }
    }
}

/// Key condition and filter rendered against one shared set of placeholder
/// maps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderedExpression {
    pub key_condition: Option<String>,
    pub filter: Option<String>,
    pub attributes: ExpressionAttributes,
}

pub fn render(key: &[Predicate], residual: &[Predicate]) -> RenderedExpression {
    let mut attributes = ExpressionAttributes::default();
    let key_condition = render_clauses(key, &mut attributes);
    let filter = render_clauses(residual, &mut attributes);
    RenderedExpression {
        key_condition,
        filter,
        attributes,
    }
}

/// Filter-only rendering used by scans.
pub fn render_filter(predicates: &[Predicate]) -> RenderedExpression {
    render(&[], predicates)
}

fn render_clauses(predicates: &[Predicate], attributes: &mut ExpressionAttributes) -> Option<String> {
    if predicates.is_empty() {
        return None;
    }
    let parts: Vec<String> = predicates
        .iter()
        .map(Clause::from_predicate)
        .map(|clause| {
            let name = format!("#{}", clause.placeholder);
            let value = format!(":{}", clause.placeholder);
            attributes
                .names
                .insert(name.clone(), clause.attribute.to_string());
            attributes.values.insert(value.clone(), clause.value);
            format!("{name} = {value}")
        })
        .collect();
    Some(parts.join(" AND "))
}
