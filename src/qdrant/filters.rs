//! Translation from declarative constraint specs to Qdrant filter payloads.
//!
//! A [`ConstraintSpec`] groups field conditions into `must`, `should`, and
//! `must_not` clauses. Conditions are either exact matches or one-sided range
//! bounds. Compilation is pure and deterministic: predicates keep the order in
//! which conditions were supplied.

use serde_json::{Map, Value, json};
use thiserror::Error;

/// Errors raised while interpreting a constraint specification.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The spec or one of its clauses was not a JSON object.
    #[error("expected a JSON object for {location}, got {found}")]
    InvalidSpecKind {
        /// Which part of the spec had the wrong shape.
        location: String,
        /// JSON kind that was actually supplied.
        found: &'static str,
    },
    /// An operator pair carried an unrecognized token or a non-comparable bound.
    #[error("invalid condition for field `{field}`: {reason}")]
    InvalidConditionKind {
        /// Field the condition was attached to.
        field: String,
        /// Description of the rejected token or value.
        reason: String,
    },
}

/// Comparison operator for a one-sided range bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    /// Exclusive lower bound (`>`).
    Gt,
    /// Inclusive lower bound (`>=`).
    Gte,
    /// Exclusive upper bound (`<`).
    Lt,
    /// Inclusive upper bound (`<=`).
    Lte,
}

impl RangeOp {
    /// Resolve a surface token (`>`, `>=`, `<`, `<=`) to an operator.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            _ => None,
        }
    }

    /// Qdrant range key for this operator.
    pub const fn bound_key(self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }
}

/// A single field-level constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field must equal the value exactly, type preserved.
    Equals(Value),
    /// Field must satisfy a one-sided bound. Bounds are numbers or strings
    /// (strings cover datetime ranges).
    Range(RangeOp, Value),
}

impl Condition {
    fn to_predicate(&self, field: &str) -> Value {
        match self {
            Self::Equals(value) => json!({
                "key": field,
                "match": { "value": value }
            }),
            Self::Range(op, bound) => {
                let mut range = Map::new();
                range.insert(op.bound_key().into(), bound.clone());
                json!({
                    "key": field,
                    "range": Value::Object(range)
                })
            }
        }
    }
}

/// A condition attached to a payload field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    /// Payload field the condition applies to.
    pub field: String,
    /// Constraint evaluated against the field.
    pub condition: Condition,
}

/// Declarative search constraints grouped by clause.
///
/// Clauses are lists rather than maps so that predicate order matches
/// insertion order, and so that several bounds may target the same field
/// (e.g. a closed interval built from two one-sided ranges).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConstraintSpec {
    /// Conditions every hit must satisfy.
    pub must: Vec<FieldCondition>,
    /// Conditions that boost relevance without being required.
    pub should: Vec<FieldCondition>,
    /// Conditions that exclude hits outright.
    pub must_not: Vec<FieldCondition>,
}

impl ConstraintSpec {
    /// Create an empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a required condition.
    pub fn must(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.must.push(FieldCondition {
            field: field.into(),
            condition,
        });
        self
    }

    /// Append a relevance-boosting condition.
    pub fn should(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.should.push(FieldCondition {
            field: field.into(),
            condition,
        });
        self
    }

    /// Append an excluding condition.
    pub fn must_not(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.must_not.push(FieldCondition {
            field: field.into(),
            condition,
        });
        self
    }

    /// Parse the loose JSON form: `{"must": {"field": condition, ...}, ...}`.
    ///
    /// A condition is either a scalar equality value or a 2-element array
    /// `[op, value]` with `op` one of `>`, `>=`, `<`, `<=`. Keys other than
    /// the three clause names are ignored. Field order within each clause is
    /// preserved.
    ///
    /// Only a 2-element array whose first element is a string is treated as
    /// an operator pair; any other array is an equality value. Callers that
    /// need to match a `[string, value]` array exactly must use the typed
    /// builder API instead.
    pub fn from_value(value: &Value) -> Result<Self, FilterError> {
        let Value::Object(clauses) = value else {
            return Err(FilterError::InvalidSpecKind {
                location: "constraint spec".into(),
                found: json_kind(value),
            });
        };

        let mut spec = Self::default();
        for (clause, bucket) in [
            ("must", &mut spec.must),
            ("should", &mut spec.should),
            ("must_not", &mut spec.must_not),
        ] {
            let Some(entries) = clauses.get(clause) else {
                continue;
            };
            let Value::Object(entries) = entries else {
                return Err(FilterError::InvalidSpecKind {
                    location: format!("`{clause}` clause"),
                    found: json_kind(entries),
                });
            };
            for (field, condition) in entries {
                bucket.push(FieldCondition {
                    field: field.clone(),
                    condition: parse_condition(field, condition)?,
                });
            }
        }

        Ok(spec)
    }

    /// Compile the spec into Qdrant predicates, clause by clause.
    pub fn compile(&self) -> CompiledFilter {
        CompiledFilter {
            must: compile_clause(&self.must),
            should: compile_clause(&self.should),
            must_not: compile_clause(&self.must_not),
        }
    }

    /// True when no clause holds any condition.
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }
}

fn compile_clause(conditions: &[FieldCondition]) -> Vec<Value> {
    conditions
        .iter()
        .map(|entry| entry.condition.to_predicate(&entry.field))
        .collect()
}

fn parse_condition(field: &str, value: &Value) -> Result<Condition, FilterError> {
    if let Value::Array(items) = value
        && let [Value::String(token), bound] = items.as_slice()
    {
        let op = RangeOp::parse(token).ok_or_else(|| FilterError::InvalidConditionKind {
            field: field.to_string(),
            reason: format!("unrecognized comparison operator `{token}`"),
        })?;
        if !matches!(bound, Value::Number(_) | Value::String(_)) {
            return Err(FilterError::InvalidConditionKind {
                field: field.to_string(),
                reason: format!(
                    "range bound must be a number or string, got {}",
                    json_kind(bound)
                ),
            });
        }
        return Ok(Condition::Range(op, bound.clone()));
    }

    Ok(Condition::Equals(value.clone()))
}

/// Filter predicates produced from a [`ConstraintSpec`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CompiledFilter {
    /// Predicates every hit must satisfy.
    pub must: Vec<Value>,
    /// Predicates that boost relevance.
    pub should: Vec<Value>,
    /// Predicates that exclude hits.
    pub must_not: Vec<Value>,
}

impl CompiledFilter {
    /// True when no clause holds any predicate.
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }

    /// Render the Qdrant REST filter object, omitting empty clauses.
    ///
    /// Returns `None` for an empty filter so callers can leave the search
    /// body's `filter` key out entirely.
    pub fn into_value(self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }

        let mut filter = Map::new();
        for (clause, predicates) in [
            ("must", self.must),
            ("should", self.should),
            ("must_not", self.must_not),
        ] {
            if !predicates.is_empty() {
                filter.insert(clause.into(), Value::Array(predicates));
            }
        }
        Some(Value::Object(filter))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_spec_compiles_to_empty_filter() {
        let compiled = ConstraintSpec::new().compile();
        assert!(compiled.must.is_empty());
        assert!(compiled.should.is_empty());
        assert!(compiled.must_not.is_empty());
        assert!(compiled.into_value().is_none());
    }

    #[test]
    fn equality_and_range_compile_to_expected_predicates() {
        let spec = ConstraintSpec::new()
            .must("location", Condition::Equals(json!("San Francisco")))
            .should("score", Condition::Range(RangeOp::Gt, json!(50)));

        let compiled = spec.compile();
        assert_eq!(
            compiled.must,
            vec![json!({
                "key": "location",
                "match": { "value": "San Francisco" }
            })]
        );
        assert_eq!(
            compiled.should,
            vec![json!({
                "key": "score",
                "range": { "gt": 50 }
            })]
        );
        assert!(compiled.must_not.is_empty());
    }

    #[test]
    fn gte_sets_only_the_inclusive_lower_bound() {
        let compiled = ConstraintSpec::new()
            .must("score", Condition::Range(RangeOp::Gte, json!(50)))
            .compile();

        let range = compiled.must[0]["range"]
            .as_object()
            .expect("range predicate");
        assert_eq!(range.len(), 1);
        assert_eq!(range["gte"], json!(50));
    }

    #[test]
    fn must_not_clause_holds_exclusions() {
        let compiled = ConstraintSpec::new()
            .must_not("status", Condition::Equals(json!("archived")))
            .compile();

        assert!(compiled.must.is_empty());
        assert!(compiled.should.is_empty());
        assert_eq!(
            compiled.must_not,
            vec![json!({
                "key": "status",
                "match": { "value": "archived" }
            })]
        );
    }

    #[test]
    fn predicate_order_follows_insertion_order() {
        let spec = ConstraintSpec::from_value(&json!({
            "must": {
                "zeta": 1,
                "alpha": 2,
                "mid": 3
            }
        }))
        .expect("spec");

        let compiled = spec.compile();
        let keys: Vec<&str> = compiled
            .must
            .iter()
            .map(|predicate| predicate["key"].as_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn loose_form_parses_scalars_and_operator_pairs() {
        let spec = ConstraintSpec::from_value(&json!({
            "must": { "location": "San Francisco" },
            "should": { "score": [">", 50] }
        }))
        .expect("spec");

        assert_eq!(spec.must.len(), 1);
        assert_eq!(spec.must[0].field, "location");
        assert_eq!(
            spec.must[0].condition,
            Condition::Equals(json!("San Francisco"))
        );
        assert_eq!(
            spec.should[0].condition,
            Condition::Range(RangeOp::Gt, json!(50))
        );
        assert!(spec.must_not.is_empty());
    }

    #[test]
    fn unknown_top_level_keys_are_ignored() {
        let with_extra = ConstraintSpec::from_value(&json!({
            "must": { "location": "london" },
            "boost": { "score": 10 }
        }))
        .expect("spec");
        let without = ConstraintSpec::from_value(&json!({
            "must": { "location": "london" }
        }))
        .expect("spec");

        assert_eq!(with_extra, without);
    }

    #[test]
    fn unrecognized_operator_is_rejected() {
        let error = ConstraintSpec::from_value(&json!({
            "must": { "score": ["~=", 10] }
        }))
        .expect_err("operator should be rejected");

        match error {
            FilterError::InvalidConditionKind { field, reason } => {
                assert_eq!(field, "score");
                assert!(reason.contains("~="), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_object_spec_is_rejected() {
        let error = ConstraintSpec::from_value(&json!("not a mapping"))
            .expect_err("spec should be rejected");
        assert!(matches!(error, FilterError::InvalidSpecKind { .. }));
    }

    #[test]
    fn non_object_clause_is_rejected() {
        let error = ConstraintSpec::from_value(&json!({ "must": [1, 2] }))
            .expect_err("clause should be rejected");
        match error {
            FilterError::InvalidSpecKind { location, found } => {
                assert_eq!(location, "`must` clause");
                assert_eq!(found, "an array");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_comparable_range_bound_is_rejected() {
        let error = ConstraintSpec::from_value(&json!({
            "must": { "score": [">", [1, 2]] }
        }))
        .expect_err("bound should be rejected");
        assert!(matches!(error, FilterError::InvalidConditionKind { .. }));
    }

    #[test]
    fn two_element_array_without_string_head_is_equality() {
        let spec = ConstraintSpec::from_value(&json!({
            "must": { "pair": [1, 2] }
        }))
        .expect("spec");
        assert_eq!(spec.must[0].condition, Condition::Equals(json!([1, 2])));
    }

    #[test]
    fn string_bounds_support_datetime_ranges() {
        let compiled = ConstraintSpec::new()
            .must(
                "timestamp",
                Condition::Range(RangeOp::Gte, json!("2025-01-01T00:00:00Z")),
            )
            .compile();
        assert_eq!(
            compiled.must[0]["range"]["gte"],
            json!("2025-01-01T00:00:00Z")
        );
    }

    #[test]
    fn closed_interval_uses_two_conditions_on_one_field() {
        let compiled = ConstraintSpec::new()
            .must("score", Condition::Range(RangeOp::Gte, json!(50)))
            .must("score", Condition::Range(RangeOp::Lte, json!(90)))
            .compile();

        assert_eq!(compiled.must.len(), 2);
        assert_eq!(compiled.must[0]["range"]["gte"], json!(50));
        assert_eq!(compiled.must[1]["range"]["lte"], json!(90));
    }

    #[test]
    fn rendered_filter_omits_empty_clauses() {
        let value = ConstraintSpec::new()
            .must("location", Condition::Equals(json!("Chicago")))
            .compile()
            .into_value()
            .expect("filter value");

        let object = value.as_object().expect("filter object");
        assert!(object.contains_key("must"));
        assert!(!object.contains_key("should"));
        assert!(!object.contains_key("must_not"));
    }
}
