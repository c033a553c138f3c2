//! Normalized query and search specs.
//!
//! A [`QuerySpec`] is the coerced form of the human-authored selector and
//! grouping fragments that make up a question. A [`SearchSpec`] locates
//! administrative objects: groups are unioned, constraints inside a group are
//! intersected.

use serde::{Deserialize, Serialize};

use crate::ids::ObjectId;
use crate::objects::{FilterOperator, Parameter};

/// A selected sensor with its resolved parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorFragment {
    /// Sensor name.
    pub name: String,
    /// Parameters in definition order.
    pub params: Vec<Parameter>,
    /// Whether omitted parameters are filled from the sensor definition.
    #[serde(default = "SelectorFragment::default_fill_defaults")]
    pub fill_defaults: bool,
}

impl SelectorFragment {
    const fn default_fill_defaults() -> bool {
        true
    }

    /// A fragment with no parameters.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            fill_defaults: true,
        }
    }
}

/// A filter predicate on a sensor's answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingFragment {
    /// Sensor name.
    pub name: String,
    /// Parameters in definition order.
    pub params: Vec<Parameter>,
    /// Comparison operator.
    pub operator: FilterOperator,
    /// Comparison value.
    pub value: String,
}

/// How grouping fragments combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineOp {
    /// Every grouping must match.
    #[default]
    And,
    /// Any grouping may match.
    Or,
}

impl CombineOp {
    /// The server's `and_flag` for this operator.
    #[must_use]
    pub const fn and_flag(self) -> bool {
        matches!(self, Self::And)
    }
}

/// A fully coerced question definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySpec {
    /// Selected sensors, in order.
    pub selectors: Vec<SelectorFragment>,
    /// Filter predicates, in order.
    pub groupings: Vec<GroupingFragment>,
    /// How the predicates combine.
    pub combine: CombineOp,
}

impl QuerySpec {
    /// True when nothing was selected and nothing filtered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty() && self.groupings.is_empty()
    }
}

/// A single `field == value` constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldConstraint {
    /// Object field name.
    pub field: String,
    /// Expected value, compared as text.
    pub value: String,
}

impl FieldConstraint {
    /// Build a constraint.
    #[must_use]
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Constraints that must all hold (one server round trip).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchGroup {
    /// The constraints.
    pub constraints: Vec<FieldConstraint>,
}

impl SearchGroup {
    /// A group holding a single constraint.
    #[must_use]
    pub fn single(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            constraints: vec![FieldConstraint::new(field, value)],
        }
    }

    /// The identity this group addresses, when it constrains `id`.
    #[must_use]
    pub fn id_value(&self) -> Option<ObjectId> {
        self.constraints
            .iter()
            .find(|c| c.field == "id")
            .and_then(|c| c.value.parse().ok())
    }
}

/// Search groups combined by union.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpec {
    /// The groups.
    pub groups: Vec<SearchGroup>,
}

impl SearchSpec {
    /// Search for a single object by id.
    #[must_use]
    pub fn by_id(id: ObjectId) -> Self {
        Self {
            groups: vec![SearchGroup::single("id", id.to_string())],
        }
    }

    /// Search for objects by name.
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            groups: vec![SearchGroup::single("name", name)],
        }
    }

    /// True when there are no constraints at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.constraints.is_empty())
    }

    /// Append a constraint to every group.
    #[must_use]
    pub fn with_constraint_on_every_group(
        mut self,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let constraint = FieldConstraint::new(field, value);
        for group in &mut self.groups {
            if !group.constraints.contains(&constraint) {
                group.constraints.push(constraint.clone());
            }
        }
        self
    }
}
