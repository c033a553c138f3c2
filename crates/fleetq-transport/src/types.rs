//! Request types exchanged with the transport.

use fleetq_core::{ExportFormat, FieldConstraint, ObjectId, ObjectKind, ObjectRef};
use serde::{Deserialize, Serialize};

/// A server-side equality filter applied during retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFilter {
    /// Object field to compare.
    pub field: String,
    /// Value the field must equal.
    pub value: String,
}

impl From<&FieldConstraint> for CacheFilter {
    fn from(constraint: &FieldConstraint) -> Self {
        Self {
            field: constraint.field.clone(),
            value: constraint.value.clone(),
        }
    }
}

/// How a retrieval request addresses the collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum FetchTarget {
    /// A list-typed request over the whole collection.
    #[default]
    List,
    /// A singular-typed request, optionally for one identity.
    Single {
        /// Identity of the addressed object.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<ObjectId>,
    },
    /// Nested lookup objects, one per identity.
    Lookup {
        /// Identities to resolve.
        ids: Vec<ObjectId>,
    },
}

/// The single retrieval primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Collection to read.
    pub kind: ObjectKind,
    /// How the request addresses the collection.
    #[serde(flatten)]
    pub target: FetchTarget,
    /// Equality filters combined with AND.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<CacheFilter>,
    /// Include hidden objects.
    #[serde(default)]
    pub include_hidden: bool,
}

impl FetchRequest {
    /// An unfiltered list request for a collection.
    #[must_use]
    pub const fn list(kind: ObjectKind) -> Self {
        Self {
            kind,
            target: FetchTarget::List,
            filters: Vec::new(),
            include_hidden: false,
        }
    }

    /// Replace the filter list.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<CacheFilter>) -> Self {
        self.filters = filters;
        self
    }

    /// Set whether hidden objects are included.
    #[must_use]
    pub const fn include_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }
}

/// Parameters of a bulk export start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Question whose answers are exported.
    pub question: ObjectRef,
    /// Requested export format.
    pub format: ExportFormat,
    /// Text placed before the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leading_text: Option<String>,
    /// Text placed after the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_text: Option<String>,
}
