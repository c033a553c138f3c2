//! Core types for fleetq.
//!
//! This crate provides the foundational types used throughout fleetq:
//!
//! - **Identifiers**: server-assigned object ids and bulk export tokens
//! - **Versions**: dotted-integer server versions and OR-style requirements
//! - **Objects**: the typed object model for every platform collection
//! - **Specs**: coerced query specs and administrative search specs
//! - **Results**: progress snapshots, result sets, and export formats
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use fleetq_core::{ServerVersion, VersionRequirement};
//!
//! let fixed = VersionRequirement::parse_any_of(["6.5.314.4300"]).unwrap();
//! let server: ServerVersion = "6.5.314.4301".parse().unwrap();
//! assert!(fixed.is_satisfied_by(&server));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod objects;
pub mod results;
pub mod spec;
pub mod version;

pub use error::{CoreError, Result};
pub use ids::{ExportId, IdError, ObjectId};
pub use objects::{
    Action, ActionStop, Filter, FilterOperator, Group, ObjectKind, ObjectRef, PackageSpec,
    Parameter, ParameterDefinition, ParseJob, ParseResult, Question, QuestionGroup, Record,
    RetrievalDefects, SavedAction, SavedActionApproval, SavedQuestion, Select, Sensor, SensorRef,
    SystemSetting, SystemStatus, User, UserRole, WhitelistedUrl,
};
pub use results::{Column, ExportFormat, ResultData, ResultInfo, ResultSet, Row};
pub use spec::{
    CombineOp, FieldConstraint, GroupingFragment, QuerySpec, SearchGroup, SearchSpec,
    SelectorFragment,
};
pub use version::{ServerVersion, VersionRequirement};
