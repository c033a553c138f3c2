//! Typed object model for platform objects.
//!
//! These structs mirror the server's object schema. Every retrievable
//! collection member implements [`Record`], which gives the retrieval engine
//! what it needs without knowing concrete types: the collection kind, the
//! server-assigned identity, and string access to any field for the
//! client-side filter workaround.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::ObjectId;

/// Object collections known to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Deployed actions.
    Action,
    /// Reporting agents (system status entries).
    Client,
    /// Computer groups.
    Group,
    /// Package specifications.
    Package,
    /// Asked questions.
    Question,
    /// Saved actions.
    SavedAction,
    /// Saved questions.
    SavedQuestion,
    /// Sensors (selector definitions).
    Sensor,
    /// System settings.
    Setting,
    /// Console users.
    User,
    /// User roles.
    UserRole,
    /// Whitelisted URLs.
    WhitelistedUrl,
    /// Approval records for saved actions (submit only).
    SavedActionApproval,
    /// Stop requests for running actions (submit only).
    ActionStop,
}

impl ObjectKind {
    /// Every kind that can be retrieved as a collection.
    pub const RETRIEVABLE: [Self; 12] = [
        Self::Action,
        Self::Client,
        Self::Group,
        Self::Package,
        Self::Question,
        Self::SavedAction,
        Self::SavedQuestion,
        Self::Sensor,
        Self::Setting,
        Self::User,
        Self::UserRole,
        Self::WhitelistedUrl,
    ];

    /// The plural collection name used in request paths and log lines.
    #[must_use]
    pub const fn collection_name(self) -> &'static str {
        match self {
            Self::Action => "actions",
            Self::Client => "clients",
            Self::Group => "groups",
            Self::Package => "packages",
            Self::Question => "questions",
            Self::SavedAction => "saved_actions",
            Self::SavedQuestion => "saved_questions",
            Self::Sensor => "sensors",
            Self::Setting => "settings",
            Self::User => "users",
            Self::UserRole => "user_roles",
            Self::WhitelistedUrl => "whitelisted_urls",
            Self::SavedActionApproval => "saved_action_approvals",
            Self::ActionStop => "action_stops",
        }
    }

    /// Known server-side retrieval defects for this collection.
    #[must_use]
    pub const fn defects(self) -> RetrievalDefects {
        match self {
            Self::Group => RetrievalDefects {
                group_id_lookup: true,
                ..RetrievalDefects::NONE
            },
            Self::Package => RetrievalDefects {
                singular_request: true,
                ..RetrievalDefects::NONE
            },
            Self::User | Self::UserRole | Self::WhitelistedUrl => RetrievalDefects {
                broken_filter: true,
                ..RetrievalDefects::NONE
            },
            _ => RetrievalDefects::NONE,
        }
    }

    /// Whether the server accepts delete requests for this kind.
    #[must_use]
    pub const fn supports_delete(self) -> bool {
        !matches!(
            self,
            Self::Action
                | Self::Client
                | Self::Question
                | Self::Setting
                | Self::UserRole
                | Self::SavedActionApproval
                | Self::ActionStop
        )
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection_name())
    }
}

impl FromStr for ObjectKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let kind = match normalized.as_str() {
            "action" | "actions" => Self::Action,
            "client" | "clients" => Self::Client,
            "group" | "groups" => Self::Group,
            "package" | "packages" => Self::Package,
            "question" | "questions" => Self::Question,
            "saved_action" | "saved_actions" => Self::SavedAction,
            "saved_question" | "saved_questions" => Self::SavedQuestion,
            "sensor" | "sensors" => Self::Sensor,
            "setting" | "settings" => Self::Setting,
            "user" | "users" => Self::User,
            "user_role" | "user_roles" => Self::UserRole,
            "whitelisted_url" | "whitelisted_urls" => Self::WhitelistedUrl,
            _ => return Err(CoreError::UnknownKind(s.to_string())),
        };
        Ok(kind)
    }
}

/// Per-collection flags for known server retrieval defects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalDefects {
    /// The server ignores cache filters and returns the whole collection.
    pub broken_filter: bool,
    /// List requests fail; objects must be addressed with a singular request.
    pub singular_request: bool,
    /// Filters on `id` cannot reach unnamed objects; use nested lookups.
    pub group_id_lookup: bool,
}

impl RetrievalDefects {
    /// No known defects.
    pub const NONE: Self = Self {
        broken_filter: false,
        singular_request: false,
        group_id_lookup: false,
    };
}

/// A shrunk reference to a server object (kind plus id/name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Collection the object belongs to.
    pub kind: ObjectKind,
    /// Server-assigned identity, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Object name, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ObjectRef {
    /// Reference an object by identity.
    #[must_use]
    pub const fn by_id(kind: ObjectKind, id: ObjectId) -> Self {
        Self {
            kind,
            id: Some(id),
            name: None,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(id) = self.id {
            write!(f, " id={id}")?;
        }
        if let Some(name) = &self.name {
            write!(f, " name={name:?}")?;
        }
        Ok(())
    }
}

/// A typed member of a retrievable collection.
pub trait Record: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    /// The collection this type belongs to.
    const KIND: ObjectKind;

    /// Server-assigned identity.
    fn id(&self) -> Option<ObjectId>;

    /// Human name, if the type has one.
    fn name(&self) -> Option<&str>;

    /// Shrink to a reference carrying only kind, id, and name.
    fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            kind: Self::KIND,
            id: self.id(),
            name: self.name().map(str::to_string),
        }
    }

    /// Render a field as the string the server would compare against.
    ///
    /// Flags render as `1`/`0` and numbers in decimal. Returns `None` when
    /// the field is absent or null.
    fn field_text(&self, field: &str) -> Option<String> {
        let value = serde_json::to_value(self).ok()?;
        value_text(value.get(field)?)
    }

    /// Identity comparison: by id, then by name, then by full value.
    fn same_object(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.id(), other.id()) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (self.name(), other.name()) {
            return a == b;
        }
        serde_json::to_value(self).ok() == serde_json::to_value(other).ok()
    }

    /// Decode a wire payload into this type.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MalformedObject` if the payload does not match.
    fn from_value(value: serde_json::Value) -> Result<Self, CoreError> {
        serde_json::from_value(value).map_err(|source| CoreError::MalformedObject {
            kind: Self::KIND,
            source,
        })
    }
}

fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

macro_rules! record {
    ($ty:ident, $kind:ident, $name:ident) => {
        impl Record for $ty {
            const KIND: ObjectKind = ObjectKind::$kind;

            fn id(&self) -> Option<ObjectId> {
                self.id
            }

            fn name(&self) -> Option<&str> {
                self.$name.as_deref()
            }
        }
    };
    ($ty:ident, $kind:ident) => {
        impl Record for $ty {
            const KIND: ObjectKind = ObjectKind::$kind;

            fn id(&self) -> Option<ObjectId> {
                self.id
            }

            fn name(&self) -> Option<&str> {
                None
            }
        }
    };
}

// =============================================================================
// Sensors and question building blocks
// =============================================================================

/// A parameter declared by a sensor definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterDefinition {
    /// Parameter key as used in `name{key=value}`.
    pub key: String,
    /// Display label.
    pub label: Option<String>,
    /// Explicit default value.
    pub default_value: String,
    /// Allowed values for drop-down style parameters.
    pub values: Vec<String>,
}

impl ParameterDefinition {
    /// The value filled in when a caller omits this parameter.
    ///
    /// Falls back to the first allowed value, then to the empty string.
    #[must_use]
    pub fn fill_value(&self) -> String {
        if !self.default_value.is_empty() {
            return self.default_value.clone();
        }
        self.values.first().cloned().unwrap_or_default()
    }
}

/// A sensor: a named data point that reporting agents can answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sensor {
    /// Server-assigned identity.
    pub id: Option<ObjectId>,
    /// Sensor name.
    pub name: Option<String>,
    /// Content hash of the sensor definition.
    pub hash: Option<u64>,
    /// Category label.
    pub category: Option<String>,
    /// Non-zero for sensors derived from another sensor.
    pub source_id: u64,
    /// Hidden sensors are excluded by default.
    pub hidden_flag: bool,
    /// Declared parameters, in definition order.
    pub parameter_definition: Vec<ParameterDefinition>,
}

record!(Sensor, Sensor, name);

/// A reference to a sensor inside a question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorRef {
    /// Sensor identity.
    pub id: Option<ObjectId>,
    /// Sensor name.
    pub name: Option<String>,
    /// Sensor hash.
    pub hash: Option<u64>,
}

impl From<&Sensor> for SensorRef {
    fn from(sensor: &Sensor) -> Self {
        Self {
            id: sensor.id,
            name: sensor.name.clone(),
            hash: sensor.hash,
        }
    }
}

/// A key/value parameter supplied to a sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter key.
    pub key: String,
    /// Parameter value.
    pub value: String,
}

impl Parameter {
    /// Build a parameter.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A selected sensor column in a question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Select {
    /// The sensor being selected.
    pub sensor: SensorRef,
    /// Parameters supplied to the sensor.
    pub parameters: Vec<Parameter>,
}

/// Comparison operators usable in a question filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    /// Numeric or lexical less-than.
    Less,
    /// Less-than-or-equal.
    LessEqual,
    /// Greater-than.
    Greater,
    /// Greater-than-or-equal.
    GreaterEqual,
    /// Exact equality.
    Equal,
    /// Inequality.
    NotEqual,
    /// Substring match.
    #[default]
    Contains,
    /// Negated substring match.
    NotContains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
    /// Regular expression match.
    RegexMatch,
    /// Negated regular expression match.
    NotRegexMatch,
    /// Hash equality.
    HashMatch,
}

/// A filter predicate applied to reporting agents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    /// The sensor whose answer is compared.
    pub sensor: SensorRef,
    /// Parameters supplied to the sensor.
    pub parameters: Vec<Parameter>,
    /// Comparison operator.
    pub operator: FilterOperator,
    /// Comparison value.
    pub value: String,
}

/// The filter group of a question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionGroup {
    /// `true` combines filters with AND, `false` with OR.
    pub and_flag: bool,
    /// Filters in the group.
    pub filters: Vec<Filter>,
}

// =============================================================================
// Questions
// =============================================================================

/// A question: the submittable query request object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Question {
    /// Server-assigned identity, absent until submitted.
    pub id: Option<ObjectId>,
    /// Server-rendered query text.
    pub query_text: Option<String>,
    /// When the question stops collecting answers.
    pub expiration: Option<DateTime<Utc>>,
    /// Requested lifetime in seconds.
    pub expire_seconds: Option<u64>,
    /// Skip the server's question lock.
    pub skip_lock_flag: bool,
    /// Selected sensors. Empty means the server's default selector.
    pub selects: Vec<Select>,
    /// Agent filter group. Absent means all reachable agents.
    pub group: Option<QuestionGroup>,
    /// Saved question that issued this question, if any.
    pub saved_question: Option<ObjectRef>,
}

record!(Question, Question);

impl Question {
    /// True when the question has neither selects nor a filter group, which
    /// the server answers with its default selector from all agents.
    #[must_use]
    pub fn is_default_query(&self) -> bool {
        self.selects.is_empty() && self.group.is_none()
    }
}

/// A saved question; its `question` points at the last asked instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedQuestion {
    /// Server-assigned identity.
    pub id: Option<ObjectId>,
    /// Saved question name.
    pub name: Option<String>,
    /// Query text of the saved definition.
    pub query_text: Option<String>,
    /// Last asked question instance.
    pub question: Option<ObjectRef>,
}

record!(SavedQuestion, SavedQuestion, name);

/// A request to parse free-form text into candidate questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseJob {
    /// Free-form question text.
    pub question_text: String,
    /// Parser generation to use.
    pub parser_version: u32,
}

impl ParseJob {
    /// Build a parse job with the current parser generation.
    #[must_use]
    pub fn new(question_text: impl Into<String>) -> Self {
        Self {
            question_text: question_text.into(),
            parser_version: 2,
        }
    }
}

/// One candidate interpretation returned by the server-side parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseResult {
    /// Relevance score; higher is better.
    pub score: i64,
    /// Canonical question text for this interpretation.
    pub question_text: String,
    /// The resolved question object.
    pub question: Question,
}

// =============================================================================
// Administrative objects
// =============================================================================

/// A computer group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    /// Server-assigned identity.
    pub id: Option<ObjectId>,
    /// Group name; unnamed groups exist as question filter groups.
    pub name: Option<String>,
    /// Rendered filter text.
    pub text: Option<String>,
    /// `true` combines filters with AND.
    pub and_flag: bool,
    /// Group filters.
    pub filters: Vec<Filter>,
}

record!(Group, Group, name);

/// A deployable package specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageSpec {
    /// Server-assigned identity.
    pub id: Option<ObjectId>,
    /// Package name.
    pub name: Option<String>,
    /// Command line run on the agent.
    pub command: Option<String>,
    /// Action lifetime in seconds.
    pub expire_seconds: Option<u64>,
    /// Hidden packages are excluded by default.
    pub hidden_flag: bool,
}

record!(PackageSpec, Package, name);

/// A user role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRole {
    /// Server-assigned identity.
    pub id: Option<ObjectId>,
    /// Role name.
    pub name: Option<String>,
    /// Role description.
    pub description: Option<String>,
}

record!(UserRole, UserRole, name);

/// A console user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// Server-assigned identity.
    pub id: Option<ObjectId>,
    /// Login name.
    pub name: Option<String>,
    /// Authentication domain.
    pub domain: Option<String>,
    /// Computer group the user is restricted to.
    pub group_id: Option<ObjectId>,
    /// Set on deleted users.
    pub deleted_flag: bool,
}

record!(User, User, name);

/// A whitelisted URL for package downloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistedUrl {
    /// Server-assigned identity.
    pub id: Option<ObjectId>,
    /// URL or regex pattern.
    pub url_regex: Option<String>,
    /// Refresh interval in seconds.
    pub download_seconds: u64,
}

record!(WhitelistedUrl, WhitelistedUrl, url_regex);

/// A deployed action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Action {
    /// Server-assigned identity.
    pub id: Option<ObjectId>,
    /// Action name.
    pub name: Option<String>,
    /// Server status text.
    pub status: Option<String>,
    /// Set once the action has been stopped.
    pub stopped_flag: bool,
    /// Package the action deploys.
    pub package_spec: Option<ObjectRef>,
    /// Saved action that issued this action.
    pub saved_action: Option<ObjectRef>,
}

record!(Action, Action, name);

/// A saved (scheduled or pending-approval) action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedAction {
    /// Server-assigned identity.
    pub id: Option<ObjectId>,
    /// Saved action name.
    pub name: Option<String>,
    /// Set once approved.
    pub approved_flag: bool,
    /// Server status text.
    pub status: Option<String>,
}

record!(SavedAction, SavedAction, name);

/// A system setting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSetting {
    /// Server-assigned identity.
    pub id: Option<ObjectId>,
    /// Setting name.
    pub name: Option<String>,
    /// Setting value.
    pub value: Option<String>,
}

record!(SystemSetting, Setting, name);

/// A reporting agent as seen by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemStatus {
    /// Agent computer id.
    pub computer_id: Option<String>,
    /// Agent host name.
    pub host_name: Option<String>,
    /// Agent address as seen by the server.
    pub ipaddress_client: Option<String>,
    /// Registration status text.
    pub status: Option<String>,
    /// Last registration time.
    pub last_registration: Option<DateTime<Utc>>,
}

impl Record for SystemStatus {
    const KIND: ObjectKind = ObjectKind::Client;

    fn id(&self) -> Option<ObjectId> {
        None
    }

    fn name(&self) -> Option<&str> {
        self.host_name.as_deref()
    }

    fn same_object(&self, other: &Self) -> bool {
        match (&self.computer_id, &other.computer_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.host_name == other.host_name,
        }
    }
}

/// Approval of a saved action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedActionApproval {
    /// Identity of the saved action being approved.
    pub id: Option<ObjectId>,
    /// Always set when submitting an approval.
    pub approved_flag: bool,
}

record!(SavedActionApproval, SavedActionApproval);

/// A request to stop a running action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionStop {
    /// Identity of the stop request, assigned on submit.
    pub id: Option<ObjectId>,
    /// The action to stop.
    pub action: Option<ObjectRef>,
}

record!(ActionStop, ActionStop);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parsing_accepts_both_forms() {
        assert_eq!("sensors".parse::<ObjectKind>().unwrap(), ObjectKind::Sensor);
        assert_eq!(
            "Saved-Question".parse::<ObjectKind>().unwrap(),
            ObjectKind::SavedQuestion
        );
        assert_eq!(
            "user roles".parse::<ObjectKind>().unwrap(),
            ObjectKind::UserRole
        );
        assert!("widgets".parse::<ObjectKind>().is_err());
    }

    #[test]
    fn defect_table() {
        assert!(ObjectKind::UserRole.defects().broken_filter);
        assert!(ObjectKind::User.defects().broken_filter);
        assert!(ObjectKind::WhitelistedUrl.defects().broken_filter);
        assert!(ObjectKind::Package.defects().singular_request);
        assert!(ObjectKind::Group.defects().group_id_lookup);
        assert_eq!(ObjectKind::Sensor.defects(), RetrievalDefects::NONE);
    }

    #[test]
    fn delete_support_table() {
        assert!(ObjectKind::Group.supports_delete());
        assert!(ObjectKind::Sensor.supports_delete());
        assert!(!ObjectKind::Question.supports_delete());
        assert!(!ObjectKind::UserRole.supports_delete());
    }

    #[test]
    fn field_text_renders_like_the_server() {
        let sensor = Sensor {
            id: Some(ObjectId::new(12)),
            name: Some("Computer Name".to_string()),
            hidden_flag: true,
            ..Default::default()
        };
        assert_eq!(sensor.field_text("id").as_deref(), Some("12"));
        assert_eq!(sensor.field_text("name").as_deref(), Some("Computer Name"));
        assert_eq!(sensor.field_text("hidden_flag").as_deref(), Some("1"));
        assert_eq!(sensor.field_text("source_id").as_deref(), Some("0"));
        assert_eq!(sensor.field_text("category"), None);
        assert_eq!(sensor.field_text("no_such_field"), None);
    }

    #[test]
    fn same_object_prefers_id_then_name() {
        let a = UserRole {
            id: Some(ObjectId::new(1)),
            name: Some("Admin".to_string()),
            description: None,
        };
        let renamed = UserRole {
            name: Some("Administrator".to_string()),
            ..a.clone()
        };
        assert!(a.same_object(&renamed));

        let other = UserRole {
            id: Some(ObjectId::new(2)),
            ..a.clone()
        };
        assert!(!a.same_object(&other));
    }

    #[test]
    fn from_value_reports_kind() {
        let err = Sensor::from_value(serde_json::json!({"id": "not-a-number"})).unwrap_err();
        assert!(matches!(
            err,
            CoreError::MalformedObject {
                kind: ObjectKind::Sensor,
                ..
            }
        ));
    }

    #[test]
    fn parameter_fill_value_fallbacks() {
        let explicit = ParameterDefinition {
            key: "dirname".to_string(),
            default_value: "C:\\".to_string(),
            ..Default::default()
        };
        assert_eq!(explicit.fill_value(), "C:\\");

        let listed = ParameterDefinition {
            key: "casesensitive".to_string(),
            values: vec!["No".to_string(), "Yes".to_string()],
            ..Default::default()
        };
        assert_eq!(listed.fill_value(), "No");

        let blank = ParameterDefinition {
            key: "regex".to_string(),
            ..Default::default()
        };
        assert_eq!(blank.fill_value(), "");
    }

    #[test]
    fn default_query_detection() {
        assert!(Question::default().is_default_query());
        let q = Question {
            selects: vec![Select::default()],
            ..Default::default()
        };
        assert!(!q.is_default_query());
    }

    #[test]
    fn object_ref_display() {
        let r = ObjectRef {
            kind: ObjectKind::SavedQuestion,
            id: Some(ObjectId::new(5)),
            name: Some("Daily".to_string()),
        };
        assert_eq!(r.to_string(), "saved_questions id=5 name=\"Daily\"");
    }
}
