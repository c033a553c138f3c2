//! In-memory transport for tests.
//!
//! Stores objects per collection, applies cache filters the way a healthy
//! server would, and replays scripted progress snapshots and export states.
//! Every call is recorded so tests can assert on ordering and on calls that
//! must never happen.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use fleetq_core::{
    ExportId, ObjectId, ObjectKind, ObjectRef, ParseJob, ParseResult, Record, ResultInfo,
    ResultSet,
};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Result, TransportError};
use crate::transport::Transport;
use crate::types::{CacheFilter, ExportRequest, FetchRequest, FetchTarget};

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    /// `submit`.
    Submit {
        /// Collection the object was submitted to.
        kind: ObjectKind,
        /// Submitted body.
        body: Value,
    },
    /// `fetch_objects`.
    Fetch(FetchRequest),
    /// `fetch_result_info`.
    ResultInfo(ObjectRef),
    /// `fetch_result_data`.
    ResultData {
        /// Target object.
        object: ObjectRef,
        /// Aggregate flag.
        row_counts_only: bool,
    },
    /// `start_bulk_export`.
    StartExport(ExportRequest),
    /// `bulk_export_status`.
    ExportStatus(ExportId),
    /// `bulk_export_payload`.
    ExportPayload(ExportId),
    /// `server_version`.
    ServerVersion,
    /// `delete`.
    Delete(ObjectRef),
    /// `parse_question`.
    Parse(ParseJob),
}

#[derive(Default)]
struct State {
    objects: HashMap<ObjectKind, Vec<Value>>,
    ignore_filters: Vec<ObjectKind>,
    next_id: u64,
    result_info: HashMap<(ObjectKind, ObjectId), VecDeque<ResultInfo>>,
    result_data: HashMap<ObjectId, ResultSet>,
    refresh_updates: HashMap<ObjectId, VecDeque<Value>>,
    export_statuses: VecDeque<String>,
    export_payload: Vec<u8>,
    export_count: u64,
    version: Option<String>,
    parse_results: Vec<ParseResult>,
    calls: Vec<TransportCall>,
}

/// A mock transport that keeps everything in memory.
pub struct MockTransport {
    state: Mutex<State>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create an empty mock transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1000,
                ..State::default()
            }),
        }
    }

    /// Set the reported server version. `None` makes the call fail.
    pub fn set_version(&self, version: Option<&str>) {
        self.state.lock().version = version.map(str::to_string);
    }

    /// Store a raw object in a collection.
    pub fn insert(&self, kind: ObjectKind, value: Value) {
        self.state.lock().objects.entry(kind).or_default().push(value);
    }

    /// Store a typed object in its collection.
    ///
    /// # Panics
    ///
    /// Panics if the object cannot be serialized.
    pub fn insert_record<R: Record>(&self, record: &R) {
        let value = serde_json::to_value(record).expect("record serializes");
        self.insert(R::KIND, value);
    }

    /// Make the collection ignore cache filters and return everything.
    pub fn ignore_filters_for(&self, kind: ObjectKind) {
        self.state.lock().ignore_filters.push(kind);
    }

    /// Script successive progress snapshots for an object.
    ///
    /// Each call pops the next snapshot; the last one repeats.
    pub fn script_result_info(
        &self,
        kind: ObjectKind,
        id: ObjectId,
        snapshots: impl IntoIterator<Item = ResultInfo>,
    ) {
        self.state
            .lock()
            .result_info
            .insert((kind, id), snapshots.into_iter().collect());
    }

    /// Set the answer rows returned for a question.
    pub fn set_result_data(&self, question_id: ObjectId, data: ResultSet) {
        self.state.lock().result_data.insert(question_id, data);
    }

    /// Script the saved question states that successive refreshes produce.
    ///
    /// A progress request against the saved question replaces its stored
    /// object with the next scripted value.
    pub fn script_refresh(&self, saved_question_id: ObjectId, updates: impl IntoIterator<Item = Value>) {
        self.state
            .lock()
            .refresh_updates
            .insert(saved_question_id, updates.into_iter().collect());
    }

    /// Script successive export status texts; the last one repeats.
    pub fn script_export_statuses(&self, statuses: impl IntoIterator<Item = &'static str>) {
        self.state.lock().export_statuses = statuses.into_iter().map(str::to_string).collect();
    }

    /// Set the export payload.
    pub fn set_export_payload(&self, payload: impl Into<Vec<u8>>) {
        self.state.lock().export_payload = payload.into();
    }

    /// Set the parser candidates.
    pub fn set_parse_results(&self, results: Vec<ParseResult>) {
        self.state.lock().parse_results = results;
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls matching a predicate.
    #[must_use]
    pub fn count_calls(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Objects currently stored in a collection.
    #[must_use]
    pub fn objects(&self, kind: ObjectKind) -> Vec<Value> {
        self.state
            .lock()
            .objects
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: TransportCall) {
        self.state.lock().calls.push(call);
    }
}

fn field_matches(object: &Value, filter: &CacheFilter) -> bool {
    let text = match object.get(&filter.field) {
        None | Some(Value::Null) => return false,
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => if *b { "1" } else { "0" }.to_string(),
        Some(other) => other.to_string(),
    };
    text == filter.value
}

fn object_id(object: &Value) -> Option<ObjectId> {
    object.get("id").and_then(Value::as_u64).map(ObjectId::new)
}

fn is_hidden(object: &Value) -> bool {
    object
        .get("hidden_flag")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn upsert(collection: &mut Vec<Value>, value: Value) {
    let id = object_id(&value);
    match collection
        .iter_mut()
        .find(|existing| id.is_some() && object_id(existing) == id)
    {
        Some(existing) => *existing = value,
        None => collection.push(value),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn submit(&self, kind: ObjectKind, body: &Value) -> Result<ObjectId> {
        self.record(TransportCall::Submit {
            kind,
            body: body.clone(),
        });
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = ObjectId::new(state.next_id);

        let mut stored = body.clone();
        if let Value::Object(map) = &mut stored {
            map.insert("id".to_string(), Value::from(id.get()));
        }
        state.objects.entry(kind).or_default().push(stored);
        Ok(id)
    }

    async fn fetch_objects(&self, request: &FetchRequest) -> Result<Vec<Value>> {
        self.record(TransportCall::Fetch(request.clone()));
        let state = self.state.lock();
        let collection = state.objects.get(&request.kind).cloned().unwrap_or_default();
        let ignore_filters = state.ignore_filters.contains(&request.kind);

        let selected: Vec<Value> = match &request.target {
            FetchTarget::Lookup { ids } => collection
                .into_iter()
                .filter(|o| object_id(o).is_some_and(|id| ids.contains(&id)))
                .collect(),
            FetchTarget::Single { id: Some(id) } => {
                let found: Vec<Value> = collection
                    .into_iter()
                    .filter(|o| object_id(o) == Some(*id))
                    .collect();
                if found.is_empty() {
                    return Err(TransportError::NotFound(format!(
                        "{} id={id}",
                        request.kind
                    )));
                }
                found
            }
            FetchTarget::List | FetchTarget::Single { id: None } => collection
                .into_iter()
                .filter(|o| request.include_hidden || !is_hidden(o))
                .filter(|o| ignore_filters || request.filters.iter().all(|f| field_matches(o, f)))
                .collect(),
        };
        Ok(selected)
    }

    async fn fetch_result_info(&self, object: &ObjectRef) -> Result<ResultInfo> {
        self.record(TransportCall::ResultInfo(object.clone()));
        let id = object
            .id
            .ok_or_else(|| TransportError::Internal(format!("no id on {object}")))?;
        let mut state = self.state.lock();

        if object.kind == ObjectKind::SavedQuestion {
            if let Some(update) = state.refresh_updates.get_mut(&id).and_then(VecDeque::pop_front) {
                let collection = state.objects.entry(ObjectKind::SavedQuestion).or_default();
                upsert(collection, update);
            }
        }

        let queue = state
            .result_info
            .get_mut(&(object.kind, id))
            .ok_or_else(|| TransportError::NotFound(format!("result info for {object}")))?;
        let snapshot = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        snapshot.ok_or_else(|| TransportError::NotFound(format!("result info for {object}")))
    }

    async fn fetch_result_data(&self, object: &ObjectRef, row_counts_only: bool) -> Result<ResultSet> {
        self.record(TransportCall::ResultData {
            object: object.clone(),
            row_counts_only,
        });
        let state = self.state.lock();
        let data = object
            .id
            .and_then(|id| state.result_data.get(&id).cloned())
            .unwrap_or_else(|| ResultSet {
                question_id: object.id,
                ..ResultSet::default()
            });
        Ok(data)
    }

    async fn start_bulk_export(&self, request: &ExportRequest) -> Result<ExportId> {
        self.record(TransportCall::StartExport(request.clone()));
        let mut state = self.state.lock();
        state.export_count += 1;
        ExportId::parse(&format!("export-{}", state.export_count))
            .map_err(|e| TransportError::Internal(e.to_string()))
    }

    async fn bulk_export_status(&self, export_id: &ExportId) -> Result<String> {
        self.record(TransportCall::ExportStatus(export_id.clone()));
        let mut state = self.state.lock();
        let status = if state.export_statuses.len() > 1 {
            state.export_statuses.pop_front()
        } else {
            state.export_statuses.front().cloned()
        };
        Ok(status.unwrap_or_else(|| "Completed.".to_string()))
    }

    async fn bulk_export_payload(&self, export_id: &ExportId) -> Result<Vec<u8>> {
        self.record(TransportCall::ExportPayload(export_id.clone()));
        Ok(self.state.lock().export_payload.clone())
    }

    fn decode_result_set(&self, payload: &[u8]) -> Result<ResultSet> {
        serde_json::from_slice(payload).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn server_version(&self) -> Result<String> {
        self.record(TransportCall::ServerVersion);
        self.state
            .lock()
            .version
            .clone()
            .ok_or_else(|| TransportError::Request("info endpoint unreachable".to_string()))
    }

    async fn delete(&self, object: &ObjectRef) -> Result<()> {
        self.record(TransportCall::Delete(object.clone()));
        let mut state = self.state.lock();
        let collection = state.objects.entry(object.kind).or_default();
        let before = collection.len();
        collection.retain(|o| object.id.is_none() || object_id(o) != object.id);
        if collection.len() == before {
            return Err(TransportError::NotFound(object.to_string()));
        }
        Ok(())
    }

    async fn parse_question(&self, job: &ParseJob) -> Result<Vec<ParseResult>> {
        self.record(TransportCall::Parse(job.clone()));
        Ok(self.state.lock().parse_results.clone())
    }
}
