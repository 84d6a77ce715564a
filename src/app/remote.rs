//! Task store backed by a remote record service.
//!
//! The service speaks a generic table protocol: `fetchRecords`,
//! `getRecordById`, `createRecord`, `updateRecord` and `deleteRecord`, each
//! answering with an [`Envelope`]. Batch calls report per-record outcomes in
//! `results`; the first failed record is surfaced as the operation's error,
//! while the records that succeeded stay applied.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::app::error::StoreError;
use crate::app::models::{NewTask, Patch, Priority, Task, TaskPatch};
use crate::app::store::{newest_first, TaskStore};

pub const DEFAULT_TABLE: &str = "task_c";
const PAGE_LIMIT: u32 = 100;

const ALL_FIELDS: [&str; 11] = [
    "Id",
    "Name",
    "title_c",
    "completed_c",
    "priority_c",
    "due_date_c",
    "category_c",
    "notes_c",
    "completed_at_c",
    "CreatedOn",
    "ModifiedOn",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldName {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field: FieldName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    pub field_name: String,
    pub sorttype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagingInfo {
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WhereClause {
    pub field_name: String,
    pub operator: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchParams {
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging_info: Option<PagingInfo>,
    #[serde(default, rename = "where", skip_serializing_if = "Vec::is_empty")]
    pub where_clauses: Vec<WhereClause>,
}

impl FetchParams {
    // Projection of every task column
    pub fn all_fields() -> FetchParams {
        FetchParams {
            fields: ALL_FIELDS
                .iter()
                .map(|name| FieldSpec {
                    field: FieldName {
                        name: name.to_string(),
                    },
                })
                .collect(),
            ..FetchParams::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordsParams {
    pub records: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteParams {
    #[serde(rename = "RecordIds")]
    pub record_ids: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub results: Option<Vec<RecordResult>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordResult {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field_label: String,
    pub message: String,
}

pub trait RecordService {
    fn fetch_records(&self, table: &str, params: &FetchParams) -> Result<Envelope, StoreError>;

    fn get_record_by_id(
        &self,
        table: &str,
        id: u64,
        params: &FetchParams,
    ) -> Result<Envelope, StoreError>;

    fn create_record(&self, table: &str, params: &RecordsParams) -> Result<Envelope, StoreError>;

    fn update_record(&self, table: &str, params: &RecordsParams) -> Result<Envelope, StoreError>;

    fn delete_record(&self, table: &str, params: &DeleteParams) -> Result<Envelope, StoreError>;
}

// A task row as the service returns it
#[derive(Debug, Deserialize)]
struct RemoteRecord {
    #[serde(rename = "Id")]
    id: u64,
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(default)]
    title_c: Option<String>,
    #[serde(default)]
    completed_c: Option<bool>,
    #[serde(default)]
    priority_c: Option<String>,
    #[serde(default)]
    due_date_c: Option<String>,
    #[serde(default)]
    category_c: Option<String>,
    #[serde(default)]
    notes_c: Option<String>,
    #[serde(default)]
    completed_at_c: Option<String>,
    #[serde(rename = "CreatedOn", default)]
    created_on: Option<String>,
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// Dates come back either as "2024-05-02" or as a full timestamp
fn parse_date(value: &str) -> Option<NaiveDate> {
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

impl RemoteRecord {
    fn into_task(self) -> Task {
        let completed = self.completed_c.unwrap_or(false);
        Task {
            id: self.id,
            title: self.title_c.or(self.name).unwrap_or_default(),
            completed,
            priority: self.priority_c.as_deref().and_then(Priority::parse),
            due_date: self.due_date_c.as_deref().and_then(parse_date),
            category: self.category_c.filter(|category| !category.is_empty()),
            notes: self.notes_c.unwrap_or_default(),
            created_at: self
                .created_on
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            completed_at: self.completed_at_c.as_deref().and_then(parse_timestamp),
        }
    }
}

fn decode_task(value: Value) -> Result<Task, StoreError> {
    let record: RemoteRecord = serde_json::from_value(value)
        .map_err(|e| StoreError::Remote(format!("unexpected record shape: {}", e)))?;
    Ok(record.into_task())
}

fn date_value(date: &Option<NaiveDate>) -> Value {
    match date {
        Some(date) => Value::String(date.format("%Y-%m-%d").to_string()),
        None => Value::Null,
    }
}

fn timestamp_value(timestamp: &Option<DateTime<Utc>>) -> Value {
    match timestamp {
        Some(timestamp) => Value::String(timestamp.to_rfc3339()),
        None => Value::Null,
    }
}

fn priority_value(priority: &Option<Priority>) -> Value {
    match priority {
        Some(priority) => Value::String(priority.as_str().to_string()),
        None => Value::Null,
    }
}

// Only supplied fields are sent; Set(None) goes out as an explicit null
fn patch_fields(patch: &TaskPatch) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Patch::Set(title) = &patch.title {
        fields.insert("title_c".into(), Value::String(title.clone()));
    }
    if let Patch::Set(completed) = &patch.completed {
        fields.insert("completed_c".into(), Value::Bool(*completed));
    }
    if let Patch::Set(priority) = &patch.priority {
        fields.insert("priority_c".into(), priority_value(priority));
    }
    if let Patch::Set(due_date) = &patch.due_date {
        fields.insert("due_date_c".into(), date_value(due_date));
    }
    if let Patch::Set(category) = &patch.category {
        let value = category.clone().map(Value::String).unwrap_or(Value::Null);
        fields.insert("category_c".into(), value);
    }
    if let Patch::Set(notes) = &patch.notes {
        fields.insert("notes_c".into(), Value::String(notes.clone()));
    }
    if let Patch::Set(completed_at) = &patch.completed_at {
        fields.insert("completed_at_c".into(), timestamp_value(completed_at));
    }
    fields
}

// Creation leaves out empty optional fields entirely
fn new_task_fields(fields: &NewTask) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert("title_c".into(), Value::String(fields.title.clone()));
    record.insert("completed_c".into(), Value::Bool(false));
    if let Some(priority) = fields.priority {
        record.insert("priority_c".into(), Value::String(priority.as_str().into()));
    }
    if fields.due_date.is_some() {
        record.insert("due_date_c".into(), date_value(&fields.due_date));
    }
    if let Some(category) = &fields.category {
        record.insert("category_c".into(), Value::String(category.clone()));
    }
    if let Some(notes) = fields.notes.as_ref().filter(|notes| !notes.is_empty()) {
        record.insert("notes_c".into(), Value::String(notes.clone()));
    }
    record
}

fn check(envelope: Envelope, operation: &str) -> Result<Envelope, StoreError> {
    if envelope.success {
        return Ok(envelope);
    }
    let message = envelope
        .message
        .unwrap_or_else(|| format!("{} failed", operation));
    error!(operation, %message, "Record service rejected request");
    Err(StoreError::Remote(message))
}

fn item_error(result: &RecordResult) -> StoreError {
    if let Some(field_error) = result.errors.first() {
        return StoreError::Validation {
            field: field_error.field_label.clone(),
            message: field_error.message.clone(),
        };
    }
    StoreError::Remote(
        result
            .message
            .clone()
            .unwrap_or_else(|| "record operation failed".to_string()),
    )
}

// Logs every failed item and returns the first one as the error
fn first_failure(results: &[RecordResult], operation: &str) -> Option<StoreError> {
    let failed: Vec<&RecordResult> = results.iter().filter(|result| !result.success).collect();
    if failed.is_empty() {
        return None;
    }
    error!(
        operation,
        failed = failed.len(),
        total = results.len(),
        "Record service reported failed records"
    );
    Some(item_error(failed[0]))
}

pub struct RemoteTaskStore<S: RecordService> {
    service: S,
    table: String,
}

impl<S: RecordService> RemoteTaskStore<S> {
    pub fn new(service: S, table: &str) -> RemoteTaskStore<S> {
        RemoteTaskStore {
            service,
            table: table.to_string(),
        }
    }

    #[cfg(test)]
    pub fn service(&self) -> &S {
        &self.service
    }

    // The subset of `ids` the service currently knows, keyed in input order
    fn existing(&self, ids: &[u64]) -> Result<Vec<Task>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut params = FetchParams::all_fields();
        params.where_clauses.push(WhereClause {
            field_name: "Id".into(),
            operator: "ExactMatch".into(),
            values: ids.iter().map(|id| Value::from(*id)).collect(),
        });
        let envelope = check(
            self.service.fetch_records(&self.table, &params)?,
            "fetchRecords",
        )?;
        let found = self.decode_list(envelope.data)?;
        Ok(ids
            .iter()
            .filter_map(|id| found.iter().find(|task| task.id == *id).cloned())
            .collect())
    }

    fn decode_list(&self, data: Option<Value>) -> Result<Vec<Task>, StoreError> {
        return match data {
            Some(Value::Array(rows)) => rows.into_iter().map(decode_task).collect(),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(StoreError::Remote(format!(
                "expected a list of records, got {}",
                other
            ))),
        };
    }

    // Single-record write: first failure is the error, otherwise the first record back
    fn single_result(&self, envelope: Envelope, operation: &str) -> Result<Task, StoreError> {
        let results = envelope.results.unwrap_or_default();
        if let Some(err) = first_failure(&results, operation) {
            return Err(err);
        }
        let data = results
            .into_iter()
            .find_map(|result| result.data)
            .ok_or_else(|| StoreError::Remote(format!("{} returned no record", operation)))?;
        decode_task(data)
    }
}

impl<S: RecordService> TaskStore for RemoteTaskStore<S> {
    fn describe(&self) -> String {
        format!("remote:{}", self.table)
    }

    fn get_all(&self) -> Result<Vec<Task>, StoreError> {
        let mut params = FetchParams::all_fields();
        params.order_by.push(OrderBy {
            field_name: "CreatedOn".into(),
            sorttype: "DESC".into(),
        });
        params.paging_info = Some(PagingInfo {
            limit: PAGE_LIMIT,
            offset: 0,
        });
        let envelope = check(
            self.service.fetch_records(&self.table, &params)?,
            "fetchRecords",
        )?;
        let mut tasks = self.decode_list(envelope.data)?;
        newest_first(&mut tasks);
        debug!(count = tasks.len(), "Fetched remote tasks");
        Ok(tasks)
    }

    fn get_by_id(&self, id: u64) -> Result<Task, StoreError> {
        let envelope = check(
            self.service
                .get_record_by_id(&self.table, id, &FetchParams::all_fields())?,
            "getRecordById",
        )?;
        match envelope.data {
            Some(Value::Null) | None => Err(StoreError::NotFound { id }),
            Some(data) => decode_task(data),
        }
    }

    fn create(&mut self, fields: NewTask) -> Result<Task, StoreError> {
        let params = RecordsParams {
            records: vec![new_task_fields(&fields)],
        };
        let envelope = check(
            self.service.create_record(&self.table, &params)?,
            "createRecord",
        )?;
        let task = self.single_result(envelope, "createRecord")?;
        debug!(id = task.id, "Created remote task");
        Ok(task)
    }

    fn update(&mut self, id: u64, patch: &TaskPatch) -> Result<Task, StoreError> {
        // Absent ids are reported as NotFound rather than as a service failure
        self.get_by_id(id)?;

        let mut record = patch_fields(patch);
        record.insert("Id".into(), Value::from(id));
        let params = RecordsParams {
            records: vec![record],
        };
        let envelope = check(
            self.service.update_record(&self.table, &params)?,
            "updateRecord",
        )?;
        self.single_result(envelope, "updateRecord")
    }

    fn delete(&mut self, id: u64) -> Result<Task, StoreError> {
        let task = self.get_by_id(id)?;
        let params = DeleteParams {
            record_ids: vec![id],
        };
        let envelope = check(
            self.service.delete_record(&self.table, &params)?,
            "deleteRecord",
        )?;
        if let Some(err) = first_failure(&envelope.results.unwrap_or_default(), "deleteRecord") {
            return Err(err);
        }
        debug!(id, "Deleted remote task");
        Ok(task)
    }

    // Returned records follow the order of the service's results
    fn bulk_update(&mut self, ids: &[u64], patch: &TaskPatch) -> Result<Vec<Task>, StoreError> {
        let targets = self.existing(ids)?;
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let fields = patch_fields(patch);
        let records = targets
            .iter()
            .map(|task| {
                let mut record = fields.clone();
                record.insert("Id".into(), Value::from(task.id));
                record
            })
            .collect();
        let envelope = check(
            self.service
                .update_record(&self.table, &RecordsParams { records })?,
            "updateRecord",
        )?;
        let results = envelope.results.unwrap_or_default();
        if let Some(err) = first_failure(&results, "updateRecord") {
            return Err(err);
        }
        results
            .into_iter()
            .filter_map(|result| result.data)
            .map(decode_task)
            .collect()
    }

    fn bulk_delete(&mut self, ids: &[u64]) -> Result<Vec<Task>, StoreError> {
        let targets = self.existing(ids)?;
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let target_ids: Vec<u64> = targets.iter().map(|task| task.id).collect();
        let params = DeleteParams {
            record_ids: target_ids.clone(),
        };
        let envelope = check(
            self.service.delete_record(&self.table, &params)?,
            "deleteRecord",
        )?;
        let results = match envelope.results {
            Some(results) => results,
            // A bare success covers the whole batch
            None => return Ok(targets),
        };
        if let Some(err) = first_failure(&results, "deleteRecord") {
            return Err(err);
        }
        if results.len() == targets.len() {
            return Ok(targets
                .into_iter()
                .zip(results.iter())
                .filter(|(_, result)| result.success)
                .map(|(task, _)| task)
                .collect());
        }

        // Results cannot be paired with the request; ask what is still there
        warn!(
            requested = targets.len(),
            reported = results.len(),
            "deleteRecord result count does not match request"
        );
        let remaining = self.existing(&target_ids)?;
        Ok(targets
            .into_iter()
            .filter(|task| !remaining.iter().any(|left| left.id == task.id))
            .collect())
    }
}

// RecordService over HTTP: POST {base_url}/{table}/{operation} with the
// parameters as the JSON body, answered by an envelope.
pub struct HttpRecordService {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ByIdRequest<'a> {
    #[serde(rename = "Id")]
    id: u64,
    #[serde(flatten)]
    params: &'a FetchParams,
}

impl HttpRecordService {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<HttpRecordService, StoreError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(HttpRecordService {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn call<B: Serialize>(
        &self,
        table: &str,
        operation: &str,
        body: &B,
    ) -> Result<Envelope, StoreError> {
        let url = format!("{}/{}/{}", self.base_url, table, operation);
        debug!(%url, "Calling record service");

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "Record service returned an error status");
            return Err(StoreError::Remote(format!("{} returned {}", url, status)));
        }
        Ok(response.json::<Envelope>()?)
    }
}

impl RecordService for HttpRecordService {
    fn fetch_records(&self, table: &str, params: &FetchParams) -> Result<Envelope, StoreError> {
        self.call(table, "fetchRecords", params)
    }

    fn get_record_by_id(
        &self,
        table: &str,
        id: u64,
        params: &FetchParams,
    ) -> Result<Envelope, StoreError> {
        self.call(table, "getRecordById", &ByIdRequest { id, params })
    }

    fn create_record(&self, table: &str, params: &RecordsParams) -> Result<Envelope, StoreError> {
        self.call(table, "createRecord", params)
    }

    fn update_record(&self, table: &str, params: &RecordsParams) -> Result<Envelope, StoreError> {
        self.call(table, "updateRecord", params)
    }

    fn delete_record(&self, table: &str, params: &DeleteParams) -> Result<Envelope, StoreError> {
        self.call(table, "deleteRecord", params)
    }
}
