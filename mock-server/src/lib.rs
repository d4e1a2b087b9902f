//! In-memory stand-in for the CRM record API.
//!
//! Serves `POST /crm/private/{xml|json}/{module}/{method}` with
//! form-encoded parameters, answering in the same XML and JSON envelopes as
//! the hosted service (including its bare-object encoding of single rows).

pub mod xml;

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;

use crate::xml::{converted_reply, error_reply, message_reply, parse_rows, record_detail_reply, Row};

/// Ids start in the same range the hosted service uses.
const FIRST_ID: u64 = 2_000_000_000_001;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: String,
    pub fields: Row,
}

impl StoredRecord {
    fn get(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn set(&mut self, key: String, value: String) {
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }
}

#[derive(Debug)]
pub struct Store {
    next_id: u64,
    modules: HashMap<String, Vec<StoredRecord>>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            next_id: FIRST_ID,
            modules: HashMap::new(),
        }
    }
}

impl Store {
    fn insert(&mut self, module: &str, fields: Row) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        self.modules.entry(module.to_string()).or_default().push(StoredRecord {
            id: id.clone(),
            fields,
        });
        id
    }

    fn records(&self, module: &str) -> &[StoredRecord] {
        self.modules.get(module).map(Vec::as_slice).unwrap_or_default()
    }

    fn find_mut(&mut self, module: &str, id: &str) -> Option<&mut StoredRecord> {
        self.modules.get_mut(module)?.iter_mut().find(|record| record.id == id)
    }

    fn remove(&mut self, module: &str, id: &str) -> Option<StoredRecord> {
        let records = self.modules.get_mut(module)?;
        let index = records.iter().position(|record| record.id == id)?;
        Some(records.remove(index))
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/crm/private/{format}/{module}/{method}", post(dispatch))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Identifier column of a module, e.g. `Leads` -> `LEADID`.
pub fn id_field(module: &str) -> String {
    format!("{}ID", module.strip_suffix('s').unwrap_or(module).to_uppercase())
}

async fn dispatch(
    State(db): State<Db>,
    Path((format, module, method)): Path<(String, String, String)>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let uri = format!("/crm/private/{format}/{module}/{method}");
    info!(%format, %module, %method, "handling call");
    match (format.as_str(), method.as_str()) {
        ("xml", "insertRecords") => insert_records(&db, &uri, &module, &params).await,
        ("xml", "updateRecords") => update_records(&db, &uri, &module, &params).await,
        ("xml", "deleteRecords") => delete_records(&db, &uri, &module, &params).await,
        ("xml", "convertLead") if module == "Leads" => convert_lead(&db, &uri, &params).await,
        ("json", "getRecords") => get_records(&db, &uri, &module, &params).await,
        ("json", "getRecordById") => {
            let id = params.get("id").map(String::as_str).unwrap_or_default();
            let store = db.read().await;
            let found: Vec<&StoredRecord> =
                store.records(&module).iter().filter(|r| r.id == id).collect();
            json_rows(&uri, &module, &found)
        }
        ("json", "searchRecords") => {
            let criteria = params.get("criteria").map(String::as_str).unwrap_or_default();
            match parse_criteria(criteria) {
                Some((field, value)) => {
                    search(&db, &uri, &module, |r| r.get(&field) == Some(value.as_str())).await
                }
                None => json_error(&uri, "4832", "Invalid search criteria"),
            }
        }
        ("json", "getSearchRecords") => {
            let condition = params
                .get("searchCondition")
                .map(String::as_str)
                .unwrap_or_default();
            match parse_condition(condition) {
                Some((field, value)) => {
                    search(&db, &uri, &module, |r| r.get(&field) == Some(value.as_str())).await
                }
                None => json_error(&uri, "4832", "Invalid search condition"),
            }
        }
        ("json", "getSearchRecordsByPDC") => {
            let column = params.get("searchColumn").cloned().unwrap_or_default();
            let value = params.get("searchValue").cloned().unwrap_or_default();
            search(&db, &uri, &module, |r| {
                r.fields
                    .iter()
                    .any(|(k, v)| pdc_column(k) == pdc_column(&column) && *v == value)
            })
            .await
        }
        ("json", _) => json_error(&uri, "4500", "Invalid API method"),
        _ => xml_reply(error_reply(&uri, "4500", "Invalid API method")),
    }
}

async fn insert_records(
    db: &Db,
    uri: &str,
    module: &str,
    params: &HashMap<String, String>,
) -> Response {
    let rows = match request_rows(params) {
        Ok(rows) => rows,
        Err(reply) => return xml_reply(error_reply(uri, "4600", &reply)),
    };
    let mut store = db.write().await;
    let ids: Vec<String> = rows.into_iter().map(|row| store.insert(module, row)).collect();
    xml_reply(record_detail_reply(uri, "Record(s) added successfully", &ids))
}

async fn update_records(
    db: &Db,
    uri: &str,
    module: &str,
    params: &HashMap<String, String>,
) -> Response {
    let rows = match request_rows(params) {
        Ok(rows) => rows,
        Err(reply) => return xml_reply(error_reply(uri, "4600", &reply)),
    };
    let id = params.get("id").cloned().unwrap_or_default();
    let mut store = db.write().await;
    let Some(record) = store.find_mut(module, &id) else {
        return xml_reply(error_reply(uri, "4103", "Record does not exist"));
    };
    for (key, value) in rows.into_iter().flatten() {
        record.set(key, value);
    }
    xml_reply(record_detail_reply(uri, "Record(s) updated successfully", &[id]))
}

async fn delete_records(
    db: &Db,
    uri: &str,
    module: &str,
    params: &HashMap<String, String>,
) -> Response {
    let id = params.get("id").cloned().unwrap_or_default();
    match db.write().await.remove(module, &id) {
        Some(_) => xml_reply(message_reply(
            uri,
            "5000",
            &format!("Record Id(s) : {id},Record(s) deleted successfully"),
        )),
        None => xml_reply(error_reply(uri, "4103", "Record does not exist")),
    }
}

/// Moves the lead to Contacts, creates an Account from its Company and,
/// when the options ask for it, a Potential from the second option row.
async fn convert_lead(db: &Db, uri: &str, params: &HashMap<String, String>) -> Response {
    let options = match request_rows(params) {
        Ok(rows) => rows,
        Err(reply) => return xml_reply(error_reply(uri, "4600", &reply)),
    };
    let create_potential = options
        .first()
        .and_then(|row| row.iter().find(|(k, _)| k == "createPotential"))
        .is_some_and(|(_, v)| v == "true");

    let lead_id = params.get("leadId").cloned().unwrap_or_default();
    let mut store = db.write().await;
    let Some(lead) = store.remove("Leads", &lead_id) else {
        return xml_reply(error_reply(uri, "4103", "Record does not exist"));
    };

    let mut entities = Vec::new();
    entities.push(("Contact", store.insert("Contacts", lead.fields.clone())));
    if let Some(company) = lead.get("Company") {
        let account = vec![("Account Name".to_string(), company.to_string())];
        entities.push(("Account", store.insert("Accounts", account)));
    }
    if create_potential {
        let potential = options.get(1).cloned().unwrap_or_default();
        entities.push(("Potential", store.insert("Potentials", potential)));
    }
    xml_reply(converted_reply(&entities))
}

async fn get_records(
    db: &Db,
    uri: &str,
    module: &str,
    params: &HashMap<String, String>,
) -> Response {
    let from = params.get("fromIndex").and_then(|v| v.parse::<usize>().ok()).unwrap_or(1).max(1);
    let to = params.get("toIndex").and_then(|v| v.parse::<usize>().ok()).unwrap_or(usize::MAX);
    let store = db.read().await;
    let page: Vec<&StoredRecord> = store
        .records(module)
        .iter()
        .enumerate()
        .filter(|(i, _)| (from..=to).contains(&(i + 1)))
        .map(|(_, record)| record)
        .collect();
    json_rows(uri, module, &page)
}

async fn search(
    db: &Db,
    uri: &str,
    module: &str,
    matches: impl Fn(&StoredRecord) -> bool,
) -> Response {
    let store = db.read().await;
    let found: Vec<&StoredRecord> = store.records(module).iter().filter(|r| matches(r)).collect();
    json_rows(uri, module, &found)
}

fn request_rows(params: &HashMap<String, String>) -> Result<Vec<Row>, String> {
    let xml = params.get("xmlData").ok_or_else(|| {
        "Unable to process your request. The xmlData parameter is missing.".to_string()
    })?;
    parse_rows(xml).map_err(|e| format!("Unable to process your request. Invalid xmlData: {e}"))
}

/// `(Last Name:Smith)` -> (`Last Name`, `Smith`).
fn parse_criteria(criteria: &str) -> Option<(String, String)> {
    let inner = criteria.strip_prefix('(')?.strip_suffix(')')?;
    let (field, value) = inner.split_once(':')?;
    Some((field.to_string(), value.to_string()))
}

/// `(Last Name|=|Smith)` -> (`Last Name`, `Smith`). Only equality is supported.
fn parse_condition(condition: &str) -> Option<(String, String)> {
    let inner = condition.strip_prefix('(')?.strip_suffix(')')?;
    let mut parts = inner.splitn(3, '|');
    let field = parts.next()?;
    let op = parts.next()?;
    let value = parts.next()?;
    (op == "=").then(|| (field.to_string(), value.to_string()))
}

fn pdc_column(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase()
}

fn xml_reply(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml;charset=UTF-8")], body).into_response()
}

fn json_error(uri: &str, code: &str, message: &str) -> Response {
    Json(json!({"response": {"uri": uri, "error": {"code": code, "message": message}}}))
        .into_response()
}

/// Single rows and single fields are sent as bare objects, as the hosted
/// service does.
fn json_rows(uri: &str, module: &str, records: &[&StoredRecord]) -> Response {
    if records.is_empty() {
        return Json(json!({"response": {
            "uri": uri,
            "nodata": {"code": "4422", "message": "There is no data to show"}
        }}))
        .into_response();
    }

    let id_field = id_field(module);
    let rows: Vec<Value> = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let mut cells = vec![json!({"val": id_field, "content": record.id})];
            cells.extend(record.fields.iter().map(|(k, v)| json!({"val": k, "content": v})));
            let cells = if cells.len() == 1 { cells.remove(0) } else { Value::Array(cells) };
            json!({"no": (i + 1).to_string(), "FL": cells})
        })
        .collect();
    let rows = if rows.len() == 1 {
        rows.into_iter().next().unwrap_or_default()
    } else {
        Value::Array(rows)
    };
    Json(json!({"response": {"uri": uri, "result": {module: {"row": rows}}}})).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_field_singularizes_module() {
        assert_eq!(id_field("Leads"), "LEADID");
        assert_eq!(id_field("Potentials"), "POTENTIALID");
        assert_eq!(id_field("Cases"), "CASEID");
    }

    #[test]
    fn criteria_and_condition_parse() {
        assert_eq!(
            parse_criteria("(Last Name:Smith)"),
            Some(("Last Name".to_string(), "Smith".to_string()))
        );
        assert_eq!(
            parse_condition("(Email|=|a@b.test)"),
            Some(("Email".to_string(), "a@b.test".to_string()))
        );
        assert_eq!(parse_condition("(Email|contains|a)"), None);
        assert_eq!(parse_criteria("Last Name:Smith"), None);
    }

    #[test]
    fn store_assigns_sequential_ids() {
        let mut store = Store::default();
        let a = store.insert("Leads", vec![]);
        let b = store.insert("Leads", vec![]);
        assert_eq!(a, FIRST_ID.to_string());
        assert_eq!(b, (FIRST_ID + 1).to_string());
        assert!(store.remove("Leads", &a).is_some());
        assert_eq!(store.records("Leads").len(), 1);
    }

    #[test]
    fn pdc_column_ignores_case_and_spaces() {
        assert_eq!(pdc_column("Email"), pdc_column("email"));
        assert_eq!(pdc_column("Last Name"), "lastname");
    }
}
