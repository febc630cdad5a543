//! Reshape nested API records into flat warehouse rows.

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use rapidflow_utils::Row;

use crate::sources::content_repo::PageView;
use crate::sources::rapidpro::{Contact, Flow, Group, Run};

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

/// RFC 3339 with microseconds and an explicit `+00:00` offset.
pub fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Coerce a run value to text. Strings pass through, null is empty.
///
/// Null maps to `""` rather than `"None"`, and booleans keep their JSON
/// spelling (`true`, not `True`). Both are deliberate.
pub fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// WhatsApp number of a contact as `+<number>`.
///
/// The last URN decides: a whatsapp URN yields its number, any other URN
/// yields a bare `+`. A contact without URNs gets a single space.
pub fn wa_urn(urns: &[String]) -> String {
    let mut urn = " ".to_string();
    for candidate in urns {
        urn = if candidate.contains("whatsapp") {
            let number = candidate.split(':').nth(1).unwrap_or_default();
            format!("+{number}")
        } else {
            "+".to_string()
        };
    }
    urn
}

pub fn group_row(group: &Group) -> Row {
    row(json!({ "uuid": group.uuid, "name": group.name }))
}

/// Contact row with only the configured custom fields copied over.
pub fn contact_row(contact: &Contact, fields: &HashSet<String>) -> Row {
    let mut record = row(json!({
        "uuid": contact.uuid,
        "modified_on": iso(&contact.modified_on),
        "name": contact.name,
        "urn": wa_urn(&contact.urns),
    }));
    for (key, value) in &contact.fields {
        if fields.contains(key) {
            record.insert(key.clone(), value.clone());
        }
    }
    record
}

pub fn group_contact_rows(contact: &Contact) -> Vec<Row> {
    contact
        .groups
        .iter()
        .map(|g| row(json!({ "contact_uuid": contact.uuid, "group_uuid": g.uuid })))
        .collect()
}

pub fn flow_row(flow: &Flow) -> Row {
    let labels: Vec<&str> = flow.labels.iter().map(|l| l.name.as_str()).collect();
    row(json!({ "uuid": flow.uuid, "name": flow.name, "labels": labels }))
}

pub fn run_row(run: &Run) -> Row {
    row(json!({
        "id": run.id,
        "flow_uuid": run.flow.uuid,
        "contact_uuid": run.contact.uuid,
        "responded": run.responded,
        "created_at": iso(&run.created_on),
        "modified_on": iso(&run.modified_on),
        "exited_on": run.exited_on.as_ref().map(iso),
        "exit_type": run.exit_type,
    }))
}

pub fn run_value_rows(run: &Run) -> Vec<Row> {
    run.values
        .values()
        .map(|v| {
            row(json!({
                "run_id": run.id,
                "value": coerce_string(&v.value),
                "category": v.category,
                "time": iso(&v.time),
                "name": v.name,
                "input": v.input,
            }))
        })
        .collect()
}

/// Page view row. Run and contact come from `data` only when it carries both.
pub fn page_view_row(view: &PageView) -> Row {
    let (run_uuid, contact_uuid) = match (view.data.get("run_uuid"), view.data.get("contact_uuid")) {
        (Some(run), Some(contact)) => (coerce_string(run), coerce_string(contact)),
        _ => (String::new(), String::new()),
    };
    row(json!({
        "timestamp": view.timestamp,
        "page": view.page,
        "revision": view.revision,
        "id": view.id,
        "run_uuid": run_uuid,
        "contact_uuid": contact_uuid,
    }))
}
