//! Shapes browser form state into the provider's create-from-template payload.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Editable {
    #[serde(default)]
    pub template_id: Option<String>,
    pub template_name: Option<String>,
    #[serde(default)]
    pub actions: Vec<EditableAction>,
    pub field_text_data: Option<HashMap<String, String>>,
    pub field_boolean_data: Option<HashMap<String, bool>>,
    pub field_date_data: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EditableAction {
    /// the UI sends numeric or string ids
    pub action_id: Value,
    pub action_type: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub verify_recipient: bool,
    pub verification_type: Option<String>,
}

/// `{ editable }` body of the create-document route
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocumentRequest {
    pub editable: Option<Editable>,
}

/// Listing page of the templates endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PageContext {
    pub row_count: u32,
    pub start_index: u32,
    pub search_columns: Map<String, Value>,
    pub sort_column: String,
    pub sort_order: String,
}

impl Default for PageContext {
    fn default() -> Self {
        Self {
            row_count: 100,
            start_index: 1,
            search_columns: Map::new(),
            sort_column: "created_time".to_owned(),
            sort_order: "DESC".to_owned(),
        }
    }
}

pub fn build_template_payload(editable: &Editable) -> Value {
    let actions: Vec<Value> = editable
        .actions
        .iter()
        .map(|a| {
            let mut action = json!({
                "action_id": action_id_string(&a.action_id),
                "action_type": a.action_type.clone().unwrap_or_else(|| "SIGN".to_owned()),
                "recipient_name": a.recipient_name.clone().unwrap_or_default(),
                "role": a.role.clone().unwrap_or_default(),
                "recipient_email": a.recipient_email.clone().unwrap_or_default(),
                "recipient_phonenumber": "",
                "recipient_countrycode": "",
                "private_notes": "",
                "verify_recipient": a.verify_recipient,
                "delivery_mode": "EMAIL",
            });
            let verification_type = a
                .verification_type
                .clone()
                .or_else(|| a.verify_recipient.then(|| "EMAIL".to_owned()));
            if let Some(verification_type) = verification_type {
                action["verification_type"] = Value::String(verification_type);
            }
            action
        })
        .collect();

    json!({
        "templates": {
            "request_name": editable
                .template_name
                .clone()
                .unwrap_or_else(|| "Created from template".to_owned()),
            "field_data": {
                "field_text_data": editable.field_text_data.clone().unwrap_or_default(),
                "field_boolean_data": editable.field_boolean_data.clone().unwrap_or_default(),
                "field_date_data": editable.field_date_data.clone().unwrap_or_default(),
            },
            "actions": actions,
            "notes": "",
        }
    })
}

fn action_id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
