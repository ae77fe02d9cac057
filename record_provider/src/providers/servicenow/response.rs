use serde::Deserialize;
use serde_json::{Map, Value};

/// Envelope of every Table API page.
#[derive(Deserialize, Debug)]
pub struct TableResponse {
    pub result: Vec<Map<String, Value>>,
}
