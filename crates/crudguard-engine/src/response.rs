use serde::Serialize;
use serde_json::Value;

/// One page of `find_many` results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindManyResponse {
    pub data: Vec<Value>,
    pub total_records: u64,
    pub page_count: u64,
    pub page: u64,
    pub page_size: u64,
    pub order_by: Value,
}
