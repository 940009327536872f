//! Success envelopes: `{"data": row}` for one row, `{"data": [...], "meta": {"count": n}}` for lists.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct Data {
    pub data: Value,
}

#[derive(Serialize)]
pub struct DataList {
    pub data: Vec<Value>,
    pub meta: ListMeta,
}

#[derive(Serialize)]
pub struct ListMeta {
    pub count: usize,
}

pub type Reply<T> = (StatusCode, Json<T>);

/// 201 with the freshly stored row as re-read from the database.
pub fn created(row: Value) -> Reply<Data> {
    (StatusCode::CREATED, Json(Data { data: row }))
}

pub fn ok(row: Value) -> Reply<Data> {
    (StatusCode::OK, Json(Data { data: row }))
}

pub fn listed(rows: Vec<Value>) -> Reply<DataList> {
    let meta = ListMeta { count: rows.len() };
    (StatusCode::OK, Json(DataList { data: rows, meta }))
}
