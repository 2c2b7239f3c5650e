//! `{data, meta}` envelope for CRUD successes. `meta.datasource` names the datasource
//! that served the request; lists also carry `meta.count`.

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub datasource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

#[derive(Serialize)]
pub struct Envelope<T> {
    pub data: T,
    pub meta: Meta,
}

pub type Reply<T> = (StatusCode, Json<Envelope<T>>);

fn reply<T>(status: StatusCode, datasource: &str, data: T, count: Option<u64>) -> Reply<T> {
    let meta = Meta {
        datasource: datasource.to_string(),
        count,
    };
    (status, Json(Envelope { data, meta }))
}

/// 201 with the inserted row.
pub fn created<T: Serialize>(datasource: &str, data: T) -> Reply<T> {
    reply(StatusCode::CREATED, datasource, data, None)
}

pub fn one<T: Serialize>(datasource: &str, data: T) -> Reply<T> {
    reply(StatusCode::OK, datasource, data, None)
}

pub fn many<T: Serialize>(datasource: &str, data: Vec<T>) -> Reply<Vec<T>> {
    let count = data.len() as u64;
    reply(StatusCode::OK, datasource, data, Some(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_meta_has_count_and_source() {
        let (status, Json(body)) = many("reports", vec![1, 2, 3]);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.meta.count, Some(3));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["meta"], serde_json::json!({ "datasource": "reports", "count": 3 }));
    }

    #[test]
    fn single_rows_omit_count() {
        let (status, Json(body)) = created("default", "x");
        assert_eq!(status, StatusCode::CREATED);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["meta"], serde_json::json!({ "datasource": "default" }));
        assert_eq!(one("default", "x").0, StatusCode::OK);
    }
}
