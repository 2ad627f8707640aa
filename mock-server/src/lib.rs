//! In-memory HTTP backend used to exercise the networking core end to end.
//!
//! Routes:
//! - `GET /things?limit&offset&delay_ms`, `POST /things`
//! - `GET /things/{id}`, `DELETE /things/{id}` (204)
//! - `GET /secure/things`, 401 unless `Authorization: Bearer letmein`
//! - `ANY /echo` reflects method, path, query, headers and body
//! - `GET /snake` answers with snake_case keys
//! - `ANY /status/{code}` answers with that status

use std::{sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, Query, RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Token `/secure/things` accepts.
pub const ACCESS_TOKEN: &str = "letmein";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    pub id: Uuid,
    pub name: String,
    pub number: i64,
}

#[derive(Deserialize)]
pub struct CreateThing {
    pub name: String,
    #[serde(default)]
    pub number: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Hold the response back, so clients can cancel it in flight.
    pub delay_ms: Option<u64>,
}

/// What `/echo` reports about the request it received.
#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Things in insertion order.
pub type Db = Arc<RwLock<Vec<Thing>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Vec::new()));
    Router::new()
        .route("/things", get(list_things).post(create_thing))
        .route("/things/{id}", get(get_thing).delete(delete_thing))
        .route("/secure/things", get(secure_things))
        .route("/echo", any(echo))
        .route("/snake", get(snake))
        .route("/status/{code}", any(status))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "mock server listening");
    }
    axum::serve(listener, app()).await
}

async fn list_things(State(db): State<Db>, Query(params): Query<ListParams>) -> Json<Vec<Thing>> {
    if let Some(ms) = params.delay_ms {
        tracing::debug!(ms, "delaying list response");
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
    let things = db.read().await;
    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(usize::MAX);
    Json(things.iter().skip(offset).take(limit).cloned().collect())
}

async fn create_thing(
    State(db): State<Db>,
    Json(input): Json<CreateThing>,
) -> (StatusCode, Json<Thing>) {
    let thing = Thing {
        id: Uuid::new_v4(),
        name: input.name,
        number: input.number,
    };
    tracing::debug!(id = %thing.id, "created thing");
    db.write().await.push(thing.clone());
    (StatusCode::CREATED, Json(thing))
}

async fn get_thing(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Json<Thing>, StatusCode> {
    let things = db.read().await;
    things
        .iter()
        .find(|t| t.id == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn delete_thing(State(db): State<Db>, Path(id): Path<Uuid>) -> StatusCode {
    let mut things = db.write().await;
    match things.iter().position(|t| t.id == id) {
        Some(index) => {
            things.remove(index);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn secure_things(State(db): State<Db>, headers: HeaderMap) -> Response {
    let expected = format!("Bearer {ACCESS_TOKEN}");
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);
    if !authorized {
        tracing::debug!("rejecting unauthorized request");
        return (StatusCode::UNAUTHORIZED, "missing or invalid token").into_response();
    }
    Json(db.read().await.clone()).into_response()
}

async fn echo(method: Method, uri: Uri, RawQuery(query): RawQuery, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query,
        headers: headers
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn snake() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "key_one": "v", "key_two": 2 }))
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, format!("status {code}")).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}
