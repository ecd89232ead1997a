//! Shared test utilities for netbox-sync integration tests.
//!
//! `MockNetbox` serves the subset of the NetBox DCIM REST API the sync
//! client uses, backed by in-memory state the tests can inspect.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch};
use axum::{Json, Router};
use netbox_sync::Config;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const TOKEN: &str = "0123456789abcdef";

#[derive(Default)]
pub struct MockState {
    next_id: i64,
    pub devices: BTreeMap<i64, Value>,
    pub sites: Vec<(i64, String)>,
    pub roles: Vec<(i64, String)>,
    pub types: Vec<(i64, String)>,
    /// Method and path of every request, e.g. "POST /api/dcim/devices/".
    pub requests: Vec<String>,
    /// Answer device endpoints with 503.
    pub unavailable: bool,
    /// Report roles under `device_role` like NetBox releases before 3.6.
    pub legacy_roles: bool,
    /// Report roles under both `role` and `device_role` like NetBox 3.6 and 3.7.
    pub dual_roles: bool,
}

impl MockState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn lookup(list: &[(i64, String)], id: i64) -> Option<String> {
        list.iter().find(|(i, _)| *i == id).map(|(_, n)| n.clone())
    }

    fn record(&self, id: i64, body: &Value) -> Option<Value> {
        let site = body["site"].as_i64()?;
        let role = body["role"].as_i64()?;
        let device_type = body["device_type"].as_i64()?;
        let role_ref = json!({ "id": role, "name": Self::lookup(&self.roles, role)? });

        let mut record = json!({
            "id": id,
            "url": format!("http://netbox/api/dcim/devices/{}/", id),
            "name": body["name"],
            "site": { "id": site, "name": Self::lookup(&self.sites, site)? },
            "device_type": {
                "id": device_type,
                "model": Self::lookup(&self.types, device_type)?,
                "manufacturer": { "id": 1, "name": "Cisco" }
            },
            "status": { "value": "active", "label": "Active" },
        });
        if self.legacy_roles || self.dual_roles {
            record["device_role"] = role_ref.clone();
        }
        if !self.legacy_roles {
            record["role"] = role_ref;
        }
        Some(record)
    }
}

type Shared = Arc<Mutex<MockState>>;

/// Mock NetBox server bound to an ephemeral local port.
pub struct MockNetbox {
    pub addr: SocketAddr,
    state: Shared,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl MockNetbox {
    pub async fn spawn() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            next_id: 41,
            ..Default::default()
        }));

        let router = Router::new()
            .route("/api/dcim/devices/", get(list_devices).post(create_device))
            .route(
                "/api/dcim/devices/{id}/",
                patch(update_device).delete(delete_device),
            )
            .route("/api/dcim/sites/", get(list_sites))
            .route("/api/dcim/device-roles/", get(list_roles))
            .route("/api/dcim/device-types/", get(list_types))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr,
            state,
            shutdown_tx,
        }
    }

    /// Spawn with the NYC / router / ISR4451 references in place.
    pub async fn seeded() -> Self {
        let server = Self::spawn().await;
        server.add_site("NYC");
        server.add_role("router");
        server.add_type("ISR4451");
        server
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> Config {
        Config::new(self.url(), TOKEN)
            .with_retry_interval(Duration::from_millis(100))
            .with_request_timeout(Duration::from_secs(5))
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn add_site(&self, name: &str) -> i64 {
        let mut state = self.state();
        let id = state.next_id();
        state.sites.push((id, name.to_string()));
        id
    }

    pub fn add_role(&self, name: &str) -> i64 {
        let mut state = self.state();
        let id = state.next_id();
        state.roles.push((id, name.to_string()));
        id
    }

    pub fn add_type(&self, model: &str) -> i64 {
        let mut state = self.state();
        let id = state.next_id();
        state.types.push((id, model.to_string()));
        id
    }

    /// Insert a device directly, bypassing the API.
    pub fn add_device(&self, name: &str, site: i64, role: i64, device_type: i64) -> i64 {
        let mut state = self.state();
        let id = state.next_id();
        let body = json!({ "name": name, "site": site, "role": role, "device_type": device_type });
        let record = state.record(id, &body).expect("unknown reference");
        state.devices.insert(id, record);
        id
    }

    pub fn devices_named(&self, name: &str) -> Vec<Value> {
        self.state()
            .devices
            .values()
            .filter(|d| d["name"] == name)
            .cloned()
            .collect()
    }

    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn authorize(headers: &HeaderMap) -> Result<(), StatusCode> {
    let expected = format!("Token {}", TOKEN);
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(StatusCode::FORBIDDEN),
    }
}

fn page(results: Vec<Value>) -> Json<Value> {
    Json(json!({
        "count": results.len(),
        "next": null,
        "previous": null,
        "results": results,
    }))
}

fn log(state: &Shared, line: String) -> MutexGuard<'_, MockState> {
    let mut guard = state.lock().unwrap();
    guard.requests.push(line);
    guard
}

async fn list_devices(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    let guard = log(&state, "GET /api/dcim/devices/".to_string());
    authorize(&headers)?;
    if guard.unavailable {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    let results = guard
        .devices
        .values()
        .filter(|d| match query.get("name") {
            Some(name) => d["name"] == name.as_str(),
            None => true,
        })
        .cloned()
        .collect();
    Ok(page(results))
}

async fn create_device(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let mut guard = log(&state, "POST /api/dcim/devices/".to_string());
    authorize(&headers)?;
    if guard.unavailable {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    let id = guard.next_id();
    let record = guard.record(id, &body).ok_or(StatusCode::BAD_REQUEST)?;
    guard.devices.insert(id, record.clone());
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_device(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let mut guard = log(&state, format!("PATCH /api/dcim/devices/{}/", id));
    authorize(&headers)?;
    if guard.unavailable {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    if !guard.devices.contains_key(&id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let record = guard.record(id, &body).ok_or(StatusCode::BAD_REQUEST)?;
    guard.devices.insert(id, record.clone());
    Ok(Json(record))
}

async fn delete_device(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> StatusCode {
    let mut guard = log(&state, format!("DELETE /api/dcim/devices/{}/", id));
    if let Err(status) = authorize(&headers) {
        return status;
    }
    if guard.unavailable {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match guard.devices.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

fn list_refs(
    state: &Shared,
    headers: &HeaderMap,
    path: &str,
    value: Option<&String>,
    pick: impl Fn(&MockState) -> &Vec<(i64, String)>,
    field: &str,
) -> Result<Json<Value>, StatusCode> {
    let guard = log(state, format!("GET {}", path));
    authorize(headers)?;
    let results = pick(&*guard)
        .iter()
        .filter(|(_, n)| value.is_none_or(|v| v == n))
        .map(|(id, n)| json!({ "id": id, field: n, "slug": n.to_lowercase() }))
        .collect();
    Ok(page(results))
}

async fn list_sites(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    list_refs(&state, &headers, "/api/dcim/sites/", query.get("name"), |s| &s.sites, "name")
}

async fn list_roles(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    list_refs(&state, &headers, "/api/dcim/device-roles/", query.get("name"), |s| &s.roles, "name")
}

async fn list_types(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    list_refs(&state, &headers, "/api/dcim/device-types/", query.get("model"), |s| &s.types, "model")
}
