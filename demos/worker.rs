//! A request-handling worker in the style of an edge-function template:
//! user records, a key-value cache, an object store, and a few numeric
//! endpoints, all behind one router.
//!
//! The storage capabilities here are in-memory stand-ins. A real deployment
//! swaps the fields of `Worker` for database / cache / blob-store clients;
//! the handlers and the routing table stay the same.
//!
//! Run with:
//!   RUST_LOG=perch=debug,info cargo run --example worker
//!
//! Try:
//!   curl -X POST localhost:8787/api/users -d '{"name":"Ada","email":"ADA@example.com"}'
//!   curl 'localhost:8787/api/users?page=1&limit=10'
//!   curl -X PUT localhost:8787/api/cached/greeting -d 'hello'
//!   curl localhost:8787/api/cached/greeting
//!   curl -X PUT localhost:8787/api/files/logo.png -H 'content-type: image/png' --data-binary @logo.png
//!   curl -X POST localhost:8787/api/compute/statistics -d '{"data":[1,2,3,4,5]}'
//!   curl -X POST localhost:8787/api/compute/matrix -d '{"operation":"determinant","a":[[1,2],[3,4]]}'
//!   curl -X POST localhost:8787/api/predict -d '{"features":[1.0,2.0,3.0]}'

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use nalgebra::DMatrix;
use perch::{BoxError, Envelope, IntoResponse, Request, Response, Router, Server, ServerConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CACHE_TTL: Duration = Duration::from_secs(3600);
const MAX_PAGE_SIZE: usize = 100;

// ── Capabilities ──────────────────────────────────────────────────────────────

/// Everything the handlers can reach. Built once, shared by every request.
struct Worker {
    db: RwLock<Vec<User>>,
    cache: RwLock<HashMap<String, (String, Instant)>>,
    cache_ttl: Duration,
    storage: RwLock<HashMap<String, StoredObject>>,
    model: LinearModel,
}

impl Default for Worker {
    fn default() -> Self {
        Self {
            db: RwLock::default(),
            cache: RwLock::default(),
            cache_ttl: CACHE_TTL,
            storage: RwLock::default(),
            model: LinearModel::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct User {
    id: String,
    name: String,
    email: String,
    created_at: u64,
}

struct StoredObject {
    content_type: String,
    body: Bytes,
}

struct LinearModel {
    weights: Vec<f64>,
    bias: f64,
}

impl Default for LinearModel {
    fn default() -> Self {
        Self { weights: vec![0.5, 0.3, 0.2], bias: 0.1 }
    }
}

impl LinearModel {
    fn predict(&self, features: &[f64]) -> f64 {
        self.weights.iter().zip(features).map(|(w, f)| w * f).sum::<f64>() + self.bias
    }
}

type Reply = Result<Envelope, BoxError>;

#[tokio::main]
async fn main() -> Result<(), perch::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env();
    info!(addr = %config.addr, "starting worker");
    Server::from_config(&config)?.serve(routes(), Worker::default()).await
}

fn routes() -> Router<Worker> {
    // Order matters: the first matching pattern wins.
    Router::new()
        .get("/", index)
        .get("/health", health)
        .get("/api/users", list_users)
        .post("/api/users", create_user)
        .get("/api/users/:id", get_user)
        .put("/api/users/:id", update_user)
        .delete("/api/users/:id", delete_user)
        .get("/api/cached/:key", cache_get)
        .put("/api/cached/:key", cache_put)
        .get("/api/files/:key", file_get)
        .put("/api/files/:key", file_put)
        .post("/api/compute/statistics", statistics)
        .post("/api/compute/normalize", normalize)
        .post("/api/compute/matrix", matrix)
        .post("/api/predict", predict)
}

/// Parses a JSON body the way the handlers expect it: a non-empty object.
/// `{}`, `null`, arrays and malformed JSON all count as "Invalid JSON body".
fn json_body<T: DeserializeOwned>(req: &Request) -> Option<T> {
    match req.json::<Value>()? {
        Value::Object(map) if !map.is_empty() => serde_json::from_value(Value::Object(map)).ok(),
        _ => None,
    }
}

async fn index(_req: Request, _w: Arc<Worker>) -> Result<Response, BoxError> {
    Ok(Response::text("perch worker v1.0"))
}

async fn health(_req: Request, _w: Arc<Worker>) -> Reply {
    Ok(Envelope::success(json!({ "status": "healthy", "timestamp": now() })))
}

// ── Users ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct UserInput {
    name: Option<String>,
    email: Option<String>,
}

async fn list_users(req: Request, w: Arc<Worker>) -> Reply {
    let page = match req.query("page").map(str::parse::<usize>) {
        None => 1,
        Some(Ok(p)) if p >= 1 => p,
        Some(_) => return Ok(Envelope::error("page must be a positive integer")),
    };
    let limit = match req.query("limit").map(str::parse::<usize>) {
        None => 10,
        Some(Ok(l)) => l.min(MAX_PAGE_SIZE),
        Some(Err(_)) => return Ok(Envelope::error("limit must be an integer")),
    };

    let Some(offset) = (page - 1).checked_mul(limit) else {
        return Ok(Envelope::error("page out of range"));
    };

    let db = w.db.read().await;
    let users: Vec<&User> = db.iter().rev().skip(offset).take(limit).collect();

    Ok(Envelope::success(json!({
        "data": users,
        "page": page,
        "limit": limit,
        "total": db.len(),
    })))
}

async fn create_user(req: Request, w: Arc<Worker>) -> Reply {
    let Some(input) = json_body::<UserInput>(&req) else {
        return Ok(Envelope::error("Invalid JSON body"));
    };

    let name = input.name.unwrap_or_default().trim().to_owned();
    let email = input.email.unwrap_or_default().trim().to_lowercase();
    if name.is_empty() {
        return Ok(Envelope::error("Name is required"));
    }
    if !email.contains('@') {
        return Ok(Envelope::error("Valid email is required"));
    }

    let mut db = w.db.write().await;
    if db.iter().any(|u| u.email == email) {
        return Ok(Envelope::conflict("Email already exists"));
    }

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        email,
        created_at: now(),
    };
    db.push(user.clone());
    Ok(Envelope::created(user))
}

async fn get_user(req: Request, w: Arc<Worker>) -> Reply {
    let id = req.param("id").unwrap_or_default();
    Ok(match w.db.read().await.iter().find(|u| u.id == id) {
        Some(user) => Envelope::success(user),
        None => Envelope::not_found("User not found"),
    })
}

async fn update_user(req: Request, w: Arc<Worker>) -> Reply {
    let id = req.param("id").unwrap_or_default();
    let mut db = w.db.write().await;
    let Some(index) = db.iter().position(|u| u.id == id) else {
        return Ok(Envelope::not_found("User not found"));
    };

    let Some(input) = json_body::<UserInput>(&req) else {
        return Ok(Envelope::error("Invalid JSON body"));
    };

    let mut user = db[index].clone();
    if let Some(name) = input.name {
        let name = name.trim();
        if name.is_empty() {
            return Ok(Envelope::error("Name cannot be empty"));
        }
        user.name = name.to_owned();
    }
    if let Some(email) = input.email {
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Ok(Envelope::error("Invalid email"));
        }
        if db.iter().any(|u| u.email == email && u.id != user.id) {
            return Ok(Envelope::conflict("Email already exists"));
        }
        user.email = email;
    }

    db[index] = user.clone();
    Ok(Envelope::success(user))
}

async fn delete_user(req: Request, w: Arc<Worker>) -> Reply {
    let id = req.param("id").unwrap_or_default();
    let mut db = w.db.write().await;
    let before = db.len();
    db.retain(|u| u.id != id);
    if db.len() == before {
        return Ok(Envelope::not_found("User not found"));
    }
    Ok(Envelope::success(()))
}

// ── Cache ─────────────────────────────────────────────────────────────────────

async fn cache_get(req: Request, w: Arc<Worker>) -> Result<Response, BoxError> {
    let key = req.param("key").unwrap_or_default();
    Ok(match w.cache.read().await.get(key) {
        Some((value, expires)) if *expires > Instant::now() => Response::text(value.clone()),
        _ => Envelope::not_found("Not found").into_response(),
    })
}

async fn cache_put(req: Request, w: Arc<Worker>) -> Result<Response, BoxError> {
    let key = req.param("key").unwrap_or_default().to_owned();
    let mut cache = w.cache.write().await;
    let now = Instant::now();
    cache.retain(|_, (_, expires)| *expires > now);
    cache.insert(key, (req.text(), now + w.cache_ttl));
    Ok(Response::text("Cached"))
}

// ── Object storage ────────────────────────────────────────────────────────────

async fn file_get(req: Request, w: Arc<Worker>) -> Result<Response, BoxError> {
    let key = req.param("key").unwrap_or_default();
    Ok(match w.storage.read().await.get(key) {
        Some(obj) => Response::builder().content(&obj.content_type, obj.body.clone()),
        None => Envelope::not_found("Not found").into_response(),
    })
}

async fn file_put(req: Request, w: Arc<Worker>) -> Result<Response, BoxError> {
    let key = req.param("key").unwrap_or_default().to_owned();
    let content_type = req.header("content-type").unwrap_or("application/octet-stream").to_owned();
    let body = Bytes::copy_from_slice(req.body());
    w.storage.write().await.insert(key, StoredObject { content_type, body });
    Ok(Response::text("Uploaded"))
}

// ── Compute ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct DataInput {
    data: Option<Value>,
}

/// Pulls a non-empty numeric array out of `{"data": [...]}`.
fn numbers(req: &Request) -> Result<Vec<f64>, Envelope> {
    let input = json_body::<DataInput>(req).ok_or_else(|| Envelope::error("Invalid JSON body"))?;
    let values = match input.data {
        Some(Value::Array(values)) if !values.is_empty() => values,
        _ => return Err(Envelope::error("Data array is required")),
    };
    values
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Envelope::error("Data array must contain only numbers"))
}

async fn statistics(req: Request, _w: Arc<Worker>) -> Reply {
    let mut data = match numbers(&req) {
        Ok(data) => data,
        Err(envelope) => return Ok(envelope),
    };
    data.sort_by(f64::total_cmp);

    let n = data.len() as f64;
    let sum: f64 = data.iter().sum();
    let mean = sum / n;
    let std = (data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();

    Ok(Envelope::success(json!({
        "count": data.len(),
        "sum": sum,
        "mean": mean,
        "std": std,
        "min": data[0],
        "max": data[data.len() - 1],
        "median": percentile(&data, 50.0),
        "percentiles": {
            "25": percentile(&data, 25.0),
            "50": percentile(&data, 50.0),
            "75": percentile(&data, 75.0),
            "90": percentile(&data, 90.0),
            "99": percentile(&data, 99.0),
        },
    })))
}

/// Linear interpolation between closest ranks. `sorted` must be non-empty.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let (lo, hi) = (rank.floor() as usize, rank.ceil() as usize);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

async fn normalize(req: Request, _w: Arc<Worker>) -> Reply {
    let data = match numbers(&req) {
        Ok(data) => data,
        Err(envelope) => return Ok(envelope),
    };

    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let normalized: Vec<f64> = if max == min {
        vec![0.0; data.len()]
    } else {
        data.iter().map(|x| (x - min) / (max - min)).collect()
    };

    Ok(Envelope::success(json!({
        "normalized": normalized,
        "original_min": min,
        "original_max": max,
    })))
}

#[derive(Deserialize)]
struct PredictInput {
    #[serde(default)]
    features: Vec<f64>,
}

async fn predict(req: Request, w: Arc<Worker>) -> Reply {
    let Some(input) = json_body::<PredictInput>(&req) else {
        return Ok(Envelope::error("Invalid JSON body"));
    };
    if input.features.len() != w.model.weights.len() {
        return Ok(Envelope::error(format!("Expected {} features", w.model.weights.len())));
    }

    Ok(Envelope::success(json!({
        "prediction": w.model.predict(&input.features),
        "features": input.features,
    })))
}

#[derive(Deserialize)]
struct MatrixInput {
    operation: Option<String>,
    a: Option<Vec<Vec<f64>>>,
    b: Option<Vec<Vec<f64>>>,
}

async fn matrix(req: Request, _w: Arc<Worker>) -> Reply {
    let Some(input) = json_body::<MatrixInput>(&req) else {
        return Ok(Envelope::error("Invalid JSON body"));
    };
    let operation = input.operation.unwrap_or_default();
    Ok(match matrix_op(&operation, input.a.as_deref(), input.b.as_deref()) {
        Ok(result) => Envelope::success(json!({ "result": result, "operation": operation })),
        Err(message) => Envelope::error(message),
    })
}

fn matrix_op(operation: &str, a: Option<&[Vec<f64>]>, b: Option<&[Vec<f64>]>) -> Result<Value, String> {
    let operand = |rows: Option<&[Vec<f64>]>, name: &str| {
        rows.ok_or_else(|| format!("Matrix error: `{name}` is required"))
            .and_then(to_matrix)
    };

    match operation {
        "multiply" => {
            let (a, b) = (operand(a, "a")?, operand(b, "b")?);
            if a.ncols() != b.nrows() {
                return Err(format!(
                    "Matrix error: cannot multiply {}x{} by {}x{}",
                    a.nrows(), a.ncols(), b.nrows(), b.ncols(),
                ));
            }
            Ok(json!(to_rows(&(a * b))))
        }
        "add" => {
            let (a, b) = (operand(a, "a")?, operand(b, "b")?);
            if a.shape() != b.shape() {
                return Err("Matrix error: operands must have the same shape".to_owned());
            }
            Ok(json!(to_rows(&(a + b))))
        }
        "inverse" => {
            let a = square(operand(a, "a")?)?;
            a.try_inverse()
                .map(|inv| json!(to_rows(&inv)))
                .ok_or_else(|| "Matrix error: matrix is singular".to_owned())
        }
        "determinant" => Ok(json!(square(operand(a, "a")?)?.determinant())),
        "eigenvalues" => {
            let values = square(operand(a, "a")?)?.complex_eigenvalues();
            // Real spectra come back as plain numbers, complex ones as [re, im].
            if values.iter().all(|c| c.im.abs() < 1e-12) {
                Ok(json!(values.iter().map(|c| c.re).collect::<Vec<_>>()))
            } else {
                Ok(json!(values.iter().map(|c| [c.re, c.im]).collect::<Vec<_>>()))
            }
        }
        other => Err(format!("Unknown operation: {other}")),
    }
}

fn to_matrix(rows: &[Vec<f64>]) -> Result<DMatrix<f64>, String> {
    let ncols = rows.first().map_or(0, Vec::len);
    if ncols == 0 || rows.iter().any(|r| r.len() != ncols) {
        return Err("Matrix error: expected a non-empty rectangular matrix".to_owned());
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Ok(DMatrix::from_row_slice(rows.len(), ncols, &flat))
}

fn square(m: DMatrix<f64>) -> Result<DMatrix<f64>, String> {
    if m.is_square() {
        Ok(m)
    } else {
        Err("Matrix error: matrix must be square".to_owned())
    }
}

fn to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|row| row.iter().copied().collect()).collect()
}

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}
