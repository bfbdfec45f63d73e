//! Scriptable in-memory storage backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vitrine_core::Credential;
use vitrine_storage::{
    ObjectEntry, ProbeResponse, Storage, StorageBackend, StorageError, StorageResult,
    StoredObject,
};

const PUBLIC_BASE: &str = "https://cdn.test/public/";
const SIGNED_BASE: &str = "https://cdn.test/signed/";

/// Failure injected into a storage call.
#[derive(Debug, Clone)]
pub enum Failure {
    Network,
    Status(u16, &'static str),
}

impl Failure {
    fn to_error(&self) -> StorageError {
        match self {
            Failure::Network => StorageError::Network("connection reset by peer".to_string()),
            Failure::Status(status, message) => StorageError::Rejected {
                status: *status,
                message: message.to_string(),
            },
        }
    }
}

/// How a probe of a public or signed URL answers.
#[derive(Debug, Clone, Default)]
pub enum ProbeBehavior {
    /// 200 with the served content type, 404 if the object is gone
    #[default]
    Serve,
    Respond(u16, Option<&'static str>),
    Fail,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    content_type: String,
    size: u64,
}

#[derive(Default)]
struct State {
    objects: HashMap<String, StoredEntry>,
    put_calls: u32,
    list_calls: u32,
    probe_calls: u32,
    sign_calls: u32,
    delete_calls: u32,
    deleted: Vec<String>,
    put_paths: Vec<String>,
    put_content_types: Vec<String>,
    tokens: Vec<String>,
    in_flight: u32,
    max_in_flight: u32,

    scripted_put_failures: VecDeque<Failure>,
    persistent_put_failure: Option<Failure>,
    put_delay: Duration,
    stalled_puts: u32,
    stall: Duration,
    reject_duplicates: bool,
    drop_writes: bool,
    hidden_lists: u32,
    list_failure: Option<Failure>,
    recorded_content_type: Option<Option<&'static str>>,
    recorded_size: Option<u64>,
    served_content_type: Option<Option<&'static str>>,
    public_probe: ProbeBehavior,
    signed_probe: ProbeBehavior,
}

#[derive(Clone, Default)]
pub struct MockStorage {
    state: Arc<Mutex<State>>,
}

impl MockStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    // Scripting

    /// Fail the next puts, in order.
    pub fn fail_puts(&self, failures: &[Failure]) {
        self.with(|s| s.scripted_put_failures.extend(failures.iter().cloned()));
    }

    pub fn fail_every_put(&self, failure: Failure) {
        self.with(|s| s.persistent_put_failure = Some(failure));
    }

    pub fn delay_puts(&self, delay: Duration) {
        self.with(|s| s.put_delay = delay);
    }

    /// The next `count` puts store the object, then hang for `stall` before answering.
    pub fn stall_after_storing(&self, count: u32, stall: Duration) {
        self.with(|s| {
            s.stalled_puts = count;
            s.stall = stall;
        });
    }

    /// Refuse to overwrite an existing object, like an upsert-off object API.
    pub fn reject_duplicates(&self) {
        self.with(|s| s.reject_duplicates = true);
    }

    /// Acknowledge puts without storing anything.
    pub fn drop_writes(&self) {
        self.with(|s| s.drop_writes = true);
    }

    /// Leave objects out of the first `count` listings.
    pub fn hide_from_lists(&self, count: u32) {
        self.with(|s| s.hidden_lists = count);
    }

    pub fn fail_every_list(&self, failure: Failure) {
        self.with(|s| s.list_failure = Some(failure));
    }

    /// Content type the listing reports instead of the one sent. `None` reports none.
    pub fn record_content_type(&self, content_type: Option<&'static str>) {
        self.with(|s| s.recorded_content_type = Some(content_type));
    }

    pub fn record_size(&self, size: u64) {
        self.with(|s| s.recorded_size = Some(size));
    }

    /// Content type URL probes report instead of the one sent.
    pub fn serve_content_type(&self, content_type: Option<&'static str>) {
        self.with(|s| s.served_content_type = Some(content_type));
    }

    pub fn public_probe(&self, behavior: ProbeBehavior) {
        self.with(|s| s.public_probe = behavior);
    }

    pub fn signed_probe(&self, behavior: ProbeBehavior) {
        self.with(|s| s.signed_probe = behavior);
    }

    // Inspection

    pub fn put_calls(&self) -> u32 {
        self.with(|s| s.put_calls)
    }

    pub fn list_calls(&self) -> u32 {
        self.with(|s| s.list_calls)
    }

    pub fn probe_calls(&self) -> u32 {
        self.with(|s| s.probe_calls)
    }

    pub fn sign_calls(&self) -> u32 {
        self.with(|s| s.sign_calls)
    }

    pub fn delete_calls(&self) -> u32 {
        self.with(|s| s.delete_calls)
    }

    pub fn network_calls(&self) -> u32 {
        self.with(|s| s.put_calls + s.list_calls + s.probe_calls + s.sign_calls + s.delete_calls)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.with(|s| s.deleted.clone())
    }

    pub fn put_paths(&self) -> Vec<String> {
        self.with(|s| s.put_paths.clone())
    }

    pub fn put_content_types(&self) -> Vec<String> {
        self.with(|s| s.put_content_types.clone())
    }

    pub fn tokens(&self) -> Vec<String> {
        self.with(|s| s.tokens.clone())
    }

    pub fn max_in_flight(&self) -> u32 {
        self.with(|s| s.max_in_flight)
    }

    pub fn contains(&self, bucket: &str, path: &str) -> bool {
        self.with(|s| s.objects.contains_key(&key(bucket, path)))
    }
}

fn key(bucket: &str, path: &str) -> String {
    format!("{}/{}", bucket, path)
}

fn probe_object(state: &State, key: &str, behavior: &ProbeBehavior) -> StorageResult<ProbeResponse> {
    match behavior {
        ProbeBehavior::Fail => Err(StorageError::Network("probe connection refused".to_string())),
        ProbeBehavior::Respond(status, content_type) => Ok(ProbeResponse {
            status: *status,
            content_type: content_type.map(str::to_string),
        }),
        ProbeBehavior::Serve => match state.objects.get(key) {
            Some(entry) => Ok(ProbeResponse {
                status: 200,
                content_type: match state.served_content_type {
                    Some(served) => served.map(str::to_string),
                    None => Some(entry.content_type.clone()),
                },
            }),
            None => Ok(ProbeResponse {
                status: 404,
                content_type: Some("application/json".to_string()),
            }),
        },
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
        credential: &Credential,
    ) -> StorageResult<StoredObject> {
        let object_key = key(bucket, path);
        let entry = StoredEntry {
            content_type: content_type.to_string(),
            size: data.len() as u64,
        };

        let (delay, stall) = self.with(|s| {
            s.put_calls += 1;
            s.put_paths.push(path.to_string());
            s.put_content_types.push(content_type.to_string());
            s.tokens.push(credential.token().to_string());
            s.in_flight += 1;
            s.max_in_flight = s.max_in_flight.max(s.in_flight);
            let stall = if s.stalled_puts > 0 && !s.objects.contains_key(&object_key) {
                s.stalled_puts -= 1;
                s.objects.insert(object_key.clone(), entry.clone());
                Some(s.stall)
            } else {
                None
            };
            (s.put_delay, stall)
        });

        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
            self.with(|s| s.in_flight -= 1);
            return Ok(StoredObject {
                path: path.to_string(),
            });
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.with(|s| {
            s.in_flight -= 1;
            let failure = s
                .scripted_put_failures
                .pop_front()
                .or_else(|| s.persistent_put_failure.clone());
            if let Some(failure) = failure {
                return Err(failure.to_error());
            }
            if s.reject_duplicates && s.objects.contains_key(&object_key) {
                return Err(StorageError::Rejected {
                    status: 409,
                    message: "Duplicate: The resource already exists".to_string(),
                });
            }
            if !s.drop_writes {
                s.objects.insert(object_key, entry);
            }
            Ok(StoredObject {
                path: path.to_string(),
            })
        })
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        search: Option<&str>,
    ) -> StorageResult<Vec<ObjectEntry>> {
        self.with(|s| {
            s.list_calls += 1;
            if let Some(failure) = &s.list_failure {
                return Err(failure.to_error());
            }
            if s.hidden_lists > 0 {
                s.hidden_lists -= 1;
                return Ok(Vec::new());
            }

            let base = format!("{}/", key(bucket, prefix.trim_matches('/')));
            let entries = s
                .objects
                .iter()
                .filter_map(|(k, entry)| {
                    let name = k.strip_prefix(&base)?;
                    if name.contains('/') {
                        return None;
                    }
                    if let Some(search) = search {
                        if !name.contains(search) {
                            return None;
                        }
                    }
                    Some(ObjectEntry {
                        name: name.to_string(),
                        content_type: match s.recorded_content_type {
                            Some(recorded) => recorded.map(str::to_string),
                            None => Some(entry.content_type.clone()),
                        },
                        size: Some(s.recorded_size.unwrap_or(entry.size)),
                    })
                })
                .collect();
            Ok(entries)
        })
    }

    async fn probe(&self, url: &str) -> StorageResult<ProbeResponse> {
        self.with(|s| {
            s.probe_calls += 1;
            if let Some(rest) = url.strip_prefix(SIGNED_BASE) {
                let key = rest.split('?').next().unwrap_or_default();
                probe_object(s, key, &s.signed_probe)
            } else if let Some(key) = url.strip_prefix(PUBLIC_BASE) {
                probe_object(s, key, &s.public_probe)
            } else {
                Ok(ProbeResponse {
                    status: 404,
                    content_type: None,
                })
            }
        })
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.with(|s| s.sign_calls += 1);
        Ok(format!(
            "{}{}?token=signed&expires={}",
            SIGNED_BASE,
            key(bucket, path),
            expires_in.as_secs()
        ))
    }

    async fn delete(&self, bucket: &str, path: &str) -> StorageResult<()> {
        self.with(|s| {
            s.delete_calls += 1;
            s.deleted.push(path.to_string());
            s.objects.remove(&key(bucket, path));
        });
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}{}", PUBLIC_BASE, key(bucket, path))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Http
    }
}
