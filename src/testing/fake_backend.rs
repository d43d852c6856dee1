//! In-memory Sysdig API.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::client::{ApiRequest, SysdigApi};
use crate::config::Product;
use crate::error::ProviderError;

type Transform = Box<dyn Fn(&mut Value) + Send + Sync>;

#[derive(Debug, Clone)]
struct Entity {
    envelope: Option<String>,
    body: Value,
    /// Keys the backend added on create; kept across full replaces.
    server_keys: Vec<String>,
}

#[derive(Default)]
struct Store {
    entities: BTreeMap<(Product, String), Entity>,
    collections: BTreeSet<(Product, String)>,
    next_id: u64,
    calls: Vec<String>,
}

/// A [`SysdigApi`] that keeps entities in memory and behaves like the live
/// backend where the provider depends on it:
///
/// - `POST` to a collection assigns an id (`accessKey` for agent access
///   keys) and `version: 1`, and answers in the request's envelope;
/// - `GET` of a missing item is a `404`; `GET` of a collection returns
///   `{"data": [...]}`;
/// - `PUT` with a stale `version` is a `409`, otherwise the body is replaced
///   and the version incremented; `PATCH` merges top-level fields;
/// - `DELETE` of a missing item is a `404`.
///
/// Transforms registered with [`with_transform`](Self::with_transform)
/// rewrite stored entities after every write, to imitate server-side
/// normalisation.
pub struct FakeBackend {
    store: Mutex<Store>,
    transforms: Vec<(String, Transform)>,
}

impl FakeBackend {
    /// An empty backend with `/api/users/me` answering for both products.
    pub fn new() -> Self {
        let mut store = Store {
            next_id: 1000,
            ..Store::default()
        };
        let me = json!({
            "user": {
                "id": 1,
                "username": "ci@example.com",
                "firstName": "CI",
                "lastName": "Runner",
                "systemRole": "ROLE_CUSTOMER",
                "currentTeam": 10,
                "customer": {"id": 100, "name": "example", "externalId": "ext-100"}
            }
        });
        for product in [Product::Monitor, Product::Secure] {
            store.entities.insert(
                (product, "/api/users/me".to_string()),
                Entity {
                    envelope: None,
                    body: me.clone(),
                    server_keys: Vec::new(),
                },
            );
        }
        Self {
            store: Mutex::new(store),
            transforms: Vec::new(),
        }
    }

    /// Rewrite every entity stored under `path_prefix` after each write.
    pub fn with_transform<F>(mut self, path_prefix: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&mut Value) + Send + Sync + 'static,
    {
        self.transforms.push((path_prefix.into(), Box::new(transform)));
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every request served so far, as `METHOD path`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// The stored body of an entity, without its envelope.
    pub fn entity(&self, product: Product, path: &str) -> Option<Value> {
        self.lock()
            .entities
            .get(&(product, path.to_string()))
            .map(|e| e.body.clone())
    }

    /// Change a stored entity behind the provider's back.
    pub fn modify_entity<F>(&self, product: Product, path: &str, change: F) -> bool
    where
        F: FnOnce(&mut Value),
    {
        match self.lock().entities.get_mut(&(product, path.to_string())) {
            Some(entity) => {
                change(&mut entity.body);
                true
            },
            None => false,
        }
    }

    /// Delete a stored entity behind the provider's back.
    pub fn remove_entity(&self, product: Product, path: &str) -> bool {
        self.lock()
            .entities
            .remove(&(product, path.to_string()))
            .is_some()
    }

    /// Number of stored entities directly under `collection`.
    pub fn count(&self, product: Product, collection: &str) -> usize {
        self.lock()
            .entities
            .keys()
            .filter(|(p, path)| *p == product && is_child(collection, path))
            .count()
    }

    fn transform(&self, path: &str, body: &mut Value) {
        for (prefix, transform) in &self.transforms {
            if path.starts_with(prefix.as_str()) {
                transform(body);
            }
        }
    }

    fn create(&self, store: &mut Store, product: Product, collection: &str, body: Value) -> Value {
        let (envelope, mut body) = split_envelope(body);
        let id_key = if collection.ends_with("/accessKeys") {
            "accessKey"
        } else {
            "id"
        };

        store.next_id += 1;
        let id = if id_key == "accessKey" {
            json!(format!("{:08x}-fake-{:04x}", store.next_id * 7919, store.next_id))
        } else {
            json!(store.next_id)
        };

        let mut server_keys = vec![id_key.to_string()];
        if let Value::Object(obj) = &mut body {
            obj.insert(id_key.to_string(), id.clone());
            if !obj.get("version").is_some_and(Value::is_number) {
                obj.insert("version".to_string(), json!(1));
                server_keys.push("version".to_string());
            }
        }

        let path = format!("{}/{}", collection, id_string(&id));
        self.transform(&path, &mut body);
        store.collections.insert((product, collection.to_string()));
        store.entities.insert(
            (product, path),
            Entity {
                envelope: envelope.clone(),
                body: body.clone(),
                server_keys,
            },
        );
        wrap(envelope.as_deref(), body)
    }

    fn read(&self, store: &Store, product: Product, path: &str) -> Result<Value, ProviderError> {
        if let Some(entity) = store.entities.get(&(product, path.to_string())) {
            return Ok(wrap(entity.envelope.as_deref(), entity.body.clone()));
        }

        let items: Vec<Value> = store
            .entities
            .iter()
            .filter(|((p, item), _)| *p == product && is_child(path, item))
            .map(|(_, e)| e.body.clone())
            .collect();
        if items.is_empty() && !store.collections.contains(&(product, path.to_string())) {
            return Err(not_found(path));
        }
        Ok(json!({ "data": items }))
    }

    fn replace(
        &self,
        store: &mut Store,
        product: Product,
        path: &str,
        body: Value,
        merge: bool,
    ) -> Result<Value, ProviderError> {
        let key = (product, path.to_string());
        let entity = store.entities.get(&key).cloned().ok_or_else(|| not_found(path))?;
        let (_, incoming) = split_envelope(body);

        let stored_version = entity.body.get("version").and_then(Value::as_i64);
        let sent_version = incoming.get("version").and_then(Value::as_i64);
        if let (Some(stored), Some(sent)) = (stored_version, sent_version) {
            if stored != sent {
                return Err(ProviderError::from_status(
                    409,
                    format!("version conflict: sent {} but current is {}", sent, stored),
                ));
            }
        }

        let mut next = if merge {
            let mut merged = entity.body.clone();
            if let (Value::Object(target), Value::Object(fields)) = (&mut merged, incoming) {
                target.extend(fields);
            }
            merged
        } else {
            let mut replaced = incoming;
            if let (Value::Object(target), Value::Object(stored)) = (&mut replaced, &entity.body) {
                for key in &entity.server_keys {
                    if let Some(value) = stored.get(key) {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
            replaced
        };
        if let (Some(version), Value::Object(obj)) = (stored_version, &mut next) {
            obj.insert("version".to_string(), json!(version + 1));
        }
        self.transform(path, &mut next);

        let envelope = entity.envelope.clone();
        store.entities.insert(
            key,
            Entity {
                body: next.clone(),
                ..entity
            },
        );
        Ok(wrap(envelope.as_deref(), next))
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SysdigApi for FakeBackend {
    async fn execute(&self, request: ApiRequest) -> Result<Option<Value>, ProviderError> {
        debug!(product = %request.product, request = %request.describe(), "Fake backend call");
        let mut store = self.lock();
        store.calls.push(request.describe());

        let ApiRequest {
            product,
            method,
            path,
            body,
        } = request;
        let body = body.unwrap_or(Value::Null);

        match method.as_str() {
            "GET" => self.read(&store, product, &path).map(Some),
            "POST" => Ok(Some(self.create(&mut store, product, &path, body))),
            "PUT" => self.replace(&mut store, product, &path, body, false).map(Some),
            "PATCH" => self.replace(&mut store, product, &path, body, true).map(Some),
            "DELETE" => match store.entities.remove(&(product, path.clone())) {
                Some(_) => Ok(None),
                None => Err(not_found(&path)),
            },
            other => Err(ProviderError::from_status(
                405,
                format!("method {} not allowed", other),
            )),
        }
    }
}

fn is_child(collection: &str, path: &str) -> bool {
    path.strip_prefix(collection)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|id| !id.is_empty() && !id.contains('/'))
}

fn not_found(path: &str) -> ProviderError {
    ProviderError::from_status(404, format!("{} not found", path))
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A single-key object wrapping an object is an envelope.
fn split_envelope(body: Value) -> (Option<String>, Value) {
    match body {
        Value::Object(obj) if obj.len() == 1 && obj.values().all(Value::is_object) => {
            let mut entries = obj.into_iter();
            match entries.next() {
                Some((key, inner)) => (Some(key), inner),
                None => (None, Value::Object(Map::new())),
            }
        },
        body => (None, body),
    }
}

fn wrap(envelope: Option<&str>, body: Value) -> Value {
    match envelope {
        Some(key) => {
            let mut obj = Map::new();
            obj.insert(key.to_string(), body);
            Value::Object(obj)
        },
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_id_and_version() {
        let backend = FakeBackend::new();
        let created = backend
            .execute(ApiRequest::post(
                Product::Monitor,
                "/api/teams",
                json!({"team": {"name": "ops"}}),
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created["team"]["version"], 1);

        let id = created["team"]["id"].as_u64().unwrap();
        let path = format!("/api/teams/{}", id);
        assert!(backend.entity(Product::Monitor, &path).is_some());
        // Products do not share storage.
        assert!(backend.entity(Product::Secure, &path).is_none());
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let backend = FakeBackend::new();
        let created = backend
            .execute(ApiRequest::post(Product::Monitor, "/api/teams", json!({"team": {"name": "ops"}})))
            .await
            .unwrap()
            .unwrap();
        let path = format!("/api/teams/{}", created["team"]["id"]);

        let put = |version: i64| {
            ApiRequest::put(
                Product::Monitor,
                path.clone(),
                json!({"team": {"name": "ops2", "version": version}}),
            )
        };
        let updated = backend.execute(put(1)).await.unwrap().unwrap();
        assert_eq!(updated["team"]["version"], 2);
        assert_eq!(updated["team"]["id"], created["team"]["id"]);

        let err = backend.execute(put(1)).await.unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_collections_and_missing_items() {
        let backend = FakeBackend::new();
        let err = backend
            .execute(ApiRequest::get(Product::Secure, "/api/secure/rules/1"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        backend
            .execute(ApiRequest::post(Product::Secure, "/platform/v1/zones", json!({"name": "z", "scopes": []})))
            .await
            .unwrap();
        let list = backend
            .execute(ApiRequest::get(Product::Secure, "/platform/v1/zones"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(list["data"].as_array().map(Vec::len), Some(1));
        assert_eq!(backend.count(Product::Secure, "/platform/v1/zones"), 1);
    }

    #[tokio::test]
    async fn test_transform_applies_on_write() {
        let backend = FakeBackend::new().with_transform("/api/secure/falco/lists", |body| {
            body["items"]["items"] = json!(["normalised"]);
        });
        let created = backend
            .execute(ApiRequest::post(
                Product::Secure,
                "/api/secure/falco/lists",
                json!({"name": "l", "items": {"items": ["a"]}}),
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created["items"]["items"], json!(["normalised"]));
    }

    #[test]
    fn test_split_envelope() {
        let (key, inner) = split_envelope(json!({"alert": {"name": "a"}}));
        assert_eq!(key.as_deref(), Some("alert"));
        assert_eq!(inner, json!({"name": "a"}));

        let (key, _) = split_envelope(json!({"name": "a", "items": {"items": []}}));
        assert!(key.is_none());
    }
}
