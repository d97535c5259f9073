//! In-memory router used by service and web tests

use super::Rci;
use crate::error::{RciError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct FakeRouter {
    responses: Mutex<HashMap<String, Value>>,
    after_write: Mutex<HashMap<String, Value>>,
    failing: HashSet<String>,
    posts: Mutex<Vec<(String, Value)>>,
}

impl FakeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, path: &str, value: Value) -> Self {
        self.responses.lock().insert(path.to_string(), value);
        self
    }

    /// Served for `path` once any POST has been accepted
    pub fn with_response_after_write(self, path: &str, value: Value) -> Self {
        self.after_write.lock().insert(path.to_string(), value);
        self
    }

    pub fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    pub fn posts(&self) -> Vec<(String, Value)> {
        self.posts.lock().clone()
    }

    fn check(&self, path: &str) -> Result<()> {
        if self.failing.contains(path) {
            return Err(RciError::Status {
                path: path.to_string(),
                status: 500,
                body: "fake failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Rci for FakeRouter {
    async fn get(&self, path: &str) -> Result<Value> {
        self.check(path)?;
        Ok(self
            .responses
            .lock()
            .get(path)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.check(path)?;
        self.posts.lock().push((path.to_string(), body.clone()));

        let pending: Vec<_> = self.after_write.lock().drain().collect();
        self.responses.lock().extend(pending);

        Ok(json!({}))
    }
}
