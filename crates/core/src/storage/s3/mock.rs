//! In-memory object client for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::client::{ClientError, ObjectClient, PutObject};
use crate::storage::Permission;

#[derive(Debug, Default)]
struct State {
    buckets: BTreeSet<String>,
    objects: BTreeMap<(String, String), PutObject>,
    calls: Vec<String>,
    failing_put_keys: BTreeSet<String>,
    failing_delete_keys: BTreeSet<String>,
    create_bucket_fails: bool,
    sign_base: Option<String>,
}

/// Records calls and keeps objects in memory.
#[derive(Debug, Default)]
pub(crate) struct MemoryObjectClient {
    state: Mutex<State>,
}

impl MemoryObjectClient {
    pub(crate) fn with_bucket(bucket: &str) -> Self {
        let client = Self::default();
        client.lock().buckets.insert(bucket.to_string());
        client
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mock state poisoned")
    }

    pub(crate) fn fail_put(&self, key: &str) {
        self.lock().failing_put_keys.insert(key.to_string());
    }

    pub(crate) fn fail_delete(&self, key: &str) {
        self.lock().failing_delete_keys.insert(key.to_string());
    }

    pub(crate) fn fail_create_bucket(&self) {
        self.lock().create_bucket_fails = true;
    }

    /// Sign path-style URLs under `base` instead of the virtual-host default.
    pub(crate) fn sign_from(&self, base: &str) {
        self.lock().sign_base = Some(base.trim_end_matches('/').to_string());
    }

    pub(crate) fn insert(&self, bucket: &str, key: &str) {
        let request = PutObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body: bytes::Bytes::new(),
            content_type: "application/octet-stream".to_string(),
            acl: Permission::Private,
            cache_control: None,
            content_disposition: None,
            content_encoding: None,
            content_language: None,
            expires: None,
            metadata: BTreeMap::new(),
            storage_class: None,
        };
        self.lock()
            .objects
            .insert((bucket.to_string(), key.to_string()), request);
    }

    pub(crate) fn object(&self, bucket: &str, key: &str) -> Option<PutObject> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().map(|(_, k)| k.clone()).collect()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn has_bucket(&self, bucket: &str) -> bool {
        self.lock().buckets.contains(bucket)
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn put_object(&self, request: PutObject) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("put {}", request.key));
        if !state.buckets.contains(&request.bucket) {
            return Err(ClientError::NoSuchBucket);
        }
        if state.failing_put_keys.contains(&request.key) {
            return Err(ClientError::Service("access denied".to_string()));
        }
        state
            .objects
            .insert((request.bucket.clone(), request.key.clone()), request);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("delete {key}"));
        if state.failing_delete_keys.contains(key) {
            return Err(ClientError::Service("access denied".to_string()));
        }
        match state.objects.remove(&(bucket.to_string(), key.to_string())) {
            Some(_) => Ok(()),
            None => Err(ClientError::NotFound),
        }
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("head {key}"));
        Ok(state
            .objects
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("create_bucket {bucket}"));
        if state.create_bucket_fails {
            return Err(ClientError::Service("bucket quota exceeded".to_string()));
        }
        state.buckets.insert(bucket.to_string());
        Ok(())
    }

    async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        acl: Permission,
    ) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("acl {key} {}", acl.as_acl()));
        match state.objects.get_mut(&(bucket.to_string(), key.to_string())) {
            Some(object) => {
                object.acl = acl;
                Ok(())
            }
            None => Err(ClientError::NotFound),
        }
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, ClientError> {
        let expires = expires_in.as_secs();
        Ok(match &self.lock().sign_base {
            Some(base) => format!("{base}/{bucket}/{key}?X-Amz-Expires={expires}"),
            None => format!("https://{bucket}.s3.amazonaws.com/{key}?X-Amz-Expires={expires}"),
        })
    }
}
