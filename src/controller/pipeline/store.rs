//! # Cluster Object Store
//!
//! Narrow, loosely-typed view of the Kubernetes API used by the asset
//! reconciler.

use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::{Api, ApiResource, DeleteParams, PostParams};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::Client;
use tracing::debug;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(None)` when the object does not exist
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    async fn create(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<()>;

    async fn update(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<()>;

    /// Deleting an object that is already gone succeeds
    async fn delete(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Result<()>;
}

/// [`ObjectStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, gvk: &GroupVersionKind, namespace: &str) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(gvk);
        Api::namespaced_with(self.client.clone(), namespace, &resource)
    }
}

fn object_name(object: &DynamicObject) -> Result<&str> {
    object
        .metadata
        .name
        .as_deref()
        .context("object has no metadata.name")
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        self.api(gvk, namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get {} {}/{}", gvk.kind, namespace, name))
    }

    async fn create(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<()> {
        let name = object_name(object)?;
        self.api(gvk, namespace)
            .create(&PostParams::default(), object)
            .await
            .with_context(|| format!("Failed to create {} {}/{}", gvk.kind, namespace, name))?;
        Ok(())
    }

    async fn update(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<()> {
        let name = object_name(object)?;
        self.api(gvk, namespace)
            .replace(name, &PostParams::default(), object)
            .await
            .with_context(|| format!("Failed to update {} {}/{}", gvk.kind, namespace, name))?;
        Ok(())
    }

    async fn delete(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Result<()> {
        match self
            .api(gvk, namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                debug!("{} {}/{} already deleted", gvk.kind, namespace, name);
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e))
                .with_context(|| format!("Failed to delete {} {}/{}", gvk.kind, namespace, name)),
        }
    }
}
