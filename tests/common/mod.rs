//! Shared fixtures for the Stack reconcile tests: an in-memory object store,
//! a URL-keyed archive transport and pipeline archive builders.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use kube::core::{DynamicObject, GroupVersionKind};
use stack_controller::controller::pipeline::{
    annotation_owners, sha256_hex, ArchiveTransport, DirectiveRenderer, ObjectStore,
};
use stack_controller::controller::reconciler::{reconcile_active_versions, ReconcileEnv};
use stack_controller::crd::{
    DesiredState, GitReleaseInfo, HttpsSource, PipelineSpec, Stack, StackSpec, StackStatus,
    StackVersion,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const NAMESPACE: &str = "kabanero";
pub const TLS_ERROR: &str = "invalid peer certificate: UnknownIssuer";

type ObjectKey = (String, String, String);

/// Object store keyed by (kind, namespace, name)
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<ObjectKey, DynamicObject>>,
    creates: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    /// Object names whose get fails
    failing_gets: Mutex<BTreeSet<String>>,
    /// Object names whose delete fails
    failing_deletes: Mutex<BTreeSet<String>>,
}

impl FakeStore {
    pub fn object(&self, kind: &str, namespace: &str, name: &str) -> Option<DynamicObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(kind.to_string(), namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn remove(&self, kind: &str, namespace: &str, name: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(kind.to_string(), namespace.to_string(), name.to_string()));
    }

    pub fn insert(&self, kind: &str, namespace: &str, object: DynamicObject) {
        let name = object.metadata.name.clone().unwrap_or_default();
        self.objects
            .lock()
            .unwrap()
            .insert((kind.to_string(), namespace.to_string(), name), object);
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fail_get(&self, name: &str) {
        self.failing_gets.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_delete(&self, name: &str) {
        self.failing_deletes.lock().unwrap().insert(name.to_string());
    }

    /// Clear all injected failures
    pub fn heal(&self) {
        self.failing_gets.lock().unwrap().clear();
        self.failing_deletes.lock().unwrap().clear();
    }

    /// Owner uids recorded in the owner annotation of a stored object
    pub fn annotated_owners(&self, kind: &str, namespace: &str, name: &str) -> Vec<String> {
        self.object(kind, namespace, name)
            .map(|o| annotation_owners(&o))
            .unwrap_or_default()
    }

    /// Owner uids of a stored object
    pub fn owners(&self, kind: &str, namespace: &str, name: &str) -> Vec<String> {
        self.object(kind, namespace, name)
            .map(|o| {
                o.metadata
                    .owner_references
                    .unwrap_or_default()
                    .into_iter()
                    .map(|r| r.uid)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        if self.failing_gets.lock().unwrap().contains(name) {
            bail!("etcdserver: request timed out");
        }
        Ok(self.object(&gvk.kind, namespace, name))
    }

    async fn create(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<()> {
        if gvk.kind == "BadTask" {
            bail!("admission webhook denied the request: BadTask is not allowed");
        }
        let name = object.metadata.name.clone().unwrap_or_default();
        let key = (gvk.kind.clone(), namespace.to_string(), name.clone());
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            bail!("{} {}/{} already exists", gvk.kind, namespace, name);
        }
        objects.insert(key, object.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<()> {
        let name = object.metadata.name.clone().unwrap_or_default();
        let key = (gvk.kind.clone(), namespace.to_string(), name.clone());
        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(&key) {
            bail!("{} {}/{} not found", gvk.kind, namespace, name);
        }
        objects.insert(key, object.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> Result<()> {
        if self.failing_deletes.lock().unwrap().contains(name) {
            bail!("{} {}/{} is protected by a finalizer", gvk.kind, namespace, name);
        }
        self.objects
            .lock()
            .unwrap()
            .remove(&(gvk.kind.clone(), namespace.to_string(), name.to_string()));
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A served archive
#[derive(Clone)]
struct Served {
    body: Vec<u8>,
    /// Fails with a TLS error unless certificate verification is skipped
    self_signed: bool,
}

/// Transport serving archives by URL, or by release asset name for git releases
#[derive(Default)]
pub struct FakeTransport {
    archives: Mutex<HashMap<String, Served>>,
    fetches: AtomicUsize,
}

impl FakeTransport {
    pub fn serve(&self, url: &str, body: Vec<u8>) {
        self.archives.lock().unwrap().insert(
            url.to_string(),
            Served {
                body,
                self_signed: false,
            },
        );
    }

    pub fn serve_self_signed(&self, url: &str, body: Vec<u8>) {
        self.archives.lock().unwrap().insert(
            url.to_string(),
            Served {
                body,
                self_signed: true,
            },
        );
    }

    pub fn withdraw(&self, url: &str) {
        self.archives.lock().unwrap().remove(url);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn lookup(&self, key: &str, skip_cert_verify: bool) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let served = self
            .archives
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| {
                anyhow!("Could not retrieve the pipeline archive from {key}. Http status code: 404")
            })?;
        if served.self_signed && !skip_cert_verify {
            return Err(anyhow!(TLS_ERROR)
                .context("HTTP request error while using the default TLS configuration"));
        }
        Ok(served.body)
    }
}

#[async_trait]
impl ArchiveTransport for FakeTransport {
    async fn fetch(&self, url: &str, skip_cert_verify: bool) -> Result<Vec<u8>> {
        self.lookup(url, skip_cert_verify)
    }

    async fn fetch_from_git_release(
        &self,
        info: &GitReleaseInfo,
        skip_cert_verify: bool,
    ) -> Result<Vec<u8>> {
        self.lookup(&info.asset_name, skip_cert_verify)
    }
}

/// Tekton-style manifest text
pub fn manifest(api_version: &str, kind: &str, name: &str) -> String {
    format!("apiVersion: {api_version}\nkind: {kind}\nmetadata:\n  name: {name}\nspec:\n  steps: []\n")
}

pub fn task(name: &str) -> String {
    manifest("tekton.dev/v1beta1", "Task", name)
}

/// Gzipped tar of `files` plus a `manifest.yaml` indexing all of them
///
/// Returns the archive and its digest.
pub fn pipeline_archive(files: &[(&str, String)]) -> (Vec<u8>, String) {
    let mut index = String::from("contents:\n");
    for (file, data) in files {
        index.push_str(&format!(
            "  - file: {file}\n    sha256: \"{}\"\n",
            sha256_hex(data.as_bytes())
        ));
    }
    if files.is_empty() {
        index = "contents: []\n".to_string();
    }

    let mut builder = tar::Builder::new(Vec::new());
    let mut append = |name: &str, data: &[u8]| {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    };
    append("manifest.yaml", index.as_bytes());
    for (file, data) in files {
        append(file, data.as_bytes());
    }
    let tar_bytes = builder.into_inner().unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    let archive = encoder.finish().unwrap();
    let digest = sha256_hex(&archive);
    (archive, digest)
}

pub fn https_pipeline(id: &str, url: &str, digest: &str) -> PipelineSpec {
    PipelineSpec {
        id: id.to_string(),
        sha256: digest.to_string(),
        https: Some(HttpsSource {
            url: url.to_string(),
            skip_cert_verification: false,
        }),
        git_release: None,
    }
}

pub fn version(version: &str, state: DesiredState, pipelines: Vec<PipelineSpec>) -> StackVersion {
    StackVersion {
        version: version.to_string(),
        desired_state: state,
        pipelines,
    }
}

pub fn stack(name: &str, versions: Vec<StackVersion>) -> Stack {
    let mut stack = Stack::new(
        name,
        StackSpec {
            name: name.to_string(),
            versions,
        },
    );
    stack.metadata.namespace = Some(NAMESPACE.to_string());
    stack.metadata.uid = Some(format!("uid-{name}"));
    stack
}

/// One reconcile pass; the returned status is written back like a status patch
pub async fn reconcile(stack: &mut Stack, store: &FakeStore, transport: &FakeTransport) -> StackStatus {
    let env = ReconcileEnv {
        store,
        transport,
        renderer: &DirectiveRenderer,
    };
    let status = reconcile_active_versions(stack, env)
        .await
        .expect("reconcile pass");
    stack.status = Some(status.clone());
    status
}
