//! # Asset Operations
//!
//! Single-object operations used by the activation pass: placement, owner
//! tracking, creation and deletion.
//!
//! Owner references cannot cross namespaces, so an object created outside the
//! owning Stack's namespace records its owners' UIDs in the
//! [`OWNER_UIDS_ANNOTATION`] annotation instead.

use super::manifest::StackAsset;
use super::store::ObjectStore;
use crate::crd::{AssetState, RepositoryAssetStatus};
use anyhow::Result;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::{DynamicObject, GroupVersionKind};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Only Tekton objects may be installed from a pipeline archive
pub const ALLOWED_GROUPS: [&str; 2] = ["tekton.dev", "triggers.tekton.dev"];

pub const GROUP_REJECTED_MESSAGE: &str =
    "Manifest rejected: contains a Group not equal to tekton.dev or triggers.tekton.dev";

/// Comma separated UIDs of the Stacks owning an object outside their namespace
pub const OWNER_UIDS_ANNOTATION: &str = "kabanero.io/owner-uids";

/// Kinds that keep a namespace preset in the manifest
const SELF_NAMESPACED_KINDS: [&str; 3] = ["TriggerBinding", "TriggerTemplate", "EventListener"];

pub fn is_allowed_group(group: &str) -> bool {
    ALLOWED_GROUPS.contains(&group)
}

/// Namespace an asset is created in
pub fn namespace_for_object(asset: &StackAsset, target_namespace: &str) -> String {
    if SELF_NAMESPACED_KINDS.contains(&asset.kind.as_str()) {
        if let Some(ns) = asset.object.metadata.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            return ns.to_string();
        }
    }
    target_namespace.to_string()
}

/// Initial status entry for a decoded asset
pub fn pending_status(asset: &StackAsset, target_namespace: &str) -> RepositoryAssetStatus {
    RepositoryAssetStatus {
        name: asset.name.clone(),
        namespace: namespace_for_object(asset, target_namespace),
        group: asset.group.clone(),
        version: asset.version.clone(),
        kind: asset.kind.clone(),
        digest: asset.sha256.clone(),
        status: AssetState::Unknown,
        status_message: Some("Asset has not been applied yet.".to_string()),
    }
}

pub fn status_gvk(asset: &RepositoryAssetStatus) -> GroupVersionKind {
    GroupVersionKind::gvk(&asset.group, &asset.version, &asset.kind)
}

pub fn has_owner(object: &DynamicObject, uid: &str) -> bool {
    object
        .metadata
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.uid == uid))
}

/// Append `owner` unless already present. Returns whether the object changed.
pub fn add_owner(object: &mut DynamicObject, owner: &OwnerReference) -> bool {
    if has_owner(object, &owner.uid) {
        return false;
    }
    object
        .metadata
        .owner_references
        .get_or_insert_with(Vec::new)
        .push(owner.clone());
    true
}

/// Remove the owner with `uid`. Returns whether the object changed.
pub fn remove_owner(object: &mut DynamicObject, uid: &str) -> bool {
    let Some(refs) = object.metadata.owner_references.as_mut() else {
        return false;
    };
    let before = refs.len();
    refs.retain(|r| r.uid != uid);
    before != refs.len()
}

/// UIDs listed in the owner annotation
pub fn annotation_owners(object: &DynamicObject) -> Vec<String> {
    object
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(OWNER_UIDS_ANNOTATION))
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|uid| !uid.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn has_annotation_owner(object: &DynamicObject, uid: &str) -> bool {
    annotation_owners(object).iter().any(|u| u == uid)
}

fn set_annotation_owners(object: &mut DynamicObject, owners: &[String]) {
    if owners.is_empty() {
        if let Some(annotations) = object.metadata.annotations.as_mut() {
            annotations.remove(OWNER_UIDS_ANNOTATION);
        }
        return;
    }
    object
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(OWNER_UIDS_ANNOTATION.to_string(), owners.join(","));
}

/// Record `uid` in the owner annotation. Returns whether the object changed.
pub fn add_annotation_owner(object: &mut DynamicObject, uid: &str) -> bool {
    let mut owners = annotation_owners(object);
    if owners.iter().any(|u| u == uid) {
        return false;
    }
    owners.push(uid.to_string());
    set_annotation_owners(object, &owners);
    true
}

/// Drop `uid` from the owner annotation. Returns whether the object changed.
pub fn remove_annotation_owner(object: &mut DynamicObject, uid: &str) -> bool {
    let mut owners = annotation_owners(object);
    let before = owners.len();
    owners.retain(|u| u != uid);
    if owners.len() == before {
        return false;
    }
    set_annotation_owners(object, &owners);
    true
}

/// Owners recorded by reference or by annotation
pub fn owner_count(object: &DynamicObject) -> usize {
    object.metadata.owner_references.as_ref().map_or(0, Vec::len) + annotation_owners(object).len()
}

/// Who owns the assets of one reconcile pass
#[derive(Debug, Clone)]
pub struct AssetOwner {
    pub reference: OwnerReference,
    pub namespace: String,
}

impl AssetOwner {
    /// Owner references cannot cross namespaces
    pub fn can_own(&self, namespace: &str) -> bool {
        self.namespace == namespace
    }

    /// Mark `object` in `namespace` as ours. Returns whether the object changed.
    pub fn mark(&self, object: &mut DynamicObject, namespace: &str) -> bool {
        if self.can_own(namespace) {
            add_owner(object, &self.reference)
        } else {
            add_annotation_owner(object, &self.reference.uid)
        }
    }

    pub fn is_marked(&self, object: &DynamicObject) -> bool {
        has_owner(object, &self.reference.uid) || has_annotation_owner(object, &self.reference.uid)
    }

    /// Strip both kinds of mark. Returns whether the object changed.
    pub fn unmark(&self, object: &mut DynamicObject) -> bool {
        let by_reference = remove_owner(object, &self.reference.uid);
        let by_annotation = remove_annotation_owner(object, &self.reference.uid);
        by_reference || by_annotation
    }
}

/// Create `manifest` in `namespace`, marked as owned by `owner`
pub async fn create_asset(
    store: &dyn ObjectStore,
    manifest: &StackAsset,
    namespace: &str,
    owner: &AssetOwner,
) -> Result<()> {
    let mut object = manifest.object.clone();
    object.metadata.namespace = Some(namespace.to_string());
    object.metadata.resource_version = None;
    object.metadata.uid = None;
    owner.mark(&mut object, namespace);

    info!(
        "Creating {} {}/{} from pipeline manifest",
        manifest.kind, namespace, manifest.name
    );
    store.create(&manifest.gvk(), namespace, &object).await
}

/// Mark an existing object as ours if it is not already
pub async fn adopt_asset(
    store: &dyn ObjectStore,
    gvk: &GroupVersionKind,
    namespace: &str,
    mut object: DynamicObject,
    owner: &AssetOwner,
) -> Result<bool> {
    if !owner.mark(&mut object, namespace) {
        return Ok(false);
    }
    debug!(
        "Adding owner {} to {} {}/{}",
        owner.reference.uid,
        gvk.kind,
        namespace,
        object.metadata.name.as_deref().unwrap_or_default()
    );
    store.update(gvk, namespace, &object).await?;
    Ok(true)
}

/// What happened to an asset during deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Never confirmed applied, left alone
    Skipped,
    AlreadyGone,
    Deleted,
    /// Other owners remain, only our reference was removed
    Disowned,
    /// Present but never marked as ours, left alone
    NotOwned,
}

/// Remove our ownership of an asset, deleting it when no owners remain
pub async fn delete_asset(
    store: &dyn ObjectStore,
    asset: &RepositoryAssetStatus,
    target_namespace: &str,
    owner: &AssetOwner,
) -> Result<DeleteOutcome> {
    if asset.status != AssetState::Active {
        info!(
            "Ignoring delete processing for asset with failed or unknown status. Asset name: {}. Namespace {}. Status: {}",
            asset.name, asset.namespace, asset.status
        );
        return Ok(DeleteOutcome::Skipped);
    }

    let namespace = if asset.namespace.is_empty() {
        target_namespace
    } else {
        asset.namespace.as_str()
    };
    let gvk = status_gvk(asset);

    let Some(mut object) = store.get(&gvk, namespace, &asset.name).await? else {
        return Ok(DeleteOutcome::AlreadyGone);
    };

    // Objects in our namespace predating owner tracking are still ours
    if !owner.is_marked(&object) && !owner.can_own(namespace) {
        info!(
            "Leaving {} {}/{} in place, it is not owned by {}",
            asset.kind, namespace, asset.name, owner.reference.uid
        );
        return Ok(DeleteOutcome::NotOwned);
    }

    let changed = owner.unmark(&mut object);
    if owner_count(&object) == 0 {
        store.delete(&gvk, namespace, &asset.name).await?;
        return Ok(DeleteOutcome::Deleted);
    }
    if changed {
        store.update(&gvk, namespace, &object).await?;
    }
    Ok(DeleteOutcome::Disowned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::pipeline::store::MockObjectStore;
    use kube::api::ObjectMeta;

    fn owner_ref(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "kabanero.io/v1alpha2".into(),
            kind: "Stack".into(),
            name: "java".into(),
            uid: uid.into(),
            ..Default::default()
        }
    }

    fn object(name: &str, owners: &[&str]) -> DynamicObject {
        DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some(name.into()),
                owner_references: Some(owners.iter().map(|u| owner_ref(u)).collect()),
                ..Default::default()
            },
            data: serde_json::json!({}),
        }
    }

    fn owner() -> AssetOwner {
        AssetOwner {
            reference: owner_ref("mine"),
            namespace: "kabanero".into(),
        }
    }

    fn annotated(name: &str, owners: &str) -> DynamicObject {
        let mut obj = object(name, &[]);
        obj.metadata.owner_references = None;
        obj.metadata.annotations = Some(BTreeMap::from([(
            OWNER_UIDS_ANNOTATION.to_string(),
            owners.to_string(),
        )]));
        obj
    }

    fn active_in(name: &str, namespace: &str) -> RepositoryAssetStatus {
        RepositoryAssetStatus {
            namespace: namespace.into(),
            kind: "TriggerBinding".into(),
            group: "triggers.tekton.dev".into(),
            ..active(name)
        }
    }

    fn active(name: &str) -> RepositoryAssetStatus {
        RepositoryAssetStatus {
            name: name.into(),
            group: "tekton.dev".into(),
            version: "v1alpha1".into(),
            kind: "Task".into(),
            status: AssetState::Active,
            ..Default::default()
        }
    }

    fn asset(kind: &str, namespace: Option<&str>) -> StackAsset {
        let mut object = object("a", &[]);
        object.metadata.namespace = namespace.map(str::to_string);
        StackAsset {
            name: "a".into(),
            group: "triggers.tekton.dev".into(),
            version: "v1alpha1".into(),
            kind: kind.into(),
            sha256: String::new(),
            object,
        }
    }

    #[test]
    fn test_allowed_groups() {
        assert!(is_allowed_group("tekton.dev"));
        assert!(is_allowed_group("triggers.tekton.dev"));
        assert!(!is_allowed_group("apps"));
        assert!(!is_allowed_group(""));
    }

    #[test]
    fn test_trigger_kinds_keep_preset_namespace() {
        assert_eq!(
            namespace_for_object(&asset("TriggerTemplate", Some("tekton-pipelines")), "kabanero"),
            "tekton-pipelines"
        );
        assert_eq!(namespace_for_object(&asset("TriggerTemplate", None), "kabanero"), "kabanero");
        assert_eq!(
            namespace_for_object(&asset("Task", Some("tekton-pipelines")), "kabanero"),
            "kabanero"
        );
    }

    #[test]
    fn test_owner_add_and_remove() {
        let mut obj = object("a", &["other"]);
        assert!(add_owner(&mut obj, &owner_ref("mine")));
        assert!(!add_owner(&mut obj, &owner_ref("mine")));
        assert_eq!(owner_count(&obj), 2);
        assert!(remove_owner(&mut obj, "mine"));
        assert!(!remove_owner(&mut obj, "mine"));
        assert_eq!(owner_count(&obj), 1);
    }

    #[tokio::test]
    async fn test_delete_skips_unconfirmed_assets() {
        let store = MockObjectStore::new();
        let mut failed = active("a");
        failed.status = AssetState::Failed;
        assert_eq!(
            delete_asset(&store, &failed, "kabanero", &owner()).await.unwrap(),
            DeleteOutcome::Skipped
        );
        failed.status = AssetState::Unknown;
        assert_eq!(
            delete_asset(&store, &failed, "kabanero", &owner()).await.unwrap(),
            DeleteOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn test_delete_last_owner_deletes_object() {
        let mut store = MockObjectStore::new();
        store
            .expect_get()
            .withf(|_, ns, name| ns == "kabanero" && name == "a")
            .returning(|_, _, _| Ok(Some(object("a", &["mine"]))));
        store.expect_delete().times(1).returning(|_, _, _| Ok(()));
        store.expect_update().never();
        assert_eq!(
            delete_asset(&store, &active("a"), "kabanero", &owner()).await.unwrap(),
            DeleteOutcome::Deleted
        );
    }

    #[tokio::test]
    async fn test_delete_shared_object_only_disowns() {
        let mut store = MockObjectStore::new();
        store
            .expect_get()
            .returning(|_, _, _| Ok(Some(object("a", &["mine", "other"]))));
        store
            .expect_update()
            .times(1)
            .withf(|_, _, obj| owner_count(obj) == 1 && has_owner(obj, "other"))
            .returning(|_, _, _| Ok(()));
        store.expect_delete().never();
        assert_eq!(
            delete_asset(&store, &active("a"), "kabanero", &owner()).await.unwrap(),
            DeleteOutcome::Disowned
        );
    }

    #[tokio::test]
    async fn test_delete_missing_object_is_success() {
        let mut store = MockObjectStore::new();
        store.expect_get().returning(|_, _, _| Ok(None));
        assert_eq!(
            delete_asset(&store, &active("a"), "kabanero", &owner()).await.unwrap(),
            DeleteOutcome::AlreadyGone
        );
    }

    #[test]
    fn test_annotation_owner_add_and_remove() {
        let mut obj = annotated("a", "other");
        assert!(add_annotation_owner(&mut obj, "mine"));
        assert!(!add_annotation_owner(&mut obj, "mine"));
        assert_eq!(annotation_owners(&obj), vec!["other", "mine"]);
        assert_eq!(owner_count(&obj), 2);
        assert!(remove_annotation_owner(&mut obj, "other"));
        assert!(remove_annotation_owner(&mut obj, "mine"));
        assert_eq!(owner_count(&obj), 0);
        assert!(!obj
            .metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(OWNER_UIDS_ANNOTATION)));
    }

    #[tokio::test]
    async fn test_create_outside_owner_namespace_is_annotated() {
        let mut store = MockObjectStore::new();
        store
            .expect_create()
            .times(1)
            .withf(|_, ns, obj| {
                ns == "tekton-pipelines"
                    && obj.metadata.owner_references.as_ref().is_none_or(Vec::is_empty)
                    && has_annotation_owner(obj, "mine")
                    && obj.metadata.namespace.as_deref() == Some("tekton-pipelines")
            })
            .returning(|_, _, _| Ok(()));
        create_asset(&store, &asset("TriggerTemplate", Some("tekton-pipelines")), "tekton-pipelines", &owner())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_adopt_outside_owner_namespace_adds_annotation() {
        let mut store = MockObjectStore::new();
        store
            .expect_update()
            .times(1)
            .withf(|_, _, obj| annotation_owners(obj) == ["other", "mine"])
            .returning(|_, _, _| Ok(()));
        let gvk = GroupVersionKind::gvk("triggers.tekton.dev", "v1alpha1", "TriggerBinding");
        assert!(adopt_asset(&store, &gvk, "tekton-pipelines", annotated("a", "other"), &owner())
            .await
            .unwrap());
        assert!(!adopt_asset(&store, &gvk, "tekton-pipelines", annotated("a", "mine"), &owner())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_shared_trigger_keeps_other_owner() {
        let mut store = MockObjectStore::new();
        store
            .expect_get()
            .withf(|_, ns, _| ns == "tekton-pipelines")
            .returning(|_, _, _| Ok(Some(annotated("a", "mine,other"))));
        store
            .expect_update()
            .times(1)
            .withf(|_, _, obj| annotation_owners(obj) == ["other"])
            .returning(|_, _, _| Ok(()));
        store.expect_delete().never();
        assert_eq!(
            delete_asset(&store, &active_in("a", "tekton-pipelines"), "kabanero", &owner())
                .await
                .unwrap(),
            DeleteOutcome::Disowned
        );
    }

    #[tokio::test]
    async fn test_delete_last_annotation_owner_deletes_trigger() {
        let mut store = MockObjectStore::new();
        store
            .expect_get()
            .returning(|_, _, _| Ok(Some(annotated("a", "mine"))));
        store.expect_update().never();
        store.expect_delete().times(1).returning(|_, _, _| Ok(()));
        assert_eq!(
            delete_asset(&store, &active_in("a", "tekton-pipelines"), "kabanero", &owner())
                .await
                .unwrap(),
            DeleteOutcome::Deleted
        );
    }

    #[tokio::test]
    async fn test_delete_unmarked_foreign_object_is_left_alone() {
        let mut store = MockObjectStore::new();
        store
            .expect_get()
            .returning(|_, _, _| Ok(Some(annotated("a", "other"))));
        store.expect_update().never();
        store.expect_delete().never();
        assert_eq!(
            delete_asset(&store, &active_in("a", "tekton-pipelines"), "kabanero", &owner())
                .await
                .unwrap(),
            DeleteOutcome::NotOwned
        );
    }
}
