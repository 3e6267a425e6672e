//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction, optional-get, and the JSON-Patch status writer used
//! by the schedule controller.

use std::fmt::Debug;
use std::path::Path;

use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Error;

/// Create a kube client from optional kubeconfig path
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context("client", format!("failed to read kubeconfig: {}", e))
            })?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?;
            Client::try_from(config).map_err(|e| {
                Error::internal_with_context("client", format!("failed to create client: {}", e))
            })
        }
        None => Client::try_default().await.map_err(|e| {
            Error::internal_with_context("client", format!("failed to create client: {}", e))
        }),
    }
}

/// Get a Kubernetes resource by name, returning None if not found.
///
/// This reduces boilerplate for the common pattern of handling 404 errors
/// when fetching resources that may or may not exist.
pub async fn get_optional<K>(api: &Api<K>, name: &str) -> Result<Option<K>, Error>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.get(name).await {
        Ok(resource) => Ok(Some(resource)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write a resource's status subresource with a JSON-Patch.
///
/// Emits `replace /status` when the stored object already has a status and
/// `add /status` for the first write (RFC 6902 replace requires the target
/// path to exist).
pub async fn patch_status_json<K, S>(
    client: &Client,
    namespace: &str,
    name: &str,
    status: &S,
    replace: bool,
) -> Result<(), Error>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
    S: Serialize,
{
    let op = if replace { "replace" } else { "add" };
    let patch: json_patch::Patch = serde_json::from_value(serde_json::json!([
        {"op": op, "path": "/status", "value": status}
    ]))
    .map_err(|e| Error::serialization(format!("failed to build status patch: {}", e)))?;

    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    api.patch_status(name, &PatchParams::default(), &Patch::Json::<()>(patch))
        .await?;

    Ok(())
}
