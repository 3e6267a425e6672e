//! Dynamic access to the external VirtualMachine resource
//!
//! The schedule controller consumes `VirtualMachine` (kubevirt.io/v1) as a
//! read-only collaborator: look up one VM by name in source mode, or list a
//! namespace and filter by label selector in selector mode. It never needs
//! the VM spec, so VMs are fetched as `DynamicObject`s and reduced to a
//! lightweight handle of identity plus labels.

use std::collections::BTreeMap;

use kube::api::{Api, DynamicObject, ListParams};
use kube::discovery::ApiResource;
use kube::Client;

use virtsnap_common::{Error, VIRTUAL_MACHINE_GROUP, VIRTUAL_MACHINE_KIND};

/// ApiResource describing kubevirt.io/v1 VirtualMachine
pub fn vm_api_resource() -> ApiResource {
    ApiResource {
        group: VIRTUAL_MACHINE_GROUP.to_string(),
        version: "v1".to_string(),
        api_version: format!("{}/v1", VIRTUAL_MACHINE_GROUP),
        kind: VIRTUAL_MACHINE_KIND.to_string(),
        plural: "virtualmachines".to_string(),
    }
}

/// Lightweight handle to a VirtualMachine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmHandle {
    /// VM name
    pub name: String,
    /// VM labels, used for selector matching
    pub labels: BTreeMap<String, String>,
}

impl VmHandle {
    /// Create a handle from its parts
    pub fn new(name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            labels,
        }
    }

    fn from_dynamic(obj: &DynamicObject) -> Option<Self> {
        let name = obj.metadata.name.clone()?;
        let labels = obj.metadata.labels.clone().unwrap_or_default();
        Some(Self { name, labels })
    }
}

/// Look up one VirtualMachine by name, returning None if it does not exist
pub async fn get_vm(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<Option<VmHandle>, Error> {
    let api: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), namespace, &vm_api_resource());
    match api.get(name).await {
        Ok(obj) => Ok(VmHandle::from_dynamic(&obj)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List all VirtualMachines in a namespace
pub async fn list_vms(client: &Client, namespace: &str) -> Result<Vec<VmHandle>, Error> {
    let api: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), namespace, &vm_api_resource());
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .items
        .iter()
        .filter_map(VmHandle::from_dynamic)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_api_resource() {
        let ar = vm_api_resource();
        assert_eq!(ar.group, "kubevirt.io");
        assert_eq!(ar.api_version, "kubevirt.io/v1");
        assert_eq!(ar.kind, "VirtualMachine");
        assert_eq!(ar.plural, "virtualmachines");
    }

    #[test]
    fn test_vm_handle_from_dynamic() {
        let obj = DynamicObject {
            types: None,
            metadata: kube::api::ObjectMeta {
                name: Some("web-0".to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), "web".to_string())])),
                ..Default::default()
            },
            data: serde_json::json!({}),
        };
        let handle = VmHandle::from_dynamic(&obj).unwrap();
        assert_eq!(handle.name, "web-0");
        assert_eq!(handle.labels.get("app").map(String::as_str), Some("web"));
    }

    #[test]
    fn test_vm_handle_requires_name() {
        let obj = DynamicObject {
            types: None,
            metadata: kube::api::ObjectMeta::default(),
            data: serde_json::json!({}),
        };
        assert!(VmHandle::from_dynamic(&obj).is_none());
    }
}
