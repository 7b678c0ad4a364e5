//! Pod templates loaded from YAML manifests.

use std::path::Path;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::api::ObjectMeta;

use super::{PodConstructor, TemplateError};

/// Build a constructor from a pod manifest on disk.
///
/// The file is read once. Every pod built from it gets fresh metadata
/// (namespace and name only) and no status.
pub fn from_yaml_file(path: &Path) -> Result<PodConstructor, TemplateError> {
    let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    from_yaml_str(&content).map_err(|source| TemplateError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Build a constructor from a pod manifest
pub fn from_yaml_str(content: &str) -> Result<PodConstructor, serde_yaml::Error> {
    let template: Pod = serde_yaml::from_str(content)?;

    let constructor: PodConstructor = Arc::new(move |namespace: &str, name: &str| {
        let mut pod = template.clone();
        pod.metadata = ObjectMeta {
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        };
        pod.status = None;
        pod
    });
    Ok(constructor)
}
