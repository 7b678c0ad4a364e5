//! Pod templates for benchmark workloads.
//!
//! A template is a constructor from `(namespace, name)` to a pod. The
//! registry of available templates is built explicitly at startup
//! ([`TemplateRegistry::builtin`]) and passed to whoever needs it.

pub mod builtin;
pub mod yaml;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use thiserror::Error;
use uuid::Uuid;

use crate::core::EntityFactory;

pub use yaml::{from_yaml_file, from_yaml_str};

/// Label carrying the template name
pub const TYPE_LABEL: &str = "podspeed/type";

/// Label carrying the run id, used to scope the watch
pub const RUN_LABEL: &str = "podspeed/run";

/// Builds a pod for a namespace and name
pub type PodConstructor = Arc<dyn Fn(&str, &str) -> Pod + Send + Sync>;

/// Errors resolving or loading templates
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Unknown pod type '{name}', expected one of: {}", .known.join(", "))]
    Unknown { name: String, known: Vec<String> },

    #[error("Failed to read template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse template {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Named pod constructors
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    constructors: HashMap<String, PodConstructor>,
}

impl TemplateRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in template
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("basic", builtin::basic);
        registry.register("knative-head", builtin::knative_head);
        registry.register("knative-qpframework", builtin::knative_qpframework);
        registry.register("knative-v0.21", builtin::knative_v021);
        registry
    }

    /// Add or replace a template
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&str, &str) -> Pod + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    pub fn get(&self, name: &str) -> Result<PodConstructor, TemplateError> {
        self.constructors
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::Unknown {
                name: name.to_string(),
                known: self.names(),
            })
    }

    /// Template names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Produces the pods of one run from a template
///
/// Every pod is named `<type>-<uuid>` and labelled with the template name
/// and the run id.
pub struct PodFactory {
    namespace: String,
    type_name: String,
    run_id: Uuid,
    constructor: PodConstructor,
}

impl PodFactory {
    pub fn new(namespace: impl Into<String>, type_name: impl Into<String>, constructor: PodConstructor) -> Self {
        Self {
            namespace: namespace.into(),
            type_name: type_name.into(),
            run_id: Uuid::new_v4(),
            constructor,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Label selector matching exactly the pods of this run
    pub fn selector(&self) -> String {
        format!("{}={}", RUN_LABEL, self.run_id)
    }
}

impl EntityFactory for PodFactory {
    type Spec = Pod;

    fn next_name(&self) -> String {
        format!("{}-{}", self.type_name, Uuid::new_v4())
    }

    fn build(&self, name: &str) -> Pod {
        let mut pod = (self.constructor)(&self.namespace, name);
        let labels = pod.metadata.labels.get_or_insert_with(BTreeMap::new);
        labels.insert(TYPE_LABEL.to_string(), self.type_name.clone());
        labels.insert(RUN_LABEL.to_string(), self.run_id.to_string());
        pod
    }
}
