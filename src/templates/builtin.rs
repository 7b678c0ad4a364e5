//! Built-in pod templates.
//!
//! - `basic`: a single HTTP container, the smallest useful workload
//! - `knative-head`: a user container with a queue-proxy sidecar, shaped
//!   like a pod created by Knative Serving
//! - `knative-v0.21`: the same pod as of Knative Serving v0.21
//! - `knative-qpframework`: a single container embedding the queue-proxy

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, EnvVar, EnvVarSource, ExecAction, HTTPGetAction,
    HTTPHeader, Lifecycle, LifecycleHandler, ObjectFieldSelector, Pod, PodSpec, Probe,
    ResourceRequirements, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

const BASIC_IMAGE: &str = "docker.io/markusthoemmes/basic-500716b931f14b4a09df1ec4b4c5550d@sha256:06a71c34b05cd9d74fb9aa904ba256b525a7c39df0708b8cbbfcce923ad8af01";
const QUEUE_PROXY_IMAGE: &str = "docker.io/markusthoemmes/queue-39be6f1d08a095bd076a71d288d295b6@sha256:8f3e3ae91b4be6783f10e14b398861240b16ba09cb98d85e86f4b04c7e6be76c";
const QUEUE_PROXY_IMAGE_V021: &str = "docker.io/markusthoemmes/queue-39be6f1d08a095bd076a71d288d295b6@sha256:d8093cbcd11f803f8f67cd082a8f69d33cb7eaa11fbc80102fc5dd01b7e393a8";
const QP_FRAMEWORK_IMAGE: &str = "docker.io/markusthoemmes/helloworld-edca531b677458dd5cb687926757a480@sha256:42281f93caa08ac6421fc746e4981f85e6925902cff0d863c455017dc7e09942";

const TERMINATION_GRACE_SECONDS: i64 = 300;

pub fn basic(namespace: &str, name: &str) -> Pod {
    Pod {
        metadata: metadata(namespace, name),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "test".to_string(),
                image: Some(BASIC_IMAGE.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn knative_head(namespace: &str, name: &str) -> Pod {
    let queue_proxy = Container {
        name: "queue-proxy".to_string(),
        image: Some(QUEUE_PROXY_IMAGE.to_string()),
        ..queue_proxy_container(namespace)
    };
    knative_pod(namespace, name, queue_proxy)
}

/// Knative Serving v0.21: exec readiness check, no startup check
pub fn knative_v021(namespace: &str, name: &str) -> Pod {
    let queue_proxy = Container {
        name: "queue-proxy".to_string(),
        image: Some(QUEUE_PROXY_IMAGE_V021.to_string()),
        startup_probe: None,
        readiness_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(vec![
                    "/ko-app/queue".to_string(),
                    "-probe-period".to_string(),
                    "0".to_string(),
                ]),
            }),
            timeout_seconds: Some(10),
            failure_threshold: Some(3),
            success_threshold: Some(1),
            period_seconds: Some(10),
            ..Default::default()
        }),
        ..queue_proxy_container(namespace)
    };
    knative_pod(namespace, name, queue_proxy)
}

pub fn knative_qpframework(namespace: &str, name: &str) -> Pod {
    let mut container = Container {
        name: "queue-proxy".to_string(),
        image: Some(QP_FRAMEWORK_IMAGE.to_string()),
        ..queue_proxy_container(namespace)
    };
    if let Some(ports) = container.ports.as_mut() {
        ports.push(port("user-port", 8080));
    }

    Pod {
        metadata: metadata(namespace, name),
        spec: Some(PodSpec {
            containers: vec![container],
            termination_grace_period_seconds: Some(TERMINATION_GRACE_SECONDS),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// User container plus queue-proxy sidecar
fn knative_pod(namespace: &str, name: &str, queue_proxy: Container) -> Pod {
    let user_container = Container {
        name: "user-container".to_string(),
        image: Some(BASIC_IMAGE.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(vec![
            env("PORT", "8080"),
            env("K_REVISION", "helloworld-go-00001"),
            env("K_CONFIGURATION", "helloworld-go"),
            env("K_SERVICE", "helloworld-go"),
        ]),
        ports: Some(vec![port("user-port", 8080)]),
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                http_get: Some(HTTPGetAction {
                    path: Some("/wait-for-drain".to_string()),
                    port: IntOrString::Int(8022),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        termination_message_policy: Some("FallbackToLogsOnError".to_string()),
        ..Default::default()
    };

    Pod {
        metadata: metadata(namespace, name),
        spec: Some(PodSpec {
            containers: vec![user_container, queue_proxy],
            termination_grace_period_seconds: Some(TERMINATION_GRACE_SECONDS),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Queue-proxy settings shared by the Knative-shaped templates
fn queue_proxy_container(namespace: &str) -> Container {
    Container {
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(vec![
            env("SERVING_NAMESPACE", namespace),
            env("SERVING_SERVICE", "helloworld-go"),
            env("SERVING_CONFIGURATION", "helloworld-go"),
            env("SERVING_REVISION", "helloworld-go-00001"),
            env("QUEUE_SERVING_PORT", "8012"),
            env("CONTAINER_CONCURRENCY", "0"),
            env("REVISION_TIMEOUT_SECONDS", "300"),
            field_env("SERVING_POD", "metadata.name"),
            field_env("SERVING_POD_IP", "status.podIP"),
            env("SERVING_ENABLE_REQUEST_LOG", "false"),
            env("SERVING_REQUEST_METRICS_BACKEND", "prometheus"),
            env("TRACING_CONFIG_BACKEND", "none"),
            env("USER_PORT", "8080"),
            env("SYSTEM_NAMESPACE", "knative-serving"),
            env("METRICS_DOMAIN", "knative.dev/internal/serving"),
            env(
                "SERVING_READINESS_PROBE",
                r#"{"tcpSocket":{"port":8080,"host":"127.0.0.1"},"successThreshold":1}"#,
            ),
            env("ENABLE_PROFILING", "false"),
        ]),
        ports: Some(vec![
            port("http-queueadm", 8022),
            port("http-autometric", 9090),
            port("http-usermetric", 9091),
            port("queue-port", 8012),
        ]),
        resources: Some(ResourceRequirements {
            requests: Some(BTreeMap::from([(
                "cpu".to_string(),
                Quantity("25m".to_string()),
            )])),
            ..Default::default()
        }),
        startup_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(vec![
                    "/ko-app/queue".to_string(),
                    "-probe-timeout".to_string(),
                    "10m0s".to_string(),
                ]),
            }),
            timeout_seconds: Some(600),
            failure_threshold: Some(1),
            success_threshold: Some(1),
            period_seconds: Some(1),
            ..Default::default()
        }),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                http_headers: Some(vec![HTTPHeader {
                    name: "K-Network-Probe".to_string(),
                    value: "queue".to_string(),
                }]),
                port: IntOrString::Int(8012),
                ..Default::default()
            }),
            timeout_seconds: Some(1),
            failure_threshold: Some(3),
            success_threshold: Some(1),
            period_seconds: Some(1),
            ..Default::default()
        }),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(false),
            read_only_root_filesystem: Some(true),
            run_as_non_root: Some(true),
            capabilities: Some(Capabilities {
                drop: Some(vec!["all".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn metadata(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(namespace.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn field_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn port(name: &str, container_port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port,
        ..Default::default()
    }
}
