//! StatefulSet replica reads and writes through the `scale` subresource.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::autoscaling::v1::{Scale, ScaleSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::{Api, Client};

use zeroscale_autoscale::{BoxFuture, ScaleError, WorkloadClient, WorkloadScale};
use zeroscale_core::WorkloadIdentity;

/// [`WorkloadClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeWorkloadClient {
    client: Client,
}

impl KubeWorkloadClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, workload: &WorkloadIdentity) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), &workload.namespace)
    }
}

impl WorkloadClient for KubeWorkloadClient {
    fn get_scale<'a>(
        &'a self,
        workload: &'a WorkloadIdentity,
    ) -> BoxFuture<'a, Result<WorkloadScale, ScaleError>> {
        Box::pin(async move {
            let scale = self
                .api(workload)
                .get_scale(&workload.name)
                .await
                .map_err(|e| scale_error(workload, e))?;
            Ok(workload_scale(scale))
        })
    }

    fn replace_scale<'a>(
        &'a self,
        workload: &'a WorkloadIdentity,
        current: &'a WorkloadScale,
        replicas: i32,
    ) -> BoxFuture<'a, Result<(), ScaleError>> {
        Box::pin(async move {
            let body = scale_body(workload, current, replicas)?;
            self.api(workload)
                .replace_scale(&workload.name, &PostParams::default(), body)
                .await
                .map_err(|e| scale_error(workload, e))?;
            Ok(())
        })
    }
}

/// `spec.replicas` is omitted from the wire form when it is zero, so an
/// absent value reads as zero.
fn workload_scale(scale: Scale) -> WorkloadScale {
    WorkloadScale {
        replicas: scale.spec.and_then(|s| s.replicas).unwrap_or(0),
        resource_version: scale.metadata.resource_version,
    }
}

fn scale_body(
    workload: &WorkloadIdentity,
    current: &WorkloadScale,
    replicas: i32,
) -> Result<Vec<u8>, ScaleError> {
    let scale = Scale {
        metadata: ObjectMeta {
            name: Some(workload.name.clone()),
            namespace: Some(workload.namespace.clone()),
            resource_version: current.resource_version.clone(),
            ..Default::default()
        },
        spec: Some(ScaleSpec {
            replicas: Some(replicas),
        }),
        status: None,
    };
    serde_json::to_vec(&scale).map_err(|e| ScaleError::Api(e.to_string()))
}

fn scale_error(workload: &WorkloadIdentity, err: kube::Error) -> ScaleError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => ScaleError::NotFound(workload.to_string()),
        kube::Error::Api(resp) if resp.code == 409 => ScaleError::Conflict(workload.to_string()),
        other => ScaleError::Api(other.to_string()),
    }
}
