use kube::CustomResourceExt;
use serde_json::{json, Value};
use shiftstep::crd::{Build, BuildConfig, DeploymentConfig, ImageStream};

fn main() -> anyhow::Result<()> {
    // CRDs standing in for the OpenShift API groups on a plain Kubernetes
    // cluster (kind, k3d), so the steps can be exercised without OpenShift.
    // Use: cargo run --bin gen-crd | kubectl apply -f -
    let mut crds: Vec<Value> = vec![
        serde_json::to_value(Build::crd())?,
        serde_json::to_value(BuildConfig::crd())?,
        serde_json::to_value(DeploymentConfig::crd())?,
        serde_json::to_value(ImageStream::crd())?,
    ];

    // Real objects carry many fields this crate does not model; keep them.
    for crd in &mut crds {
        if let Some(versions) = crd["spec"]["versions"].as_array_mut() {
            for version in versions {
                version["schema"]["openAPIV3Schema"]["x-kubernetes-preserve-unknown-fields"] =
                    json!(true);
            }
        }
    }

    let list = json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": crds,
    });
    println!("{}", serde_json::to_string_pretty(&list)?);
    Ok(())
}
