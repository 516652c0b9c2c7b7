//! Prints the WorkloadAutoscaler CRD manifest as YAML.

use kube::core::CustomResourceExt;
use oprc_hpa::crd::WorkloadAutoscaler;

fn main() -> anyhow::Result<()> {
    let crd = WorkloadAutoscaler::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
