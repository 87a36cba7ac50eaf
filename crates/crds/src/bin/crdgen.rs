//! Prints the CRD manifests as a multi-document YAML stream, for
//! piping into `kubectl apply -f -`.

use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&crds::Subnet::crd())?);
    println!("---");
    print!("{}", serde_yaml::to_string(&crds::IPPool::crd())?);
    Ok(())
}
