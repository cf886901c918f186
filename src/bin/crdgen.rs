//! Print the AnyApplication CustomResourceDefinition as YAML
//!
//! ```bash
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyapplication_controller::AnyApplication;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&AnyApplication::crd())?);
    Ok(())
}
