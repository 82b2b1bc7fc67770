use kube::CustomResourceExt;
use stack_controller::crd::Stack;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Stack::crd())?);
    Ok(())
}
