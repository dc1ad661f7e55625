use kube::CustomResourceExt;
use solar_operator::Star;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Star::crd())?);
    Ok(())
}
