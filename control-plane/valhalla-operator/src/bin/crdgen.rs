use kube::core::CustomResourceExt;
use valhalla_operator::crd::Valhalla;

fn main() {
    let crd = Valhalla::crd();
    let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
    println!("{}", yaml);
}
