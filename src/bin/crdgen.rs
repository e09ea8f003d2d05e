use kube::CustomResourceExt;

fn main() {
    let crds = vec![
        chall_operator::crds::Challenge::crd(),
        chall_operator::crds::ChallengeInstance::crd(),
    ];
    print!("{}", serde_yaml::to_string(&crds).unwrap());
}
