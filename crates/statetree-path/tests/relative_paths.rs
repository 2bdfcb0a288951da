use proptest::prelude::*;
use statetree_path::{
    format_json_pointer, parse_json_pointer, relative_path, resolve_relative,
};

fn step() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,6}",
        "[0-9]{1,3}",
        "[a-z~/]{1,4}",
    ]
}

fn path() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(step(), 0..6)
}

proptest! {
    #[test]
    fn relative_path_resolves_back_to_target(from in path(), to in path()) {
        let rel = relative_path(&from, &to);
        prop_assert_eq!(resolve_relative(&from, &rel).unwrap(), to);
    }

    #[test]
    fn pointer_round_trips(p in path()) {
        prop_assert_eq!(parse_json_pointer(&format_json_pointer(&p)), p);
    }
}

#[test]
fn shared_prefix_is_not_climbed() {
    let from = parse_json_pointer("/store/orders/4");
    let to = parse_json_pointer("/store/customers/1");
    assert_eq!(relative_path(&from, &to), "../../customers/1");
}

#[test]
fn root_to_deep_node() {
    let to = parse_json_pointer("/a/b/c");
    assert_eq!(relative_path(&[], &to), "a/b/c");
}
