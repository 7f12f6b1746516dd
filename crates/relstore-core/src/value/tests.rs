use crate::value::{Value, canonical_cmp};
use proptest::prelude::*;
use std::cmp::Ordering;

fn arb_scalar_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        "[a-zA-Z0-9_]{0,8}".prop_map(Value::Text),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        arb_scalar_value(),
        prop::collection::vec(arb_scalar_value(), 0..4).prop_map(Value::List),
    ]
}

#[test]
fn variant_rank_orders_mixed_values() {
    let mut values = vec![
        Value::from("b"),
        Value::Int(3),
        Value::Null,
        Value::Bool(true),
        Value::List(vec![]),
        Value::Float(2.5),
    ];
    values.sort_by(canonical_cmp);

    assert_eq!(
        values,
        vec![
            Value::Null,
            Value::Bool(true),
            Value::Float(2.5),
            Value::Int(3),
            Value::from("b"),
            Value::List(vec![]),
        ]
    );
}

#[test]
fn ints_and_floats_compare_numerically() {
    assert_eq!(
        canonical_cmp(&Value::Int(2), &Value::Float(2.5)),
        Ordering::Less
    );
    assert_eq!(
        canonical_cmp(&Value::Float(3.0), &Value::Int(3)),
        Ordering::Equal
    );
}

#[test]
fn json_conversion_keeps_integer_precision() {
    let json = serde_json::json!({ "n": 9_007_199_254_740_993_i64, "f": 1.5, "tags": ["a", null] });
    let Value::Map(map) = Value::from(json) else {
        panic!("object should convert into a map value");
    };

    assert_eq!(map["n"], Value::Int(9_007_199_254_740_993));
    assert_eq!(map["f"], Value::Float(1.5));
    assert_eq!(
        map["tags"],
        Value::List(vec![Value::from("a"), Value::Null])
    );
}

proptest! {
    #[test]
    fn canonical_cmp_is_antisymmetric(left in arb_value(), right in arb_value()) {
        prop_assert_eq!(canonical_cmp(&left, &right), canonical_cmp(&right, &left).reverse());
    }

    #[test]
    fn canonical_cmp_is_reflexive(value in arb_value()) {
        prop_assert_eq!(canonical_cmp(&value, &value), Ordering::Equal);
    }
}
