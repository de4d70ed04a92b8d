use proptest::prelude::*;
use preproc::script::expr::parse_expr;
use preproc::script::location::{split_lines, Location};
use preproc::script::stmt::parse_document;
use preproc::script::{Interpreter, Value};

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        any::<i64>().prop_map(Value::from),
        any::<f64>().prop_filter("finite", |x| x.is_finite()).prop_map(Value::from),
        "\\PC{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{0,4}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    /// Serializing a value and parsing it back gives an equal value.
    #[test]
    fn json_round_trip(v in arb_value()) {
        let text = v.to_json();
        let back = Value::from_json(&text).expect("own JSON must parse");
        prop_assert_eq!(back, v);
    }

    /// Only `Null` and `false` are falsy.
    #[test]
    fn truthiness(v in arb_value()) {
        let falsy = matches!(v, Value::Null | Value::Boolean(false));
        prop_assert_eq!(v.is_truthy(), !falsy);
    }
}

proptest! {
    /// The parsers return Ok or Err on arbitrary input, never panic.
    #[test]
    fn parsers_do_not_panic(s in "\\PC*") {
        let _ = parse_document(&split_lines(&s));
        let _ = parse_expr(&s, Location::new(1, 1));
    }

    /// Lines without directive or reference syntax pass through unchanged.
    #[test]
    fn plain_text_is_identity(s in "[A-Za-z0-9 ,:>()-]{0,40}") {
        let mut interp = Interpreter::default();
        let out = interp.run_text(&s).expect("plain text must run");
        let text: Vec<String> = out.into_iter().map(|l| l.text).collect();
        prop_assert_eq!(text.join("\n"), s.lines().collect::<Vec<_>>().join("\n"));
    }
}

proptest! {
    /// %substr output is a contiguous slice of the input.
    #[test]
    fn substr_is_a_slice(s in "\\PC{0,20}", start in -5i64..30, len in -5i64..30) {
        let mut interp = Interpreter::default();
        interp.set_variable("s", Value::from(s.clone()));
        interp.set_variable("start", Value::from(start));
        interp.set_variable("len", Value::from(len));
        interp.run_text("!out = %substr(s, start, len)").expect("substr must run");
        let out = interp.variable("out").and_then(Value::as_str).unwrap_or_default().to_owned();
        prop_assert!(out.chars().count() <= s.chars().count());
        prop_assert!(s.contains(&out));
    }

    /// %strlen counts characters.
    #[test]
    fn strlen_counts_chars(s in "\\PC{0,30}") {
        let mut interp = Interpreter::default();
        interp.set_variable("s", Value::from(s.clone()));
        interp.run_text("!n = %strlen(s)").expect("strlen must run");
        prop_assert_eq!(interp.variable("n"), Some(&Value::from(s.chars().count() as i64)));
    }
}
