//! End-to-end scenarios through the full pipeline: IR construction,
//! analysis, compilation, invocation, and BEAST2 round-trips.

use east_compiler::{
    PlatformFunction, Platforms, analyze, compile_sync, decode_beast2_linked, invoke_sync,
};
use east_core::value::is_identical;
use east_core::{Expr, Type, Value};
use std::rc::Rc;

fn no_platforms() -> Platforms {
    Platforms::new(vec![]).unwrap()
}

fn compile(body: Rc<Expr>, output: Type) -> Value {
    let function = Expr::function(vec![], output, vec![], body);
    let analyzed = analyze(&function, &no_platforms()).expect("analysis");
    compile_sync(&analyzed, &no_platforms()).expect("compilation")
}

fn int_add(left: Rc<Expr>, right: Rc<Expr>) -> Rc<Expr> {
    Expr::builtin("IntegerAdd", vec![], vec![left, right])
}

#[test]
fn test_dict_fold_over_heterogeneous_input() {
    // Build {"a": 10, "b": 20, "c": 30} and fold the values with + from 0.
    let dict = Expr::new_dict(
        Type::String,
        Type::Integer,
        vec![
            (Expr::string("a"), Expr::integer(10)),
            (Expr::string("b"), Expr::integer(20)),
            (Expr::string("c"), Expr::integer(30)),
        ],
    );
    let adder = Expr::function(
        vec![
            ("acc".to_string(), Type::Integer),
            ("value".to_string(), Type::Integer),
        ],
        Type::Integer,
        vec![],
        int_add(Expr::reference("acc"), Expr::reference("value")),
    );
    let fold = Expr::builtin(
        "DictFold",
        vec![Type::String, Type::Integer, Type::Integer],
        vec![dict, Expr::integer(0), adder],
    );
    let function = compile(fold, Type::Integer);
    let result = invoke_sync(&function, vec![]).unwrap();
    assert!(matches!(result, Value::Integer(60)));
}

#[test]
fn test_early_return_from_inside_if() {
    // x = true; if x { return 42 } else {}; return 0
    let body = Expr::block(
        vec![
            Expr::let_("x", Expr::boolean(true)),
            Expr::if_(
                vec![(
                    Expr::reference("x"),
                    Expr::return_(Expr::integer(42)),
                )],
                Some(Expr::block(vec![], Expr::null())),
            ),
        ],
        Expr::return_(Expr::integer(0)),
    );
    let function = compile(body, Type::Integer);
    let result = invoke_sync(&function, vec![]).unwrap();
    assert!(matches!(result, Value::Integer(42)));
}

#[test]
fn test_while_true_with_labeled_break() {
    // while true label { break label }; return 42
    let body = Expr::block(
        vec![Expr::while_(
            Some("label".to_string()),
            Expr::boolean(true),
            Expr::break_(Some("label".to_string())),
        )],
        Expr::return_(Expr::integer(42)),
    );
    let function = compile(body, Type::Integer);
    let result = invoke_sync(&function, vec![]).unwrap();
    assert!(matches!(result, Value::Integer(42)));
}

#[test]
fn test_out_of_bounds_array_access() {
    // return [10,20,30][4]
    let array = Expr::new_array(
        Type::Integer,
        vec![Expr::integer(10), Expr::integer(20), Expr::integer(30)],
    );
    let get = Expr::builtin(
        "ArrayGet",
        vec![Type::Integer],
        vec![array, Expr::integer(4)],
    );
    let function = compile(get, Type::Integer);
    let err = invoke_sync(&function, vec![]).unwrap_err();
    assert!(err.message.contains("Array index 4 out of bounds"));
}

#[test]
fn test_out_of_bounds_is_catchable_with_try() {
    let array = Expr::new_array(Type::Integer, vec![Expr::integer(10)]);
    let get = Expr::builtin(
        "ArrayGet",
        vec![Type::Integer],
        vec![array, Expr::integer(4)],
    );
    let recover = Expr::try_(get, "message", "trace", Expr::integer(-1));
    let function = compile(recover, Type::Integer);
    let result = invoke_sync(&function, vec![]).unwrap();
    assert!(matches!(result, Value::Integer(-1)));
}

#[test]
fn test_mutable_alias_beast2_round_trip() {
    // a = []; s = (field1=a, field2=a); after a round trip the two
    // fields must still alias the same array.
    let array_ty = Type::Array(Box::new(Type::Integer));
    let struct_ty = Type::Struct(vec![
        ("field1".to_string(), array_ty.clone()),
        ("field2".to_string(), array_ty.clone()),
    ]);
    let shared = Value::array(vec![]);
    let value = Value::structure(vec![shared.clone(), shared]);
    let bytes = east_codec::encode_beast2(&struct_ty, &value).unwrap();
    let decoded = decode_beast2_linked(&struct_ty, &no_platforms(), &bytes).unwrap();

    let Value::Struct(fields) = &decoded else {
        panic!("expected struct");
    };
    if let Value::Array(data) = &fields[0] {
        data.items.borrow_mut().push(Value::Integer(5));
    }
    if let Value::Array(data) = &fields[1] {
        assert_eq!(data.items.borrow().len(), 1);
    }

    // The program sees the aliasing too: Is(s.field1, s.field2).
    let check = Expr::function(
        vec![("s".to_string(), struct_ty.clone())],
        Type::Boolean,
        vec![],
        Expr::builtin(
            "Is",
            vec![array_ty.clone()],
            vec![
                Expr::builtin(
                    "GetField",
                    vec![struct_ty.clone(), array_ty.clone()],
                    vec![Expr::reference("s"), Expr::string("field1")],
                ),
                Expr::builtin(
                    "GetField",
                    vec![struct_ty.clone(), array_ty.clone()],
                    vec![Expr::reference("s"), Expr::string("field2")],
                ),
            ],
        ),
    );
    let analyzed = analyze(&check, &no_platforms()).unwrap();
    let function = compile_sync(&analyzed, &no_platforms()).unwrap();
    let result = invoke_sync(&function, vec![decoded]).unwrap();
    assert!(matches!(result, Value::Boolean(true)));
}

#[test]
fn test_serialized_free_function_with_platform() {
    // double is a platform; f(x) = double(x) + 1. Compile, encode,
    // decode against the same platform, call with 10 => 21.
    let platforms = Platforms::new(vec![PlatformFunction::sync(
        "double",
        vec![Type::Integer],
        Type::Integer,
        |args| match args.first() {
            Some(Value::Integer(n)) => Ok(Value::Integer(n * 2)),
            _ => Err(east_core::EastError::new("double expects an integer")),
        },
    )])
    .unwrap();

    let f = Expr::function(
        vec![("x".to_string(), Type::Integer)],
        Type::Integer,
        vec![],
        int_add(
            Expr::platform("double", vec![Expr::reference("x")]),
            Expr::integer(1),
        ),
    );
    let analyzed = analyze(&f, &platforms).unwrap();
    let compiled = compile_sync(&analyzed, &platforms).unwrap();

    let fn_ty = Type::function(
        vec![Type::Integer],
        Type::Integer,
        ["double".to_string()].into_iter().collect(),
    );
    let bytes = east_codec::encode_beast2(&fn_ty, &compiled).unwrap();
    let reloaded = decode_beast2_linked(&fn_ty, &platforms, &bytes).unwrap();
    let result = invoke_sync(&reloaded, vec![Value::Integer(10)]).unwrap();
    assert!(matches!(result, Value::Integer(21)));

    // Re-compiled callables carry their IR again, so a second round
    // trip is byte-identical.
    let again = east_codec::encode_beast2(&fn_ty, &reloaded).unwrap();
    assert_eq!(bytes, again);
}

#[test]
fn test_iteration_guard_inside_for() {
    // let a = [1,2,3]; for item in a { push(a, item) } faults, and the
    // fault is catchable.
    let body = Expr::block(
        vec![
            Expr::let_(
                "a",
                Expr::new_array(
                    Type::Integer,
                    vec![Expr::integer(1), Expr::integer(2), Expr::integer(3)],
                ),
            ),
            Expr::for_(
                None,
                Expr::reference("a"),
                "item",
                None,
                Expr::builtin(
                    "ArrayPush",
                    vec![Type::Integer],
                    vec![Expr::reference("a"), Expr::reference("item")],
                ),
            ),
        ],
        Expr::integer(0),
    );
    let recover = Expr::try_(body, "message", "trace", Expr::integer(-1));
    let function = compile(recover, Type::Integer);
    let result = invoke_sync(&function, vec![]).unwrap();
    assert!(matches!(result, Value::Integer(-1)));
}

#[test]
fn test_error_node_message_and_stack() {
    let raise = Expr::with_location(
        &Expr::error(Expr::string("boom")),
        east_core::Location::new(7, 3),
    );
    let catch = Expr::try_(
        raise,
        "message",
        "trace",
        Expr::reference("message"),
    );
    let function = compile(catch, Type::String);
    let result = invoke_sync(&function, vec![]).unwrap();
    match result {
        Value::String(s) => assert_eq!(s.as_ref(), "boom"),
        _ => panic!("expected string"),
    }
}

#[test]
fn test_closure_capture_snapshot() {
    // base = 5; inc = fn(n) captures base { n + base }; inc(2) == 7.
    let inner = Expr::function(
        vec![("n".to_string(), Type::Integer)],
        Type::Integer,
        vec!["base".to_string()],
        int_add(Expr::reference("n"), Expr::reference("base")),
    );
    let body = Expr::block(
        vec![
            Expr::let_("base", Expr::integer(5)),
            Expr::let_("inc", inner),
        ],
        Expr::call(Expr::reference("inc"), vec![Expr::integer(2)]),
    );
    let function = compile(body, Type::Integer);
    let result = invoke_sync(&function, vec![]).unwrap();
    assert!(matches!(result, Value::Integer(7)));
}

#[test]
fn test_captured_function_is_not_serializable() {
    // A closure with captures carries no IR and refuses to encode.
    let inner = Expr::function(
        vec![],
        Type::Integer,
        vec!["base".to_string()],
        Expr::reference("base"),
    );
    let outer_body = Expr::block(
        vec![Expr::let_("base", Expr::integer(1))],
        inner,
    );
    let inner_ty = Type::function(vec![], Type::Integer, Default::default());
    let outer = Expr::function(vec![], inner_ty.clone(), vec![], outer_body);
    let analyzed = analyze(&outer, &no_platforms()).unwrap();
    let function = compile_sync(&analyzed, &no_platforms()).unwrap();
    let closure = invoke_sync(&function, vec![]).unwrap();
    let err = east_codec::encode_beast2(&inner_ty, &closure).unwrap_err();
    assert!(matches!(err, east_codec::CodecError::Unsupported(_)));
}

#[test]
fn test_match_dispatch() {
    let shape = Type::variant(vec![
        ("circle".to_string(), Type::Integer),
        ("point".to_string(), Type::Null),
    ])
    .unwrap();
    let scrutinee = Expr::variant(shape.clone(), "circle", Expr::integer(9));
    let matched = Expr::match_(
        scrutinee,
        vec![
            east_core::MatchArm {
                case: "circle".to_string(),
                binding: "radius".to_string(),
                body: Expr::reference("radius"),
            },
            east_core::MatchArm {
                case: "point".to_string(),
                binding: "ignored".to_string(),
                body: Expr::integer(0),
            },
        ],
    );
    let function = compile(matched, Type::Integer);
    let result = invoke_sync(&function, vec![]).unwrap();
    assert!(matches!(result, Value::Integer(9)));
}

#[test]
fn test_literal_containers_are_fresh_per_evaluation() {
    // A literal array pushed into must not leak into the next call.
    let literal = Expr::value(
        Type::Array(Box::new(Type::Integer)),
        Value::array(vec![Value::Integer(1)]),
    )
    .unwrap();
    let body = Expr::block(
        vec![
            Expr::let_("a", literal),
            Expr::builtin(
                "ArrayPush",
                vec![Type::Integer],
                vec![Expr::reference("a"), Expr::integer(2)],
            ),
        ],
        Expr::builtin("ArraySize", vec![Type::Integer], vec![Expr::reference("a")]),
    );
    let function = compile(body, Type::Integer);
    for _ in 0..2 {
        let result = invoke_sync(&function, vec![]).unwrap();
        assert!(matches!(result, Value::Integer(2)));
    }
}

#[test]
fn test_decoded_alias_identity_helper() {
    let shared = Value::array(vec![Value::Integer(1)]);
    assert!(is_identical(&shared, &shared.clone()));
}

#[test]
fn test_blob_round_trip_through_a_file() {
    // BEAST2 blobs are the only persisted artifact; make sure one
    // survives the filesystem unchanged.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let ty = Type::Dict(Box::new(Type::String), Box::new(Type::Integer));
    let value = Value::dict_of([
        (Value::string("a"), Value::Integer(1)),
        (Value::string("b"), Value::Integer(2)),
    ]);
    let bytes = east_codec::encode_beast2(&ty, &value).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.beast2");
    std::fs::write(&path, &bytes).unwrap();
    let reloaded = std::fs::read(&path).unwrap();
    let decoded = east_codec::decode_beast2_for(&ty, &reloaded).unwrap();
    assert!(east_core::values_equal(&value, &decoded));
}
