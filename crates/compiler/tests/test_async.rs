//! Async path: ordering of suspension points, compile-path exclusivity,
//! platform fault handling, and async function round-trips.

use east_compiler::{
    CompileError, PlatformFunction, Platforms, analyze, compile_async, compile_sync,
    decode_beast2_linked, invoke_async, invoke_sync,
};
use east_core::{EastError, Expr, Type, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("current-thread runtime")
}

/// An async `fetch` platform that records invocation order.
fn fetch_platform(log: Rc<RefCell<Vec<i64>>>) -> PlatformFunction {
    PlatformFunction::asynchronous(
        "fetch",
        vec![Type::Integer],
        Type::Integer,
        move |args| {
            let log = log.clone();
            Box::pin(async move {
                let Some(Value::Integer(n)) = args.first().cloned() else {
                    return Err(EastError::new("fetch expects an integer"));
                };
                // Yield once so interleaving would be observable if two
                // calls ever overlapped.
                tokio::task::yield_now().await;
                log.borrow_mut().push(n);
                Ok(Value::Integer(n * 10))
            })
        },
    )
}

fn int_add(left: Rc<Expr>, right: Rc<Expr>) -> Rc<Expr> {
    Expr::builtin("IntegerAdd", vec![], vec![left, right])
}

#[test]
fn test_chained_async_calls_are_ordered() {
    let log: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
    let platforms = Platforms::new(vec![fetch_platform(log.clone())]).unwrap();

    // a = fetch(1); b = fetch(2); return a + b
    let body = Expr::block(
        vec![
            Expr::let_("a", Expr::platform("fetch", vec![Expr::integer(1)])),
            Expr::let_("b", Expr::platform("fetch", vec![Expr::integer(2)])),
        ],
        int_add(Expr::reference("a"), Expr::reference("b")),
    );
    let function = Expr::async_function(vec![], Type::Integer, vec![], body);
    let analyzed = analyze(&function, &platforms).unwrap();
    assert!(matches!(analyzed.ty, Type::AsyncFunction { .. }));

    let compiled = compile_async(&analyzed, &platforms).unwrap();
    let result = runtime()
        .block_on(invoke_async(&compiled, vec![]))
        .unwrap();
    assert!(matches!(result, Value::Integer(30)));
    // The second call observed the first's completion.
    assert_eq!(*log.borrow(), vec![1, 2]);
}

#[test]
fn test_compile_path_exclusivity() {
    let log: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
    let async_platforms = Platforms::new(vec![fetch_platform(log)]).unwrap();
    let sync_platforms = Platforms::new(vec![PlatformFunction::sync(
        "double",
        vec![Type::Integer],
        Type::Integer,
        |args| match args.first() {
            Some(Value::Integer(n)) => Ok(Value::Integer(n * 2)),
            _ => Err(EastError::new("double expects an integer")),
        },
    )])
    .unwrap();

    let async_fn = Expr::async_function(
        vec![],
        Type::Integer,
        vec![],
        Expr::platform("fetch", vec![Expr::integer(1)]),
    );
    let analyzed = analyze(&async_fn, &async_platforms).unwrap();
    // Sync compiler with an async platform bound must refuse.
    assert!(matches!(
        compile_sync(&analyzed, &async_platforms),
        Err(CompileError::AsyncPlatformBound(_))
    ));

    let sync_fn = Expr::function(
        vec![],
        Type::Integer,
        vec![],
        Expr::platform("double", vec![Expr::integer(1)]),
    );
    let analyzed = analyze(&sync_fn, &sync_platforms).unwrap();
    // Async compiler with no async platform bound must refuse.
    assert!(matches!(
        compile_async(&analyzed, &sync_platforms),
        Err(CompileError::NoAsyncPlatform)
    ));
}

#[test]
fn test_sync_function_cannot_touch_async_platform() {
    let log: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
    let platforms = Platforms::new(vec![fetch_platform(log)]).unwrap();
    let f = Expr::function(
        vec![],
        Type::Integer,
        vec![],
        Expr::platform("fetch", vec![Expr::integer(1)]),
    );
    let err = analyze(&f, &platforms).unwrap_err();
    assert!(err.to_string().contains("declare it async"));
}

#[test]
fn test_async_function_requires_async_platform() {
    let platforms = Platforms::new(vec![]).unwrap();
    let f = Expr::async_function(vec![], Type::Integer, vec![], Expr::integer(1));
    let err = analyze(&f, &platforms).unwrap_err();
    assert!(err.to_string().contains("touches no async platform"));
}

#[test]
fn test_platform_fault_is_catchable() {
    let platforms = Platforms::new(vec![PlatformFunction::sync(
        "explode",
        vec![],
        Type::Integer,
        |_| Err(EastError::new("host refused")),
    )])
    .unwrap();
    let body = Expr::try_(
        Expr::platform("explode", vec![]),
        "message",
        "trace",
        Expr::integer(-1),
    );
    let f = Expr::function(vec![], Type::Integer, vec![], body);
    let analyzed = analyze(&f, &platforms).unwrap();
    let compiled = compile_sync(&analyzed, &platforms).unwrap();
    let result = invoke_sync(&compiled, vec![]).unwrap();
    assert!(matches!(result, Value::Integer(-1)));
}

#[test]
fn test_async_platform_fault_is_catchable() {
    let platforms = Platforms::new(vec![PlatformFunction::asynchronous(
        "explode",
        vec![],
        Type::Integer,
        |_| Box::pin(async { Err(EastError::new("host refused")) }),
    )])
    .unwrap();
    let body = Expr::try_(
        Expr::platform("explode", vec![]),
        "message",
        "trace",
        Expr::integer(-1),
    );
    let f = Expr::async_function(vec![], Type::Integer, vec![], body);
    let analyzed = analyze(&f, &platforms).unwrap();
    let compiled = compile_async(&analyzed, &platforms).unwrap();
    let result = runtime().block_on(invoke_async(&compiled, vec![])).unwrap();
    assert!(matches!(result, Value::Integer(-1)));
}

#[test]
fn test_async_function_round_trip() {
    let log: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
    let platforms = Platforms::new(vec![fetch_platform(log)]).unwrap();

    let f = Expr::async_function(
        vec![("x".to_string(), Type::Integer)],
        Type::Integer,
        vec![],
        int_add(
            Expr::platform("fetch", vec![Expr::reference("x")]),
            Expr::integer(1),
        ),
    );
    let analyzed = analyze(&f, &platforms).unwrap();
    let compiled = compile_async(&analyzed, &platforms).unwrap();

    let fn_ty = Type::async_function(
        vec![Type::Integer],
        Type::Integer,
        ["fetch".to_string()].into_iter().collect(),
    );
    let bytes = east_codec::encode_beast2(&fn_ty, &compiled).unwrap();
    let reloaded = decode_beast2_linked(&fn_ty, &platforms, &bytes).unwrap();
    let result = runtime()
        .block_on(invoke_async(&reloaded, vec![Value::Integer(4)]))
        .unwrap();
    assert!(matches!(result, Value::Integer(41)));
}

#[test]
fn test_async_for_loop_awaits_in_order() {
    let log: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
    let platforms = Platforms::new(vec![fetch_platform(log.clone())]).unwrap();

    // total = 0; for item in [1,2,3] { total = total + fetch(item) }
    let body = Expr::block(
        vec![
            Expr::let_("total", Expr::integer(0)),
            Expr::for_(
                None,
                Expr::new_array(
                    Type::Integer,
                    vec![Expr::integer(1), Expr::integer(2), Expr::integer(3)],
                ),
                "item",
                None,
                Expr::assign(
                    "total",
                    int_add(
                        Expr::reference("total"),
                        Expr::platform("fetch", vec![Expr::reference("item")]),
                    ),
                ),
            ),
        ],
        Expr::reference("total"),
    );
    let f = Expr::async_function(vec![], Type::Integer, vec![], body);
    let analyzed = analyze(&f, &platforms).unwrap();
    let compiled = compile_async(&analyzed, &platforms).unwrap();
    let result = runtime().block_on(invoke_async(&compiled, vec![])).unwrap();
    assert!(matches!(result, Value::Integer(60)));
    assert_eq!(*log.borrow(), vec![1, 2, 3]);
}
