// Tests for the call gateway: host -> script and script -> host calls
use crate::*;
use std::cell::Cell;
use std::rc::Rc;

fn new_state() -> LuaState {
    let mut state = LuaState::new(SafeOption::default());
    state.open_libs().unwrap();
    state
}

fn host_add(l: &mut LuaState) -> LuaResult<usize> {
    let a = l.check_integer(1)?;
    let b = l.check_integer(2)?;
    l.push_integer(a + b)?;
    Ok(1)
}

#[test]
fn test_call_script_function_from_host() {
    let mut state = new_state();
    let result = state.do_string("function square(x) return x * x end");
    assert!(result.is_ok(), "define failed: {:?}", result.err());

    state.get_global("square").unwrap();
    state.push_integer(5).unwrap();
    state.call(1, 1).unwrap();

    assert_eq!(state.top(), 1);
    assert_eq!(state.to_integer(-1), Some(25));
}

#[test]
fn test_result_count_adjustment() {
    let mut state = new_state();
    state
        .do_string("function one() return 1 end function three() return 1, 2, 3 end")
        .unwrap();

    // Padded with nil
    state.get_global("one").unwrap();
    state.call(0, 3).unwrap();
    assert_eq!(state.top(), 3);
    assert_eq!(state.to_integer(1), Some(1));
    assert!(state.is_nil(2) && state.is_nil(3));
    state.set_top(0).unwrap();

    // Truncated
    state.get_global("three").unwrap();
    state.call(0, 1).unwrap();
    assert_eq!(state.top(), 1);
    assert_eq!(state.to_integer(1), Some(1));
    state.set_top(0).unwrap();

    // Everything
    state.get_global("three").unwrap();
    state.call(0, MULTRET).unwrap();
    assert_eq!(state.top(), 3);
    assert_eq!(state.to_integer(3), Some(3));
}

#[test]
fn test_call_keeps_values_below_callable() {
    let mut state = new_state();
    state.do_string("function id(...) return ... end").unwrap();

    state.push_string("below").unwrap();
    state.get_global("id").unwrap();
    state.push_integer(1).unwrap();
    state.push_integer(2).unwrap();
    state.call(2, MULTRET).unwrap();

    assert_eq!(state.top(), 3);
    assert_eq!(state.to_string(1).as_deref(), Some("below"));
    assert_eq!(state.to_integer(2), Some(1));
    assert_eq!(state.to_integer(3), Some(2));
}

#[test]
fn test_script_calls_host_function() {
    let mut state = new_state();
    state.register("add", host_add).unwrap();

    let result = state.do_string("result = add(2, 3) + add(10, -4)");
    assert!(result.is_ok(), "call failed: {:?}", result.err());
    assert_eq!(state.global_value("result"), LuaValue::Integer(11));
}

#[test]
fn test_host_function_sees_only_its_arguments() {
    let mut state = new_state();
    state.register("count", |l: &mut LuaState| {
        let n = l.arg_count() as i64;
        assert_eq!(l.top() as i64, n);
        l.push_integer(n)?;
        Ok(1)
    })
    .unwrap();

    state.push_string("host slot").unwrap();
    let result = state.do_string("a = count() b = count(1, nil, 3)");
    assert!(result.is_ok(), "count failed: {:?}", result.err());
    assert_eq!(state.global_value("a"), LuaValue::Integer(0));
    assert_eq!(state.global_value("b"), LuaValue::Integer(3));
    assert_eq!(state.top(), 1);
}

#[test]
fn test_host_function_multiple_results() {
    let mut state = new_state();
    state.register("divmod", |l: &mut LuaState| {
        let a = l.check_integer(1)?;
        let b = l.check_integer(2)?;
        l.push_integer(a / b)?;
        l.push_integer(a % b)?;
        Ok(2)
    })
    .unwrap();

    let result = state.do_string(
        r#"
        q, r = divmod(17, 5)
        local t = {divmod(9, 2)}
        n = #t
        "#,
    );
    assert!(result.is_ok(), "divmod failed: {:?}", result.err());
    assert_eq!(state.global_value("q"), LuaValue::Integer(3));
    assert_eq!(state.global_value("r"), LuaValue::Integer(2));
    assert_eq!(state.global_value("n"), LuaValue::Integer(2));
}

#[test]
fn test_host_function_returning_too_many() {
    let mut state = new_state();
    state.register("liar", |l: &mut LuaState| {
        l.push_integer(1)?;
        Ok(3)
    })
    .unwrap();

    let err = state.do_string("liar()").unwrap_err();
    assert!(err.message().contains("returned 3 results"), "got: {}", err);
}

#[test]
fn test_host_closure_with_upvalues() {
    let mut state = new_state();
    state.push_string("Hello, ").unwrap();
    state.push_integer(3).unwrap();
    state
        .push_closure(
            "greet",
            |l: &mut LuaState| {
                let prefix = l.upvalue(1).and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
                let times = l.upvalue(2).and_then(|v| v.as_integer()).unwrap_or(0);
                let name = l.check_string(1)?;
                l.push_string(format!("{}{} x{}", prefix, name, times))?;
                Ok(1)
            },
            2,
        )
        .unwrap();
    // The captured values were consumed
    assert_eq!(state.top(), 1);
    state.set_global("greet").unwrap();

    state.do_string("msg = greet('lua')").unwrap();
    assert_eq!(state.global_value("msg").as_str(), Some("Hello, lua x3"));
    assert!(state.upvalue(1).is_none());
}

#[test]
fn test_rust_closure_captures_host_state() {
    let mut state = new_state();
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    state
        .register("tick", move |l: &mut LuaState| {
            counter.set(counter.get() + 1);
            l.push_integer(counter.get())?;
            Ok(1)
        })
        .unwrap();

    state.do_string("for i = 1, 5 do last = tick() end").unwrap();
    assert_eq!(calls.get(), 5);
    assert_eq!(state.global_value("last"), LuaValue::Integer(5));
}

#[test]
fn test_host_calls_back_into_script() {
    let mut state = new_state();
    state.register("apply", |l: &mut LuaState| {
        // apply(f, x) -> f(x) + 1
        l.push_copy(1)?;
        l.push_copy(2)?;
        l.call(1, 1)?;
        let r = l.to_integer(-1).unwrap_or(0);
        l.push_integer(r + 1)?;
        Ok(1)
    })
    .unwrap();

    let result = state.do_string("v = apply(function(x) return x * 10 end, 4)");
    assert!(result.is_ok(), "apply failed: {:?}", result.err());
    assert_eq!(state.global_value("v"), LuaValue::Integer(41));
}

#[test]
fn test_call_with_too_few_values() {
    let mut state = new_state();
    state.push_integer(1).unwrap();
    assert!(state.call(3, 0).is_err());
    assert_eq!(state.top(), 1);
}

#[test]
fn test_call_via_call_metamethod() {
    let mut state = new_state();
    let result = state.do_string(
        r#"
        callable = setmetatable({}, {__call = function(self, a, b) return a + b end})
        "#,
    );
    assert!(result.is_ok());

    state.get_global("callable").unwrap();
    state.push_integer(20).unwrap();
    state.push_integer(22).unwrap();
    state.call(2, 1).unwrap();
    assert_eq!(state.to_integer(-1), Some(42));
}

#[test]
fn test_load_pushes_chunk() {
    let mut state = new_state();
    state.load("return 1 + 1, 'two'", "chunk").unwrap();
    assert!(state.is_function(-1));
    state.call(0, MULTRET).unwrap();
    assert_eq!(state.top(), 2);
    assert_eq!(state.to_integer(1), Some(2));
    assert_eq!(state.to_string(2).as_deref(), Some("two"));
}

#[test]
fn test_varargs_reach_chunk() {
    let mut state = new_state();
    state.load("local a, b = ... return b, a", "swap").unwrap();
    state.push_string("x").unwrap();
    state.push_string("y").unwrap();
    state.call(2, 2).unwrap();
    assert_eq!(state.to_string(1).as_deref(), Some("y"));
    assert_eq!(state.to_string(2).as_deref(), Some("x"));
}

#[test]
fn test_invalid_result_count_is_rejected() {
    let mut state = new_state();
    state.do_string("function f() return 1 end").unwrap();

    state.get_global("f").unwrap();
    let err = state.protected_call(0, -2).unwrap_err();
    assert_eq!(err.kind(), LuaError::RuntimeError);
    assert!(err.message().contains("invalid result count -2"), "got: {}", err);
    // Nothing was called, the callable is still there
    assert_eq!(state.top(), 1);

    let result = state.call(0, -7);
    assert_eq!(result, Err(LuaError::RuntimeError));
    assert_eq!(state.top(), 1);
}

#[test]
fn test_result_padding_respects_stack_limit() {
    let mut state = LuaState::new(SafeOption {
        max_stack_size: 100,
        ..SafeOption::default()
    });
    state.do_string("function f() return 1 end").unwrap();

    state.get_global("f").unwrap();
    let err = state.protected_call(0, 1000).unwrap_err();
    assert_eq!(err.kind(), LuaError::StackOverflow);
    assert_eq!(state.top(), 0);

    state.get_global("f").unwrap();
    state.protected_call(0, 50).unwrap();
    assert_eq!(state.top(), 50);
    assert_eq!(state.to_integer(1), Some(1));
    assert!(state.is_nil(50));
}
