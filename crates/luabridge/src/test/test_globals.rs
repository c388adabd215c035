// Tests for the global table as seen from the host
use crate::lib_registry::{LibraryModule, LibraryRegistry};
use crate::*;

fn new_state() -> LuaState {
    let mut state = LuaState::new(SafeOption::default());
    state.open_libs().unwrap();
    state
}

#[test]
fn test_set_and_get_global() {
    let mut state = new_state();
    state.push_integer(10).unwrap();
    state.set_global("GLOBAL_VAR").unwrap();
    assert_eq!(state.top(), 0);

    assert_eq!(state.get_global("GLOBAL_VAR").unwrap(), LuaValueKind::Integer);
    assert_eq!(state.to_integer(-1), Some(10));
    state.pop(1);

    state.do_string("GLOBAL_VAR = GLOBAL_VAR * 2").unwrap();
    assert_eq!(state.global_value("GLOBAL_VAR"), LuaValue::Integer(20));
}

#[test]
fn test_absent_global_is_nil() {
    let mut state = new_state();
    assert_eq!(state.get_global("ASDF_VAR").unwrap(), LuaValueKind::Nil);
    assert!(state.is_nil(-1));
    assert_eq!(state.top(), 1);
    assert!(state.global_value("ASDF_VAR").is_nil());
}

#[test]
fn test_set_global_needs_a_value() {
    let mut state = new_state();
    assert_eq!(state.set_global("nothing"), Err(LuaError::RuntimeError));
    assert!(state.error_message().contains("no value to assign"));
}

#[test]
fn test_script_globals_visible_to_host() {
    let mut state = new_state();
    state
        .do_string("name = 'lua' count = 3 ratio = 0.5 flag = false list = {1, 2}")
        .unwrap();
    assert_eq!(state.global_value("name").as_str(), Some("lua"));
    assert_eq!(state.global_value("count"), LuaValue::Integer(3));
    assert_eq!(state.global_value("ratio"), LuaValue::Float(0.5));
    assert_eq!(state.global_value("flag"), LuaValue::Boolean(false));

    assert_eq!(state.get_global("list").unwrap(), LuaValueKind::Table);
    assert_eq!(state.raw_len(-1), 2);
}

#[test]
fn test_nil_removes_global() {
    let mut state = new_state();
    state.do_string("temp = 1").unwrap();
    state.push_nil().unwrap();
    state.set_global("temp").unwrap();
    state.do_string("gone = temp == nil").unwrap();
    assert_eq!(state.global_value("gone"), LuaValue::Boolean(true));
}

#[test]
fn test_g_table() {
    let mut state = new_state();
    let result = state.do_string(
        r#"
        _G.via_g = 5
        direct = via_g
        same = _G._G == _G
        _G["dyn" .. "amic"] = true
        "#,
    );
    assert!(result.is_ok(), "_G script failed: {:?}", result.err());
    assert_eq!(state.global_value("direct"), LuaValue::Integer(5));
    assert_eq!(state.global_value("same"), LuaValue::Boolean(true));
    assert_eq!(state.global_value("dynamic"), LuaValue::Boolean(true));
    assert_eq!(state.globals().get_str("via_g"), LuaValue::Integer(5));
}

#[test]
fn test_register_replaces_global() {
    let mut state = new_state();
    state
        .register("answer", |l: &mut LuaState| {
            l.push_integer(1)?;
            Ok(1)
        })
        .unwrap();
    state
        .register("answer", |l: &mut LuaState| {
            l.push_integer(42)?;
            Ok(1)
        })
        .unwrap();
    state.do_string("value = answer()").unwrap();
    assert_eq!(state.global_value("value"), LuaValue::Integer(42));
    assert!(state.global_value("answer").is_function());
}

#[test]
fn test_custom_library_module() {
    fn greet(l: &mut LuaState) -> LuaResult<usize> {
        let who = l.check_string(1)?;
        l.push_string(format!("hi {}", who))?;
        Ok(1)
    }

    let mut state = LuaState::new(SafeOption::default());
    let mut registry = LibraryRegistry::new();
    registry.register(
        LibraryModule::new("greeter")
            .with_function("greet", greet)
            .with_value("version", |_| LuaValue::integer(2)),
    );
    registry.load_all(&mut state).unwrap();
    assert!(registry.get_module("greeter").is_some());
    assert!(registry.get_module("missing").is_none());

    state.do_string("msg = greeter.greet('bob') v = greeter.version").unwrap();
    assert_eq!(state.global_value("msg").as_str(), Some("hi bob"));
    assert_eq!(state.global_value("v"), LuaValue::Integer(2));
}

#[test]
fn test_open_single_lib() {
    let mut state = LuaState::new(SafeOption::default());
    state.open_lib(Stdlib::Math).unwrap();
    assert!(state.global_value("math").is_table());
    assert!(state.global_value("print").is_nil());

    state.open_lib(Stdlib::Basic).unwrap();
    assert!(state.global_value("print").is_function());
    assert_eq!(state.global_value("_VERSION").as_str(), Some("Lua 5.4"));
}
