// Tests for userdata lifetime: finalizers, collection and close
use crate::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Tracked {
    name: String,
}

/// State with a `Tracked` type whose `__gc` appends the object's name to
/// the returned log
fn tracked_state(option: SafeOption) -> (LuaState, Rc<RefCell<Vec<String>>>) {
    let mut state = LuaState::new(option);
    state.open_libs().unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let gc_log = log.clone();
    state
        .new_type("Tracked")
        .method("new", |l: &mut LuaState| {
            let name = l.check_string(1)?;
            l.push_userdata(Tracked { name }, "Tracked")?;
            Ok(1)
        })
        .metamethod("__gc", move |l: &mut LuaState| {
            let handle = l.check_userdata::<Tracked>(1, "Tracked")?;
            if let Some(t) = l.userdata::<Tracked>(handle) {
                gc_log.borrow_mut().push(t.name.clone());
            }
            Ok(0)
        })
        .publish("Tracked");
    (state, log)
}

#[test]
fn test_finalizer_runs_once() {
    let (mut state, log) = tracked_state(SafeOption::default());
    state.do_string("do local t = Tracked.new('temp') end").unwrap();
    assert_eq!(state.live_userdata(), 1);

    state.collect_garbage();
    assert_eq!(*log.borrow(), vec!["temp".to_string()]);
    // Finalized but kept until the next cycle
    assert_eq!(state.live_userdata(), 1);

    state.collect_garbage();
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(state.live_userdata(), 0);

    let stats = state.gc_stats();
    assert_eq!(stats.cycles, 2);
    assert_eq!(stats.finalized, 1);
    assert_eq!(stats.freed, 1);
}

#[test]
fn test_reachable_objects_survive() {
    let (mut state, log) = tracked_state(SafeOption::default());
    state
        .do_string("keep = Tracked.new('global') holder = { Tracked.new('in_table') }")
        .unwrap();
    state.collect_garbage();
    state.collect_garbage();
    assert!(log.borrow().is_empty());
    assert_eq!(state.live_userdata(), 2);

    state.do_string("keep = nil").unwrap();
    state.collect_garbage();
    assert_eq!(*log.borrow(), vec!["global".to_string()]);

    state.do_string("holder[1] = nil").unwrap();
    state.collect_garbage();
    state.collect_garbage();
    assert_eq!(log.borrow().len(), 2);
    assert_eq!(state.live_userdata(), 0);
}

#[test]
fn test_stack_values_are_roots() {
    let (mut state, log) = tracked_state(SafeOption::default());
    let handle = state
        .push_userdata(
            Tracked {
                name: "on_stack".to_string(),
            },
            "Tracked",
        )
        .unwrap();
    state.collect_garbage();
    assert!(log.borrow().is_empty());
    assert!(state.userdata::<Tracked>(handle).is_some());

    state.pop(1);
    state.collect_garbage();
    assert_eq!(*log.borrow(), vec!["on_stack".to_string()]);
}

#[test]
fn test_reachable_through_metatable_and_upvalue() {
    let (mut state, log) = tracked_state(SafeOption::default());
    let result = state.do_string(
        r#"
        local mt = { owner = Tracked.new('meta') }
        proxy = setmetatable({}, mt)
        local captured = Tracked.new('upvalue')
        getter = function() return captured end
        "#,
    );
    assert!(result.is_ok(), "setup failed: {:?}", result.err());
    state.collect_garbage();
    assert!(log.borrow().is_empty());

    state.do_string("proxy = nil getter = nil").unwrap();
    state.collect_garbage();
    let mut names = log.borrow().clone();
    names.sort();
    assert_eq!(names, vec!["meta".to_string(), "upvalue".to_string()]);
}

#[test]
fn test_close_finalizes_in_reverse_order() {
    let (mut state, log) = tracked_state(SafeOption::default());
    state
        .do_string("a = Tracked.new('a') b = Tracked.new('b') c = Tracked.new('c')")
        .unwrap();
    state.close();
    assert!(state.is_closed());
    assert_eq!(*log.borrow(), vec!["c".to_string(), "b".to_string(), "a".to_string()]);
    assert_eq!(state.live_userdata(), 0);

    // Idempotent
    state.close();
    assert_eq!(log.borrow().len(), 3);
}

#[test]
fn test_close_skips_already_finalized() {
    let (mut state, log) = tracked_state(SafeOption::default());
    state.do_string("do local t = Tracked.new('early') end keep = Tracked.new('late')").unwrap();
    state.collect_garbage();
    assert_eq!(*log.borrow(), vec!["early".to_string()]);
    state.close();
    assert_eq!(*log.borrow(), vec!["early".to_string(), "late".to_string()]);
}

#[test]
fn test_drop_runs_close() {
    let (mut state, log) = tracked_state(SafeOption::default());
    state.do_string("x = Tracked.new('x')").unwrap();
    drop(state);
    assert_eq!(*log.borrow(), vec!["x".to_string()]);
}

#[test]
fn test_finalizer_error_is_swallowed() {
    let mut state = LuaState::new(SafeOption::default());
    state.open_libs().unwrap();
    let ran = Rc::new(Cell::new(0));
    let counter = ran.clone();
    state.register_type("Faulty");
    state
        .bind_metamethod("Faulty", "__gc", move |l: &mut LuaState| {
            counter.set(counter.get() + 1);
            Err(l.error("finalizer exploded"))
        })
        .unwrap();
    state.push_userdata(1u32, "Faulty").unwrap();
    state.push_userdata(2u32, "Faulty").unwrap();
    state.set_top(0).unwrap();

    state.collect_garbage();
    assert_eq!(ran.get(), 2);
    assert_eq!(state.top(), 0);
    assert_eq!(state.error_message(), "");

    // The state is still usable
    state.do_string("ok = 1 + 1").unwrap();
    assert_eq!(state.global_value("ok"), LuaValue::Integer(2));
}

#[test]
fn test_script_finalizer() {
    let (mut state, _log) = tracked_state(SafeOption::default());
    let result = state.do_string(
        r#"
        finalized = 0
        local mt = getmetatable(Tracked.new('probe'))
        mt.__gc = function(obj) finalized = finalized + 1 end
        do local t = Tracked.new('scripted') end
        "#,
    );
    assert!(result.is_ok(), "setup failed: {:?}", result.err());
    state.collect_garbage();
    assert_eq!(state.global_value("finalized"), LuaValue::Integer(2));
}

#[test]
fn test_stale_handle_after_release() {
    let mut state = LuaState::new(SafeOption::default());
    state.register_type("Plain");
    let handle = state.push_userdata(String::from("payload"), "Plain").unwrap();
    assert_eq!(state.userdata::<String>(handle).map(String::as_str), Some("payload"));

    state.pop(1);
    // No __gc: released in the first cycle
    state.collect_garbage();
    assert!(state.userdata::<String>(handle).is_none());
    assert!(state.userdata_type_name(handle).is_none());

    // A new object may reuse the slot, the old handle stays stale
    let fresh = state.push_userdata(String::from("other"), "Plain").unwrap();
    assert!(state.userdata::<String>(handle).is_none());
    assert_eq!(state.userdata::<String>(fresh).map(String::as_str), Some("other"));
}

#[test]
fn test_automatic_collection() {
    let option = SafeOption {
        gc_step_threshold: 10,
        ..SafeOption::default()
    };
    let (mut state, log) = tracked_state(option);
    let result = state.do_string(
        r#"
        for i = 1, 100 do
            local t = Tracked.new('loop')
        end
        "#,
    );
    assert!(result.is_ok(), "loop failed: {:?}", result.err());
    assert!(state.live_userdata() < 100, "live: {}", state.live_userdata());
    assert!(state.gc_stats().cycles >= 1);
    assert!(!log.borrow().is_empty());
}

#[test]
fn test_collectgarbage_from_script() {
    let (mut state, log) = tracked_state(SafeOption::default());
    let result = state.do_string(
        r#"
        do local t = Tracked.new('scoped') end
        before = collectgarbage('count')
        collectgarbage()
        collectgarbage('collect')
        after = collectgarbage('count')
        "#,
    );
    assert!(result.is_ok(), "script failed: {:?}", result.err());
    assert_eq!(state.global_value("before"), LuaValue::Integer(1));
    assert_eq!(state.global_value("after"), LuaValue::Integer(0));
    assert_eq!(log.borrow().len(), 1);

    let err = state.do_string("collectgarbage('bogus')").unwrap_err();
    assert!(err.message().contains("invalid option 'bogus'"), "got: {}", err);
}

struct DropFlag(Rc<Cell<bool>>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

/// Global host function `name` owning a flag that is set once it is dropped
fn flagged_function(state: &mut LuaState, name: &str) -> Rc<Cell<bool>> {
    let dropped = Rc::new(Cell::new(false));
    let flag = DropFlag(dropped.clone());
    state
        .push_function(name, move |l: &mut LuaState| {
            let _owned = &flag;
            l.push_boolean(true)?;
            Ok(1)
        })
        .unwrap();
    state.set_global(name).unwrap();
    dropped
}

#[test]
fn test_close_frees_reference_cycles() {
    let mut state = LuaState::new(SafeOption::default());
    state.open_libs().unwrap();
    let in_table = flagged_function(&mut state, "hold_table");
    let in_closure = flagged_function(&mut state, "hold_fn");

    let result = state.do_string(
        r#"
        do
            local t = {}
            t.self = t
            t.f = hold_table
        end
        hold_table = nil

        do
            local h = hold_fn
            local function rec(n)
                if n == 0 then return h end
                return rec(n - 1)
            end
            rec(3)
        end
        hold_fn = nil
        "#,
    );
    assert!(result.is_ok(), "script failed: {:?}", result.err());

    // Only the cycles keep them alive now
    state.collect_garbage();
    assert!(!in_table.get());
    assert!(!in_closure.get());

    state.close();
    assert!(in_table.get());
    assert!(in_closure.get());
}

#[test]
fn test_drop_frees_global_cycles() {
    let mut state = LuaState::new(SafeOption::default());
    let dropped = flagged_function(&mut state, "hold");
    state.do_string("registry_like = { f = hold } registry_like.me = registry_like").unwrap();
    drop(state);
    assert!(dropped.get());
}

#[test]
fn test_closed_state_refuses_work() {
    let (mut state, log) = tracked_state(SafeOption::default());
    state.close();
    assert!(state.is_closed());

    let result = state.push_userdata(Tracked { name: "late".to_string() }, "Tracked");
    assert_eq!(result, Err(LuaError::RuntimeError));
    assert!(state.error_message().contains("closed state"));
    assert_eq!(state.live_userdata(), 0);

    let err = state.do_string("x = 1").unwrap_err();
    assert!(err.message().contains("closed state"), "got: {}", err);
    assert!(log.borrow().is_empty());
}
