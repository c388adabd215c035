// Tests for host types exposed as userdata
use crate::*;

#[derive(Debug)]
struct Account {
    owner: String,
    balance: i64,
}

const ACCOUNT: &str = "Account";

fn with_account<R>(l: &mut LuaState, f: impl FnOnce(&mut Account) -> R) -> LuaResult<R> {
    let handle = l.check_userdata::<Account>(1, ACCOUNT)?;
    match l.userdata_mut::<Account>(handle) {
        Some(account) => Ok(f(account)),
        None => Err(l.error("account was released")),
    }
}

fn account_new(l: &mut LuaState) -> LuaResult<usize> {
    let owner = l.check_string(1)?;
    let balance = l.opt_integer(2, 0)?;
    l.push_userdata(Account { owner, balance }, ACCOUNT)?;
    Ok(1)
}

fn account_deposit(l: &mut LuaState) -> LuaResult<usize> {
    let amount = l.check_integer(2)?;
    let balance = with_account(l, |a| {
        a.balance += amount;
        a.balance
    })?;
    l.push_integer(balance)?;
    Ok(1)
}

fn account_withdraw(l: &mut LuaState) -> LuaResult<usize> {
    let amount = l.check_integer(2)?;
    let result = with_account(l, |a| {
        if amount > a.balance {
            None
        } else {
            a.balance -= amount;
            Some(a.balance)
        }
    })?;
    match result {
        Some(balance) => {
            l.push_integer(balance)?;
            Ok(1)
        }
        None => Err(l.error("insufficient funds")),
    }
}

fn account_balance(l: &mut LuaState) -> LuaResult<usize> {
    let balance = with_account(l, |a| a.balance)?;
    l.push_integer(balance)?;
    Ok(1)
}

fn account_tostring(l: &mut LuaState) -> LuaResult<usize> {
    let text = with_account(l, |a| format!("Account({}, {})", a.owner, a.balance))?;
    l.push_string(text)?;
    Ok(1)
}

fn account_eq(l: &mut LuaState) -> LuaResult<usize> {
    let a = l.check_userdata::<Account>(1, ACCOUNT)?;
    let b = l.check_userdata::<Account>(2, ACCOUNT)?;
    let same_owner = match (l.userdata::<Account>(a), l.userdata::<Account>(b)) {
        (Some(x), Some(y)) => x.owner == y.owner,
        _ => false,
    };
    l.push_boolean(same_owner)?;
    Ok(1)
}

fn new_state() -> LuaState {
    let mut state = LuaState::new(SafeOption::default());
    state.open_libs().unwrap();
    state
        .new_type(ACCOUNT)
        .method("new", account_new)
        .method("deposit", account_deposit)
        .method("withdraw", account_withdraw)
        .method("balance", account_balance)
        .metamethod("__tostring", account_tostring)
        .metamethod("__eq", account_eq)
        .publish(ACCOUNT);
    state
}

#[test]
fn test_account_methods() {
    let mut state = new_state();
    let result = state.do_string(
        r#"
        local a = Account.new("alice", 100)
        a:deposit(50)
        a:withdraw(30)
        balance = a:balance()
        kind = type(a)
        text = tostring(a)
        "#,
    );
    assert!(result.is_ok(), "account script failed: {:?}", result.err());
    assert_eq!(state.global_value("balance"), LuaValue::Integer(120));
    assert_eq!(state.global_value("kind").as_str(), Some("userdata"));
    assert_eq!(state.global_value("text").as_str(), Some("Account(alice, 120)"));
}

#[test]
fn test_method_error_propagates() {
    let mut state = new_state();
    let err = state
        .do_string("local a = Account.new('bob', 10)\na:withdraw(1000)")
        .unwrap_err();
    assert_eq!(err.message(), "[string]:2: insufficient funds");
}

#[test]
fn test_wrong_self_argument() {
    let mut state = new_state();
    let err = state.do_string("Account.balance(42)").unwrap_err();
    assert_eq!(
        err.message(),
        "[string]:1: bad argument #1 to 'balance' (Account expected, got number)"
    );

    // Userdata of another type is rejected as well
    state.register_type("Other");
    state.register("make_other", |l: &mut LuaState| {
        l.push_userdata(5u8, "Other")?;
        Ok(1)
    })
    .unwrap();
    let err = state.do_string("Account.balance(make_other())").unwrap_err();
    assert!(err.message().ends_with("(Account expected, got Other)"), "got: {}", err);
}

#[test]
fn test_unknown_method() {
    let mut state = new_state();
    let err = state.do_string("local a = Account.new('c')\na:fly()").unwrap_err();
    assert_eq!(err.message(), "[string]:2: attempt to call a nil value (method 'fly')");
}

#[test]
fn test_eq_metamethod() {
    let mut state = new_state();
    let result = state.do_string(
        r#"
        local a = Account.new("x", 1)
        local b = Account.new("x", 5)
        local c = Account.new("y", 1)
        same = a == b
        different = a == c
        itself = a == a
        not_number = a == 1
        "#,
    );
    assert!(result.is_ok(), "eq script failed: {:?}", result.err());
    assert_eq!(state.global_value("same"), LuaValue::Boolean(true));
    assert_eq!(state.global_value("different"), LuaValue::Boolean(false));
    assert_eq!(state.global_value("itself"), LuaValue::Boolean(true));
    assert_eq!(state.global_value("not_number"), LuaValue::Boolean(false));
}

#[test]
fn test_host_reads_script_created_userdata() {
    let mut state = new_state();
    state.do_string("acct = Account.new('dana', 7) acct:deposit(3)").unwrap();

    state.get_global("acct").unwrap();
    let handle = state.to_userdata(-1).expect("acct is userdata");
    assert_eq!(state.userdata_type_name(handle), Some(ACCOUNT));
    let account = state.userdata::<Account>(handle).expect("live account");
    assert_eq!(account.owner, "dana");
    assert_eq!(account.balance, 10);

    // Wrong Rust type
    assert!(state.userdata::<String>(handle).is_none());
}

#[test]
fn test_host_pushed_userdata_visible_to_script() {
    let mut state = new_state();
    let handle = state
        .push_userdata(
            Account {
                owner: "erin".to_string(),
                balance: 1,
            },
            ACCOUNT,
        )
        .unwrap();
    state.set_global("preset").unwrap();

    state.do_string("preset:deposit(41)").unwrap();
    assert_eq!(state.userdata::<Account>(handle).map(|a| a.balance), Some(42));

    state.userdata_mut::<Account>(handle).unwrap().balance = 0;
    state.do_string("zero = preset:balance()").unwrap();
    assert_eq!(state.global_value("zero"), LuaValue::Integer(0));
}

#[test]
fn test_register_type_is_idempotent() {
    let mut state = new_state();
    assert!(state.register_type("Gadget"));
    state.bind_method("Gadget", "ping", |l: &mut LuaState| {
        l.push_string("pong")?;
        Ok(1)
    })
    .unwrap();

    let first = state.registry().get_str("Gadget");
    assert!(!state.register_type("Gadget"));
    let second = state.registry().get_str("Gadget");
    assert_eq!(first, second);

    // Existing bindings survive re-registration
    state.publish("Gadget", "Gadget").unwrap();
    state.do_string("reply = Gadget.ping()").unwrap();
    assert_eq!(state.global_value("reply").as_str(), Some("pong"));
}

#[test]
fn test_binding_unregistered_type_fails() {
    let mut state = new_state();
    let result = state.bind_method("Nope", "f", |_l: &mut LuaState| Ok(0));
    assert_eq!(result, Err(LuaError::RuntimeError));
    assert!(state.error_message().contains("type 'Nope' is not registered"));
    assert!(state.publish("Nope", "Nope").is_err());
}

#[test]
fn test_metatable_by_name() {
    let mut state = new_state();
    assert!(state.get_metatable_named(ACCOUNT).unwrap());
    assert_eq!(state.get_field(-1, "__name").unwrap(), LuaValueKind::String);
    assert_eq!(state.to_string(-1).as_deref(), Some(ACCOUNT));
    state.set_top(0).unwrap();

    assert!(!state.get_metatable_named("Missing").unwrap());
    assert!(state.is_nil(-1));
    state.set_top(0).unwrap();

    // A plain table can borrow a type's metatable
    state.new_table().unwrap();
    assert!(state.set_metatable_named(1, ACCOUNT).unwrap());
    assert!(!state.set_metatable_named(1, "Missing").unwrap());
    state.set_global("fake").unwrap();
    state.do_string("has_new = fake.new ~= nil").unwrap();
    assert_eq!(state.global_value("has_new"), LuaValue::Boolean(true));
}

#[test]
fn test_name_in_default_tostring() {
    let mut state = new_state();
    state.register_type("Plain");
    state.register("make_plain", |l: &mut LuaState| {
        l.push_userdata((), "Plain")?;
        Ok(1)
    })
    .unwrap();
    state.do_string("text = tostring(make_plain())").unwrap();
    let text = state.global_value("text");
    assert!(text.as_str().is_some_and(|s| s.starts_with("Plain: 0x")), "got: {:?}", text);
}

#[test]
fn test_builder_chain_publishes_methods() {
    let mut state = LuaState::new(SafeOption::default());
    let builder = state
        .new_type("Counter")
        .method("new", |l: &mut LuaState| {
            l.push_userdata(0i64, "Counter")?;
            Ok(1)
        })
        .method("incr", |l: &mut LuaState| {
            let h = l.check_userdata::<i64>(1, "Counter")?;
            let value = match l.userdata_mut::<i64>(h) {
                Some(v) => {
                    *v += 1;
                    *v
                }
                None => 0,
            };
            l.push_integer(value)?;
            Ok(1)
        })
        .publish("Counter");
    assert!(!builder.metatable().get_str("incr").is_nil());

    state.do_string("local c = Counter.new() c:incr() n = c:incr()").unwrap();
    assert_eq!(state.global_value("n"), LuaValue::Integer(2));
}
