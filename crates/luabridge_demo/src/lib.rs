// Demo drivers: each one exercises a piece of the bridge against the
// functions defined in the sample script.

use luabridge::serde::LuaJson;
use luabridge::{LuaError, LuaFullError, LuaResult, LuaState, LuaValue};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::{error, info};

pub type DemoResult<T> = Result<T, LuaFullError>;

pub const ACCOUNT: &str = "Account";
pub const PERSON: &str = "Person";

/// Turn an error left pending in the state into an owned one
fn pending(l: &mut LuaState) -> impl FnOnce(LuaError) -> LuaFullError + '_ {
    move |e| l.into_full_error(e)
}

// ===== Host types =====

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub balance: i64,
}

fn account_create(l: &mut LuaState) -> LuaResult<usize> {
    info!("createAccount");
    let balance = l.opt_integer(1, 0)?;
    l.push_userdata(Account { balance }, ACCOUNT)?;
    Ok(1)
}

fn account_balance(l: &mut LuaState) -> LuaResult<usize> {
    let handle = l.check_userdata::<Account>(1, ACCOUNT)?;
    let balance = l.userdata::<Account>(handle).map_or(0, |a| a.balance);
    l.push_integer(balance)?;
    Ok(1)
}

fn account_withdraw(l: &mut LuaState) -> LuaResult<usize> {
    info!("accountWithdraw");
    let handle = l.check_userdata::<Account>(1, ACCOUNT)?;
    let amount = if l.is_number(2) { l.to_integer(2) } else { None };
    let Some(amount) = amount else {
        let shown = l.to_display(2)?;
        return Err(l.error(format!("invalid amount: {}", shown)));
    };
    if let Some(account) = l.userdata_mut::<Account>(handle) {
        account.balance -= amount;
    }
    Ok(0)
}

fn account_tostring(l: &mut LuaState) -> LuaResult<usize> {
    info!("accountToString");
    let handle = l.check_userdata::<Account>(1, ACCOUNT)?;
    let balance = l.userdata::<Account>(handle).map_or(0, |a| a.balance);
    l.push_string(format!("account(balance={})", balance))?;
    Ok(1)
}

fn account_eq(l: &mut LuaState) -> LuaResult<usize> {
    info!("accountEq");
    let a = l.check_userdata::<Account>(1, ACCOUNT)?;
    let b = l.check_userdata::<Account>(2, ACCOUNT)?;
    let equal = l.userdata::<Account>(a) == l.userdata::<Account>(b);
    l.push_boolean(equal)?;
    Ok(1)
}

/// `Account` global: `create`, `balance`, `withdraw`, `__tostring`, `__eq`
pub fn register_account_type(l: &mut LuaState) {
    l.new_type(ACCOUNT)
        .method("create", account_create)
        .method("balance", account_balance)
        .method("withdraw", account_withdraw)
        .metamethod("__tostring", account_tostring)
        .metamethod("__eq", account_eq)
        .publish(ACCOUNT);
}

#[derive(Debug, Clone)]
pub struct Person {
    pub name: String,
}

fn person_new(l: &mut LuaState) -> LuaResult<usize> {
    let name = l.check_string(1)?;
    l.push_userdata(Person { name }, PERSON)?;
    Ok(1)
}

fn person_get_name(l: &mut LuaState) -> LuaResult<usize> {
    let handle = l.check_userdata::<Person>(1, PERSON)?;
    let name = l.userdata::<Person>(handle).map(|p| p.name.clone()).unwrap_or_default();
    l.push_string(name)?;
    Ok(1)
}

fn person_set_name(l: &mut LuaState) -> LuaResult<usize> {
    let handle = l.check_userdata::<Person>(1, PERSON)?;
    let name = l.check_string(2)?;
    if let Some(person) = l.userdata_mut::<Person>(handle) {
        person.name = name;
    }
    Ok(0)
}

fn person_tostring(l: &mut LuaState) -> LuaResult<usize> {
    let handle = l.check_userdata::<Person>(1, PERSON)?;
    let name = l.userdata::<Person>(handle).map(|p| p.name.clone()).unwrap_or_default();
    l.push_string(format!("Person{{Name: {}}}", name))?;
    Ok(1)
}

/// `person` global with `new(name)`; instances have `get_name`/`set_name`
pub fn register_person_type(l: &mut LuaState) {
    l.new_type(PERSON)
        .method("new", person_new)
        .method("get_name", person_get_name)
        .method("set_name", person_set_name)
        .metamethod("__tostring", person_tostring)
        .publish("person");
}

fn json_pretty(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    match serde_json::to_string_pretty(&LuaJson::new(&value)) {
        Ok(text) => {
            l.push_string(text)?;
            Ok(1)
        }
        Err(e) => Err(l.error(e.to_string())),
    }
}

/// `json.pretty(value)`
pub fn register_json(l: &mut LuaState) -> LuaResult<()> {
    l.new_table()?;
    l.push_function("pretty", json_pretty)?;
    l.set_field(-2, "pretty")?;
    l.set_global("json")
}

/// Fresh state with the libraries, host types and the script loaded
pub fn setup(script: &Path) -> DemoResult<LuaState> {
    let mut l = LuaState::default();
    l.open_libs().map_err(pending(&mut l))?;
    register_json(&mut l).map_err(pending(&mut l))?;
    register_person_type(&mut l);
    l.do_file(script)?;
    Ok(l)
}

// ===== Drivers =====

/// Read `GLOBAL_VAR` as a string
pub fn run_global_var(l: &mut LuaState) -> DemoResult<Option<String>> {
    println!("runGlobalVar, top stack: {}", l.top());
    l.get_global("GLOBAL_VAR").map_err(pending(l))?;
    let value = l.to_string(-1);
    if let Some(v) = &value {
        info!("GLOBAL_VAR = {}", v);
    }
    l.pop(1);
    Ok(value)
}

/// An undefined global reads as nil, not as an error
pub fn run_invalid_var(l: &mut LuaState) -> DemoResult<bool> {
    println!("runInvalidVar, top stack: {}", l.top());
    l.get_global("ASDF_VAR").map_err(pending(l))?;
    let defined = !l.is_nil(-1);
    if defined {
        error!("ASDF_VAR should not be defined");
    }
    l.remove(-1).map_err(pending(l))?;
    Ok(defined)
}

/// `square(5)` through a protected call
pub fn run_square(l: &mut LuaState) -> DemoResult<Option<i64>> {
    println!("runSquare, top stack: {}", l.top());
    l.get_global("square").map_err(pending(l))?;
    if !l.is_function(-1) {
        l.pop(1);
        return Ok(None);
    }
    l.push_integer(5).map_err(pending(l))?;
    l.protected_call(1, 1)?;
    let result = l.to_integer(-1);
    if let Some(r) = result {
        info!("square(5) = {}", r);
    }
    l.remove(-1).map_err(pending(l))?;
    Ok(result)
}

/// Hand `test_go_string` a host closure and a value; returns what the
/// closure reported for each call
pub fn run_host_fn_test(l: &mut LuaState) -> DemoResult<Vec<String>> {
    println!("runGoTestFunc, top stack: {}", l.top());
    let seen = Rc::new(RefCell::new(Vec::new()));

    for arg in [LuaValue::string("Hello, World!"), LuaValue::integer(123)] {
        l.get_global("test_go_string").map_err(pending(l))?;
        if !l.is_function(-1) {
            l.pop(1);
            break;
        }
        let log = seen.clone();
        l.push_function("describe", move |l: &mut LuaState| {
            let kind = if l.is_number(-1) {
                info!("fn({})", l.to_integer(-1).unwrap_or_default());
                "int"
            } else if l.is_string(-1) {
                info!("fn({})", l.to_string(-1).unwrap_or_default());
                "string"
            } else {
                info!("fn({:?})", l.to_value(-1));
                "unknown"
            };
            log.borrow_mut().push(kind.to_string());
            l.push_string(kind)?;
            Ok(1)
        })
        .map_err(pending(l))?;
        l.push_value(arg).map_err(pending(l))?;
        l.protected_call(2, 0)?;
    }

    let kinds = seen.borrow().clone();
    Ok(kinds)
}

/// Register `Account` and run the script's `account_test`
pub fn run_member_test(l: &mut LuaState) -> DemoResult<Option<i64>> {
    register_account_type(l);
    println!("runMemberTest, top stack: {}", l.top());
    l.get_global("account_test").map_err(pending(l))?;
    l.protected_call(0, 1)?;
    let balance = l.to_integer(-1);
    l.pop(1);
    Ok(balance)
}

/// Pass a host-built table with a function and a string field
pub fn run_struct_test(l: &mut LuaState) -> DemoResult<()> {
    l.get_global("test_struct").map_err(pending(l))?;
    l.new_table().map_err(pending(l))?;
    l.push_function("test", |l: &mut LuaState| {
        l.push_string("Asdf")?;
        Ok(1)
    })
    .map_err(pending(l))?;
    l.set_field(-2, "test").map_err(pending(l))?;
    l.push_string("test").map_err(pending(l))?;
    l.set_field(-2, "rick").map_err(pending(l))?;
    l.protected_call(1, 0)
}

/// Pass a table holding a `Person` userdata and an `add` collector; returns
/// the collected strings
pub fn run_struct_test2(l: &mut LuaState) -> DemoResult<Vec<String>> {
    let collected = Rc::new(RefCell::new(Vec::new()));

    l.get_global("test_struct").map_err(pending(l))?;
    l.new_table().map_err(pending(l))?;
    l.push_userdata(
        Person {
            name: "RICK".to_string(),
        },
        PERSON,
    )
    .map_err(pending(l))?;
    l.set_field(-2, "person").map_err(pending(l))?;
    l.push_function("test", |l: &mut LuaState| {
        l.push_string("Asdf")?;
        Ok(1)
    })
    .map_err(pending(l))?;
    l.set_field(-2, "test").map_err(pending(l))?;

    let sink = collected.clone();
    l.push_function("add", move |l: &mut LuaState| {
        let value = l.check_string(1)?;
        sink.borrow_mut().push(value);
        Ok(0)
    })
    .map_err(pending(l))?;
    l.set_field(-2, "add").map_err(pending(l))?;

    l.protected_call(1, 0)?;
    let strings = collected.borrow().clone();
    info!("{:?}", strings);
    Ok(strings)
}

/// Call the script's `member_test`, which builds a `person` itself
pub fn run_person_test(l: &mut LuaState) -> DemoResult<()> {
    l.get_global("member_test").map_err(pending(l))?;
    l.protected_call(0, 0)
}

/// `pretty_json({ Name = "Rick", Value = "TEST" })`
pub fn run_pretty_json(l: &mut LuaState) -> DemoResult<Option<String>> {
    l.get_global("pretty_json").map_err(pending(l))?;
    l.new_table().map_err(pending(l))?;
    l.push_string("Rick").map_err(pending(l))?;
    l.set_field(-2, "Name").map_err(pending(l))?;
    l.push_string("TEST").map_err(pending(l))?;
    l.set_field(-2, "Value").map_err(pending(l))?;
    l.protected_call(1, 1)?;
    let text = l.to_string(-1);
    if let Some(t) = &text {
        info!("pretty_json:\n{}", t);
    }
    l.pop(1);
    Ok(text)
}

/// Every driver in order against `script`
pub fn run_all(script: &Path) -> DemoResult<()> {
    let mut l = setup(script)?;

    run_global_var(&mut l)?;
    run_invalid_var(&mut l)?;
    run_square(&mut l)?;
    run_host_fn_test(&mut l)?;
    run_member_test(&mut l)?;

    println!("--------------------");
    run_struct_test(&mut l)?;
    run_struct_test2(&mut l)?;
    run_person_test(&mut l)?;
    run_pretty_json(&mut l)?;

    // Every driver cleans up after itself
    println!("top stack: {}", l.top());
    Ok(())
}
