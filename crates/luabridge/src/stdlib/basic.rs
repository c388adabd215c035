// Basic library (_G global functions)
// Implements: print, type, assert, error, tonumber, tostring, select,
// ipairs, pairs, next, pcall, getmetatable, setmetatable, rawget, rawset,
// rawlen, rawequal, collectgarbage, unpack

use crate::lib_registry::LibraryModule;
use crate::lua_value::LuaValue;
use crate::lua_value::lua_convert::to_numeric;
use crate::lua_vm::{LuaError, LuaResult, LuaState, MULTRET};

pub fn create_basic_lib() -> LibraryModule {
    let module = crate::lib_module!("_G", {
        "print" => lua_print,
        "type" => lua_type,
        "assert" => lua_assert,
        "error" => lua_error,
        "tonumber" => lua_tonumber,
        "tostring" => lua_tostring,
        "select" => lua_select,
        "ipairs" => lua_ipairs,
        "pairs" => lua_pairs,
        "next" => lua_next,
        "pcall" => lua_pcall,
        "getmetatable" => lua_getmetatable,
        "setmetatable" => lua_setmetatable,
        "rawget" => lua_rawget,
        "rawset" => lua_rawset,
        "rawlen" => lua_rawlen,
        "rawequal" => lua_rawequal,
        "collectgarbage" => lua_collectgarbage,
        "unpack" => lua_unpack,
    });

    module.with_value("_VERSION", |_| LuaValue::string("Lua 5.4"))
}

/// print(...) - Print values to stdout, tab separated
fn lua_print(l: &mut LuaState) -> LuaResult<usize> {
    let n = l.arg_count();
    let mut parts = Vec::with_capacity(n);
    for i in 1..=n {
        parts.push(l.to_display(i as i32)?);
    }
    println!("{}", parts.join("\t"));
    Ok(0)
}

/// type(v) - Return the type of a value as a string
fn lua_type(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    l.push_string(value.type_name())?;
    Ok(1)
}

/// Raise `value`; string messages get the position of the frame `level`
/// levels up (1 = the caller of `error`)
fn raise(l: &mut LuaState, value: LuaValue, level: i64) -> LuaError {
    if let LuaValue::String(msg) = &value
        && level > 0
    {
        let location = l.location_at_level(level as usize);
        if !location.is_empty() {
            return l.error_with_object(LuaValue::string(format!("{} {}", location, msg)));
        }
    }
    l.error_with_object(value)
}

/// assert(v [, message]) - Raise error if v is false or nil, else return
/// all arguments
fn lua_assert(l: &mut LuaState) -> LuaResult<usize> {
    let condition = l.check_any(1)?;
    if condition.is_truthy() {
        return Ok(l.arg_count());
    }
    let message = match l.get_arg(2) {
        Some(msg) if !msg.is_nil() => msg,
        _ => LuaValue::string("assertion failed!"),
    };
    Err(raise(l, message, 1))
}

/// error(message [, level]) - Raise an error
fn lua_error(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.get_arg(1).unwrap_or_default();
    let level = l.opt_integer(2, 1)?;
    Err(raise(l, value, level))
}

/// tonumber(v [, base])
fn lua_tonumber(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    if matches!(l.get_arg(2), None | Some(LuaValue::Nil)) {
        l.push_value(to_numeric(&value).unwrap_or_default())?;
        return Ok(1);
    }

    let base = l.check_integer(2)?;
    if !(2..=36).contains(&base) {
        return Err(l.arg_error(2, "base out of range"));
    }
    let parsed = match &value {
        LuaValue::String(s) => parse_int_with_base(s, base as u32),
        other => {
            let got = other.type_name();
            return Err(l.arg_error(1, &format!("string expected, got {}", got)));
        }
    };
    l.push_value(parsed.map_or(LuaValue::Nil, LuaValue::Integer))?;
    Ok(1)
}

fn parse_int_with_base(s: &str, base: u32) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if digits.is_empty() {
        return None;
    }
    let mut n: i64 = 0;
    for c in digits.chars() {
        let d = c.to_digit(base)?;
        n = n.wrapping_mul(base as i64).wrapping_add(d as i64);
    }
    Some(if negative { n.wrapping_neg() } else { n })
}

/// tostring(v) - Convert to string, honoring __tostring and __name
fn lua_tostring(l: &mut LuaState) -> LuaResult<usize> {
    l.check_any(1)?;
    let text = l.to_display(1)?;
    l.push_string(text)?;
    Ok(1)
}

/// select(n, ...) / select('#', ...)
fn lua_select(l: &mut LuaState) -> LuaResult<usize> {
    let count = l.arg_count() as i64 - 1;
    if let Some(LuaValue::String(s)) = l.get_arg(1)
        && s == "#"
    {
        l.push_integer(count)?;
        return Ok(1);
    }

    let n = l.check_integer(1)?;
    let skip = if n < 0 {
        count + n
    } else if n == 0 {
        -1
    } else {
        (n - 1).min(count)
    };
    if skip < 0 {
        return Err(l.arg_error(1, "index out of range"));
    }
    // The selected values are already the top of the frame
    Ok((count - skip) as usize)
}

/// next(table [, key])
fn lua_next(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let key = l.get_arg(2).unwrap_or_default();
    let step = table.borrow().next(&key);
    match step {
        Ok(Some((k, v))) => {
            l.push_value(k)?;
            l.push_value(v)?;
            Ok(2)
        }
        Ok(None) => {
            l.push_nil()?;
            Ok(1)
        }
        Err(()) => Err(l.error("invalid key to 'next'")),
    }
}

/// pairs(t) - `__pairs` when present, else `next, t, nil`
fn lua_pairs(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    if let Some(handler) = l.get_metamethod(&value, "__pairs") {
        l.push_value(handler)?;
        l.push_value(value)?;
        l.call(1, 3)?;
        return Ok(3);
    }
    l.check_table(1)?;
    l.push_value(LuaValue::cfunction("next", lua_next))?;
    l.push_value(value)?;
    l.push_nil()?;
    Ok(3)
}

/// ipairs(t) - Iterate t[1], t[2], ... until the first nil
fn lua_ipairs(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    l.push_value(LuaValue::cfunction("ipairs", ipairs_next))?;
    l.push_value(value)?;
    l.push_integer(0)?;
    Ok(3)
}

fn ipairs_next(l: &mut LuaState) -> LuaResult<usize> {
    let i = l.check_integer(2)?.wrapping_add(1);
    let target = l.get_arg(1).unwrap_or_default();
    let value = l.get_index(target, LuaValue::Integer(i))?;
    if value.is_nil() {
        l.push_nil()?;
        return Ok(1);
    }
    l.push_integer(i)?;
    l.push_value(value)?;
    Ok(2)
}

/// pcall(f, ...) - `true, results...` or `false, error value`
fn lua_pcall(l: &mut LuaState) -> LuaResult<usize> {
    l.check_any(1)?;
    let nargs = l.arg_count() - 1;
    match l.pcall_raw(nargs, MULTRET) {
        Ok(()) => {
            l.push_boolean(true)?;
            l.insert(1)?;
            Ok(l.arg_count())
        }
        Err(_) => {
            let error_value = std::mem::take(&mut l.error_object);
            l.clear_error();
            l.push_boolean(false)?;
            l.push_value(error_value)?;
            Ok(2)
        }
    }
}

/// getmetatable(v) - honors a `__metatable` field
fn lua_getmetatable(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    match l.metatable_of(&value) {
        Some(mt) => {
            let protected = mt.get_str("__metatable");
            if protected.is_nil() {
                l.push_value(LuaValue::Table(mt))?;
            } else {
                l.push_value(protected)?;
            }
        }
        None => l.push_nil()?,
    }
    Ok(1)
}

/// setmetatable(t, mt) - Returns t
fn lua_setmetatable(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let metatable = match l.get_arg(2) {
        Some(LuaValue::Nil) => None,
        Some(LuaValue::Table(mt)) => Some(mt),
        _ => return Err(l.arg_error(2, "nil or table expected")),
    };
    if let Some(old) = table.metatable()
        && !old.get_str("__metatable").is_nil()
    {
        return Err(l.error("cannot change a protected metatable"));
    }
    table.borrow_mut().set_metatable(metatable);
    l.push_value(LuaValue::Table(table))?;
    Ok(1)
}

fn lua_rawget(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let key = l.check_any(2)?;
    l.push_value(table.get(&key))?;
    Ok(1)
}

fn lua_rawset(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let key = l.check_any(2)?;
    let value = l.check_any(3)?;
    let result = table.borrow_mut().raw_set(key, value);
    if let Err(msg) = result {
        return Err(l.error(format!("table {}", msg)));
    }
    l.push_value(LuaValue::Table(table))?;
    Ok(1)
}

fn lua_rawlen(l: &mut LuaState) -> LuaResult<usize> {
    match l.get_arg(1) {
        Some(LuaValue::Table(_) | LuaValue::String(_)) => {
            let len = l.raw_len(1);
            l.push_integer(len as i64)?;
            Ok(1)
        }
        _ => Err(l.arg_error(1, "table or string expected")),
    }
}

fn lua_rawequal(l: &mut LuaState) -> LuaResult<usize> {
    let a = l.check_any(1)?;
    let b = l.check_any(2)?;
    l.push_boolean(a.raw_equals(&b))?;
    Ok(1)
}

/// collectgarbage([opt]) - "collect" (default), "step", "count" (live
/// userdata objects), "isrunning"
fn lua_collectgarbage(l: &mut LuaState) -> LuaResult<usize> {
    let option = match l.get_arg(1) {
        None | Some(LuaValue::Nil) => "collect".to_string(),
        Some(_) => l.check_string(1)?,
    };
    match option.as_str() {
        "collect" => {
            l.collect_garbage();
            l.push_integer(0)?;
        }
        "step" => {
            l.collect_garbage();
            l.push_boolean(true)?;
        }
        "count" => {
            let live = l.live_userdata();
            l.push_integer(live as i64)?;
        }
        "isrunning" => l.push_boolean(true)?,
        other => return Err(l.arg_error(1, &format!("invalid option '{}'", other))),
    }
    Ok(1)
}

/// unpack(t [, i [, j]]) - t[i], ..., t[j]
fn lua_unpack(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let first = l.opt_integer(2, 1)?;
    let last = match l.get_arg(3) {
        None | Some(LuaValue::Nil) => table.borrow().len(),
        Some(_) => l.check_integer(3)?,
    };
    if first > last {
        return Ok(0);
    }
    let count = (last as i128 - first as i128 + 1) as u128;
    if count >= i32::MAX as u128 || !l.check_stack(count as usize) {
        return Err(l.error("too many results to unpack"));
    }
    for i in first..=last {
        l.push_value(table.get(&LuaValue::Integer(i)))?;
    }
    Ok(count as usize)
}
