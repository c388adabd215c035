// Math library
// Implements: abs, ceil, floor, max, min, sqrt, tointeger, type,
// pi, huge, maxinteger, mininteger

use crate::lib_registry::LibraryModule;
use crate::lua_value::LuaValue;
use crate::lua_value::lua_convert::{float_to_integer, to_numeric};
use crate::lua_vm::{LuaResult, LuaState};

pub fn create_math_lib() -> LibraryModule {
    let module = crate::lib_module!("math", {
        "abs" => math_abs,
        "ceil" => math_ceil,
        "floor" => math_floor,
        "max" => math_max,
        "min" => math_min,
        "sqrt" => math_sqrt,
        "tointeger" => math_tointeger,
        "type" => math_type,
    });

    module
        .with_value("pi", |_| LuaValue::float(std::f64::consts::PI))
        .with_value("huge", |_| LuaValue::float(f64::INFINITY))
        .with_value("maxinteger", |_| LuaValue::integer(i64::MAX))
        .with_value("mininteger", |_| LuaValue::integer(i64::MIN))
}

/// Argument `arg` as a number value, keeping the integer/float subtype
fn check_numeric(l: &mut LuaState, arg: usize) -> LuaResult<LuaValue> {
    match l.get_arg(arg).as_ref().and_then(to_numeric) {
        Some(n) => Ok(n),
        None => Err(l.type_error(arg, "number")),
    }
}

fn math_abs(l: &mut LuaState) -> LuaResult<usize> {
    match check_numeric(l, 1)? {
        LuaValue::Integer(i) => l.push_integer(i.wrapping_abs())?,
        other => l.push_number(other.as_number().unwrap_or_default().abs())?,
    }
    Ok(1)
}

/// Floats that fit become integers, others stay floats
fn push_rounded(l: &mut LuaState, f: f64) -> LuaResult<()> {
    match float_to_integer(f) {
        Some(i) => l.push_integer(i),
        None => l.push_number(f),
    }
}

fn math_floor(l: &mut LuaState) -> LuaResult<usize> {
    match check_numeric(l, 1)? {
        LuaValue::Integer(i) => l.push_integer(i)?,
        other => push_rounded(l, other.as_number().unwrap_or_default().floor())?,
    }
    Ok(1)
}

fn math_ceil(l: &mut LuaState) -> LuaResult<usize> {
    match check_numeric(l, 1)? {
        LuaValue::Integer(i) => l.push_integer(i)?,
        other => push_rounded(l, other.as_number().unwrap_or_default().ceil())?,
    }
    Ok(1)
}

fn math_sqrt(l: &mut LuaState) -> LuaResult<usize> {
    let x = l.check_number(1)?;
    l.push_number(x.sqrt())?;
    Ok(1)
}

fn math_max(l: &mut LuaState) -> LuaResult<usize> {
    pick_extreme(l, true)
}

fn math_min(l: &mut LuaState) -> LuaResult<usize> {
    pick_extreme(l, false)
}

fn pick_extreme(l: &mut LuaState, want_max: bool) -> LuaResult<usize> {
    let mut best = check_numeric(l, 1)?;
    for arg in 2..=l.arg_count() {
        let candidate = check_numeric(l, arg)?;
        let replace = if want_max {
            l.less_than(best.clone(), candidate.clone())?
        } else {
            l.less_than(candidate.clone(), best.clone())?
        };
        if replace {
            best = candidate;
        }
    }
    l.push_value(best)?;
    Ok(1)
}

fn math_tointeger(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    let result = match value {
        LuaValue::Integer(i) => LuaValue::Integer(i),
        LuaValue::Float(f) => float_to_integer(f).map_or(LuaValue::Nil, LuaValue::Integer),
        _ => LuaValue::Nil,
    };
    l.push_value(result)?;
    Ok(1)
}

fn math_type(l: &mut LuaState) -> LuaResult<usize> {
    match l.check_any(1)? {
        LuaValue::Integer(_) => l.push_string("integer")?,
        LuaValue::Float(_) => l.push_string("float")?,
        _ => l.push_nil()?,
    }
    Ok(1)
}
