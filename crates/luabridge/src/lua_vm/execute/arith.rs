// Arithmetic with Lua 5.4 integer/float semantics and metamethod fallback.

use crate::lua_value::LuaValue;
use crate::lua_value::lua_convert::to_numeric;
use crate::lua_vm::{LuaResult, LuaState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
}

impl ArithOp {
    fn event(self) -> &'static str {
        match self {
            ArithOp::Add => "__add",
            ArithOp::Sub => "__sub",
            ArithOp::Mul => "__mul",
            ArithOp::Div => "__div",
            ArithOp::IDiv => "__idiv",
            ArithOp::Mod => "__mod",
            ArithOp::Pow => "__pow",
        }
    }
}

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

impl LuaState {
    pub(crate) fn arith(&mut self, op: ArithOp, a: LuaValue, b: LuaValue) -> LuaResult<LuaValue> {
        if let (Some(x), Some(y)) = (to_numeric(&a), to_numeric(&b)) {
            return self.arith_numbers(op, x, y);
        }

        let event = op.event();
        let handler = self
            .get_metamethod(&a, event)
            .or_else(|| self.get_metamethod(&b, event));
        if let Some(h) = handler {
            return self.call_meta(h, &[a, b]);
        }

        let culprit = if to_numeric(&a).is_none() { &a } else { &b };
        let type_name = self.display_type_name(culprit);
        Err(self.error(format!("attempt to perform arithmetic on a {} value", type_name)))
    }

    fn arith_numbers(&mut self, op: ArithOp, a: LuaValue, b: LuaValue) -> LuaResult<LuaValue> {
        if let (LuaValue::Integer(x), LuaValue::Integer(y)) = (&a, &b) {
            let (x, y) = (*x, *y);
            let result = match op {
                ArithOp::Add => x.wrapping_add(y),
                ArithOp::Sub => x.wrapping_sub(y),
                ArithOp::Mul => x.wrapping_mul(y),
                ArithOp::IDiv => {
                    if y == 0 {
                        return Err(self.error("attempt to perform 'n//0'"));
                    }
                    int_floor_div(x, y)
                }
                ArithOp::Mod => {
                    if y == 0 {
                        return Err(self.error("attempt to perform 'n%0'"));
                    }
                    int_mod(x, y)
                }
                ArithOp::Div | ArithOp::Pow => {
                    return Ok(LuaValue::Float(float_arith(op, x as f64, y as f64)));
                }
            };
            return Ok(LuaValue::Integer(result));
        }

        let x = a.as_number().unwrap_or_default();
        let y = b.as_number().unwrap_or_default();
        Ok(LuaValue::Float(float_arith(op, x, y)))
    }

    /// Unary minus
    pub(crate) fn arith_unm(&mut self, a: LuaValue) -> LuaResult<LuaValue> {
        match to_numeric(&a) {
            Some(LuaValue::Integer(i)) => Ok(LuaValue::Integer(i.wrapping_neg())),
            Some(LuaValue::Float(f)) => Ok(LuaValue::Float(-f)),
            _ => match self.get_metamethod(&a, "__unm") {
                Some(h) => self.call_meta(h, &[a.clone(), a]),
                None => {
                    let type_name = self.display_type_name(&a);
                    Err(self.error(format!("attempt to perform arithmetic on a {} value", type_name)))
                }
            },
        }
    }
}

fn float_arith(op: ArithOp, x: f64, y: f64) -> f64 {
    match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Pow => {
            if y == 2.0 {
                x * x
            } else {
                x.powf(y)
            }
        }
        ArithOp::IDiv => (x / y).floor(),
        ArithOp::Mod => {
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }
        }
    }
}

fn int_floor_div(x: i64, y: i64) -> i64 {
    if y == -1 {
        return x.wrapping_neg();
    }
    let q = x / y;
    if (x % y != 0) && ((x ^ y) < 0) { q - 1 } else { q }
}

fn int_mod(x: i64, y: i64) -> i64 {
    if y == -1 {
        return 0;
    }
    let r = x % y;
    if r != 0 && (r ^ y) < 0 { r + y } else { r }
}

/// Numeric `<` (or `<=` with `or_equal`), exact across integer/float.
/// `None` when either side is not a number.
pub(crate) fn compare_numbers(a: &LuaValue, b: &LuaValue, or_equal: bool) -> Option<bool> {
    let result = match (a, b) {
        (LuaValue::Integer(x), LuaValue::Integer(y)) => {
            if or_equal { x <= y } else { x < y }
        }
        (LuaValue::Float(x), LuaValue::Float(y)) => {
            if or_equal { x <= y } else { x < y }
        }
        (LuaValue::Integer(i), LuaValue::Float(f)) => int_cmp_float(*i, *f, or_equal),
        (LuaValue::Float(f), LuaValue::Integer(i)) => float_cmp_int(*f, *i, or_equal),
        _ => return None,
    };
    Some(result)
}

/// `i < f` / `i <= f`
fn int_cmp_float(i: i64, f: f64, or_equal: bool) -> bool {
    if f.is_nan() {
        return false;
    }
    if f >= TWO_POW_63 {
        return true;
    }
    if f < -TWO_POW_63 {
        return false;
    }
    if or_equal {
        i <= f.floor() as i64
    } else {
        i < f.ceil() as i64
    }
}

/// `f < i` / `f <= i`
fn float_cmp_int(f: f64, i: i64, or_equal: bool) -> bool {
    if f.is_nan() {
        return false;
    }
    if f >= TWO_POW_63 {
        return false;
    }
    if f < -TWO_POW_63 {
        return true;
    }
    if or_equal {
        f.ceil() as i64 <= i
    } else {
        (f.floor() as i64) < i
    }
}
