// Metatable lookup and the operations that may dispatch through it:
// indexing, calls to handlers, equality, ordering, concatenation, length
// and conversion to text.

use crate::lua_value::lua_convert::{format_float, format_integer, to_str_coerced};
use crate::lua_value::{LuaTableRef, LuaValue};
use crate::lua_vm::{LuaResult, LuaState};
use smol_str::SmolStr;

/// Bound on `__index`/`__newindex` chains
const MAX_META_CHAIN: usize = 100;

impl LuaState {
    pub(crate) fn metatable_of(&self, value: &LuaValue) -> Option<LuaTableRef> {
        match value {
            LuaValue::Table(t) => t.metatable(),
            LuaValue::Userdata(handle) => self.gc.metatable(*handle),
            _ => None,
        }
    }

    pub(crate) fn get_metamethod(&self, value: &LuaValue, event: &str) -> Option<LuaValue> {
        let handler = self.metatable_of(value)?.get_str(event);
        if handler.is_nil() { None } else { Some(handler) }
    }

    pub(crate) fn is_callable(&self, value: &LuaValue) -> bool {
        value.is_function() || matches!(self.get_metamethod(value, "__call"), Some(LuaValue::Function(_)))
    }

    /// Type name for messages: the metatable's `__name` when it has one
    pub(crate) fn display_type_name(&self, value: &LuaValue) -> String {
        if let Some(LuaValue::String(name)) = self.metatable_of(value).map(|mt| mt.get_str("__name")) {
            return name.to_string();
        }
        value.type_name().to_string()
    }

    /// Call a handler with `args`, keeping the first result
    pub(crate) fn call_meta(&mut self, handler: LuaValue, args: &[LuaValue]) -> LuaResult<LuaValue> {
        let func_idx = self.stack.len();
        self.push_value(handler)?;
        for arg in args {
            self.push_value(arg.clone())?;
        }
        self.call_value(func_idx, 1)?;
        Ok(self.stack.pop().unwrap_or_default())
    }

    /// `obj[key]` honoring `__index`
    pub(crate) fn get_index(&mut self, obj: LuaValue, key: LuaValue) -> LuaResult<LuaValue> {
        let mut current = obj;
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                LuaValue::Table(t) => {
                    let raw = t.get(&key);
                    if !raw.is_nil() {
                        return Ok(raw);
                    }
                    match self.get_metamethod(&current, "__index") {
                        Some(h) => h,
                        None => return Ok(LuaValue::Nil),
                    }
                }
                _ => match self.get_metamethod(&current, "__index") {
                    Some(h) => h,
                    None => {
                        let type_name = self.display_type_name(&current);
                        return Err(self.error(format!("attempt to index a {} value", type_name)));
                    }
                },
            };
            if handler.is_function() {
                return self.call_meta(handler, &[current, key]);
            }
            current = handler;
        }
        Err(self.error("'__index' chain too long; possible loop"))
    }

    /// `obj[key] = value` honoring `__newindex`
    pub(crate) fn set_index(&mut self, obj: LuaValue, key: LuaValue, value: LuaValue) -> LuaResult<()> {
        let mut current = obj;
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                LuaValue::Table(t) => {
                    let handler = if t.get(&key).is_nil() {
                        self.get_metamethod(&current, "__newindex")
                    } else {
                        None
                    };
                    match handler {
                        Some(h) => h,
                        None => {
                            let result = t.borrow_mut().raw_set(key, value);
                            return result.map_err(|msg| self.error(format!("table {}", msg)));
                        }
                    }
                }
                _ => match self.get_metamethod(&current, "__newindex") {
                    Some(h) => h,
                    None => {
                        let type_name = self.display_type_name(&current);
                        return Err(self.error(format!("attempt to index a {} value", type_name)));
                    }
                },
            };
            if handler.is_function() {
                let func_idx = self.stack.len();
                self.push_value(handler)?;
                self.push_value(current)?;
                self.push_value(key)?;
                self.push_value(value)?;
                self.call_value(func_idx, 0)?;
                return Ok(());
            }
            current = handler;
        }
        Err(self.error("'__newindex' chain too long; possible loop"))
    }

    /// `==`: primitive equality first, then `__eq` for two tables or two
    /// userdata
    pub(crate) fn values_equal(&mut self, a: LuaValue, b: LuaValue) -> LuaResult<bool> {
        if a.raw_equals(&b) {
            return Ok(true);
        }
        let comparable = matches!(
            (&a, &b),
            (LuaValue::Table(_), LuaValue::Table(_)) | (LuaValue::Userdata(_), LuaValue::Userdata(_))
        );
        if !comparable {
            return Ok(false);
        }
        let handler = self
            .get_metamethod(&a, "__eq")
            .or_else(|| self.get_metamethod(&b, "__eq"));
        match handler {
            Some(h) => Ok(self.call_meta(h, &[a, b])?.is_truthy()),
            None => Ok(false),
        }
    }

    pub(crate) fn less_than(&mut self, a: LuaValue, b: LuaValue) -> LuaResult<bool> {
        if let Some(result) = super::arith::compare_numbers(&a, &b, false) {
            return Ok(result);
        }
        if let (LuaValue::String(x), LuaValue::String(y)) = (&a, &b) {
            return Ok(x.as_bytes() < y.as_bytes());
        }
        self.order_metamethod("__lt", a, b)
    }

    pub(crate) fn less_equal(&mut self, a: LuaValue, b: LuaValue) -> LuaResult<bool> {
        if let Some(result) = super::arith::compare_numbers(&a, &b, true) {
            return Ok(result);
        }
        if let (LuaValue::String(x), LuaValue::String(y)) = (&a, &b) {
            return Ok(x.as_bytes() <= y.as_bytes());
        }
        self.order_metamethod("__le", a, b)
    }

    fn order_metamethod(&mut self, event: &str, a: LuaValue, b: LuaValue) -> LuaResult<bool> {
        let handler = self
            .get_metamethod(&a, event)
            .or_else(|| self.get_metamethod(&b, event));
        if let Some(h) = handler {
            return Ok(self.call_meta(h, &[a, b])?.is_truthy());
        }
        let (ta, tb) = (self.display_type_name(&a), self.display_type_name(&b));
        if ta == tb {
            Err(self.error(format!("attempt to compare two {} values", ta)))
        } else {
            Err(self.error(format!("attempt to compare {} with {}", ta, tb)))
        }
    }

    /// `a .. b` for strings and numbers, else `__concat`
    pub(crate) fn concat(&mut self, a: LuaValue, b: LuaValue) -> LuaResult<LuaValue> {
        if let (Some(x), Some(y)) = (to_str_coerced(&a), to_str_coerced(&b)) {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(&x);
            s.push_str(&y);
            return Ok(LuaValue::String(SmolStr::from(s)));
        }
        let handler = self
            .get_metamethod(&a, "__concat")
            .or_else(|| self.get_metamethod(&b, "__concat"));
        if let Some(h) = handler {
            return self.call_meta(h, &[a, b]);
        }
        let culprit = if to_str_coerced(&a).is_none() { &a } else { &b };
        let type_name = self.display_type_name(culprit);
        Err(self.error(format!("attempt to concatenate a {} value", type_name)))
    }

    /// `#v`
    pub(crate) fn length(&mut self, value: LuaValue) -> LuaResult<LuaValue> {
        if let LuaValue::String(s) = &value {
            return Ok(LuaValue::Integer(s.len() as i64));
        }
        if let Some(h) = self.get_metamethod(&value, "__len") {
            return self.call_meta(h, &[value]);
        }
        match &value {
            LuaValue::Table(t) => Ok(LuaValue::Integer(t.borrow().len())),
            other => {
                let type_name = self.display_type_name(other);
                Err(self.error(format!("attempt to get length of a {} value", type_name)))
            }
        }
    }

    /// `tostring(v)`: `__tostring`, then `__name`, then the primitive form
    pub(crate) fn tostring_value(&mut self, value: &LuaValue) -> LuaResult<String> {
        if let Some(h) = self.get_metamethod(value, "__tostring") {
            return match self.call_meta(h, &[value.clone()])? {
                LuaValue::String(s) => Ok(s.to_string()),
                _ => Err(self.error("'__tostring' must return a string")),
            };
        }
        let text = match value {
            LuaValue::Nil => "nil".to_string(),
            LuaValue::Boolean(b) => b.to_string(),
            LuaValue::Integer(i) => format_integer(*i),
            LuaValue::Float(f) => format_float(*f),
            LuaValue::String(s) => s.to_string(),
            LuaValue::Table(_) | LuaValue::Userdata(_) | LuaValue::Function(_) => {
                let kind = self.display_type_name(value);
                format!("{}: 0x{:014x}", kind, value.raw_ptr_repr())
            }
        };
        Ok(text)
    }
}
