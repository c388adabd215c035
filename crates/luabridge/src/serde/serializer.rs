/// Serializer for Lua values
///
/// - nil -> null, booleans and numbers as themselves, strings as strings
/// - tables whose keys are exactly 1..n (and the empty table) -> arrays
/// - other tables -> objects; string, number and boolean keys are
///   stringified, other keys are skipped
/// - functions and userdata -> their `type: 0x...` text
///
/// Nesting is bounded, which also stops cyclic tables.
use crate::lua_value::LuaValue;
use crate::lua_value::lua_convert::to_str_coerced;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

const MAX_DEPTH: usize = 128;

/// Serializable view of a Lua value
pub struct LuaJson<'a> {
    value: &'a LuaValue,
    depth: usize,
}

impl<'a> LuaJson<'a> {
    pub fn new(value: &'a LuaValue) -> Self {
        LuaJson { value, depth: 0 }
    }

    fn nested<'b>(&self, value: &'b LuaValue) -> LuaJson<'b> {
        LuaJson {
            value,
            depth: self.depth + 1,
        }
    }
}

impl Serialize for LuaJson<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            LuaValue::Nil => serializer.serialize_unit(),
            LuaValue::Boolean(b) => serializer.serialize_bool(*b),
            LuaValue::Integer(i) => serializer.serialize_i64(*i),
            LuaValue::Float(f) => serializer.serialize_f64(*f),
            LuaValue::String(s) => serializer.serialize_str(s),
            LuaValue::Function(_) | LuaValue::Userdata(_) => serializer.serialize_str(&format!(
                "{}: 0x{:014x}",
                self.value.type_name(),
                self.value.raw_ptr_repr()
            )),
            LuaValue::Table(t) => {
                if self.depth >= MAX_DEPTH {
                    return Err(S::Error::custom("table nesting too deep (cyclic table?)"));
                }
                let table = t.borrow();
                let count = table.iter().count();
                let len = table.len();
                if len as usize == count {
                    let mut seq = serializer.serialize_seq(Some(count))?;
                    for i in 1..=len {
                        let item = table.get_int(i);
                        seq.serialize_element(&self.nested(&item))?;
                    }
                    return seq.end();
                }

                let mut map = serializer.serialize_map(None)?;
                for (key, value) in table.iter() {
                    let key = match key {
                        LuaValue::Boolean(b) => b.to_string(),
                        other => match to_str_coerced(other) {
                            Some(s) => s,
                            None => continue,
                        },
                    };
                    map.serialize_entry(&key, &self.nested(value))?;
                }
                map.end()
            }
        }
    }
}

/// Convert a Lua value to a serde_json::Value
pub fn to_value(lua_value: &LuaValue) -> Result<JsonValue, String> {
    serde_json::to_value(LuaJson::new(lua_value))
        .map_err(|e| format!("Failed to serialize to JSON: {}", e))
}

/// Convert a Lua value to a JSON string
pub fn to_string(lua_value: &LuaValue, pretty: bool) -> Result<String, String> {
    let view = LuaJson::new(lua_value);
    let result = if pretty {
        serde_json::to_string_pretty(&view)
    } else {
        serde_json::to_string(&view)
    };
    result.map_err(|e| format!("Failed to serialize to JSON: {}", e))
}
