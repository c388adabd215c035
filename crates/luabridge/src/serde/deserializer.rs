/// Deserializer for converting serde_json::Value to Lua values
///
/// - null -> nil, booleans and strings as themselves
/// - numbers -> integers when they fit in i64, floats otherwise
/// - arrays -> sequence tables, objects -> tables with string keys
use crate::lua_value::{LuaTable, LuaTableRef, LuaValue};
use serde_json::Value as JsonValue;

/// Convert a serde_json::Value to a Lua value
pub fn from_value(json_value: &JsonValue) -> LuaValue {
    match json_value {
        JsonValue::Null => LuaValue::nil(),
        JsonValue::Bool(b) => LuaValue::boolean(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => LuaValue::integer(i),
            None => LuaValue::float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => LuaValue::string(s.as_str()),
        JsonValue::Array(arr) => {
            let mut table = LuaTable::with_capacity(arr.len());
            for (i, item) in arr.iter().enumerate() {
                table.set_int(i as i64 + 1, from_value(item));
            }
            LuaValue::Table(LuaTableRef::new(table))
        }
        JsonValue::Object(obj) => {
            let mut table = LuaTable::with_capacity(obj.len());
            for (key, value) in obj {
                table.set_str(key, from_value(value));
            }
            LuaValue::Table(LuaTableRef::new(table))
        }
    }
}

/// Convert a JSON string to a Lua value
pub fn from_str(json_str: &str) -> Result<LuaValue, String> {
    let json_value: JsonValue =
        serde_json::from_str(json_str).map_err(|e| format!("Failed to parse JSON: {}", e))?;
    Ok(from_value(&json_value))
}
