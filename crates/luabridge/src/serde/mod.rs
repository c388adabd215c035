/// JSON conversion for Lua values, built on serde.
///
/// Values go through `serde_json::Value`; callers use the functions below
/// rather than serde traits on the Lua types themselves.
mod deserializer;
mod serializer;

pub use deserializer::{from_str as deserialize_from_json_str, from_value as deserialize_from_json};
pub use serializer::{LuaJson, to_string as serialize_to_json_string, to_value as serialize_to_json};

use crate::lua_value::LuaValue;

/// Convert a Lua value to a serde_json::Value
pub fn lua_to_json(lua_value: &LuaValue) -> Result<serde_json::Value, String> {
    serialize_to_json(lua_value)
}

/// Convert a Lua value to a JSON string
pub fn lua_to_json_string(lua_value: &LuaValue, pretty: bool) -> Result<String, String> {
    serialize_to_json_string(lua_value, pretty)
}

/// Convert a serde_json::Value to a Lua value
pub fn json_to_lua(json_value: &serde_json::Value) -> LuaValue {
    deserialize_from_json(json_value)
}

/// Convert a JSON string to a Lua value
pub fn json_string_to_lua(json_str: &str) -> Result<LuaValue, String> {
    deserialize_from_json_str(json_str)
}
