// Lua embedding bridge
// A Rust host and an embedded Lua engine talking through one value stack:
// marshaling, calls and protected calls, host types exposed as userdata.

#[cfg(test)]
mod test;

pub mod compiler;
pub mod gc;
pub mod lib_registry;
pub mod lua_value;
pub mod lua_vm;
pub mod stdlib;

#[cfg(feature = "serde")]
pub mod serde;

pub use gc::GcStats;
pub use lib_registry::LibraryRegistry;
pub use lua_value::{CFunction, LuaFunction, LuaTable, LuaTableRef, LuaValue, LuaValueKind, UserdataRef};
pub use lua_vm::{LuaError, LuaFullError, LuaResult, LuaState, MULTRET, SafeOption, UserTypeBuilder};
pub use stdlib::Stdlib;
