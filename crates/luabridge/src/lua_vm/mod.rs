// Engine state and the host-facing API: value stack, calls, errors,
// userdata types and the collector hooks.
mod call;
mod call_info;
mod execute;
pub mod lua_error;
mod lua_state;
mod safe_option;
mod user_type;

pub use lua_error::{LuaError, LuaFullError};
pub use lua_state::{LuaState, MULTRET};
pub use safe_option::SafeOption;
pub use user_type::UserTypeBuilder;

/// Result of engine operations. The error is a lightweight kind; the
/// message stays in the state until taken with
/// [`LuaState::into_full_error`].
pub type LuaResult<T> = Result<T, LuaError>;
