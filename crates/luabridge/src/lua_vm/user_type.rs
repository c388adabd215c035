//! Host types exposed to scripts as userdata.
//!
//! A host type is a named metatable kept in the registry. Its `__index`
//! points back at itself, so methods bound into the metatable are found by
//! `obj:method(...)`. Every userdata boxed under that name shares it.
//!
//! ```ignore
//! state
//!     .new_type("Account")
//!     .method("create", create_account)
//!     .method("balance", account_balance)
//!     .metamethod("__tostring", account_to_string)
//!     .publish("Account");
//! ```

use super::{LuaResult, LuaState};
use crate::lua_value::{LuaFunction, LuaTableRef, LuaValue, UserdataRef};
use std::any::Any;
use tracing::{debug, warn};

impl LuaState {
    pub(crate) fn type_metatable(&self, type_name: &str) -> Option<LuaTableRef> {
        match self.registry.get_str(type_name) {
            LuaValue::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Create the metatable for `type_name`. Returns false, keeping the
    /// existing table and its bindings, when the type is already registered.
    pub fn register_type(&mut self, type_name: &str) -> bool {
        if self.type_metatable(type_name).is_some() {
            return false;
        }
        let metatable = LuaTableRef::default();
        metatable.set_str("__name", LuaValue::string(type_name));
        metatable.set_str("__index", LuaValue::Table(metatable.clone()));
        self.registry.set_str(type_name, LuaValue::Table(metatable));
        debug!(type_name, "registered userdata type");
        true
    }

    fn bind<F>(&mut self, type_name: &str, key: &str, f: F) -> LuaResult<()>
    where
        F: Fn(&mut LuaState) -> LuaResult<usize> + 'static,
    {
        match self.type_metatable(type_name) {
            Some(metatable) => {
                metatable.set_str(key, LuaValue::Function(LuaFunction::native(key, f, Vec::new())));
                Ok(())
            }
            None => Err(self.error(format!("type '{}' is not registered", type_name))),
        }
    }

    /// Add (or replace) a method of a registered type
    pub fn bind_method<F>(&mut self, type_name: &str, method: &str, f: F) -> LuaResult<()>
    where
        F: Fn(&mut LuaState) -> LuaResult<usize> + 'static,
    {
        self.bind(type_name, method, f)
    }

    /// Add (or replace) a metamethod such as `__eq`, `__tostring` or `__gc`
    pub fn bind_metamethod<F>(&mut self, type_name: &str, event: &str, f: F) -> LuaResult<()>
    where
        F: Fn(&mut LuaState) -> LuaResult<usize> + 'static,
    {
        self.bind(type_name, event, f)
    }

    /// Expose the type's metatable (constructors included) as a global
    pub fn publish(&mut self, type_name: &str, global_name: &str) -> LuaResult<()> {
        match self.type_metatable(type_name) {
            Some(metatable) => {
                self.globals.set_str(global_name, LuaValue::Table(metatable));
                debug!(type_name, global_name, "published userdata type");
                Ok(())
            }
            None => Err(self.error(format!("type '{}' is not registered", type_name))),
        }
    }

    /// Register `type_name` (if needed) and return a builder for its methods
    pub fn new_type(&mut self, type_name: &str) -> UserTypeBuilder<'_> {
        self.register_type(type_name);
        let metatable = self.type_metatable(type_name).unwrap_or_default();
        UserTypeBuilder {
            state: self,
            type_name: type_name.to_string(),
            metatable,
        }
    }

    /// Attach the metatable registered for `type_name` to the value at `idx`.
    /// Returns false when no such type is registered.
    pub fn set_metatable_named(&mut self, idx: i32, type_name: &str) -> LuaResult<bool> {
        let Some(metatable) = self.type_metatable(type_name) else {
            return Ok(false);
        };
        let target = match self.get(idx) {
            Some(value) => value,
            None => return Err(self.error(format!("invalid stack index {}", idx))),
        };
        self.set_metatable_of(&target, Some(metatable))?;
        Ok(true)
    }

    /// Push the metatable registered for `type_name`, or nil
    pub fn get_metatable_named(&mut self, type_name: &str) -> LuaResult<bool> {
        match self.type_metatable(type_name) {
            Some(metatable) => {
                self.push_value(LuaValue::Table(metatable))?;
                Ok(true)
            }
            None => {
                self.push_nil()?;
                Ok(false)
            }
        }
    }

    // ===== Userdata =====

    /// Box `value` as a new userdata of `type_name` and push it. The state
    /// owns the object from here on; it is dropped after its `__gc` (if any)
    /// has run and it is no longer reachable.
    pub fn push_userdata<T: Any>(&mut self, value: T, type_name: &str) -> LuaResult<UserdataRef> {
        self.ensure_open()?;
        let metatable = self.type_metatable(type_name);
        if metatable.is_none() {
            warn!(type_name, "boxing userdata of an unregistered type");
        }
        let handle = self.gc.alloc(Box::new(value), type_name, metatable);
        // On overflow the object is unreachable and goes with the next cycle
        self.push_value(LuaValue::Userdata(handle))?;
        Ok(handle)
    }

    pub fn userdata<T: Any>(&self, handle: UserdataRef) -> Option<&T> {
        self.gc.get(handle)?.value.downcast_ref::<T>()
    }

    pub fn userdata_mut<T: Any>(&mut self, handle: UserdataRef) -> Option<&mut T> {
        self.gc.get_mut(handle)?.value.downcast_mut::<T>()
    }

    /// Type name the userdata was boxed under; `None` once released
    pub fn userdata_type_name(&self, handle: UserdataRef) -> Option<&str> {
        self.gc.get(handle).map(|e| e.type_name.as_str())
    }

    /// Argument `arg` as a live userdata of `type_name` holding a `T`, else
    /// raise `bad argument #arg to 'f' (type_name expected, got ...)`
    pub fn check_userdata<T: Any>(&mut self, arg: usize, type_name: &str) -> LuaResult<UserdataRef> {
        if let Some(LuaValue::Userdata(handle)) = self.get_arg(arg) {
            let matches = self
                .gc
                .get(handle)
                .is_some_and(|e| e.type_name == type_name && e.value.is::<T>());
            if matches {
                return Ok(handle);
            }
        }
        let got = match self.get_arg(arg) {
            Some(value) => self.display_type_name(&value),
            None => "no value".to_string(),
        };
        Err(self.arg_error(arg, &format!("{} expected, got {}", type_name, got)))
    }
}

/// Chained registration of a host type's methods and metamethods.
pub struct UserTypeBuilder<'a> {
    state: &'a mut LuaState,
    type_name: String,
    metatable: LuaTableRef,
}

impl UserTypeBuilder<'_> {
    pub fn method<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&mut LuaState) -> LuaResult<usize> + 'static,
    {
        self.metatable
            .set_str(name, LuaValue::Function(LuaFunction::native(name, f, Vec::new())));
        self
    }

    pub fn metamethod<F>(self, event: &str, f: F) -> Self
    where
        F: Fn(&mut LuaState) -> LuaResult<usize> + 'static,
    {
        self.method(event, f)
    }

    /// Bind the type's table as a global
    pub fn publish(self, global_name: &str) -> Self {
        self.state
            .globals
            .set_str(global_name, LuaValue::Table(self.metatable.clone()));
        debug!(type_name = %self.type_name, global_name, "published userdata type");
        self
    }

    pub fn metatable(&self) -> &LuaTableRef {
        &self.metatable
    }
}
