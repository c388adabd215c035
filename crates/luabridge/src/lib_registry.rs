// Library registration: groups host functions and values into named
// modules that are installed as globals in one step.

use crate::lua_value::{CFunction, LuaTableRef, LuaValue};
use crate::lua_vm::{LuaResult, LuaState};
use crate::stdlib;
use tracing::debug;

/// Type for value initializers - functions that create values when the module loads
pub type ValueInitializer = fn(&mut LuaState) -> LuaValue;

/// Entry in a library module - can be a function or a value
pub enum LibraryEntry {
    Function(CFunction),
    Value(ValueInitializer),
}

/// A library module containing multiple functions and values
pub struct LibraryModule {
    pub name: &'static str,
    pub entries: Vec<(&'static str, LibraryEntry)>,
}

impl LibraryModule {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    pub fn with_function(mut self, name: &'static str, func: CFunction) -> Self {
        self.entries.push((name, LibraryEntry::Function(func)));
        self
    }

    pub fn with_value(mut self, name: &'static str, value_init: ValueInitializer) -> Self {
        self.entries.push((name, LibraryEntry::Value(value_init)));
        self
    }
}

/// Builder for creating library modules from function lists
#[macro_export]
macro_rules! lib_module {
    ($name:expr, {
        $($item_name:expr => $item:expr),* $(,)?
    }) => {{
        let mut module = $crate::lib_registry::LibraryModule::new($name);
        $(
            module.entries.push(($item_name, $crate::lib_registry::LibraryEntry::Function($item)));
        )*
        module
    }};
}

/// Ordered set of library modules
pub struct LibraryRegistry {
    modules: Vec<LibraryModule>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    pub fn register(&mut self, module: LibraryModule) {
        self.modules.push(module);
    }

    /// Install every registered module into `state`
    pub fn load_all(&self, state: &mut LuaState) -> LuaResult<()> {
        for module in &self.modules {
            self.load_module(state, module)?;
        }
        Ok(())
    }

    /// `_G` entries become globals; any other module becomes a global
    /// table named after it
    pub fn load_module(&self, state: &mut LuaState, module: &LibraryModule) -> LuaResult<()> {
        let target = if module.name == "_G" {
            state.globals().clone()
        } else {
            LuaTableRef::default()
        };

        for (name, entry) in &module.entries {
            let value = match entry {
                LibraryEntry::Function(func) => LuaValue::cfunction(name, *func),
                LibraryEntry::Value(value_init) => value_init(state),
            };
            target.set_str(name, value);
        }

        if module.name != "_G" {
            state.globals().set_str(module.name, LuaValue::Table(target));
        }
        debug!(module = module.name, entries = module.entries.len(), "library loaded");
        Ok(())
    }

    pub fn get_module(&self, name: &str) -> Option<&LibraryModule> {
        self.modules.iter().find(|m| m.name == name)
    }
}

impl Default for LibraryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with every bundled library
pub fn create_standard_registry() -> LibraryRegistry {
    let mut registry = LibraryRegistry::new();
    registry.register(stdlib::basic::create_basic_lib());
    registry.register(stdlib::math::create_math_lib());
    registry
}
