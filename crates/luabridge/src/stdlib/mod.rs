// Bundled script libraries: the base functions and `math`.

pub mod basic;
pub mod math;

use crate::lib_registry::{LibraryRegistry, create_standard_registry};
use crate::lua_vm::{LuaResult, LuaState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stdlib {
    Basic,
    Math,

    All,
}

impl LuaState {
    /// Install every bundled library
    pub fn open_libs(&mut self) -> LuaResult<()> {
        self.open_lib(Stdlib::All)
    }

    pub fn open_lib(&mut self, lib: Stdlib) -> LuaResult<()> {
        match lib {
            Stdlib::All => create_standard_registry().load_all(self),
            Stdlib::Basic => LibraryRegistry::new().load_module(self, &basic::create_basic_lib()),
            Stdlib::Math => LibraryRegistry::new().load_module(self, &math::create_math_lib()),
        }
    }
}
