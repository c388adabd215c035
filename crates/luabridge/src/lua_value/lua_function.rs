// Callable values: script closures produced by the compiler, and host
// functions exposed to scripts.

use super::LuaValue;
use crate::compiler::FunctionProto;
use crate::lua_vm::{LuaResult, LuaState};
use smol_str::SmolStr;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Host function signature: arguments are read from the stack (positions
/// 1..n of the fresh frame), results are pushed, and the count of pushed
/// results is returned.
pub type CFunction = fn(&mut LuaState) -> LuaResult<usize>;

/// Boxed form of [`CFunction`] that may capture host state.
pub type RustCallback = dyn Fn(&mut LuaState) -> LuaResult<usize>;

/// Shared variable captured by script closures
pub type UpvalueCell = Rc<RefCell<LuaValue>>;

pub struct LuaClosure {
    pub(crate) proto: Rc<FunctionProto>,
    pub(crate) upvalues: Vec<UpvalueCell>,
}

pub struct NativeClosure {
    pub(crate) name: SmolStr,
    pub(crate) func: Box<RustCallback>,
    /// Values captured at creation, readable through `LuaState::upvalue`
    pub(crate) upvalues: Vec<LuaValue>,
}

impl NativeClosure {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone)]
pub enum LuaFunction {
    Lua(Rc<LuaClosure>),
    Native(Rc<NativeClosure>),
}

impl LuaFunction {
    pub fn native<F>(name: &str, func: F, upvalues: Vec<LuaValue>) -> Self
    where
        F: Fn(&mut LuaState) -> LuaResult<usize> + 'static,
    {
        LuaFunction::Native(Rc::new(NativeClosure {
            name: SmolStr::new(name),
            func: Box::new(func),
            upvalues,
        }))
    }

    pub(crate) fn lua(proto: Rc<FunctionProto>, upvalues: Vec<UpvalueCell>) -> Self {
        LuaFunction::Lua(Rc::new(LuaClosure { proto, upvalues }))
    }

    pub fn is_native(&self) -> bool {
        matches!(self, LuaFunction::Native(_))
    }

    pub fn ptr_eq(&self, other: &LuaFunction) -> bool {
        match (self, other) {
            (LuaFunction::Lua(a), LuaFunction::Lua(b)) => Rc::ptr_eq(a, b),
            (LuaFunction::Native(a), LuaFunction::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_ptr(&self) -> usize {
        match self {
            LuaFunction::Lua(c) => Rc::as_ptr(c) as *const u8 as usize,
            LuaFunction::Native(c) => Rc::as_ptr(c) as *const u8 as usize,
        }
    }

    /// Name used in argument errors (`bad argument #1 to 'name'`)
    pub fn name(&self) -> &str {
        match self {
            LuaFunction::Lua(c) => &c.proto.name,
            LuaFunction::Native(c) => &c.name,
        }
    }
}

impl fmt::Debug for LuaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaFunction::Lua(_) => write!(f, "function: {:#x}", self.as_ptr()),
            LuaFunction::Native(c) => write!(f, "function: builtin '{}' {:#x}", c.name, self.as_ptr()),
        }
    }
}
