// Activation records kept on the call stack. They are also collector roots:
// a running frame keeps its closure, locals and varargs alive.

use crate::lua_value::{LuaClosure, LuaValue, NativeClosure, UpvalueCell};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub(crate) struct LuaFrame {
    pub closure: Rc<LuaClosure>,
    /// One shared cell per slot so closures can capture them
    pub locals: RefCell<Vec<UpvalueCell>>,
    pub varargs: Vec<LuaValue>,
    /// Line of the statement being executed
    pub line: Cell<u32>,
}

impl LuaFrame {
    pub fn local(&self, slot: usize) -> LuaValue {
        self.locals.borrow()[slot].borrow().clone()
    }

    pub fn set_local(&self, slot: usize, value: LuaValue) {
        *self.locals.borrow()[slot].borrow_mut() = value;
    }

    /// Store into a slot that a new declaration owns. A cell still shared
    /// with a closure from an earlier activation is replaced, not written.
    pub fn define_local(&self, slot: usize, value: LuaValue) {
        let mut locals = self.locals.borrow_mut();
        if Rc::strong_count(&locals[slot]) > 1 {
            locals[slot] = Rc::new(RefCell::new(value));
        } else {
            *locals[slot].borrow_mut() = value;
        }
    }

    pub fn cell(&self, slot: usize) -> UpvalueCell {
        self.locals.borrow()[slot].clone()
    }
}

#[derive(Clone)]
pub(crate) enum CallInfo {
    Lua(Rc<LuaFrame>),
    Native(Rc<NativeClosure>),
}

impl CallInfo {
    pub fn is_lua(&self) -> bool {
        matches!(self, CallInfo::Lua(_))
    }

    /// `source:line:` of a script frame, empty for host frames
    pub fn location(&self) -> String {
        match self {
            CallInfo::Lua(frame) => {
                format!("{}:{}:", frame.closure.proto.source, frame.line.get())
            }
            CallInfo::Native(_) => String::new(),
        }
    }
}
