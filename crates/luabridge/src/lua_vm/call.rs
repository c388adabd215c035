// Call gateway and protected invocation.
//
// Calling convention: the callable sits immediately below its arguments.
// After the call the callable and the arguments are gone and the results
// start where the callable was, padded with nil or truncated to the
// requested count.

use super::call_info::{CallInfo, LuaFrame};
use super::execute::Flow;
use super::lua_state::MULTRET;
use super::{LuaError, LuaFullError, LuaResult, LuaState};
use crate::compiler;
use crate::lua_value::{LuaClosure, LuaFunction, LuaValue, NativeClosure};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::debug;

impl LuaState {
    /// Call the value below the top `nargs` values. Errors propagate to the
    /// caller with the stack left as it was at the point of failure; use
    /// [`protected_call`](Self::protected_call) when the callee may fail.
    pub fn call(&mut self, nargs: usize, nresults: i32) -> LuaResult<()> {
        let func_idx = self.callable_position(nargs, nresults)?;
        self.call_value(func_idx, nresults)?;
        Ok(())
    }

    /// Like [`call`](Self::call), but a failure restores the stack to its
    /// height before the callable was pushed and is returned as an owned
    /// error instead of leaving it pending in the state.
    pub fn protected_call(&mut self, nargs: usize, nresults: i32) -> Result<(), LuaFullError> {
        let result = match self.callable_position(nargs, nresults) {
            Ok(_) => self.pcall_raw(nargs, nresults),
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            let err = self.into_full_error(e);
            debug!(kind = %err.kind(), "protected call failed: {}", err);
            err
        })
    }

    /// Protected call keeping the error (message and raised value) in the
    /// state, for callers that forward it to scripts
    pub(crate) fn pcall_raw(&mut self, nargs: usize, nresults: i32) -> LuaResult<()> {
        let func_idx = self.stack.len() - nargs - 1;
        let depth = self.call_stack.len();
        let base = self.base;
        match self.call_value(func_idx, nresults) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.stack.truncate(func_idx);
                self.call_stack.truncate(depth);
                self.base = base;
                Err(e)
            }
        }
    }

    fn callable_position(&mut self, nargs: usize, nresults: i32) -> LuaResult<usize> {
        self.ensure_open()?;
        if nresults < MULTRET {
            return Err(self.error(format!("invalid result count {}", nresults)));
        }
        if self.stack.len() < self.base + nargs + 1 {
            return Err(self.error(format!(
                "not enough values on the stack for a call with {} arguments",
                nargs
            )));
        }
        Ok(self.stack.len() - nargs - 1)
    }

    /// Call the value at absolute position `func_idx` with everything above
    /// it as arguments. Returns the number of results left at `func_idx`.
    pub(crate) fn call_value(&mut self, func_idx: usize, nresults: i32) -> LuaResult<usize> {
        if self.call_stack.len() >= self.safe_option.max_call_depth {
            self.error("stack overflow");
            return Err(LuaError::StackOverflow);
        }

        let produced = match self.stack[func_idx].clone() {
            LuaValue::Function(LuaFunction::Lua(closure)) => self.call_lua(closure, func_idx)?,
            LuaValue::Function(LuaFunction::Native(closure)) => self.call_native(closure, func_idx)?,
            other => {
                let handler = self.get_metamethod(&other, "__call");
                match handler {
                    Some(handler @ LuaValue::Function(_)) => {
                        self.stack.insert(func_idx, handler);
                        return self.call_value(func_idx, nresults);
                    }
                    _ => {
                        let type_name = self.display_type_name(&other);
                        return Err(self.error(format!("attempt to call a {} value", type_name)));
                    }
                }
            }
        };

        // Results are the top `produced` values; move them down
        let first = self.stack.len() - produced;
        if first > func_idx {
            self.stack.drain(func_idx..first);
        }
        if nresults == MULTRET {
            return Ok(produced);
        }
        let wanted = nresults as usize;
        if func_idx + wanted > self.safe_option.max_stack_size {
            self.stack.truncate(func_idx);
            return Err(self.stack_overflow());
        }
        self.stack.resize(func_idx + wanted, LuaValue::Nil);
        Ok(wanted)
    }

    fn call_lua(&mut self, closure: Rc<LuaClosure>, func_idx: usize) -> LuaResult<usize> {
        let proto = closure.proto.clone();
        let mut args = self.stack.split_off(func_idx + 1).into_iter();
        self.stack.truncate(func_idx);

        let mut locals = Vec::with_capacity(proto.num_slots);
        for slot in 0..proto.num_slots {
            let value = if slot < proto.num_params {
                args.next().unwrap_or_default()
            } else {
                LuaValue::Nil
            };
            locals.push(Rc::new(RefCell::new(value)));
        }
        let varargs = if proto.is_vararg { args.collect() } else { Vec::new() };

        let frame = Rc::new(LuaFrame {
            closure,
            locals: RefCell::new(locals),
            varargs,
            line: Cell::new(proto.line_defined),
        });
        self.call_stack.push(CallInfo::Lua(frame.clone()));
        let saved_base = self.base;
        self.base = func_idx;

        let result = self.exec_block(&frame, &proto.body);

        self.call_stack.pop();
        self.base = saved_base;
        match result? {
            Flow::Return(n) => Ok(n),
            Flow::Normal | Flow::Break => Ok(0),
        }
    }

    fn call_native(&mut self, closure: Rc<NativeClosure>, func_idx: usize) -> LuaResult<usize> {
        let base = func_idx + 1;
        self.call_stack.push(CallInfo::Native(closure.clone()));
        let saved_base = self.base;
        self.base = base;

        let result = (closure.func)(self);

        self.call_stack.pop();
        self.base = saved_base;
        let n = result?;

        let available = self.stack.len().saturating_sub(base);
        if n > available {
            return Err(self.error(format!(
                "function '{}' returned {} results but pushed {}",
                closure.name, n, available
            )));
        }
        Ok(n)
    }

    // ===== Loading =====

    /// Compile `source` and push the chunk as a function. Nothing is pushed
    /// on failure.
    pub fn load(&mut self, source: &str, chunk_name: &str) -> LuaResult<()> {
        self.ensure_open()?;
        match compiler::compile(source, chunk_name) {
            Ok(proto) => {
                let chunk = LuaFunction::lua(Rc::new(proto), Vec::new());
                self.push_value(LuaValue::Function(chunk))
            }
            Err(msg) => {
                self.error_object = LuaValue::string(msg.as_str());
                self.error_msg = msg;
                Err(LuaError::CompileError)
            }
        }
    }

    /// Load and run a chunk, discarding its results
    pub fn do_string(&mut self, source: &str) -> Result<(), LuaFullError> {
        self.do_chunk(source, "[string]")
    }

    pub fn do_chunk(&mut self, source: &str, chunk_name: &str) -> Result<(), LuaFullError> {
        if let Err(e) = self.load(source, chunk_name) {
            return Err(self.into_full_error(e));
        }
        self.protected_call(0, 0)
    }

    pub fn do_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<(), LuaFullError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(source) => self.do_chunk(&source, &path.display().to_string()),
            Err(e) => Err(LuaFullError::new(
                LuaError::FileError,
                format!("cannot open {}: {}", path.display(), e),
            )),
        }
    }
}
