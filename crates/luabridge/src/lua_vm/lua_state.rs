// LuaState: one embedded engine instance.
//
// Everything crossing the host/script boundary goes through the value
// stack. Host functions see a window of it starting at their first
// argument: positive indices count from that base (1 = first argument),
// negative indices count back from the top (-1 = top). The host at top
// level sees the whole stack.

use super::call_info::CallInfo;
use super::{LuaError, LuaFullError, LuaResult, SafeOption};
use crate::gc::{GC, GcActions};
use crate::lua_value::lua_convert::{float_to_integer, to_numeric, to_str_coerced, truncate_to_integer};
use crate::lua_value::{
    LuaFunction, LuaTableRef, LuaValue, LuaValueKind, NativeClosure, UserdataRef,
};
use smol_str::SmolStr;
use std::rc::Rc;
use tracing::{debug, warn};

/// `nresults` value asking a call to keep every result
pub const MULTRET: i32 = -1;

pub struct LuaState {
    pub(crate) stack: Vec<LuaValue>,
    /// Absolute position of stack index 1 for the running host function
    pub(crate) base: usize,
    pub(crate) call_stack: Vec<CallInfo>,
    pub(crate) globals: LuaTableRef,
    /// Host-only table; type metatables live here keyed by type name
    pub(crate) registry: LuaTableRef,
    pub(crate) gc: GC,
    pub(crate) error_msg: String,
    pub(crate) error_object: LuaValue,
    pub(crate) safe_option: SafeOption,
    closed: bool,
}

impl LuaState {
    pub fn new(safe_option: SafeOption) -> Self {
        let globals = LuaTableRef::default();
        globals.set_str("_G", LuaValue::Table(globals.clone()));

        LuaState {
            stack: Vec::with_capacity(64),
            base: 0,
            call_stack: Vec::with_capacity(16),
            globals,
            registry: LuaTableRef::default(),
            gc: GC::new(),
            error_msg: String::new(),
            error_object: LuaValue::Nil,
            safe_option,
            closed: false,
        }
    }

    pub fn safe_option(&self) -> &SafeOption {
        &self.safe_option
    }

    pub fn globals(&self) -> &LuaTableRef {
        &self.globals
    }

    pub fn registry(&self) -> &LuaTableRef {
        &self.registry
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    // ===== Stack indices =====

    /// Resolve a stack index to an absolute position, `None` if it does not
    /// name an existing slot
    pub(crate) fn abs_position(&self, idx: i32) -> Option<usize> {
        if idx > 0 {
            let pos = self.base + idx as usize - 1;
            (pos < self.stack.len()).then_some(pos)
        } else if idx < 0 {
            let back = idx.unsigned_abs() as usize;
            (back <= self.stack.len() - self.base).then(|| self.stack.len() - back)
        } else {
            None
        }
    }

    /// Number of slots visible to the caller
    #[inline]
    pub fn top(&self) -> i32 {
        (self.stack.len() - self.base) as i32
    }

    /// Convert a relative index into the equivalent positive one
    pub fn abs_index(&self, idx: i32) -> i32 {
        if idx > 0 { idx } else { self.top() + idx + 1 }
    }

    /// Grow (with nils) or shrink the visible stack. Negative values count
    /// from the top: `set_top(-2)` pops one slot.
    pub fn set_top(&mut self, idx: i32) -> LuaResult<()> {
        let new_len = if idx >= 0 {
            self.base + idx as usize
        } else {
            let back = (-idx - 1) as usize;
            if back > self.stack.len() - self.base {
                return Err(self.error(format!("invalid new top {}", idx)));
            }
            self.stack.len() - back
        };
        if new_len > self.safe_option.max_stack_size {
            return Err(self.stack_overflow());
        }
        self.stack.resize(new_len, LuaValue::Nil);
        Ok(())
    }

    /// Remove the top `n` slots (never below the current frame)
    pub fn pop(&mut self, n: usize) {
        let new_len = self.stack.len().saturating_sub(n).max(self.base);
        self.stack.truncate(new_len);
    }

    /// Pop and return the top value
    pub fn pop_value(&mut self) -> Option<LuaValue> {
        if self.stack.len() > self.base {
            self.stack.pop()
        } else {
            None
        }
    }

    pub fn get(&self, idx: i32) -> Option<LuaValue> {
        self.abs_position(idx).map(|pos| self.stack[pos].clone())
    }

    /// Overwrite a slot without changing the height
    pub fn set(&mut self, idx: i32, value: LuaValue) -> LuaResult<()> {
        match self.abs_position(idx) {
            Some(pos) => {
                self.stack[pos] = value;
                Ok(())
            }
            None => Err(self.error(format!("invalid stack index {}", idx))),
        }
    }

    /// Remove the slot at `idx`, shifting the slots above it down
    pub fn remove(&mut self, idx: i32) -> LuaResult<()> {
        match self.abs_position(idx) {
            Some(pos) => {
                self.stack.remove(pos);
                Ok(())
            }
            None => Err(self.error(format!("invalid stack index {}", idx))),
        }
    }

    /// Move the top value into `idx`, shifting the slots above it up
    pub fn insert(&mut self, idx: i32) -> LuaResult<()> {
        match self.abs_position(idx) {
            Some(pos) => {
                if let Some(value) = self.stack.pop() {
                    self.stack.insert(pos, value);
                }
                Ok(())
            }
            None => Err(self.error(format!("invalid stack index {}", idx))),
        }
    }

    /// Push a copy of the value at `idx`
    pub fn push_copy(&mut self, idx: i32) -> LuaResult<()> {
        match self.get(idx) {
            Some(value) => self.push_value(value),
            None => Err(self.error(format!("invalid stack index {}", idx))),
        }
    }

    /// Whether `n` more slots fit under the stack limit
    pub fn check_stack(&self, n: usize) -> bool {
        self.stack.len() + n <= self.safe_option.max_stack_size
    }

    // ===== Push =====

    pub fn push_value(&mut self, value: LuaValue) -> LuaResult<()> {
        if self.stack.len() >= self.safe_option.max_stack_size {
            return Err(self.stack_overflow());
        }
        if matches!(value, LuaValue::Table(_) | LuaValue::Function(_)) {
            self.gc.track(&value);
        }
        self.stack.push(value);
        Ok(())
    }

    #[inline]
    pub fn push_nil(&mut self) -> LuaResult<()> {
        self.push_value(LuaValue::Nil)
    }

    #[inline]
    pub fn push_boolean(&mut self, b: bool) -> LuaResult<()> {
        self.push_value(LuaValue::Boolean(b))
    }

    #[inline]
    pub fn push_integer(&mut self, i: i64) -> LuaResult<()> {
        self.push_value(LuaValue::Integer(i))
    }

    #[inline]
    pub fn push_number(&mut self, n: f64) -> LuaResult<()> {
        self.push_value(LuaValue::Float(n))
    }

    pub fn push_string(&mut self, s: impl Into<SmolStr>) -> LuaResult<()> {
        self.push_value(LuaValue::String(s.into()))
    }

    /// Push a host function. `name` is used in argument errors.
    pub fn push_function<F>(&mut self, name: &str, f: F) -> LuaResult<()>
    where
        F: Fn(&mut LuaState) -> LuaResult<usize> + 'static,
    {
        self.push_value(LuaValue::Function(LuaFunction::native(name, f, Vec::new())))
    }

    /// Push a host function capturing the top `n` values as upvalues; the
    /// captured values are popped.
    pub fn push_closure<F>(&mut self, name: &str, f: F, n: usize) -> LuaResult<()>
    where
        F: Fn(&mut LuaState) -> LuaResult<usize> + 'static,
    {
        if n > self.stack.len() - self.base {
            return Err(self.error(format!("not enough values for {} upvalues", n)));
        }
        let upvalues = self.stack.split_off(self.stack.len() - n);
        self.push_value(LuaValue::Function(LuaFunction::native(name, f, upvalues)))
    }

    /// Upvalue `i` (1-based) of the running host closure
    pub fn upvalue(&self, i: usize) -> Option<LuaValue> {
        let closure = self.current_native()?;
        i.checked_sub(1)
            .and_then(|i| closure.upvalues.get(i))
            .cloned()
    }

    // ===== Conversion =====
    // These never raise: a mismatch is `None` and the stack is untouched.

    /// Numbers, and strings that parse as numbers
    pub fn to_number(&self, idx: i32) -> Option<f64> {
        to_numeric(&self.get(idx)?)?.as_number()
    }

    /// Like `to_number`, floats are truncated toward zero
    pub fn to_integer(&self, idx: i32) -> Option<i64> {
        match to_numeric(&self.get(idx)?)? {
            LuaValue::Integer(i) => Some(i),
            LuaValue::Float(f) => truncate_to_integer(f),
            _ => None,
        }
    }

    /// Strings, and numbers in their canonical text form
    pub fn to_string(&self, idx: i32) -> Option<String> {
        to_str_coerced(&self.get(idx)?)
    }

    /// Truthiness: only `nil`, `false` and absent slots are false
    pub fn to_boolean(&self, idx: i32) -> bool {
        self.get(idx).is_some_and(|v| v.is_truthy())
    }

    pub fn to_userdata(&self, idx: i32) -> Option<UserdataRef> {
        self.get(idx)?.as_userdata()
    }

    #[inline]
    pub fn to_value(&self, idx: i32) -> Option<LuaValue> {
        self.get(idx)
    }

    /// `tostring` of a slot, honoring `__tostring` and `__name`
    pub fn to_display(&mut self, idx: i32) -> LuaResult<String> {
        let value = self.get(idx).unwrap_or_default();
        self.tostring_value(&value)
    }

    // ===== Type tests =====

    pub fn type_of(&self, idx: i32) -> Option<LuaValueKind> {
        self.get(idx).map(|v| v.kind())
    }

    /// Script-level type name, `"no value"` for an absent slot
    pub fn type_name(&self, idx: i32) -> &'static str {
        self.type_of(idx).map_or("no value", |k| k.type_name())
    }

    pub fn is_none(&self, idx: i32) -> bool {
        self.abs_position(idx).is_none()
    }

    pub fn is_nil(&self, idx: i32) -> bool {
        self.type_of(idx) == Some(LuaValueKind::Nil)
    }

    pub fn is_boolean(&self, idx: i32) -> bool {
        self.type_of(idx) == Some(LuaValueKind::Boolean)
    }

    pub fn is_number(&self, idx: i32) -> bool {
        matches!(self.type_of(idx), Some(LuaValueKind::Integer | LuaValueKind::Float))
    }

    pub fn is_integer(&self, idx: i32) -> bool {
        self.type_of(idx) == Some(LuaValueKind::Integer)
    }

    pub fn is_string(&self, idx: i32) -> bool {
        self.type_of(idx) == Some(LuaValueKind::String)
    }

    pub fn is_table(&self, idx: i32) -> bool {
        self.type_of(idx) == Some(LuaValueKind::Table)
    }

    pub fn is_function(&self, idx: i32) -> bool {
        self.type_of(idx) == Some(LuaValueKind::Function)
    }

    pub fn is_userdata(&self, idx: i32) -> bool {
        self.type_of(idx) == Some(LuaValueKind::Userdata)
    }

    // ===== Host function arguments =====

    /// Argument `index` (1-based) of the running host function
    pub fn get_arg(&self, index: usize) -> Option<LuaValue> {
        let pos = self.base + index.checked_sub(1)?;
        self.stack.get(pos).cloned()
    }

    pub fn arg_count(&self) -> usize {
        self.stack.len() - self.base
    }

    pub(crate) fn current_native(&self) -> Option<&Rc<NativeClosure>> {
        match self.call_stack.last()? {
            CallInfo::Native(func) => Some(func),
            CallInfo::Lua(_) => None,
        }
    }

    fn current_function_name(&self) -> SmolStr {
        self.current_native()
            .map(|f| f.name.clone())
            .unwrap_or_else(|| SmolStr::new_inline("?"))
    }

    /// Raise `bad argument #arg to 'name' (extra)`
    pub fn arg_error(&mut self, arg: usize, extra: &str) -> LuaError {
        let name = self.current_function_name();
        self.error(format!("bad argument #{} to '{}' ({})", arg, name, extra))
    }

    pub(crate) fn type_error(&mut self, arg: usize, expected: &str) -> LuaError {
        let got = match self.get_arg(arg) {
            Some(value) => self.display_type_name(&value),
            None => "no value".to_string(),
        };
        self.arg_error(arg, &format!("{} expected, got {}", expected, got))
    }

    pub fn check_integer(&mut self, arg: usize) -> LuaResult<i64> {
        match self.get_arg(arg).as_ref().and_then(to_numeric) {
            Some(LuaValue::Integer(i)) => Ok(i),
            Some(LuaValue::Float(f)) => match float_to_integer(f) {
                Some(i) => Ok(i),
                None => Err(self.arg_error(arg, "number has no integer representation")),
            },
            _ => Err(self.type_error(arg, "number")),
        }
    }

    /// `check_integer`, or `default` when the argument is absent or nil
    pub fn opt_integer(&mut self, arg: usize, default: i64) -> LuaResult<i64> {
        match self.get_arg(arg) {
            None | Some(LuaValue::Nil) => Ok(default),
            Some(_) => self.check_integer(arg),
        }
    }

    pub fn check_number(&mut self, arg: usize) -> LuaResult<f64> {
        match self.get_arg(arg).as_ref().and_then(to_numeric) {
            Some(n) => Ok(n.as_number().unwrap_or_default()),
            None => Err(self.type_error(arg, "number")),
        }
    }

    pub fn check_string(&mut self, arg: usize) -> LuaResult<String> {
        match self.get_arg(arg).as_ref().and_then(to_str_coerced) {
            Some(s) => Ok(s),
            None => Err(self.type_error(arg, "string")),
        }
    }

    pub fn check_table(&mut self, arg: usize) -> LuaResult<LuaTableRef> {
        match self.get_arg(arg) {
            Some(LuaValue::Table(t)) => Ok(t),
            _ => Err(self.type_error(arg, "table")),
        }
    }

    /// Any value, including nil, but not an absent argument
    pub fn check_any(&mut self, arg: usize) -> LuaResult<LuaValue> {
        match self.get_arg(arg) {
            Some(value) => Ok(value),
            None => Err(self.arg_error(arg, "value expected")),
        }
    }

    // ===== Tables =====

    pub fn new_table(&mut self) -> LuaResult<()> {
        self.push_value(LuaValue::Table(LuaTableRef::default()))
    }

    /// `t[key] = v` where `t` is at `idx` and `v` is the top value, which is
    /// popped. Honors `__newindex`.
    pub fn set_field(&mut self, idx: i32, key: &str) -> LuaResult<()> {
        let target = self.index_value(idx)?;
        let value = self.pop_value().unwrap_or_default();
        self.set_index(target, LuaValue::string(key), value)
    }

    /// Push `t[key]` where `t` is at `idx`. Honors `__index`.
    pub fn get_field(&mut self, idx: i32, key: &str) -> LuaResult<LuaValueKind> {
        let target = self.index_value(idx)?;
        let value = self.get_index(target, LuaValue::string(key))?;
        let kind = value.kind();
        self.push_value(value)?;
        Ok(kind)
    }

    /// Length without metamethods: string bytes, table border, else 0
    pub fn raw_len(&self, idx: i32) -> usize {
        match self.get(idx) {
            Some(LuaValue::String(s)) => s.len(),
            Some(LuaValue::Table(t)) => t.borrow().len() as usize,
            _ => 0,
        }
    }

    /// Pop a table (or nil) and make it the metatable of the value at `idx`
    pub fn set_metatable(&mut self, idx: i32) -> LuaResult<()> {
        let target = self.index_value(idx)?;
        let metatable = match self.pop_value() {
            Some(LuaValue::Table(t)) => Some(t),
            Some(LuaValue::Nil) | None => None,
            Some(other) => {
                return Err(self.error(format!("metatable must be a table, got {}", other.type_name())));
            }
        };
        self.set_metatable_of(&target, metatable)
    }

    /// Push the metatable of the value at `idx`; pushes nothing and returns
    /// false when it has none
    pub fn get_metatable(&mut self, idx: i32) -> LuaResult<bool> {
        let target = self.index_value(idx)?;
        match self.metatable_of(&target) {
            Some(mt) => {
                self.push_value(LuaValue::Table(mt))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn set_metatable_of(&mut self, target: &LuaValue, metatable: Option<LuaTableRef>) -> LuaResult<()> {
        match target {
            LuaValue::Table(t) => {
                t.borrow_mut().set_metatable(metatable);
                Ok(())
            }
            LuaValue::Userdata(handle) => match self.gc.get_mut(*handle) {
                Some(entry) => {
                    entry.metatable = metatable;
                    Ok(())
                }
                None => Err(self.error("attempt to use a released userdata")),
            },
            other => Err(self.error(format!("cannot set metatable of a {} value", other.type_name()))),
        }
    }

    fn index_value(&mut self, idx: i32) -> LuaResult<LuaValue> {
        match self.get(idx) {
            Some(value) => Ok(value),
            None => Err(self.error(format!("invalid stack index {}", idx))),
        }
    }

    // ===== Globals =====

    /// Push the named global, nil when it is not defined
    pub fn get_global(&mut self, name: &str) -> LuaResult<LuaValueKind> {
        let value = self.globals.get_str(name);
        let kind = value.kind();
        self.push_value(value)?;
        Ok(kind)
    }

    /// Pop the top value and bind it to `name`
    pub fn set_global(&mut self, name: &str) -> LuaResult<()> {
        match self.pop_value() {
            Some(value) => {
                self.globals.set_str(name, value);
                Ok(())
            }
            None => Err(self.error(format!("no value to assign to global '{}'", name))),
        }
    }

    /// Read a global without touching the stack
    pub fn global_value(&self, name: &str) -> LuaValue {
        self.globals.get_str(name)
    }

    /// Bind a host function as a global
    pub fn register<F>(&mut self, name: &str, f: F) -> LuaResult<()>
    where
        F: Fn(&mut LuaState) -> LuaResult<usize> + 'static,
    {
        self.push_function(name, f)?;
        self.set_global(name)
    }

    // ===== Errors =====

    /// Record a runtime error and return the matching `LuaError`.
    ///
    /// The message gets the position of the nearest script frame: the
    /// running script for engine errors, the calling script for errors
    /// raised by a host function.
    #[cold]
    #[inline(never)]
    pub fn error(&mut self, msg: impl Into<String>) -> LuaError {
        let msg = msg.into();
        let location = self.location_at_level(1);
        let full = if location.is_empty() {
            msg
        } else {
            format!("{} {}", location, msg)
        };
        self.error_object = LuaValue::string(full.as_str());
        self.error_msg = full;
        LuaError::RuntimeError
    }

    /// Raise an arbitrary value (the `error` builtin with a non-string)
    #[cold]
    pub fn error_with_object(&mut self, obj: LuaValue) -> LuaError {
        self.error_msg = match to_str_coerced(&obj) {
            Some(s) => s,
            None => format!("(error object is a {} value)", obj.type_name()),
        };
        self.error_object = obj;
        LuaError::RuntimeError
    }

    /// `source:line:` of the script frame `level` frames above the running
    /// host function, or of the running script frame itself when no host
    /// function is active. Empty when there is no such script frame.
    pub(crate) fn location_at_level(&self, level: usize) -> String {
        let mut frames = self.call_stack.iter().rev();
        let skip = match self.call_stack.last() {
            Some(CallInfo::Native(_)) => level,
            _ => level.saturating_sub(1),
        };
        match frames.nth(skip) {
            Some(ci) if ci.is_lua() => ci.location(),
            _ => String::new(),
        }
    }

    #[cold]
    pub(crate) fn stack_overflow(&mut self) -> LuaError {
        self.error(format!(
            "stack overflow (limit of {} slots)",
            self.safe_option.max_stack_size
        ));
        LuaError::StackOverflow
    }

    /// Last error message, leaving it in place
    pub fn error_message(&self) -> &str {
        &self.error_msg
    }

    /// Take the pending error out of the state
    pub fn into_full_error(&mut self, kind: LuaError) -> LuaFullError {
        self.error_object = LuaValue::Nil;
        LuaFullError::new(kind, std::mem::take(&mut self.error_msg))
    }

    pub fn clear_error(&mut self) {
        self.error_msg.clear();
        self.error_object = LuaValue::Nil;
    }

    // ===== Garbage collection =====

    /// Run a full collection cycle, including the finalizers it triggers
    pub fn collect_garbage(&mut self) {
        if self.gc.running {
            return;
        }
        self.gc.running = true;
        let roots = self.gc_roots();
        let live_before = self.gc.live();
        let actions = self.gc.full_collect(&roots);
        drop(roots);
        debug!(
            live_before,
            live_after = self.gc.live(),
            finalizers = actions.to_finalize.len(),
            "gc cycle"
        );
        self.run_finalizers(actions);
        self.gc.running = false;
    }

    /// Collect when enough userdata was allocated since the last cycle
    #[inline]
    pub(crate) fn check_gc(&mut self) {
        if self.gc.should_collect(self.safe_option.gc_step_threshold) {
            self.collect_garbage();
        }
    }

    /// Userdata objects still held by the arena (including finalized ones
    /// awaiting release)
    pub fn live_userdata(&self) -> usize {
        self.gc.live()
    }

    pub fn gc_stats(&self) -> crate::gc::GcStats {
        *self.gc.stats()
    }

    fn gc_roots(&self) -> Vec<LuaValue> {
        let mut roots = Vec::with_capacity(self.stack.len() + 8);
        roots.extend(self.stack.iter().cloned());
        roots.push(LuaValue::Table(self.globals.clone()));
        roots.push(LuaValue::Table(self.registry.clone()));
        roots.push(self.error_object.clone());
        for ci in &self.call_stack {
            match ci {
                CallInfo::Lua(frame) => {
                    roots.push(LuaValue::Function(LuaFunction::Lua(frame.closure.clone())));
                    roots.extend(frame.locals.borrow().iter().map(|cell| cell.borrow().clone()));
                    roots.extend(frame.varargs.iter().cloned());
                }
                CallInfo::Native(func) => {
                    roots.push(LuaValue::Function(LuaFunction::Native(func.clone())));
                }
            }
        }
        roots
    }

    /// Call each `__gc` with its object; failures are logged and dropped
    fn run_finalizers(&mut self, actions: GcActions) {
        for (handle, gc_fn) in actions.to_finalize {
            let top = self.stack.len();
            let pushed = self
                .push_value(gc_fn)
                .and_then(|_| self.push_value(LuaValue::Userdata(handle)));
            let result = match pushed {
                Ok(()) => self.pcall_raw(1, 0),
                Err(e) => {
                    self.stack.truncate(top);
                    Err(e)
                }
            };
            if let Err(e) = result {
                let err = self.into_full_error(e);
                let type_name = self.userdata_type_name(handle).unwrap_or("?").to_string();
                warn!(type_name = %type_name, "error in __gc metamethod: {}", err);
            }
        }
    }

    /// Finalize every remaining userdata (newest first), release the arena
    /// and drop the global state. Runs at most once; also run on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.gc.running = true;
        let actions = self.gc.finalize_all();
        debug!(finalizers = actions.to_finalize.len(), "closing state");
        self.run_finalizers(actions);
        self.gc.release_all();

        let roots = self.gc_roots();
        self.stack.clear();
        self.call_stack.clear();
        self.base = 0;
        self.error_object = LuaValue::Nil;
        // Also empties the global table, which refers to itself through `_G`
        self.gc.break_cycles(roots);
        self.gc.running = false;
        debug!(freed = self.gc.stats().freed, "state closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Fails once the state is closed. Finalizers running inside
    /// [`close`](Self::close) still get a usable state.
    pub(crate) fn ensure_open(&mut self) -> LuaResult<()> {
        if self.closed && !self.gc.running {
            return Err(self.error("attempt to use a closed state"));
        }
        Ok(())
    }
}

impl Default for LuaState {
    fn default() -> Self {
        Self::new(SafeOption::default())
    }
}

impl Drop for LuaState {
    fn drop(&mut self) {
        self.close();
    }
}
