// Tree-walking executor.
//
// Every intermediate value is pushed on the value stack rather than held in
// a Rust local, so anything the collector may see mid-statement is rooted.
// Each statement leaves the stack as it found it; a `return` leaves its
// values on top for the call gateway to move into place.

mod arith;
mod metamethod;

use super::call_info::LuaFrame;
use super::lua_state::MULTRET;
use super::{LuaResult, LuaState};
use crate::compiler::ast::{AssignTarget, BinOp, Block, Expr, Stat, StatKind, TableField, UnOp, UpvalueDesc};
use crate::lua_value::{LuaFunction, LuaTableRef, LuaValue};
use std::rc::Rc;

use arith::ArithOp;

/// How a block was left
pub(crate) enum Flow {
    Normal,
    Break,
    /// `n` return values are on top of the stack
    Return(usize),
}

impl LuaState {
    pub(crate) fn exec_block(&mut self, frame: &Rc<LuaFrame>, block: &Block) -> LuaResult<Flow> {
        let flow = self.exec_stats(frame, &block.stats)?;
        self.clear_slots(frame, block);
        Ok(flow)
    }

    fn exec_stats(&mut self, frame: &Rc<LuaFrame>, stats: &[Stat]) -> LuaResult<Flow> {
        for stat in stats {
            frame.line.set(stat.line);
            self.check_gc();
            match self.exec_stat(frame, stat)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    /// Locals going out of scope stop being roots. Cells captured by a
    /// closure are detached instead of cleared.
    fn clear_slots(&mut self, frame: &LuaFrame, block: &Block) {
        let mut locals = frame.locals.borrow_mut();
        for slot in block.slots.clone() {
            let cell = &mut locals[slot];
            if Rc::strong_count(cell) > 1 {
                *cell = Rc::default();
            } else {
                *cell.borrow_mut() = LuaValue::Nil;
            }
        }
    }

    fn exec_stat(&mut self, frame: &Rc<LuaFrame>, stat: &Stat) -> LuaResult<Flow> {
        match &stat.kind {
            StatKind::Call(expr) => {
                let mark = self.stack.len();
                self.eval_call(frame, expr, 0)?;
                self.stack.truncate(mark);
            }
            StatKind::Local { slots, exprs } => {
                let mark = self.stack.len();
                self.eval_exprlist(frame, exprs, Some(slots.len()))?;
                for (i, slot) in slots.iter().enumerate() {
                    frame.define_local(*slot, self.stack[mark + i].clone());
                }
                self.stack.truncate(mark);
            }
            StatKind::LocalFunction { slot, proto } => {
                // Fresh cell first: the closure captures it for recursion
                frame.define_local(*slot, LuaValue::Nil);
                let closure = self.make_closure(frame, proto);
                frame.set_local(*slot, closure);
            }
            StatKind::Assign { targets, exprs } => self.exec_assign(frame, targets, exprs)?,
            StatKind::If { branches, else_block } => {
                for (cond, block) in branches {
                    if self.eval_value(frame, cond)?.is_truthy() {
                        return self.exec_block(frame, block);
                    }
                }
                if let Some(block) = else_block {
                    return self.exec_block(frame, block);
                }
            }
            StatKind::While { cond, body } => {
                while self.eval_value(frame, cond)?.is_truthy() {
                    match self.exec_block(frame, body)? {
                        Flow::Break => break,
                        Flow::Return(n) => return Ok(Flow::Return(n)),
                        Flow::Normal => {}
                    }
                }
            }
            StatKind::Repeat { body, cond } => loop {
                match self.exec_stats(frame, &body.stats)? {
                    Flow::Normal => {}
                    Flow::Break => {
                        self.clear_slots(frame, body);
                        break;
                    }
                    Flow::Return(n) => {
                        self.clear_slots(frame, body);
                        return Ok(Flow::Return(n));
                    }
                }
                // The condition still sees the body's locals
                let done = self.eval_value(frame, cond)?.is_truthy();
                self.clear_slots(frame, body);
                if done {
                    break;
                }
            },
            StatKind::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => return self.exec_numeric_for(frame, *var, start, limit, step.as_ref(), body),
            StatKind::GenericFor {
                hidden,
                vars,
                exprs,
                body,
            } => return self.exec_generic_for(frame, *hidden, vars, exprs, body),
            StatKind::Do(block) => return self.exec_block(frame, block),
            StatKind::Return(exprs) => {
                let n = self.eval_exprlist(frame, exprs, None)?;
                return Ok(Flow::Return(n));
            }
            StatKind::Break => return Ok(Flow::Break),
        }
        Ok(Flow::Normal)
    }

    fn exec_assign(&mut self, frame: &Rc<LuaFrame>, targets: &[AssignTarget], exprs: &[Expr]) -> LuaResult<()> {
        let mark = self.stack.len();
        // Table and key of indexed targets are evaluated before the values
        let mut target_slots = Vec::with_capacity(targets.len());
        for target in targets {
            if let AssignTarget::Index(obj, key) = target {
                target_slots.push(self.stack.len());
                self.eval(frame, obj)?;
                self.eval(frame, key)?;
            } else {
                target_slots.push(usize::MAX);
            }
        }
        let values = self.stack.len();
        self.eval_exprlist(frame, exprs, Some(targets.len()))?;

        for (i, target) in targets.iter().enumerate() {
            let value = self.stack[values + i].clone();
            match target {
                AssignTarget::Local(slot) => frame.set_local(*slot, value),
                AssignTarget::Upvalue(idx) => *frame.closure.upvalues[*idx].borrow_mut() = value,
                AssignTarget::Global(name) => self.globals.set_str(name, value),
                AssignTarget::Index(obj_expr, _) => {
                    let pos = target_slots[i];
                    let obj = self.stack[pos].clone();
                    let key = self.stack[pos + 1].clone();
                    self.check_indexable(&obj, obj_expr, true)?;
                    self.set_index(obj, key, value)?;
                }
            }
        }
        self.stack.truncate(mark);
        Ok(())
    }

    fn exec_numeric_for(
        &mut self,
        frame: &Rc<LuaFrame>,
        var: usize,
        start: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Block,
    ) -> LuaResult<Flow> {
        let start = self.eval_value(frame, start)?;
        let limit = self.eval_value(frame, limit)?;
        let step = match step {
            Some(expr) => self.eval_value(frame, expr)?,
            None => LuaValue::Integer(1),
        };
        let loop_kind = self.for_prep(start, limit, step)?;

        let run = |state: &mut LuaState, value: LuaValue| -> LuaResult<Option<Flow>> {
            frame.define_local(var, value);
            match state.exec_block(frame, body)? {
                Flow::Normal => Ok(None),
                Flow::Break => Ok(Some(Flow::Normal)),
                flow @ Flow::Return(_) => Ok(Some(flow)),
            }
        };

        match loop_kind {
            ForLoop::Skip => {}
            ForLoop::Int { start, step, count } => {
                let mut i = start;
                for n in 0..=count {
                    if let Some(flow) = run(self, LuaValue::Integer(i))? {
                        return Ok(flow);
                    }
                    if n < count {
                        i = i.wrapping_add(step);
                    }
                }
            }
            ForLoop::Float { start, limit, step } => {
                let mut x = start;
                while (step > 0.0 && x <= limit) || (step < 0.0 && x >= limit) {
                    if let Some(flow) = run(self, LuaValue::Float(x))? {
                        return Ok(flow);
                    }
                    x += step;
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_generic_for(
        &mut self,
        frame: &Rc<LuaFrame>,
        hidden: usize,
        vars: &[usize],
        exprs: &[Expr],
        body: &Block,
    ) -> LuaResult<Flow> {
        let mark = self.stack.len();
        self.eval_exprlist(frame, exprs, Some(3))?;
        for i in 0..3 {
            frame.define_local(hidden + i, self.stack[mark + i].clone());
        }
        self.stack.truncate(mark);

        let flow = loop {
            let func_idx = self.stack.len();
            for i in 0..3 {
                self.push_value(frame.local(hidden + i))?;
            }
            if !self.is_callable(&self.stack[func_idx]) {
                let type_name = self.display_type_name(&self.stack[func_idx]);
                return Err(self.error(format!("attempt to call a {} value (for iterator)", type_name)));
            }
            self.call_value(func_idx, vars.len() as i32)?;

            let control = self.stack[func_idx].clone();
            if control.is_nil() {
                self.stack.truncate(func_idx);
                break Flow::Normal;
            }
            frame.set_local(hidden + 2, control);
            for (i, slot) in vars.iter().enumerate() {
                frame.define_local(*slot, self.stack[func_idx + i].clone());
            }
            self.stack.truncate(func_idx);

            match self.exec_block(frame, body)? {
                Flow::Normal => {}
                Flow::Break => break Flow::Normal,
                flow @ Flow::Return(_) => break flow,
            }
        };
        for i in 0..3 {
            frame.set_local(hidden + i, LuaValue::Nil);
        }
        Ok(flow)
    }

    // ===== Expressions =====

    /// Evaluate and pop: for values consumed before anything else runs
    fn eval_value(&mut self, frame: &Rc<LuaFrame>, expr: &Expr) -> LuaResult<LuaValue> {
        self.eval(frame, expr)?;
        Ok(self.stack.pop().unwrap_or_default())
    }

    /// Evaluate to exactly one value pushed on the stack
    fn eval(&mut self, frame: &Rc<LuaFrame>, expr: &Expr) -> LuaResult<()> {
        let value = match expr {
            Expr::Nil => LuaValue::Nil,
            Expr::True => LuaValue::Boolean(true),
            Expr::False => LuaValue::Boolean(false),
            Expr::Integer(i) => LuaValue::Integer(*i),
            Expr::Float(f) => LuaValue::Float(*f),
            Expr::Str(s) => LuaValue::String(s.clone()),
            Expr::Vararg => frame.varargs.first().cloned().unwrap_or_default(),
            Expr::Local(slot) => frame.local(*slot),
            Expr::Upvalue(idx) => frame.closure.upvalues[*idx].borrow().clone(),
            Expr::Global(name) => self.globals.get_str(name),
            Expr::Function(proto) => self.make_closure(frame, proto),
            Expr::Call(..) | Expr::MethodCall(..) => {
                self.eval_call(frame, expr, 1)?;
                return Ok(());
            }
            Expr::Paren(inner) => return self.eval(frame, inner),
            Expr::Index(obj, key) => {
                self.eval(frame, obj)?;
                self.eval(frame, key)?;
                let key = self.stack.pop().unwrap_or_default();
                let target = self.stack.pop().unwrap_or_default();
                self.check_indexable(&target, obj, false)?;
                self.get_index(target, key)?
            }
            Expr::Binary(op, lhs, rhs) => {
                self.eval(frame, lhs)?;
                self.eval(frame, rhs)?;
                let b = self.stack.pop().unwrap_or_default();
                let a = self.stack.pop().unwrap_or_default();
                self.binary_op(*op, a, b)?
            }
            Expr::Unary(op, operand) => {
                let a = self.eval_value(frame, operand)?;
                match op {
                    UnOp::Not => LuaValue::Boolean(a.is_falsy()),
                    UnOp::Neg => self.arith_unm(a)?,
                    UnOp::Len => self.length(a)?,
                }
            }
            Expr::And(lhs, rhs) => {
                self.eval(frame, lhs)?;
                if self.stack.last().is_some_and(|v| v.is_truthy()) {
                    self.stack.pop();
                    return self.eval(frame, rhs);
                }
                return Ok(());
            }
            Expr::Or(lhs, rhs) => {
                self.eval(frame, lhs)?;
                if self.stack.last().is_some_and(|v| v.is_falsy()) {
                    self.stack.pop();
                    return self.eval(frame, rhs);
                }
                return Ok(());
            }
            Expr::Table(fields) => {
                self.eval_table(frame, fields)?;
                return Ok(());
            }
        };
        self.push_value(value)
    }

    /// Evaluate an expression that may produce several values; returns how
    /// many were pushed
    fn eval_multi(&mut self, frame: &Rc<LuaFrame>, expr: &Expr) -> LuaResult<usize> {
        match expr {
            Expr::Call(..) | Expr::MethodCall(..) => self.eval_call(frame, expr, MULTRET),
            Expr::Vararg => {
                if !self.check_stack(frame.varargs.len()) {
                    return Err(self.stack_overflow());
                }
                self.stack.extend(frame.varargs.iter().cloned());
                Ok(frame.varargs.len())
            }
            _ => {
                self.eval(frame, expr)?;
                Ok(1)
            }
        }
    }

    /// Push the values of an expression list. With `want`, exactly that many
    /// are pushed; otherwise the last expression is expanded.
    fn eval_exprlist(&mut self, frame: &Rc<LuaFrame>, exprs: &[Expr], want: Option<usize>) -> LuaResult<usize> {
        let mark = self.stack.len();
        if let Some((last, init)) = exprs.split_last() {
            for expr in init {
                self.eval(frame, expr)?;
            }
            match want {
                Some(n) if n <= init.len() => self.eval(frame, last)?,
                _ => {
                    self.eval_multi(frame, last)?;
                }
            }
        }
        let pushed = self.stack.len() - mark;
        match want {
            Some(n) => {
                self.stack.resize(mark + n, LuaValue::Nil);
                Ok(n)
            }
            None => Ok(pushed),
        }
    }

    /// Evaluate a call expression leaving `nresults` results (all of them
    /// with `MULTRET`). Returns the number of values pushed.
    fn eval_call(&mut self, frame: &Rc<LuaFrame>, expr: &Expr, nresults: i32) -> LuaResult<usize> {
        let func_idx = self.stack.len();
        let args = match expr {
            Expr::Call(callee, args) => {
                self.eval(frame, callee)?;
                if !self.is_callable(&self.stack[func_idx]) {
                    return Err(self.call_error(func_idx, callee));
                }
                args
            }
            Expr::MethodCall(obj, name, args) => {
                self.eval(frame, obj)?;
                let receiver = self.stack[func_idx].clone();
                self.check_indexable(&receiver, obj, false)?;
                let method = self.get_index(receiver.clone(), LuaValue::String(name.clone()))?;
                if !self.is_callable(&method) {
                    let type_name = self.display_type_name(&method);
                    return Err(self.error(format!("attempt to call a {} value (method '{}')", type_name, name)));
                }
                self.stack[func_idx] = method;
                self.push_value(receiver)?;
                args
            }
            _ => {
                self.eval(frame, expr)?;
                return Ok(1);
            }
        };
        self.eval_exprlist(frame, args, None)?;
        self.call_value(func_idx, nresults)
    }

    fn eval_table(&mut self, frame: &Rc<LuaFrame>, fields: &[TableField]) -> LuaResult<()> {
        let table = LuaTableRef::default();
        self.push_value(LuaValue::Table(table.clone()))?;
        let mut array_index = 1i64;
        for (i, field) in fields.iter().enumerate() {
            match field {
                TableField::Positional(expr) if i + 1 == fields.len() && expr.is_multi() => {
                    let mark = self.stack.len();
                    let n = self.eval_multi(frame, expr)?;
                    let mut t = table.borrow_mut();
                    for value in self.stack.drain(mark..mark + n) {
                        t.set_int(array_index, value);
                        array_index += 1;
                    }
                }
                TableField::Positional(expr) => {
                    let value = self.eval_value(frame, expr)?;
                    table.borrow_mut().set_int(array_index, value);
                    array_index += 1;
                }
                TableField::Named(name, expr) => {
                    let value = self.eval_value(frame, expr)?;
                    table.borrow_mut().set_str(name, value);
                }
                TableField::Keyed(key, expr) => {
                    self.eval(frame, key)?;
                    self.eval(frame, expr)?;
                    let value = self.stack.pop().unwrap_or_default();
                    let key = self.stack.pop().unwrap_or_default();
                    let result = table.borrow_mut().raw_set(key, value);
                    if let Err(msg) = result {
                        return Err(self.error(format!("table {}", msg)));
                    }
                }
            }
        }
        Ok(())
    }

    fn make_closure(&mut self, frame: &LuaFrame, proto: &Rc<crate::compiler::FunctionProto>) -> LuaValue {
        let upvalues = proto
            .upvalues
            .iter()
            .map(|desc| match desc {
                UpvalueDesc::ParentLocal(slot) => frame.cell(*slot),
                UpvalueDesc::ParentUpvalue(idx) => frame.closure.upvalues[*idx].clone(),
            })
            .collect();
        let closure = LuaValue::Function(LuaFunction::lua(proto.clone(), upvalues));
        self.gc.track(&closure);
        closure
    }

    fn binary_op(&mut self, op: BinOp, a: LuaValue, b: LuaValue) -> LuaResult<LuaValue> {
        let value = match op {
            BinOp::Add => self.arith(ArithOp::Add, a, b)?,
            BinOp::Sub => self.arith(ArithOp::Sub, a, b)?,
            BinOp::Mul => self.arith(ArithOp::Mul, a, b)?,
            BinOp::Div => self.arith(ArithOp::Div, a, b)?,
            BinOp::IDiv => self.arith(ArithOp::IDiv, a, b)?,
            BinOp::Mod => self.arith(ArithOp::Mod, a, b)?,
            BinOp::Pow => self.arith(ArithOp::Pow, a, b)?,
            BinOp::Concat => self.concat(a, b)?,
            BinOp::Eq => LuaValue::Boolean(self.values_equal(a, b)?),
            BinOp::Ne => LuaValue::Boolean(!self.values_equal(a, b)?),
            BinOp::Lt => LuaValue::Boolean(self.less_than(a, b)?),
            BinOp::Le => LuaValue::Boolean(self.less_equal(a, b)?),
            BinOp::Gt => LuaValue::Boolean(self.less_than(b, a)?),
            BinOp::Ge => LuaValue::Boolean(self.less_equal(b, a)?),
        };
        Ok(value)
    }

    // ===== Error descriptions =====

    /// `global 'x'`, `local 'x'`, `field 'x'`... for runtime error messages
    fn describe(frame_expr: &Expr, frame: Option<&LuaFrame>) -> Option<String> {
        match frame_expr {
            Expr::Global(name) => Some(format!("global '{}'", name)),
            Expr::Local(slot) => frame
                .and_then(|f| f.closure.proto.local_names.get(*slot))
                .map(|name| format!("local '{}'", name)),
            Expr::Upvalue(idx) => frame
                .and_then(|f| f.closure.proto.upvalue_names.get(*idx))
                .map(|name| format!("upvalue '{}'", name)),
            Expr::Index(_, key) => match key.as_ref() {
                Expr::Str(name) => Some(format!("field '{}'", name)),
                _ => None,
            },
            _ => None,
        }
    }

    fn current_lua_frame(&self) -> Option<Rc<LuaFrame>> {
        match self.call_stack.last()? {
            super::call_info::CallInfo::Lua(frame) => Some(frame.clone()),
            _ => None,
        }
    }

    fn call_error(&mut self, func_idx: usize, callee: &Expr) -> super::LuaError {
        let type_name = self.display_type_name(&self.stack[func_idx]);
        let frame = self.current_lua_frame();
        match Self::describe(callee, frame.as_deref()) {
            Some(what) => self.error(format!("attempt to call a {} value ({})", type_name, what)),
            None => self.error(format!("attempt to call a {} value", type_name)),
        }
    }

    /// Raise `attempt to index a nil value (global 'x')` before indexing
    /// something that has neither fields nor an index metamethod
    fn check_indexable(&mut self, target: &LuaValue, expr: &Expr, assigning: bool) -> LuaResult<()> {
        let event = if assigning { "__newindex" } else { "__index" };
        if target.is_table() || self.get_metamethod(target, event).is_some() {
            return Ok(());
        }
        let type_name = self.display_type_name(target);
        let frame = self.current_lua_frame();
        Err(match Self::describe(expr, frame.as_deref()) {
            Some(what) => self.error(format!("attempt to index a {} value ({})", type_name, what)),
            None => self.error(format!("attempt to index a {} value", type_name)),
        })
    }
}

/// Prepared numeric `for` loop
enum ForLoop {
    Skip,
    /// Runs `count + 1` times
    Int { start: i64, step: i64, count: u64 },
    Float { start: f64, limit: f64, step: f64 },
}

impl LuaState {
    fn for_prep(&mut self, start: LuaValue, limit: LuaValue, step: LuaValue) -> LuaResult<ForLoop> {
        use crate::lua_value::lua_convert::to_numeric;

        let Some(start) = to_numeric(&start) else {
            return Err(self.error("'for' initial value must be a number"));
        };
        let Some(limit) = to_numeric(&limit) else {
            return Err(self.error("'for' limit must be a number"));
        };
        let Some(step) = to_numeric(&step) else {
            return Err(self.error("'for' step must be a number"));
        };

        if let (LuaValue::Integer(start), LuaValue::Integer(step)) = (&start, &step) {
            let (start, step) = (*start, *step);
            if step == 0 {
                return Err(self.error("'for' step is zero"));
            }
            let limit = match limit {
                LuaValue::Integer(l) => l,
                LuaValue::Float(f) if f.is_nan() => return Ok(ForLoop::Skip),
                LuaValue::Float(f) => {
                    let clipped = if step > 0 { f.floor() } else { f.ceil() };
                    if clipped >= 9.223_372_036_854_775_807e18 {
                        i64::MAX
                    } else if clipped <= -9.223_372_036_854_775_808e18 {
                        i64::MIN
                    } else {
                        clipped as i64
                    }
                }
                _ => return Ok(ForLoop::Skip),
            };
            if (step > 0 && start > limit) || (step < 0 && start < limit) {
                return Ok(ForLoop::Skip);
            }
            let count = if step > 0 {
                (limit as u64).wrapping_sub(start as u64) / step as u64
            } else {
                (start as u64).wrapping_sub(limit as u64) / (step.unsigned_abs())
            };
            return Ok(ForLoop::Int { start, step, count });
        }

        let (start, limit, step) = (
            start.as_number().unwrap_or_default(),
            limit.as_number().unwrap_or_default(),
            step.as_number().unwrap_or_default(),
        );
        if step == 0.0 {
            return Err(self.error("'for' step is zero"));
        }
        Ok(ForLoop::Float { start, limit, step })
    }
}
