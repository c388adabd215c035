// Recursive-descent parser producing a resolved syntax tree.
mod lua_token_kind;
mod lua_tokenize;

use super::ast::*;
use super::func_state::FuncState;
use lua_token_kind::{LuaTokenData, LuaTokenKind, LuaTokenValue, token_text};
use lua_tokenize::LuaTokenize;
use smol_str::SmolStr;
use std::rc::Rc;

type ParseResult<T> = Result<T, String>;

const UNARY_PRIORITY: u8 = 12;

#[derive(Clone, Copy)]
enum InfixOp {
    Bin(BinOp),
    And,
    Or,
}

/// (operator, left priority, right priority)
fn infix_op(kind: LuaTokenKind) -> Option<(InfixOp, u8, u8)> {
    use LuaTokenKind::*;
    Some(match kind {
        TkOr => (InfixOp::Or, 1, 1),
        TkAnd => (InfixOp::And, 2, 2),
        TkEq => (InfixOp::Bin(BinOp::Eq), 3, 3),
        TkNe => (InfixOp::Bin(BinOp::Ne), 3, 3),
        TkLt => (InfixOp::Bin(BinOp::Lt), 3, 3),
        TkLe => (InfixOp::Bin(BinOp::Le), 3, 3),
        TkGt => (InfixOp::Bin(BinOp::Gt), 3, 3),
        TkGe => (InfixOp::Bin(BinOp::Ge), 3, 3),
        TkConcat => (InfixOp::Bin(BinOp::Concat), 9, 8),
        TkPlus => (InfixOp::Bin(BinOp::Add), 10, 10),
        TkMinus => (InfixOp::Bin(BinOp::Sub), 10, 10),
        TkMul => (InfixOp::Bin(BinOp::Mul), 11, 11),
        TkDiv => (InfixOp::Bin(BinOp::Div), 11, 11),
        TkIDiv => (InfixOp::Bin(BinOp::IDiv), 11, 11),
        TkMod => (InfixOp::Bin(BinOp::Mod), 11, 11),
        TkPow => (InfixOp::Bin(BinOp::Pow), 14, 13),
        _ => return None,
    })
}

fn unary_op(kind: LuaTokenKind) -> Option<UnOp> {
    match kind {
        LuaTokenKind::TkMinus => Some(UnOp::Neg),
        LuaTokenKind::TkNot => Some(UnOp::Not),
        LuaTokenKind::TkLen => Some(UnOp::Len),
        _ => None,
    }
}

/// Deepest syntactic nesting (blocks, function bodies, subexpressions)
/// accepted before the parser gives up instead of exhausting the native stack
pub const MAX_NESTING: usize = 200;

pub struct LuaParser<'a> {
    tokens: Vec<LuaTokenData>,
    pos: usize,
    chunk_name: &'a str,
    funcs: Vec<FuncState>,
    depth: usize,
}

impl<'a> LuaParser<'a> {
    /// Parse a whole chunk into the prototype of its main function
    pub fn parse_chunk(source: &str, chunk_name: &'a str) -> ParseResult<FunctionProto> {
        let tokens = LuaTokenize::new(source, chunk_name).tokenize()?;
        let mut parser = LuaParser {
            tokens,
            pos: 0,
            chunk_name,
            funcs: Vec::new(),
            depth: 0,
        };

        let mut main = FuncState::new(SmolStr::new_inline("main chunk"), 0);
        main.is_vararg = true;
        parser.funcs.push(main);

        let body = parser.block()?;
        if parser.kind() != LuaTokenKind::TkEof {
            return parser.error("'<eof>' expected");
        }
        let fs = parser.pop_func();
        Ok(parser.finish_proto(fs, body))
    }

    // ---- token helpers -----------------------------------------------------

    #[inline]
    fn current(&self) -> &LuaTokenData {
        &self.tokens[self.pos]
    }

    #[inline]
    fn kind(&self) -> LuaTokenKind {
        self.current().kind
    }

    #[inline]
    fn line(&self) -> u32 {
        self.current().line
    }

    fn peek_kind(&self) -> LuaTokenKind {
        self.tokens
            .get(self.pos + 1)
            .map(|t| t.kind)
            .unwrap_or(LuaTokenKind::TkEof)
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn test_next(&mut self, kind: LuaTokenKind) -> bool {
        if self.kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error<T>(&self, msg: &str) -> ParseResult<T> {
        let token = self.current();
        Err(format!(
            "{}:{}: {} near '{}'",
            self.chunk_name,
            token.line,
            msg,
            token.describe()
        ))
    }

    fn enter_level(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return self.error("too many nested levels");
        }
        Ok(())
    }

    #[inline]
    fn leave_level(&mut self) {
        self.depth -= 1;
    }

    fn expect(&mut self, kind: LuaTokenKind) -> ParseResult<()> {
        if self.test_next(kind) {
            Ok(())
        } else {
            self.error(&format!("'{}' expected", token_text(kind)))
        }
    }

    /// Expect a closing token, mentioning the opening one when it was on an
    /// earlier line
    fn expect_match(&mut self, what: LuaTokenKind, who: LuaTokenKind, line: u32) -> ParseResult<()> {
        if self.test_next(what) {
            return Ok(());
        }
        if line == self.line() {
            self.error(&format!("'{}' expected", token_text(what)))
        } else {
            self.error(&format!(
                "'{}' expected (to close '{}' at line {})",
                token_text(what),
                token_text(who),
                line
            ))
        }
    }

    fn expect_name(&mut self) -> ParseResult<SmolStr> {
        if let LuaTokenValue::Name(name) = &self.current().value {
            let name = name.clone();
            self.advance();
            return Ok(name);
        }
        self.error("<name> expected")
    }

    // ---- function state ----------------------------------------------------

    fn fs(&mut self) -> &mut FuncState {
        let last = self.funcs.len() - 1;
        &mut self.funcs[last]
    }

    fn pop_func(&mut self) -> FuncState {
        self.funcs
            .pop()
            .unwrap_or_else(|| FuncState::new(SmolStr::default(), 0))
    }

    fn finish_proto(&self, fs: FuncState, body: Block) -> FunctionProto {
        let (upvalue_names, upvalues) = fs.upvalues.into_iter().unzip();
        FunctionProto {
            num_slots: fs.local_names.len(),
            name: fs.name,
            source: SmolStr::new(self.chunk_name),
            line_defined: fs.line_defined,
            num_params: fs.num_params,
            is_vararg: fs.is_vararg,
            upvalues,
            local_names: fs.local_names,
            upvalue_names,
            body,
        }
    }

    fn resolve(&mut self, name: &SmolStr) -> Expr {
        let level = self.funcs.len() - 1;
        if let Some(slot) = self.funcs[level].find_local(name) {
            return Expr::Local(slot);
        }
        match self.resolve_upvalue(level, name) {
            Some(idx) => Expr::Upvalue(idx),
            None => Expr::Global(name.clone()),
        }
    }

    fn resolve_upvalue(&mut self, level: usize, name: &SmolStr) -> Option<usize> {
        if let Some(idx) = self.funcs[level].find_upvalue(name) {
            return Some(idx);
        }
        if level == 0 {
            return None;
        }
        let desc = match self.funcs[level - 1].find_local(name) {
            Some(slot) => UpvalueDesc::ParentLocal(slot),
            None => UpvalueDesc::ParentUpvalue(self.resolve_upvalue(level - 1, name)?),
        };
        Some(self.funcs[level].add_upvalue(name.clone(), desc))
    }

    fn new_local(&mut self, name: SmolStr) -> usize {
        let slot = self.fs().declare_local(name);
        self.fs().activate(slot);
        slot
    }

    // ---- statements --------------------------------------------------------

    fn block(&mut self) -> ParseResult<Block> {
        self.enter_level()?;
        let start = self.fs().open_block();
        let stats = self.statements()?;
        self.fs().close_block();
        self.leave_level();
        Ok(Block {
            stats,
            slots: start..self.fs().num_slots(),
        })
    }

    fn loop_block(&mut self) -> ParseResult<Block> {
        self.fs().loop_depth += 1;
        let block = self.block();
        self.fs().loop_depth -= 1;
        block
    }

    fn statements(&mut self) -> ParseResult<Vec<Stat>> {
        let mut stats = Vec::new();
        while !self.kind().is_block_end() {
            if self.kind() == LuaTokenKind::TkReturn {
                stats.push(self.return_stat()?);
                break;
            }
            if let Some(stat) = self.statement()? {
                stats.push(stat);
            }
        }
        Ok(stats)
    }

    fn statement(&mut self) -> ParseResult<Option<Stat>> {
        let line = self.line();
        let kind = match self.kind() {
            LuaTokenKind::TkSemicolon => {
                self.advance();
                return Ok(None);
            }
            LuaTokenKind::TkIf => self.if_stat(line)?,
            LuaTokenKind::TkWhile => {
                self.advance();
                let cond = self.expr()?;
                self.expect(LuaTokenKind::TkDo)?;
                let body = self.loop_block()?;
                self.expect_match(LuaTokenKind::TkEnd, LuaTokenKind::TkWhile, line)?;
                StatKind::While { cond, body }
            }
            LuaTokenKind::TkDo => {
                self.advance();
                let block = self.block()?;
                self.expect_match(LuaTokenKind::TkEnd, LuaTokenKind::TkDo, line)?;
                StatKind::Do(block)
            }
            LuaTokenKind::TkFor => self.for_stat(line)?,
            LuaTokenKind::TkRepeat => self.repeat_stat(line)?,
            LuaTokenKind::TkFunction => self.func_stat(line)?,
            LuaTokenKind::TkLocal => {
                self.advance();
                if self.test_next(LuaTokenKind::TkFunction) {
                    self.local_func_stat(line)?
                } else {
                    self.local_stat()?
                }
            }
            LuaTokenKind::TkBreak => {
                if self.fs().loop_depth == 0 {
                    return self.error("break outside a loop");
                }
                self.advance();
                StatKind::Break
            }
            LuaTokenKind::TkGoto | LuaTokenKind::TkDbColon => {
                return self.error("goto and labels are not supported");
            }
            _ => self.expr_stat()?,
        };
        Ok(Some(Stat { line, kind }))
    }

    fn return_stat(&mut self) -> ParseResult<Stat> {
        let line = self.line();
        self.advance();
        let exprs = if self.kind().is_block_end() || self.kind() == LuaTokenKind::TkSemicolon {
            Vec::new()
        } else {
            self.expr_list()?
        };
        self.test_next(LuaTokenKind::TkSemicolon);
        Ok(Stat {
            line,
            kind: StatKind::Return(exprs),
        })
    }

    fn if_stat(&mut self, line: u32) -> ParseResult<StatKind> {
        let mut branches = Vec::new();
        self.advance();
        let cond = self.expr()?;
        self.expect(LuaTokenKind::TkThen)?;
        branches.push((cond, self.block()?));

        while self.test_next(LuaTokenKind::TkElseIf) {
            let cond = self.expr()?;
            self.expect(LuaTokenKind::TkThen)?;
            branches.push((cond, self.block()?));
        }

        let else_block = if self.test_next(LuaTokenKind::TkElse) {
            Some(self.block()?)
        } else {
            None
        };
        self.expect_match(LuaTokenKind::TkEnd, LuaTokenKind::TkIf, line)?;
        Ok(StatKind::If { branches, else_block })
    }

    fn repeat_stat(&mut self, line: u32) -> ParseResult<StatKind> {
        self.advance();
        // The condition sees the body's locals, so the scope stays open
        self.fs().loop_depth += 1;
        let start = self.fs().open_block();
        let stats = self.statements()?;
        self.fs().loop_depth -= 1;
        self.expect_match(LuaTokenKind::TkUntil, LuaTokenKind::TkRepeat, line)?;
        let cond = self.expr()?;
        self.fs().close_block();
        let body = Block {
            stats,
            slots: start..self.fs().num_slots(),
        };
        Ok(StatKind::Repeat { body, cond })
    }

    fn for_stat(&mut self, line: u32) -> ParseResult<StatKind> {
        self.advance();
        let first = self.expect_name()?;
        let kind = match self.kind() {
            LuaTokenKind::TkAssign => {
                self.advance();
                let start = self.expr()?;
                self.expect(LuaTokenKind::TkComma)?;
                let limit = self.expr()?;
                let step = if self.test_next(LuaTokenKind::TkComma) {
                    Some(self.expr()?)
                } else {
                    None
                };
                self.expect(LuaTokenKind::TkDo)?;

                self.fs().loop_depth += 1;
                let slots_start = self.fs().open_block();
                let var = self.new_local(first);
                let stats = self.statements()?;
                self.fs().close_block();
                self.fs().loop_depth -= 1;
                let body = Block {
                    stats,
                    slots: slots_start..self.fs().num_slots(),
                };
                StatKind::NumericFor {
                    var,
                    start,
                    limit,
                    step,
                    body,
                }
            }
            LuaTokenKind::TkComma | LuaTokenKind::TkIn => {
                let mut names = vec![first];
                while self.test_next(LuaTokenKind::TkComma) {
                    names.push(self.expect_name()?);
                }
                self.expect(LuaTokenKind::TkIn)?;
                let exprs = self.expr_list()?;
                self.expect(LuaTokenKind::TkDo)?;

                let hidden = self.fs().declare_local(SmolStr::new_inline("(for iterator)"));
                self.fs().declare_local(SmolStr::new_inline("(for state)"));
                self.fs().declare_local(SmolStr::new_inline("(for control)"));

                self.fs().loop_depth += 1;
                let slots_start = self.fs().open_block();
                let vars = names.into_iter().map(|n| self.new_local(n)).collect();
                let stats = self.statements()?;
                self.fs().close_block();
                self.fs().loop_depth -= 1;
                let body = Block {
                    stats,
                    slots: slots_start..self.fs().num_slots(),
                };
                StatKind::GenericFor {
                    hidden,
                    vars,
                    exprs,
                    body,
                }
            }
            _ => return self.error("'=' or 'in' expected"),
        };
        self.expect_match(LuaTokenKind::TkEnd, LuaTokenKind::TkFor, line)?;
        Ok(kind)
    }

    fn func_stat(&mut self, line: u32) -> ParseResult<StatKind> {
        self.advance();
        let first = self.expect_name()?;
        let mut keys = Vec::new();
        let mut is_method = false;
        while self.test_next(LuaTokenKind::TkDot) {
            keys.push(self.expect_name()?);
        }
        if self.test_next(LuaTokenKind::TkColon) {
            keys.push(self.expect_name()?);
            is_method = true;
        }

        let name = keys.last().cloned().unwrap_or_else(|| first.clone());
        let proto = self.function_body(name, is_method, line)?;

        let base = self.resolve(&first);
        let target = match keys.pop() {
            None => self.to_target(base)?,
            Some(last) => {
                let obj = keys
                    .into_iter()
                    .fold(base, |obj, key| Expr::Index(Box::new(obj), Box::new(Expr::Str(key))));
                AssignTarget::Index(obj, Expr::Str(last))
            }
        };
        Ok(StatKind::Assign {
            targets: vec![target],
            exprs: vec![Expr::Function(proto)],
        })
    }

    fn local_func_stat(&mut self, line: u32) -> ParseResult<StatKind> {
        let name = self.expect_name()?;
        // Visible inside its own body for recursion
        let slot = self.new_local(name.clone());
        let proto = self.function_body(name, false, line)?;
        Ok(StatKind::LocalFunction { slot, proto })
    }

    fn local_stat(&mut self) -> ParseResult<StatKind> {
        let mut names = Vec::new();
        loop {
            names.push(self.expect_name()?);
            if self.test_next(LuaTokenKind::TkLt) {
                let attrib = self.expect_name()?;
                self.expect(LuaTokenKind::TkGt)?;
                match attrib.as_str() {
                    "const" => {}
                    "close" => return self.error("to-be-closed variables are not supported"),
                    other => return self.error(&format!("unknown attribute '{}'", other)),
                }
            }
            if !self.test_next(LuaTokenKind::TkComma) {
                break;
            }
        }

        let exprs = if self.test_next(LuaTokenKind::TkAssign) {
            self.expr_list()?
        } else {
            Vec::new()
        };

        let slots = names.into_iter().map(|n| self.new_local(n)).collect();
        Ok(StatKind::Local { slots, exprs })
    }

    fn expr_stat(&mut self) -> ParseResult<StatKind> {
        let first = self.suffixed_expr()?;
        if matches!(self.kind(), LuaTokenKind::TkAssign | LuaTokenKind::TkComma) {
            let mut targets = vec![self.to_target(first)?];
            while self.test_next(LuaTokenKind::TkComma) {
                let expr = self.suffixed_expr()?;
                targets.push(self.to_target(expr)?);
            }
            self.expect(LuaTokenKind::TkAssign)?;
            let exprs = self.expr_list()?;
            return Ok(StatKind::Assign { targets, exprs });
        }

        match first {
            Expr::Call(..) | Expr::MethodCall(..) => Ok(StatKind::Call(first)),
            _ => self.error("syntax error"),
        }
    }

    fn to_target(&self, expr: Expr) -> ParseResult<AssignTarget> {
        match expr {
            Expr::Local(slot) => Ok(AssignTarget::Local(slot)),
            Expr::Upvalue(idx) => Ok(AssignTarget::Upvalue(idx)),
            Expr::Global(name) => Ok(AssignTarget::Global(name)),
            Expr::Index(obj, key) => Ok(AssignTarget::Index(*obj, *key)),
            _ => self.error("syntax error"),
        }
    }

    fn function_body(&mut self, name: SmolStr, is_method: bool, line: u32) -> ParseResult<Rc<FunctionProto>> {
        self.enter_level()?;
        self.funcs.push(FuncState::new(name, line));
        let start = self.fs().open_block();
        if is_method {
            self.new_local(SmolStr::new_inline("self"));
            self.fs().num_params += 1;
        }

        self.expect(LuaTokenKind::TkLeftParen)?;
        if self.kind() != LuaTokenKind::TkRightParen {
            loop {
                match self.kind() {
                    LuaTokenKind::TkName => {
                        let param = self.expect_name()?;
                        self.new_local(param);
                        self.fs().num_params += 1;
                    }
                    LuaTokenKind::TkDots => {
                        self.advance();
                        self.fs().is_vararg = true;
                        break;
                    }
                    _ => return self.error("<name> expected"),
                }
                if !self.test_next(LuaTokenKind::TkComma) {
                    break;
                }
            }
        }
        self.expect(LuaTokenKind::TkRightParen)?;

        let stats = self.statements()?;
        self.fs().close_block();
        let slots = start..self.fs().num_slots();
        self.expect_match(LuaTokenKind::TkEnd, LuaTokenKind::TkFunction, line)?;

        let fs = self.pop_func();
        self.leave_level();
        Ok(Rc::new(self.finish_proto(fs, Block { stats, slots })))
    }

    // ---- expressions -------------------------------------------------------

    fn expr_list(&mut self) -> ParseResult<Vec<Expr>> {
        let mut exprs = vec![self.expr()?];
        while self.test_next(LuaTokenKind::TkComma) {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    fn expr(&mut self) -> ParseResult<Expr> {
        self.subexpr(0)
    }

    fn subexpr(&mut self, limit: u8) -> ParseResult<Expr> {
        self.enter_level()?;
        let mut left = match unary_op(self.kind()) {
            Some(op) => {
                self.advance();
                let operand = self.subexpr(UNARY_PRIORITY)?;
                match (op, operand) {
                    (UnOp::Neg, Expr::Integer(i)) => Expr::Integer(i.wrapping_neg()),
                    (UnOp::Neg, Expr::Float(f)) => Expr::Float(-f),
                    (op, operand) => Expr::Unary(op, Box::new(operand)),
                }
            }
            None => self.simple_expr()?,
        };

        while let Some((op, left_priority, right_priority)) = infix_op(self.kind()) {
            if left_priority <= limit {
                break;
            }
            self.advance();
            let right = self.subexpr(right_priority)?;
            left = match op {
                InfixOp::And => Expr::And(Box::new(left), Box::new(right)),
                InfixOp::Or => Expr::Or(Box::new(left), Box::new(right)),
                InfixOp::Bin(op) => Expr::Binary(op, Box::new(left), Box::new(right)),
            };
        }
        self.leave_level();
        Ok(left)
    }

    fn simple_expr(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let value = self.current().value.clone();
        let expr = match (self.kind(), value) {
            (LuaTokenKind::TkInt, LuaTokenValue::Int(i)) => Expr::Integer(i),
            (LuaTokenKind::TkFloat, LuaTokenValue::Float(f)) => Expr::Float(f),
            (LuaTokenKind::TkString, LuaTokenValue::Str(s)) => Expr::Str(s),
            (LuaTokenKind::TkNil, _) => Expr::Nil,
            (LuaTokenKind::TkTrue, _) => Expr::True,
            (LuaTokenKind::TkFalse, _) => Expr::False,
            (LuaTokenKind::TkDots, _) => {
                if !self.fs().is_vararg {
                    return self.error("cannot use '...' outside a vararg function");
                }
                Expr::Vararg
            }
            (LuaTokenKind::TkLeftBrace, _) => return self.table_constructor(),
            (LuaTokenKind::TkFunction, _) => {
                self.advance();
                let proto = self.function_body(SmolStr::new_inline("anonymous"), false, line)?;
                return Ok(Expr::Function(proto));
            }
            _ => return self.suffixed_expr(),
        };
        self.advance();
        Ok(expr)
    }

    fn primary_expr(&mut self) -> ParseResult<Expr> {
        match self.kind() {
            LuaTokenKind::TkName => {
                let name = self.expect_name()?;
                Ok(self.resolve(&name))
            }
            LuaTokenKind::TkLeftParen => {
                let line = self.line();
                self.advance();
                let inner = self.expr()?;
                self.expect_match(LuaTokenKind::TkRightParen, LuaTokenKind::TkLeftParen, line)?;
                Ok(if inner.is_multi() {
                    Expr::Paren(Box::new(inner))
                } else {
                    inner
                })
            }
            _ => self.error("unexpected symbol"),
        }
    }

    fn suffixed_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary_expr()?;
        loop {
            match self.kind() {
                LuaTokenKind::TkDot => {
                    self.advance();
                    let name = self.expect_name()?;
                    expr = Expr::Index(Box::new(expr), Box::new(Expr::Str(name)));
                }
                LuaTokenKind::TkLeftBracket => {
                    self.advance();
                    let key = self.expr()?;
                    self.expect(LuaTokenKind::TkRightBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(key));
                }
                LuaTokenKind::TkColon => {
                    self.advance();
                    let name = self.expect_name()?;
                    let args = self.call_args()?;
                    expr = Expr::MethodCall(Box::new(expr), name, args);
                }
                LuaTokenKind::TkLeftParen | LuaTokenKind::TkString | LuaTokenKind::TkLeftBrace => {
                    let args = self.call_args()?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_args(&mut self) -> ParseResult<Vec<Expr>> {
        let line = self.line();
        let value = self.current().value.clone();
        match (self.kind(), value) {
            (LuaTokenKind::TkString, LuaTokenValue::Str(s)) => {
                self.advance();
                Ok(vec![Expr::Str(s)])
            }
            (LuaTokenKind::TkLeftBrace, _) => Ok(vec![self.table_constructor()?]),
            (LuaTokenKind::TkLeftParen, _) => {
                self.advance();
                let args = if self.kind() == LuaTokenKind::TkRightParen {
                    Vec::new()
                } else {
                    self.expr_list()?
                };
                self.expect_match(LuaTokenKind::TkRightParen, LuaTokenKind::TkLeftParen, line)?;
                Ok(args)
            }
            _ => self.error("function arguments expected"),
        }
    }

    fn table_constructor(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        self.expect(LuaTokenKind::TkLeftBrace)?;
        self.enter_level()?;
        let mut fields = Vec::new();
        while self.kind() != LuaTokenKind::TkRightBrace {
            let field = if self.kind() == LuaTokenKind::TkName && self.peek_kind() == LuaTokenKind::TkAssign {
                let name = self.expect_name()?;
                self.advance();
                TableField::Named(name, self.expr()?)
            } else if self.test_next(LuaTokenKind::TkLeftBracket) {
                let key = self.expr()?;
                self.expect(LuaTokenKind::TkRightBracket)?;
                self.expect(LuaTokenKind::TkAssign)?;
                TableField::Keyed(key, self.expr()?)
            } else {
                TableField::Positional(self.expr()?)
            };
            fields.push(field);

            if !self.test_next(LuaTokenKind::TkComma) && !self.test_next(LuaTokenKind::TkSemicolon) {
                break;
            }
        }
        self.expect_match(LuaTokenKind::TkRightBrace, LuaTokenKind::TkLeftBrace, line)?;
        self.leave_level();
        Ok(Expr::Table(fields))
    }
}
