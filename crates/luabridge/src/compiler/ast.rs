// Syntax tree consumed by the executor. Names are already resolved:
// locals are frame slots, upvalues are indices into the closure's captures,
// everything else is a global.

use smol_str::SmolStr;
use std::ops::Range;
use std::rc::Rc;

pub struct FunctionProto {
    pub name: SmolStr,
    pub source: SmolStr,
    pub line_defined: u32,
    pub num_params: usize,
    pub is_vararg: bool,
    pub num_slots: usize,
    pub upvalues: Vec<UpvalueDesc>,
    /// Slot -> declared name, for error messages
    pub local_names: Vec<SmolStr>,
    pub upvalue_names: Vec<SmolStr>,
    pub body: Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvalueDesc {
    /// Captures a local slot of the enclosing function
    ParentLocal(usize),
    /// Re-captures an upvalue of the enclosing function
    ParentUpvalue(usize),
}

pub struct Block {
    pub stats: Vec<Stat>,
    /// Slots declared inside this block (including nested blocks); cleared
    /// when the block is left
    pub slots: Range<usize>,
}

pub struct Stat {
    pub line: u32,
    pub kind: StatKind,
}

pub enum StatKind {
    Call(Expr),
    Local {
        slots: Vec<usize>,
        exprs: Vec<Expr>,
    },
    LocalFunction {
        slot: usize,
        proto: Rc<FunctionProto>,
    },
    Assign {
        targets: Vec<AssignTarget>,
        exprs: Vec<Expr>,
    },
    If {
        branches: Vec<(Expr, Block)>,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Repeat {
        body: Block,
        cond: Expr,
    },
    NumericFor {
        var: usize,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },
    GenericFor {
        /// First of three hidden slots: iterator, state, control
        hidden: usize,
        vars: Vec<usize>,
        exprs: Vec<Expr>,
        body: Block,
    },
    Do(Block),
    Return(Vec<Expr>),
    Break,
}

pub enum AssignTarget {
    Local(usize),
    Upvalue(usize),
    Global(SmolStr),
    Index(Expr, Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Len,
}

pub enum TableField {
    Positional(Expr),
    Named(SmolStr, Expr),
    Keyed(Expr, Expr),
}

pub enum Expr {
    Nil,
    True,
    False,
    Integer(i64),
    Float(f64),
    Str(SmolStr),
    Vararg,
    Local(usize),
    Upvalue(usize),
    Global(SmolStr),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    MethodCall(Box<Expr>, SmolStr, Vec<Expr>),
    Function(Rc<FunctionProto>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Table(Vec<TableField>),
    /// Parenthesised expression: truncates multiple results to one
    Paren(Box<Expr>),
}

impl Expr {
    /// Calls and `...` can produce a variable number of values
    pub fn is_multi(&self) -> bool {
        matches!(self, Expr::Call(..) | Expr::MethodCall(..) | Expr::Vararg)
    }
}
