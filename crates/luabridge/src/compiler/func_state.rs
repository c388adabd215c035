// Per-function compile state: active locals, block scopes and captured
// upvalues.

use super::ast::UpvalueDesc;
use smol_str::SmolStr;

pub struct FuncState {
    pub name: SmolStr,
    pub line_defined: u32,
    pub is_vararg: bool,
    pub num_params: usize,
    /// Enclosing loops, for validating `break`
    pub loop_depth: usize,
    /// Visible locals, innermost last: (name, slot)
    actives: Vec<(SmolStr, usize)>,
    /// Length of `actives` at the start of each open block
    block_starts: Vec<usize>,
    pub local_names: Vec<SmolStr>,
    pub upvalues: Vec<(SmolStr, UpvalueDesc)>,
}

impl FuncState {
    pub fn new(name: SmolStr, line_defined: u32) -> Self {
        FuncState {
            name,
            line_defined,
            is_vararg: false,
            num_params: 0,
            loop_depth: 0,
            actives: Vec::new(),
            block_starts: Vec::new(),
            local_names: Vec::new(),
            upvalues: Vec::new(),
        }
    }

    #[inline]
    pub fn num_slots(&self) -> usize {
        self.local_names.len()
    }

    /// Reserve a slot without making it visible yet
    pub fn declare_local(&mut self, name: SmolStr) -> usize {
        self.local_names.push(name);
        self.local_names.len() - 1
    }

    pub fn activate(&mut self, slot: usize) {
        let name = self.local_names[slot].clone();
        self.actives.push((name, slot));
    }

    pub fn open_block(&mut self) -> usize {
        self.block_starts.push(self.actives.len());
        self.num_slots()
    }

    pub fn close_block(&mut self) {
        if let Some(start) = self.block_starts.pop() {
            self.actives.truncate(start);
        }
    }

    pub fn find_local(&self, name: &str) -> Option<usize> {
        self.actives
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, slot)| *slot)
    }

    pub fn find_upvalue(&self, name: &str) -> Option<usize> {
        self.upvalues.iter().position(|(n, _)| n == name)
    }

    pub fn add_upvalue(&mut self, name: SmolStr, desc: UpvalueDesc) -> usize {
        self.upvalues.push((name, desc));
        self.upvalues.len() - 1
    }
}
