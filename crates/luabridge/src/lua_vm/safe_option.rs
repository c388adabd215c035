#[derive(Debug, Clone)]
pub struct SafeOption {
    /// Maximum number of value stack slots
    pub max_stack_size: usize,
    /// Maximum depth of nested calls (script and host functions alike)
    pub max_call_depth: usize,
    /// Userdata allocations between automatic collections
    pub gc_step_threshold: usize,
}

impl Default for SafeOption {
    fn default() -> Self {
        Self {
            max_stack_size: 1_000_000,
            max_call_depth: 200,
            gc_step_threshold: 1024,
        }
    }
}
