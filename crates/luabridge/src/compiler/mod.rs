// Front end: source text -> resolved syntax tree
pub(crate) mod ast;
mod func_state;
mod parser;

pub use ast::FunctionProto;
use parser::LuaParser;

/// Compile a chunk. Errors are formatted as `chunk:line: message near 'token'`.
pub fn compile(source: &str, chunk_name: &str) -> Result<FunctionProto, String> {
    LuaParser::parse_chunk(source, chunk_name)
}
