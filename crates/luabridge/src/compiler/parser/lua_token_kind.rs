use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaTokenKind {
    // keywords
    TkAnd,
    TkBreak,
    TkDo,
    TkElse,
    TkElseIf,
    TkEnd,
    TkFalse,
    TkFor,
    TkFunction,
    TkGoto,
    TkIf,
    TkIn,
    TkLocal,
    TkNil,
    TkNot,
    TkOr,
    TkRepeat,
    TkReturn,
    TkThen,
    TkTrue,
    TkUntil,
    TkWhile,

    // operators and punctuation
    TkPlus,         // +
    TkMinus,        // -
    TkMul,          // *
    TkDiv,          // /
    TkIDiv,         // //
    TkMod,          // %
    TkPow,          // ^
    TkLen,          // #
    TkEq,           // ==
    TkNe,           // ~=
    TkLe,           // <=
    TkGe,           // >=
    TkLt,           // <
    TkGt,           // >
    TkAssign,       // =
    TkLeftParen,    // (
    TkRightParen,   // )
    TkLeftBrace,    // {
    TkRightBrace,   // }
    TkLeftBracket,  // [
    TkRightBracket, // ]
    TkSemicolon,    // ;
    TkColon,        // :
    TkDbColon,      // ::
    TkComma,        // ,
    TkDot,          // .
    TkConcat,       // ..
    TkDots,         // ...

    // literals
    TkName,
    TkString,
    TkInt,
    TkFloat,

    TkEof,
}

impl LuaTokenKind {
    pub fn is_block_end(self) -> bool {
        matches!(
            self,
            LuaTokenKind::TkElse
                | LuaTokenKind::TkElseIf
                | LuaTokenKind::TkEnd
                | LuaTokenKind::TkUntil
                | LuaTokenKind::TkEof
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LuaTokenValue {
    None,
    Name(SmolStr),
    Str(SmolStr),
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone)]
pub struct LuaTokenData {
    pub kind: LuaTokenKind,
    pub value: LuaTokenValue,
    pub line: u32,
}

impl LuaTokenData {
    /// Token text for `near '...'` in syntax errors
    pub fn describe(&self) -> String {
        match &self.value {
            LuaTokenValue::Name(s) | LuaTokenValue::Str(s) => s.to_string(),
            LuaTokenValue::Int(i) => i.to_string(),
            LuaTokenValue::Float(f) => f.to_string(),
            LuaTokenValue::None => match self.kind {
                LuaTokenKind::TkEof => "<eof>".to_string(),
                kind => token_text(kind).to_string(),
            },
        }
    }
}

pub fn token_text(kind: LuaTokenKind) -> &'static str {
    match kind {
        LuaTokenKind::TkAnd => "and",
        LuaTokenKind::TkBreak => "break",
        LuaTokenKind::TkDo => "do",
        LuaTokenKind::TkElse => "else",
        LuaTokenKind::TkElseIf => "elseif",
        LuaTokenKind::TkEnd => "end",
        LuaTokenKind::TkFalse => "false",
        LuaTokenKind::TkFor => "for",
        LuaTokenKind::TkFunction => "function",
        LuaTokenKind::TkGoto => "goto",
        LuaTokenKind::TkIf => "if",
        LuaTokenKind::TkIn => "in",
        LuaTokenKind::TkLocal => "local",
        LuaTokenKind::TkNil => "nil",
        LuaTokenKind::TkNot => "not",
        LuaTokenKind::TkOr => "or",
        LuaTokenKind::TkRepeat => "repeat",
        LuaTokenKind::TkReturn => "return",
        LuaTokenKind::TkThen => "then",
        LuaTokenKind::TkTrue => "true",
        LuaTokenKind::TkUntil => "until",
        LuaTokenKind::TkWhile => "while",
        LuaTokenKind::TkPlus => "+",
        LuaTokenKind::TkMinus => "-",
        LuaTokenKind::TkMul => "*",
        LuaTokenKind::TkDiv => "/",
        LuaTokenKind::TkIDiv => "//",
        LuaTokenKind::TkMod => "%",
        LuaTokenKind::TkPow => "^",
        LuaTokenKind::TkLen => "#",
        LuaTokenKind::TkEq => "==",
        LuaTokenKind::TkNe => "~=",
        LuaTokenKind::TkLe => "<=",
        LuaTokenKind::TkGe => ">=",
        LuaTokenKind::TkLt => "<",
        LuaTokenKind::TkGt => ">",
        LuaTokenKind::TkAssign => "=",
        LuaTokenKind::TkLeftParen => "(",
        LuaTokenKind::TkRightParen => ")",
        LuaTokenKind::TkLeftBrace => "{",
        LuaTokenKind::TkRightBrace => "}",
        LuaTokenKind::TkLeftBracket => "[",
        LuaTokenKind::TkRightBracket => "]",
        LuaTokenKind::TkSemicolon => ";",
        LuaTokenKind::TkColon => ":",
        LuaTokenKind::TkDbColon => "::",
        LuaTokenKind::TkComma => ",",
        LuaTokenKind::TkDot => ".",
        LuaTokenKind::TkConcat => "..",
        LuaTokenKind::TkDots => "...",
        LuaTokenKind::TkName => "<name>",
        LuaTokenKind::TkString => "<string>",
        LuaTokenKind::TkInt => "<integer>",
        LuaTokenKind::TkFloat => "<number>",
        LuaTokenKind::TkEof => "<eof>",
    }
}
