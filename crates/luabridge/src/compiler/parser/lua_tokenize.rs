use super::lua_token_kind::{LuaTokenData, LuaTokenKind, LuaTokenValue};
use crate::lua_value::LuaValue;
use crate::lua_value::lua_convert::str_to_number;
use smol_str::SmolStr;

pub struct LuaTokenize<'a> {
    source: &'a [u8],
    pos: usize,
    line: u32,
    chunk_name: &'a str,
}

impl<'a> LuaTokenize<'a> {
    pub fn new(source: &'a str, chunk_name: &'a str) -> Self {
        let mut tokenize = LuaTokenize {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            chunk_name,
        };
        // Skip a leading shebang line
        if tokenize.source.starts_with(b"#") {
            while !tokenize.is_eof() && tokenize.current() != b'\n' {
                tokenize.pos += 1;
            }
        }
        tokenize
    }

    pub fn tokenize(mut self) -> Result<Vec<LuaTokenData>, String> {
        let mut tokens = vec![];
        loop {
            let token = self.lex()?;
            let done = token.kind == LuaTokenKind::TkEof;
            tokens.push(token);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn name_to_kind(name: &str) -> LuaTokenKind {
        match name {
            "and" => LuaTokenKind::TkAnd,
            "break" => LuaTokenKind::TkBreak,
            "do" => LuaTokenKind::TkDo,
            "else" => LuaTokenKind::TkElse,
            "elseif" => LuaTokenKind::TkElseIf,
            "end" => LuaTokenKind::TkEnd,
            "false" => LuaTokenKind::TkFalse,
            "for" => LuaTokenKind::TkFor,
            "function" => LuaTokenKind::TkFunction,
            "goto" => LuaTokenKind::TkGoto,
            "if" => LuaTokenKind::TkIf,
            "in" => LuaTokenKind::TkIn,
            "local" => LuaTokenKind::TkLocal,
            "nil" => LuaTokenKind::TkNil,
            "not" => LuaTokenKind::TkNot,
            "or" => LuaTokenKind::TkOr,
            "repeat" => LuaTokenKind::TkRepeat,
            "return" => LuaTokenKind::TkReturn,
            "then" => LuaTokenKind::TkThen,
            "true" => LuaTokenKind::TkTrue,
            "until" => LuaTokenKind::TkUntil,
            "while" => LuaTokenKind::TkWhile,
            _ => LuaTokenKind::TkName,
        }
    }

    #[inline]
    fn is_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    #[inline]
    fn current(&self) -> u8 {
        self.peek(0)
    }

    #[inline]
    fn peek(&self, offset: usize) -> u8 {
        self.source.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn error<T>(&self, msg: &str, near: &str) -> Result<T, String> {
        Err(format!("{}:{}: {} near '{}'", self.chunk_name, self.line, msg, near))
    }

    fn token(&self, kind: LuaTokenKind, value: LuaTokenValue) -> LuaTokenData {
        LuaTokenData {
            kind,
            value,
            line: self.line,
        }
    }

    fn simple(&mut self, kind: LuaTokenKind, len: usize) -> Result<LuaTokenData, String> {
        self.pos += len;
        Ok(self.token(kind, LuaTokenValue::None))
    }

    fn lex(&mut self) -> Result<LuaTokenData, String> {
        loop {
            if self.is_eof() {
                return Ok(self.token(LuaTokenKind::TkEof, LuaTokenValue::None));
            }

            let ch = self.current();
            match ch {
                b'\n' | b'\r' => self.lex_new_line(),
                b' ' | b'\t' | 0x0b | 0x0c => self.pos += 1,
                b'-' if self.peek(1) == b'-' => self.lex_comment()?,
                b'-' => return self.simple(LuaTokenKind::TkMinus, 1),
                b'+' => return self.simple(LuaTokenKind::TkPlus, 1),
                b'*' => return self.simple(LuaTokenKind::TkMul, 1),
                b'/' if self.peek(1) == b'/' => return self.simple(LuaTokenKind::TkIDiv, 2),
                b'/' => return self.simple(LuaTokenKind::TkDiv, 1),
                b'%' => return self.simple(LuaTokenKind::TkMod, 1),
                b'^' => return self.simple(LuaTokenKind::TkPow, 1),
                b'#' => return self.simple(LuaTokenKind::TkLen, 1),
                b'=' if self.peek(1) == b'=' => return self.simple(LuaTokenKind::TkEq, 2),
                b'=' => return self.simple(LuaTokenKind::TkAssign, 1),
                b'~' if self.peek(1) == b'=' => return self.simple(LuaTokenKind::TkNe, 2),
                b'<' if self.peek(1) == b'=' => return self.simple(LuaTokenKind::TkLe, 2),
                b'<' => return self.simple(LuaTokenKind::TkLt, 1),
                b'>' if self.peek(1) == b'=' => return self.simple(LuaTokenKind::TkGe, 2),
                b'>' => return self.simple(LuaTokenKind::TkGt, 1),
                b'(' => return self.simple(LuaTokenKind::TkLeftParen, 1),
                b')' => return self.simple(LuaTokenKind::TkRightParen, 1),
                b'{' => return self.simple(LuaTokenKind::TkLeftBrace, 1),
                b'}' => return self.simple(LuaTokenKind::TkRightBrace, 1),
                b']' => return self.simple(LuaTokenKind::TkRightBracket, 1),
                b';' => return self.simple(LuaTokenKind::TkSemicolon, 1),
                b',' => return self.simple(LuaTokenKind::TkComma, 1),
                b':' if self.peek(1) == b':' => return self.simple(LuaTokenKind::TkDbColon, 2),
                b':' => return self.simple(LuaTokenKind::TkColon, 1),
                b'[' => {
                    if let Some(level) = self.long_bracket_level() {
                        let text = self.lex_long_string(level)?;
                        return Ok(self.token(LuaTokenKind::TkString, LuaTokenValue::Str(text)));
                    }
                    return self.simple(LuaTokenKind::TkLeftBracket, 1);
                }
                b'.' => {
                    if self.peek(1) == b'.' {
                        if self.peek(2) == b'.' {
                            return self.simple(LuaTokenKind::TkDots, 3);
                        }
                        return self.simple(LuaTokenKind::TkConcat, 2);
                    }
                    if self.peek(1).is_ascii_digit() {
                        return self.lex_number();
                    }
                    return self.simple(LuaTokenKind::TkDot, 1);
                }
                b'"' | b'\'' => return self.lex_string(ch),
                b'0'..=b'9' => return self.lex_number(),
                c if c == b'_' || c.is_ascii_alphabetic() => return Ok(self.lex_name()),
                c => {
                    let near = (c as char).to_string();
                    return self.error("unexpected symbol", &near);
                }
            }
        }
    }

    fn lex_new_line(&mut self) {
        let first = self.current();
        self.pos += 1;
        // \r\n and \n\r count as one line break
        let second = self.current();
        if (second == b'\n' || second == b'\r') && second != first {
            self.pos += 1;
        }
        self.line += 1;
    }

    fn lex_comment(&mut self) -> Result<(), String> {
        self.pos += 2;
        if self.current() == b'[' {
            if let Some(level) = self.long_bracket_level() {
                self.lex_long_string(level)?;
                return Ok(());
            }
        }
        while !self.is_eof() && self.current() != b'\n' && self.current() != b'\r' {
            self.pos += 1;
        }
        Ok(())
    }

    /// At `[`: returns the `=` count when this opens a long bracket
    fn long_bracket_level(&self) -> Option<usize> {
        let mut level = 0;
        while self.peek(1 + level) == b'=' {
            level += 1;
        }
        if self.peek(1 + level) == b'[' { Some(level) } else { None }
    }

    fn lex_long_string(&mut self, level: usize) -> Result<SmolStr, String> {
        self.pos += level + 2;
        // A newline right after the opening bracket is skipped
        if self.current() == b'\r' || self.current() == b'\n' {
            self.lex_new_line();
        }

        let mut buf = Vec::new();
        loop {
            if self.is_eof() {
                return self.error("unfinished long string", "<eof>");
            }
            match self.current() {
                b']' => {
                    let mut closing = 0;
                    while self.peek(1 + closing) == b'=' {
                        closing += 1;
                    }
                    if closing == level && self.peek(1 + closing) == b']' {
                        self.pos += level + 2;
                        break;
                    }
                    buf.push(b']');
                    self.pos += 1;
                }
                b'\n' | b'\r' => {
                    buf.push(b'\n');
                    self.lex_new_line();
                }
                c => {
                    buf.push(c);
                    self.pos += 1;
                }
            }
        }
        Ok(SmolStr::from(String::from_utf8_lossy(&buf)))
    }

    fn lex_string(&mut self, quote: u8) -> Result<LuaTokenData, String> {
        self.pos += 1;
        let mut buf: Vec<u8> = Vec::new();
        loop {
            if self.is_eof() {
                return self.error("unfinished string", "<eof>");
            }
            let c = self.current();
            if c == quote {
                self.pos += 1;
                break;
            }
            match c {
                b'\n' | b'\r' => {
                    let near = String::from_utf8_lossy(&buf).to_string();
                    return self.error("unfinished string", &near);
                }
                b'\\' => {
                    self.pos += 1;
                    self.lex_escape(&mut buf)?;
                }
                _ => {
                    buf.push(c);
                    self.pos += 1;
                }
            }
        }
        let text = SmolStr::from(String::from_utf8_lossy(&buf));
        Ok(self.token(LuaTokenKind::TkString, LuaTokenValue::Str(text)))
    }

    fn lex_escape(&mut self, buf: &mut Vec<u8>) -> Result<(), String> {
        let c = self.current();
        let simple = match c {
            b'n' => Some(b'\n'),
            b't' => Some(b'\t'),
            b'r' => Some(b'\r'),
            b'a' => Some(0x07),
            b'b' => Some(0x08),
            b'f' => Some(0x0c),
            b'v' => Some(0x0b),
            b'\\' => Some(b'\\'),
            b'"' => Some(b'"'),
            b'\'' => Some(b'\''),
            _ => None,
        };
        if let Some(byte) = simple {
            buf.push(byte);
            self.pos += 1;
            return Ok(());
        }

        match c {
            b'\n' | b'\r' => {
                buf.push(b'\n');
                self.lex_new_line();
            }
            b'x' => {
                let hi = (self.peek(1) as char).to_digit(16);
                let lo = (self.peek(2) as char).to_digit(16);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        buf.push((hi * 16 + lo) as u8);
                        self.pos += 3;
                    }
                    _ => return self.error("hexadecimal digit expected", "\\x"),
                }
            }
            b'z' => {
                self.pos += 1;
                while !self.is_eof() && self.current().is_ascii_whitespace() {
                    if self.current() == b'\n' || self.current() == b'\r' {
                        self.lex_new_line();
                    } else {
                        self.pos += 1;
                    }
                }
            }
            b'u' => {
                if self.peek(1) != b'{' {
                    return self.error("missing '{' in \\u{xxxx}", "\\u");
                }
                self.pos += 2;
                let mut code: u32 = 0;
                while let Some(d) = (self.current() as char).to_digit(16) {
                    code = code.saturating_mul(16).saturating_add(d);
                    self.pos += 1;
                }
                if self.current() != b'}' {
                    return self.error("missing '}' in \\u{xxxx}", "\\u");
                }
                self.pos += 1;
                let ch = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
                let mut tmp = [0u8; 4];
                buf.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
            }
            b'0'..=b'9' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 3 && self.current().is_ascii_digit() {
                    value = value * 10 + (self.current() - b'0') as u32;
                    self.pos += 1;
                    digits += 1;
                }
                if value > 255 {
                    return self.error("decimal escape too large", "\\");
                }
                buf.push(value as u8);
            }
            _ => {
                let near = format!("\\{}", c as char);
                return self.error("invalid escape sequence", &near);
            }
        }
        Ok(())
    }

    fn lex_number(&mut self) -> Result<LuaTokenData, String> {
        let start = self.pos;
        let is_hex = self.current() == b'0' && matches!(self.peek(1), b'x' | b'X');
        if is_hex {
            self.pos += 2;
        }
        loop {
            let c = self.current();
            let exponent = if is_hex { c == b'p' || c == b'P' } else { c == b'e' || c == b'E' };
            if exponent && matches!(self.peek(1), b'+' | b'-') {
                self.pos += 2;
            } else if c.is_ascii_alphanumeric() || c == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }

        let text = String::from_utf8_lossy(&self.source[start..self.pos]).to_string();
        match str_to_number(&text) {
            Some(LuaValue::Integer(i)) => Ok(self.token(LuaTokenKind::TkInt, LuaTokenValue::Int(i))),
            Some(LuaValue::Float(f)) => Ok(self.token(LuaTokenKind::TkFloat, LuaTokenValue::Float(f))),
            _ => self.error("malformed number", &text),
        }
    }

    fn lex_name(&mut self) -> LuaTokenData {
        let start = self.pos;
        while self.current() == b'_' || self.current().is_ascii_alphanumeric() {
            self.pos += 1;
        }
        let name = String::from_utf8_lossy(&self.source[start..self.pos]).to_string();
        match Self::name_to_kind(&name) {
            LuaTokenKind::TkName => self.token(LuaTokenKind::TkName, LuaTokenValue::Name(SmolStr::new(name))),
            kind => self.token(kind, LuaTokenValue::None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<LuaTokenKind> {
        LuaTokenize::new(source, "test")
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            kinds("a .. b ... // ~= <= ::"),
            vec![
                LuaTokenKind::TkName,
                LuaTokenKind::TkConcat,
                LuaTokenKind::TkName,
                LuaTokenKind::TkDots,
                LuaTokenKind::TkIDiv,
                LuaTokenKind::TkNe,
                LuaTokenKind::TkLe,
                LuaTokenKind::TkDbColon,
                LuaTokenKind::TkEof,
            ]
        );
    }

    #[test]
    fn test_tokenize_strings_and_comments() {
        let tokens = LuaTokenize::new("-- comment\nx = 'a\\tb' --[[ long\n comment ]] y = [[raw]]", "test")
            .tokenize()
            .unwrap();
        assert_eq!(tokens[2].value, LuaTokenValue::Str(SmolStr::new("a\tb")));
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens[5].value, LuaTokenValue::Str(SmolStr::new("raw")));
        assert_eq!(tokens[5].line, 3);
    }

    #[test]
    fn test_tokenize_numbers() {
        let tokens = LuaTokenize::new("3 0xff 2.5 1e2", "test").tokenize().unwrap();
        assert_eq!(tokens[0].value, LuaTokenValue::Int(3));
        assert_eq!(tokens[1].value, LuaTokenValue::Int(255));
        assert_eq!(tokens[2].value, LuaTokenValue::Float(2.5));
        assert_eq!(tokens[3].value, LuaTokenValue::Float(100.0));
    }

    #[test]
    fn test_tokenize_errors() {
        let err = LuaTokenize::new("x = 'open", "chunk").tokenize().unwrap_err();
        assert!(err.starts_with("chunk:1: unfinished string"), "{}", err);
        let err = LuaTokenize::new("x = 3x", "chunk").tokenize().unwrap_err();
        assert!(err.contains("malformed number"), "{}", err);
    }
}
