//! Field and method descriptor parsing (JVMS 4.3.2, 4.3.3).

use crate::classfile::types::Type;
use crate::common::error::{Error, Result};

/// Parsed method descriptor. `ret` is `None` for void methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<Type>,
    pub ret: Option<Type>,
}

impl MethodDescriptor {
    /// Number of local-variable slots the parameters occupy, not counting
    /// the receiver.
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(|t| t.width()).sum()
    }
}

/// Parse a field descriptor such as `I`, `[J` or `Ljava/lang/String;`.
pub fn parse_field_descriptor(desc: &str) -> Result<Type> {
    let mut parser = Parser::new(desc);
    let ty = parser.parse_type()?;
    if !parser.at_end() {
        return Err(Error::descriptor(desc, "trailing characters"));
    }
    Ok(ty)
}

/// Parse a method descriptor such as `(I[Ljava/lang/String;)V`.
pub fn parse_method_descriptor(desc: &str) -> Result<MethodDescriptor> {
    let mut parser = Parser::new(desc);
    parser.expect(b'(')?;
    let mut params = Vec::new();
    while parser.peek() != Some(b')') {
        if parser.at_end() {
            return Err(Error::descriptor(desc, "unterminated parameter list"));
        }
        params.push(parser.parse_type()?);
    }
    parser.expect(b')')?;
    let ret = if parser.peek() == Some(b'V') {
        parser.advance();
        None
    } else {
        Some(parser.parse_type()?)
    };
    if !parser.at_end() {
        return Err(Error::descriptor(desc, "trailing characters"));
    }
    Ok(MethodDescriptor { params, ret })
}

struct Parser<'a> {
    desc: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(desc: &'a str) -> Self {
        Parser {
            desc,
            bytes: desc.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.peek() == Some(b) {
            self.advance();
            Ok(())
        } else {
            Err(Error::descriptor(
                self.desc,
                format!("expected '{}' at offset {}", b as char, self.pos),
            ))
        }
    }

    fn parse_type(&mut self) -> Result<Type> {
        let b = self
            .peek()
            .ok_or_else(|| Error::descriptor(self.desc, "unexpected end"))?;
        self.advance();
        match b {
            b'Z' => Ok(Type::Boolean),
            b'B' => Ok(Type::Byte),
            b'C' => Ok(Type::Char),
            b'S' => Ok(Type::Short),
            b'I' => Ok(Type::Int),
            b'J' => Ok(Type::Long),
            b'F' => Ok(Type::Float),
            b'D' => Ok(Type::Double),
            b'L' => {
                let start = self.pos;
                while self.peek().map_or(false, |c| c != b';') {
                    self.advance();
                }
                if self.at_end() {
                    return Err(Error::descriptor(self.desc, "unterminated class name"));
                }
                let name = self.desc[start..self.pos].to_string();
                self.advance();
                if name.is_empty() {
                    return Err(Error::descriptor(self.desc, "empty class name"));
                }
                Ok(Type::Reference(name))
            }
            b'[' => Ok(self.parse_type()?.array_of()),
            other => Err(Error::descriptor(
                self.desc,
                format!("unknown type tag '{}'", other as char),
            )),
        }
    }
}
