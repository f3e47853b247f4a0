// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP (ISO-10303-21) tokenizer using nom
//!
//! Tokens borrow from the file text; records are located without tokenizing.

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, map_res, opt, recognize, value},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::error::{Error, Result};

/// One Part 21 parameter value, borrowing from the source text.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    /// `#42`
    EntityRef(u32),
    /// Quoted text without its delimiters; doubled quotes stay doubled
    String(&'a str),
    Integer(i64),
    /// `0.`, `-1.5E-3`
    Float(f64),
    /// `.T.`, `.UNSPECIFIED.`
    Enum(&'a str),
    List(Vec<Token<'a>>),
    /// `LENGTH_MEASURE(1.)`
    TypedValue(&'a str, Vec<Token<'a>>),
    /// `$`
    Null,
    /// `*`
    Derived,
}

fn is_keyword_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn ws(input: &str) -> IResult<&str, &str> {
    take_while(char::is_whitespace)(input)
}

fn instance_id(input: &str) -> IResult<&str, u32> {
    preceded(char('#'), map_res(digit1, str::parse::<u32>))(input)
}

fn entity_ref(input: &str) -> IResult<&str, Token> {
    map(instance_id, Token::EntityRef)(input)
}

/// Body of a quoted string up to (not including) the closing quote.
fn quoted_body(input: &str, quote: u8) -> IResult<&str, &str> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while let Some(offset) = memchr::memchr(quote, &bytes[i..]) {
        let at = i + offset;
        if bytes.get(at + 1) == Some(&quote) {
            i = at + 2;
        } else {
            return Ok((&input[at..], &input[..at]));
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn string_literal(input: &str) -> IResult<&str, Token> {
    let single = delimited(char('\''), |i| quoted_body(i, b'\''), char('\''));
    let double = delimited(char('"'), |i| quoted_body(i, b'"'), char('"'));
    map(alt((single, double)), Token::String)(input)
}

fn integer(input: &str) -> IResult<&str, Token> {
    map_res(recognize(pair(opt(one_of("+-")), digit1)), |s: &str| {
        s.parse::<i64>().map(Token::Integer)
    })(input)
}

/// Part 21 reals always carry a point, but the fraction may be empty (`0.`).
fn float(input: &str) -> IResult<&str, Token> {
    let exponent = tuple((one_of("eE"), opt(one_of("+-")), digit1));
    let literal = recognize(tuple((
        opt(one_of("+-")),
        digit1,
        char('.'),
        opt(digit1),
        opt(exponent),
    )));
    map_res(literal, |s: &str| {
        fast_float::parse::<f64, _>(s).map(Token::Float)
    })(input)
}

fn enum_value(input: &str) -> IResult<&str, Token> {
    map(
        delimited(char('.'), take_while1(is_keyword_char), char('.')),
        Token::Enum,
    )(input)
}

/// `( a , b , ... )`
fn arguments(input: &str) -> IResult<&str, Vec<Token>> {
    delimited(
        terminated(char('('), ws),
        separated_list0(char(','), token),
        char(')'),
    )(input)
}

fn typed_value(input: &str) -> IResult<&str, Token> {
    map(pair(take_while1(is_keyword_char), arguments), |(name, args)| {
        Token::TypedValue(name, args)
    })(input)
}

fn list(input: &str) -> IResult<&str, Token> {
    map(arguments, Token::List)(input)
}

fn token(input: &str) -> IResult<&str, Token> {
    // Reals before integers so `1.` is not split at the point
    let value_token = alt((
        float,
        integer,
        entity_ref,
        string_literal,
        enum_value,
        list,
        typed_value,
        value(Token::Null, char('$')),
        value(Token::Derived, char('*')),
    ));
    delimited(ws, value_token, ws)(input)
}

/// Parse one simple instance such as `#123=CARTESIAN_POINT('',(0.,1.,2.));`
pub fn parse_entity(input: &str) -> Result<(u32, &str, Vec<Token<'_>>)> {
    let id = delimited(ws, instance_id, ws);
    let type_name = preceded(char('='), delimited(ws, take_while1(is_keyword_char), ws));
    let args = terminated(arguments, pair(ws, char(';')));

    tuple((id, type_name, args))(input)
        .map(|(_, parsed)| parsed)
        .map_err(|e| Error::parse(0, format!("Failed to parse entity: {}", e)))
}

impl<'a> Token<'a> {
    /// Entity reference target, if this token is `#id`
    pub fn as_entity_ref(&self) -> Option<u32> {
        match self {
            Token::EntityRef(id) => Some(*id),
            _ => None,
        }
    }

    /// Numeric value; integers are widened and typed measures unwrapped
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Token::Float(v) => Some(*v),
            Token::Integer(v) => Some(*v as f64),
            Token::TypedValue(_, args) => args.first().and_then(Token::as_f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Token<'a>]> {
        match self {
            Token::List(items) => Some(items),
            _ => None,
        }
    }

    /// STEP logical: `.T.`/`.TRUE.` and `.F.`/`.FALSE.`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Token::Enum(v) => match *v {
                "T" | "TRUE" => Some(true),
                "F" | "FALSE" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Type name of an instance text such as `#12 = LINE ( ... ) ;`
/// Complex instances `#12=( A() B() );` have no single type name
pub fn entity_type_name(text: &str) -> Option<&str> {
    let eq = text.find('=')?;
    let rest = text[eq + 1..].trim_start();
    let end = rest
        .find(|c: char| c == '(' || c.is_whitespace())
        .unwrap_or(rest.len());
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

/// Walks instance records without tokenizing their parameters.
///
/// Record ends are found by the first `;` outside a quoted string, so names
/// like `'inlet; rev B'` do not cut a record short.
pub struct EntityScanner<'a> {
    content: &'a str,
    position: usize,
}

impl<'a> EntityScanner<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            position: 0,
        }
    }

    /// Start after the `DATA;` keyword; header strings may contain `#`.
    pub fn data_section(content: &'a str) -> Result<Self> {
        let start = content.find("DATA;").ok_or(Error::MissingDataSection)?;
        Ok(Self {
            content,
            position: start + "DATA;".len(),
        })
    }

    /// Next record as `(id, type_name, start, end)`, `end` one past the `;`.
    /// Complex instances yield an empty type name. A `#` that does not open
    /// an `#id =` record is skipped.
    pub fn next_entity(&mut self) -> Option<(u32, &'a str, usize, usize)> {
        let bytes = self.content.as_bytes();
        loop {
            let start = self.position + memchr::memchr(b'#', &bytes[self.position..])?;
            let head = &self.content[start..];
            let parsed = instance_id(head)
                .and_then(|(rest, id)| tuple((ws, char('='), ws))(rest).map(|(rest, _)| (rest, id)));
            let Ok((after_eq, id)) = parsed else {
                self.position = start + 1;
                continue;
            };
            let end = record_end(bytes, start)?;
            self.position = end;

            let type_len = after_eq
                .find(|c: char| !is_keyword_char(c))
                .unwrap_or(after_eq.len());
            return Some((id, &after_eq[..type_len], start, end));
        }
    }
}

/// Offset one past the terminating `;` of the record at `from`.
fn record_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut in_string = false;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_string = !in_string,
            b';' if !in_string => return Some(i + 1),
            _ => {}
        }
        i += 1;
    }
    None
}
