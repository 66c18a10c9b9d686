//! Pvl text parser.
//!
//! Tokens are recognized with `nom`; nesting is tracked with an explicit
//! stack of open objects and groups. `#` comments immediately preceding a
//! keyword are attached to it, `/* */` comments are dropped. Parsing stops at
//! the `End` statement so a text header may be followed by binary data.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_till, take_until, take_while1};
use nom::character::complete::{char, multispace0, multispace1, not_line_ending, space0};
use nom::combinator::{map, opt};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;

use crate::error::{CoreError, Result};

use super::container::{PvlContainer, PvlGroup, PvlObject};
use super::keyword::{PvlKeyword, PvlValue};

type PResult<'a, T> = IResult<&'a str, T>;

fn hash_comment(input: &str) -> PResult<'_, Option<String>> {
    map(preceded(char('#'), not_line_ending), |c: &str| Some(c.trim().to_string()))(input)
}

fn block_comment(input: &str) -> PResult<'_, Option<String>> {
    map(delimited(tag("/*"), take_until("*/"), tag("*/")), |_| None)(input)
}

/// Whitespace and comments; returns the `#` comments seen.
fn filler(input: &str) -> PResult<'_, Vec<String>> {
    map(
        many0(alt((map(multispace1, |_| None), hash_comment, block_comment))),
        |items| items.into_iter().flatten().collect(),
    )(input)
}

fn identifier(input: &str) -> PResult<'_, &str> {
    take_while1(|c: char| {
        c.is_alphanumeric() || matches!(c, '_' | ':' | '^' | '.' | '-' | '/')
    })(input)
}

/// Double-quoted text may contain `""` for a literal quote.
fn quoted(input: &str) -> PResult<'_, String> {
    alt((
        delimited(
            char('"'),
            map(
                many0(alt((take_while1(|c: char| c != '"'), map(tag("\"\""), |_| "\"")))),
                |parts: Vec<&str>| parts.concat(),
            ),
            char('"'),
        ),
        map(delimited(char('\''), take_till(|c| c == '\''), char('\'')), str::to_string),
    ))(input)
}

fn bare(input: &str) -> PResult<'_, &str> {
    take_while1(|c: char| {
        !c.is_whitespace()
            && !matches!(c, ',' | '(' | ')' | '{' | '}' | '<' | '>' | '"' | '#' | '\'')
    })(input)
}

fn value_text(input: &str) -> PResult<'_, String> {
    alt((quoted, map(bare, str::to_string)))(input)
}

fn unit(input: &str) -> PResult<'_, &str> {
    preceded(space0, delimited(char('<'), take_till(|c| c == '>'), char('>')))(input)
}

fn scalar(input: &str) -> PResult<'_, PvlValue> {
    map(pair(value_text, opt(unit)), |(text, unit)| PvlValue {
        text,
        unit: unit.map(|u| u.trim().to_string()),
    })(input)
}

fn bracketed(open: char, close: char) -> impl FnMut(&str) -> PResult<'_, Vec<PvlValue>> {
    move |input: &str| {
        delimited(
            terminated(char(open), multispace0),
            separated_list0(tuple((multispace0, char(','), multispace0)), scalar),
            preceded(multispace0, char(close)),
        )(input)
    }
}

fn list(input: &str) -> PResult<'_, Vec<PvlValue>> {
    let (rest, mut values) = alt((bracketed('(', ')'), bracketed('{', '}')))(input)?;
    // A unit after the closing parenthesis applies to every value without one.
    let (rest, shared_unit) = opt(unit)(rest)?;
    if let Some(u) = shared_unit {
        for v in values.iter_mut().filter(|v| v.unit.is_none()) {
            v.unit = Some(u.trim().to_string());
        }
    }
    Ok((rest, values))
}

fn keyword_values(input: &str) -> PResult<'_, Vec<PvlValue>> {
    alt((list, map(scalar, |v| vec![v])))(input)
}

fn equals(input: &str) -> PResult<'_, char> {
    preceded(space0, terminated(char('='), space0))(input)
}

enum Frame {
    Object(PvlObject),
    Group(PvlGroup),
}

fn syntax_error(text: &str, rest: &str) -> CoreError {
    let offset = text.len() - rest.len();
    let line = text[..offset].matches('\n').count() + 1;
    let snippet: String = rest.chars().take(40).collect();
    CoreError::Pvl(format!("Unable to parse Pvl at line {} near [{}]", line, snippet.trim_end()))
}

/// Parse a Pvl document into a root object.
pub fn parse(text: &str) -> Result<PvlObject> {
    let mut stack: Vec<Frame> = vec![Frame::Object(PvlObject::root())];
    let mut pending_comments: Vec<String> = Vec::new();
    let mut input = text;

    loop {
        let (rest, comments) = filler(input).map_err(|_| syntax_error(text, input))?;
        pending_comments.extend(comments);
        input = rest;
        if input.is_empty() {
            break;
        }

        let (rest, name) = identifier(input).map_err(|_| syntax_error(text, input))?;
        let lower = name.to_ascii_lowercase();

        match lower.as_str() {
            "end" => break,
            "end_object" | "endobject" => {
                input = rest;
                let object = match stack.pop() {
                    Some(Frame::Object(o)) if !o.is_root() => o,
                    _ => return Err(syntax_error(text, input)),
                };
                match stack.last_mut() {
                    Some(Frame::Object(parent)) => parent.add_object(object),
                    _ => return Err(syntax_error(text, input)),
                }
            }
            "end_group" | "endgroup" => {
                input = rest;
                let group = match stack.pop() {
                    Some(Frame::Group(g)) => g,
                    _ => return Err(syntax_error(text, input)),
                };
                match stack.last_mut() {
                    Some(Frame::Object(parent)) => parent.add_group(group),
                    _ => return Err(syntax_error(text, input)),
                }
            }
            "object" | "group" => {
                let (rest, _) = equals(rest).map_err(|_| syntax_error(text, rest))?;
                let (rest, block_name) = value_text(rest).map_err(|_| syntax_error(text, rest))?;
                input = rest;
                pending_comments.clear();
                if lower == "object" {
                    stack.push(Frame::Object(PvlObject::new(block_name)));
                } else {
                    if matches!(stack.last(), Some(Frame::Group(_))) {
                        return Err(syntax_error(text, input));
                    }
                    stack.push(Frame::Group(PvlGroup::new(block_name)));
                }
            }
            _ => {
                let mut keyword = PvlKeyword::new(name);
                let rest = match equals(rest) {
                    Ok((after_eq, _)) => {
                        let (after_values, values) =
                            keyword_values(after_eq).map_err(|_| syntax_error(text, after_eq))?;
                        for v in values {
                            keyword.push(v);
                        }
                        after_values
                    }
                    Err(_) => rest,
                };
                input = rest;
                for c in pending_comments.drain(..) {
                    keyword.add_comment(c);
                }
                match stack.last_mut() {
                    Some(Frame::Object(o)) => o.add_keyword(keyword),
                    Some(Frame::Group(g)) => g.add_keyword(keyword),
                    None => return Err(syntax_error(text, input)),
                }
            }
        }
    }

    match stack.pop() {
        Some(Frame::Object(root)) if stack.is_empty() && root.is_root() => Ok(root),
        Some(Frame::Object(o)) => Err(CoreError::Pvl(format!("Object [{}] is not closed", o.name))),
        Some(Frame::Group(g)) => Err(CoreError::Pvl(format!("Group [{}] is not closed", g.name))),
        None => Err(CoreError::Pvl("Empty Pvl stack".to_string())),
    }
}
