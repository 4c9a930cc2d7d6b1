//! Parser for single GDB/MI output lines.

use super::{
    AsyncKind, AsyncRecord, OutOfBand, Record, ResultClass, ResultRecord, StreamKind,
    StreamRecord, Value,
};
use crate::debugger::error::Error;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, digit1, multispace0, one_of};
use nom::combinator::{map, map_res, opt};
use nom::error::{ErrorKind, ParseError};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, pair, preceded, separated_pair, terminated};
use nom::IResult;
use nom_supreme::error::ErrorTree;
use nom_supreme::final_parser::{final_parser, Location};

/// Parse one logical MI line (trailing `\r`/`\n` tolerated).
///
/// `(gdb)` prompt lines yield an empty record. Unbalanced input fails with
/// [`Error::MalformedRecord`]; the session logs it and continues with the
/// next line.
pub fn parse_line(line: &str) -> Result<Record, Error> {
    let line = line.trim_end_matches(['\r', '\n']);
    final_parser::<_, _, _, ErrorTree<Location>>(record_line)(line)
        .map_err(|_| Error::MalformedRecord(line.to_string()))
}

fn record_line(input: &str) -> IResult<&str, Record, ErrorTree<&str>> {
    let (input, token) = opt(map_res(digit1, str::parse::<u64>))(input)?;
    alt((
        map(terminated(tag("(gdb)"), multispace0), move |_| Record {
            token,
            ..Default::default()
        }),
        map(
            preceded(char('^'), pair(result_class, results)),
            move |(class, results)| Record {
                token,
                result: Some(ResultRecord { class, results }),
                out_of_band: Vec::new(),
            },
        ),
        map(
            pair(one_of("*+="), pair(async_class, results)),
            move |(sigil, (class, results))| {
                let kind = match sigil {
                    '*' => AsyncKind::Exec,
                    '+' => AsyncKind::Status,
                    _ => AsyncKind::Notify,
                };
                Record {
                    token,
                    result: None,
                    out_of_band: vec![OutOfBand::Async(AsyncRecord {
                        kind,
                        class,
                        results,
                    })],
                }
            },
        ),
        map(pair(one_of("~@&"), c_string), move |(sigil, text)| {
            let kind = match sigil {
                '~' => StreamKind::Console,
                '@' => StreamKind::Target,
                _ => StreamKind::Log,
            };
            Record {
                token,
                result: None,
                out_of_band: vec![OutOfBand::Stream(StreamRecord { kind, text })],
            }
        }),
    ))(input)
}

fn result_class(input: &str) -> IResult<&str, ResultClass, ErrorTree<&str>> {
    let (rest, word) = take_while1(|c: char| c.is_ascii_alphabetic())(input)?;
    match word.parse::<ResultClass>() {
        Ok(class) => Ok((rest, class)),
        Err(()) => Err(nom::Err::Error(ErrorTree::from_error_kind(
            input,
            ErrorKind::Alpha,
        ))),
    }
}

fn async_class(input: &str) -> IResult<&str, String, ErrorTree<&str>> {
    map(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        str::to_string,
    )(input)
}

/// `,key=value` pairs following a result or async class.
fn results(input: &str) -> IResult<&str, Value, ErrorTree<&str>> {
    map(many0(preceded(char(','), result_pair)), Value::Tuple)(input)
}

fn result_pair(input: &str) -> IResult<&str, (String, Value), ErrorTree<&str>> {
    separated_pair(key, char('='), value)(input)
}

fn key(input: &str) -> IResult<&str, String, ErrorTree<&str>> {
    map(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        str::to_string,
    )(input)
}

fn value(input: &str) -> IResult<&str, Value, ErrorTree<&str>> {
    alt((
        map(c_string, Value::String),
        list,
        tuple,
        // Bare constants appear in a few older MI responses.
        map(
            take_while1(|c: char| !",{}[]\"=".contains(c)),
            |s: &str| Value::String(s.to_string()),
        ),
    ))(input)
}

fn list(input: &str) -> IResult<&str, Value, ErrorTree<&str>> {
    map(
        delimited(
            char('['),
            separated_list0(char(','), list_item),
            char(']'),
        ),
        Value::List,
    )(input)
}

/// List elements may be bare values or `key=value` results; the latter are
/// modeled as one-pair tuples so duplicated keys stay addressable.
fn list_item(input: &str) -> IResult<&str, Value, ErrorTree<&str>> {
    alt((
        map(result_pair, |(k, v)| Value::Tuple(vec![(k, v)])),
        value,
    ))(input)
}

fn tuple(input: &str) -> IResult<&str, Value, ErrorTree<&str>> {
    map(
        delimited(
            char('{'),
            separated_list0(char(','), result_pair),
            char('}'),
        ),
        Value::Tuple,
    )(input)
}

/// Double-quoted string with C escapes. Unknown escapes pass through with
/// their backslash so GDB's octal/hex sequences survive round-tripping.
fn c_string(input: &str) -> IResult<&str, String, ErrorTree<&str>> {
    let mut chars = input.char_indices();
    match chars.next() {
        Some((_, '"')) => {}
        _ => {
            return Err(nom::Err::Error(ErrorTree::from_error_kind(
                input,
                ErrorKind::Char,
            )))
        }
    }

    let mut out = String::new();
    let mut escaped = false;
    for (idx, ch) in chars {
        if escaped {
            match ch {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            return Ok((&input[idx + 1..], out));
        } else {
            out.push(ch);
        }
    }

    // Closing quote never seen.
    Err(nom::Err::Failure(ErrorTree::from_error_kind(
        input,
        ErrorKind::Char,
    )))
}
