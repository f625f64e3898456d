//! Tokenization of variable references using `nom`.
//!
//! Splits a string into literal runs, `$$` escapes, and `$NAME` /
//! `${NAME...}` references for the substitution pass to consume.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till, take_till1, take_while},
    character::complete::{char, satisfy},
    combinator::{map, opt, recognize, value},
    sequence::{delimited, pair, preceded},
};

/// What to do when a referenced variable is unset (or empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier<'a> {
    /// `${NAME:-word}` (`when_empty`) or `${NAME-word}`.
    Default {
        /// Replacement text.
        word: &'a str,
        /// Also applies when the variable is set but empty.
        when_empty: bool,
    },
    /// `${NAME:?message}` (`when_empty`) or `${NAME?message}`.
    Required {
        /// Error message to report.
        message: &'a str,
        /// Also applies when the variable is set but empty.
        when_empty: bool,
    },
}

/// A piece of an interpolated string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text copied verbatim.
    Literal(&'a str),
    /// `$$`, producing a single `$`.
    Dollar,
    /// A variable reference.
    Variable {
        /// Variable name.
        name: &'a str,
        /// Optional fallback behaviour.
        modifier: Option<Modifier<'a>>,
    },
}

const fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_name_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

const fn is_dollar(c: char) -> bool {
    c == '$'
}

const fn is_close_brace(c: char) -> bool {
    c == '}'
}

fn variable_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_name_start), take_while(is_name_continue))).parse(input)
}

fn literal(input: &str) -> IResult<&str, Segment<'_>> {
    map(take_till1(is_dollar), Segment::Literal).parse(input)
}

fn dollar(input: &str) -> IResult<&str, Segment<'_>> {
    value(Segment::Dollar, tag("$$")).parse(input)
}

fn modifier(input: &str) -> IResult<&str, Modifier<'_>> {
    alt((
        map(preceded(tag(":-"), take_till(is_close_brace)), |word| Modifier::Default {
            word,
            when_empty: true,
        }),
        map(preceded(char('-'), take_till(is_close_brace)), |word| Modifier::Default {
            word,
            when_empty: false,
        }),
        map(preceded(tag(":?"), take_till(is_close_brace)), |message| Modifier::Required {
            message,
            when_empty: true,
        }),
        map(preceded(char('?'), take_till(is_close_brace)), |message| Modifier::Required {
            message,
            when_empty: false,
        }),
    ))
    .parse(input)
}

fn braced(input: &str) -> IResult<&str, Segment<'_>> {
    map(
        delimited(tag("${"), pair(variable_name, opt(modifier)), char('}')),
        |(name, modifier)| Segment::Variable { name, modifier },
    )
    .parse(input)
}

fn bare(input: &str) -> IResult<&str, Segment<'_>> {
    map(preceded(char('$'), variable_name), |name| Segment::Variable {
        name,
        modifier: None,
    })
    .parse(input)
}

fn segment(input: &str) -> IResult<&str, Segment<'_>> {
    alt((literal, dollar, braced, bare)).parse(input)
}

/// Splits `input` into segments.
///
/// On failure returns the unparsed remainder starting at the offending `$`.
pub fn tokenize(input: &str) -> Result<Vec<Segment<'_>>, &str> {
    let mut segments = Vec::new();
    let mut remaining = input;

    while !remaining.is_empty() {
        match segment(remaining) {
            Ok((rest, seg)) => {
                segments.push(seg);
                remaining = rest;
            }
            Err(_) => return Err(remaining),
        }
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_one_literal() {
        let segments = tokenize("hello world").expect("should tokenize");
        assert_eq!(segments, vec![Segment::Literal("hello world")]);
    }

    #[test]
    fn empty_input_has_no_segments() {
        assert!(tokenize("").expect("should tokenize").is_empty());
    }

    #[test]
    fn bare_and_braced_references() {
        let segments = tokenize("$HOME/${USER}").expect("should tokenize");
        assert_eq!(
            segments,
            vec![
                Segment::Variable {
                    name: "HOME",
                    modifier: None
                },
                Segment::Literal("/"),
                Segment::Variable {
                    name: "USER",
                    modifier: None
                },
            ]
        );
    }

    #[test]
    fn bare_reference_stops_at_non_name_char() {
        let segments = tokenize("$TAG-alpine").expect("should tokenize");
        assert_eq!(
            segments,
            vec![
                Segment::Variable {
                    name: "TAG",
                    modifier: None
                },
                Segment::Literal("-alpine"),
            ]
        );
    }

    #[test]
    fn escaped_dollar() {
        let segments = tokenize("cost: $$5").expect("should tokenize");
        assert_eq!(
            segments,
            vec![
                Segment::Literal("cost: "),
                Segment::Dollar,
                Segment::Literal("5")
            ]
        );
    }

    #[test]
    fn default_modifiers() {
        let segments = tokenize("${A:-x}${B-y}").expect("should tokenize");
        assert_eq!(
            segments,
            vec![
                Segment::Variable {
                    name: "A",
                    modifier: Some(Modifier::Default {
                        word: "x",
                        when_empty: true
                    })
                },
                Segment::Variable {
                    name: "B",
                    modifier: Some(Modifier::Default {
                        word: "y",
                        when_empty: false
                    })
                },
            ]
        );
    }

    #[test]
    fn required_modifiers() {
        let segments = tokenize("${A:?missing a}${B?}").expect("should tokenize");
        assert_eq!(
            segments,
            vec![
                Segment::Variable {
                    name: "A",
                    modifier: Some(Modifier::Required {
                        message: "missing a",
                        when_empty: true
                    })
                },
                Segment::Variable {
                    name: "B",
                    modifier: Some(Modifier::Required {
                        message: "",
                        when_empty: false
                    })
                },
            ]
        );
    }

    #[test]
    fn malformed_references_fail() {
        for bad in ["${", "${A", "${1A}", "$", "price $5", "${A B}", "${}"] {
            assert!(tokenize(bad).is_err(), "input should fail: {bad}");
        }
    }

    #[test]
    fn failure_reports_remainder() {
        let rest = tokenize("ok ${oops").unwrap_err();
        assert_eq!(rest, "${oops");
    }
}
