//! TQ-013: Query language parser (nom).
//!
//! ```text
//! query      := ["in" profiles] item (link item)*
//! profiles   := "*" | name ("," name)*          name := ident | string
//! item       := ident ["." ident] modifier*
//! modifier   := ":" ("*" | ident ("," ident)*)
//!             | "?" ident ("eq" | "ne") string
//! link       := "-" | "="
//! ```
//!
//! `in` only opens a profile list when a name or `*` follows it, so a type may be
//! called `in`. Positions in errors are byte offsets into the query.

use super::ast::*;
use crate::core::types::Operator;
use crate::error::QueryError;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{char as pchar, multispace0, satisfy};
use nom::combinator::{all_consuming, cut, map, not, opt, recognize, value};
use nom::error::{context, ContextError, ErrorKind, ParseError};
use nom::multi::{many0, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::IResult;

const END_OF_ITEM: &str = "link ('-' or '=') or end of query";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cause<'a> {
    Expected(Option<&'static str>),
    UnknownOperator(&'a str),
}

/// Parse failure at the remaining input `input`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SyntaxError<'a> {
    input: &'a str,
    cause: Cause<'a>,
}

impl<'a> ParseError<&'a str> for SyntaxError<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        let expected = (kind == ErrorKind::Eof).then_some(END_OF_ITEM);
        Self {
            input,
            cause: Cause::Expected(expected),
        }
    }

    fn append(_: &'a str, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<'a> ContextError<&'a str> for SyntaxError<'a> {
    // The innermost context names what was expected.
    fn add_context(_: &'a str, ctx: &'static str, mut other: Self) -> Self {
        if let Cause::Expected(expected) = &mut other.cause {
            expected.get_or_insert(ctx);
        }
        other
    }
}

impl SyntaxError<'_> {
    fn into_query_error(self, source: &str) -> QueryError {
        let pos = source.len() - self.input.len();
        match self.cause {
            Cause::UnknownOperator(op) => QueryError::UnknownOperator {
                op: op.to_string(),
                pos,
            },
            Cause::Expected(expected) => match self.input.chars().next() {
                Some(ch) if !starts_token(ch) => QueryError::UnexpectedChar { ch, pos },
                _ => QueryError::Unexpected {
                    expected: expected.unwrap_or(END_OF_ITEM).to_string(),
                    found: describe(self.input),
                    pos,
                },
            },
        }
    }
}

type PResult<'a, O> = IResult<&'a str, O, SyntaxError<'a>>;

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn starts_token(c: char) -> bool {
    c.is_whitespace() || is_ident_start(c) || "'\"*,.:?=-".contains(c)
}

/// Human-readable name of the token at the start of `rest`.
fn describe(rest: &str) -> String {
    if let Ok((_, word)) = identifier(rest) {
        format!("identifier \"{}\"", word)
    } else if let Ok((_, text)) = quoted(rest) {
        format!("string '{}'", text)
    } else {
        rest.chars()
            .next()
            .map_or_else(|| "end of query".to_string(), |c| format!("'{}'", c))
    }
}

/// `inner` after optional whitespace.
fn lex<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    F: FnMut(&'a str) -> PResult<'a, O>,
{
    preceded(multispace0, inner)
}

fn identifier(input: &str) -> PResult<'_, &str> {
    recognize(pair(satisfy(is_ident_start), take_while(is_ident_continue)))(input)
}

fn quoted(input: &str) -> PResult<'_, &str> {
    alt((
        delimited(pchar('\''), take_while(|c: char| c != '\''), pchar('\'')),
        delimited(pchar('"'), take_while(|c: char| c != '"'), pchar('"')),
    ))(input)
}

fn owned(s: &str) -> String {
    s.to_string()
}

fn keyword_in(input: &str) -> PResult<'_, &str> {
    terminated(tag("in"), not(satisfy(is_ident_continue)))(input)
}

fn profiles(input: &str) -> PResult<'_, ProfileSelector> {
    let names = separated_list1(
        lex(pchar(',')),
        map(
            context("profile name", lex(alt((quoted, identifier)))),
            owned,
        ),
    );
    let selection = alt((
        value(ProfileSelector::All, lex(pchar('*'))),
        map(names, ProfileSelector::Explicit),
    ));
    map(opt(preceded(lex(keyword_in), selection)), Option::unwrap_or_default)(input)
}

fn type_ref(input: &str) -> PResult<'_, TypeRef> {
    map(
        pair(
            context("type name", lex(identifier)),
            opt(preceded(
                lex(pchar('.')),
                cut(context("type name after '.'", lex(identifier))),
            )),
        ),
        |(first, second)| match second {
            Some(type_name) => TypeRef::Qualified {
                namespace: first.to_string(),
                type_name: type_name.to_string(),
            },
            None => TypeRef::Unqualified(first.to_string()),
        },
    )(input)
}

fn attr_selection(input: &str) -> PResult<'_, AttrSelection> {
    alt((
        value(AttrSelection::All, lex(pchar('*'))),
        map(
            separated_list1(
                lex(pchar(',')),
                map(context("attribute name or '*'", lex(identifier)), owned),
            ),
            AttrSelection::Named,
        ),
    ))(input)
}

fn operator(input: &str) -> PResult<'_, Operator> {
    let (start, _) = multispace0::<_, SyntaxError<'_>>(input)?;
    let (rest, word) = context("operator (eq or ne)", identifier)(start)?;
    match Operator::from_keyword(word) {
        Some(op) => Ok((rest, op)),
        None => Err(nom::Err::Failure(SyntaxError {
            input: start,
            cause: Cause::UnknownOperator(word),
        })),
    }
}

fn search(input: &str) -> PResult<'_, SearchExpr> {
    let (input, attr) = context("attribute name", lex(identifier))(input)?;
    let (input, op) = operator(input)?;
    let (input, value) = context("quoted value", lex(quoted))(input)?;
    Ok((
        input,
        SearchExpr {
            attr: attr.to_string(),
            op,
            value: value.to_string(),
        },
    ))
}

fn modifier(input: &str) -> PResult<'_, Modifier> {
    alt((
        map(preceded(lex(pchar(':')), cut(attr_selection)), Modifier::Attrs),
        map(preceded(lex(pchar('?')), cut(search)), Modifier::Search),
    ))(input)
}

fn item(input: &str) -> PResult<'_, QueryItem> {
    let (input, type_ref) = type_ref(input)?;
    let (input, modifiers) = many0(modifier)(input)?;
    Ok((input, QueryItem { type_ref, modifiers }))
}

fn link(input: &str) -> PResult<'_, LinkMarker> {
    alt((
        value(LinkMarker::Short, lex(pchar('-'))),
        value(LinkMarker::Full, lex(pchar('='))),
    ))(input)
}

fn query(input: &str) -> PResult<'_, Ast> {
    let (input, profiles) = profiles(input)?;
    let (input, root) = item(input)?;
    let (input, sequence) = many0(map(pair(link, cut(item)), |(link, item)| LinkedItem {
        link,
        item,
    }))(input)?;
    Ok((
        input,
        Ast {
            profiles,
            root,
            sequence,
        },
    ))
}

/// Parse a query string into an [`Ast`].
pub fn parse(input: &str) -> Result<Ast, QueryError> {
    if input.trim().is_empty() {
        return Err(QueryError::Empty);
    }
    all_consuming(terminated(query, multispace0))(input)
        .map(|(_, ast)| ast)
        .map_err(|e| match e {
            nom::Err::Error(e) | nom::Err::Failure(e) => e.into_query_error(input),
            nom::Err::Incomplete(_) => QueryError::Unexpected {
                expected: END_OF_ITEM.to_string(),
                found: "end of query".to_string(),
                pos: input.len(),
            },
        })
}
