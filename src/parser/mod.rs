//! Query language parser
//!
//! A small JPQL-like dialect for the in-memory provider, built with nom:
//!
//! ```text
//! select b from Book b where b.id in :ids order by b.title desc
//! select count(b) from Book b where b.title like 'Rust%'
//! update Book b set b.title = :title where b.id = :id
//! delete from Book b where b.author.name is null
//! ```
//!
//! Keywords are case-insensitive. Entity names, aliases, and field names are case-sensitive.

pub mod ast;

use crate::core::{PersistenceError, Result};
use ast::*;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{char, digit1, multispace0, none_of, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value, verify},
    multi::{fold_many0, many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};
use serde_json::{Number, Value};

const RESERVED: &[&str] = &[
    "select", "from", "where", "and", "or", "not", "in", "is", "null", "like", "order", "by",
    "asc", "desc", "update", "set", "delete", "true", "false", "count", "as",
];

// =============================================================================
// MAIN PARSER ENTRY POINT
// =============================================================================

/// Parse a query string into a statement
pub fn parse_statement(ql: &str) -> Result<Statement> {
    match all_consuming(ws(statement))(ql) {
        Ok((_, stmt)) => Ok(stmt),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
            Err(PersistenceError::ParseError(format!(
                "Cannot parse '{}' near '{}'",
                ql,
                excerpt(err.input)
            )))
        }
        Err(nom::Err::Incomplete(_)) => Err(PersistenceError::ParseError(format!(
            "Incomplete query '{}'",
            ql
        ))),
    }
}

fn excerpt(input: &str) -> &str {
    match input.char_indices().nth(24) {
        Some((end, _)) => &input[..end],
        None => input,
    }
}

fn statement(input: &str) -> IResult<&str, Statement> {
    alt((select_stmt, update_stmt, delete_stmt))(input)
}

// =============================================================================
// STATEMENTS
// =============================================================================

fn select_stmt(input: &str) -> IResult<&str, Statement> {
    let (input, _) = kw("select")(input)?;
    let (input, projection) = ws(projection)(input)?;
    let (input, _) = kw("from")(input)?;
    let (input, from) = entity_ref(input)?;
    let (input, filter) = opt(where_clause)(input)?;
    let (input, order_by) = opt(order_by_clause)(input)?;

    Ok((
        input,
        Statement::Select(SelectStmt {
            projection,
            from,
            filter,
            order_by: order_by.unwrap_or_default(),
        }),
    ))
}

fn update_stmt(input: &str) -> IResult<&str, Statement> {
    let (input, _) = kw("update")(input)?;
    let (input, from) = entity_ref(input)?;
    let (input, _) = kw("set")(input)?;
    let (input, assignments) = separated_list1(ws(char(',')), assignment)(input)?;
    let (input, filter) = opt(where_clause)(input)?;

    Ok((
        input,
        Statement::Update(UpdateStmt {
            from,
            assignments,
            filter,
        }),
    ))
}

fn delete_stmt(input: &str) -> IResult<&str, Statement> {
    let (input, _) = kw("delete")(input)?;
    let (input, _) = kw("from")(input)?;
    let (input, from) = entity_ref(input)?;
    let (input, filter) = opt(where_clause)(input)?;

    Ok((input, Statement::Delete(DeleteStmt { from, filter })))
}

// =============================================================================
// CLAUSES
// =============================================================================

fn projection(input: &str) -> IResult<&str, Projection> {
    alt((
        map(
            preceded(
                kw("count"),
                delimited(ws(char('(')), ws(identifier), ws(char(')'))),
            ),
            Projection::Count,
        ),
        map(path, |path| {
            if path.fields.is_empty() {
                Projection::Entity(path.alias)
            } else {
                Projection::Path(path)
            }
        }),
    ))(input)
}

/// `Book b` or `Book as b`
fn entity_ref(input: &str) -> IResult<&str, EntityRef> {
    map(
        pair(ws(identifier), preceded(opt(kw("as")), ws(identifier))),
        |(entity, alias)| EntityRef { entity, alias },
    )(input)
}

fn where_clause(input: &str) -> IResult<&str, Condition> {
    preceded(kw("where"), condition)(input)
}

fn order_by_clause(input: &str) -> IResult<&str, Vec<OrderByExpr>> {
    preceded(
        pair(kw("order"), kw("by")),
        separated_list1(ws(char(',')), order_item),
    )(input)
}

fn order_item(input: &str) -> IResult<&str, OrderByExpr> {
    map(
        pair(
            ws(path),
            opt(alt((value(false, kw("asc")), value(true, kw("desc"))))),
        ),
        |(path, descending)| OrderByExpr {
            path,
            descending: descending.unwrap_or(false),
        },
    )(input)
}

fn assignment(input: &str) -> IResult<&str, Assignment> {
    map(
        tuple((ws(path), ws(char('=')), ws(operand))),
        |(path, _, value)| Assignment { path, value },
    )(input)
}

// =============================================================================
// CONDITIONS
// =============================================================================

/// Lowest precedence: `or`
fn condition(input: &str) -> IResult<&str, Condition> {
    let (input, first) = and_condition(input)?;
    fold_many0(
        preceded(kw("or"), and_condition),
        move || first.clone(),
        |left, right| Condition::Or(Box::new(left), Box::new(right)),
    )(input)
}

fn and_condition(input: &str) -> IResult<&str, Condition> {
    let (input, first) = not_condition(input)?;
    fold_many0(
        preceded(kw("and"), not_condition),
        move || first.clone(),
        |left, right| Condition::And(Box::new(left), Box::new(right)),
    )(input)
}

fn not_condition(input: &str) -> IResult<&str, Condition> {
    alt((
        map(preceded(kw("not"), not_condition), |inner| {
            Condition::Not(Box::new(inner))
        }),
        delimited(ws(char('(')), condition, ws(char(')'))),
        predicate,
    ))(input)
}

enum PredicateTail {
    Compare(CompareOp, Operand),
    In(InList, bool),
    IsNull(bool),
    Like(Operand, bool),
}

fn predicate(input: &str) -> IResult<&str, Condition> {
    let (input, left) = ws(operand)(input)?;
    let (input, tail) = alt((
        map(
            tuple((kw("is"), opt(kw("not")), kw("null"))),
            |(_, negated, _)| PredicateTail::IsNull(negated.is_some()),
        ),
        map(
            tuple((opt(kw("not")), kw("in"), in_list)),
            |(negated, _, list)| PredicateTail::In(list, negated.is_some()),
        ),
        map(
            tuple((opt(kw("not")), kw("like"), ws(operand))),
            |(negated, _, pattern)| PredicateTail::Like(pattern, negated.is_some()),
        ),
        map(pair(ws(compare_op), ws(operand)), |(op, right)| {
            PredicateTail::Compare(op, right)
        }),
    ))(input)?;

    let condition = match tail {
        PredicateTail::Compare(op, right) => Condition::Compare { left, op, right },
        PredicateTail::In(list, negated) => Condition::In {
            operand: left,
            list,
            negated,
        },
        PredicateTail::IsNull(negated) => Condition::IsNull {
            operand: left,
            negated,
        },
        PredicateTail::Like(pattern, negated) => Condition::Like {
            operand: left,
            pattern,
            negated,
        },
    };
    Ok((input, condition))
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    // Two-character operators first
    alt((
        value(CompareOp::LtEq, tag("<=")),
        value(CompareOp::GtEq, tag(">=")),
        value(CompareOp::NotEq, tag("<>")),
        value(CompareOp::NotEq, tag("!=")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Gt, tag(">")),
        value(CompareOp::Eq, tag("=")),
    ))(input)
}

fn in_list(input: &str) -> IResult<&str, InList> {
    alt((
        map(ws(parameter), InList::Parameter),
        map(
            delimited(
                ws(char('(')),
                separated_list1(ws(char(',')), ws(operand)),
                ws(char(')')),
            ),
            InList::Values,
        ),
    ))(input)
}

// =============================================================================
// OPERANDS
// =============================================================================

fn operand(input: &str) -> IResult<&str, Operand> {
    alt((
        map(parameter, Operand::Parameter),
        map(literal, Operand::Literal),
        map(path, Operand::Path),
    ))(input)
}

/// `:name`
fn parameter(input: &str) -> IResult<&str, String> {
    preceded(char(':'), map(name, str::to_string))(input)
}

fn literal(input: &str) -> IResult<&str, Value> {
    alt((
        string_literal,
        number_literal,
        value(Value::Bool(true), keyword("true")),
        value(Value::Bool(false), keyword("false")),
        value(Value::Null, keyword("null")),
    ))(input)
}

/// Single-quoted, `''` escapes a quote
fn string_literal(input: &str) -> IResult<&str, Value> {
    map(
        delimited(
            char('\''),
            fold_many0(
                alt((value('\'', tag("''")), none_of("'"))),
                String::new,
                |mut text, c| {
                    text.push(c);
                    text
                },
            ),
            char('\''),
        ),
        Value::String,
    )(input)
}

fn number_literal(input: &str) -> IResult<&str, Value> {
    map_res(
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(pair(char('.'), digit1)),
        ))),
        parse_number,
    )(input)
}

fn parse_number(text: &str) -> std::result::Result<Value, String> {
    if text.contains('.') {
        let float: f64 = text.parse().map_err(|_| format!("invalid number {}", text))?;
        Number::from_f64(float)
            .map(Value::Number)
            .ok_or_else(|| format!("invalid number {}", text))
    } else {
        let int: i64 = text.parse().map_err(|_| format!("invalid number {}", text))?;
        Ok(Value::from(int))
    }
}

/// `alias` or `alias.field.nested`
fn path(input: &str) -> IResult<&str, Path> {
    map(
        pair(identifier, many0(preceded(char('.'), map(name, str::to_string)))),
        |(alias, fields)| Path { alias, fields },
    )(input)
}

// =============================================================================
// LEXICAL HELPERS
// =============================================================================

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|reserved| reserved.eq_ignore_ascii_case(word))
}

/// Any identifier-shaped word, reserved or not
fn name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(input)
}

/// A name that is not a keyword
fn identifier(input: &str) -> IResult<&str, String> {
    map(verify(name, |word: &str| !is_reserved(word)), str::to_string)(input)
}

/// Case-insensitive keyword that is not a prefix of a longer word
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag_no_case(word), not(satisfy(is_ident_char)))
}

fn kw<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    ws(keyword(word))
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}
