//! A small nom-based parser for Graph Modelling Language (GML) topology files.
//!
//! Adapted from a standalone GML parser crate into an internal module: the
//! combinators below are kept close to that original shape (key/value items,
//! `node [...]` / `edge [...]` blocks, a top-level `directed` flag) since the
//! format itself is tiny and rarely needs to grow.

use std::borrow::Cow;
use std::collections::HashMap;

use nom::{
    bytes::complete::{escaped_transform, is_not, tag, take, take_while},
    character::complete::{digit1, multispace0, multispace1, space0},
    character::{is_alphabetic, is_alphanumeric},
    combinator::{self, map_res, recognize, verify},
    error::{ErrorKind, FromExternalError, ParseError},
    sequence::tuple,
    Finish, IResult, Parser,
};
use nom_language::error::VerboseError;

/// A parsed value attached to a GML key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Int(i32),
    Float(f32),
    Str(Cow<'a, str>),
}

impl<'a> Value<'a> {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f32),
            _ => None,
        }
    }
}

/// A `node [ ... ]` block.
#[derive(Debug, Clone)]
pub struct Node<'a> {
    pub id: Option<u32>,
    pub other: HashMap<Cow<'a, str>, Value<'a>>,
}

/// An `edge [ ... ]` block.
#[derive(Debug, Clone)]
pub struct Edge<'a> {
    pub source: u32,
    pub target: u32,
    pub other: HashMap<Cow<'a, str>, Value<'a>>,
}

/// A fully parsed graph.
#[derive(Debug, Clone)]
pub struct Gml<'a> {
    pub directed: bool,
    pub nodes: Vec<Node<'a>>,
    pub edges: Vec<Edge<'a>>,
}

enum GmlItem<'a> {
    Node(Node<'a>),
    Edge(Edge<'a>),
    Directed(bool),
    KeyValue((Cow<'a, str>, Value<'a>)),
}

trait GmlParseError<'a>:
    ParseError<&'a str>
    + FromExternalError<&'a str, std::num::ParseIntError>
    + FromExternalError<&'a str, std::num::ParseFloatError>
    + FromExternalError<&'a str, &'a str>
    + std::fmt::Debug
{
}
impl<'a, T> GmlParseError<'a> for T where
    T: ParseError<&'a str>
        + FromExternalError<&'a str, std::num::ParseIntError>
        + FromExternalError<&'a str, std::num::ParseFloatError>
        + FromExternalError<&'a str, &'a str>
        + std::fmt::Debug
{
}

/// Parse a GML topology string. On syntax error, returns a human-readable
/// multi-line message pointing at the offending input.
pub fn parse(gml_str: &str) -> Result<Gml<'_>, String> {
    match gml::<VerboseError<&str>>(gml_str).finish() {
        Ok((_remaining, graph)) => Ok(graph),
        Err(e) => Err(nom_language::error::convert_error(gml_str, e)),
    }
}

fn take_verify<'a, E: GmlParseError<'a>>(
    count: u32,
    cond: impl Fn(char) -> bool,
) -> impl Fn(&'a str) -> IResult<&'a str, &'a str, E> {
    move |i| verify(take(count), |s: &str| s.chars().all(&cond)).parse(i)
}

fn key<'a, E: GmlParseError<'a>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    let take_first = take_verify(1, |chr| is_alphabetic(chr as u8) || chr == '_');
    let take_remaining = take_while(|chr| is_alphanumeric(chr as u8) || chr == '_');
    let (input, key) = recognize(tuple((take_first, take_remaining))).parse(input)?;
    Ok((input, key))
}

fn item<'a, E: GmlParseError<'a>>(input: &'a str) -> IResult<&'a str, GmlItem<'a>, E> {
    match key(input)? {
        (input, "node") => node(input).map(|(input, n)| (input, GmlItem::Node(n))),
        (input, "edge") => edge(input).map(|(input, e)| (input, GmlItem::Edge(e))),
        (input, "directed") => {
            int_as_bool(input).map(|(input, v)| (input, GmlItem::Directed(v)))
        }
        (input, name) => value(input).map(|(input, v)| (input, GmlItem::KeyValue((name.into(), v)))),
    }
}

fn gml<'a, E: GmlParseError<'a>>(input: &'a str) -> IResult<&'a str, Gml<'a>, E> {
    let (input, _) = multispace0(input)?;
    let (input, _) = tag("graph")(input)?;
    let (input, _) = space0(input)?;
    let (input, _) = tag("[")(input)?;
    let (input, _) = newline(input)?;

    let (input, (items, _)) = nom::multi::many_till(item, tag("]")).parse(input)?;

    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut directed_flags = Vec::new();
    for it in items {
        match it {
            GmlItem::Node(n) => nodes.push(n),
            GmlItem::Edge(e) => edges.push(e),
            GmlItem::Directed(d) => directed_flags.push(d),
            GmlItem::KeyValue(_) => {}
        }
    }

    if directed_flags.len() > 1 {
        result_str_to_nom::<(), E>(
            input,
            Err("the 'directed' key must only be specified once"),
            ErrorKind::Fail,
        )?;
    }
    // GML graphs are undirected by default.
    let directed = directed_flags.first().copied().unwrap_or(false);

    let (input, _) = multispace0(input)?;

    Ok((input, Gml { directed, nodes, edges }))
}

fn node<'a, E: GmlParseError<'a>>(input: &'a str) -> IResult<&'a str, Node<'a>, E> {
    let (input, _) = space0(input)?;
    let (input, _) = tag("[")(input)?;
    let (input, _) = newline(input)?;

    let (input, (key_values, _)) =
        nom::multi::many_till(tuple((key, value)), tag("]")).parse(input)?;
    let expected_len = key_values.len();
    let mut key_values: HashMap<_, _> = key_values.into_iter().collect();
    if key_values.len() != expected_len {
        result_str_to_nom::<(), E>(input, Err("duplicate keys are not supported"), ErrorKind::Fail)?;
    }
    let (input, _) = newline(input)?;

    let id = match key_values.remove("id") {
        Some(Value::Int(x)) => Some(x as u32),
        Some(_) => result_str_to_nom::<_, E>(input, Err("incorrect 'id' type"), ErrorKind::Fail)?,
        None => None,
    };

    Ok((input, Node { id, other: key_values }))
}

fn edge<'a, E: GmlParseError<'a>>(input: &'a str) -> IResult<&'a str, Edge<'a>, E> {
    let (input, _) = space0(input)?;
    let (input, _) = tag("[")(input)?;
    let (input, _) = newline(input)?;

    let (input, (key_values, _)) =
        nom::multi::many_till(tuple((key, value)), tag("]")).parse(input)?;
    let expected_len = key_values.len();
    let mut key_values: HashMap<_, _> = key_values.into_iter().collect();
    if key_values.len() != expected_len {
        result_str_to_nom::<(), E>(input, Err("duplicate keys are not supported"), ErrorKind::Fail)?;
    }
    let (input, _) = newline(input)?;

    let source = match key_values.remove("source") {
        Some(Value::Int(x)) => x,
        Some(_) => result_str_to_nom::<_, E>(input, Err("incorrect 'source' type"), ErrorKind::Fail)?,
        None => result_str_to_nom::<_, E>(input, Err("'source' doesn't exist"), ErrorKind::NoneOf)?,
    };
    let target = match key_values.remove("target") {
        Some(Value::Int(x)) => x,
        Some(_) => result_str_to_nom::<_, E>(input, Err("incorrect 'target' type"), ErrorKind::Fail)?,
        None => result_str_to_nom::<_, E>(input, Err("'target' doesn't exist"), ErrorKind::NoneOf)?,
    };

    Ok((
        input,
        Edge { source: source as u32, target: target as u32, other: key_values },
    ))
}

fn value<'a, E: GmlParseError<'a>>(input: &'a str) -> IResult<&'a str, Value<'a>, E> {
    let (input, _) = space0(input)?;
    let (input, (value, _)) = nom::branch::alt((
        tuple((int, newline)),
        tuple((float, newline)),
        tuple((string, newline)),
    ))
    .parse(input)?;
    Ok((input, value))
}

fn int<'a, E: GmlParseError<'a>>(input: &'a str) -> IResult<&'a str, Value<'a>, E> {
    let (input, v) = map_res(recognize(digit1), str::parse).parse(input)?;
    Ok((input, Value::Int(v)))
}

fn float<'a, E: GmlParseError<'a>>(input: &'a str) -> IResult<&'a str, Value<'a>, E> {
    let (input, v) = map_res(nom::number::complete::recognize_float, str::parse).parse(input)?;
    Ok((input, Value::Float(v)))
}

fn string<'a, E: GmlParseError<'a>>(input: &'a str) -> IResult<&'a str, Value<'a>, E> {
    let (input, _) = tag("\"")(input)?;
    let (input, v) = escaped_transform(
        is_not("\""),
        '\\',
        nom::branch::alt((
            combinator::value("\\", tag("\\")),
            combinator::value("\"", tag("\"")),
        )),
    )(input)?;
    let (input, _) = tag("\"")(input)?;
    Ok((input, Value::Str(v.into())))
}

fn newline<'a, E: GmlParseError<'a>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    recognize(tuple((space0, multispace1, space0))).parse(input)
}

fn int_as_bool<'a, E: GmlParseError<'a>>(input: &'a str) -> IResult<&'a str, bool, E> {
    let (input, v) = value(input)?;
    let v = match v {
        Value::Int(1) => true,
        Value::Int(0) => false,
        Value::Int(_) => result_str_to_nom::<_, E>(input, Err("bool must be 0 or 1"), ErrorKind::Fail)?,
        _ => result_str_to_nom::<_, E>(input, Err("value was not an integer"), ErrorKind::Fail)?,
    };
    Ok((input, v))
}

fn result_str_to_nom<'a, T, E: GmlParseError<'a>>(
    input: &'a str,
    result: Result<T, &'a str>,
    error_kind: ErrorKind,
) -> Result<T, nom::Err<E>> {
    result.map_err(|e| nom::Err::Failure(E::from_external_error(input, error_kind, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_graph() {
        let src = r#"
graph [
  node [
    id 0
    bandwidth_down "1 Gbit"
  ]
  node [
    id 1
  ]
  edge [
    source 0
    target 1
    latency 10
  ]
]"#;
        let g = parse(src).unwrap();
        assert!(!g.directed);
        assert_eq!(g.nodes.len(), 2);
        assert_eq!(g.edges.len(), 1);
        assert_eq!(g.edges[0].source, 0);
        assert_eq!(g.edges[0].target, 1);
    }

    #[test]
    fn parses_directed_flag() {
        let src = "graph [\n  directed 1\n  node [\n    id 0\n  ]\n]";
        let g = parse(src).unwrap();
        assert!(g.directed);
    }

    #[test]
    fn rejects_duplicate_keys_in_node() {
        let src = "graph [\n  node [\n    id 0\n    id 1\n  ]\n]";
        assert!(parse(src).is_err());
    }

    #[test]
    fn rejects_edge_missing_target() {
        let src = "graph [\n  edge [\n    source 0\n  ]\n]";
        assert!(parse(src).is_err());
    }
}
