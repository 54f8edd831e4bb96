//! A small XML element parser, enough for IR documents.
//!
//! Handles the prolog, comments, CDATA sections, processing instructions and character
//! references. A DOCTYPE is skipped, namespaces stay part of the names.
use lucid_core::internal::*;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_until, take_while, take_while1};
use nom::character::complete::{char, multispace0, multispace1};
use nom::combinator::{all_consuming, cut, map, opt, value};
use nom::error::{ErrorKind, ParseError, context};
use nom::multi::many0;
use nom::sequence::{delimited, preceded};
use nom::{IResult, Parser};
use nom_language::error::{VerboseError, VerboseErrorKind};

type R<'i, O> = IResult<&'i str, O, VerboseError<&'i str>>;

/// Element nesting accepted before giving up.
pub const MAX_DEPTH: usize = 128;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Character data of the element itself, entity references decoded.
    pub text: String,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

pub fn parse_document(doc: &str) -> DecodeResult<Element> {
    match all_consuming(document).parse(doc) {
        Ok((_, root)) => Ok(root),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(translate_error(doc, e)),
        Err(nom::Err::Incomplete(_)) => Err(DecodeError::truncated(crate::OPENVINO, "document ends early")),
    }
}

fn translate_error(doc: &str, e: VerboseError<&str>) -> DecodeError {
    let rest = e.errors.first().map(|(rest, _)| *rest).unwrap_or("");
    let offset = doc.len().saturating_sub(rest.len());
    let context = e.errors.iter().find_map(|(_, kind)| match kind {
        VerboseErrorKind::Context(c) => Some(*c),
        _ => None,
    });
    let message = match context {
        Some(c) => format!("invalid XML ({c})"),
        None => "invalid XML".to_string(),
    };
    if rest.trim().is_empty() {
        DecodeError::truncated(crate::OPENVINO, message).at(offset)
    } else {
        DecodeError::malformed(crate::OPENVINO, message).at(offset)
    }
}

fn document(i: &str) -> R<'_, Element> {
    let (i, _) = opt(lit("\u{feff}")).parse(i)?;
    let (i, _) = misc(i)?;
    let (i, _) = opt(doctype).parse(i)?;
    let (i, _) = misc(i)?;
    let (i, root) = context("element", |i| element(0, i)).parse(i)?;
    let (i, _) = misc(i)?;
    Ok((i, root))
}

/// Whitespace, comments and processing instructions outside the root element.
fn misc(i: &str) -> R<'_, ()> {
    value((), many0(alt((value((), multispace1), comment, pi)))).parse(i)
}

fn comment(i: &str) -> R<'_, ()> {
    value((), (lit("<!--"), take_until("-->"), lit("-->"))).parse(i)
}

fn pi(i: &str) -> R<'_, ()> {
    value((), (lit("<?"), take_until("?>"), lit("?>"))).parse(i)
}

fn doctype(i: &str) -> R<'_, ()> {
    value((), (lit("<!DOCTYPE"), take_until(">"), lit(">"))).parse(i)
}

fn cdata(i: &str) -> R<'_, &str> {
    delimited(lit("<![CDATA["), take_until("]]>"), lit("]]>")).parse(i)
}

fn lit<'i>(t: &'static str) -> impl Parser<&'i str, Output = &'i str, Error = VerboseError<&'i str>> {
    tag(t)
}

fn ws(i: &str) -> R<'_, &str> {
    multispace0(i)
}

fn name(i: &str) -> R<'_, &str> {
    take_while1(|c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')).parse(i)
}

fn quoted(i: &str) -> R<'_, &str> {
    alt((
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
    ))
    .parse(i)
}

fn attribute(i: &str) -> R<'_, (String, String)> {
    let (i, key) = name(i)?;
    let (i, (_, _, _, raw)) = cut((ws, char('='), ws, context("attribute value", quoted))).parse(i)?;
    Ok((i, (key.to_string(), unescape(raw).into_owned())))
}

enum Content {
    Element(Element),
    Text(String),
    Skip,
}

fn content(depth: usize, i: &str) -> R<'_, Content> {
    alt((
        map(comment, |_| Content::Skip),
        map(pi, |_| Content::Skip),
        map(cdata, |s| Content::Text(s.to_string())),
        map(|i| element(depth + 1, i), Content::Element),
        map(take_while1(|c: char| c != '<'), |s| Content::Text(unescape(s).into_owned())),
    ))
    .parse(i)
}

fn element(depth: usize, i: &str) -> R<'_, Element> {
    if depth > MAX_DEPTH {
        return Err(nom::Err::Failure(VerboseError::from_error_kind(i, ErrorKind::TooLarge)));
    }
    let (i, _) = char('<').parse(i)?;
    let (i, tag_name) = name(i)?;
    // nothing else starts with `<name`
    cut(|i| element_body(depth, tag_name, i)).parse(i)
}

fn element_body<'i>(depth: usize, tag_name: &str, i: &'i str) -> R<'i, Element> {
    let (i, attributes) = many0(preceded(multispace1, attribute)).parse(i)?;
    let (i, _) = ws(i)?;
    let mut element = Element { name: tag_name.to_string(), attributes, ..Element::default() };
    if let (i, Some(_)) = opt(lit("/>")).parse(i)? {
        return Ok((i, element));
    }
    let (mut i, _) = char('>').parse(i)?;
    loop {
        if i.is_empty() {
            let errors = vec![(i, VerboseErrorKind::Context("unclosed element"))];
            return Err(nom::Err::Failure(VerboseError { errors }));
        }
        if let (rest, Some(_)) = opt(lit("</")).parse(i)? {
            let (rest, closing) = name(rest)?;
            if closing != tag_name {
                let errors = vec![(rest, VerboseErrorKind::Context("mismatched closing tag"))];
                return Err(nom::Err::Failure(VerboseError { errors }));
            }
            let (rest, _) = (ws, char('>')).parse(rest)?;
            return Ok((rest, element));
        }
        let (rest, item) = content(depth, i)?;
        match item {
            Content::Element(child) => element.children.push(child),
            Content::Text(text) => element.text.push_str(&text),
            Content::Skip => (),
        }
        i = rest;
    }
}

fn unescape(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let decoded = rest
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| Some((reference(&rest[1..end])?, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn reference(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => name.strip_prefix('#')?.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
