// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

//! Component-level regular expressions over names.
//!
//! A pattern is a sequence of component matchers:
//!
//! * `<re>` matches one component whose URI-escaped text fully matches the
//!   regular expression `re`; `<>` matches any component.
//! * `[<a><b>]` matches one component matching any member, `[^<a><b>]` one
//!   component matching none of them.
//! * `( ... )` is a capturing group over a run of components.
//!
//! Every matcher may be followed by a repeat: `*`, `+`, `?`, `{n}`, `{n,}`,
//! `{,m}` or `{n,m}`. A leading `^` and trailing `$` anchor the pattern to the
//! start and end of the name; without them any prefix or suffix is allowed.
//!
//! Groups are numbered from 1 in the order their opening parenthesis appears,
//! including groups written inside a component expression, which capture a
//! single component built from the matched text.

use std::fmt;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;

use crate::name::{Component, Name};

#[derive(Clone, Debug)]
struct ComponentMatcher {
    regex: Regex,
    /// Group index of the first inner capture, if the expression has any.
    first_group: usize,
}

impl ComponentMatcher {
    fn compile(expr: &str, first_group: usize) -> Result<Self> {
        let expr = if expr.is_empty() { ".*" } else { expr };
        let regex = Regex::new(&format!("^(?:{})$", expr))
            .with_context(|| format!("invalid component expression <{}>", expr))?;
        Ok(Self { regex, first_group })
    }

    fn inner_groups(&self) -> usize {
        self.regex.captures_len() - 1
    }

    fn is_match(&self, component: &Component) -> bool {
        self.regex.is_match(&component.to_escaped())
    }
}

#[derive(Clone, Debug)]
enum Atom {
    Component(ComponentMatcher),
    Set {
        negated: bool,
        members: Vec<ComponentMatcher>,
    },
    Group {
        index: usize,
        body: Vec<Node>,
    },
}

#[derive(Clone, Debug)]
struct Node {
    atom: Atom,
    min: usize,
    max: Option<usize>,
}

type Captures = Vec<Option<Name>>;
type Cont<'k> = dyn FnMut(usize, Captures) -> Option<Captures> + 'k;

/// A compiled name pattern.
#[derive(Clone, Debug)]
pub struct NamePattern {
    source: String,
    anchored_start: bool,
    anchored_end: bool,
    body: Vec<Node>,
    groups: usize,
}

/// Result of a successful match, used to build names from captures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternMatch {
    name: Name,
    captures: Captures,
}

impl PatternMatch {
    /// The name captured by group `index`; group 0 is the whole input.
    pub fn group(&self, index: usize) -> Option<&Name> {
        if index == 0 {
            return Some(&self.name);
        }
        self.captures.get(index).and_then(Option::as_ref)
    }

    /// Builds a name from `template`, a sequence of `\N` back references and
    /// `<literal>` components.
    pub fn expand(&self, template: &str) -> Result<Name> {
        let chars: Vec<char> = template.chars().collect();
        let mut out = Name::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '\\' => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && chars[end].is_ascii_digit() {
                        end += 1;
                    }
                    if end == start {
                        bail!("expected a group number in {:?}", template);
                    }
                    let index: usize = chars[start..end].iter().collect::<String>().parse()?;
                    let group = self
                        .group(index)
                        .ok_or_else(|| anyhow!("group \\{} did not participate", index))?;
                    out.extend(group);
                    i = end;
                }
                '<' => {
                    let end = chars[i..]
                        .iter()
                        .position(|c| *c == '>')
                        .map(|p| i + p)
                        .ok_or_else(|| anyhow!("unterminated literal in {:?}", template))?;
                    let text: String = chars[i + 1..end].iter().collect();
                    out.push(Component::from_escaped(&text)?);
                    i = end + 1;
                }
                c if c.is_whitespace() => i += 1,
                c => bail!("unexpected {:?} in expansion {:?}", c, template),
            }
        }

        Ok(out)
    }
}

impl NamePattern {
    pub fn new(source: &str) -> Result<Self> {
        let mut expr = source.trim();
        let anchored_start = expr.starts_with('^');
        if anchored_start {
            expr = &expr[1..];
        }
        let anchored_end = expr.ends_with('$') && !expr.ends_with("\\$");
        if anchored_end {
            expr = &expr[..expr.len() - 1];
        }

        let mut parser = Parser {
            chars: expr.chars().collect(),
            pos: 0,
            next_group: 1,
        };
        let body = parser
            .sequence(false)
            .with_context(|| format!("invalid name pattern {:?}", source))?;

        Ok(Self {
            source: source.to_string(),
            anchored_start,
            anchored_end,
            body,
            groups: parser.next_group - 1,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of capturing groups.
    pub fn groups(&self) -> usize {
        self.groups
    }

    pub fn is_match(&self, name: &Name) -> bool {
        self.captures(name).is_some()
    }

    pub fn captures(&self, name: &Name) -> Option<PatternMatch> {
        let components = name.components();
        let len = components.len();
        let starts: Vec<usize> = if self.anchored_start {
            vec![0]
        } else {
            std::iter::once(0).chain((1..=len).rev()).collect()
        };

        for start in starts {
            let anchored_end = self.anchored_end;
            let mut accept =
                |end: usize, caps: Captures| (!anchored_end || end == len).then_some(caps);
            let caps = vec![None; self.groups + 1];
            if let Some(captures) = match_seq(&self.body, components, start, caps, &mut accept) {
                return Some(PatternMatch {
                    name: name.clone(),
                    captures,
                });
            }
        }

        None
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn match_seq(
    nodes: &[Node],
    name: &[Component],
    pos: usize,
    caps: Captures,
    k: &mut Cont<'_>,
) -> Option<Captures> {
    match nodes.split_first() {
        None => k(pos, caps),
        Some((node, rest)) => match_repeat(node, name, pos, 0, caps, &mut |end, caps| {
            match_seq(rest, name, end, caps, k)
        }),
    }
}

fn match_repeat(
    node: &Node,
    name: &[Component],
    pos: usize,
    count: usize,
    caps: Captures,
    k: &mut Cont<'_>,
) -> Option<Captures> {
    if node.max.map_or(true, |max| count < max) {
        let found = match_atom(&node.atom, name, pos, caps.clone(), &mut |end, caps| {
            // A zero-width iteration only helps while the minimum is unmet.
            if end > pos || count < node.min {
                match_repeat(node, name, end, count + 1, caps, k)
            } else {
                None
            }
        });
        if found.is_some() {
            return found;
        }
    }

    if count >= node.min {
        k(pos, caps)
    } else {
        None
    }
}

fn match_atom(
    atom: &Atom,
    name: &[Component],
    pos: usize,
    mut caps: Captures,
    k: &mut Cont<'_>,
) -> Option<Captures> {
    match atom {
        Atom::Component(matcher) => {
            let text = name.get(pos)?.to_escaped();
            let found = matcher.regex.captures(&text)?;
            for i in 1..found.len() {
                if let Some(m) = found.get(i) {
                    caps[matcher.first_group + i - 1] =
                        Some(Name::from(vec![Component::from(m.as_str())]));
                }
            }
            k(pos + 1, caps)
        }

        Atom::Set { negated, members } => {
            let component = name.get(pos)?;
            let hit = members.iter().any(|m| m.is_match(component));
            if hit != *negated {
                k(pos + 1, caps)
            } else {
                None
            }
        }

        Atom::Group { index, body } => match_seq(body, name, pos, caps, &mut |end, mut caps| {
            caps[*index] = Some(Name::from(&name[pos..end]));
            k(end, caps)
        }),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    next_group: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn sequence(&mut self, in_group: bool) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();

        loop {
            let atom = match self.peek() {
                None if in_group => bail!("unclosed group"),
                None => break,
                Some(')') if in_group => {
                    self.pos += 1;
                    break;
                }
                Some('<') => {
                    let expr = self.component_expr()?;
                    let matcher = ComponentMatcher::compile(&expr, self.next_group)?;
                    self.next_group += matcher.inner_groups();
                    Atom::Component(matcher)
                }
                Some('[') => self.set()?,
                Some('(') => {
                    self.pos += 1;
                    let index = self.next_group;
                    self.next_group += 1;
                    let body = self.sequence(true)?;
                    Atom::Group { index, body }
                }
                Some(c) => bail!("unexpected {:?} at offset {}", c, self.pos),
            };

            let (min, max) = self.repeat()?;
            nodes.push(Node { atom, min, max });
        }

        Ok(nodes)
    }

    /// Reads `<...>` and returns the text between the outer brackets.
    fn component_expr(&mut self) -> Result<String> {
        let start = self.pos + 1;
        let mut depth = 0usize;

        while let Some(c) = self.peek() {
            match c {
                '<' => depth += 1,
                '>' => {
                    depth -= 1;
                    if depth == 0 {
                        let expr = self.chars[start..self.pos].iter().collect();
                        self.pos += 1;
                        return Ok(expr);
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }

        bail!("unterminated component expression")
    }

    fn set(&mut self) -> Result<Atom> {
        self.pos += 1;
        let negated = self.peek() == Some('^');
        if negated {
            self.pos += 1;
        }

        let mut members = Vec::new();
        loop {
            match self.peek() {
                Some(']') => {
                    self.pos += 1;
                    break;
                }
                Some('<') => {
                    let expr = self.component_expr()?;
                    members.push(ComponentMatcher::compile(&expr, 0)?);
                }
                Some(c) => bail!("unexpected {:?} in component set", c),
                None => bail!("unterminated component set"),
            }
        }

        if members.is_empty() {
            bail!("empty component set");
        }
        Ok(Atom::Set { negated, members })
    }

    fn repeat(&mut self) -> Result<(usize, Option<usize>)> {
        let bounds = match self.peek() {
            Some('*') => (0, None),
            Some('+') => (1, None),
            Some('?') => (0, Some(1)),
            Some('{') => {
                let end = self.chars[self.pos..]
                    .iter()
                    .position(|c| *c == '}')
                    .map(|p| self.pos + p)
                    .ok_or_else(|| anyhow!("unterminated repeat"))?;
                let body: String = self.chars[self.pos + 1..end].iter().collect();
                self.pos = end;

                let number = |s: &str| -> Result<usize> {
                    s.trim()
                        .parse()
                        .with_context(|| format!("invalid repeat bound {:?}", s))
                };
                let bounds = match body.split_once(',') {
                    None => {
                        let n = number(&body)?;
                        (n, Some(n))
                    }
                    Some((lo, hi)) => {
                        let lo = if lo.trim().is_empty() { 0 } else { number(lo)? };
                        let hi = if hi.trim().is_empty() {
                            None
                        } else {
                            Some(number(hi)?)
                        };
                        (lo, hi)
                    }
                };
                if bounds.1.map_or(false, |hi| hi < bounds.0) {
                    bail!("repeat bounds out of order in {{{}}}", body);
                }
                bounds
            }
            _ => return Ok((1, Some(1))),
        };

        self.pos += 1;
        Ok(bounds)
    }
}
