// src/template.rs

//! Placeholder templates over strings and records.
//!
//! The grammar is the classic dollar form: `$name` or `${name}` marks a
//! placeholder, `$$` is a literal `$`, and anything else passes through.
//! Substitution is *safe*: placeholders without a binding in the
//! environment are left untouched, so partially resolved values can make
//! another pass later.
//!
//! [`Templated`] extends the two string operations ([`gather_args`],
//! [`substitute`]) over optional values, lists, and record types such as
//! `TaskSpec`, by exhaustive recursion into their fields.

use std::collections::{BTreeSet, HashMap};

/// Anything placeholders can be collected from and substituted into.
pub trait Templated: Sized {
    fn gather(&self, out: &mut BTreeSet<String>);
    fn substitute(&self, env: &HashMap<String, String>) -> Self;
}

/// Collect the set of placeholder identifiers in `value`.
pub fn gather_args<T: Templated>(value: &T) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    value.gather(&mut out);
    out
}

/// Replace placeholders in `value` from `env`, leaving unknown ones intact.
pub fn substitute<T: Templated>(value: &T, env: &HashMap<String, String>) -> T {
    value.substitute(env)
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

/// One lexed unit of a template string.
enum Token<'a> {
    /// Literal text, passed through verbatim.
    Text(&'a str),
    /// An escaped `$$`.
    Dollar,
    /// A placeholder; `braced` decides how it renders when unknown.
    Placeholder { name: &'a str, braced: bool },
}

fn tokens(template: &str) -> impl Iterator<Item = Token<'_>> {
    let mut rest = template;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match rest.find('$') {
            None => {
                let text = rest;
                rest = "";
                Some(Token::Text(text))
            }
            Some(0) => {
                let after = &rest[1..];
                if let Some(tail) = after.strip_prefix('$') {
                    rest = tail;
                    return Some(Token::Dollar);
                }
                if let Some(tail) = after.strip_prefix('{') {
                    // ${name}: anything malformed stays literal text.
                    if let Some(end) = tail.find('}') {
                        let name = &tail[..end];
                        let mut chars = name.chars();
                        let valid = chars
                            .next()
                            .map(is_ident_start)
                            .unwrap_or(false)
                            && name.chars().skip(1).all(is_ident_continue);
                        if valid {
                            rest = &tail[end + 1..];
                            return Some(Token::Placeholder { name, braced: true });
                        }
                    }
                    let text = &rest[..1];
                    rest = after;
                    return Some(Token::Text(text));
                }
                let ident_len = after
                    .char_indices()
                    .take_while(|&(i, c)| {
                        if i == 0 {
                            is_ident_start(c)
                        } else {
                            is_ident_continue(c)
                        }
                    })
                    .count();
                if ident_len == 0 {
                    let text = &rest[..1];
                    rest = after;
                    return Some(Token::Text(text));
                }
                let name = &after[..ident_len];
                rest = &after[ident_len..];
                Some(Token::Placeholder { name, braced: false })
            }
            Some(pos) => {
                let text = &rest[..pos];
                rest = &rest[pos..];
                Some(Token::Text(text))
            }
        }
    })
}

impl Templated for String {
    fn gather(&self, out: &mut BTreeSet<String>) {
        for token in tokens(self) {
            if let Token::Placeholder { name, .. } = token {
                out.insert(name.to_string());
            }
        }
    }

    fn substitute(&self, env: &HashMap<String, String>) -> String {
        let mut result = String::with_capacity(self.len());
        for token in tokens(self) {
            match token {
                Token::Text(text) => result.push_str(text),
                Token::Dollar => result.push('$'),
                Token::Placeholder { name, braced } => match env.get(name) {
                    Some(value) => result.push_str(value),
                    None if braced => {
                        result.push_str("${");
                        result.push_str(name);
                        result.push('}');
                    }
                    None => {
                        result.push('$');
                        result.push_str(name);
                    }
                },
            }
        }
        result
    }
}

impl<T: Templated> Templated for Option<T> {
    fn gather(&self, out: &mut BTreeSet<String>) {
        if let Some(inner) = self {
            inner.gather(out);
        }
    }

    fn substitute(&self, env: &HashMap<String, String>) -> Self {
        self.as_ref().map(|inner| inner.substitute(env))
    }
}

impl<T: Templated> Templated for Vec<T> {
    fn gather(&self, out: &mut BTreeSet<String>) {
        for item in self {
            item.gather(out);
        }
    }

    fn substitute(&self, env: &HashMap<String, String>) -> Self {
        self.iter().map(|item| item.substitute(env)).collect()
    }
}
