//! A small filter expression language: `~d example.com & !~c 404`.
//!
//! This is the one concrete implementation of `flow_domain::Filter` shipped
//! with the core; the grammar is an external collaborator, so callers are
//! free to swap in a different compiled predicate as long as it implements
//! the trait.

use flow_domain::{Filter, Request, Response};
use regex::Regex;

#[derive(Debug)]
enum Node {
    All,
    Domain(String),
    Method(String),
    Path(Regex),
    Code(u16),
    Asset(String),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

impl Filter for Node {
    fn evaluate(&self, request: &Request, response: Option<&Response>) -> bool {
        match self {
            Node::All => true,
            Node::Domain(d) => request.host.eq_ignore_ascii_case(d) || request.host.to_ascii_lowercase().ends_with(&format!(".{}", d.to_ascii_lowercase())),
            Node::Method(m) => request.method.eq_ignore_ascii_case(m),
            Node::Path(re) => re.is_match(&request.path),
            Node::Code(code) => response.map(|r| r.status_code == *code).unwrap_or(false),
            Node::Asset(ct) => response
                .map(|r| r.headers.get_first("content-type").map(|v| v.contains(ct.as_str())).unwrap_or(false))
                .unwrap_or(false),
            Node::Not(inner) => !inner.evaluate(request, response),
            Node::And(a, b) => a.evaluate(request, response) && b.evaluate(request, response),
            Node::Or(a, b) => a.evaluate(request, response) || b.evaluate(request, response),
        }
    }
}

/// Parses filter expression text into a compiled predicate. Never panics;
/// malformed input returns a diagnostic string.
pub fn parse(text: &str) -> Result<Box<dyn Filter>, String> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Err("empty filter expression".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("unexpected trailing token {:?}", parser.tokens[parser.pos]));
    }
    Ok(Box::new(node))
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' | ')' | '&' | '|' | '!' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn advance(&mut self) -> Option<String> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: &str) -> Result<(), String> {
        match self.advance() {
            Some(t) if t == tok => Ok(()),
            Some(t) => Err(format!("expected {tok:?}, found {t:?}")),
            None => Err(format!("expected {tok:?}, found end of input")),
        }
    }

    fn parse_or(&mut self) -> Result<Node, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some("|") {
            self.advance();
            let right = self.parse_and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, String> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some("&") {
            self.advance();
            let right = self.parse_unary()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, String> {
        if self.peek() == Some("!") {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Node, String> {
        if self.peek() == Some("(") {
            self.advance();
            let inner = self.parse_or()?;
            self.expect(")")?;
            return Ok(inner);
        }

        let token = self.advance().ok_or_else(|| "unexpected end of filter expression".to_string())?;
        match token.as_str() {
            "~all" => Ok(Node::All),
            "~d" => Ok(Node::Domain(self.argument("~d")?)),
            "~m" => Ok(Node::Method(self.argument("~m")?)),
            "~u" => {
                let arg = self.argument("~u")?;
                Regex::new(&arg).map(Node::Path).map_err(|e| format!("invalid ~u regex {arg:?}: {e}"))
            }
            "~c" => {
                let arg = self.argument("~c")?;
                arg.parse::<u16>().map(Node::Code).map_err(|_| format!("invalid ~c status code {arg:?}"))
            }
            "~a" => Ok(Node::Asset(self.argument("~a")?)),
            other => Err(format!("unrecognized filter token {other:?}")),
        }
    }

    fn argument(&mut self, atom: &str) -> Result<String, String> {
        self.advance().ok_or_else(|| format!("{atom} requires an argument"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_domain::Request;

    fn req(host: &str, method: &str, path: &str) -> Request {
        Request::new(host, 80, "http", method, path)
    }

    #[test]
    fn domain_atom_matches_suffix() {
        let f = parse("~d example.com").unwrap();
        assert!(f.evaluate(&req("foo.example.com", "GET", "/"), None));
        assert!(f.evaluate(&req("example.com", "GET", "/"), None));
        assert!(!f.evaluate(&req("example.org", "GET", "/"), None));
    }

    #[test]
    fn negation_and_conjunction() {
        let f = parse("~m GET & !~u /admin").unwrap();
        assert!(f.evaluate(&req("x", "GET", "/home"), None));
        assert!(!f.evaluate(&req("x", "GET", "/admin"), None));
        assert!(!f.evaluate(&req("x", "POST", "/home"), None));
    }

    #[test]
    fn parens_override_precedence() {
        let f = parse("~m GET | (~m POST & ~u /x)").unwrap();
        assert!(f.evaluate(&req("x", "POST", "/x"), None));
        assert!(!f.evaluate(&req("x", "POST", "/y"), None));
    }

    #[test]
    fn parse_failure_is_a_diagnostic_not_a_panic() {
        assert!(parse("~d").is_err());
        assert!(parse("~z foo").is_err());
        assert!(parse("(~m GET").is_err());
    }
}
