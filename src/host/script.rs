//! Script facility of the demo host.
//!
//! Understands just enough of a Python-flavored automation dialect to
//! exercise the endpoint end to end: `print(...)` of string literals and
//! integer arithmetic, `time.sleep(...)`, and `import` statements as
//! no-ops. Anything else aborts the fragment with a script error, which
//! the endpoint forwards to the client.

use crate::host::HostError;

use std::time::Duration;

/// Run a fragment and return its captured standard output.
pub(super) fn run(source: &str) -> Result<String, HostError> {
    let mut stdout = String::new();

    for raw in source.split(['\n', ';']) {
        let stmt = raw.trim();
        if stmt.is_empty() || stmt.starts_with('#') {
            continue;
        }
        if stmt.starts_with("import ") || stmt.starts_with("from ") {
            continue;
        }

        if let Some(args) = call_args(stmt, "time.sleep") {
            let secs: f64 = args
                .trim()
                .parse()
                .map_err(|_| HostError::Script(format!("invalid sleep duration: {}", args)))?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(HostError::Script(format!(
                    "invalid sleep duration: {}",
                    args
                )));
            }
            std::thread::sleep(Duration::from_secs_f64(secs));
        } else if let Some(args) = call_args(stmt, "print") {
            let value = eval(args)?;
            stdout.push_str(&value);
            stdout.push('\n');
        } else {
            return Err(HostError::Script(format!(
                "unsupported statement: {}",
                stmt
            )));
        }
    }

    Ok(stdout)
}

/// If `stmt` is a call of `name`, return the text between its parentheses.
fn call_args<'a>(stmt: &'a str, name: &str) -> Option<&'a str> {
    stmt.strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

/// Evaluate a print argument: a quoted string literal, or an integer
/// expression with `+ - * /`, parentheses and unary minus.
fn eval(expr: &str) -> Result<String, HostError> {
    let expr = expr.trim();

    if let Some(inner) = string_literal(expr) {
        return Ok(inner.to_string());
    }

    let mut parser = ExprParser::new(expr);
    let value = parser.expression()?;
    parser.expect_end()?;
    Ok(value.to_string())
}

fn string_literal(expr: &str) -> Option<&str> {
    let bytes = expr.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let quote = bytes[0];
    if (quote != b'\'' && quote != b'"') || bytes[bytes.len() - 1] != quote {
        return None;
    }
    let inner = &expr[1..expr.len() - 1];
    if inner.contains(quote as char) {
        return None;
    }
    Some(inner)
}

/// Recursive-descent evaluator over checked `i64` arithmetic.
struct ExprParser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn new(src: &'a str) -> ExprParser<'a> {
        ExprParser {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn expression(&mut self) -> Result<i64, HostError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    value = value.checked_add(rhs).ok_or_else(|| self.overflow())?;
                }
                Some(b'-') => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    value = value.checked_sub(rhs).ok_or_else(|| self.overflow())?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<i64, HostError> {
        let mut value = self.factor()?;
        loop {
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    value = value.checked_mul(rhs).ok_or_else(|| self.overflow())?;
                }
                Some(b'/') => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    if rhs == 0 {
                        return Err(HostError::Script("division by zero".into()));
                    }
                    value = value / rhs;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<i64, HostError> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.expression()?;
                match self.peek() {
                    Some(b')') => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err(self.invalid()),
                }
            }
            Some(b'-') => {
                self.pos += 1;
                let value = self.factor()?;
                value.checked_neg().ok_or_else(|| self.overflow())
            }
            Some(c) if c.is_ascii_digit() => self.integer(),
            _ => Err(self.invalid()),
        }
    }

    fn integer(&mut self) -> Result<i64, HostError> {
        let start = self.pos;
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit())
        {
            self.pos += 1;
        }
        self.src[start..self.pos]
            .parse::<i64>()
            .map_err(|_| self.overflow())
    }

    fn expect_end(&mut self) -> Result<(), HostError> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.invalid()),
        }
    }

    /// Next non-whitespace byte, with the cursor advanced past the
    /// whitespace.
    fn peek(&mut self) -> Option<u8> {
        while self.bytes.get(self.pos).is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
        self.bytes.get(self.pos).copied()
    }

    fn invalid(&self) -> HostError {
        HostError::Script(format!("invalid expression: {}", self.src))
    }

    fn overflow(&self) -> HostError {
        HostError::Script(format!("integer overflow in: {}", self.src))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_arithmetic_captures_stdout() {
        assert_eq!(run("print(1+2)").unwrap(), "3\n");
        assert_eq!(run("print(2*(3+4))").unwrap(), "14\n");
        assert_eq!(run("print(1+2*3)").unwrap(), "7\n");
        assert_eq!(run("print(-5)").unwrap(), "-5\n");
    }

    #[test]
    fn print_string_literals() {
        assert_eq!(run("print('A')").unwrap(), "A\n");
        assert_eq!(run("print(\"hello world\")").unwrap(), "hello world\n");
    }

    #[test]
    fn statements_split_on_semicolons_and_newlines() {
        let out = run("import time; print('a')\nprint(1)").unwrap();
        assert_eq!(out, "a\n1\n");
    }

    #[test]
    fn sleep_blocks_then_continues() {
        let started = std::time::Instant::now();
        let out = run("time.sleep(0.05); print('done')").unwrap();
        assert_eq!(out, "done\n");
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn unsupported_statements_abort() {
        let err = run("os.remove('x')").unwrap_err();
        assert!(matches!(err, HostError::Script(_)));
    }

    #[test]
    fn division_by_zero_aborts() {
        let err = run("print(1/0)").unwrap_err();
        assert!(matches!(err, HostError::Script(_)));
    }
}
