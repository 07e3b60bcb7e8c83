// raft-core/src/infrastructure/solver.rs

// Production SMT backend: a z3 child process fed SMT-LIB2 on stdin. The
// core never solves anything itself; it writes the program, appends
// (check-sat)/(get-model), and reads the verdict plus the model's constant
// assignments back out of the s-expression output.

use crate::infrastructure::error::InfrastructureError;
use crate::ports::solver::{SmtBackend, SolveOutcome};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

pub const SOLVER_BIN_ENV: &str = "RAFT_Z3_BIN";

pub struct Z3Process {
    binary: PathBuf,
}

impl Z3Process {
    pub fn new() -> Self {
        let binary = std::env::var(SOLVER_BIN_ENV).unwrap_or_else(|_| "z3".to_string());
        Self {
            binary: PathBuf::from(binary),
        }
    }
}

impl Default for Z3Process {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SmtBackend for Z3Process {
    async fn check(
        &self,
        smt: &str,
        timeout: Option<Duration>,
    ) -> Result<SolveOutcome, InfrastructureError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-in")
            .arg("-smt2")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(t) = timeout {
            // Soft per-query timeout: z3 answers `unknown` instead of dying.
            cmd.arg(format!("-t:{}", t.as_millis()));
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| InfrastructureError::SolverUnavailable(format!("spawn z3: {e}")))?;

        let program = format!("{smt}\n(check-sat)\n(get-model)\n");
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(program.as_bytes())
                .await
                .map_err(|e| InfrastructureError::SolverUnavailable(format!("write z3: {e}")))?;
            drop(stdin);
        }

        let wait = child.wait_with_output();
        let output = match timeout {
            // Grace on top of the soft limit; elapsed means the solver hung.
            Some(t) => tokio::time::timeout(t + Duration::from_secs(2), wait)
                .await
                .map_err(|_| {
                    InfrastructureError::SolverUnavailable("solver timed out".to_string())
                })?,
            None => wait.await,
        }
        .map_err(|e| InfrastructureError::SolverUnavailable(format!("wait z3: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(len = stdout.len(), "solver output received");
        parse_solver_output(&stdout)
    }
}

/// Map raw solver stdout onto an outcome. A missing verdict means the
/// program itself did not parse.
pub(crate) fn parse_solver_output(stdout: &str) -> Result<SolveOutcome, InfrastructureError> {
    let mut verdict = None;
    for line in stdout.lines() {
        match line.trim() {
            "sat" => {
                verdict = Some("sat");
                break;
            }
            "unsat" => {
                verdict = Some("unsat");
                break;
            }
            "unknown" => {
                verdict = Some("unknown");
                break;
            }
            _ => continue,
        }
    }

    match verdict {
        Some("unsat") => Ok(SolveOutcome::Unsat),
        Some("unknown") => Ok(SolveOutcome::Unknown),
        Some("sat") => {
            let model_text = stdout
                .split_once("sat")
                .map(|(_, rest)| rest)
                .unwrap_or("");
            Ok(SolveOutcome::Sat(parse_model(model_text)))
        }
        _ => {
            let detail = stdout
                .lines()
                .find(|l| l.contains("(error"))
                .unwrap_or("no verdict in solver output")
                .trim()
                .to_string();
            Err(InfrastructureError::SmtParse(detail))
        }
    }
}

/// Extract `define-fun` constant assignments from a `(get-model)` answer.
pub(crate) fn parse_model(text: &str) -> BTreeMap<String, String> {
    let mut bindings = BTreeMap::new();
    let Some(Form::List(items)) = read_form(&mut tokenize(text).into_iter().peekable()) else {
        return bindings;
    };

    for item in items {
        let Form::List(parts) = item else { continue };
        let mut parts = parts.into_iter();
        match parts.next() {
            Some(Form::Atom(head)) if head == "define-fun" => {}
            _ => continue,
        }
        let Some(Form::Atom(name)) = parts.next() else {
            continue;
        };
        // Skip the (empty) argument list and the sort.
        let _args = parts.next();
        let _sort = parts.next();
        let value = parts.map(|f| f.render()).collect::<Vec<_>>().join(" ");
        bindings.insert(name, value);
    }
    bindings
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Form {
    Atom(String),
    List(Vec<Form>),
}

impl Form {
    fn render(&self) -> String {
        match self {
            Form::Atom(a) => a.clone(),
            Form::List(items) => {
                let inner: Vec<String> = items.iter().map(Form::render).collect();
                format!("({})", inner.join(" "))
            }
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' | ')' => tokens.push(c.to_string()),
            '"' => {
                // SMT-LIB string literal; "" escapes a quote.
                let mut lit = String::from("\"");
                while let Some(ch) = chars.next() {
                    lit.push(ch);
                    if ch == '"' {
                        if chars.peek() == Some(&'"') {
                            lit.push('"');
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
                tokens.push(lit);
            }
            c if c.is_whitespace() => {}
            c => {
                let mut atom = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || next == '(' || next == ')' {
                        break;
                    }
                    atom.push(next);
                    chars.next();
                }
                tokens.push(atom);
            }
        }
    }
    tokens
}

fn read_form<I>(tokens: &mut std::iter::Peekable<I>) -> Option<Form>
where
    I: Iterator<Item = String>,
{
    let token = tokens.next()?;
    if token == ")" {
        return None;
    }
    if token == "(" {
        let mut items = Vec::new();
        while tokens.peek().map(|t| t != ")").unwrap_or(false) {
            if let Some(form) = read_form(tokens) {
                items.push(form);
            } else {
                break;
            }
        }
        tokens.next(); // closing paren
        // The model wrapper may lead with the `model` keyword.
        if items.first() == Some(&Form::Atom("model".to_string())) {
            items.remove(0);
        }
        return Some(Form::List(items));
    }
    Some(Form::Atom(token))
}
