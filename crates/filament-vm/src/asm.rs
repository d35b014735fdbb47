//! Assembler for the contract source language.
//!
//! Source is line-oriented. `fn name:` opens a function, `label:` marks a
//! jump target inside one, `#` starts a comment. Everything else is one
//! instruction per line:
//!
//! ```text
//! fn set:
//!   push "x"     # state key
//!   arg 0        # first positional argument
//!   sstore       # state["x"] = args[0]
//!   halt
//! ```

use filament_core::FilamentError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Literals and opcodes ─────────────────────────────────────────────────────

/// A literal operand for `push`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Literal::Null => serde_json::Value::Null,
            Literal::Bool(b) => serde_json::Value::Bool(*b),
            Literal::Int(i) => serde_json::Value::from(*i),
            Literal::Float(f) => serde_json::Value::from(*f),
            Literal::Str(s) => serde_json::Value::from(s.clone()),
        }
    }
}

/// One bytecode instruction. Jump targets are resolved to instruction
/// offsets within the enclosing function at assembly time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Op {
    Push(Literal),
    Arg(usize),
    Kwarg(String),
    SLoad,
    SStore,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Lt,
    Gt,
    Not,
    Dup,
    Pop,
    Swap,
    Concat,
    Jmp(usize),
    Jz(usize),
    Ret,
    Halt,
}

/// A compiled contract: its top level is a set of named functions, looked up
/// by signature at call time. `BTreeMap` keeps the canonical byte form (and
/// therefore the derived contract address) independent of definition order.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Program {
    pub functions: BTreeMap<String, Vec<Op>>,
}

// ── Assembler ────────────────────────────────────────────────────────────────

fn compile_err(line_no: usize, msg: impl Into<String>) -> FilamentError {
    FilamentError::Compile(format!("line {}: {}", line_no, msg.into()))
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// An instruction whose jump target may still be a label name.
enum RawOp {
    Resolved(Op),
    Jmp(String, usize),
    Jz(String, usize),
}

#[derive(Default)]
struct FunctionBuilder {
    ops: Vec<RawOp>,
    labels: BTreeMap<String, usize>,
}

impl FunctionBuilder {
    fn finish(self) -> Result<Vec<Op>, FilamentError> {
        self.ops
            .into_iter()
            .map(|raw| match raw {
                RawOp::Resolved(op) => Ok(op),
                RawOp::Jmp(label, line_no) => self
                    .labels
                    .get(&label)
                    .map(|t| Op::Jmp(*t))
                    .ok_or_else(|| compile_err(line_no, format!("unknown label `{label}`"))),
                RawOp::Jz(label, line_no) => self
                    .labels
                    .get(&label)
                    .map(|t| Op::Jz(*t))
                    .ok_or_else(|| compile_err(line_no, format!("unknown label `{label}`"))),
            })
            .collect()
    }
}

/// Compile contract source into a [`Program`].
pub fn compile(source: &str) -> Result<Program, FilamentError> {
    let mut functions: BTreeMap<String, Vec<Op>> = BTreeMap::new();
    let mut current: Option<(String, FunctionBuilder)> = None;

    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = match raw_line.find('#') {
            Some(pos) => &raw_line[..pos],
            None => raw_line,
        }
        .trim();
        if line.is_empty() {
            continue;
        }

        // ── fn header ────────────────────────────────────────────────────────
        if let Some(rest) = line.strip_prefix("fn ") {
            let name = rest
                .strip_suffix(':')
                .ok_or_else(|| compile_err(line_no, "function header must end with `:`"))?
                .trim();
            if !is_ident(name) {
                return Err(compile_err(line_no, format!("bad function name `{name}`")));
            }
            if let Some((prev_name, builder)) = current.take() {
                functions.insert(prev_name, builder.finish()?);
            }
            if functions.contains_key(name) {
                return Err(compile_err(line_no, format!("duplicate function `{name}`")));
            }
            current = Some((name.to_string(), FunctionBuilder::default()));
            continue;
        }

        let Some((_, builder)) = current.as_mut() else {
            return Err(compile_err(line_no, "instruction outside of a function"));
        };

        // ── label ────────────────────────────────────────────────────────────
        if let Some(label) = line.strip_suffix(':') {
            if is_ident(label) {
                let target = builder.ops.len();
                if builder.labels.insert(label.to_string(), target).is_some() {
                    return Err(compile_err(line_no, format!("duplicate label `{label}`")));
                }
                continue;
            }
        }

        builder.ops.push(parse_instruction(line, line_no)?);
    }

    if let Some((name, builder)) = current.take() {
        functions.insert(name, builder.finish()?);
    }
    if functions.is_empty() {
        return Err(FilamentError::Compile("source defines no functions".into()));
    }
    Ok(Program { functions })
}

fn parse_instruction(line: &str, line_no: usize) -> Result<RawOp, FilamentError> {
    let (mnemonic, operand) = match line.split_once(char::is_whitespace) {
        Some((m, rest)) => (m, rest.trim()),
        None => (line, ""),
    };

    let no_operand = |op: Op| -> Result<RawOp, FilamentError> {
        if operand.is_empty() {
            Ok(RawOp::Resolved(op))
        } else {
            Err(compile_err(line_no, format!("`{mnemonic}` takes no operand")))
        }
    };

    match mnemonic {
        "push" => Ok(RawOp::Resolved(Op::Push(parse_literal(operand, line_no)?))),
        "arg" => {
            let i: usize = operand
                .parse()
                .map_err(|_| compile_err(line_no, "`arg` needs a numeric index"))?;
            Ok(RawOp::Resolved(Op::Arg(i)))
        }
        "kwarg" => match parse_literal(operand, line_no)? {
            Literal::Str(name) => Ok(RawOp::Resolved(Op::Kwarg(name))),
            _ => Err(compile_err(line_no, "`kwarg` needs a quoted name")),
        },
        "sload" => no_operand(Op::SLoad),
        "sstore" => no_operand(Op::SStore),
        "add" => no_operand(Op::Add),
        "sub" => no_operand(Op::Sub),
        "mul" => no_operand(Op::Mul),
        "div" => no_operand(Op::Div),
        "mod" => no_operand(Op::Mod),
        "eq" => no_operand(Op::Eq),
        "lt" => no_operand(Op::Lt),
        "gt" => no_operand(Op::Gt),
        "not" => no_operand(Op::Not),
        "dup" => no_operand(Op::Dup),
        "pop" => no_operand(Op::Pop),
        "swap" => no_operand(Op::Swap),
        "concat" => no_operand(Op::Concat),
        "jmp" => {
            if !is_ident(operand) {
                return Err(compile_err(line_no, "`jmp` needs a label"));
            }
            Ok(RawOp::Jmp(operand.to_string(), line_no))
        }
        "jz" => {
            if !is_ident(operand) {
                return Err(compile_err(line_no, "`jz` needs a label"));
            }
            Ok(RawOp::Jz(operand.to_string(), line_no))
        }
        "ret" => no_operand(Op::Ret),
        "halt" => no_operand(Op::Halt),
        other => Err(compile_err(line_no, format!("unknown instruction `{other}`"))),
    }
}

fn parse_literal(operand: &str, line_no: usize) -> Result<Literal, FilamentError> {
    if operand.is_empty() {
        return Err(compile_err(line_no, "missing literal operand"));
    }
    if operand == "null" {
        return Ok(Literal::Null);
    }
    if operand == "true" {
        return Ok(Literal::Bool(true));
    }
    if operand == "false" {
        return Ok(Literal::Bool(false));
    }
    if operand.starts_with('"') {
        if operand.len() >= 2 && operand.ends_with('"') {
            return Ok(Literal::Str(operand[1..operand.len() - 1].to_string()));
        }
        return Err(compile_err(line_no, "unterminated string literal"));
    }
    if let Ok(i) = operand.parse::<i64>() {
        return Ok(Literal::Int(i));
    }
    if let Ok(f) = operand.parse::<f64>() {
        return Ok(Literal::Float(f));
    }
    Err(compile_err(line_no, format!("bad literal `{operand}`")))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_function_per_header() {
        let program = compile(
            "fn set:\n  push \"x\"\n  arg 0\n  sstore\n  halt\n\nfn get:\n  push \"x\"\n  sload\n  ret\n",
        )
        .unwrap();
        assert_eq!(program.functions.len(), 2);
        assert_eq!(
            program.functions["get"],
            vec![Op::Push(Literal::Str("x".into())), Op::SLoad, Op::Ret]
        );
    }

    #[test]
    fn resolves_labels_to_offsets() {
        let program = compile(
            "fn spin:\nloop:\n  push 1\n  jz done\n  jmp loop\ndone:\n  halt\n",
        )
        .unwrap();
        let ops = &program.functions["spin"];
        assert_eq!(ops[1], Op::Jz(3));
        assert_eq!(ops[2], Op::Jmp(0));
    }

    #[test]
    fn strips_comments() {
        let program = compile("fn f: # entry\n  push 1 # one\n  ret\n").unwrap();
        assert_eq!(
            program.functions["f"],
            vec![Op::Push(Literal::Int(1)), Op::Ret]
        );
    }

    #[test]
    fn rejects_instruction_outside_function() {
        assert!(matches!(
            compile("push 1\n"),
            Err(FilamentError::Compile(_))
        ));
    }

    #[test]
    fn rejects_unknown_instruction() {
        assert!(matches!(
            compile("fn f:\n  frobnicate\n"),
            Err(FilamentError::Compile(_))
        ));
    }

    #[test]
    fn rejects_unknown_label() {
        assert!(matches!(
            compile("fn f:\n  jmp nowhere\n"),
            Err(FilamentError::Compile(_))
        ));
    }

    #[test]
    fn rejects_empty_source() {
        assert!(matches!(compile("\n  \n"), Err(FilamentError::Compile(_))));
    }
}
