//! The stack-machine interpreter.
//!
//! Execution sees exactly three inputs: the call's positional and keyword
//! arguments, and the contract's own `state` mapping. `sload`/`sstore` are
//! the only effects; every fault surfaces as `ContractRuntime`.

use filament_core::FilamentError;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::asm::Op;

/// Instruction budget per call. A contract that spins past this is assumed
/// to be non-terminating and its call fails.
pub const VM_STEP_LIMIT: usize = 100_000;

fn fault(msg: impl Into<String>) -> FilamentError {
    FilamentError::ContractRuntime(msg.into())
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

struct Machine<'a> {
    stack: Vec<Value>,
    args: &'a [Value],
    kwargs: &'a BTreeMap<String, Value>,
    state: &'a mut BTreeMap<String, Value>,
}

impl Machine<'_> {
    fn pop(&mut self) -> Result<Value, FilamentError> {
        self.stack.pop().ok_or_else(|| fault("stack underflow"))
    }

    fn pop_key(&mut self) -> Result<String, FilamentError> {
        match self.pop()? {
            Value::String(s) => Ok(s),
            other => Err(fault(format!("state key must be a string, got {other}"))),
        }
    }

    fn pop_numeric_pair(&mut self) -> Result<(Value, Value), FilamentError> {
        let b = self.pop()?;
        let a = self.pop()?;
        if !a.is_number() || !b.is_number() {
            return Err(fault(format!("arithmetic on non-numbers: {a} and {b}")));
        }
        Ok((a, b))
    }
}

fn int_pair(a: &Value, b: &Value) -> Option<(i64, i64)> {
    Some((a.as_i64()?, b.as_i64()?))
}

fn arith(op: &Op, a: Value, b: Value) -> Result<Value, FilamentError> {
    // Integer operands stay integers; anything else degrades to f64.
    if let Some((x, y)) = int_pair(&a, &b) {
        let out = match op {
            Op::Add => x.checked_add(y),
            Op::Sub => x.checked_sub(y),
            Op::Mul => x.checked_mul(y),
            Op::Div => x.checked_div(y),
            Op::Mod => x.checked_rem(y),
            _ => unreachable!("non-arithmetic op"),
        };
        return out
            .map(Value::from)
            .ok_or_else(|| fault("integer overflow or division by zero"));
    }
    let x = a.as_f64().expect("checked numeric");
    let y = b.as_f64().expect("checked numeric");
    let out = match op {
        Op::Add => x + y,
        Op::Sub => x - y,
        Op::Mul => x * y,
        Op::Div => {
            if y == 0.0 {
                return Err(fault("division by zero"));
            }
            x / y
        }
        Op::Mod => {
            if y == 0.0 {
                return Err(fault("division by zero"));
            }
            x % y
        }
        _ => unreachable!("non-arithmetic op"),
    };
    serde_json::Number::from_f64(out)
        .map(Value::Number)
        .ok_or_else(|| fault("non-finite arithmetic result"))
}

/// Run one function of a compiled program to completion.
pub fn execute(
    ops: &[Op],
    args: &[Value],
    kwargs: &BTreeMap<String, Value>,
    state: &mut BTreeMap<String, Value>,
) -> Result<Value, FilamentError> {
    let mut m = Machine {
        stack: Vec::new(),
        args,
        kwargs,
        state,
    };
    let mut pc = 0usize;
    let mut steps = 0usize;

    while pc < ops.len() {
        steps += 1;
        if steps > VM_STEP_LIMIT {
            return Err(fault("step limit exceeded"));
        }

        match &ops[pc] {
            Op::Push(lit) => m.stack.push(lit.to_value()),
            Op::Arg(i) => m
                .stack
                .push(m.args.get(*i).cloned().unwrap_or(Value::Null)),
            Op::Kwarg(name) => m
                .stack
                .push(m.kwargs.get(name).cloned().unwrap_or(Value::Null)),
            Op::SLoad => {
                let key = m.pop_key()?;
                let value = m.state.get(&key).cloned().unwrap_or(Value::Null);
                m.stack.push(value);
            }
            Op::SStore => {
                let value = m.pop()?;
                let key = m.pop_key()?;
                m.state.insert(key, value);
            }
            op @ (Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod) => {
                let (a, b) = m.pop_numeric_pair()?;
                let out = arith(op, a, b)?;
                m.stack.push(out);
            }
            Op::Eq => {
                let b = m.pop()?;
                let a = m.pop()?;
                m.stack.push(Value::Bool(a == b));
            }
            Op::Lt | Op::Gt => {
                let (a, b) = m.pop_numeric_pair()?;
                let (x, y) = (
                    a.as_f64().expect("checked numeric"),
                    b.as_f64().expect("checked numeric"),
                );
                let out = if matches!(ops[pc], Op::Lt) { x < y } else { x > y };
                m.stack.push(Value::Bool(out));
            }
            Op::Not => {
                let v = m.pop()?;
                m.stack.push(Value::Bool(!truthy(&v)));
            }
            Op::Dup => {
                let top = m.stack.last().ok_or_else(|| fault("stack underflow"))?.clone();
                m.stack.push(top);
            }
            Op::Pop => {
                m.pop()?;
            }
            Op::Swap => {
                let len = m.stack.len();
                if len < 2 {
                    return Err(fault("stack underflow"));
                }
                m.stack.swap(len - 1, len - 2);
            }
            Op::Concat => {
                let b = m.pop()?;
                let a = m.pop()?;
                match (a, b) {
                    (Value::String(x), Value::String(y)) => {
                        m.stack.push(Value::String(format!("{x}{y}")))
                    }
                    (a, b) => return Err(fault(format!("concat on non-strings: {a} and {b}"))),
                }
            }
            Op::Jmp(target) => {
                pc = *target;
                continue;
            }
            Op::Jz(target) => {
                let cond = m.pop()?;
                if !truthy(&cond) {
                    pc = *target;
                    continue;
                }
            }
            Op::Ret => return Ok(m.stack.pop().unwrap_or(Value::Null)),
            Op::Halt => return Ok(Value::Null),
        }
        pc += 1;
    }

    Ok(Value::Null)
}

// ── Tests ────────────────────────────────────────────────────────────────────
