//! Calculator tool — evaluates arithmetic expressions.
//!
//! Supports `+`, `-`, `*`, `/`, parentheses, unary negation, and decimal
//! numbers. Evaluation goes through a shunting-yard pass to postfix, then
//! a small stack machine. No dependencies beyond std.

use async_trait::async_trait;
use grapnel_core::error::ToolError;
use grapnel_core::tool::{Tool, ToolOutput};

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports +, -, *, /, parentheses, and decimal numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let expr = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;

        match evaluate(expr) {
            Ok(value) => Ok(ToolOutput::text(format_number(value))),
            // Bad expressions come back as text so the model can correct
            // itself on the next attempt.
            Err(e) => Ok(ToolOutput::text(format!("Error: {e}"))),
        }
    }
}

/// Drop the trailing .0 for integral results.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    /// Unary minus, highest precedence.
    Neg,
}

impl Op {
    fn precedence(self) -> u8 {
        match self {
            Op::Add | Op::Sub => 1,
            Op::Mul | Op::Div => 2,
            Op::Neg => 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Postfix {
    Num(f64),
    Op(Op),
}

/// Evaluate an arithmetic expression string.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let postfix = to_postfix(expr)?;
    eval_postfix(&postfix)
}

/// Shunting-yard: infix text to postfix ops.
fn to_postfix(expr: &str) -> Result<Vec<Postfix>, String> {
    #[derive(PartialEq)]
    enum Prev {
        Start,
        Num,
        Op,
        LParen,
        RParen,
    }

    let mut output = Vec::new();
    let mut ops: Vec<Option<Op>> = Vec::new(); // None marks '('
    let mut prev = Prev::Start;

    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut num = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = num.parse().map_err(|_| format!("Invalid number: {num}"))?;
                output.push(Postfix::Num(value));
                prev = Prev::Num;
            }
            '(' => {
                chars.next();
                ops.push(None);
                prev = Prev::LParen;
            }
            ')' => {
                chars.next();
                loop {
                    match ops.pop() {
                        Some(Some(op)) => output.push(Postfix::Op(op)),
                        Some(None) => break,
                        None => return Err("Unbalanced closing parenthesis".into()),
                    }
                }
                prev = Prev::RParen;
            }
            '+' | '-' | '*' | '/' => {
                chars.next();
                let op = match c {
                    '-' if matches!(prev, Prev::Start | Prev::Op | Prev::LParen) => Op::Neg,
                    '+' => Op::Add,
                    '-' => Op::Sub,
                    '*' => Op::Mul,
                    '/' => Op::Div,
                    _ => unreachable!(),
                };
                // Unary minus is right-associative; binary ops pop equal
                // precedence.
                while let Some(Some(top)) = ops.last() {
                    let pop = if op == Op::Neg {
                        top.precedence() > op.precedence()
                    } else {
                        top.precedence() >= op.precedence()
                    };
                    if !pop {
                        break;
                    }
                    output.push(Postfix::Op(ops.pop().unwrap().unwrap()));
                }
                ops.push(Some(op));
                prev = Prev::Op;
            }
            other => return Err(format!("Unexpected character: '{other}'")),
        }
    }

    while let Some(slot) = ops.pop() {
        match slot {
            Some(op) => output.push(Postfix::Op(op)),
            None => return Err("Unbalanced opening parenthesis".into()),
        }
    }

    Ok(output)
}

fn eval_postfix(postfix: &[Postfix]) -> Result<f64, String> {
    let mut stack: Vec<f64> = Vec::new();

    for item in postfix {
        match item {
            Postfix::Num(n) => stack.push(*n),
            Postfix::Op(Op::Neg) => {
                let v = stack.pop().ok_or("Malformed expression")?;
                stack.push(-v);
            }
            Postfix::Op(op) => {
                let right = stack.pop().ok_or("Malformed expression")?;
                let left = stack.pop().ok_or("Malformed expression")?;
                let value = match op {
                    Op::Add => left + right,
                    Op::Sub => left - right,
                    Op::Mul => left * right,
                    Op::Div => {
                        if right == 0.0 {
                            return Err("Division by zero".into());
                        }
                        left / right
                    }
                    Op::Neg => unreachable!(),
                };
                stack.push(value);
            }
        }
    }

    match stack.as_slice() {
        [single] => Ok(*single),
        [] => Err("Empty expression".into()),
        _ => Err("Malformed expression".into()),
    }
}
