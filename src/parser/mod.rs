//! Parser implementation using pest
//!
//! Turns the text of a command script into a [`Script`] syntax tree.

mod error;

pub use error::ParseError;

use crate::ast::{ActionDef, BinaryOp, Expression, FunctionDef, Script, Statement};
use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;
use std::rc::Rc;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct ScriptParser;

/// Parse a command script into an Abstract Syntax Tree (AST)
///
/// # Errors
///
/// Returns a [`ParseError`] pointing at the first place the input stops
/// matching the grammar.
pub fn parse_script(input: &str, filename: Option<&str>) -> Result<Script, ParseError> {
    let pairs = ScriptParser::parse(Rule::program, input)
        .map_err(|e| ParseError::from_pest(&e, input, filename))?;
    if let Some(literal) = out_of_range_integer(&pairs) {
        let error = pest::error::Error::new_from_span(
            pest::error::ErrorVariant::CustomError {
                message: format!("integer literal `{}` is out of range", literal.as_str()),
            },
            literal.as_span(),
        );
        return Err(ParseError::from_pest(&error, input, filename));
    }

    let mut statements = Vec::new();
    for pair in pairs {
        if pair.as_rule() == Rule::program {
            statements = parse_statements(pair.into_inner());
        }
    }
    Ok(Script { statements })
}

/// The first integer literal that does not fit in an `i64`.
fn out_of_range_integer<'i>(pairs: &Pairs<'i, Rule>) -> Option<Pair<'i, Rule>> {
    pairs
        .clone()
        .flatten()
        .find(|p| p.as_rule() == Rule::integer && p.as_str().parse::<i64>().is_err())
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_fn
            | Rule::kw_action
            | Rule::kw_let
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_for
            | Rule::kw_in
            | Rule::kw_return
            | Rule::kw_true
            | Rule::kw_false
            | Rule::kw_and
            | Rule::kw_or
            | Rule::kw_not
    )
}

/// Inner pairs with keyword tokens filtered out.
fn significant(pair: Pair<'_, Rule>) -> impl Iterator<Item = Pair<'_, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn parse_statements(pairs: Pairs<'_, Rule>) -> Vec<Statement> {
    pairs
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(parse_statement)
        .collect()
}

fn parse_block(pair: Pair<'_, Rule>) -> Vec<Statement> {
    parse_statements(pair.into_inner())
}

fn parse_statement(pair: Pair<'_, Rule>) -> Statement {
    match pair.as_rule() {
        Rule::function_def => {
            let mut decorators = Vec::new();
            let mut name = String::new();
            let mut params = Vec::new();
            let mut body = Vec::new();
            for part in significant(pair) {
                match part.as_rule() {
                    Rule::decorator => decorators.extend(significant(part).map(parse_expression)),
                    Rule::identifier => name = part.as_str().to_string(),
                    Rule::param_list => {
                        params = part.into_inner().map(|p| p.as_str().to_string()).collect();
                    }
                    Rule::block => body = parse_block(part),
                    _ => {}
                }
            }
            Statement::FunctionDef {
                def: Rc::new(FunctionDef { name, params, body }),
                decorators,
            }
        }
        Rule::action_def => {
            let mut decorators = Vec::new();
            let mut name = String::new();
            let mut body = Vec::new();
            for part in significant(pair) {
                match part.as_rule() {
                    Rule::decorator => decorators.extend(significant(part).map(parse_expression)),
                    Rule::identifier => name = part.as_str().to_string(),
                    Rule::block => body = parse_block(part),
                    _ => {}
                }
            }
            Statement::ActionDef {
                def: Rc::new(ActionDef { name, body }),
                decorators,
            }
        }
        Rule::let_stmt | Rule::assign_stmt => {
            let is_let = pair.as_rule() == Rule::let_stmt;
            let mut inner = significant(pair);
            let name = inner.next().map(|p| p.as_str().to_string()).unwrap_or_default();
            let value = inner.next().map_or(Expression::Boolean(false), parse_expression);
            if is_let {
                Statement::Let { name, value }
            } else {
                Statement::Assign { name, value }
            }
        }
        Rule::if_stmt => {
            let mut inner = significant(pair);
            let condition = inner
                .next()
                .map_or(Expression::Boolean(false), parse_expression);
            let then_branch = inner.next().map(parse_block).unwrap_or_default();
            let else_branch = inner.next().map(|part| match part.as_rule() {
                Rule::if_stmt => vec![parse_statement(part)],
                _ => parse_block(part),
            });
            Statement::If {
                condition,
                then_branch,
                else_branch,
            }
        }
        Rule::for_stmt => {
            let mut inner = significant(pair);
            let variable = inner.next().map(|p| p.as_str().to_string()).unwrap_or_default();
            let iterable = inner.next().map_or(Expression::List(Vec::new()), parse_expression);
            let body = inner.next().map(parse_block).unwrap_or_default();
            Statement::For {
                variable,
                iterable,
                body,
            }
        }
        Rule::return_stmt => Statement::Return(significant(pair).next().map(parse_expression)),
        _ => Statement::Expression(
            significant(pair)
                .next()
                .map_or(Expression::Boolean(false), parse_expression),
        ),
    }
}

fn parse_expression(pair: Pair<'_, Rule>) -> Expression {
    match pair.as_rule() {
        Rule::expr | Rule::primary => pair
            .into_inner()
            .next()
            .map_or(Expression::Boolean(false), parse_expression),
        Rule::or_expr => fold_binary(pair, BinaryOp::Or),
        Rule::and_expr => fold_binary(pair, BinaryOp::And),
        Rule::pipe_expr => fold_binary(pair, BinaryOp::Pipe),
        Rule::sum_expr => fold_binary(pair, BinaryOp::Add),
        Rule::not_expr => {
            let mut negations = 0;
            let mut operand = Expression::Boolean(false);
            for part in pair.into_inner() {
                if part.as_rule() == Rule::kw_not {
                    negations += 1;
                } else {
                    operand = parse_expression(part);
                }
            }
            (0..negations).fold(operand, |e, _| Expression::Not(Box::new(e)))
        }
        Rule::cmp_expr => {
            let mut inner = pair.into_inner();
            let lhs = inner.next().map_or(Expression::Boolean(false), parse_expression);
            match (inner.next(), inner.next()) {
                (Some(op), Some(rhs)) => Expression::Binary {
                    op: if op.as_str() == "==" { BinaryOp::Eq } else { BinaryOp::Ne },
                    lhs: Box::new(lhs),
                    rhs: Box::new(parse_expression(rhs)),
                },
                _ => lhs,
            }
        }
        Rule::postfix => {
            let mut inner = pair.into_inner();
            let base = inner.next().map_or(Expression::Boolean(false), parse_expression);
            inner.fold(base, |target, suffix| match suffix.as_rule() {
                Rule::call_args => Expression::Call {
                    callee: Box::new(target),
                    args: parse_args(suffix),
                },
                Rule::method => {
                    let mut parts = suffix.into_inner();
                    let method = parts.next().map(|p| p.as_str().to_string()).unwrap_or_default();
                    let args = parts.next().map(parse_args).unwrap_or_default();
                    Expression::MethodCall {
                        receiver: Box::new(target),
                        method,
                        args,
                    }
                }
                _ => Expression::Index {
                    target: Box::new(target),
                    index: Box::new(
                        suffix
                            .into_inner()
                            .next()
                            .map_or(Expression::Integer(0), parse_expression),
                    ),
                },
            })
        }
        Rule::string => Expression::String(
            pair.into_inner()
                .next()
                .map(|body| unescape(body.as_str()))
                .unwrap_or_default(),
        ),
        // Range already checked by `out_of_range_integer`.
        Rule::integer => Expression::Integer(pair.as_str().parse().unwrap_or_default()),
        Rule::boolean => Expression::Boolean(pair.as_str() == "true"),
        Rule::list => Expression::List(pair.into_inner().map(parse_expression).collect()),
        _ => Expression::Variable(pair.as_str().to_string()),
    }
}

/// Left-fold `a op b op c` chains; operator keywords are skipped.
fn fold_binary(pair: Pair<'_, Rule>, op: BinaryOp) -> Expression {
    let mut operands = significant(pair);
    let first = operands
        .next()
        .map_or(Expression::Boolean(false), parse_expression);
    operands.fold(first, |lhs, rhs| Expression::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(parse_expression(rhs)),
    })
}

fn parse_args(pair: Pair<'_, Rule>) -> Vec<Expression> {
    pair.into_inner().map(parse_expression).collect()
}

fn unescape(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}
