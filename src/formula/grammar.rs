//! Formula parser using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::FormulaError;
use crate::formula::ast::{BinOp, Expr, Reference};
use crate::formula::lexer::{self, Token};

/// Parse formula text (with or without the leading `=`) into an expression
pub fn parse(input: &str) -> Result<Expr, FormulaError> {
    let len = input.len();

    let tokens = lexer::lex(input)
        .map_err(|span| FormulaError::syntax(span, "unrecognised character", Vec::new()))?;
    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));

    let token_stream =
        Stream::from_iter(token_iter).map((len..len).into(), |(t, s): (_, _)| (t, s));

    formula_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| match errs.into_iter().next() {
            Some(err) => err.into(),
            None => FormulaError::syntax(0..len, "invalid formula", Vec::new()),
        })
}

/// Fold `first (op operand)*` into a left-associative tree
fn fold_left(first: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
    rest.into_iter()
        .fold(first, |lhs, (op, rhs)| Expr::binary(op, lhs, rhs))
}

fn formula_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    just(Token::Equals)
        .or_not()
        .ignore_then(expr_parser())
        .then_ignore(end())
}

fn expr_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let number = select! {
            Token::Number(n) => Expr::Number(n),
        };

        let text = select! {
            Token::Str(s) => Expr::Text(s),
        };

        let cell = select! {
            Token::Cell(c) => c,
        };

        let sheet = select! {
            Token::SheetName(s) => s,
            Token::Ident(s) => s,
        }
        .then_ignore(just(Token::Bang));

        let reference = sheet
            .or_not()
            .then(cell.clone())
            .then(just(Token::Colon).ignore_then(cell).or_not())
            .map(|((sheet, start), end)| Expr::Ref(Reference { sheet, start, end }));

        let call = select! {
            Token::Ident(name) => name,
        }
        .then(
            expr.clone()
                .separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        )
        .map(|(name, args)| Expr::Call {
            name: name.to_ascii_uppercase(),
            args,
        });

        let boolean = select! {
            Token::Ident(name) => name,
        }
        .try_map(|name, span| match name.to_ascii_uppercase().as_str() {
            "TRUE" => Ok(Expr::Bool(true)),
            "FALSE" => Ok(Expr::Bool(false)),
            _ => Err(Rich::custom(span, format!("unknown name '{}'", name))),
        });

        let atom = choice((
            number,
            text,
            call,
            reference,
            boolean,
            expr.clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ))
        .boxed();

        let unary = just(Token::Minus)
            .repeated()
            .collect::<Vec<_>>()
            .then(atom)
            .map(|(signs, operand)| {
                signs
                    .iter()
                    .fold(operand, |acc, _| Expr::Neg(Box::new(acc)))
            })
            .boxed();

        let product_op = choice((
            just(Token::Star).to(BinOp::Mul),
            just(Token::Slash).to(BinOp::Div),
        ));
        let product = unary
            .clone()
            .then(product_op.then(unary).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| fold_left(first, rest))
            .boxed();

        let sum_op = choice((
            just(Token::Plus).to(BinOp::Add),
            just(Token::Minus).to(BinOp::Sub),
        ));
        let sum = product
            .clone()
            .then(sum_op.then(product).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| fold_left(first, rest))
            .boxed();

        let compare_op = choice((
            just(Token::Equals).to(BinOp::Eq),
            just(Token::NotEqual).to(BinOp::Ne),
            just(Token::LessOrEqual).to(BinOp::Le),
            just(Token::GreaterOrEqual).to(BinOp::Ge),
            just(Token::Less).to(BinOp::Lt),
            just(Token::Greater).to(BinOp::Gt),
        ));
        sum.clone()
            .then(compare_op.then(sum).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| fold_left(first, rest))
            .boxed()
    })
}
