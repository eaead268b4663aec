// File: src/parser.rs
//
// Recursive-descent parser for the Slate source language. Builds the
// spanned parse tree consumed by the semantic walker. Precedence, tightest
// first: unary, multiplicative, additive, relational, equality.

use crate::ast::{Block, Expr, FunctionDecl, Param, Program, Stmt};
use crate::bytecode::{BinaryOperator, Literal, Type, UnaryOperator};
use crate::errors::{CompileError, Span};
use crate::lexer::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn parse_program(&mut self) -> Result<Program, CompileError> {
        let start_span = self.peek().span;
        let mut functions = Vec::new();

        while !matches!(self.peek().kind, TokenKind::Eof) {
            functions.push(self.parse_function()?);
        }

        let span = match functions.last() {
            Some(last) => start_span.join(last.span),
            None => start_span,
        };

        Ok(Program { functions, span })
    }

    // === Declarations ===

    fn parse_function(&mut self) -> Result<FunctionDecl, CompileError> {
        let start_span = self.peek().span;
        let return_type = self.parse_type()?;
        let (name, _) = self.expect_identifier("expected a function name")?;

        self.expect_punctuation('(', "expected '(' after the function name")?;

        let mut params = Vec::new();
        if !self.check_punctuation(')') {
            loop {
                let param_span = self.peek().span;
                let ty = self.parse_type()?;
                let (param_name, name_span) = self.expect_identifier("expected a parameter name")?;
                params.push(Param { ty, name: param_name, span: param_span.join(name_span) });

                if self.check_punctuation(',') {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        self.expect_punctuation(')', "expected ')' after the parameter list")?;

        let body = self.parse_block()?;
        let span = start_span.join(body.span);

        Ok(FunctionDecl { return_type, name, params, body, span })
    }

    fn parse_type(&mut self) -> Result<Type, CompileError> {
        let token = self.peek().clone();
        if let TokenKind::Keyword(ref keyword) = token.kind {
            if let Some(ty) = Type::from_keyword(keyword) {
                self.advance();
                return Ok(ty);
            }
        }

        Err(CompileError::parse(token.span, "expected a type"))
    }

    // === Statements ===

    fn parse_block(&mut self) -> Result<Block, CompileError> {
        let open = self.expect_punctuation('{', "expected '{'")?;

        let mut statements = Vec::new();
        while !self.check_punctuation('}') && !matches!(self.peek().kind, TokenKind::Eof) {
            statements.push(self.parse_stmt()?);
        }

        let close = self.expect_punctuation('}', "expected '}' to close the block")?;

        Ok(Block { statements, span: open.span.join(close.span) })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        match &self.peek().kind {
            TokenKind::Keyword(keyword) => match keyword.as_str() {
                "return" => self.parse_return(),
                "if" => self.parse_if(),
                "while" => self.parse_while(),
                keyword if Type::from_keyword(keyword).is_some() => self.parse_var_decl(),
                _ => self.parse_expr_stmt(),
            },
            TokenKind::Punctuation('{') => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Identifier(_)
                if matches!(&self.peek_next().kind, TokenKind::Operator(op) if op == "=") =>
            {
                self.parse_assignment()
            }
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, CompileError> {
        let start_span = self.peek().span;
        let ty = self.parse_type()?;
        let (name, _) = self.expect_identifier("expected a variable name")?;
        self.expect_operator("=", "expected '=' after the variable name")?;
        let value = self.parse_expr()?;
        let semi = self.expect_punctuation(';', "expected ';' after the declaration")?;

        Ok(Stmt::VarDecl { ty, name, value, span: start_span.join(semi.span) })
    }

    fn parse_assignment(&mut self) -> Result<Stmt, CompileError> {
        let start_span = self.peek().span;
        let (name, _) = self.expect_identifier("expected a variable name")?;
        self.expect_operator("=", "expected '='")?;
        let value = self.parse_expr()?;
        let semi = self.expect_punctuation(';', "expected ';' after the assignment")?;

        Ok(Stmt::Assign { name, value, span: start_span.join(semi.span) })
    }

    fn parse_return(&mut self) -> Result<Stmt, CompileError> {
        let keyword = self.advance();

        let value = if self.check_punctuation(';') {
            None
        } else {
            Some(self.parse_expr()?)
        };

        let semi = self.expect_punctuation(';', "expected ';' after the return statement")?;

        Ok(Stmt::Return { value, span: keyword.span.join(semi.span) })
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        let keyword = self.advance();
        self.expect_punctuation('(', "expected '(' after 'if'")?;
        let condition = self.parse_expr()?;
        self.expect_punctuation(')', "expected ')' after the condition")?;
        let body = self.parse_block()?;

        Ok(Stmt::If { condition, span: keyword.span.join(body.span), body })
    }

    fn parse_while(&mut self) -> Result<Stmt, CompileError> {
        let keyword = self.advance();
        self.expect_punctuation('(', "expected '(' after 'while'")?;
        let condition = self.parse_expr()?;
        self.expect_punctuation(')', "expected ')' after the condition")?;
        let body = self.parse_block()?;

        Ok(Stmt::While { condition, span: keyword.span.join(body.span), body })
    }

    fn parse_expr_stmt(&mut self) -> Result<Stmt, CompileError> {
        let expr = self.parse_expr()?;
        let semi = self.expect_punctuation(';', "expected ';' after the expression")?;
        let span = expr.span().join(semi.span);

        Ok(Stmt::Expr { expr, span })
    }

    // === Expressions ===

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(&["==", "!="], Self::parse_relational)
    }

    fn parse_relational(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(&["<", ">", "<=", ">="], Self::parse_additive)
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(&["+", "-"], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(&["*", "/"], Self::parse_unary)
    }

    fn parse_binary_level(
        &mut self,
        symbols: &[&str],
        next: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let mut left = next(self)?;

        loop {
            let op = match &self.peek().kind {
                TokenKind::Operator(symbol) if symbols.contains(&symbol.as_str()) => {
                    match BinaryOperator::from_symbol(symbol) {
                        Some(op) => op,
                        None => break,
                    }
                }
                _ => break,
            };

            self.advance();
            let right = next(self)?;
            let span = left.span().join(right.span());
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), span };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match &self.peek().kind {
            TokenKind::Operator(symbol) => UnaryOperator::from_symbol(symbol),
            _ => None,
        };

        if let Some(op) = op {
            let token = self.advance();
            let operand = self.parse_unary()?;
            let span = token.span.join(operand.span());
            return Ok(Expr::Unary { op, operand: Box::new(operand), span });
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.peek().clone();

        match token.kind {
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Int(value), span: token.span })
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Float(value), span: token.span })
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::String(value), span: token.span })
            }
            TokenKind::Keyword(keyword) if keyword == "true" || keyword == "false" => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Bool(keyword == "true"), span: token.span })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check_punctuation('(') {
                    self.parse_call(name, token.span)
                } else {
                    Ok(Expr::Identifier { name, span: token.span })
                }
            }
            TokenKind::Punctuation('(') => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect_punctuation(')', "expected ')' after the expression")?;
                Ok(expr)
            }
            _ => Err(CompileError::parse(token.span, "expected an expression")),
        }
    }

    fn parse_call(&mut self, name: String, name_span: Span) -> Result<Expr, CompileError> {
        self.expect_punctuation('(', "expected '('")?;

        let mut args = Vec::new();
        if !self.check_punctuation(')') {
            loop {
                args.push(self.parse_expr()?);
                if self.check_punctuation(',') {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        let close = self.expect_punctuation(')', "expected ')' after the argument list")?;

        Ok(Expr::Call { name, args, span: name_span.join(close.span) })
    }

    // === Token helpers ===

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check_punctuation(&self, c: char) -> bool {
        matches!(self.peek().kind, TokenKind::Punctuation(p) if p == c)
    }

    fn expect_punctuation(&mut self, c: char, message: &str) -> Result<Token, CompileError> {
        if self.check_punctuation(c) {
            Ok(self.advance())
        } else {
            Err(CompileError::parse(self.peek().span, message))
        }
    }

    fn expect_operator(&mut self, symbol: &str, message: &str) -> Result<Token, CompileError> {
        match &self.peek().kind {
            TokenKind::Operator(op) if op == symbol => Ok(self.advance()),
            _ => Err(CompileError::parse(self.peek().span, message)),
        }
    }

    fn expect_identifier(&mut self, message: &str) -> Result<(String, Span), CompileError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok((name, token.span))
            }
            _ => Err(CompileError::parse(token.span, message)),
        }
    }
}
