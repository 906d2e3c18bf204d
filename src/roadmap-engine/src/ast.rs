// Copyright 2026 The Roadmap Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeSet;
use std::fmt;

/// Loc describes a location in an equation by the starting point and ending point.
/// Equations are strings typed by humans for a single variable -- u16 is long enough.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Hash)]
pub struct Loc {
    pub start: u16,
    pub end: u16,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl Loc {
    pub fn new(start: usize, end: usize) -> Self {
        Loc {
            start: start as u16,
            end: end as u16,
        }
    }

    /// union takes a second Loc and returns the inclusive range from the
    /// start of the earlier token to the end of the later token.
    pub fn union(&self, rhs: &Self) -> Self {
        Loc {
            start: self.start.min(rhs.start),
            end: self.end.max(rhs.end),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum UnaryOp {
    Positive,
    Negative,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    // only produced when parsing unit strings
    Exp,
}

impl BinaryOp {
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
            BinaryOp::Exp => 3,
        }
    }
}

/// Expr is a parsed recipe equation or unit string.  In equations
/// `Var` holds a placeholder name (the text between `${` and `}`), in
/// unit strings it holds a unit name.
#[derive(PartialEq, Clone, Debug)]
pub enum Expr {
    Const(String, f64, Loc),
    Var(String, Loc),
    Op1(UnaryOp, Box<Expr>, Loc),
    Op2(BinaryOp, Box<Expr>, Box<Expr>, Loc),
}

impl Expr {
    pub(crate) fn get_loc(&self) -> Loc {
        match self {
            Expr::Const(_, _, loc) => *loc,
            Expr::Var(_, loc) => *loc,
            Expr::Op1(_, _, loc) => *loc,
            Expr::Op2(_, _, _, loc) => *loc,
        }
    }

    /// vars returns the distinct variable names this expression
    /// references.
    pub fn vars(&self) -> BTreeSet<&str> {
        fn walk<'a>(expr: &'a Expr, out: &mut BTreeSet<&'a str>) {
            match expr {
                Expr::Const(_, _, _) => {}
                Expr::Var(id, _) => {
                    out.insert(id.as_str());
                }
                Expr::Op1(_, r, _) => walk(r, out),
                Expr::Op2(_, l, r, _) => {
                    walk(l, out);
                    walk(r, out);
                }
            }
        }

        let mut out = BTreeSet::new();
        walk(self, &mut out);
        out
    }

    #[cfg(test)]
    pub(crate) fn strip_loc(self) -> Self {
        let loc = Loc::default();
        match self {
            Expr::Const(s, n, _loc) => Expr::Const(s, n, loc),
            Expr::Var(v, _loc) => Expr::Var(v, loc),
            Expr::Op1(op, r, _loc) => Expr::Op1(op, Box::new(r.strip_loc()), loc),
            Expr::Op2(op, l, r, _loc) => {
                Expr::Op2(op, Box::new(l.strip_loc()), Box::new(r.strip_loc()), loc)
            }
        }
    }
}

/// Visitors walk Expr ASTs.
pub trait Visitor<T> {
    fn walk(&mut self, e: &Expr) -> T;
}

fn child_needs_parens(parent: &Expr, child: &Expr, is_rhs: bool) -> bool {
    match parent {
        Expr::Const(_, _, _) | Expr::Var(_, _) => false,
        Expr::Op1(_, _, _) => matches!(child, Expr::Op2(_, _, _, _)),
        Expr::Op2(parent_op, _, _, _) => match child {
            Expr::Const(_, _, _) | Expr::Var(_, _) | Expr::Op1(_, _, _) => false,
            Expr::Op2(child_op, _, _, _) => {
                // `3 * (2 + 3)` needs parens, and so does `a - (b - c)`
                // since subtraction and division are left associative
                parent_op.precedence() > child_op.precedence()
                    || (is_rhs
                        && parent_op.precedence() == child_op.precedence()
                        && matches!(parent_op, BinaryOp::Sub | BinaryOp::Div | BinaryOp::Exp))
            }
        },
    }
}

fn paren_if_necessary(parent: &Expr, child: &Expr, is_rhs: bool, eqn: String) -> String {
    if child_needs_parens(parent, child, is_rhs) {
        format!("({eqn})")
    } else {
        eqn
    }
}

/// PrintVisitor renders an expression back into recipe syntax.
struct PrintVisitor;

impl Visitor<String> for PrintVisitor {
    fn walk(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Const(s, _, _) => s.clone(),
            Expr::Var(id, _) => format!("${{{id}}}"),
            Expr::Op1(op, l, _) => {
                let l = paren_if_necessary(expr, l, false, self.walk(l));
                match op {
                    UnaryOp::Positive => format!("+{l}"),
                    UnaryOp::Negative => format!("-{l}"),
                }
            }
            Expr::Op2(op, l, r, _) => {
                let l = paren_if_necessary(expr, l, false, self.walk(l));
                let r = paren_if_necessary(expr, r, true, self.walk(r));
                match op {
                    BinaryOp::Add => format!("{l} + {r}"),
                    BinaryOp::Sub => format!("{l} - {r}"),
                    BinaryOp::Mul => format!("{l} * {r}"),
                    BinaryOp::Div => format!("{l} / {r}"),
                    BinaryOp::Exp => format!("{l}^{r}"),
                }
            }
        }
    }
}

pub fn print_eqn(expr: &Expr) -> String {
    PrintVisitor.walk(expr)
}

#[test]
fn test_loc_basics() {
    let a = Loc { start: 3, end: 7 };
    assert_eq!(a, Loc::new(3, 7));

    let b = Loc { start: 4, end: 11 };
    assert_eq!(Loc::new(3, 11), a.union(&b));

    let c = Loc { start: 1, end: 5 };
    assert_eq!(Loc::new(1, 7), a.union(&c));
}

#[test]
fn test_print_eqn() {
    let var = |id: &str| Box::new(Expr::Var(id.to_owned(), Loc::default()));
    let num = |n: f64| Box::new(Expr::Const(format!("{n}"), n, Loc::default()));

    let sum = Expr::Op2(BinaryOp::Add, var("v0"), var("v1"), Loc::default());
    let product = Expr::Op2(BinaryOp::Mul, Box::new(sum.clone()), num(2.0), Loc::default());
    assert_eq!("(${v0} + ${v1}) * 2", print_eqn(&product));

    let nested = Expr::Op2(
        BinaryOp::Sub,
        var("a"),
        Box::new(Expr::Op2(BinaryOp::Sub, var("b"), var("c"), Loc::default())),
        Loc::default(),
    );
    assert_eq!("${a} - (${b} - ${c})", print_eqn(&nested));

    let neg = Expr::Op1(UnaryOp::Negative, Box::new(sum), Loc::default());
    assert_eq!("-(${v0} + ${v1})", print_eqn(&neg));
}

#[test]
fn test_vars() {
    let var = |id: &str| Box::new(Expr::Var(id.to_owned(), Loc::default()));
    let expr = Expr::Op2(
        BinaryOp::Mul,
        var("v1"),
        Box::new(Expr::Op2(BinaryOp::Add, var("v0"), var("v1"), Loc::default())),
        Loc::default(),
    );
    assert_eq!(vec!["v0", "v1"], expr.vars().into_iter().collect::<Vec<_>>());
}
