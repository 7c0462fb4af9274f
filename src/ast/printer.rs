//! Text rendering of lowered methods for debugging and test assertions.

use super::nodes::*;
use crate::classfile::{BinaryOp, Cond, Type};

/// AST printer for debugging and output.
pub struct AstPrinter {
    indent_level: usize,
    output: String,
}

impl AstPrinter {
    pub fn new() -> Self {
        Self {
            indent_level: 0,
            output: String::new(),
        }
    }

    /// Render one whole method.
    pub fn print(&mut self, method: &MethodAst) -> String {
        self.output.clear();
        self.indent_level = 0;

        self.write_indent();
        self.output.push_str(&format!(
            "method {}.{}{} {{\n",
            method.class_name, method.name, method.descriptor
        ));
        self.indent();

        if let Some(this) = method.this_var {
            self.writeln(&format!("this: {}", self.var_decl(method, this)));
        }
        for param in &method.params {
            self.writeln(&format!("param: {}", self.var_decl(method, *param)));
        }
        for local in &method.locals {
            self.writeln(&format!("local: {}", self.var_decl(method, *local)));
        }

        for stmt in &method.body {
            self.print_stmt(method, stmt);
        }

        for catch in &method.catches {
            self.print_catch(method, catch);
        }

        self.dedent();
        self.writeln("}");
        self.output.clone()
    }

    fn indent(&mut self) {
        self.indent_level += 2;
    }

    fn dedent(&mut self) {
        if self.indent_level >= 2 {
            self.indent_level -= 2;
        }
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent_level {
            self.output.push(' ');
        }
    }

    fn writeln(&mut self, s: &str) {
        self.write_indent();
        self.output.push_str(s);
        self.output.push('\n');
    }

    fn var_decl(&self, method: &MethodAst, id: VarId) -> String {
        let v = method.var(id);
        format!("{} {}", v.ty, v.name)
    }

    fn var_name<'m>(&self, method: &'m MethodAst, id: VarId) -> &'m str {
        &method.var(id).name
    }

    fn print_catch(&mut self, method: &MethodAst, catch: &CatchBlock) {
        self.write_indent();
        let mut header = format!("catch {} (", catch.id);
        if catch.catch_all && catch.caught.is_empty() {
            header.push_str("any");
        } else {
            for (i, ty) in catch.caught.iter().enumerate() {
                if i > 0 {
                    header.push_str(" | ");
                }
                header.push_str(&ty.to_string());
            }
            if catch.catch_all {
                header.push_str(" | any");
            }
        }
        header.push_str(&format!(") {} {{\n", self.var_name(method, catch.var)));
        self.output.push_str(&header);
        self.indent();
        for stmt in &catch.body {
            self.print_stmt(method, stmt);
        }
        self.dedent();
        self.writeln("}");
    }

    fn print_stmt(&mut self, method: &MethodAst, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assign { dest, value } => {
                let line = format!(
                    "{} = {};",
                    self.var_name(method, *dest),
                    self.expr(method, value)
                );
                self.writeln(&line);
            }
            StmtKind::Expr(expr) => {
                let line = format!("{};", self.expr(method, expr));
                self.writeln(&line);
            }
            StmtKind::ConstructorCall { receiver, method: m, args } => {
                let mut line = format!("{}.<init>(", self.expr(method, receiver));
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        line.push_str(", ");
                    }
                    line.push_str(&self.expr(method, arg));
                }
                line.push_str(&format!("); // {}{}", m.owner, m.descriptor));
                self.writeln(&line);
            }
            StmtKind::ArraySet { array, index, value } => {
                let line = format!(
                    "{}[{}] = {};",
                    self.expr(method, array),
                    self.expr(method, index),
                    self.expr(method, value)
                );
                self.writeln(&line);
            }
            StmtKind::FieldSet { field, object, value } => {
                let target = match object {
                    Some(obj) => format!("{}.{}", self.expr(method, obj), field.name),
                    None => format!("{}.{}", field.owner, field.name),
                };
                let line = format!("{} = {};", target, self.expr(method, value));
                self.writeln(&line);
            }
            StmtKind::Label(label) => {
                self.writeln(&format!("L{}:", label.0));
            }
            StmtKind::Goto(label) => {
                self.writeln(&format!("goto L{};", label.0));
            }
            StmtKind::If { cond, target } => {
                let line = format!("if ({}) goto L{};", self.expr(method, cond), target.0);
                self.writeln(&line);
            }
            StmtKind::Switch { value, cases } => {
                let mut line = format!("switch ({}) {{ ", self.expr(method, value));
                for (i, case) in cases.iter().enumerate() {
                    if i > 0 {
                        line.push_str(", ");
                    }
                    match case.key {
                        Some(key) => line.push_str(&format!("{} -> {}", key, case.id)),
                        None => line.push_str(&format!("default -> {}", case.id)),
                    }
                }
                line.push_str(" };");
                self.writeln(&line);
            }
            StmtKind::Case(id) => {
                self.writeln(&format!("{}:", id));
            }
            StmtKind::Return(value) => match value {
                Some(expr) => {
                    let line = format!("return {};", self.expr(method, expr));
                    self.writeln(&line);
                }
                None => self.writeln("return;"),
            },
            StmtKind::Throw(expr) => {
                let line = format!("throw {};", self.expr(method, expr));
                self.writeln(&line);
            }
            StmtKind::MonitorEnter(expr) => {
                let line = format!("monitor-enter {};", self.expr(method, expr));
                self.writeln(&line);
            }
            StmtKind::MonitorExit(expr) => {
                let line = format!("monitor-exit {};", self.expr(method, expr));
                self.writeln(&line);
            }
        }
    }

    fn expr(&self, method: &MethodAst, expr: &Expr) -> String {
        match expr {
            Expr::Const(literal) => self.literal(literal),
            Expr::Var(id) => self.var_name(method, *id).to_string(),
            Expr::Binary { op, lhs, rhs, .. } => format!(
                "{} {} {}",
                self.expr(method, lhs),
                binary_op_str(*op),
                self.expr(method, rhs)
            ),
            Expr::Neg { operand, .. } => format!("-{}", self.expr(method, operand)),
            Expr::Compare { cond, lhs, rhs } => format!(
                "{} {} {}",
                self.expr(method, lhs),
                cond_str(*cond),
                self.expr(method, rhs)
            ),
            Expr::Not(inner) => format!("!({})", self.expr(method, inner)),
            Expr::Cast { kind, ty, expr } => match kind {
                CastKind::Reinterpret => format!("(as {}) {}", ty, self.expr(method, expr)),
                CastKind::Dynamic => format!("({}) {}", ty, self.expr(method, expr)),
            },
            Expr::ArrayGet { array, index } => {
                format!("{}[{}]", self.expr(method, array), self.expr(method, index))
            }
            Expr::ArrayLength(array) => format!("{}.length", self.expr(method, array)),
            Expr::FieldGet { field, object } => match object {
                Some(obj) => format!("{}.{}", self.expr(method, obj), field.name),
                None => format!("{}.{}", field.owner, field.name),
            },
            Expr::Call { target, receiver, args } => {
                let mut s = match receiver {
                    Some(recv) => format!("{}.{}(", self.expr(method, recv), target.method.name),
                    None => format!("{}.{}(", target.method.owner, target.method.name),
                };
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        s.push_str(", ");
                    }
                    s.push_str(&self.expr(method, arg));
                }
                s.push(')');
                s
            }
            Expr::Alloc { class } => format!("new {}", class),
            Expr::NewArray { array_ty, dims } => {
                let mut depth = 0usize;
                let mut base = array_ty;
                while let Type::Array(elem) = base {
                    depth += 1;
                    base = elem;
                }
                let mut s = format!("new {}", base);
                for dim in dims {
                    s.push_str(&format!("[{}]", self.expr(method, dim)));
                }
                for _ in dims.len()..depth {
                    s.push_str("[]");
                }
                s
            }
            Expr::InstanceOf { expr, ty } => {
                format!("{} instanceof {}", self.expr(method, expr), ty)
            }
            Expr::CaughtException => "caught-exception".to_string(),
        }
    }

    fn literal(&self, literal: &Literal) -> String {
        match literal {
            Literal::Null => "null".to_string(),
            Literal::Int(v) => v.to_string(),
            Literal::Long(v) => format!("{}L", v),
            Literal::Float(v) => format!("{}f", v),
            Literal::Double(v) => format!("{}d", v),
            Literal::String(s) => format!("\"{}\"", s),
            Literal::Class(ty) => format!("{}.class", ty),
        }
    }
}

impl Default for AstPrinter {
    fn default() -> Self {
        Self::new()
    }
}

fn binary_op_str(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::Ushr => ">>>",
        BinaryOp::And => "&",
        BinaryOp::Or => "|",
        BinaryOp::Xor => "^",
    }
}

fn cond_str(cond: Cond) -> &'static str {
    match cond {
        Cond::Eq => "==",
        Cond::Ne => "!=",
        Cond::Lt => "<",
        Cond::Ge => ">=",
        Cond::Gt => ">",
        Cond::Le => "<=",
    }
}
