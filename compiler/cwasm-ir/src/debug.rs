//! Textual formatting for IR translation units.
//!
//! This is a Wadler-style pretty printer producing a C-like rendering of the IR for humans, with
//! every conversion and decay spelled out. It holds no compatibility guarantees.

use crate::expr::{IrCallee, IrExpr, IrExprKind, IrUnaryOp};
use crate::item::{IrFunction, IrLocal, IrRelocation, IrVariable, Linkage, LocalId};
use crate::stmt::{IrLocalInit, IrStmt};
use crate::ty::RecordTable;
use crate::IrTranslationUnit;
use cwasm_diagnostics::ice;
use pretty::RcDoc;

pub struct IrDebugPass();

impl IrDebugPass {
    pub fn format_translation_unit_to_string(unit: &IrTranslationUnit) -> String {
        let doc = Self::format_translation_unit(unit);
        let mut w = Vec::new();
        doc.render(80, &mut w)
            .unwrap_or_else(|_| ice!("failed to render ir translation unit"));
        String::from_utf8_lossy(&w).into_owned()
    }

    pub fn format_translation_unit(unit: &IrTranslationUnit) -> RcDoc<'_, ()> {
        RcDoc::text(format!("unit {} {{", unit.name))
            .append(
                RcDoc::hardline()
                    .append(RcDoc::text("// records"))
                    .append(RcDoc::hardline())
                    .append(Self::format_records(&unit.records))
                    .append(RcDoc::hardline())
                    .append(RcDoc::text("// variables"))
                    .append(RcDoc::hardline())
                    .append(RcDoc::intersperse(
                        unit.variables.iter().map(Self::format_variable),
                        RcDoc::hardline(),
                    ))
                    .append(RcDoc::hardline())
                    .append(RcDoc::hardline())
                    .append(RcDoc::text("// functions"))
                    .append(RcDoc::hardline())
                    .append(RcDoc::intersperse(
                        unit.functions.iter().map(Self::format_function),
                        RcDoc::hardline().append(RcDoc::hardline()),
                    ))
                    .nest(2),
            )
            .append(RcDoc::hardline())
            .append(RcDoc::text("}"))
    }

    fn format_records(records: &RecordTable) -> RcDoc<'_, ()> {
        RcDoc::concat(records.iter().filter_map(|record| {
            let fields = record.fields.as_ref()?;
            let name = record.name.clone().unwrap_or_else(|| "<anonymous>".to_owned());
            let doc = RcDoc::text(format!(
                "record#{} {} (size {}, align {}) {{",
                record.id.0, name, record.size, record.align
            ))
            .append(
                RcDoc::concat(fields.iter().map(|f| {
                    RcDoc::hardline().append(RcDoc::text(format!("+{} {}: {};", f.offset, f.name, f.ty)))
                }))
                .nest(2),
            )
            .append(RcDoc::hardline())
            .append(RcDoc::text("}"))
            .append(RcDoc::hardline());
            Some(doc)
        }))
    }

    fn format_variable(variable: &IrVariable) -> RcDoc<'_, ()> {
        let linkage = match variable.linkage {
            Linkage::Internal => "internal",
            Linkage::External => "external",
        };
        let mut doc = RcDoc::text(format!(
            "{linkage} {:?} {}: {} = [",
            variable.state, variable.link_name, variable.ty
        ))
        .append(RcDoc::intersperse(
            variable.data.bytes.iter().map(|b| RcDoc::text(format!("{b:02x}"))),
            RcDoc::softline(),
        ))
        .append(RcDoc::text("]"));
        for (offset, relocation) in &variable.data.relocations {
            let text = match relocation {
                IrRelocation::Address { symbol, addend } => format!("+{offset}: &{symbol} + {addend}"),
                IrRelocation::FunctionIndex { symbol } => format!("+{offset}: table({symbol})"),
            };
            doc = doc.append(RcDoc::hardline().append(RcDoc::text(text)).nest(2));
        }
        doc.group()
    }

    pub fn format_function(function: &IrFunction) -> RcDoc<'_, ()> {
        let linkage = match function.linkage {
            Linkage::Internal => "internal",
            Linkage::External => "external",
        };
        let locals = &function.locals;
        RcDoc::text(format!("{linkage} fn {}(", function.link_name))
            .append(RcDoc::intersperse(
                function
                    .parameters
                    .iter()
                    .map(|p| RcDoc::text(format!("{}: {}", local_name(locals, *p), locals[p.0 as usize].ty))),
                RcDoc::text(", "),
            ))
            .append(RcDoc::text(match function.ty.variadic {
                true => ", ...)",
                false => ")",
            }))
            .append(RcDoc::text(format!(" -> {} {{", function.ty.return_type)))
            .append(
                RcDoc::concat(locals.iter().enumerate().map(|(i, local)| {
                    let escapes = if local.escapes { " (memory)" } else { "" };
                    RcDoc::hardline().append(RcDoc::text(format!(
                        "local {}: {}{escapes}",
                        local_name(locals, LocalId(i as u32)),
                        local.ty
                    )))
                }))
                .append(RcDoc::concat(
                    function
                        .body
                        .iter()
                        .map(|s| RcDoc::hardline().append(Self::format_stmt(locals, s))),
                ))
                .nest(2),
            )
            .append(RcDoc::hardline())
            .append(RcDoc::text("}"))
    }

    fn format_block<'a>(locals: &'a [IrLocal], body: &'a [IrStmt]) -> RcDoc<'a, ()> {
        RcDoc::text("{")
            .append(
                RcDoc::concat(
                    body.iter()
                        .map(|s| RcDoc::hardline().append(Self::format_stmt(locals, s))),
                )
                .nest(2),
            )
            .append(RcDoc::hardline())
            .append(RcDoc::text("}"))
    }

    fn format_nested<'a>(locals: &'a [IrLocal], stmt: &'a IrStmt) -> RcDoc<'a, ()> {
        match stmt {
            IrStmt::Block(body) => Self::format_block(locals, body),
            other => Self::format_block(locals, std::slice::from_ref(other)),
        }
    }

    pub fn format_stmt<'a>(locals: &'a [IrLocal], stmt: &'a IrStmt) -> RcDoc<'a, ()> {
        match stmt {
            IrStmt::Expr(e) => Self::format_expr(locals, e).append(RcDoc::text(";")),
            IrStmt::Declare { local, init } => {
                let doc = RcDoc::text(format!("let {}", local_name(locals, *local)));
                match init {
                    Some(init) => doc
                        .append(RcDoc::text(" = "))
                        .append(Self::format_init(locals, init))
                        .append(RcDoc::text(";")),
                    None => doc.append(RcDoc::text(";")),
                }
            }
            IrStmt::Block(body) => Self::format_block(locals, body),
            IrStmt::If {
                condition,
                then,
                otherwise,
            } => {
                let doc = RcDoc::text("if (")
                    .append(Self::format_expr(locals, condition))
                    .append(RcDoc::text(") "))
                    .append(Self::format_nested(locals, then));
                match otherwise {
                    Some(otherwise) => doc
                        .append(RcDoc::text(" else "))
                        .append(Self::format_nested(locals, otherwise)),
                    None => doc,
                }
            }
            IrStmt::While { condition, body } => RcDoc::text("while (")
                .append(Self::format_expr(locals, condition))
                .append(RcDoc::text(") "))
                .append(Self::format_nested(locals, body)),
            IrStmt::DoWhile { body, condition } => RcDoc::text("do ")
                .append(Self::format_nested(locals, body))
                .append(RcDoc::text(" while ("))
                .append(Self::format_expr(locals, condition))
                .append(RcDoc::text(");")),
            IrStmt::For {
                init,
                condition,
                update,
                body,
            } => RcDoc::text("for (")
                .append(RcDoc::intersperse(
                    init.iter().map(|s| Self::format_stmt(locals, s)),
                    RcDoc::space(),
                ))
                .append(RcDoc::text("; "))
                .append(match condition {
                    Some(c) => Self::format_expr(locals, c),
                    None => RcDoc::nil(),
                })
                .append(RcDoc::text("; "))
                .append(match update {
                    Some(u) => Self::format_expr(locals, u),
                    None => RcDoc::nil(),
                })
                .append(RcDoc::text(") "))
                .append(Self::format_nested(locals, body)),
            IrStmt::Switch { value, sections } => RcDoc::text("switch (")
                .append(Self::format_expr(locals, value))
                .append(RcDoc::text(") {"))
                .append(
                    RcDoc::concat(sections.iter().map(|section| {
                        let label = match section.value {
                            Some(v) => format!("case {v}:"),
                            None => "default:".to_owned(),
                        };
                        RcDoc::hardline().append(RcDoc::text(label)).append(
                            RcDoc::concat(
                                section
                                    .body
                                    .iter()
                                    .map(|s| RcDoc::hardline().append(Self::format_stmt(locals, s))),
                            )
                            .nest(2),
                        )
                    }))
                    .nest(2),
                )
                .append(RcDoc::hardline())
                .append(RcDoc::text("}")),
            IrStmt::Break => RcDoc::text("break;"),
            IrStmt::Continue => RcDoc::text("continue;"),
            IrStmt::Return(None) => RcDoc::text("return;"),
            IrStmt::Return(Some(value)) => RcDoc::text("return ")
                .append(Self::format_expr(locals, value))
                .append(RcDoc::text(";")),
            IrStmt::Labeled { label, body } => RcDoc::text(format!("{label}:"))
                .append(RcDoc::hardline())
                .append(Self::format_stmt(locals, body)),
            IrStmt::Goto { label, .. } => RcDoc::text(format!("goto {label};")),
        }
    }

    fn format_init<'a>(locals: &'a [IrLocal], init: &'a IrLocalInit) -> RcDoc<'a, ()> {
        match init {
            IrLocalInit::Expr(e) => Self::format_expr(locals, e),
            IrLocalInit::Aggregate(stores) => RcDoc::text("{")
                .append(RcDoc::intersperse(
                    stores.iter().map(|s| {
                        RcDoc::text(format!("+{}: ", s.offset)).append(Self::format_expr(locals, &s.value))
                    }),
                    RcDoc::text(",").append(RcDoc::line()),
                ))
                .append(RcDoc::text("}"))
                .nest(2)
                .group(),
        }
    }

    pub fn format_expr<'a>(locals: &'a [IrLocal], expr: &'a IrExpr) -> RcDoc<'a, ()> {
        let f = |e: &'a IrExpr| Self::format_expr(locals, e);
        match &expr.kind {
            IrExprKind::IntConst(v) => RcDoc::text(v.to_string()),
            IrExprKind::FloatConst(v) => RcDoc::text(format!("{v:?}")),
            IrExprKind::Local(id) => RcDoc::text(local_name(locals, *id)),
            IrExprKind::Global(name) | IrExprKind::FunctionRef(name) => RcDoc::text(format!("@{name}")),
            IrExprKind::Deref(e) => RcDoc::text("*").append(f(e)),
            IrExprKind::Member { base, offset } => f(base).append(RcDoc::text(format!(".+{offset}"))),
            IrExprKind::AddressOf(e) => RcDoc::text("&").append(f(e)),
            IrExprKind::Assign { target, value } => f(target).append(RcDoc::text(" = ")).append(f(value)),
            IrExprKind::CompoundAssign { target, op, value, .. } => f(target)
                .append(RcDoc::text(format!(" {}= ", op.symbol())))
                .append(f(value)),
            IrExprKind::IncDec {
                target,
                increment,
                prefix,
                ..
            } => {
                let op = if *increment { "++" } else { "--" };
                match prefix {
                    true => RcDoc::text(op).append(f(target)),
                    false => f(target).append(RcDoc::text(op)),
                }
            }
            IrExprKind::Binary { op, lhs, rhs } => parenthesized(
                f(lhs)
                    .append(RcDoc::text(format!(" {} ", op.symbol())))
                    .append(f(rhs)),
            ),
            IrExprKind::PtrOffset {
                pointer,
                index,
                scale,
                subtract,
            } => parenthesized(
                f(pointer)
                    .append(RcDoc::text(if *subtract { " -p " } else { " +p " }))
                    .append(f(index))
                    .append(RcDoc::text(format!(" * {scale}"))),
            ),
            IrExprKind::PtrDiff { lhs, rhs, scale } => parenthesized(
                f(lhs)
                    .append(RcDoc::text(" -p "))
                    .append(f(rhs))
                    .append(RcDoc::text(format!(" / {scale}"))),
            ),
            IrExprKind::Logical { and, lhs, rhs } => parenthesized(
                f(lhs)
                    .append(RcDoc::text(if *and { " && " } else { " || " }))
                    .append(f(rhs)),
            ),
            IrExprKind::Unary { op, operand } => {
                let symbol = match op {
                    IrUnaryOp::Neg => "-",
                    IrUnaryOp::BitNot => "~",
                    IrUnaryOp::Not => "!",
                };
                RcDoc::text(symbol).append(f(operand))
            }
            IrExprKind::Cast(e) => RcDoc::text(format!("({})", expr.ty)).append(f(e)),
            IrExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => parenthesized(
                f(condition)
                    .append(RcDoc::text(" ? "))
                    .append(f(then))
                    .append(RcDoc::text(" : "))
                    .append(f(otherwise)),
            ),
            IrExprKind::Comma { lhs, rhs } => {
                parenthesized(f(lhs).append(RcDoc::text(", ")).append(f(rhs)))
            }
            IrExprKind::Call {
                callee,
                arguments,
                variadic_arguments,
                ..
            } => {
                let callee = match callee {
                    IrCallee::Direct(name) => RcDoc::text(format!("@{name}")),
                    IrCallee::Indirect(e) => parenthesized(f(e)),
                };
                let fixed = arguments.iter().map(f);
                let extra = variadic_arguments
                    .iter()
                    .map(|e| RcDoc::text("...").append(f(e)));
                callee
                    .append(RcDoc::text("("))
                    .append(RcDoc::intersperse(fixed.chain(extra), RcDoc::text(", ")))
                    .append(RcDoc::text(")"))
            }
            IrExprKind::VaArea => RcDoc::text("__va_area"),
            IrExprKind::VaArg { list } => RcDoc::text("__va_arg(")
                .append(f(list))
                .append(RcDoc::text(format!(", {})", expr.ty))),
            IrExprKind::CompoundLiteral { local, init } => RcDoc::text(format!("{}:", local_name(locals, *local)))
                .append(Self::format_init(locals, init)),
            IrExprKind::MemorySize => RcDoc::text("__memory_size()"),
            IrExprKind::MemoryGrow(pages) => RcDoc::text("__memory_grow(")
                .append(f(pages))
                .append(RcDoc::text(")")),
        }
    }
}

fn parenthesized(doc: RcDoc<'_, ()>) -> RcDoc<'_, ()> {
    RcDoc::text("(").append(doc).append(RcDoc::text(")"))
}

fn local_name(locals: &[IrLocal], id: LocalId) -> String {
    match locals.get(id.0 as usize) {
        Some(local) if !local.name.is_empty() => format!("{}%{}", local.name, id.0),
        _ => format!("%{}", id.0),
    }
}
