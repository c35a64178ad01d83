use std::process::ExitCode;
use std::time::Instant;

use qoreil::analyzer::stmt;
use qoreil::ast::{AstExpr, AstExprKind, AstStmt, AstStmtKind, BinOp, SourceLocation};
use qoreil::builder::Builder;
use qoreil::ir::{Function, Script, StringTable};
use qoreil::scope::{CollectingReporter, MapScope};
use qoreil::value::Heap;

fn loc() -> SourceLocation {
    SourceLocation::default()
}

/// Hand-builds `qmain`'s body for a small demo program equivalent to:
///
/// ```text
/// string s = "hello, " + "qoreil";
/// ```
///
/// exercising string-literal loading, the `Add` operator's string-concat
/// overload, and the refcount discipline end to end, the same role
/// `ouros-cli`'s hand-assembled `Runner` input plays for its teacher.
fn build_qmain(strings: &mut StringTable, scope: &mut MapScope, reporter: &mut CollectingReporter) -> Function {
    let mut b = Builder::new("qmain");
    let decl = AstStmt::new(
        loc(),
        AstStmtKind::Expr(AstExpr::new(
            loc(),
            AstExprKind::VarDecl {
                name: "s".to_owned(),
                declared_type: "string".to_owned(),
                init: Some(Box::new(AstExpr::new(
                    loc(),
                    AstExprKind::Binary {
                        op: BinOp::Add,
                        left: Box::new(AstExpr::new(loc(), AstExprKind::StringLiteral("hello, ".to_owned()))),
                        right: Box::new(AstExpr::new(loc(), AstExprKind::StringLiteral("qoreil".to_owned()))),
                    },
                ))),
            },
        )),
    );
    stmt::analyze_block(std::slice::from_ref(&decl), &mut b, scope, strings, reporter);
    b.terminate_ret_void();
    b.build()
}

fn main() -> ExitCode {
    let mut strings = StringTable::new();
    let mut scope = MapScope::new();
    let mut reporter = CollectingReporter::new();

    let qmain = build_qmain(&mut strings, &mut scope, &mut reporter);
    if !reporter.diagnostics.is_empty() {
        for (id, location, message) in &reporter.diagnostics {
            eprintln!("{id} at {location:?}: {message}");
        }
        return ExitCode::FAILURE;
    }

    let script = Script { strings: strings.into_vec(), global_count: 0, functions: vec![qmain] };

    let mut heap = Heap::new();
    let mut globals = qoreil::interp::Globals::new(script.global_count);
    let mut out = std::io::stdout();

    let start = Instant::now();
    match script.run(&mut heap, &mut globals, &mut out) {
        Ok(()) => {
            let elapsed = start.elapsed();
            println!("ran qinit/qmain/qdone in {elapsed:?}; heap objects still live: {}", heap.live_count());
            ExitCode::SUCCESS
        }
        Err(raised) => {
            let elapsed = start.elapsed();
            eprintln!("error after {elapsed:?}: {}", raised.message(&heap));
            ExitCode::FAILURE
        }
    }
}
