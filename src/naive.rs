//! Naive single-pass variant
//!
//! A deliberately crude strategy kept for comparison runs: only top-level
//! imports and top-level functions are considered, the first function that
//! mentions an imported name claims the whole statement, and no scope
//! resolution happens at all. Shadowing, class bases, decorators and
//! module-scope uses are all ignored. Exposed through `--naive`.

use std::collections::HashSet;

use rustpython_parser::{ast, Parse};
use rustpython_parser::ast::Ranged;

use crate::error::{LocalimpError, Result};

struct NaiveImport {
    names: Vec<String>,
    text: String,
    start: usize,
    end: usize,
    claimed: bool,
}

/// Move top-level imports into the first top-level function that uses them.
///
/// # Errors
///
/// Fails when the source does not parse.
pub fn move_imports_naive(source: &str) -> Result<String> {
    let suite = ast::Suite::parse(source, "<naive>")
        .map_err(|err| LocalimpError::ParseError(err.to_string()))?;

    let mut imports: Vec<NaiveImport> = Vec::new();
    for stmt in &suite {
        match stmt {
            ast::Stmt::Import(import) => {
                let names = import
                    .names
                    .iter()
                    .map(|alias| match &alias.asname {
                        Some(asname) => asname.to_string(),
                        None => alias
                            .name
                            .as_str()
                            .split('.')
                            .next()
                            .unwrap_or(alias.name.as_str())
                            .to_string(),
                    })
                    .collect();
                imports.push(naive_import(names, stmt, source));
            }
            ast::Stmt::ImportFrom(import_from) => {
                let names = import_from
                    .names
                    .iter()
                    .map(|alias| {
                        alias
                            .asname
                            .as_ref()
                            .unwrap_or(&alias.name)
                            .to_string()
                    })
                    .collect();
                imports.push(naive_import(names, stmt, source));
            }
            _ => {}
        }
    }

    // (start, end, replacement) edits applied back-to-front.
    let mut edits: Vec<(usize, usize, String)> = Vec::new();

    for stmt in &suite {
        let ast::Stmt::FunctionDef(func) = stmt else {
            continue;
        };
        let mut mentioned = HashSet::new();
        for body_stmt in &func.body {
            collect_stmt_names(body_stmt, &mut mentioned);
        }

        let mut claimed_texts = Vec::new();
        for import in &mut imports {
            if import.claimed {
                continue;
            }
            if import.names.iter().any(|name| mentioned.contains(name)) {
                import.claimed = true;
                claimed_texts.push(import.text.clone());
                let (line_start, line_end) = full_line_span(source, import.start, import.end);
                edits.push((line_start, line_end, String::new()));
            }
        }
        if claimed_texts.is_empty() {
            continue;
        }

        let Some((offset, indent)) = injection_point(&func.body, source) else {
            // Claim stands but there is nowhere to put the line; leave the
            // module statement alone.
            for import in &mut imports {
                if claimed_texts.contains(&import.text) {
                    import.claimed = false;
                }
            }
            edits.truncate(edits.len() - claimed_texts.len());
            continue;
        };
        let mut block = String::new();
        for text in &claimed_texts {
            block.push_str(&indent);
            block.push_str(text);
            block.push('\n');
        }
        edits.push((offset, offset, block));
    }

    edits.sort_by(|a, b| b.0.cmp(&a.0));
    let mut result = source.to_string();
    for (start, end, text) in edits {
        result.replace_range(start..end, &text);
    }
    Ok(result)
}

fn naive_import(names: Vec<String>, stmt: &ast::Stmt, source: &str) -> NaiveImport {
    let start = usize::from(stmt.range().start());
    let end = usize::from(stmt.range().end());
    NaiveImport {
        names,
        text: source[start..end].trim().to_string(),
        start,
        end,
        claimed: false,
    }
}

fn full_line_span(source: &str, start: usize, end: usize) -> (usize, usize) {
    let line_start = source[..start].rfind('\n').map_or(0, |idx| idx + 1);
    let line_end = source[end..]
        .find('\n')
        .map_or(source.len(), |idx| end + idx + 1);
    (line_start, line_end)
}

/// First non-docstring body statement's line start and indentation.
fn injection_point(body: &[ast::Stmt], source: &str) -> Option<(usize, String)> {
    let first = body.iter().find(|stmt| !is_docstring(stmt))?;
    let offset = usize::from(first.range().start());
    let line_start = source[..offset].rfind('\n').map_or(0, |idx| idx + 1);
    if !source[line_start..offset].trim().is_empty() {
        return None;
    }
    let indent: String = source[line_start..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect();
    Some((line_start, indent))
}

fn is_docstring(stmt: &ast::Stmt) -> bool {
    if let ast::Stmt::Expr(expr_stmt) = stmt {
        if let ast::Expr::Constant(constant) = expr_stmt.value.as_ref() {
            return matches!(constant.value, ast::Constant::Str(_));
        }
    }
    false
}

fn collect_stmt_names(stmt: &ast::Stmt, names: &mut HashSet<String>) {
    match stmt {
        ast::Stmt::Expr(expr_stmt) => collect_expr_names(&expr_stmt.value, names),
        ast::Stmt::Return(ret) => {
            if let Some(value) = &ret.value {
                collect_expr_names(value, names);
            }
        }
        ast::Stmt::Assign(assign) => {
            collect_expr_names(&assign.value, names);
            for target in &assign.targets {
                collect_expr_names(target, names);
            }
        }
        ast::Stmt::AnnAssign(assign) => {
            collect_expr_names(&assign.annotation, names);
            if let Some(value) = &assign.value {
                collect_expr_names(value, names);
            }
        }
        ast::Stmt::AugAssign(assign) => {
            collect_expr_names(&assign.target, names);
            collect_expr_names(&assign.value, names);
        }
        ast::Stmt::For(for_stmt) => {
            collect_expr_names(&for_stmt.iter, names);
            for body_stmt in for_stmt.body.iter().chain(&for_stmt.orelse) {
                collect_stmt_names(body_stmt, names);
            }
        }
        ast::Stmt::While(while_stmt) => {
            collect_expr_names(&while_stmt.test, names);
            for body_stmt in while_stmt.body.iter().chain(&while_stmt.orelse) {
                collect_stmt_names(body_stmt, names);
            }
        }
        ast::Stmt::If(if_stmt) => {
            collect_expr_names(&if_stmt.test, names);
            for body_stmt in if_stmt.body.iter().chain(&if_stmt.orelse) {
                collect_stmt_names(body_stmt, names);
            }
        }
        ast::Stmt::With(with_stmt) => {
            for item in &with_stmt.items {
                collect_expr_names(&item.context_expr, names);
            }
            for body_stmt in &with_stmt.body {
                collect_stmt_names(body_stmt, names);
            }
        }
        ast::Stmt::Try(try_stmt) => {
            for body_stmt in try_stmt
                .body
                .iter()
                .chain(&try_stmt.orelse)
                .chain(&try_stmt.finalbody)
            {
                collect_stmt_names(body_stmt, names);
            }
            for handler in &try_stmt.handlers {
                let ast::ExceptHandler::ExceptHandler(handler) = handler;
                for body_stmt in &handler.body {
                    collect_stmt_names(body_stmt, names);
                }
            }
        }
        ast::Stmt::Raise(raise) => {
            if let Some(exc) = &raise.exc {
                collect_expr_names(exc, names);
            }
        }
        ast::Stmt::FunctionDef(func) => {
            for decorator in &func.decorator_list {
                collect_expr_names(decorator, names);
            }
            for body_stmt in &func.body {
                collect_stmt_names(body_stmt, names);
            }
        }
        _ => {}
    }
}

fn collect_expr_names(expr: &ast::Expr, names: &mut HashSet<String>) {
    match expr {
        ast::Expr::Name(name) => {
            names.insert(name.id.to_string());
        }
        ast::Expr::Attribute(attr) => collect_expr_names(&attr.value, names),
        ast::Expr::Call(call) => {
            collect_expr_names(&call.func, names);
            for arg in &call.args {
                collect_expr_names(arg, names);
            }
            for keyword in &call.keywords {
                collect_expr_names(&keyword.value, names);
            }
        }
        ast::Expr::BinOp(binop) => {
            collect_expr_names(&binop.left, names);
            collect_expr_names(&binop.right, names);
        }
        ast::Expr::UnaryOp(unary) => collect_expr_names(&unary.operand, names),
        ast::Expr::BoolOp(bool_op) => {
            for value in &bool_op.values {
                collect_expr_names(value, names);
            }
        }
        ast::Expr::Compare(compare) => {
            collect_expr_names(&compare.left, names);
            for comparator in &compare.comparators {
                collect_expr_names(comparator, names);
            }
        }
        ast::Expr::Subscript(subscript) => {
            collect_expr_names(&subscript.value, names);
            collect_expr_names(&subscript.slice, names);
        }
        ast::Expr::Tuple(tuple) => {
            for elt in &tuple.elts {
                collect_expr_names(elt, names);
            }
        }
        ast::Expr::List(list) => {
            for elt in &list.elts {
                collect_expr_names(elt, names);
            }
        }
        ast::Expr::Dict(dict) => {
            for key in dict.keys.iter().flatten() {
                collect_expr_names(key, names);
            }
            for value in &dict.values {
                collect_expr_names(value, names);
            }
        }
        ast::Expr::JoinedStr(joined) => {
            for value in &joined.values {
                collect_expr_names(value, names);
            }
        }
        ast::Expr::FormattedValue(formatted) => collect_expr_names(&formatted.value, names),
        ast::Expr::Starred(starred) => collect_expr_names(&starred.value, names),
        ast::Expr::IfExp(if_exp) => {
            collect_expr_names(&if_exp.test, names);
            collect_expr_names(&if_exp.body, names);
            collect_expr_names(&if_exp.orelse, names);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_function_claims_the_import() {
        let out = move_imports_naive(concat!(
            "import math\n",
            "\n",
            "def a():\n",
            "    return math.pi\n",
            "\n",
            "def b():\n",
            "    return math.e\n",
        ))
        .expect("naive move should succeed");
        assert!(out.contains("def a():\n    import math\n"));
        // Second user gets nothing; the statement moved wholesale.
        assert!(!out.contains("def b():\n    import math"));
        assert!(!out.starts_with("import math"));
    }

    #[test]
    fn unclaimed_import_stays_put() {
        let out = move_imports_naive("import os\n\nx = 1\n").expect("naive move should succeed");
        assert!(out.starts_with("import os\n"));
    }

    #[test]
    fn docstring_is_preserved() {
        let out = move_imports_naive(concat!(
            "import math\n",
            "\n",
            "def a():\n",
            "    \"\"\"doc\"\"\"\n",
            "    return math.pi\n",
        ))
        .expect("naive move should succeed");
        assert!(out.contains("    \"\"\"doc\"\"\"\n    import math\n    return math.pi\n"));
    }

    #[test]
    fn bad_source_errors() {
        assert!(move_imports_naive("def f(:\n").is_err());
    }
}
