//! Call-graph construction and derived analyses
//!
//! Direct identifier calls become edges; calls through function-typed
//! variables only mark the caller as having indirect calls, which disables
//! inlining for it. Recursion is found on strongly-connected components,
//! and functions with no call sites that are neither entry points, exports
//! nor stubs are reported unused.

use crate::analyzer::Analyzer;
use crate::intrinsics::Intrinsic;
use hashbrown::{HashMap, HashSet};
use sable_common::{DiagnosticCode, MetaKey, MetaValue};
use sable_parser::{Block, Expr, ExprKind, ItemKind, Program, Stmt, StmtKind};
use serde::{Deserialize, Serialize};

/// Below this statement count a function is small enough to inline.
const INLINE_SIZE_LIMIT: usize = 10;
/// At this many call sites inlining stops paying for itself.
const INLINE_CALL_LIMIT: usize = 5;
/// A switch with more arms than this disqualifies its function.
const SIMPLE_SWITCH_LIMIT: usize = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallGraphNode {
    pub name: String,
    pub callees: Vec<String>,
    pub callers: Vec<String>,
    /// Number of call sites targeting this function.
    pub call_count: usize,
    pub is_recursive: bool,
    /// Transitive statement count of the body.
    pub size: usize,
    pub inline_candidate: bool,
    pub has_indirect_calls: bool,
    pub has_loops: bool,
    pub has_complex_switch: bool,
    pub is_exported: bool,
    pub is_stub: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallGraph {
    nodes: HashMap<String, CallGraphNode>,
    order: Vec<String>,
}

impl CallGraph {
    pub fn node(&self, name: &str) -> Option<&CallGraphNode> {
        self.nodes.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CallGraphNode> {
        self.order.iter().filter_map(|name| self.nodes.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, node: CallGraphNode) {
        self.order.push(node.name.clone());
        self.nodes.insert(node.name.clone(), node);
    }
}

/// Per-function facts gathered by one body walk.
#[derive(Default)]
struct BodyFacts {
    size: usize,
    callees: Vec<String>,
    has_indirect_calls: bool,
    has_loops: bool,
    has_complex_switch: bool,
}

struct BodyWalker<'a> {
    facts: BodyFacts,
    functions: &'a HashSet<String>,
    variables: &'a HashSet<String>,
}

impl<'a> BodyWalker<'a> {
    fn walk_block(&mut self, block: &Block) {
        for stmt in &block.statements {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        self.facts.size += 1;
        match &stmt.kind {
            StmtKind::Block(block) => self.walk_block(block),
            StmtKind::Expr(expr) => self.walk_expr(expr),
            StmtKind::Local(local) => {
                if let Some(init) = &local.initializer {
                    self.walk_expr(init);
                }
            }
            StmtKind::If { condition, then_block, else_block } => {
                self.walk_expr(condition);
                self.walk_block(then_block);
                if let Some(else_block) = else_block {
                    self.walk_block(else_block);
                }
            }
            StmtKind::While { condition, body } => {
                self.facts.has_loops = true;
                self.walk_expr(condition);
                self.walk_block(body);
            }
            StmtKind::For { start, end, step, body, .. } => {
                self.facts.has_loops = true;
                self.walk_expr(start);
                self.walk_expr(end);
                if let Some(step) = step {
                    self.walk_expr(step);
                }
                self.walk_block(body);
            }
            StmtKind::Switch { scrutinee, cases, default } => {
                if cases.len() > SIMPLE_SWITCH_LIMIT {
                    self.facts.has_complex_switch = true;
                }
                self.walk_expr(scrutinee);
                for case in cases {
                    self.walk_expr(&case.value);
                    for stmt in &case.body {
                        self.walk_stmt(stmt);
                    }
                }
                if let Some(default) = default {
                    for stmt in default {
                        self.walk_stmt(stmt);
                    }
                }
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.walk_expr(value);
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match expr.kind.as_ref() {
            ExprKind::Call { callee, args } => {
                let name = callee.value.as_str();
                if Intrinsic::lookup(name).is_none() {
                    if self.functions.contains(name) {
                        self.facts.callees.push(name.to_string());
                    } else if self.variables.contains(name) {
                        // A call through a function-typed variable: no edge,
                        // but inlining the caller is no longer safe.
                        self.facts.has_indirect_calls = true;
                    }
                }
                for arg in args {
                    self.walk_expr(arg);
                }
            }
            ExprKind::Binary { left, right, .. } => {
                self.walk_expr(left);
                self.walk_expr(right);
            }
            ExprKind::Unary { operand, .. } => self.walk_expr(operand),
            ExprKind::Ternary { condition, then_expr, else_expr } => {
                self.walk_expr(condition);
                self.walk_expr(then_expr);
                self.walk_expr(else_expr);
            }
            ExprKind::Index { base, index } => {
                self.walk_expr(base);
                self.walk_expr(index);
            }
            ExprKind::ArrayLiteral(elements) => {
                for element in elements {
                    self.walk_expr(element);
                }
            }
            ExprKind::Assign { target, value, .. } => {
                self.walk_expr(target);
                self.walk_expr(value);
            }
            ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::Member { .. } => {}
        }
    }
}

impl Analyzer {
    /// Build the call graph, flag recursion and inline candidates, report
    /// unused functions and write the results into function metadata.
    pub(crate) fn build_call_graph(&mut self, program: &mut Program) -> CallGraph {
        let mut functions = HashSet::new();
        let mut variables = HashSet::new();
        for item in &program.items {
            match &item.kind {
                ItemKind::Function(func) => {
                    functions.insert(func.name.value.clone());
                }
                ItemKind::Variable(var) => {
                    variables.insert(var.name.value.clone());
                }
                ItemKind::Import(import) => {
                    for name in &import.names {
                        functions.insert(name.value.clone());
                    }
                }
                _ => {}
            }
        }

        let mut graph = CallGraph::default();
        for item in &program.items {
            let ItemKind::Function(func) = &item.kind else {
                continue;
            };
            let mut walker = BodyWalker {
                facts: BodyFacts::default(),
                functions: &functions,
                variables: &variables,
            };
            if let Some(body) = &func.body {
                walker.walk_block(body);
            }
            let facts = walker.facts;
            graph.insert(CallGraphNode {
                name: func.name.value.clone(),
                callees: facts.callees,
                callers: Vec::new(),
                call_count: 0,
                is_recursive: false,
                size: facts.size,
                inline_candidate: false,
                has_indirect_calls: facts.has_indirect_calls,
                has_loops: facts.has_loops,
                has_complex_switch: facts.has_complex_switch,
                is_exported: func.is_exported,
                is_stub: func.is_stub(),
            });
        }

        // Caller lists and call-site counts.
        let edges: Vec<(String, String)> = graph
            .nodes()
            .flat_map(|n| n.callees.iter().map(move |c| (n.name.clone(), c.clone())))
            .collect();
        for (caller, callee) in &edges {
            if let Some(node) = graph.nodes.get_mut(callee) {
                node.call_count += 1;
                if !node.callers.contains(caller) {
                    node.callers.push(caller.clone());
                }
            }
        }

        // Every member of a call cycle is recursive.
        for name in find_recursive(&graph) {
            if let Some(node) = graph.nodes.get_mut(&name) {
                node.is_recursive = true;
            }
        }

        for name in graph.order.clone() {
            let Some(node) = graph.nodes.get_mut(&name) else {
                continue;
            };
            node.inline_candidate = node.size < INLINE_SIZE_LIMIT
                && !node.is_recursive
                && node.call_count > 0
                && node.call_count < INLINE_CALL_LIMIT
                && !node.is_exported
                && !node.has_indirect_calls
                && !node.has_loops
                && !node.has_complex_switch;
        }

        // Unused-function analysis plus metadata annotations.
        for item in &mut program.items {
            let ItemKind::Function(func) = &item.kind else {
                continue;
            };
            let Some(node) = graph.nodes.get(&func.name.value) else {
                continue;
            };
            let unused = node.call_count == 0
                && func.name.value != "main"
                && !node.is_exported
                && !node.is_stub;
            if unused {
                self.diagnostics.warning(
                    DiagnosticCode::UnusedFunction,
                    format!("function '{}' is never called", func.name.value),
                    func.name.span,
                );
            }
            item.metadata
                .set(MetaKey::CallGraphCallCount, MetaValue::Int(node.call_count as i64));
            item.metadata.set(MetaKey::CallGraphUnused, MetaValue::Bool(unused));
            item.metadata.set(
                MetaKey::CallGraphInlineCandidate,
                MetaValue::Bool(node.inline_candidate),
            );
            item.metadata
                .set(MetaKey::CallGraphRecursive, MetaValue::Bool(node.is_recursive));
        }

        log::debug!("call graph: {} functions, {} edges", graph.len(), edges.len());
        graph
    }
}

/// Names of all functions participating in a call cycle, via Tarjan's SCC
/// algorithm (iterative bookkeeping kept simple with recursion over the
/// small per-module graph).
fn find_recursive(graph: &CallGraph) -> Vec<String> {
    struct Tarjan<'a> {
        graph: &'a CallGraph,
        index: usize,
        indices: HashMap<&'a str, usize>,
        lowlinks: HashMap<&'a str, usize>,
        on_stack: HashSet<&'a str>,
        stack: Vec<&'a str>,
        recursive: Vec<String>,
    }

    impl<'a> Tarjan<'a> {
        fn strongconnect(&mut self, v: &'a str) {
            self.indices.insert(v, self.index);
            self.lowlinks.insert(v, self.index);
            self.index += 1;
            self.stack.push(v);
            self.on_stack.insert(v);

            if let Some(node) = self.graph.nodes.get(v) {
                for callee in &node.callees {
                    let w = callee.as_str();
                    if !self.graph.nodes.contains_key(w) {
                        continue; // external callee
                    }
                    if !self.indices.contains_key(w) {
                        self.strongconnect(w);
                        let low = self.lowlinks[w].min(self.lowlinks[v]);
                        self.lowlinks.insert(v, low);
                    } else if self.on_stack.contains(w) {
                        let low = self.indices[w].min(self.lowlinks[v]);
                        self.lowlinks.insert(v, low);
                    }
                }
            }

            if self.lowlinks[v] == self.indices[v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack.remove(w);
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                let self_loop = component.len() == 1
                    && self
                        .graph
                        .nodes
                        .get(component[0])
                        .map(|n| n.callees.iter().any(|c| c == component[0]))
                        .unwrap_or(false);
                if component.len() > 1 || self_loop {
                    self.recursive.extend(component.iter().map(|s| s.to_string()));
                }
            }
        }
    }

    let mut tarjan = Tarjan {
        graph,
        index: 0,
        indices: HashMap::new(),
        lowlinks: HashMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        recursive: Vec::new(),
    };
    for name in &graph.order {
        if !tarjan.indices.contains_key(name.as_str()) {
            tarjan.strongconnect(name);
        }
    }
    tarjan.recursive
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Analysis, Analyzer, AnalyzerOptions};
    use sable_lexer::Lexer;
    use sable_parser::Parser;

    fn analyze(source: &str) -> (Analysis, sable_common::Diagnostics) {
        let tokens = Lexer::new(source, 0).tokenize();
        let mut parser = Parser::new(tokens);
        let mut program = parser.parse();
        Analyzer::analyze(&mut program, AnalyzerOptions::default())
    }

    #[test]
    fn direct_recursion_is_flagged() {
        let (analysis, _) = analyze("module t; function f(): void { f(); }");
        let node = analysis.call_graph.node("f").unwrap();
        assert!(node.is_recursive);
        assert!(!node.inline_candidate);
    }

    #[test]
    fn mutual_recursion_flags_the_whole_cycle() {
        let source = r#"
            module t;
            function even(n: byte): bool { if (n == 0) { return true; } return odd(n - 1); }
            function odd(n: byte): bool { if (n == 0) { return false; } return even(n - 1); }
            function main(): void { even(4); }
        "#;
        let (analysis, _) = analyze(source);
        assert!(analysis.call_graph.node("even").unwrap().is_recursive);
        assert!(analysis.call_graph.node("odd").unwrap().is_recursive);
        assert!(!analysis.call_graph.node("main").unwrap().is_recursive);
    }

    #[test]
    fn small_called_function_is_inline_candidate() {
        let source = r#"
            module t;
            function helper(x: byte): byte { return x + 1; }
            function main(): void { poke($D020, helper(1)); }
        "#;
        let (analysis, _) = analyze(source);
        let node = analysis.call_graph.node("helper").unwrap();
        assert_eq!(node.call_count, 1);
        assert!(node.inline_candidate);
    }

    #[test]
    fn loops_disqualify_inlining() {
        let source = r#"
            module t;
            function helper(x: byte): byte {
                while (x < 10) { x = x + 1; }
                return x;
            }
            function main(): void { poke($D020, helper(1)); }
        "#;
        let (analysis, _) = analyze(source);
        assert!(!analysis.call_graph.node("helper").unwrap().inline_candidate);
    }

    #[test]
    fn main_and_exports_are_never_unused() {
        let source = r#"
            module t;
            export function api(): void { }
            function main(): void { }
            function orphan(): void { }
        "#;
        let (_, diagnostics) = analyze(source);
        let unused: Vec<_> = diagnostics
            .with_code(DiagnosticCode::UnusedFunction)
            .map(|d| d.message.clone())
            .collect();
        assert_eq!(unused.len(), 1, "{:?}", unused);
        assert!(unused[0].contains("orphan"));
    }

    #[test]
    fn metadata_is_written_onto_function_items() {
        let source = r#"
            module t;
            function helper(): void { }
            function main(): void { helper(); }
        "#;
        let tokens = Lexer::new(source, 0).tokenize();
        let mut parser = Parser::new(tokens);
        let mut program = parser.parse();
        let _ = Analyzer::analyze(&mut program, AnalyzerOptions::default());

        let helper = &program.items[0];
        assert_eq!(helper.metadata.get_int(MetaKey::CallGraphCallCount), Some(1));
        assert_eq!(helper.metadata.get_bool(MetaKey::CallGraphUnused), Some(false));
    }

    #[test]
    fn indirect_calls_mark_the_caller() {
        let source = r#"
            module t;
            function target(): void { }
            let handler = 0;
            function main(): void { handler(); target(); }
        "#;
        let (analysis, _) = analyze(source);
        let main = analysis.call_graph.node("main").unwrap();
        assert!(main.has_indirect_calls);
        assert_eq!(main.callees, vec!["target".to_string()]);
    }
}
