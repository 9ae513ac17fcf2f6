//! Per-function control-flow graphs
//!
//! Each statement becomes a node; structured statements become structured
//! subgraphs. Reachability is computed by BFS from the entry node, never
//! stored on the nodes themselves. Unreachable statements produce
//! `UNREACHABLE_CODE` warnings, one per dead region.

use crate::analyzer::Analyzer;
use hashbrown::HashMap;
use sable_common::{DiagnosticCode, Span};
use sable_parser::{Block, ItemKind, NodeId, Program, Stmt, StmtKind};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub type CfgNodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CfgNodeKind {
    Entry,
    Exit,
    Statement,
    Branch,
    Loop,
    /// Synthetic join point after a branch or loop.
    Merge,
    Return,
    Break,
    Continue,
}

impl CfgNodeKind {
    /// Terminating nodes have no fall-through; their outgoing edges are
    /// jumps.
    pub fn is_terminating(self) -> bool {
        matches!(self, CfgNodeKind::Return | CfgNodeKind::Break | CfgNodeKind::Continue)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgNode {
    pub id: CfgNodeId,
    pub kind: CfgNodeKind,
    /// The owning statement; `None` for synthetic nodes.
    pub stmt: Option<NodeId>,
    pub span: Option<Span>,
    pub preds: Vec<CfgNodeId>,
    pub succs: Vec<CfgNodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    nodes: Vec<CfgNode>,
    pub entry: CfgNodeId,
    pub exit: CfgNodeId,
}

impl ControlFlowGraph {
    fn new() -> Self {
        let mut cfg = Self { nodes: Vec::new(), entry: 0, exit: 0 };
        cfg.entry = cfg.add_node(CfgNodeKind::Entry, None, None);
        cfg.exit = cfg.add_node(CfgNodeKind::Exit, None, None);
        cfg
    }

    fn add_node(&mut self, kind: CfgNodeKind, stmt: Option<NodeId>, span: Option<Span>) -> CfgNodeId {
        let id = self.nodes.len();
        self.nodes.push(CfgNode {
            id,
            kind,
            stmt,
            span,
            preds: Vec::new(),
            succs: Vec::new(),
        });
        id
    }

    fn add_edge(&mut self, from: CfgNodeId, to: CfgNodeId) {
        if !self.nodes[from].succs.contains(&to) {
            self.nodes[from].succs.push(to);
        }
        if !self.nodes[to].preds.contains(&from) {
            self.nodes[to].preds.push(from);
        }
    }

    pub fn node(&self, id: CfgNodeId) -> &CfgNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CfgNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// BFS reachability from the entry node.
    pub fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        seen[self.entry] = true;
        queue.push_back(self.entry);
        while let Some(node) = queue.pop_front() {
            for &succ in &self.nodes[node].succs {
                if !seen[succ] {
                    seen[succ] = true;
                    queue.push_back(succ);
                }
            }
        }
        seen
    }
}

/// Break/continue context while building: loops provide both targets,
/// switches only a break target.
enum FlowCtx {
    Loop { header: CfgNodeId, exit: CfgNodeId },
    Switch { exit: CfgNodeId },
}

struct CfgBuilder {
    cfg: ControlFlowGraph,
    flow_stack: Vec<FlowCtx>,
}

impl CfgBuilder {
    fn new() -> Self {
        Self { cfg: ControlFlowGraph::new(), flow_stack: Vec::new() }
    }

    fn build(mut self, body: &Block) -> ControlFlowGraph {
        let entry = self.cfg.entry;
        let end = self.lower_block(body, Some(entry));
        // Fall-through off the end of the function reaches the exit node.
        if let Some(end) = end {
            let exit = self.cfg.exit;
            self.cfg.add_edge(end, exit);
        }
        self.cfg
    }

    /// Lower a block starting from `current` (the node control flows in
    /// from, `None` when the path already terminated). Returns the node
    /// control falls out of, or `None` if every path terminated.
    fn lower_block(&mut self, block: &Block, current: Option<CfgNodeId>) -> Option<CfgNodeId> {
        let mut current = current;
        for stmt in &block.statements {
            current = self.lower_stmt(stmt, current);
        }
        current
    }

    fn lower_stmts(&mut self, stmts: &[Stmt], current: Option<CfgNodeId>) -> Option<CfgNodeId> {
        let mut current = current;
        for stmt in stmts {
            current = self.lower_stmt(stmt, current);
        }
        current
    }

    fn lower_stmt(&mut self, stmt: &Stmt, current: Option<CfgNodeId>) -> Option<CfgNodeId> {
        match &stmt.kind {
            StmtKind::Expr(_) | StmtKind::Local(_) => {
                let node = self.cfg.add_node(CfgNodeKind::Statement, Some(stmt.id), Some(stmt.span));
                self.connect(current, node);
                Some(node)
            }
            StmtKind::Block(block) => self.lower_block(block, current),
            StmtKind::Return(_) => {
                let node = self.cfg.add_node(CfgNodeKind::Return, Some(stmt.id), Some(stmt.span));
                self.connect(current, node);
                let exit = self.cfg.exit;
                self.cfg.add_edge(node, exit);
                None
            }
            StmtKind::Break => {
                let node = self.cfg.add_node(CfgNodeKind::Break, Some(stmt.id), Some(stmt.span));
                self.connect(current, node);
                if let Some(target) = self.break_target() {
                    self.cfg.add_edge(node, target);
                }
                None
            }
            StmtKind::Continue => {
                let node = self.cfg.add_node(CfgNodeKind::Continue, Some(stmt.id), Some(stmt.span));
                self.connect(current, node);
                if let Some(target) = self.continue_target() {
                    self.cfg.add_edge(node, target);
                }
                None
            }
            StmtKind::If { then_block, else_block, .. } => {
                let branch = self.cfg.add_node(CfgNodeKind::Branch, Some(stmt.id), Some(stmt.span));
                self.connect(current, branch);

                let then_end = self.lower_block(then_block, Some(branch));
                let else_end = match else_block {
                    Some(else_block) => self.lower_block(else_block, Some(branch)),
                    None => Some(branch), // fall-through edge to the merge
                };

                // When both arms terminate, there is nothing to merge.
                if then_end.is_none() && else_end.is_none() {
                    return None;
                }
                let merge = self.cfg.add_node(CfgNodeKind::Merge, None, None);
                if let Some(end) = then_end {
                    self.cfg.add_edge(end, merge);
                }
                if let Some(end) = else_end {
                    self.cfg.add_edge(end, merge);
                }
                Some(merge)
            }
            StmtKind::While { body, .. } => {
                let header = self.cfg.add_node(CfgNodeKind::Loop, Some(stmt.id), Some(stmt.span));
                self.connect(current, header);
                let exit = self.cfg.add_node(CfgNodeKind::Merge, None, None);
                self.cfg.add_edge(header, exit);

                self.flow_stack.push(FlowCtx::Loop { header, exit });
                let body_end = self.lower_block(body, Some(header));
                self.flow_stack.pop();

                if let Some(end) = body_end {
                    self.cfg.add_edge(end, header); // back edge
                }
                Some(exit)
            }
            StmtKind::For { body, .. } => {
                // While-shaped lowering over the induction variable: an
                // initialization node, then a condition header.
                let init = self.cfg.add_node(CfgNodeKind::Statement, Some(stmt.id), Some(stmt.span));
                self.connect(current, init);
                let header = self.cfg.add_node(CfgNodeKind::Loop, Some(stmt.id), Some(stmt.span));
                self.cfg.add_edge(init, header);
                let exit = self.cfg.add_node(CfgNodeKind::Merge, None, None);
                self.cfg.add_edge(header, exit);

                self.flow_stack.push(FlowCtx::Loop { header, exit });
                let body_end = self.lower_block(body, Some(header));
                self.flow_stack.pop();

                if let Some(end) = body_end {
                    self.cfg.add_edge(end, header);
                }
                Some(exit)
            }
            StmtKind::Switch { cases, default, .. } => {
                let branch = self.cfg.add_node(CfgNodeKind::Branch, Some(stmt.id), Some(stmt.span));
                self.connect(current, branch);
                let merge = self.cfg.add_node(CfgNodeKind::Merge, None, None);

                self.flow_stack.push(FlowCtx::Switch { exit: merge });
                for case in cases {
                    let end = self.lower_stmts(&case.body, Some(branch));
                    if let Some(end) = end {
                        self.cfg.add_edge(end, merge);
                    }
                }
                match default {
                    Some(stmts) => {
                        let end = self.lower_stmts(stmts, Some(branch));
                        if let Some(end) = end {
                            self.cfg.add_edge(end, merge);
                        }
                    }
                    None => {
                        // No default arm: the scrutinee may match nothing.
                        self.cfg.add_edge(branch, merge);
                    }
                }
                self.flow_stack.pop();
                Some(merge)
            }
        }
    }

    fn connect(&mut self, current: Option<CfgNodeId>, node: CfgNodeId) {
        if let Some(current) = current {
            self.cfg.add_edge(current, node);
        }
    }

    fn break_target(&self) -> Option<CfgNodeId> {
        self.flow_stack.iter().rev().map(|ctx| match ctx {
            FlowCtx::Loop { exit, .. } | FlowCtx::Switch { exit } => *exit,
        }).next()
    }

    fn continue_target(&self) -> Option<CfgNodeId> {
        self.flow_stack.iter().rev().find_map(|ctx| match ctx {
            FlowCtx::Loop { header, .. } => Some(*header),
            FlowCtx::Switch { .. } => None,
        })
    }
}

impl Analyzer {
    /// Build one CFG per function body and warn about unreachable
    /// statements.
    pub(crate) fn build_cfgs(&mut self, program: &Program) -> HashMap<String, ControlFlowGraph> {
        let mut cfgs = HashMap::new();
        for item in &program.items {
            let ItemKind::Function(func) = &item.kind else {
                continue;
            };
            let Some(body) = &func.body else {
                continue;
            };

            let cfg = CfgBuilder::new().build(body);
            self.warn_unreachable(&cfg);
            log::trace!("cfg for '{}': {} nodes", func.name.value, cfg.len());
            cfgs.insert(func.name.value.clone(), cfg);
        }
        cfgs
    }

    /// One warning per dead region: the head of a region is an unreachable
    /// statement node with no predecessors.
    fn warn_unreachable(&mut self, cfg: &ControlFlowGraph) {
        let reachable = cfg.reachable();
        for node in cfg.nodes() {
            if reachable[node.id] || node.stmt.is_none() {
                continue;
            }
            if node.preds.is_empty() {
                if let Some(span) = node.span {
                    self.diagnostics.warning(
                        DiagnosticCode::UnreachableCode,
                        "unreachable code",
                        span,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Analyzer, AnalyzerOptions};
    use sable_lexer::Lexer;
    use sable_parser::Parser;

    fn analyze(source: &str) -> (crate::analyzer::Analysis, sable_common::Diagnostics) {
        let tokens = Lexer::new(source, 0).tokenize();
        let mut parser = Parser::new(tokens);
        let mut program = parser.parse();
        assert!(!parser.diagnostics().has_errors(), "{:?}", parser.diagnostics());
        Analyzer::analyze(&mut program, AnalyzerOptions::default())
    }

    #[test]
    fn empty_function_entry_reaches_exit() {
        let (analysis, _) = analyze("module t; function f(): void { }");
        let cfg = &analysis.cfgs["f"];
        assert!(cfg.len() >= 2);
        let reachable = cfg.reachable();
        assert!(reachable[cfg.exit]);
        assert!(cfg.node(cfg.entry).preds.is_empty());
        assert!(cfg.node(cfg.exit).succs.is_empty());
    }

    #[test]
    fn return_statement_reaches_exit() {
        let (analysis, diagnostics) = analyze("module t; function f(): byte { return 1; }");
        assert!(!diagnostics.has_errors());
        let cfg = &analysis.cfgs["f"];
        assert!(cfg.reachable()[cfg.exit]);
    }

    #[test]
    fn code_after_return_warns_once() {
        let (_, diagnostics) =
            analyze("module t; function f(): void { return; let x: byte = 1; }");
        assert_eq!(
            diagnostics.with_code(DiagnosticCode::UnreachableCode).count(),
            1
        );
    }

    #[test]
    fn both_branches_returning_make_tail_unreachable() {
        let source = r#"
            module t;
            function g(x: byte): byte {
                if (x > 0) { return 1; } else { return 0; }
                let dead: byte = 0;
                return dead;
            }
        "#;
        let (_, diagnostics) = analyze(source);
        assert_eq!(
            diagnostics.with_code(DiagnosticCode::UnreachableCode).count(),
            1
        );
    }

    #[test]
    fn while_loop_has_back_edge_and_exit() {
        let source = r#"
            module t;
            function f(): void {
                let i: byte = 0;
                while (i < 10) {
                    i = i + 1;
                }
                poke($D020, i);
            }
        "#;
        let (analysis, diagnostics) = analyze(source);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics);
        let cfg = &analysis.cfgs["f"];
        let loop_node = cfg.nodes().find(|n| n.kind == CfgNodeKind::Loop).expect("loop header");
        // Two successors: body and loop exit.
        assert_eq!(loop_node.succs.len(), 2);
        // Some node inside the body edges back to the header.
        assert!(loop_node.preds.len() >= 2);
    }

    #[test]
    fn break_edges_to_loop_exit() {
        let source = r#"
            module t;
            function f(): void {
                while (true) {
                    break;
                }
            }
        "#;
        let (analysis, diagnostics) = analyze(source);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics);
        let cfg = &analysis.cfgs["f"];
        let break_node = cfg.nodes().find(|n| n.kind == CfgNodeKind::Break).expect("break node");
        assert!(break_node.kind.is_terminating());
        assert_eq!(break_node.succs.len(), 1);
        assert!(cfg.reachable()[cfg.exit]);
    }

    #[test]
    fn statements_after_break_warn() {
        let source = r#"
            module t;
            function f(): void {
                while (true) {
                    break;
                    poke($D020, 1);
                }
            }
        "#;
        let (_, diagnostics) = analyze(source);
        assert_eq!(
            diagnostics.with_code(DiagnosticCode::UnreachableCode).count(),
            1
        );
    }
}
