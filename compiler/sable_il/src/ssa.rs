//! SSA construction
//!
//! Dominator tree via the Cooper/Harvey/Kennedy iterative scheme,
//! dominance frontiers, phi placement on the iterated frontier of each
//! variable's definition blocks, then renaming along the dominator tree.
//!
//! Renaming rewires variable uses to the dominating version. Version
//! registers were drawn from the function's single monotonic allocator at
//! lowering time, never from per-variable counters, so register IDs stay
//! unique across the whole function.

use crate::il::{BlockId, Constant, Function, InstKind, Module, Value, VarId};
use hashbrown::{HashMap, HashSet};
use sable_common::{CompileError, CompileResult};

/// Immediate-dominator tree over one function's CFG.
#[derive(Debug)]
pub struct DominatorTree {
    /// Immediate dominator per block; `None` for unreachable blocks, the
    /// entry dominates itself.
    pub idom: Vec<Option<BlockId>>,
    pub children: Vec<Vec<BlockId>>,
    /// Reverse postorder of the reachable blocks.
    pub rpo: Vec<BlockId>,
    postorder_number: Vec<Option<usize>>,
}

impl DominatorTree {
    pub fn build(func: &Function) -> Self {
        let block_count = func.blocks.len();

        // Postorder DFS from the entry.
        let mut postorder = Vec::with_capacity(block_count);
        let mut visited = vec![false; block_count];
        let mut stack = vec![(func.entry, 0usize)];
        visited[func.entry as usize] = true;
        while let Some(&(block, next)) = stack.last() {
            let succs = &func.block(block).succs;
            if next < succs.len() {
                if let Some(frame) = stack.last_mut() {
                    frame.1 += 1;
                }
                let succ = succs[next];
                if !visited[succ as usize] {
                    visited[succ as usize] = true;
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(block);
                stack.pop();
            }
        }

        let mut postorder_number = vec![None; block_count];
        for (i, &block) in postorder.iter().enumerate() {
            postorder_number[block as usize] = Some(i);
        }
        let rpo: Vec<BlockId> = postorder.iter().rev().copied().collect();

        let mut idom: Vec<Option<BlockId>> = vec![None; block_count];
        idom[func.entry as usize] = Some(func.entry);

        let intersect = |idom: &[Option<BlockId>], mut a: BlockId, mut b: BlockId| -> BlockId {
            while a != b {
                let pa = postorder_number[a as usize].unwrap_or(0);
                let pb = postorder_number[b as usize].unwrap_or(0);
                if pa < pb {
                    a = idom[a as usize].unwrap_or(a);
                } else {
                    b = idom[b as usize].unwrap_or(b);
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &block in &rpo {
                if block == func.entry {
                    continue;
                }
                let preds = &func.block(block).preds;
                let mut new_idom: Option<BlockId> = None;
                for &pred in preds {
                    if idom[pred as usize].is_none() {
                        continue; // unreachable or not yet processed
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, pred, current),
                    });
                }
                if new_idom.is_some() && idom[block as usize] != new_idom {
                    idom[block as usize] = new_idom;
                    changed = true;
                }
            }
        }

        let mut children = vec![Vec::new(); block_count];
        for (block, &dominator) in idom.iter().enumerate() {
            if let Some(dominator) = dominator {
                let block = block as BlockId;
                if block != func.entry {
                    children[dominator as usize].push(block);
                }
            }
        }

        Self { idom, children, rpo, postorder_number }
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.postorder_number[block as usize].is_some()
    }

    /// Whether `a` dominates `b` (reflexively).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut runner = b;
        loop {
            if runner == a {
                return true;
            }
            match self.idom[runner as usize] {
                Some(parent) if parent != runner => runner = parent,
                _ => return false,
            }
        }
    }
}

/// Per-block dominance frontiers: the blocks where each block's dominance
/// stops.
pub fn dominance_frontiers(func: &Function, domtree: &DominatorTree) -> Vec<Vec<BlockId>> {
    let mut frontiers = vec![Vec::new(); func.blocks.len()];
    for block in &func.blocks {
        if block.preds.len() < 2 {
            continue;
        }
        let Some(block_idom) = domtree.idom[block.id as usize] else {
            continue;
        };
        for &pred in &block.preds {
            if domtree.idom[pred as usize].is_none() {
                continue;
            }
            let mut runner = pred;
            while runner != block_idom {
                if !frontiers[runner as usize].contains(&block.id) {
                    frontiers[runner as usize].push(block.id);
                }
                match domtree.idom[runner as usize] {
                    Some(parent) if parent != runner => runner = parent,
                    _ => break,
                }
            }
        }
    }
    frontiers
}

/// The least fixed point of DF over a starting set of blocks.
pub fn iterated_frontier(frontiers: &[Vec<BlockId>], start: &[BlockId]) -> Vec<BlockId> {
    let mut result: HashSet<BlockId> = HashSet::new();
    let mut worklist: Vec<BlockId> = start.to_vec();
    while let Some(block) = worklist.pop() {
        for &frontier_block in &frontiers[block as usize] {
            if result.insert(frontier_block) {
                worklist.push(frontier_block);
            }
        }
    }
    let mut sorted: Vec<BlockId> = result.into_iter().collect();
    sorted.sort_unstable();
    sorted
}

/// Run SSA construction over every function with a body.
pub fn run_ssa(module: &mut Module) -> CompileResult<()> {
    for func in &mut module.functions {
        if func.is_stub {
            continue;
        }
        construct_ssa(func)?;
    }
    Ok(())
}

/// Dominators → frontiers → phi placement → renaming → verification.
pub fn construct_ssa(func: &mut Function) -> CompileResult<()> {
    let domtree = DominatorTree::build(func);
    let frontiers = dominance_frontiers(func, &domtree);

    // The lowerer's variable bookkeeping is consumed here.
    let mut locals = std::mem::take(&mut func.locals);

    // Parameters count as definitions at the entry block.
    for &(var, _) in &locals.params {
        let blocks = locals.def_blocks.entry(var).or_default();
        if !blocks.contains(&func.entry) {
            blocks.push(func.entry);
        }
    }

    // Phi placement: one phi per variable at every block of the iterated
    // dominance frontier of its definition blocks.
    let vars: Vec<VarId> = (0..locals.slots.len() as VarId).collect();
    for var in vars {
        let Some(def_blocks) = locals.def_blocks.get(&var) else {
            continue;
        };
        let targets = iterated_frontier(&frontiers, def_blocks);
        for target in targets {
            if !domtree.is_reachable(target) {
                continue;
            }
            let (ref name, ref ty) = locals.slots[var as usize];
            let span = func
                .block(target)
                .instructions
                .first()
                .map(|i| i.span)
                .unwrap_or_else(|| {
                    sable_common::Span::point(sable_common::Position::origin(), 0)
                });
            let name = name.clone();
            let result = func.alloc_register(ty.clone(), Some(&name));
            let inst = func.insert_phi(target, result, span);
            locals.def_insts.insert(inst, var);
        }
    }

    // Renaming: DFS over the dominator tree with per-variable version
    // stacks seeded by the parameter registers.
    let mut stacks: HashMap<VarId, Vec<u32>> = HashMap::new();
    for &(var, register) in &locals.params {
        stacks.entry(var).or_default().push(register);
    }
    let entry = func.entry;
    rename_block(func, &domtree, &locals, entry, &mut stacks);

    // Any phi source slot still missing (an unreachable predecessor, or a
    // path with no definition) falls back to a typed zero.
    fixup_phi_sources(func, &locals);

    verify_ssa(func).map_err(CompileError::validation)?;
    log::trace!("ssa for '{}' verified", func.name);
    Ok(())
}

fn zero_value(locals: &crate::il::LocalVars, var: VarId) -> Value {
    Value::Imm(Constant::zero(locals.slots[var as usize].1.clone()))
}

fn rename_block(
    func: &mut Function,
    domtree: &DominatorTree,
    locals: &crate::il::LocalVars,
    block: BlockId,
    stacks: &mut HashMap<VarId, Vec<u32>>,
) {
    let mut pushed: Vec<VarId> = Vec::new();

    // Rewire uses and push new versions, phis first.
    for inst in &mut func.blocks[block as usize].instructions {
        if !inst.kind.is_phi() {
            if let Some(uses) = locals.use_sites.get(&inst.id) {
                let mut operands = inst.operands_mut();
                for &(operand_index, var) in uses {
                    let value = match stacks.get(&var).and_then(|s| s.last()) {
                        Some(&reg) => Value::Reg(reg),
                        None => zero_value(locals, var),
                    };
                    if let Some(slot) = operands.get_mut(operand_index) {
                        **slot = value;
                    }
                }
            }
        }
        if let Some(&var) = locals.def_insts.get(&inst.id) {
            if let Some(result) = inst.result {
                stacks.entry(var).or_default().push(result);
                pushed.push(var);
            }
        }
    }

    // Fill phi sources in every successor with the versions live at the
    // end of this block.
    let succs = func.blocks[block as usize].succs.clone();
    for succ in succs {
        let phi_vars: Vec<(u32, Option<VarId>)> = func.blocks[succ as usize]
            .instructions
            .iter()
            .take_while(|i| i.kind.is_phi())
            .map(|i| (i.id, locals.def_insts.get(&i.id).copied()))
            .collect();
        for (inst_id, var) in phi_vars {
            let Some(var) = var else { continue };
            let value = match stacks.get(&var).and_then(|s| s.last()) {
                Some(&reg) => Value::Reg(reg),
                None => zero_value(locals, var),
            };
            for inst in &mut func.blocks[succ as usize].instructions {
                if inst.id == inst_id {
                    if let InstKind::Phi { sources } = &mut inst.kind {
                        sources.push((value, block));
                    }
                    break;
                }
            }
        }
    }

    for child in domtree.children[block as usize].clone() {
        rename_block(func, domtree, locals, child, stacks);
    }

    for var in pushed {
        if let Some(stack) = stacks.get_mut(&var) {
            stack.pop();
        }
    }
}

/// Give every phi exactly one source per predecessor, in predecessor
/// order.
fn fixup_phi_sources(func: &mut Function, locals: &crate::il::LocalVars) {
    for block_index in 0..func.blocks.len() {
        let preds = func.blocks[block_index].preds.clone();
        let phi_ids: Vec<u32> = func.blocks[block_index]
            .instructions
            .iter()
            .take_while(|i| i.kind.is_phi())
            .map(|i| i.id)
            .collect();
        for phi_id in phi_ids {
            let var = locals.def_insts.get(&phi_id).copied();
            let fallback = var
                .map(|v| zero_value(locals, v))
                .unwrap_or(Value::Imm(Constant::byte(0)));
            for inst in &mut func.blocks[block_index].instructions {
                if inst.id != phi_id {
                    continue;
                }
                if let InstKind::Phi { sources } = &mut inst.kind {
                    let mut ordered = Vec::with_capacity(preds.len());
                    for &pred in &preds {
                        match sources.iter().find(|(_, p)| *p == pred) {
                            Some(entry) => ordered.push(entry.clone()),
                            None => ordered.push((fallback.clone(), pred)),
                        }
                    }
                    *sources = ordered;
                }
                break;
            }
        }
    }
}

/// SSA invariants: unique definitions, phi arity, phi placement.
pub fn verify_ssa(func: &Function) -> Result<(), String> {
    let mut defined: HashMap<u32, u32> = HashMap::new();
    for param in &func.params {
        defined.insert(param.register, u32::MAX);
    }
    for block in &func.blocks {
        for inst in &block.instructions {
            if let Some(result) = inst.result {
                if let Some(&previous) = defined.get(&result) {
                    return Err(format!(
                        "register r{} defined twice in '{}' (instructions {} and {})",
                        result, func.name, previous, inst.id
                    ));
                }
                defined.insert(result, inst.id);
            }
        }
    }

    for block in &func.blocks {
        let phi_count = block.phi_count();
        for (index, inst) in block.instructions.iter().enumerate() {
            if inst.kind.is_phi() && index >= phi_count {
                return Err(format!(
                    "phi after non-phi in block {} of '{}'",
                    block.id, func.name
                ));
            }
            if let InstKind::Phi { sources } = &inst.kind {
                if sources.len() != block.preds.len() {
                    return Err(format!(
                        "phi {} in block {} of '{}' has {} sources for {} predecessors",
                        inst.id,
                        block.id,
                        func.name,
                        sources.len(),
                        block.preds.len()
                    ));
                }
            }
        }
    }
    Ok(())
}
