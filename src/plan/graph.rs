//! 计划依赖图
//!
//! 邻接表：步骤 id -> 依赖列表。validate_dag 依次检查重复 id、未定义依赖与环；
//! 环检测用 DFS + 「在栈上」标记，遇到栈上节点即为环，出栈后的节点标记为已完成不再重访。

use std::collections::{HashMap, HashSet};

use crate::core::PlanError;
use crate::plan::{Step, StepId};

/// 完整校验：重复 id、未定义依赖、环
pub fn validate_dag(plan: &[Step]) -> Result<(), PlanError> {
    check_duplicates(plan)?;
    if let Some((step, missing)) = missing_dependencies(plan).into_iter().next() {
        return Err(PlanError::MissingDependency { step, missing });
    }
    check_cycles(plan)
}

/// 只检查重复 id 与环（未定义依赖交给调度器以 Unreachable 处理）
pub fn validate_structure(plan: &[Step]) -> Result<(), PlanError> {
    check_duplicates(plan)?;
    check_cycles(plan)
}

fn check_duplicates(plan: &[Step]) -> Result<(), PlanError> {
    let mut seen = HashSet::new();
    for step in plan {
        if !seen.insert(step.id.as_str()) {
            return Err(PlanError::DuplicateStep(step.id.clone()));
        }
    }
    Ok(())
}

/// 每个引用了未定义 id 的步骤及其缺失依赖（按计划顺序）
pub fn missing_dependencies(plan: &[Step]) -> Vec<(StepId, Vec<StepId>)> {
    let ids: HashSet<&str> = plan.iter().map(|s| s.id.as_str()).collect();
    plan.iter()
        .filter_map(|step| {
            let mut missing: Vec<StepId> = Vec::new();
            for dep in &step.dependencies {
                if !ids.contains(dep.as_str()) && !missing.contains(dep) {
                    missing.push(dep.clone());
                }
            }
            (!missing.is_empty()).then(|| (step.id.clone(), missing))
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

fn check_cycles(plan: &[Step]) -> Result<(), PlanError> {
    let adjacency: HashMap<&str, &[StepId]> = plan
        .iter()
        .map(|s| (s.id.as_str(), s.dependencies.as_slice()))
        .collect();
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();

    for step in plan {
        if marks.contains_key(step.id.as_str()) {
            continue;
        }
        if let Some(ids) = visit(step.id.as_str(), &adjacency, &mut marks, &mut stack) {
            tracing::error!(cycle = ?ids, "Plan contains cycles - not a valid DAG");
            return Err(PlanError::Cycle { ids });
        }
    }
    Ok(())
}

/// 返回 Some(环上的 id，按遍历顺序)
fn visit<'a>(
    id: &'a str,
    adjacency: &HashMap<&'a str, &'a [StepId]>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<StepId>> {
    match marks.get(id) {
        Some(Mark::Done) => return None,
        Some(Mark::OnStack) => {
            let pos = stack.iter().position(|s| *s == id).unwrap_or(0);
            return Some(stack[pos..].iter().map(|s| s.to_string()).collect());
        }
        None => {}
    }

    marks.insert(id, Mark::OnStack);
    stack.push(id);
    // 未定义的依赖没有邻接项，当作叶子
    let deps = adjacency.get(id).copied().unwrap_or(&[]);
    for dep in deps {
        if let Some(cycle) = visit(dep.as_str(), adjacency, marks, stack) {
            return Some(cycle);
        }
    }
    stack.pop();
    marks.insert(id, Mark::Done);
    None
}

/// 调度视图：计划顺序 + 每个步骤的依赖集合
pub struct PlanGraph {
    order: Vec<StepId>,
    dependencies: HashMap<StepId, HashSet<StepId>>,
}

impl PlanGraph {
    pub fn new(plan: &[Step]) -> Self {
        Self {
            order: plan.iter().map(|s| s.id.clone()).collect(),
            dependencies: plan
                .iter()
                .map(|s| (s.id.clone(), s.dependencies.iter().cloned().collect()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 未完成且依赖全部完成的步骤（按计划顺序）
    pub fn ready_steps(&self, completed: &HashSet<StepId>) -> Vec<StepId> {
        self.order
            .iter()
            .filter(|id| !completed.contains(*id))
            .filter(|id| {
                self.dependencies
                    .get(*id)
                    .map(|deps| deps.is_subset(completed))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// 尚未完成的步骤（按计划顺序）
    pub fn remaining(&self, completed: &HashSet<StepId>) -> Vec<StepId> {
        self.order
            .iter()
            .filter(|id| !completed.contains(*id))
            .cloned()
            .collect()
    }

    pub fn dependencies_of(&self, id: &str) -> Option<&HashSet<StepId>> {
        self.dependencies.get(id)
    }
}
