use pipecore::BuildError;
use std::collections::{HashMap, VecDeque};

/// Orders `nodes` so every edge source precedes its target (Kahn's
/// algorithm). Ties keep the input order, so the result is deterministic.
///
/// Edges naming unknown nodes are ignored; callers validate endpoints first.
pub fn topological_order<'a>(
    nodes: &[&'a str],
    edges: &[(&'a str, &'a str)],
) -> Result<Vec<&'a str>, BuildError> {
    let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut in_degree = vec![0usize; nodes.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

    for (source, target) in edges {
        if let (Some(&s), Some(&t)) = (index.get(source), index.get(target)) {
            successors[s].push(t);
            in_degree[t] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &next in &successors[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() < nodes.len() {
        let nodes = (0..nodes.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| nodes[i].to_string())
            .collect();
        return Err(BuildError::CycleDetected { nodes });
    }

    Ok(order.into_iter().map(|i| nodes[i]).collect())
}
