use std::collections::HashSet;
use crate::node::TaskNode;

/// 沿父 -> 子边做 DFS，存在环则返回 true。调度器本身不会调用。
pub fn has_cycle(nodes: &[TaskNode]) -> bool {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();

    fn dfs(
        index: usize,
        nodes: &[TaskNode],
        visited: &mut HashSet<usize>,
        rec_stack: &mut HashSet<usize>,
    ) -> bool {
        if rec_stack.contains(&index) {
            return true; // 回到了当前路径上的节点
        }
        if visited.contains(&index) {
            return false;
        }

        visited.insert(index);
        rec_stack.insert(index);

        if let Some(node) = nodes.get(index) {
            for &child in node.children() {
                if dfs(child, nodes, visited, rec_stack) {
                    return true;
                }
            }
        }

        rec_stack.remove(&index);
        false
    }

    (0..nodes.len()).any(|index| {
        !visited.contains(&index) && dfs(index, nodes, &mut visited, &mut rec_stack)
    })
}
