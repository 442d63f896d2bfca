use std::sync::atomic::{AtomicUsize, Ordering};
use crate::BoxLoader;

/// 图中的一个节点：包装一个 loader，记录序号、父节点数量和子节点下标。
pub struct TaskNode {
    pub(crate) seq: usize,
    pub(crate) loader: BoxLoader,
    pub(crate) parents: usize,
    pub(crate) children: Vec<usize>,
}

impl TaskNode {
    pub(crate) fn new(seq: usize, loader: BoxLoader) -> Self {
        Self {
            seq,
            loader,
            parents: 0,
            children: Vec::new(),
        }
    }

    pub fn seq(&self) -> usize {
        self.seq
    }

    pub fn name(&self) -> &str {
        self.loader.name()
    }

    pub fn loader(&self) -> &BoxLoader {
        &self.loader
    }

    pub fn parents(&self) -> usize {
        self.parents
    }

    /// 子节点在图中的下标（序号减一）
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub(crate) fn add_child(&mut self, child: usize) {
        self.children.push(child);
    }

    pub(crate) fn add_parent(&mut self) {
        self.parents += 1;
    }
}

/// 单次运行中某节点尚未完成的父节点数。
///
/// 为 0 即就绪；每个父节点完成时减一，只有最后一个父节点的递减会观察到 1 -> 0。
#[derive(Debug)]
pub struct Readiness {
    pending: AtomicUsize,
}

impl Readiness {
    pub fn new(parents: usize) -> Self {
        Self {
            pending: AtomicUsize::new(parents),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.pending.load(Ordering::Acquire) == 0
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// 记录一个父节点完成，返回本次递减是否使节点变为就绪。
    ///
    /// 已就绪时再调用不会下溢，返回 false。
    pub fn parent_completed(&self) -> bool {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|prev| prev == 1)
            .unwrap_or(false)
    }
}
