use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::guard::guarded;
use crate::node::{Readiness, TaskNode};
use crate::{BoxLoader, GraphConfig, LoadcuterError, RecordBatch, has_cycle};

enum NodeEvent {
    Completed(usize),
    Failed(usize, LoadcuterError),
}

/// 按依赖图调度 loader：父节点全部提交后子节点才会启动，整次运行受一个截止时间约束。
pub struct LoaderGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<usize, usize>,
    config: GraphConfig,
    execution_order: Vec<String>,
}

// 以 Arc 分配地址作为 loader 的身份
fn loader_key(loader: &BoxLoader) -> usize {
    Arc::as_ptr(loader) as *const () as usize
}

impl LoaderGraph {
    pub fn new(deadline_ms: u64) -> Self {
        Self::with_config(GraphConfig::with_deadline_ms(deadline_ms))
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            config,
            execution_order: Vec::new(),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 注册 loader，返回按注册顺序分配的序号（从 1 开始）
    pub fn add_loader(&mut self, loader: BoxLoader) -> Result<usize, LoadcuterError> {
        let key = loader_key(&loader);
        if self.index.contains_key(&key) {
            return Err(LoadcuterError::DuplicateLoader(loader.name().to_string()));
        }

        let seq = self.nodes.len() + 1;
        self.index.insert(key, self.nodes.len());
        self.nodes.push(TaskNode::new(seq, loader));
        Ok(seq)
    }

    /// 批量注册；任一 loader 重复时整批都不注册
    pub fn add_loaders<I>(&mut self, loaders: I) -> Result<(), LoadcuterError>
    where
        I: IntoIterator<Item = BoxLoader>,
    {
        let loaders: Vec<BoxLoader> = loaders.into_iter().collect();
        let mut seen = HashSet::new();
        for loader in &loaders {
            let key = loader_key(loader);
            if self.index.contains_key(&key) || !seen.insert(key) {
                return Err(LoadcuterError::DuplicateLoader(loader.name().to_string()));
            }
        }

        for loader in loaders {
            self.add_loader(loader)?;
        }
        Ok(())
    }

    /// 声明 `parent` 完成后才能运行 `children`。
    ///
    /// 所有端点都必须已注册，否则返回错误且图保持不变。只能在运行前调用。
    pub fn link(&mut self, parent: &BoxLoader, children: &[BoxLoader]) -> Result<(), LoadcuterError> {
        let parent_index = self.lookup(parent)?;
        let child_indexes = children
            .iter()
            .map(|child| self.lookup(child))
            .collect::<Result<Vec<_>, _>>()?;

        for child in child_indexes {
            self.nodes[parent_index].add_child(child);
            self.nodes[child].add_parent();
        }
        Ok(())
    }

    fn lookup(&self, loader: &BoxLoader) -> Result<usize, LoadcuterError> {
        self.index
            .get(&loader_key(loader))
            .copied()
            .ok_or_else(|| LoadcuterError::UnregisteredLoader(loader.name().to_string()))
    }

    pub fn node(&self, loader: &BoxLoader) -> Option<&TaskNode> {
        self.lookup(loader).ok().map(|index| &self.nodes[index])
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    /// 没有父节点、运行开始即就绪的 loader
    pub fn roots(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|node| node.parents() == 0)
            .map(|node| node.name().to_string())
            .collect()
    }

    pub fn has_cycle(&self) -> bool {
        has_cycle(&self.nodes)
    }

    /// 运行前的可选检查，`run` 不会调用
    pub fn validate(&self) -> Result<(), LoadcuterError> {
        if self.has_cycle() {
            return Err(LoadcuterError::CircularDependency);
        }
        Ok(())
    }

    /// 执行整张图。
    ///
    /// 返回 `Ok(())`、第一个失败 loader 的错误、`DeadlineExceeded` 或 `ContextCancelled`。
    /// 截止时间为 0 时非空图直接超时。
    /// 运行结束后仍在执行的 loader 不会被强制终止，它们的结果会被丢弃。
    pub async fn run(&mut self, ctx: CancellationToken, records: RecordBatch) -> Result<(), LoadcuterError> {
        let deadline = self.config.deadline;
        let timer = sleep(deadline);
        tokio::pin!(timer);

        self.execution_order.clear();

        let total = self.nodes.len();
        if total == 0 {
            return Ok(());
        }
        if deadline.is_zero() {
            warn!(nodes = total, "graph run has no time budget");
            return Err(LoadcuterError::DeadlineExceeded(deadline));
        }

        // 运行结束时取消，迟到的结果不再上报
        let run_ctx = ctx.child_token();
        let _run_guard = run_ctx.clone().drop_guard();

        let readiness: Vec<Readiness> = self
            .nodes
            .iter()
            .map(|node| Readiness::new(node.parents()))
            .collect();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<NodeEvent>();
        let mut remaining = total;

        info!(nodes = total, ?deadline, "graph run started");

        // 启动所有无父节点的任务
        for (index, ready) in readiness.iter().enumerate() {
            if ready.is_ready() {
                self.launch(index, &run_ctx, &records, &event_tx);
            }
        }

        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => match event {
                    NodeEvent::Completed(index) => {
                        self.execution_order.push(self.nodes[index].name().to_string());
                        let node = &self.nodes[index];

                        remaining -= 1;
                        if remaining == 0 {
                            info!(nodes = total, "graph run completed");
                            return Ok(());
                        }

                        for &child in node.children() {
                            if readiness[child].parent_completed() {
                                self.launch(child, &run_ctx, &records, &event_tx);
                            }
                        }
                    }
                    NodeEvent::Failed(index, err) => {
                        warn!(loader = self.nodes[index].name(), error = %err, "graph run failed");
                        return Err(err);
                    }
                },

                _ = &mut timer => {
                    warn!(?deadline, remaining, "graph run deadline exceeded");
                    return Err(LoadcuterError::DeadlineExceeded(deadline));
                }

                _ = ctx.cancelled() => {
                    return Err(LoadcuterError::ContextCancelled("graph run cancelled".to_string()));
                }
            }
        }
    }

    fn launch(
        &self,
        index: usize,
        run_ctx: &CancellationToken,
        records: &RecordBatch,
        event_tx: &mpsc::UnboundedSender<NodeEvent>,
    ) {
        let node = &self.nodes[index];
        let loader = node.loader().clone();
        let ctx = run_ctx.clone();
        let records = records.clone();
        let event_tx = event_tx.clone();
        let panic_policy = self.config.panic_policy;

        debug!(loader = loader.name(), seq = node.seq(), "launching loader");

        tokio::spawn(async move {
            let work = {
                let loader = loader.clone();
                let ctx = ctx.clone();
                async move {
                    loader.start_load(ctx.clone(), &records).await?;
                    loader.commit(ctx, &records).await
                }
            };

            let Some(result) = guarded(&ctx, work).await.resolve(loader.name(), panic_policy) else {
                return;
            };
            if ctx.is_cancelled() {
                debug!(loader = loader.name(), "run already resolved, dropping result");
                return;
            }

            let event = match result {
                Ok(()) => NodeEvent::Completed(index),
                Err(err) => NodeEvent::Failed(index, err),
            };
            // 接收端已关闭时忽略
            let _ = event_tx.send(event);
        });
    }

    /// 最近一次运行中各 loader 完成提交的顺序
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        for (index, node) in self.nodes.iter().enumerate() {
            if node.parents() == 0 {
                out.push_str(node.name());
                out.push('\n');
                self.render_chain(index, "  ", &mut out);
            }
        }
        out
    }

    fn render_chain(&self, index: usize, prefix: &str, out: &mut String) {
        for &child in self.nodes[index].children() {
            out.push_str(&format!("{}└─> {}\n", prefix, self.nodes[child].name()));
            self.render_chain(child, &format!("{}    ", prefix), out);
        }
    }
}
