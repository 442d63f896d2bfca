use std::time::Duration;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::guard::{guarded, to_completion};
use crate::{BoxLoader, LoadcuterError, PanicPolicy, RecordBatch, StageConfig, StageErrorPolicy};

/// 同一批次并发执行的 loader，每个 loader 的加载单独计时
pub struct Stage {
    loaders: Vec<BoxLoader>,
    timeout: Duration,
}

impl Stage {
    pub fn new(timeout: Duration, loaders: Vec<BoxLoader>) -> Self {
        Self { loaders, timeout }
    }

    pub fn append(&mut self, loader: BoxLoader) -> &mut Self {
        self.loaders.push(loader);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn loaders(&self) -> &[BoxLoader] {
        &self.loaders
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

#[derive(Debug)]
enum LoadOutcome {
    Loaded,
    Failed(LoadcuterError),
    TimedOut,
    /// 被取消，或 panic 按策略被吞掉
    Skipped,
}

/// 按顺序执行各阶段：阶段内并发加载，加载全部结束后串行提交，再进入下一阶段。
pub struct StageRunner {
    stages: Vec<Stage>,
    config: StageConfig,
}

impl StageRunner {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self::with_config(stages, StageConfig::default())
    }

    pub fn with_config(stages: Vec<Stage>, config: StageConfig) -> Self {
        Self { stages, config }
    }

    pub fn push(&mut self, stage: Stage) -> &mut Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub async fn run(&self, ctx: CancellationToken, records: RecordBatch) -> Result<(), LoadcuterError> {
        info!(stages = self.stages.len(), "stage run started");

        for (number, stage) in self.stages.iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(LoadcuterError::ContextCancelled(format!(
                    "stage run cancelled before stage {}",
                    number
                )));
            }
            self.run_stage(number, stage, &ctx, &records).await?;
        }

        info!(stages = self.stages.len(), "stage run completed");
        Ok(())
    }

    async fn run_stage(
        &self,
        number: usize,
        stage: &Stage,
        ctx: &CancellationToken,
        records: &RecordBatch,
    ) -> Result<(), LoadcuterError> {
        let panic_policy = self.config.panic_policy;
        let mut first_error = None;
        let mut loaded = vec![false; stage.len()];

        // 并发加载同一批次的 loader
        let mut pending: FuturesUnordered<_> = stage
            .loaders
            .iter()
            .enumerate()
            .map(|(index, loader)| {
                let attempt = load_with_timeout(
                    ctx,
                    loader.clone(),
                    stage.timeout,
                    records.clone(),
                    panic_policy,
                );
                async move { (index, attempt.await) }
            })
            .collect();

        while let Some((index, outcome)) = pending.next().await {
            let name = stage.loaders[index].name();
            match outcome {
                LoadOutcome::Loaded => loaded[index] = true,
                LoadOutcome::TimedOut => {
                    warn!(stage = number, loader = name, timeout = ?stage.timeout, "loader timed out, commit skipped");
                }
                LoadOutcome::Failed(err) => self.record_error(number, name, err, &mut first_error),
                LoadOutcome::Skipped => {
                    debug!(stage = number, loader = name, "loader produced no result");
                }
            }
        }
        drop(pending);

        // 串行回写数据，避免并发写同一批记录；已开始的提交总是等到结束
        for (index, loader) in stage.loaders.iter().enumerate() {
            if !loaded[index] {
                continue;
            }
            if ctx.is_cancelled() {
                debug!(stage = number, loader = loader.name(), "run cancelled, remaining commits skipped");
                break;
            }

            let work = {
                let loader = loader.clone();
                let ctx = ctx.clone();
                let records = records.clone();
                async move { loader.commit(ctx, &records).await }
            };
            match to_completion(work).await.resolve(loader.name(), panic_policy) {
                Some(Ok(())) => debug!(stage = number, loader = loader.name(), "loader committed"),
                Some(Err(err)) => self.record_error(number, loader.name(), err, &mut first_error),
                None => {}
            }
        }

        if let Some(err) = first_error {
            warn!(stage = number, error = %err, "stage failed");
            return Err(err);
        }
        if ctx.is_cancelled() {
            return Err(LoadcuterError::ContextCancelled(format!(
                "stage run cancelled during stage {}",
                number
            )));
        }
        Ok(())
    }

    fn record_error(
        &self,
        number: usize,
        loader: &str,
        err: LoadcuterError,
        first_error: &mut Option<LoadcuterError>,
    ) {
        let terminal = match self.config.error_policy {
            StageErrorPolicy::Propagate => true,
            StageErrorPolicy::Absorb => matches!(err, LoadcuterError::Aborted(_)),
        };

        if terminal && first_error.is_none() {
            *first_error = Some(err);
        } else {
            warn!(stage = number, loader, error = %err, "loader error absorbed");
        }
    }
}

/// 依次执行 `stages`
pub async fn run_stages(
    ctx: CancellationToken,
    records: RecordBatch,
    stages: Vec<Stage>,
) -> Result<(), LoadcuterError> {
    StageRunner::new(stages).run(ctx, records).await
}

// 超时后取消该 loader 的 token 并放弃等待，loader 本身在后台继续运行
async fn load_with_timeout(
    ctx: &CancellationToken,
    loader: BoxLoader,
    timeout: Duration,
    records: RecordBatch,
    panic_policy: PanicPolicy,
) -> LoadOutcome {
    let load_ctx = ctx.child_token();
    let work = {
        let loader = loader.clone();
        let load_ctx = load_ctx.clone();
        async move { loader.start_load(load_ctx, &records).await }
    };

    match tokio::time::timeout(timeout, guarded(&load_ctx, work)).await {
        Ok(attempt) => match attempt.resolve(loader.name(), panic_policy) {
            Some(Ok(())) => LoadOutcome::Loaded,
            Some(Err(err)) => LoadOutcome::Failed(err),
            None => LoadOutcome::Skipped,
        },
        Err(_) => {
            load_ctx.cancel();
            LoadOutcome::TimedOut
        }
    }
}
