use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use crate::{LoadcuterError, RecordBatch};

/// 数据加载单元：先把外部数据读入自身缓冲区，再提交到共享的记录批次中。
///
/// 实现方持有自己的可变状态（内部可变性），调度器只持有 `Arc` 引用。
#[async_trait]
pub trait Loader: Send + Sync {
    fn name(&self) -> &str;

    /// 加载外部数据到内部缓冲区，可与同批次的其他 loader 并发执行。
    async fn start_load(
        &self,
        ctx: CancellationToken,
        records: &RecordBatch,
    ) -> Result<(), LoadcuterError>;

    /// 把缓冲数据写入记录批次，成功后 `is_ready` 应返回 true。
    async fn commit(
        &self,
        ctx: CancellationToken,
        records: &RecordBatch,
    ) -> Result<(), LoadcuterError>;

    fn is_ready(&self) -> bool;
}
