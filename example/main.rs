use loadcuter::*;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// 示例 loader：等待指定毫秒后把自己的名字写入每条记录
struct WaitLoader {
    name: String,
    wait: Duration,
    ready: AtomicBool,
}

impl WaitLoader {
    fn new(wait_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            name: format!("WaitLoader:{}", wait_ms),
            wait: Duration::from_millis(wait_ms),
            ready: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Loader for WaitLoader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_load(&self, ctx: CancellationToken, _records: &RecordBatch) -> Result<(), LoadcuterError> {
        tokio::select! {
            _ = tokio::time::sleep(self.wait) => Ok(()),
            _ = ctx.cancelled() => Err(LoadcuterError::ContextCancelled(self.name.clone())),
        }
    }

    async fn commit(&self, _ctx: CancellationToken, records: &RecordBatch) -> Result<(), LoadcuterError> {
        for item in records.iter() {
            item.write()
                .await
                .insert(self.name.clone(), serde_json::json!(self.wait.as_millis() as u64));
        }
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

fn graph_config() -> Result<GraphConfig, Box<dyn std::error::Error>> {
    match std::env::var("LOADCUTER_CONFIG") {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(_) => Ok(GraphConfig::with_deadline_ms(100)),
    }
}

/*
        5
      /   \
     20   40
    /       \
   30       10
*/
async fn step_flow() -> Result<(), Box<dyn std::error::Error>> {
    let loaders = [5, 10, 20, 30, 40].map(WaitLoader::new);
    let [l5, l10, l20, l30, l40]: [BoxLoader; 5] = loaders.map(|l| l as BoxLoader);

    let mut graph = LoaderGraph::with_config(graph_config()?);
    graph.add_loaders([l5.clone(), l10.clone(), l20.clone(), l30.clone(), l40.clone()])?;
    graph.link(&l5, &[l20.clone(), l40.clone()])?;
    graph.link(&l20, &[l30.clone()])?;
    graph.link(&l40, &[l10.clone()])?;
    graph.validate()?;

    println!("=== 依赖图 ===");
    print!("{}", graph.render_tree());

    let records = RecordBatch::new(vec![Item::new(), Item::new()]);
    let start = Instant::now();
    let result = graph.run(CancellationToken::new(), records.clone()).await;
    println!("flow 耗时: {:?}, 结果: {:?}", start.elapsed(), result);
    println!("提交顺序: {:?}", graph.execution_order());
    println!("记录: {:?}", records.snapshot().await);
    Ok(())
}

async fn step_parallel() -> Result<(), Box<dyn std::error::Error>> {
    let timeout = Duration::from_millis(500);
    let mut stage0 = Stage::new(timeout, Vec::new());
    stage0.append(WaitLoader::new(5));
    let mut stage1 = Stage::new(timeout, Vec::new());
    stage1.append(WaitLoader::new(20)).append(WaitLoader::new(40));
    let mut stage2 = Stage::new(timeout, Vec::new());
    stage2.append(WaitLoader::new(30)).append(WaitLoader::new(10));

    let records = RecordBatch::new(vec![Item::new()]);
    let start = Instant::now();
    let result = run_stages(CancellationToken::new(), records.clone(), vec![stage0, stage1, stage2]).await;
    println!("parallel 耗时: {:?}, 结果: {:?}", start.elapsed(), result);
    println!("记录: {:?}", records.snapshot().await);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    step_flow().await?;
    step_parallel().await?;
    Ok(())
}
