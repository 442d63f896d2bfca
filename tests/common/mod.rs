#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use loadcuter::{BoxLoader, LoadcuterError, Loader, RecordBatch};
use tokio_util::sync::CancellationToken;

pub const RUN_ERR: &str = "run err";

/// 记录各 loader 的事件顺序，例如 `start:WaitLoader:5`、`commit:WaitLoader:5`
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn contains(&self, event: &str) -> bool {
        self.position(event).is_some()
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Wait(u64),
    Fail,
    Abort,
    Panic,
}

pub struct WaitLoader {
    name: String,
    behavior: Behavior,
    commit_delay: Duration,
    ready: AtomicBool,
    commits: AtomicUsize,
    journal: Journal,
}

impl WaitLoader {
    fn build(name: String, behavior: Behavior, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior,
            commit_delay: Duration::ZERO,
            ready: AtomicBool::new(false),
            commits: AtomicUsize::new(0),
            journal: journal.clone(),
        })
    }

    pub fn new(wait_ms: u64, journal: &Journal) -> Arc<Self> {
        Self::build(format!("WaitLoader:{}", wait_ms), Behavior::Wait(wait_ms), journal)
    }

    pub fn with_commit_delay(wait_ms: u64, commit_ms: u64, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name: format!("WaitLoader:{}+{}", wait_ms, commit_ms),
            behavior: Behavior::Wait(wait_ms),
            commit_delay: Duration::from_millis(commit_ms),
            ready: AtomicBool::new(false),
            commits: AtomicUsize::new(0),
            journal: journal.clone(),
        })
    }

    pub fn failing(name: &str, journal: &Journal) -> Arc<Self> {
        Self::build(name.to_string(), Behavior::Fail, journal)
    }

    pub fn aborting(name: &str, journal: &Journal) -> Arc<Self> {
        Self::build(name.to_string(), Behavior::Abort, journal)
    }

    pub fn panicking(name: &str, journal: &Journal) -> Arc<Self> {
        Self::build(name.to_string(), Behavior::Panic, journal)
    }

    pub fn name_str(&self) -> &str {
        &self.name
    }

    pub fn is_ready_flag(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Loader for WaitLoader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_load(&self, ctx: CancellationToken, _records: &RecordBatch) -> Result<(), LoadcuterError> {
        self.journal.push(format!("start:{}", self.name));
        match self.behavior {
            Behavior::Wait(ms) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                        self.journal.push(format!("loaded:{}", self.name));
                        Ok(())
                    }
                    _ = ctx.cancelled() => {
                        self.journal.push(format!("cancelled:{}", self.name));
                        Err(LoadcuterError::ContextCancelled(self.name.clone()))
                    }
                }
            }
            Behavior::Fail => Err(LoadcuterError::Load(RUN_ERR.to_string())),
            Behavior::Abort => Err(LoadcuterError::Aborted(self.name.clone())),
            Behavior::Panic => panic!("{} blew up", self.name),
        }
    }

    async fn commit(&self, _ctx: CancellationToken, records: &RecordBatch) -> Result<(), LoadcuterError> {
        self.journal.push(format!("commit:{}", self.name));
        if !self.commit_delay.is_zero() {
            tokio::time::sleep(self.commit_delay).await;
        }
        for item in records.iter() {
            item.write()
                .await
                .insert(self.name.clone(), serde_json::Value::Bool(true));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);
        self.journal.push(format!("committed:{}", self.name));
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

pub fn boxed(loader: &Arc<WaitLoader>) -> BoxLoader {
    loader.clone()
}

pub fn records(n: usize) -> RecordBatch {
    RecordBatch::new((0..n).map(|_| loadcuter::Item::new()).collect())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
