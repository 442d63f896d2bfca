use std::any::Any;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::error;
use crate::{LoadcuterError, PanicPolicy};

/// loader 一次执行的结果
#[derive(Debug)]
pub(crate) enum Attempt {
    Done,
    Failed(LoadcuterError),
    Panicked(String),
    /// 所属运行已结束或被取消，结果不再上报
    Cancelled,
}

impl Attempt {
    /// 按 panic 策略折算为可上报的结果；`None` 表示什么都不上报
    pub(crate) fn resolve(
        self,
        loader: &str,
        policy: PanicPolicy,
    ) -> Option<Result<(), LoadcuterError>> {
        match self {
            Attempt::Done => Some(Ok(())),
            Attempt::Failed(err) => Some(Err(err)),
            Attempt::Panicked(message) => match policy {
                PanicPolicy::Fail => Some(Err(LoadcuterError::LoaderPanicked {
                    loader: loader.to_string(),
                    message,
                })),
                PanicPolicy::Swallow => {
                    error!(loader, %message, "loader panicked, result dropped");
                    None
                }
            },
            Attempt::Cancelled => None,
        }
    }
}

/// 在独立任务中执行 `work`，并与 `ctx` 的取消竞争。
///
/// 取消时不会中止该任务，它在后台继续运行直到 loader 自己观察到取消。
pub(crate) async fn guarded<F>(ctx: &CancellationToken, work: F) -> Attempt
where
    F: Future<Output = Result<(), LoadcuterError>> + Send + 'static,
{
    let handle = tokio::spawn(work);

    tokio::select! {
        joined = handle => match joined {
            Ok(Ok(())) => Attempt::Done,
            Ok(Err(err)) => Attempt::Failed(err),
            Err(err) if err.is_panic() => Attempt::Panicked(panic_message(err.into_panic())),
            Err(err) => Attempt::Failed(LoadcuterError::ContextCancelled(err.to_string())),
        },
        _ = ctx.cancelled() => Attempt::Cancelled,
    }
}

/// 在独立任务中执行 `work` 并等待其结束，只捕获 panic，不与取消竞争。
pub(crate) async fn to_completion<F>(work: F) -> Attempt
where
    F: Future<Output = Result<(), LoadcuterError>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(Ok(())) => Attempt::Done,
        Ok(Err(err)) => Attempt::Failed(err),
        Err(err) if err.is_panic() => Attempt::Panicked(panic_message(err.into_panic())),
        Err(err) => Attempt::Failed(LoadcuterError::ContextCancelled(err.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn reports_success_and_errors() {
        let ctx = CancellationToken::new();
        assert!(matches!(guarded(&ctx, async { Ok::<(), LoadcuterError>(()) }).await, Attempt::Done));

        let attempt = guarded(&ctx, async { Err(LoadcuterError::Load("boom".into())) }).await;
        assert!(matches!(attempt, Attempt::Failed(LoadcuterError::Load(ref m)) if m == "boom"));
    }

    #[tokio::test]
    async fn captures_panic_message() {
        let ctx = CancellationToken::new();
        let attempt = guarded(&ctx, async {
            if true {
                panic!("loader exploded");
            }
            Ok::<(), LoadcuterError>(())
        })
        .await;

        match attempt {
            Attempt::Panicked(message) => assert_eq!(message, "loader exploded"),
            other => panic!("unexpected attempt: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_slow_work() {
        let ctx = CancellationToken::new();
        let cancel = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel.cancel();
        });

        let attempt = guarded(&ctx, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<(), LoadcuterError>(())
        })
        .await;
        assert!(matches!(attempt, Attempt::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn to_completion_ignores_cancellation() {
        let attempt = to_completion(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<(), LoadcuterError>(())
        })
        .await;
        assert!(matches!(attempt, Attempt::Done));

        let attempt = to_completion(async {
            if true {
                panic!("commit exploded");
            }
            Ok::<(), LoadcuterError>(())
        })
        .await;
        assert!(matches!(attempt, Attempt::Panicked(ref m) if m == "commit exploded"));
    }

    #[test]
    fn panic_policy_decides_reporting() {
        let failed = Attempt::Panicked("x".into()).resolve("a", PanicPolicy::Fail);
        assert!(matches!(
            failed,
            Some(Err(LoadcuterError::LoaderPanicked { ref loader, .. })) if loader == "a"
        ));
        assert!(Attempt::Panicked("x".into()).resolve("a", PanicPolicy::Swallow).is_none());
        assert!(Attempt::Cancelled.resolve("a", PanicPolicy::Fail).is_none());
    }
}
