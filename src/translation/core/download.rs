//! 模型下载
//!
//! 把"创建翻译器 + 进度回调"包装成可取消的异步流：先产出若干
//! `Progress(0..=100)`，最后恰好一个 `Ready` 或 `Failed`。

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::capability::{
    CapabilityError, DownloadMonitor, LanguagePair, TranslatorCapability, TranslatorHandle,
};

type CreateOutcome = Result<Rc<dyn TranslatorHandle>, CapabilityError>;

/// 下载事件
pub enum DownloadEvent {
    Progress(u8),
    Ready(Rc<dyn TranslatorHandle>),
    Failed(CapabilityError),
}

impl std::fmt::Debug for DownloadEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadEvent::Progress(p) => write!(f, "Progress({})", p),
            DownloadEvent::Ready(_) => write!(f, "Ready"),
            DownloadEvent::Failed(e) => write!(f, "Failed({})", e),
        }
    }
}

/// 进行中的模型下载
///
/// 必须在 `LocalSet` 中启动。丢弃或调用 `cancel()` 会中止下载任务。
pub struct ModelDownload {
    pair: LanguagePair,
    progress: mpsc::UnboundedReceiver<u8>,
    outcome: oneshot::Receiver<CreateOutcome>,
    task: JoinHandle<()>,
    last_percent: Option<u8>,
    finished: bool,
}

impl ModelDownload {
    pub fn start(capability: Rc<dyn TranslatorCapability>, pair: LanguagePair) -> Self {
        let (progress_tx, progress) = mpsc::unbounded_channel();
        let (outcome_tx, outcome) = oneshot::channel();

        let task_pair = pair.clone();
        let task = tokio::task::spawn_local(async move {
            let result = capability
                .create(&task_pair, Some(DownloadMonitor::new(progress_tx)))
                .await;
            let _ = outcome_tx.send(result);
        });

        tracing::debug!("开始下载翻译模型: {}", pair);

        Self {
            pair,
            progress,
            outcome,
            task,
            last_percent: None,
            finished: false,
        }
    }

    pub fn pair(&self) -> &LanguagePair {
        &self.pair
    }

    pub fn cancel(&mut self) {
        if !self.finished {
            tracing::debug!("取消模型下载: {}", self.pair);
        }
        self.task.abort();
        self.finished = true;
    }
}

impl Stream for ModelDownload {
    type Item = DownloadEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        // 进度先于终态
        while let Poll::Ready(Some(percent)) = this.progress.poll_recv(cx) {
            if this.last_percent == Some(percent) {
                continue;
            }
            this.last_percent = Some(percent);
            return Poll::Ready(Some(DownloadEvent::Progress(percent)));
        }

        match Pin::new(&mut this.outcome).poll(cx) {
            Poll::Ready(Ok(Ok(handle))) => {
                this.finished = true;
                Poll::Ready(Some(DownloadEvent::Ready(handle)))
            }
            Poll::Ready(Ok(Err(error))) => {
                this.finished = true;
                Poll::Ready(Some(DownloadEvent::Failed(error)))
            }
            Poll::Ready(Err(_)) => {
                this.finished = true;
                Poll::Ready(Some(DownloadEvent::Failed(CapabilityError::Failed(
                    "download task dropped".to_string(),
                ))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ModelDownload {
    fn drop(&mut self) {
        self.task.abort();
    }
}
