//! 全局任务队列
//!
//! 所有会写 DOM 的操作依次排队，同一时刻只有一个在执行。入队是同步的，
//! 因此调用顺序就是执行顺序。

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::translation::error::{TranslationError, TranslationResult};

struct Job {
    label: &'static str,
    run: LocalBoxFuture<'static, ()>,
}

/// 单工作者任务队列
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Job>,
    pending: Rc<Cell<usize>>,
    worker: JoinHandle<()>,
}

impl TaskQueue {
    /// 启动工作者，必须在 `LocalSet` 内调用
    pub fn start() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let pending = Rc::new(Cell::new(0usize));

        let counter = pending.clone();
        let worker = tokio::task::spawn_local(async move {
            while let Some(job) = receiver.recv().await {
                tracing::debug!("执行队列任务: {}", job.label);
                job.run.await;
                counter.set(counter.get().saturating_sub(1));
            }
            tracing::debug!("任务队列已停止");
        });

        Self {
            sender,
            pending,
            worker,
        }
    }

    /// 入队并返回结果的 future；丢弃返回值不会取消任务
    pub fn enqueue<F, T>(
        &self,
        label: &'static str,
        task: F,
    ) -> impl Future<Output = TranslationResult<T>> + 'static
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let (reply, result) = oneshot::channel();
        let run = async move {
            // 调用方不再等待时丢弃结果
            let _ = reply.send(task.await);
        }
        .boxed_local();

        if self.sender.send(Job { label, run }).is_ok() {
            self.pending.set(self.pending.get() + 1);
        } else {
            tracing::warn!("任务队列已关闭，丢弃任务: {}", label);
        }

        async move { result.await.map_err(|_| TranslationError::QueueClosed) }
    }

    /// 排队中和执行中的任务数
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed() || self.worker.is_finished()
    }

    /// 停止工作者，未执行的任务全部丢弃
    pub fn close(&self) {
        self.worker.abort();
        self.pending.set(0);
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
