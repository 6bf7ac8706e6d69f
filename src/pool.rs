//! 固定大小的异步工作池。
//!
//! 每个路由监听器的分发循环把请求处理任务投递到这里，
//! 工作数量由配置中的 `max_worker_threads` 决定。

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::exception::Exception;

pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Clone)]
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    size: usize,
}

impl WorkerPool {
    /// 启动 `workers` 个工作任务，共享一个容量为 `capacity` 的任务队列。
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn new(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let handles = (0..workers)
            .map(|_| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        // 只在取任务期间持有锁
                        let job = receiver.lock().await.recv().await;
                        match job {
                            Some(job) => job.await,
                            None => break,
                        }
                    }
                })
            })
            .collect();

        Self {
            sender,
            handles: Arc::new(Mutex::new(handles)),
            size: workers,
        }
    }

    /// 投递任务，队列满时等待空位。
    pub async fn submit(&self, job: Job) -> Result<(), Exception> {
        self.sender
            .send(job)
            .await
            .map_err(|_| Exception::WorkerPoolClosed)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 终止所有工作任务，之后的 `submit` 返回 `WorkerPoolClosed`。
    pub fn shutdown(&self) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in handles.drain(..) {
            handle.abort();
        }
    }
}
