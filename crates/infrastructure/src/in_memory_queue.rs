use tokio::sync::mpsc;
use tracing::debug;

use orchestrator_core::{SchedulerError, SchedulerResult, TaskMessage};

/// 创建有界任务队列
///
/// 服务层和控制通道通过 `TaskQueue` 投递消息，任务分发器独占 `TaskReceiver`。
pub fn task_channel(capacity: usize) -> (TaskQueue, TaskReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (TaskQueue { sender }, TaskReceiver { receiver })
}

#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<TaskMessage>,
}

impl TaskQueue {
    /// 投递任务，队列满时等待
    pub async fn submit(&self, message: TaskMessage) -> SchedulerResult<()> {
        debug!(task = %message.task, "任务入队");
        self.sender
            .send(message)
            .await
            .map_err(|e| SchedulerError::Internal(format!("任务队列已关闭，无法投递 {}", e.0.task)))
    }

    /// 非阻塞投递，队列满或已关闭时返回错误
    pub fn try_submit(&self, message: TaskMessage) -> SchedulerResult<()> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(m) => {
                SchedulerError::Internal(format!("任务队列已满，无法投递 {}", m.task))
            }
            mpsc::error::TrySendError::Closed(m) => {
                SchedulerError::Internal(format!("任务队列已关闭，无法投递 {}", m.task))
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// 队列中等待处理的消息数
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct TaskReceiver {
    receiver: mpsc::Receiver<TaskMessage>,
}

impl TaskReceiver {
    pub async fn recv(&mut self) -> Option<TaskMessage> {
        self.receiver.recv().await
    }

    /// 停止接收新消息，已入队的消息仍可取出
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_submit_and_receive_in_order() {
        let (queue, mut receiver) = task_channel(8);
        queue.submit(TaskMessage::new("a", json!(1))).await.unwrap();
        queue.submit(TaskMessage::new("b", json!(2))).await.unwrap();
        assert_eq!(queue.len(), 2);

        assert_eq!(receiver.recv().await.unwrap().task, "a");
        assert_eq!(receiver.recv().await.unwrap().task, "b");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_try_submit_full_and_closed() {
        let (queue, mut receiver) = task_channel(1);
        queue.try_submit(TaskMessage::new("a", json!(null))).unwrap();
        assert!(queue.try_submit(TaskMessage::new("b", json!(null))).is_err());

        receiver.close();
        assert!(queue.is_closed());
        assert!(queue.submit(TaskMessage::new("c", json!(null))).await.is_err());
        // 关闭前已入队的消息仍可取出
        assert_eq!(receiver.recv().await.unwrap().task, "a");
        assert!(receiver.recv().await.is_none());
    }
}
