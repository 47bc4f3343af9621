use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use super::types::FrameDescription;

type Receiver = Arc<tokio::sync::Mutex<UnboundedReceiver<FrameDescription>>>;

struct Queue {
    tx: UnboundedSender<FrameDescription>,
    rx: Receiver,
}

/// 按 `(视频路径, 提示词)` 分组的描述队列
///
/// 视频流负责写入，SSE 连接负责读取。同一个队列有多个读取者时，每条描述只会被其中一个读到。
#[derive(Default)]
pub struct DescriptionHub {
    queues: Mutex<HashMap<(String, String), Queue>>,
}

impl DescriptionHub {
    fn with_queue<T>(&self, video_path: &str, prompt: &str, f: impl FnOnce(&Queue) -> T) -> T {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = queues.entry((video_path.to_string(), prompt.to_string())).or_insert_with(|| {
            let (tx, rx) = unbounded_channel();
            Queue { tx, rx: Arc::new(tokio::sync::Mutex::new(rx)) }
        });
        f(queue)
    }

    pub fn sender(&self, video_path: &str, prompt: &str) -> UnboundedSender<FrameDescription> {
        self.with_queue(video_path, prompt, |q| q.tx.clone())
    }

    pub fn receiver(&self, video_path: &str, prompt: &str) -> Receiver {
        self.with_queue(video_path, prompt, |q| q.rx.clone())
    }

    pub fn push(&self, video_path: &str, prompt: &str, description: FrameDescription) {
        // 队列自身持有发送端，不会发送失败
        let _ = self.sender(video_path, prompt).send(description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(timestamp: u64) -> FrameDescription {
        FrameDescription { timestamp, description: format!("frame {timestamp}") }
    }

    #[tokio::test]
    async fn test_queue_per_key() {
        let hub = DescriptionHub::default();
        hub.push("/a.mp4", "", item(0));
        hub.push("/a.mp4", "who?", item(1));
        hub.sender("/a.mp4", "").send(item(2)).unwrap();

        let rx = hub.receiver("/a.mp4", "");
        let mut rx = rx.lock().await;
        assert_eq!(rx.recv().await.unwrap(), item(0));
        assert_eq!(rx.recv().await.unwrap(), item(2));
        assert!(rx.try_recv().is_err());

        let other = hub.receiver("/a.mp4", "who?");
        assert_eq!(other.lock().await.recv().await.unwrap(), item(1));
    }

    #[tokio::test]
    async fn test_receiver_before_sender() {
        let hub = Arc::new(DescriptionHub::default());
        let rx = hub.receiver("/b.mp4", "p");
        let hub2 = hub.clone();
        tokio::spawn(async move { hub2.push("/b.mp4", "p", item(3)) });
        assert_eq!(rx.lock().await.recv().await.unwrap(), item(3));
    }
}
