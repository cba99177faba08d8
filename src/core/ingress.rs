//! 事件入口：无界、有序、多生产者 / 单消费者队列
//!
//! 生产者（UI 提交、内部信号）调用 submit 永不阻塞、永不拒绝；主循环每轮 drain_available 一次取走全部已排队事件。
//! 队列是唯一的串行化点：同一生产者内 FIFO，跨生产者按到达顺序。

use tokio::sync::mpsc;

use crate::protocol::InputEvent;

/// 生产者端，可任意克隆
#[derive(Clone, Debug)]
pub struct IngressHandle {
    tx: mpsc::UnboundedSender<InputEvent>,
}

impl IngressHandle {
    /// 追加事件；消费者已退出（内核关闭后）时仅记录告警
    pub fn submit(&self, event: InputEvent) {
        let source = event.source();
        match self.tx.send(event) {
            Ok(()) => tracing::debug!("Event received: [{}]", source),
            Err(_) => tracing::warn!("Event ingress closed, dropping [{}] event", source),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 消费者端，由主循环独占
#[derive(Debug)]
pub struct EventIngress {
    rx: mpsc::UnboundedReceiver<InputEvent>,
}

impl EventIngress {
    /// 不等待，取走当前排队的全部事件（可能为空）
    pub fn drain_available(&mut self) -> Vec<InputEvent> {
        let mut batch = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            batch.push(event);
        }
        batch
    }
}

/// 创建一对生产者 / 消费者端
pub fn channel() -> (IngressHandle, EventIngress) {
    let (tx, rx) = mpsc::unbounded_channel();
    (IngressHandle { tx }, EventIngress { rx })
}
