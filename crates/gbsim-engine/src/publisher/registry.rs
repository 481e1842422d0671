// 会话键 -> 推流句柄
// 同一会话键最多一个推流：启动前先停止旧的

use std::sync::Arc;

use dashmap::DashMap;

use super::{ActiveStream, MediaPublisher, StreamRequest};
use crate::session::SessionKey;
use crate::Result;

pub struct StreamRegistry {
    publisher: Arc<dyn MediaPublisher>,
    streams: DashMap<SessionKey, Box<dyn ActiveStream>>,
}

impl StreamRegistry {
    pub fn new(publisher: Arc<dyn MediaPublisher>) -> Self {
        Self {
            publisher,
            streams: DashMap::new(),
        }
    }

    /// 启动推流，同键已有推流时先停止
    pub async fn start(&self, request: &StreamRequest) -> Result<()> {
        if let Some((key, old)) = self.streams.remove(&request.key) {
            tracing::info!(target: "gbsim::stream", session = %key, "Replacing existing stream");
            old.stop().await;
        }

        let handle = self.publisher.start(request).await?;
        self.streams.insert(request.key.clone(), handle);
        tracing::info!(
            target: "gbsim::stream",
            session = %request.key,
            ssrc = %request.ssrc,
            "Stream started"
        );
        Ok(())
    }

    /// 停止单个会话，返回是否存在
    pub async fn stop(&self, key: &SessionKey) -> bool {
        match self.streams.remove(key) {
            Some((key, handle)) => {
                handle.stop().await;
                tracing::info!(target: "gbsim::stream", session = %key, "Stream stopped");
                true
            }
            None => false,
        }
    }

    /// 停止通道下的全部会话
    pub async fn stop_channel(&self, channel_id: &str) -> Vec<SessionKey> {
        let keys: Vec<SessionKey> = self
            .active_keys()
            .into_iter()
            .filter(|k| k.belongs_to(channel_id))
            .collect();
        let mut stopped = Vec::with_capacity(keys.len());
        for key in keys {
            if self.stop(&key).await {
                stopped.push(key);
            }
        }
        stopped
    }

    /// 停止全部会话
    pub async fn stop_all(&self) -> Vec<SessionKey> {
        let mut stopped = Vec::new();
        for key in self.active_keys() {
            if self.stop(&key).await {
                stopped.push(key);
            }
        }
        stopped
    }

    /// 当前会话键（排序后）
    pub fn active_keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = self.streams.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.streams.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
