// 报文发送抽象，设备逻辑只依赖 send_to

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> std::io::Result<usize>;
}

#[async_trait]
impl Transport for UdpSocket {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> std::io::Result<usize> {
        UdpSocket::send_to(self, data, target).await
    }
}
