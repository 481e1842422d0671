// 设备运行循环：绑定套接字、探测对外地址、收包 + 定时检查

use std::net::{IpAddr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{DeviceConfig, DeviceDeps, DeviceEngine};
use crate::{Result, SimError};

/// 解析平台地址（支持主机名）
pub async fn resolve_server(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| SimError::Resolve(format!("{}:{}: {}", host, port, e)))?
        .find(|addr| addr.is_ipv4())
        .ok_or_else(|| SimError::Resolve(format!("{}:{}: no IPv4 address", host, port)))
}

/// 探测到平台的出口地址
pub async fn probe_route(server: SocketAddr) -> std::io::Result<IpAddr> {
    let probe = UdpSocket::bind("0.0.0.0:0").await?;
    probe.connect(server).await?;
    Ok(probe.local_addr()?.ip())
}

/// 对外通告地址：绑定通配地址时使用探测结果，失败时退回配置的本地地址
async fn contact_ip(config: &DeviceConfig, bound: SocketAddr, server: SocketAddr) -> String {
    if !bound.ip().is_unspecified() {
        return bound.ip().to_string();
    }
    match probe_route(server).await {
        Ok(ip) if !ip.is_unspecified() => ip.to_string(),
        Ok(_) => config.local_ip.clone(),
        Err(e) => {
            tracing::warn!(target: "gbsim::device", device_id = %config.device_id, error = %e, "Route probe failed, advertising configured address");
            config.local_ip.clone()
        }
    }
}

enum LoopEvent {
    Shutdown,
    Datagram(usize, SocketAddr),
    RecvError(std::io::Error),
    Idle,
}

/// 运行单个设备直到收到关闭信号
///
/// 绑定失败直接返回错误；其余情况退出前都会停止全部推流并关闭套接字。
pub async fn run_device(config: DeviceConfig, deps: DeviceDeps, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let server_addr = resolve_server(&config.server_ip, config.server_port).await?;

    let bind_addr = format!("{}:{}", config.bind_ip(), config.local_port);
    let socket = UdpSocket::bind(&bind_addr).await.map_err(|source| {
        tracing::error!(target: "gbsim::device", device_id = %config.device_id, addr = %bind_addr, error = %source, "Bind failed");
        SimError::Bind {
            addr: bind_addr.clone(),
            source,
        }
    })?;
    let bound = socket.local_addr()?;
    let contact = contact_ip(&config, bound, server_addr).await;
    tracing::info!(target: "gbsim::device", device_id = %config.device_id, bound = %bound, contact = %contact, "Socket bound");

    let recv_timeout = config.timers.recv_timeout;
    let mut engine = DeviceEngine::new(config, contact, server_addr, deps);
    engine.start(Instant::now(), &socket).await;

    let mut buf = vec![0u8; 65536];
    loop {
        if *shutdown.borrow() {
            break;
        }

        let event = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    LoopEvent::Shutdown
                } else {
                    LoopEvent::Idle
                }
            }
            recv = tokio::time::timeout(recv_timeout, socket.recv_from(&mut buf)) => match recv {
                Ok(Ok((len, peer))) => LoopEvent::Datagram(len, peer),
                Ok(Err(e)) => LoopEvent::RecvError(e),
                Err(_) => LoopEvent::Idle,
            },
        };

        match event {
            LoopEvent::Shutdown => break,
            LoopEvent::Datagram(len, peer) => {
                let text = String::from_utf8_lossy(&buf[..len]).into_owned();
                engine.handle_datagram(&text, peer, Instant::now(), &socket).await;
            }
            LoopEvent::RecvError(e) => {
                tracing::warn!(target: "gbsim::device", device_id = %engine.device_id(), error = %e, "Receive failed");
            }
            LoopEvent::Idle => {}
        }

        engine.tick(Instant::now(), &socket).await;
    }

    engine.shutdown().await;
    drop(socket);
    Ok(())
}
