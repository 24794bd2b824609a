//! Связи между процессами по TCP
//!
//! Кадр: длина в 4 байтах (big-endian) и JSON-представление `Packet`.

use super::{Collective, Link, Packet};
use crate::error::{MatmulError, Result};
use log::{debug, info};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Instant};

/// Наибольший допустимый размер кадра
pub const MAX_FRAME: usize = 64 * 1024 * 1024;

/// Сколько ждать подключения всех участников
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

const CONNECT_RETRY: Duration = Duration::from_millis(100);

pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    pub fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl Link for TcpLink {
    async fn send(&mut self, packet: Packet) -> Result<()> {
        let bytes = serde_json::to_vec(&packet)?;
        if bytes.len() > MAX_FRAME {
            return Err(MatmulError::Protocol(format!("кадр {} байт превышает предел", bytes.len())));
        }
        self.stream.write_u32(bytes.len() as u32).await?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Packet> {
        let len = self.stream.read_u32().await? as usize;
        if len > MAX_FRAME {
            return Err(MatmulError::Protocol(format!("кадр {len} байт превышает предел")));
        }
        let mut bytes = vec![0u8; len];
        self.stream.read_exact(&mut bytes).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Слушает адрес координатора; порт 0 выбирается системой
pub async fn bind(addr: &str) -> Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!("Координатор слушает {}", local);
    Ok((listener, local))
}

/// Принимает `size - 1` участников и строит группу с точки зрения корня.
///
/// Каждый подключившийся сначала присылает `Hello { rank }`; номера
/// должны быть различны и лежать в [1, size).
pub async fn accept_group(listener: &TcpListener, size: usize) -> Result<Collective<TcpLink>> {
    accept_group_within(listener, size, HANDSHAKE_TIMEOUT).await
}

/// То же, что `accept_group`, с заданным пределом на подключение и приветствия всех участников
pub async fn accept_group_within(
    listener: &TcpListener,
    size: usize,
    limit: Duration,
) -> Result<Collective<TcpLink>> {
    let mut slots: Vec<Option<TcpLink>> = (1..size).map(|_| None).collect();
    let deadline = Instant::now() + limit;

    for _ in 1..size {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (stream, peer) = timeout(remaining, listener.accept())
            .await
            .map_err(|_| MatmulError::Transport("не все участники подключились вовремя".into()))??;
        let mut link = TcpLink::new(stream)?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let hello = timeout(remaining, link.recv())
            .await
            .map_err(|_| MatmulError::Transport(format!("участник {peer} не представился вовремя")))??;
        let rank = match hello {
            Packet::Hello { rank } => rank,
            other => return Err(MatmulError::Protocol(format!("ожидалось приветствие от {peer}, получено {other:?}"))),
        };
        if rank == 0 || rank >= size {
            return Err(MatmulError::Protocol(format!("участник {peer} назвался номером {rank} вне [1, {size})")));
        }
        let slot = &mut slots[rank - 1];
        if slot.is_some() {
            return Err(MatmulError::Protocol(format!("номер {rank} уже занят")));
        }
        debug!("Участник {} подключился с {}", rank, peer);
        *slot = Some(link);
    }

    let links = slots
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| MatmulError::Protocol("не все номера участников заняты".into()))?;
    Ok(Collective::root(links))
}

/// Подключается к координатору и представляется номером `rank`.
///
/// Координатор может ещё не слушать, поэтому попытки повторяются до
/// `HANDSHAKE_TIMEOUT`.
pub async fn connect(addr: &str, rank: usize, size: usize) -> Result<Collective<TcpLink>> {
    let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
    let stream = loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => break stream,
            Err(e) if Instant::now() < deadline => {
                debug!("Координатор {} пока недоступен: {}", addr, e);
                sleep(CONNECT_RETRY).await;
            }
            Err(e) => return Err(MatmulError::Transport(format!("не удалось подключиться к {addr}: {e}"))),
        }
    };

    let mut link = TcpLink::new(stream)?;
    link.send(Packet::Hello { rank }).await?;
    Collective::member(rank, size, link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_survive_the_socket() {
        let (listener, addr) = bind("127.0.0.1:0").await.unwrap();
        let client = tokio::spawn(async move {
            let mut link = TcpLink::new(TcpStream::connect(addr).await.unwrap()).unwrap();
            link.send(Packet::Data(serde_json::json!({"rows": [1, 2, 3]}))).await.unwrap();
            link.recv().await.unwrap()
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut link = TcpLink::new(stream).unwrap();
        assert_eq!(link.recv().await.unwrap(), Packet::Data(serde_json::json!({"rows": [1, 2, 3]})));
        link.send(Packet::Abort { reason: "стоп".into() }).await.unwrap();
        assert_eq!(client.await.unwrap(), Packet::Abort { reason: "стоп".into() });
    }

    #[tokio::test]
    async fn oversized_frame_rejected() {
        let (listener, addr) = bind("127.0.0.1:0").await.unwrap();
        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_u32(u32::MAX).await.unwrap();
            stream
        });
        let (stream, _) = listener.accept().await.unwrap();
        let _keep = client.await.unwrap();
        let mut link = TcpLink::new(stream).unwrap();
        assert!(matches!(link.recv().await, Err(MatmulError::Protocol(_))));
    }

    #[tokio::test]
    async fn group_orders_links_by_rank() {
        let (listener, addr) = bind("127.0.0.1:0").await.unwrap();
        let addr = addr.to_string();
        let mut members = Vec::new();
        for rank in [2usize, 1] {
            let addr = addr.clone();
            members.push(tokio::spawn(async move {
                let mut member = connect(&addr, rank, 3).await.unwrap();
                member.broadcast::<usize>(None).await.unwrap();
                member.gather(rank * 10).await.unwrap()
            }));
        }

        let mut root = accept_group(&listener, 3).await.unwrap();
        root.broadcast(Some(0usize)).await.unwrap();
        let parts = root.gather(0usize).await.unwrap().unwrap();
        assert_eq!(parts, vec![0, 10, 20]);
        for m in members {
            assert_eq!(m.await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (listener, addr) = bind("127.0.0.1:0").await.unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let err = accept_group_within(&listener, 2, Duration::from_millis(200)).await.err().unwrap();
        assert!(matches!(err, MatmulError::Transport(_)), "{err:?}");
        drop(client.await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_rank_rejected() {
        let (listener, addr) = bind("127.0.0.1:0").await.unwrap();
        let addr = addr.to_string();
        let a = tokio::spawn({
            let addr = addr.clone();
            async move { connect(&addr, 1, 3).await }
        });
        let b = tokio::spawn(async move { connect(&addr, 1, 3).await });
        let err = accept_group(&listener, 3).await.err().unwrap();
        assert!(matches!(err, MatmulError::Protocol(_)));
        let _ = (a.await, b.await);
    }
}
