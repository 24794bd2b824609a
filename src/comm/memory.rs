//! Связи внутри одного процесса

use super::{Collective, Link, Packet};
use crate::error::{MatmulError, Result};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Связь через пару каналов tokio
pub struct MemoryLink {
    tx: UnboundedSender<Packet>,
    rx: UnboundedReceiver<Packet>,
}

impl MemoryLink {
    /// Два конца одной связи
    pub fn pair() -> (Self, Self) {
        let (left_tx, right_rx) = unbounded_channel();
        let (right_tx, left_rx) = unbounded_channel();
        (
            Self { tx: left_tx, rx: left_rx },
            Self { tx: right_tx, rx: right_rx },
        )
    }
}

impl Link for MemoryLink {
    async fn send(&mut self, packet: Packet) -> Result<()> {
        self.tx
            .send(packet)
            .map_err(|_| MatmulError::Transport("участник отключился".into()))
    }

    async fn recv(&mut self) -> Result<Packet> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| MatmulError::Transport("связь закрыта".into()))
    }
}

/// Группа из `size` участников одного процесса, элемент `i` соответствует участнику `i`
pub fn memory_group(size: usize) -> Vec<Collective<MemoryLink>> {
    let mut root_links = Vec::with_capacity(size.saturating_sub(1));
    let mut members = Vec::with_capacity(size);
    for rank in 1..size {
        let (root_end, member_end) = MemoryLink::pair();
        root_links.push(root_end);
        members.push(Collective { rank, size, links: vec![member_end] });
    }

    let mut group = Vec::with_capacity(size);
    group.push(Collective::root(root_links));
    group.extend(members);
    group
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_is_bidirectional() {
        let (mut left, mut right) = MemoryLink::pair();
        left.send(Packet::Hello { rank: 1 }).await.unwrap();
        right.send(Packet::Abort { reason: "x".into() }).await.unwrap();
        assert_eq!(right.recv().await.unwrap(), Packet::Hello { rank: 1 });
        assert_eq!(left.recv().await.unwrap(), Packet::Abort { reason: "x".into() });
    }

    #[tokio::test]
    async fn dropped_peer_is_transport_error() {
        let (mut left, right) = MemoryLink::pair();
        drop(right);
        assert!(matches!(left.send(Packet::Hello { rank: 1 }).await, Err(MatmulError::Transport(_))));
        assert!(matches!(left.recv().await, Err(MatmulError::Transport(_))));
    }

    #[test]
    fn group_ranks_follow_index() {
        let group = memory_group(4);
        for (i, c) in group.iter().enumerate() {
            assert_eq!(c.rank(), i);
            assert_eq!(c.size(), 4);
        }
    }
}
