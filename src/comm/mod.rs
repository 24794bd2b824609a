//! Коллективные операции между участниками
//!
//! Топология звезда: участник 0 держит по одной связи с каждым
//! остальным, у остальных одна связь с участником 0. Связи используются
//! только коллективными операциями `Collective`.

mod memory;
pub mod tcp;

pub use memory::{memory_group, MemoryLink};
pub use tcp::TcpLink;

use crate::error::{MatmulError, Result};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Номер участника координатора
pub const ROOT: usize = 0;

/// Единица обмена по связи
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    /// Первый кадр подключившегося участника
    Hello { rank: usize },
    Data(serde_json::Value),
    Abort { reason: String },
}

/// Двунаправленная упорядоченная связь с одним участником
pub trait Link: Send {
    fn send(&mut self, packet: Packet) -> impl Future<Output = Result<()>> + Send;
    fn recv(&mut self) -> impl Future<Output = Result<Packet>> + Send;
}

/// Группа участников с точки зрения одного из них
pub struct Collective<L: Link> {
    rank: usize,
    size: usize,
    /// У корня связь с участником `i` лежит под индексом `i - 1`,
    /// у остальных единственная связь с корнем
    links: Vec<L>,
}

impl<L: Link> Collective<L> {
    /// Корень группы из `links.len() + 1` участников
    pub fn root(links: Vec<L>) -> Self {
        Self { rank: ROOT, size: links.len() + 1, links }
    }

    /// Участник `rank` группы размера `size`, связанный с корнем
    pub fn member(rank: usize, size: usize, link: L) -> Result<Self> {
        if rank == ROOT || rank >= size {
            return Err(MatmulError::Protocol(format!("номер участника {rank} вне [1, {size})")));
        }
        Ok(Self { rank, size, links: vec![link] })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_root(&self) -> bool {
        self.rank == ROOT
    }

    /// Значение корня доставляется всем; каждый участник ждёт, пока его получит.
    /// Корень передаёт `Some(value)`, остальные `None`.
    pub async fn broadcast<T>(&mut self, value: Option<T>) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.is_root() {
            let value = value.ok_or_else(|| MatmulError::Protocol("корень не передал значение".into()))?;
            let payload = serde_json::to_value(&value)?;
            for link in &mut self.links {
                link.send(Packet::Data(payload.clone())).await?;
            }
            Ok(value)
        } else {
            self.receive_from_root().await
        }
    }

    /// Часть `parts[i]` получает участник `i`, корень оставляет себе `parts[0]`
    pub async fn scatter<T>(&mut self, parts: Option<Vec<T>>) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.is_root() {
            let parts = parts.ok_or_else(|| MatmulError::Protocol("корень не передал части".into()))?;
            if parts.len() != self.size {
                return Err(MatmulError::DimensionMismatch { expected: self.size, actual: parts.len() });
            }
            let mut parts = parts.into_iter();
            let own = parts.next().ok_or_else(|| MatmulError::Protocol("пустая группа".into()))?;
            for (link, part) in self.links.iter_mut().zip(parts) {
                link.send(Packet::Data(serde_json::to_value(&part)?)).await?;
            }
            Ok(own)
        } else {
            self.receive_from_root().await
        }
    }

    /// Корень получает части всех участников в порядке номеров, остальные `None`.
    ///
    /// Если кто-то прислал отказ, корень пересылает его остальным и
    /// возвращает `Aborted`.
    pub async fn gather<T>(&mut self, part: T) -> Result<Option<Vec<T>>>
    where
        T: Serialize + DeserializeOwned,
    {
        if !self.is_root() {
            let payload = serde_json::to_value(&part)?;
            self.links[0].send(Packet::Data(payload)).await?;
            return Ok(None);
        }

        let mut parts = Vec::with_capacity(self.size);
        parts.push(part);
        for index in 0..self.links.len() {
            match self.links[index].recv().await? {
                Packet::Data(value) => parts.push(serde_json::from_value(value)?),
                Packet::Abort { reason } => {
                    let reason = format!("участник {}: {}", index + 1, reason);
                    self.abort(&reason).await;
                    return Err(MatmulError::Aborted { reason });
                }
                Packet::Hello { rank } => {
                    return Err(MatmulError::Protocol(format!("неожиданное приветствие от {rank}")));
                }
            }
        }
        Ok(Some(parts))
    }

    /// Сообщает всем о прерывании прогона.
    ///
    /// Корень рассылает отказ всем участникам, остальные отправляют его
    /// корню, который перешлёт его при ближайшем сборе. Ошибки доставки
    /// только логируются: получатель мог уже завершиться.
    pub async fn abort(&mut self, reason: &str) {
        debug!("Участник {}: прерывание прогона: {}", self.rank, reason);
        for link in &mut self.links {
            if let Err(e) = link.send(Packet::Abort { reason: reason.to_string() }).await {
                warn!("Не удалось доставить отказ: {}", e);
            }
        }
    }

    async fn receive_from_root<T: DeserializeOwned>(&mut self) -> Result<T> {
        match self.links[0].recv().await? {
            Packet::Data(value) => Ok(serde_json::from_value(value)?),
            Packet::Abort { reason } => Err(MatmulError::Aborted { reason }),
            Packet::Hello { rank } => Err(MatmulError::Protocol(format!("неожиданное приветствие от {rank}"))),
        }
    }
}
