use std::{collections::BTreeMap, path::Path};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::domain::reservation::{
    conflicts_with, Reservation, ReservationError, ReservationEvent, ReservationId,
    ReservationRepository, Room,
};
use crate::domain::{Aggregation, DataAccessError, Entity};
use crate::infrastructure::{
    from_event, stream_name, try_from_recorded_event, EventLog, StreamError,
};

/// イベントから組み立てた予約の現在状態
#[derive(Debug, Default)]
struct ReservationProjection {
    reservations: BTreeMap<ReservationId, Reservation>,
}

impl ReservationProjection {
    fn apply(&mut self, event: ReservationEvent) {
        match event {
            ReservationEvent::ReservationCreated { id, .. } => {
                let mut entity = Reservation::default();
                if let Err(e) = entity.validate(&event) {
                    warn!("不正な予約イベントをスキップしました: {} ({})", id, e);
                    return;
                }
                entity.apply(event);
                entity.clear();
                self.reservations.insert(id, entity);
            }
            ReservationEvent::ReservationDeleted { id } => {
                self.reservations.remove(&id);
            }
        }
    }

    fn get(&self, id: ReservationId) -> Option<Reservation> {
        self.reservations.get(&id).cloned()
    }

    fn contains(&self, id: ReservationId) -> bool {
        self.reservations.contains_key(&id)
    }

    fn find_by_room_and_date(&self, room: &Room, date: NaiveDate) -> Vec<Reservation> {
        let mut found = self
            .reservations
            .values()
            .filter(|r| r.room() == room && r.date() == date)
            .cloned()
            .collect::<Vec<_>>();
        found.sort_by_key(|r| r.time().start);
        found
    }

    fn all(&self) -> Vec<Reservation> {
        let mut all = self.reservations.values().cloned().collect::<Vec<_>>();
        all.sort_by_key(|r| (r.date(), r.time().start, r.id()));
        all
    }

    /// 保存前に書き込みの前提を検査する
    fn validate_save(&self, entity: &Reservation) -> Result<(), DataAccessError> {
        let stream = stream_name::<Reservation>(entity.id());
        match entity.peek() {
            Some(ReservationEvent::ReservationCreated {
                room, date, time, ..
            }) => {
                if self.contains(entity.id()) {
                    return Err(StreamError::AlreadyExists { stream }.into());
                }
                if conflicts_with(self.reservations.values(), room, *date, time) {
                    return Err(DataAccessError::WriteError(Box::new(
                        ReservationError::Overlapping,
                    )));
                }
                Ok(())
            }
            Some(_) if !self.contains(entity.id()) => Err(StreamError::NotFound { stream }.into()),
            _ => Ok(()),
        }
    }
}

/// JSON Linesのイベントログに永続化する予約リポジトリ
pub struct EventLogReservationRepository {
    log: EventLog,
    projection: ReservationProjection,
}

impl EventLogReservationRepository {
    /// ログを開き、既存のイベントを再生する
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, DataAccessError> {
        let mut log = EventLog::open(path).await?;
        let mut projection = ReservationProjection::default();
        let recorded = log.read_all().await?;
        for r in &recorded {
            projection.apply(try_from_recorded_event::<ReservationEvent, ReservationId>(r)?);
        }
        info!(
            "予約ログを再生しました: {} ({}件のイベント, {}件の予約)",
            log.path().display(),
            recorded.len(),
            projection.reservations.len()
        );
        Ok(Self { log, projection })
    }
}

#[async_trait]
impl ReservationRepository for EventLogReservationRepository {
    async fn find_by_id(&self, id: ReservationId) -> Result<Option<Reservation>, DataAccessError> {
        Ok(self.projection.get(id))
    }

    async fn find_by_room_and_date(
        &self,
        room: &Room,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, DataAccessError> {
        Ok(self.projection.find_by_room_and_date(room, date))
    }

    async fn find_all(&self) -> Result<Vec<Reservation>, DataAccessError> {
        Ok(self.projection.all())
    }

    async fn save(&mut self, entity: &mut Reservation) -> Result<bool, DataAccessError> {
        if entity.peek().is_none() {
            return Ok(false);
        }
        self.projection.validate_save(entity)?;
        let events = entity.pop_all();
        let recorded = events
            .iter()
            .cloned()
            .map(|e| from_event::<Reservation, _>(e.id(), e))
            .collect::<Result<Vec<_>, _>>()?;
        self.log.append(&recorded).await?;
        events.into_iter().for_each(|e| self.projection.apply(e));
        Ok(true)
    }

    async fn delete(&mut self, entity: &mut Reservation) -> Result<bool, DataAccessError> {
        if !self.projection.contains(entity.id()) {
            return Ok(false);
        }
        let event = ReservationEvent::ReservationDeleted { id: entity.id() };
        self.log
            .append(&[from_event::<Reservation, _>(entity.id(), event.clone())?])
            .await?;
        self.projection.apply(event);
        Ok(true)
    }
}

/// メモリ上だけで保持する予約リポジトリ
#[derive(Debug, Default)]
pub struct InMemoryReservationRepository {
    projection: ReservationProjection,
}

impl InMemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationRepository for InMemoryReservationRepository {
    async fn find_by_id(&self, id: ReservationId) -> Result<Option<Reservation>, DataAccessError> {
        Ok(self.projection.get(id))
    }

    async fn find_by_room_and_date(
        &self,
        room: &Room,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, DataAccessError> {
        Ok(self.projection.find_by_room_and_date(room, date))
    }

    async fn find_all(&self) -> Result<Vec<Reservation>, DataAccessError> {
        Ok(self.projection.all())
    }

    async fn save(&mut self, entity: &mut Reservation) -> Result<bool, DataAccessError> {
        if entity.peek().is_none() {
            return Ok(false);
        }
        self.projection.validate_save(entity)?;
        entity
            .pop_all()
            .into_iter()
            .for_each(|e| self.projection.apply(e));
        Ok(true)
    }

    async fn delete(&mut self, entity: &mut Reservation) -> Result<bool, DataAccessError> {
        if !self.projection.contains(entity.id()) {
            return Ok(false);
        }
        self.projection
            .apply(ReservationEvent::ReservationDeleted { id: entity.id() });
        Ok(true)
    }
}
