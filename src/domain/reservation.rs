use std::ops::Range;

use async_trait::async_trait;
use bio::data_structures::interval_tree::IntervalTree;
use chrono::{NaiveDate, NaiveTime};
use derive_more::{Deref, Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::domain::{Aggregation, DataAccessError, Entity, Event, EventQueue, Id};

use super::slot::TIME_FORMAT;

/// 予約リポジトリ
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// IDで予約を検索する
    async fn find_by_id(&self, id: ReservationId) -> Result<Option<Reservation>, DataAccessError>;
    /// 部屋と日付で予約を検索する
    async fn find_by_room_and_date(
        &self,
        room: &Room,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, DataAccessError>;
    /// すべての予約を日付・開始時刻順に取得する
    async fn find_all(&self) -> Result<Vec<Reservation>, DataAccessError>;
    /// 予約を保存する
    async fn save(&mut self, entity: &mut Reservation) -> Result<bool, DataAccessError>;
    /// 予約を削除する
    async fn delete(&mut self, entity: &mut Reservation) -> Result<bool, DataAccessError>;
}

/// 予約ID
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Deref,
    Default,
)]
pub struct ReservationId(u64);

impl Id for ReservationId {
    type Inner = u64;
}

/// 討論室
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, Display,
)]
pub struct Room(String);

impl Room {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 予約イベント
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationEvent {
    /// 予約が作成された
    ReservationCreated {
        id: ReservationId,
        name: String,
        student_id: String,
        room: Room,
        date: NaiveDate,
        time: Range<NaiveTime>,
    },
    /// 予約が削除された
    ReservationDeleted { id: ReservationId },
}

impl Event for ReservationEvent {
    type Id = ReservationId;
}

impl ReservationEvent {
    pub fn id(&self) -> ReservationId {
        match self {
            Self::ReservationCreated { id, .. } | Self::ReservationDeleted { id } => *id,
        }
    }
}

/// 予約エンティティ
#[derive(Debug, Default, Clone)]
pub struct Reservation {
    id: ReservationId,
    name: String,
    student_id: String,
    room: Room,
    date: NaiveDate,
    time: Range<NaiveTime>,
    events: EventQueue<ReservationEvent>,
}

impl Reservation {
    pub fn create(
        id: ReservationId,
        name: String,
        student_id: String,
        room: Room,
        date: NaiveDate,
        time: Range<NaiveTime>,
    ) -> Result<Self, ReservationError> {
        Self::validate_created(&name, &student_id, &room, &time)?;
        let mut entity = Reservation {
            id,
            name: name.clone(),
            student_id: student_id.clone(),
            room: room.clone(),
            date,
            time: time.clone(),
            ..Reservation::default()
        };
        entity.events.push(ReservationEvent::ReservationCreated {
            id,
            name,
            student_id,
            room,
            date,
            time,
        });
        Ok(entity)
    }

    /// 削除イベントを積む
    pub fn delete(&mut self) {
        self.events
            .push(ReservationEvent::ReservationDeleted { id: self.id });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> &Range<NaiveTime> {
        &self.time
    }

    pub fn start_label(&self) -> String {
        self.time.start.format(TIME_FORMAT).to_string()
    }

    pub fn end_label(&self) -> String {
        self.time.end.format(TIME_FORMAT).to_string()
    }

    fn validate_id(&self, id: &ReservationId) -> Result<(), ReservationError> {
        if self.id != *id {
            return Err(ReservationError::MismatchedId);
        }
        Ok(())
    }

    fn validate_created(
        name: &str,
        student_id: &str,
        room: &Room,
        time: &Range<NaiveTime>,
    ) -> Result<(), ReservationError> {
        if name.trim().is_empty() {
            return Err(ReservationError::NameRequired);
        }
        if student_id.trim().is_empty() {
            return Err(ReservationError::StudentIdRequired);
        }
        if room.as_str().trim().is_empty() {
            return Err(ReservationError::RoomRequired);
        }
        Self::validate_time(time)
    }

    fn validate_time(time: &Range<NaiveTime>) -> Result<(), ReservationError> {
        if time.start >= time.end {
            return Err(ReservationError::InvalidTime);
        }
        Ok(())
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    const ENTITY_NAME: &'static str = "reservation";

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Aggregation for Reservation {
    type Event = ReservationEvent;
    type Error = ReservationError;

    fn validate(&self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            ReservationEvent::ReservationCreated {
                name,
                student_id,
                room,
                time,
                ..
            } => Self::validate_created(name, student_id, room, time),
            ReservationEvent::ReservationDeleted { id } => self.validate_id(id),
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            ReservationEvent::ReservationCreated {
                id,
                name,
                student_id,
                room,
                date,
                time,
            } => {
                if self.id != id {
                    if let Ok(entity) = Self::create(id, name, student_id, room, date, time) {
                        *self = entity;
                    }
                }
            }
            ReservationEvent::ReservationDeleted { id } => {
                if self.id == id {
                    self.delete();
                }
            }
        }
    }

    fn events(&self) -> &EventQueue<Self::Event> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventQueue<Self::Event> {
        &mut self.events
    }
}

impl PartialEq for Reservation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.student_id == other.student_id
            && self.room == other.room
            && self.date == other.date
            && self.time == other.time
    }
}

impl Eq for Reservation {}

/// 予約エラー
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    /// IDが一致しません
    #[display(fmt = "ID does not match")]
    MismatchedId,
    /// 名前が指定されていません
    #[display(fmt = "Name is not specified")]
    NameRequired,
    /// 学籍番号が指定されていません
    #[display(fmt = "Student ID is not specified")]
    StudentIdRequired,
    /// 部屋が指定されていません
    #[display(fmt = "Room is not specified")]
    RoomRequired,
    /// 時間が不正です
    #[display(fmt = "Invalid time")]
    InvalidTime,
    /// 既存の予約と重なっています
    #[display(fmt = "Reservation overlaps with an existing reservation")]
    Overlapping,
}

/// 同じ部屋・同じ日付の既存予約と`time`が重なるか判定する
///
/// 区間は半開区間として扱うため、終了時刻と開始時刻が一致する予約は重ならない。
pub fn conflicts_with<'a, I>(
    existing: I,
    room: &Room,
    date: NaiveDate,
    time: &Range<NaiveTime>,
) -> bool
where
    I: IntoIterator<Item = &'a Reservation>,
{
    // 逆転した区間は予約できない
    if time.start > time.end {
        return true;
    }
    IntervalTree::<NaiveTime, ReservationId>::from_iter(
        existing
            .into_iter()
            .filter(|r| r.room == *room && r.date == date)
            .map(|r| (r.time.clone(), r.id)),
    )
    .find(time.clone())
    .next()
    .is_some()
}

/// リポジトリに保存済みの予約と衝突するか判定する
pub async fn has_conflict<R>(
    repository: &R,
    room: &Room,
    date: NaiveDate,
    time: &Range<NaiveTime>,
) -> Result<bool, DataAccessError>
where
    R: ReservationRepository + ?Sized,
{
    let existing = repository.find_by_room_and_date(room, date).await?;
    Ok(conflicts_with(&existing, room, date, time))
}
