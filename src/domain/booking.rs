use std::ops::Range;

use chrono::{NaiveDate, NaiveTime};
use derive_more::{Display, Error};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    domain::{
        reservation::{
            has_conflict, Reservation, ReservationError, ReservationId, ReservationRepository,
            Room,
        },
        slot::{
            check_continuous, generate_slots, parse_time, SelectionError, Slot, SlotError,
            TIME_FORMAT,
        },
        DataAccessError, Entity, IdGenerator,
    },
    Booking,
};

/// 日付の入力形式
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// エラーメッセージに含める入力値の最大文字数
const ECHO_LIMIT: usize = 32;

/// 予約フォームの入力
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BookingRequest {
    pub name: String,
    pub student_id: String,
    pub room: String,
    pub date: String,
    pub slots: Vec<String>,
}

/// 必須入力項目
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum Field {
    #[display(fmt = "name")]
    Name,
    #[display(fmt = "student ID")]
    StudentId,
    #[display(fmt = "room")]
    Room,
    #[display(fmt = "date")]
    Date,
}

/// 予約処理の段階
#[derive(Debug, Display)]
pub enum BookingStage {
    #[display(fmt = "submitted")]
    Submitted,
    #[display(fmt = "field validated")]
    FieldValidated,
    #[display(fmt = "continuity checked")]
    ContinuityChecked,
    #[display(fmt = "conflict checked")]
    ConflictChecked,
    #[display(fmt = "persisted")]
    Persisted,
    #[display(fmt = "rejected: {}", _0)]
    Rejected(String),
}

/// 予約処理のエラー
#[derive(Error, Display, Debug)]
pub enum BookingError {
    /// 必須項目が入力されていません
    #[display(fmt = "Please fill in name, student ID, room and date ({} is missing).", field)]
    MissingField { field: Field },
    /// 日付が不正です
    #[display(fmt = "Invalid date: {}", value)]
    InvalidDate { value: String },
    /// 時刻が不正です
    #[display(fmt = "Invalid time slot: {}", value)]
    InvalidTime { value: String },
    /// 存在しない部屋です
    #[display(fmt = "Unknown room: {}", room)]
    UnknownRoom { room: String },
    /// 予約できない時間枠です
    #[display(fmt = "Time slot is not bookable: {}", value)]
    UnknownSlot { value: String },
    /// 時間枠が選択されていません
    #[display(fmt = "{}", SelectionError::EmptySelection)]
    EmptySelection,
    /// 時間枠が連続していません
    #[display(fmt = "{}", SelectionError::NonContiguous)]
    NonContiguous,
    /// 日付をまたいでいます
    #[display(fmt = "{}", SelectionError::CrossesMidnight)]
    CrossesMidnight,
    /// 既存の予約と衝突しています
    #[display(
        fmt = "Time conflict: the selected slots are already reserved. Please choose other slots."
    )]
    SchedulingConflict,
    /// 予約が見つかりません
    #[display(fmt = "Reservation {} not found.", id)]
    NotFound { id: ReservationId },
    /// 予約を作成できません
    #[display(fmt = "Invalid reservation: {}", source)]
    InvalidReservation { source: ReservationError },
    /// データアクセスエラー
    #[display(fmt = "Data access error: {}", _0)]
    DataAccess(#[error(source)] DataAccessError),
}

impl From<SelectionError> for BookingError {
    fn from(value: SelectionError) -> Self {
        match value {
            SelectionError::EmptySelection => Self::EmptySelection,
            SelectionError::NonContiguous => Self::NonContiguous,
            SelectionError::CrossesMidnight => Self::CrossesMidnight,
        }
    }
}

impl From<ReservationError> for BookingError {
    fn from(value: ReservationError) -> Self {
        match value {
            ReservationError::NameRequired => Self::MissingField { field: Field::Name },
            ReservationError::StudentIdRequired => Self::MissingField {
                field: Field::StudentId,
            },
            ReservationError::RoomRequired => Self::MissingField { field: Field::Room },
            ReservationError::Overlapping => Self::SchedulingConflict,
            source => Self::InvalidReservation { source },
        }
    }
}

impl From<DataAccessError> for BookingError {
    fn from(value: DataAccessError) -> Self {
        Self::DataAccess(value)
    }
}

/// 予約可能な部屋と時間枠
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingPolicy {
    rooms: Vec<Room>,
    slots: Vec<Slot>,
}

impl BookingPolicy {
    pub fn new(rooms: Vec<Room>, slots: Vec<Slot>) -> Self {
        Self { rooms, slots }
    }

    pub fn from_config(config: &Booking) -> Result<Self, SlotError> {
        Ok(Self::new(
            config.rooms.iter().map(Room::new).collect(),
            generate_slots(config.open_hour, config.close_hour)?,
        ))
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.as_str() == name)
    }

    fn is_slot_start(&self, time: NaiveTime) -> bool {
        self.slots.iter().any(|s| s.start() == time)
    }
}

/// 入力項目の検査を通過した予約
#[derive(Debug)]
struct ValidatedRequest {
    name: String,
    student_id: String,
    room: Room,
    date: NaiveDate,
    slots: Vec<String>,
}

struct Inner {
    repository: Box<dyn ReservationRepository>,
    ids: IdGenerator,
}

/// 予約の作成・一覧・削除を行うサービス
///
/// 衝突検査と保存は同じロックの中で行うため、同じ時間枠への同時予約はどちらか一方だけが成功する。
pub struct BookingService {
    policy: BookingPolicy,
    inner: Mutex<Inner>,
}

impl BookingService {
    pub fn new(policy: BookingPolicy, repository: Box<dyn ReservationRepository>) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner {
                repository,
                ids: IdGenerator::default(),
            }),
        }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    /// 予約を検査して保存する
    pub async fn reserve(&self, request: BookingRequest) -> Result<Reservation, BookingError> {
        let mut stage = BookingStage::Submitted;
        debug!("予約処理: {}", stage);
        let result = self.run(request, &mut stage).await;
        if let Err(error) = &result {
            warn!("予約を受け付けませんでした: {}", error);
            advance(&mut stage, BookingStage::Rejected(error.to_string()));
        }
        result
    }

    async fn run(
        &self,
        request: BookingRequest,
        stage: &mut BookingStage,
    ) -> Result<Reservation, BookingError> {
        let request = self.validate_fields(request)?;
        advance(stage, BookingStage::FieldValidated);

        let time = self.validate_slots(&request.slots)?;
        advance(stage, BookingStage::ContinuityChecked);

        let mut inner = self.inner.lock().await;
        if has_conflict(inner.repository.as_ref(), &request.room, request.date, &time).await? {
            return Err(BookingError::SchedulingConflict);
        }
        advance(stage, BookingStage::ConflictChecked);

        let id = inner.ids.generate::<ReservationId>();
        let mut reservation = Reservation::create(
            id,
            request.name,
            request.student_id,
            request.room,
            request.date,
            time,
        )?;
        inner.repository.save(&mut reservation).await?;
        advance(stage, BookingStage::Persisted);
        info!(
            "予約を作成しました: {} {} {} {}-{}",
            reservation.id(),
            reservation.room(),
            reservation.date(),
            reservation.start_label(),
            reservation.end_label()
        );
        Ok(reservation)
    }

    fn validate_fields(&self, request: BookingRequest) -> Result<ValidatedRequest, BookingError> {
        let name = required(&request.name, Field::Name)?;
        let student_id = required(&request.student_id, Field::StudentId)?;
        let room = required(&request.room, Field::Room)?;
        let date = required(&request.date, Field::Date)?;
        let room = self
            .policy
            .room(&room)
            .cloned()
            .ok_or_else(|| BookingError::UnknownRoom { room: echo(&room) })?;
        let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|_| BookingError::InvalidDate { value: echo(&date) })?;
        Ok(ValidatedRequest {
            name,
            student_id,
            room,
            date,
            slots: request.slots,
        })
    }

    fn validate_slots(&self, slots: &[String]) -> Result<Range<NaiveTime>, BookingError> {
        let times = slots
            .iter()
            .map(|s| {
                parse_time(s).map_err(|_| BookingError::InvalidTime { value: echo(s) })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(time) = times.iter().find(|t| !self.policy.is_slot_start(**t)) {
            return Err(BookingError::UnknownSlot {
                value: time.format(TIME_FORMAT).to_string(),
            });
        }
        Ok(check_continuous(times)?)
    }

    /// すべての予約を日付・開始時刻順に取得する
    pub async fn list(&self) -> Result<Vec<Reservation>, BookingError> {
        let inner = self.inner.lock().await;
        Ok(inner.repository.find_all().await?)
    }

    /// 予約を削除する
    pub async fn cancel(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        let mut inner = self.inner.lock().await;
        let mut reservation = inner
            .repository
            .find_by_id(id)
            .await?
            .ok_or(BookingError::NotFound { id })?;
        if !inner.repository.delete(&mut reservation).await? {
            return Err(BookingError::NotFound { id });
        }
        info!("予約を削除しました: {}", id);
        Ok(reservation)
    }
}

fn advance(stage: &mut BookingStage, next: BookingStage) {
    debug!("予約処理: {} -> {}", stage, next);
    *stage = next;
}

fn required(value: &str, field: Field) -> Result<String, BookingError> {
    match value.trim() {
        "" => Err(BookingError::MissingField { field }),
        v => Ok(v.to_owned()),
    }
}

/// 入力値を長さを制限してエラーメッセージ用に写す
fn echo(value: &str) -> String {
    match value.char_indices().nth(ECHO_LIMIT) {
        Some((end, _)) => format!("{}...", &value[..end]),
        None => value.to_owned(),
    }
}
