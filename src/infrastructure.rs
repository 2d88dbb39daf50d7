pub mod reservation;

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};

use crate::domain::{DataAccessError, Entity, Event, Id};

impl From<EventConvertError> for DataAccessError {
    fn from(value: EventConvertError) -> Self {
        DataAccessError::ClientSideError(Box::new(value))
    }
}

impl From<StreamError> for DataAccessError {
    fn from(value: StreamError) -> Self {
        DataAccessError::WriteError(Box::new(value))
    }
}

/// イベントとログ行の相互変換に失敗した
#[derive(Error, Debug)]
#[error("Failed to convert event")]
pub struct EventConvertError;

impl From<serde_json::Error> for EventConvertError {
    fn from(_value: serde_json::Error) -> Self {
        EventConvertError
    }
}

/// ストリームの状態が書き込みの前提と一致しない
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub enum StreamError {
    #[display(fmt = "Stream already exists: {}", stream)]
    AlreadyExists { stream: String },
    #[display(fmt = "Stream not found: {}", stream)]
    NotFound { stream: String },
}

/// イベントログの1行
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub stream: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

fn entity_id<I, T>(stream_id: &str) -> Option<I>
where
    I: Id<Inner = T>,
    T: FromStr,
{
    stream_id
        .split('-')
        .filter_map(|s| s.parse::<T>().ok())
        .map(I::from)
        .last()
}

fn stream_name<E: Entity>(id: E::Id) -> String {
    E::ENTITY_NAME.to_owned() + "-" + &id.to_string()
}

fn from_event<E: Entity, V: Event<Id = E::Id>>(
    id: E::Id,
    event: V,
) -> Result<RecordedEvent, EventConvertError> {
    let root = serde_json::to_value(event)?;
    let (event_type, data) = root
        .as_object()
        .and_then(|o| o.iter().next())
        .ok_or(EventConvertError)?;
    let mut data = data.clone();
    data.as_object_mut().ok_or(EventConvertError)?.remove("id");
    Ok(RecordedEvent {
        stream: stream_name::<E>(id),
        event_type: event_type.clone(),
        data,
    })
}

fn try_from_recorded_event<E, I>(value: &RecordedEvent) -> Result<E, EventConvertError>
where
    E: DeserializeOwned + Event<Id = I>,
    I: Id,
{
    let id = entity_id::<I, I::Inner>(&value.stream).ok_or(EventConvertError)?;
    let mut data = value.data.clone();
    data.as_object_mut()
        .ok_or(EventConvertError)?
        .insert("id".to_owned(), json!(id));
    let json = json!({ &value.event_type: data });
    Ok(serde_json::from_value(json)?)
}

/// 追記専用のJSON Linesイベントログ
pub struct EventLog {
    path: PathBuf,
    file: File,
}

impl EventLog {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, DataAccessError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DataAccessError::WriteError(Box::new(e)))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| DataAccessError::WriteError(Box::new(e)))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 全行を読み込む
    ///
    /// 追記中に途切れた末尾行は警告を出して切り詰める。途中の行が壊れている場合はエラー。
    pub async fn read_all(&mut self) -> Result<Vec<RecordedEvent>, DataAccessError> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| DataAccessError::ReadError(Box::new(e)))?;
        let (complete, tail) = match content.rfind('\n') {
            Some(i) => content.split_at(i + 1),
            None => ("", content.as_str()),
        };
        let mut events = complete
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<RecordedEvent>(line)
                    .map_err(|e| DataAccessError::ReadError(Box::new(e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if tail.trim().is_empty() {
            return Ok(events);
        }
        match serde_json::from_str::<RecordedEvent>(tail) {
            Ok(event) => {
                // 改行だけが欠けている行は次の追記と連結されないように閉じる
                self.file
                    .write_all(b"\n")
                    .await
                    .map_err(|e| DataAccessError::WriteError(Box::new(e)))?;
                self.file
                    .sync_data()
                    .await
                    .map_err(|e| DataAccessError::WriteError(Box::new(e)))?;
                events.push(event);
            }
            Err(e) => {
                warn!(
                    "途切れた末尾行を切り詰めます: {} ({})",
                    self.path.display(),
                    e
                );
                self.file
                    .set_len(complete.len() as u64)
                    .await
                    .map_err(|e| DataAccessError::WriteError(Box::new(e)))?;
            }
        }
        Ok(events)
    }

    pub async fn append(&mut self, events: &[RecordedEvent]) -> Result<(), DataAccessError> {
        let mut buf = String::new();
        for event in events {
            buf.push_str(&serde_json::to_string(event).map_err(EventConvertError::from)?);
            buf.push('\n');
        }
        self.file
            .write_all(buf.as_bytes())
            .await
            .map_err(|e| DataAccessError::WriteError(Box::new(e)))?;
        self.file
            .sync_data()
            .await
            .map_err(|e| DataAccessError::WriteError(Box::new(e)))?;
        debug!("{}件のイベントを追記: {}", events.len(), self.path.display());
        Ok(())
    }
}
