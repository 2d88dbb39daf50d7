use std::{collections::BTreeSet, ops::Range};

use chrono::{Duration, NaiveTime};
use derive_more::{Display, Error};

/// 時刻の表示形式
pub const TIME_FORMAT: &str = "%H:%M";

/// 予約可能な1時間の時間枠
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display(fmt = "{}-{}", "start.format(TIME_FORMAT)", "end.format(TIME_FORMAT)")]
pub struct Slot {
    start: NaiveTime,
    end: NaiveTime,
}

impl Slot {
    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn time(&self) -> Range<NaiveTime> {
        self.start..self.end
    }
}

/// 時間枠生成のエラー
#[derive(Error, Display, Debug, PartialEq, Eq)]
pub enum SlotError {
    /// 開始・終了時刻が不正です
    #[display(fmt = "Invalid slot hours: {}..{}", open, close)]
    InvalidHours { open: u32, close: u32 },
}

/// 時間枠選択のエラー
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// 時間枠が選択されていません
    #[display(fmt = "Please select at least one time slot.")]
    EmptySelection,
    /// 時間枠が連続していません
    #[display(fmt = "Selected time slots must be continuous (no gaps).")]
    NonContiguous,
    /// 日付をまたいでいます
    #[display(fmt = "Selected time slots must end before midnight.")]
    CrossesMidnight,
}

/// `open_hour`時から`close_hour`時までの1時間ごとの時間枠を生成する
pub fn generate_slots(open_hour: u32, close_hour: u32) -> Result<Vec<Slot>, SlotError> {
    if open_hour >= close_hour || close_hour > 23 {
        return Err(SlotError::InvalidHours {
            open: open_hour,
            close: close_hour,
        });
    }
    Ok((open_hour..close_hour)
        .filter_map(|hour| {
            Some(Slot {
                start: NaiveTime::from_hms_opt(hour, 0, 0)?,
                end: NaiveTime::from_hms_opt(hour + 1, 0, 0)?,
            })
        })
        .collect())
}

/// 選択された開始時刻が1本の連続した範囲になっているか検査し、その範囲を返す
///
/// 重複した開始時刻は1つにまとめられる。
pub fn check_continuous<I>(selected: I) -> Result<Range<NaiveTime>, SelectionError>
where
    I: IntoIterator<Item = NaiveTime>,
{
    let times = selected.into_iter().collect::<BTreeSet<_>>();
    let (first, last) = match (times.first(), times.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(SelectionError::EmptySelection),
    };
    let hour = Duration::hours(1);
    let gap = times
        .iter()
        .zip(times.iter().skip(1))
        .any(|(a, b)| b.signed_duration_since(*a) != hour);
    if gap {
        return Err(SelectionError::NonContiguous);
    }
    match last.overflowing_add_signed(hour) {
        (end, 0) => Ok(first..end),
        _ => Err(SelectionError::CrossesMidnight),
    }
}

/// `HH:MM`形式の時刻を読み取る
pub fn parse_time(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(value: &str) -> NaiveTime {
        parse_time(value).unwrap()
    }

    #[test]
    fn test_generate_slots() {
        let slots = generate_slots(8, 23).unwrap();
        assert_eq!(slots.len(), 15);
        assert_eq!(slots[0].time(), time("08:00")..time("09:00"));
        assert_eq!(slots[14].time(), time("22:00")..time("23:00"));
        assert_eq!(slots[0].to_string(), "08:00-09:00");
    }

    #[test]
    fn test_generate_slots_invalid_hours() {
        assert_eq!(
            generate_slots(10, 10),
            Err(SlotError::InvalidHours { open: 10, close: 10 })
        );
        assert!(generate_slots(8, 24).is_err());
    }

    #[test]
    fn test_check_continuous() {
        let selected = ["10:00", "09:00", "11:00"].map(time);
        assert_eq!(
            check_continuous(selected),
            Ok(time("09:00")..time("12:00"))
        );
    }

    #[test]
    fn test_check_continuous_gap() {
        let selected = ["09:00", "11:00"].map(time);
        assert_eq!(
            check_continuous(selected),
            Err(SelectionError::NonContiguous)
        );
    }

    #[test]
    fn test_check_continuous_empty() {
        assert_eq!(
            check_continuous(Vec::new()),
            Err(SelectionError::EmptySelection)
        );
    }

    #[test]
    fn test_check_continuous_duplicates() {
        let selected = ["09:00", "09:00", "10:00"].map(time);
        assert_eq!(
            check_continuous(selected),
            Ok(time("09:00")..time("11:00"))
        );
    }

    #[test]
    fn test_check_continuous_half_hour_gap() {
        let selected = ["09:00", "09:30"].map(time);
        assert_eq!(
            check_continuous(selected),
            Err(SelectionError::NonContiguous)
        );
    }

    #[test]
    fn test_check_continuous_midnight() {
        let selected = ["22:00", "23:00"].map(time);
        assert_eq!(
            check_continuous(selected),
            Err(SelectionError::CrossesMidnight)
        );
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time(" 08:00 ").unwrap(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert!(parse_time("8am").is_err());
    }
}
