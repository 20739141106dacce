//! 时间工具 - 时钟抽象与日期范围转换
//!
//! 所有时间戳统一为 UTC Unix 毫秒。日期字符串 (YYYY-MM-DD) 只在
//! 入口层 (CLI 参数、HTTP query) 转换，存储层只接收 `i64`。

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::NaiveDate;

use super::{AppError, AppResult};

pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// 时钟接口
///
/// 令牌过期判断与审计保留期计算都经由它读取当前时间，
/// 测试中用 [`ManualClock`] 替换。
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// 当前 Unix 毫秒
    fn now_millis(&self) -> i64;

    /// 当前 Unix 秒
    fn now_secs(&self) -> i64 {
        self.now_millis().div_euclid(1000)
    }
}

pub type SharedClock = Arc<dyn Clock>;

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        shared::util::now_millis()
    }
}

/// 手动推进的时钟 (测试用)
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// 从 `YYYY-MM-DD` 当天零点 (UTC) 开始
    pub fn at_date(date: &str) -> AppResult<Self> {
        Ok(Self::new(day_start_millis(parse_date(date)?)))
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance_millis(&self, delta: i64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_millis(secs * 1000);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

/// 解析日期字符串 (YYYY-MM-DD)
pub fn parse_date(date: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::validation(format!("Invalid date format: {} (expected YYYY-MM-DD)", date))
            .with_detail("value", date)
    })
}

/// 日期开始 (00:00:00 UTC) → Unix millis
pub fn day_start_millis(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN)
        .and_utc()
        .timestamp_millis()
}

/// 日期结束 → 次日 00:00:00 UTC 的 Unix millis
///
/// 调用方使用 `< end` (不含) 语义，使结束日整天都包含在范围内。
pub fn day_end_millis(date: NaiveDate) -> i64 {
    day_start_millis(date) + MILLIS_PER_DAY
}

/// 可选的 `[start, end]` 日期对 → 毫秒半开区间 `[from, to)`
///
/// 空字符串视为未提供；`start > end` 返回校验错误。
pub fn date_range_millis(
    start: Option<&str>,
    end: Option<&str>,
) -> AppResult<(Option<i64>, Option<i64>)> {
    let start = start
        .filter(|s| !s.trim().is_empty())
        .map(parse_date)
        .transpose()?;
    let end = end
        .filter(|s| !s.trim().is_empty())
        .map(parse_date)
        .transpose()?;

    if let (Some(s), Some(e)) = (start, end)
        && s > e
    {
        return Err(AppError::validation(format!(
            "Start date {} is after end date {}",
            s, e
        )));
    }

    Ok((start.map(day_start_millis), end.map(day_end_millis)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_bounds() {
        let date = parse_date("2024-01-01").unwrap();
        assert_eq!(day_start_millis(date), 1_704_067_200_000);
        assert_eq!(day_end_millis(date), 1_704_067_200_000 + MILLIS_PER_DAY);
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("01/02/2024").is_err());
        assert!(parse_date("2024-13-01").is_err());
    }

    #[test]
    fn test_date_range_blank_is_unbounded() {
        let (from, to) = date_range_millis(Some(""), None).unwrap();
        assert!(from.is_none());
        assert!(to.is_none());
    }

    #[test]
    fn test_date_range_start_after_end() {
        let err = date_range_millis(Some("2024-01-03"), Some("2024-01-01")).unwrap_err();
        assert_eq!(err.code, shared::ErrorCode::ValidationFailed);
    }

    #[test]
    fn test_same_day_range_covers_whole_day() {
        let (from, to) = date_range_millis(Some("2024-01-02"), Some("2024-01-02")).unwrap();
        assert_eq!(to.unwrap() - from.unwrap(), MILLIS_PER_DAY);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::at_date("2024-01-05").unwrap();
        assert_eq!(clock.now_secs(), 1_704_412_800);
        clock.advance_secs(2);
        assert_eq!(clock.now_secs(), 1_704_412_802);
        clock.set_millis(0);
        assert_eq!(clock.now_millis(), 0);
    }
}
