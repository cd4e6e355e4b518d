//! Reference time values.
//!
//! `Time` is a second-precision UTC timestamp with a total order and a
//! stable 7-byte binary encoding. `PartialTime` is a truncated timestamp as
//! written in matchers (`2010-06` means the whole of June 2010): it expands
//! to an inclusive lower bound and an exclusive upper bound.

use std::fmt;

use chrono::{Datelike, Timelike};

use crate::core::codec::{Decoder, Encoder};
use crate::error::{ArkiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    pub ye: i32,
    pub mo: u32,
    pub da: u32,
    pub ho: u32,
    pub mi: u32,
    pub se: u32,
}

impl Time {
    pub fn new(ye: i32, mo: u32, da: u32, ho: u32, mi: u32, se: u32) -> Self {
        Self {
            ye,
            mo,
            da,
            ho,
            mi,
            se,
        }
    }

    /// Current instant, UTC.
    pub fn now() -> Self {
        Self::from_chrono(chrono::Utc::now().naive_utc())
    }

    pub fn from_chrono(dt: chrono::NaiveDateTime) -> Self {
        Self {
            ye: dt.year(),
            mo: dt.month(),
            da: dt.day(),
            ho: dt.hour(),
            mi: dt.minute(),
            se: dt.second(),
        }
    }

    pub fn to_chrono(&self) -> Option<chrono::NaiveDateTime> {
        chrono::NaiveDate::from_ymd_opt(self.ye, self.mo, self.da)
            .and_then(|d| d.and_hms_opt(self.ho, self.mi, self.se))
    }

    /// `YYYY-MM-DD HH:MM:SS`, the form stored in the index reftime column.
    /// String comparison over this form matches the time order.
    pub fn to_sql(&self) -> String {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.ye, self.mo, self.da, self.ho, self.mi, self.se
        )
    }

    /// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SSZ` and truncated
    /// forms (missing fields default to the start of their interval).
    pub fn parse(s: &str) -> Result<Time> {
        let p = PartialTime::parse(s)?;
        Ok(p.lower_bound())
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.add_u16(self.ye as u16);
        enc.add_u8(self.mo as u8);
        enc.add_u8(self.da as u8);
        enc.add_u8(self.ho as u8);
        enc.add_u8(self.mi as u8);
        enc.add_u8(self.se as u8);
    }

    pub fn decode(dec: &mut Decoder) -> Result<Time> {
        Ok(Time {
            ye: dec.pop_u16("year")? as i32,
            mo: dec.pop_u8("month")? as u32,
            da: dec.pop_u8("day")? as u32,
            ho: dec.pop_u8("hour")? as u32,
            mi: dec.pop_u8("minute")? as u32,
            se: dec.pop_u8("second")? as u32,
        })
    }

    /// First instant of the month `months` months after this one.
    pub fn start_of_month(&self) -> Time {
        Time::new(self.ye, self.mo, 1, 0, 0, 0)
    }

    pub fn next_month(&self) -> Time {
        if self.mo == 12 {
            Time::new(self.ye + 1, 1, 1, 0, 0, 0)
        } else {
            Time::new(self.ye, self.mo + 1, 1, 0, 0, 0)
        }
    }

    /// Whole days elapsed from `self` to `reference` (negative if in the
    /// future). Used for the archive/delete age thresholds.
    pub fn days_until(&self, reference: &Time) -> i64 {
        match (self.to_chrono(), reference.to_chrono()) {
            (Some(a), Some(b)) => (b.date() - a.date()).num_days(),
            _ => 0,
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            self.ye, self.mo, self.da, self.ho, self.mi, self.se
        )
    }
}

// ── PartialTime ────────────────────────────────────────────────────

/// A timestamp truncated to some precision: year, month, day, hour, minute
/// or second. Fields are defined left to right without gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialTime {
    pub ye: i32,
    pub mo: Option<u32>,
    pub da: Option<u32>,
    pub ho: Option<u32>,
    pub mi: Option<u32>,
    pub se: Option<u32>,
}

impl PartialTime {
    pub fn from_time(t: &Time) -> Self {
        Self {
            ye: t.ye,
            mo: Some(t.mo),
            da: Some(t.da),
            ho: Some(t.ho),
            mi: Some(t.mi),
            se: Some(t.se),
        }
    }

    /// Parse `YYYY[-MM[-DD[ HH[:MM[:SS]]]]]`, with `T` accepted as the date
    /// and time separator and an optional trailing `Z`.
    pub fn parse(s: &str) -> Result<PartialTime> {
        let s = s.trim().trim_end_matches('Z');
        let (date_part, time_part) = match s.find(|c| c == 'T' || c == ' ') {
            Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
            None => (s, None),
        };

        let mut date_fields = date_part.split('-');
        let ye = parse_field(date_fields.next(), "year")?
            .ok_or_else(|| ArkiError::parse("reftime", "missing year"))? as i32;
        let mo = parse_field(date_fields.next(), "month")?;
        let da = parse_field(date_fields.next(), "day")?;
        if date_fields.next().is_some() {
            return Err(ArkiError::parse("reftime", "too many date fields"));
        }

        let (mut ho, mut mi, mut se) = (None, None, None);
        if let Some(time_part) = time_part {
            if da.is_none() {
                return Err(ArkiError::parse("reftime", "time given without a day"));
            }
            let mut time_fields = time_part.split(':');
            ho = parse_field(time_fields.next(), "hour")?;
            mi = parse_field(time_fields.next(), "minute")?;
            se = parse_field(time_fields.next(), "second")?;
            if time_fields.next().is_some() {
                return Err(ArkiError::parse("reftime", "too many time fields"));
            }
        }

        let res = PartialTime {
            ye,
            mo,
            da,
            ho,
            mi,
            se,
        };
        res.validate()?;
        Ok(res)
    }

    fn validate(&self) -> Result<()> {
        let checks = [
            (self.mo, 1u32, 12u32, "month"),
            (self.da, 1, 31, "day"),
            (self.ho, 0, 23, "hour"),
            (self.mi, 0, 59, "minute"),
            (self.se, 0, 59, "second"),
        ];
        for (value, lo, hi, name) in checks {
            if let Some(v) = value {
                if v < lo || v > hi {
                    return Err(ArkiError::parse(
                        "reftime",
                        format!("{name} {v} out of range {lo}..={hi}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// First instant of the interval this truncation denotes.
    pub fn lower_bound(&self) -> Time {
        Time {
            ye: self.ye,
            mo: self.mo.unwrap_or(1),
            da: self.da.unwrap_or(1),
            ho: self.ho.unwrap_or(0),
            mi: self.mi.unwrap_or(0),
            se: self.se.unwrap_or(0),
        }
    }

    /// First instant after the interval this truncation denotes.
    pub fn upper_bound_exclusive(&self) -> Time {
        let mut t = self.lower_bound();
        if self.se.is_some() {
            add_seconds(&mut t, 1);
        } else if self.mi.is_some() {
            add_seconds(&mut t, 60);
        } else if self.ho.is_some() {
            add_seconds(&mut t, 3600);
        } else if self.da.is_some() {
            add_seconds(&mut t, 86400);
        } else if self.mo.is_some() {
            t = t.next_month();
        } else {
            t = Time::new(t.ye + 1, 1, 1, 0, 0, 0);
        }
        t
    }
}

impl fmt::Display for PartialTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.ye)?;
        if let Some(mo) = self.mo {
            write!(f, "-{mo:02}")?;
        }
        if let Some(da) = self.da {
            write!(f, "-{da:02}")?;
        }
        if let Some(ho) = self.ho {
            write!(f, " {ho:02}")?;
        }
        if let Some(mi) = self.mi {
            write!(f, ":{mi:02}")?;
        }
        if let Some(se) = self.se {
            write!(f, ":{se:02}")?;
        }
        Ok(())
    }
}

fn parse_field(field: Option<&str>, name: &str) -> Result<Option<u32>> {
    match field {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ArkiError::parse("reftime", format!("invalid {name}: `{s}`"))),
    }
}

fn add_seconds(t: &mut Time, seconds: i64) {
    if let Some(dt) = t.to_chrono() {
        *t = Time::from_chrono(dt + chrono::Duration::seconds(seconds));
    }
}

// ── Tests ──────────────────────────────────────────────────────────
