// psi/tdt.rs
//! TDT (0x70): short section, no CRC, 40-bit UTC time (MJD + BCD h/m/s).

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::constants::{table_id, SECTION_HEADER_SIZE};
use crate::error::ParseError;
use crate::psi::section::len12;

const UTC_TIME_SIZE: usize = 5;

fn mjd_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1858, 11, 17).unwrap_or_default()
}

fn to_bcd(v: u32) -> u8 {
    (((v / 10) << 4) | (v % 10)) as u8
}

fn from_bcd(v: u8) -> Option<u32> {
    let (hi, lo) = (v >> 4, v & 0x0F);
    (hi < 10 && lo < 10).then(|| (hi * 10 + lo) as u32)
}

/// Dates past MJD 0xFFFF (2038-04-22) saturate.
pub fn build_tdt(time: DateTime<Utc>) -> Vec<u8> {
    let days = time.date_naive().signed_duration_since(mjd_epoch()).num_days();
    let mjd = u16::try_from(days.max(0)).unwrap_or(u16::MAX);

    let mut buf = Vec::with_capacity(SECTION_HEADER_SIZE + UTC_TIME_SIZE);
    buf.push(table_id::TDT);
    buf.push(0x70); // syntax_indicator=0, reserved_future_use=1, reserved=11
    buf.push(UTC_TIME_SIZE as u8);
    buf.extend_from_slice(&mjd.to_be_bytes());
    buf.push(to_bcd(time.hour()));
    buf.push(to_bcd(time.minute()));
    buf.push(to_bcd(time.second()));
    buf
}

pub fn parse_tdt(section: &[u8]) -> Result<DateTime<Utc>, ParseError> {
    if section.len() < SECTION_HEADER_SIZE {
        return Err(ParseError::ShortBuffer);
    }
    if section[0] != table_id::TDT {
        return Err(ParseError::WrongTableId { expected: table_id::TDT, found: section[0] });
    }
    if len12(section[1], section[2]) < UTC_TIME_SIZE
        || section.len() < SECTION_HEADER_SIZE + UTC_TIME_SIZE
    {
        return Err(ParseError::LengthOverrun);
    }
    let t = &section[SECTION_HEADER_SIZE..SECTION_HEADER_SIZE + UTC_TIME_SIZE];
    let mjd = u16::from_be_bytes([t[0], t[1]]);

    let date = mjd_epoch()
        .checked_add_days(Days::new(mjd as u64))
        .ok_or(ParseError::InvalidField("mjd"))?;
    let time = match (from_bcd(t[2]), from_bcd(t[3]), from_bcd(t[4])) {
        (Some(h), Some(m), Some(s)) => NaiveTime::from_hms_opt(h, m, s),
        _ => None,
    }
    .ok_or(ParseError::InvalidField("utc_time"))?;

    Ok(NaiveDateTime::new(date, time).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn known_date() {
        // EN 300 468 annex C example: 1993-10-13 12:45:00 → MJD 0xC079
        let t = Utc.with_ymd_and_hms(1993, 10, 13, 12, 45, 0).unwrap();
        let s = build_tdt(t);
        assert_eq!(s, vec![0x70, 0x70, 0x05, 0xC0, 0x79, 0x12, 0x45, 0x00]);
        assert_eq!(parse_tdt(&s).unwrap(), t);
    }

    #[test]
    fn bad_bcd() {
        let s = [0x70, 0x70, 0x05, 0xC0, 0x79, 0x1A, 0x45, 0x00];
        assert_eq!(parse_tdt(&s).err(), Some(ParseError::InvalidField("utc_time")));
    }

    #[test]
    fn truncated() {
        assert_eq!(parse_tdt(&[0x70, 0x70, 0x05, 0xC0]).err(), Some(ParseError::LengthOverrun));
        assert!(matches!(parse_tdt(&[0x73, 0x70, 0x05]), Err(ParseError::WrongTableId { .. })));
    }
}
