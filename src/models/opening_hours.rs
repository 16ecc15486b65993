use serde::{Deserialize, Serialize};

/// Salon opening hours for one weekday (0 = Monday .. 6 = Sunday).
/// Times are "HH:MM" strings; lexicographic order matches clock order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningHour {
    pub weekday: i32,
    pub start_time: String,
    pub end_time: String,
    pub is_closed: bool,
}

pub const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

impl OpeningHour {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0..=6).contains(&self.weekday) {
            return Err(anyhow::anyhow!("invalid weekday: {}", self.weekday));
        }
        parse_time(&self.start_time)?;
        parse_time(&self.end_time)?;
        if !self.is_closed && self.end_time <= self.start_time {
            return Err(anyhow::anyhow!("closing time must be after opening time"));
        }
        Ok(())
    }

    pub fn to_human_readable(&self) -> String {
        let day = WEEKDAY_NAMES[self.weekday as usize];
        if self.is_closed {
            format!("{day}: Closed")
        } else {
            format!("{day}: {}-{}", self.start_time, self.end_time)
        }
    }
}

fn parse_time(s: &str) -> anyhow::Result<()> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("invalid time format: {s}"));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid hour in: {s}"))?;
    let minute: u32 = parts[1]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid minute in: {s}"))?;
    if hour > 23 || minute > 59 {
        return Err(anyhow::anyhow!("time out of range: {s}"));
    }
    Ok(())
}
