use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayWindow {
    pub day: String,
    pub start: String,
    pub end: String,
}

/// A business's weekly schedule: zero or more open windows per weekday,
/// stored as `{"slots":[{"day":"mon","start":"09:00","end":"17:00"}]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHours {
    pub slots: Vec<DayWindow>,
}

impl WorkingHours {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let hours: WorkingHours = serde_json::from_str(s)?;
        for slot in &hours.slots {
            parse_weekday(&slot.day)?;
            let start = parse_time(&slot.start)?;
            let end = parse_time(&slot.end)?;
            if start >= end {
                return Err(anyhow::anyhow!(
                    "window must end after it starts: {}-{}",
                    slot.start,
                    slot.end
                ));
            }
        }
        Ok(hours)
    }

    /// Open windows for a calendar date, sorted by start time. Empty means
    /// closed that day.
    pub fn windows_for(&self, date: NaiveDate) -> Vec<(NaiveTime, NaiveTime)> {
        let weekday = date.format("%a").to_string().to_lowercase();

        let mut windows: Vec<(NaiveTime, NaiveTime)> = self
            .slots
            .iter()
            .filter(|slot| slot.day.to_lowercase() == weekday)
            .filter_map(|slot| {
                let start = parse_time(&slot.start).ok()?;
                let end = parse_time(&slot.end).ok()?;
                Some((start, end))
            })
            .collect();

        windows.sort_by_key(|(start, _)| *start);
        windows
    }

    pub fn to_human_readable(&self) -> String {
        if self.slots.is_empty() {
            return String::new();
        }

        let day_order = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

        let mut sorted = self.slots.clone();
        sorted.sort_by_key(|s| {
            day_order
                .iter()
                .position(|d| *d == s.day.to_lowercase())
                .unwrap_or(7)
        });

        sorted
            .iter()
            .map(|s| format!("{}: {}-{}", capitalize(&s.day), s.start, s.end))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + &c.as_str().to_lowercase(),
    }
}

fn parse_weekday(s: &str) -> anyhow::Result<()> {
    match s.to_lowercase().as_str() {
        "mon" | "tue" | "wed" | "thu" | "fri" | "sat" | "sun" => Ok(()),
        _ => Err(anyhow::anyhow!("invalid weekday: {s}")),
    }
}

fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| anyhow::anyhow!("invalid time: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    #[test]
    fn test_parse_valid_json() {
        let json = r#"{"slots":[{"day":"mon","start":"09:00","end":"17:00"},{"day":"tue","start":"09:00","end":"17:00"}]}"#;
        let hours = WorkingHours::from_json(json).unwrap();
        assert_eq!(hours.slots.len(), 2);
        assert_eq!(hours.slots[0].day, "mon");
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(WorkingHours::from_json("not json").is_err());
    }

    #[test]
    fn test_parse_invalid_day() {
        let json = r#"{"slots":[{"day":"xyz","start":"09:00","end":"17:00"}]}"#;
        assert!(WorkingHours::from_json(json).is_err());
    }

    #[test]
    fn test_parse_invalid_time() {
        let json = r#"{"slots":[{"day":"mon","start":"25:00","end":"17:00"}]}"#;
        assert!(WorkingHours::from_json(json).is_err());
    }

    #[test]
    fn test_parse_inverted_window() {
        let json = r#"{"slots":[{"day":"mon","start":"17:00","end":"09:00"}]}"#;
        assert!(WorkingHours::from_json(json).is_err());
    }

    #[test]
    fn test_windows_for_open_day() {
        let json = r#"{"slots":[{"day":"mon","start":"09:00","end":"17:00"}]}"#;
        let hours = WorkingHours::from_json(json).unwrap();
        // 2030-01-07 is a Monday
        let windows = hours.windows_for(date("2030-01-07"));
        assert_eq!(windows, vec![(time("09:00"), time("17:00"))]);
    }

    #[test]
    fn test_windows_for_closed_day() {
        let json = r#"{"slots":[{"day":"mon","start":"09:00","end":"17:00"}]}"#;
        let hours = WorkingHours::from_json(json).unwrap();
        // 2030-01-08 is a Tuesday
        assert!(hours.windows_for(date("2030-01-08")).is_empty());
    }

    #[test]
    fn test_windows_sorted_split_day() {
        let json = r#"{"slots":[{"day":"mon","start":"14:00","end":"18:00"},{"day":"mon","start":"09:00","end":"12:00"}]}"#;
        let hours = WorkingHours::from_json(json).unwrap();
        let windows = hours.windows_for(date("2030-01-07"));
        assert_eq!(
            windows,
            vec![
                (time("09:00"), time("12:00")),
                (time("14:00"), time("18:00")),
            ]
        );
    }

    #[test]
    fn test_to_human_readable() {
        let json = r#"{"slots":[{"day":"fri","start":"10:00","end":"16:00"},{"day":"mon","start":"09:00","end":"17:00"}]}"#;
        let hours = WorkingHours::from_json(json).unwrap();
        assert_eq!(hours.to_human_readable(), "Mon: 09:00-17:00, Fri: 10:00-16:00");
    }
}
