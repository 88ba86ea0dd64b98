//! Daily schedules expressed in the `minute hour * * *` subset of cron.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};

/// Fire times within a UTC day, sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySchedule {
    times: Vec<NaiveTime>,
}

fn parse_field(field: &str, max: u32, name: &str) -> Result<Vec<u32>, String> {
    let mut values = Vec::new();
    for part in field.split(',') {
        let value: u32 = part
            .parse()
            .map_err(|_| format!("invalid {} value '{}'", name, part))?;
        if value > max {
            return Err(format!("{} value {} out of range 0-{}", name, value, max));
        }
        if !values.contains(&value) {
            values.push(value);
        }
    }
    Ok(values)
}

impl DailySchedule {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "expected 5 fields (minute hour * * *), got {}",
                fields.len()
            ));
        }
        if fields[2..].iter().any(|f| *f != "*") {
            return Err("only daily schedules are supported (day, month and weekday must be '*')"
                .to_string());
        }

        let minutes = parse_field(fields[0], 59, "minute")?;
        let hours = parse_field(fields[1], 23, "hour")?;

        let mut times: Vec<NaiveTime> = hours
            .iter()
            .flat_map(|h| {
                minutes
                    .iter()
                    .filter_map(move |m| NaiveTime::from_hms_opt(*h, *m, 0))
            })
            .collect();
        times.sort();

        Ok(Self { times })
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        for day in [today, today + Duration::days(1)] {
            for time in &self.times {
                let candidate = Utc.from_utc_datetime(&day.and_time(*time));
                if candidate > now {
                    return candidate;
                }
            }
        }
        // `parse` guarantees at least one time, so tomorrow always yields a candidate.
        now + Duration::days(1)
    }

    pub fn duration_until_next(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.next_after(now) - now)
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(1))
    }
}
