//! Conversion stages: reshape or parse the value flowing through a chain
use async_trait::async_trait;
use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use rp_core::{BoxError, Context, SharedLogger, Stage, StageError};
use serde_json::Value;
use uuid::Uuid;

/// Outputs `input[key]`; null when the input is not an object or lacks the key.
pub struct FieldValue {
    key: String,
}

pub fn field_value(key: impl Into<String>) -> FieldValue {
    FieldValue { key: key.into() }
}

#[async_trait]
impl Stage for FieldValue {
    fn display(&self) -> String {
        format!("  => Value(\"{}\") =>", self.key)
    }

    async fn run(
        &self,
        input: Value,
        _ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        Ok(match input {
            Value::Object(mut map) => map.remove(&self.key).unwrap_or(Value::Null),
            _ => Value::Null,
        })
    }
}

/// Parses a string input as a UUID and outputs its canonical hyphenated form.
pub struct ToUuid;

pub fn to_uuid() -> ToUuid {
    ToUuid
}

#[async_trait]
impl Stage for ToUuid {
    fn display(&self) -> String {
        "  => .(Uuid) =>".to_string()
    }

    async fn run(
        &self,
        input: Value,
        _ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        let raw = input.as_str().ok_or("not a string")?;
        let id = Uuid::parse_str(raw)?;
        Ok(Value::String(id.hyphenated().to_string()))
    }

    fn on_error(&self, err: BoxError) -> StageError {
        StageError::bad_request(format!("Invalid: {}", err))
    }
}

/// Parses a string input with a `chrono` format string and outputs RFC 3339.
///
/// Layouts without an offset are read as UTC. Date-only layouts resolve to
/// midnight.
pub struct ToTime {
    layout: String,
}

pub fn to_time(layout: impl Into<String>) -> ToTime {
    ToTime {
        layout: layout.into(),
    }
}

#[async_trait]
impl Stage for ToTime {
    fn display(&self) -> String {
        "  => .(DateTime) =>".to_string()
    }

    async fn run(
        &self,
        input: Value,
        _ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        let raw = input.as_str().ok_or("not a string")?;
        let parsed = parse_time(raw, &self.layout, &Utc)?;
        Ok(Value::String(parsed.to_rfc3339()))
    }

    fn on_error(&self, err: BoxError) -> StageError {
        StageError::bad_request(format!("Invalid: {}", err))
    }
}

/// Like [`ToTime`], but layouts without an offset are read in the time zone
/// named under `ctx_zone_key`.
///
/// The name is an IANA zone (`"America/New_York"`) or a fixed offset
/// (`"+02:00"`). An empty key, a missing entry or an unknown name falls back
/// to UTC. Local times skipped by a DST change use the offset in effect
/// before the change; repeated ones resolve to the earlier instant.
pub struct ToTimeInLocation {
    ctx_zone_key: String,
    layout: String,
}

pub fn to_time_in_location(ctx_zone_key: impl Into<String>, layout: impl Into<String>) -> ToTimeInLocation {
    ToTimeInLocation {
        ctx_zone_key: ctx_zone_key.into(),
        layout: layout.into(),
    }
}

enum Zone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl Zone {
    fn resolve(name: &str) -> Self {
        if let Ok(tz) = name.parse::<Tz>() {
            return Zone::Named(tz);
        }
        Zone::Fixed(parse_offset(name).unwrap_or_else(|| Utc.fix()))
    }
}

impl ToTimeInLocation {
    fn zone_name(&self, ctx: &Context) -> Option<String> {
        if self.ctx_zone_key.is_empty() {
            return None;
        }
        match ctx.get_value(&self.ctx_zone_key) {
            Some(Value::String(name)) => Some(name),
            _ => ctx
                .get::<String>(&self.ctx_zone_key)
                .map(|name| name.as_str().to_string()),
        }
    }
}

#[async_trait]
impl Stage for ToTimeInLocation {
    fn display(&self) -> String {
        "  => .(DateTime) =>".to_string()
    }

    async fn run(
        &self,
        input: Value,
        ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        let raw = input.as_str().ok_or("not a string")?;

        let zone = self
            .zone_name(ctx)
            .map_or(Zone::Fixed(Utc.fix()), |name| Zone::resolve(&name));

        let parsed = match zone {
            Zone::Named(tz) => parse_time(raw, &self.layout, &tz)?,
            Zone::Fixed(offset) => parse_time(raw, &self.layout, &offset)?,
        };
        Ok(Value::String(parsed.to_rfc3339()))
    }

    fn on_error(&self, err: BoxError) -> StageError {
        StageError::bad_request(format!("Invalid: {}", err))
    }
}

fn parse_time<Z: TimeZone>(raw: &str, layout: &str, zone: &Z) -> Result<DateTime<FixedOffset>, BoxError> {
    if let Ok(with_offset) = DateTime::parse_from_str(raw, layout) {
        return Ok(with_offset);
    }

    let naive = match NaiveDateTime::parse_from_str(raw, layout) {
        Ok(naive) => naive,
        Err(err) => match NaiveDate::parse_from_str(raw, layout) {
            Ok(date) => date.and_hms_opt(0, 0, 0).ok_or("invalid midnight")?,
            Err(_) => return Err(err.into()),
        },
    };

    let local = match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(first, second) => first.min(second),
        LocalResult::None => {
            let before = zone
                .from_local_datetime(&(naive - Duration::days(1)))
                .earliest()
                .ok_or_else(|| format!("nonexistent local time {}", naive))?;
            let utc = naive - Duration::seconds(i64::from(before.offset().fix().local_minus_utc()));
            zone.from_utc_datetime(&utc)
        }
    };

    Ok(local.with_timezone(&local.offset().fix()))
}

/// `Z`, `UTC`, `+HH:MM`, `-HH:MM` or `+HHMM`.
fn parse_offset(raw: &str) -> Option<FixedOffset> {
    if raw.eq_ignore_ascii_case("utc") || raw == "Z" {
        return Some(Utc.fix());
    }

    let (sign, rest) = match *raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
