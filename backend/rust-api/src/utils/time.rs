use chrono::{DateTime, Duration, Utc};
use mongodb::bson::DateTime as BsonDateTime;

pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

/// Current time at the precision the document store keeps (milliseconds).
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// `candidate` if it is later than `previous`, otherwise one millisecond past it.
pub fn advance(previous: DateTime<Utc>, candidate: DateTime<Utc>) -> DateTime<Utc> {
    if candidate > previous {
        candidate
    } else {
        previous + Duration::milliseconds(1)
    }
}

/// Timestamp for a write to a record last touched at `previous`.
pub fn next_updated_at(previous: DateTime<Utc>) -> DateTime<Utc> {
    advance(previous, now_millis())
}
