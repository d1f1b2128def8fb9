use serde::{Deserialize, Serialize};

/// Recorded visits for a single resource path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitCount {
    pub total: u64,
}

impl VisitCount {
    pub fn incremented(self) -> Self {
        Self {
            total: self.total.saturating_add(1),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::models::decode_or_default;

    #[test]
    fn test_increment() {
        let count = VisitCount::default().incremented().incremented();
        assert_eq!(count, VisitCount { total: 2 });
    }

    #[test]
    fn test_decode_tolerates_bad_records() {
        let absent: VisitCount = decode_or_default("/", None);
        let negative: VisitCount = decode_or_default("/", Some(r#"{"total":-4}"#));
        let garbage: VisitCount = decode_or_default("/", Some("not json"));
        let stored: VisitCount = decode_or_default("/", Some(r#"{"total":41}"#));

        assert_eq!(absent.total, 0);
        assert_eq!(negative.total, 0);
        assert_eq!(garbage.total, 0);
        assert_eq!(stored.total, 41);
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(VisitCount { total: 7 }).unwrap();
        assert_eq!(json, serde_json::json!({ "total": 7 }));
    }
}
