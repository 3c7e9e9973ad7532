//! Best-effort field outcomes.
//!
//! Secondary lookups (contributors, releases, README, analysis) degrade
//! instead of failing. `Fetched` keeps the reason visible so that a field
//! missing because the upstream call failed is not confused with one that
//! simply does not exist or was never asked for.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Fetched<T> {
    /// The upstream returned a value.
    Value(T),
    /// The upstream answered, and there is nothing there (no release, no README).
    Absent,
    /// The lookup was attempted and failed; the message is for logs.
    Failed(String),
    /// The caller never asked for this field.
    NotRequested,
}

impl<T> Fetched<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Fetched::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&T> {
        match self {
            Fetched::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Fetched::Failed(_))
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.value().unwrap_or(default)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Fetched::Value(v) => Fetched::Value(f(v)),
            Fetched::Absent => Fetched::Absent,
            Fetched::Failed(e) => Fetched::Failed(e),
            Fetched::NotRequested => Fetched::NotRequested,
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<Option<T>, E>> for Fetched<T> {
    fn from(result: Result<Option<T>, E>) -> Self {
        match result {
            Ok(Some(v)) => Fetched::Value(v),
            Ok(None) => Fetched::Absent,
            Err(e) => Fetched::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_result() {
        let ok: Fetched<u32> = Ok::<_, String>(Some(3)).into();
        assert_eq!(ok, Fetched::Value(3));

        let none: Fetched<u32> = Ok::<_, String>(None).into();
        assert_eq!(none, Fetched::Absent);

        let err: Fetched<u32> = Err::<Option<u32>, _>("timeout").into();
        assert!(err.is_failed());
        assert_eq!(err.unwrap_or(0), 0);
    }

    #[test]
    fn test_absent_and_failed_are_distinct() {
        let absent: Fetched<i64> = Fetched::Absent;
        let failed: Fetched<i64> = Fetched::Failed("502".into());
        assert_ne!(absent, failed);
        assert!(!absent.is_failed());
        assert_eq!(absent.value(), None);
        assert_eq!(failed.value(), None);
    }
}
