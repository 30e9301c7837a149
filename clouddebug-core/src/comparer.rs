//! Display ordering for server breakpoints
//!
//! Pending breakpoints come first, ordered by location. Final breakpoints follow,
//! most recently finalized first.

use std::cmp::Ordering;

use crate::types::{ServerBreakpoint, SourceLocation, Timestamp};

/// Total order over breakpoints for list presentation.
pub fn compare(a: &ServerBreakpoint, b: &ServerBreakpoint) -> Ordering {
    match (a.final_time.as_ref(), b.final_time.as_ref()) {
        (None, None) => compare_locations(a.location.as_ref(), b.location.as_ref()),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a_time), Some(b_time)) => compare_final_times(a_time, b_time),
    }
}

/// Sort in place with [`compare`]. The sort is stable.
pub fn sort_breakpoints(breakpoints: &mut [ServerBreakpoint]) {
    breakpoints.sort_by(compare);
}

fn compare_locations(a: Option<&SourceLocation>, b: Option<&SourceLocation>) -> Ordering {
    let a = a.filter(|l| l.is_valid());
    let b = b.filter(|l| l.is_valid());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let a_path = a.path.as_deref().unwrap_or_default();
            let b_path = b.path.as_deref().unwrap_or_default();
            a_path
                .cmp(b_path)
                .then_with(|| a.line.unwrap_or(0).cmp(&b.line.unwrap_or(0)))
        }
    }
}

// Descending: later seconds first, then later nanos.
fn compare_final_times(a: &Timestamp, b: &Timestamp) -> Ordering {
    b.cmp(a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(path: &str, line: i32) -> ServerBreakpoint {
        ServerBreakpoint::at(path, line)
    }

    fn finished(seconds: i64, nanos: i32) -> ServerBreakpoint {
        ServerBreakpoint {
            is_final_state: true,
            final_time: Some(Timestamp::new(seconds, nanos)),
            ..Default::default()
        }
    }

    fn invalid() -> ServerBreakpoint {
        ServerBreakpoint {
            location: Some(SourceLocation {
                path: Some(String::new()),
                line: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_final_time_descending_by_nanos() {
        let a = finished(100, 0);
        let b = finished(100, 500);
        assert_eq!(compare(&b, &a), Ordering::Less);
        assert_eq!(compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_final_time_descending_by_seconds() {
        let older = finished(99, 999);
        let newer = finished(100, 0);
        assert_eq!(compare(&newer, &older), Ordering::Less);
    }

    #[test]
    fn test_pending_by_path_then_line() {
        let a = pending("B.java", 5);
        let b = pending("A.java", 1);
        assert_eq!(compare(&b, &a), Ordering::Less);

        let c = pending("A.java", 7);
        assert_eq!(compare(&b, &c), Ordering::Less);
        assert_eq!(compare(&c, &c.clone()), Ordering::Equal);
    }

    #[test]
    fn test_pending_before_final() {
        let p = pending("Z.java", 100);
        let f = finished(1, 0);
        assert_eq!(compare(&p, &f), Ordering::Less);
        assert_eq!(compare(&f, &p), Ordering::Greater);
    }

    #[test]
    fn test_invalid_location_sorts_after_valid() {
        let valid = pending("A.java", 1);
        assert_eq!(compare(&invalid(), &valid), Ordering::Greater);
        assert_eq!(compare(&valid, &invalid()), Ordering::Less);
        assert_eq!(compare(&invalid(), &ServerBreakpoint::default()), Ordering::Equal);
    }

    #[test]
    fn test_antisymmetric_over_mixed_set() {
        let set = vec![
            pending("B.java", 5),
            pending("A.java", 1),
            pending("A.java", 2),
            invalid(),
            finished(100, 0),
            finished(100, 500),
            finished(5, 0),
        ];
        for a in &set {
            for b in &set {
                assert_eq!(compare(a, b), compare(b, a).reverse());
            }
        }
    }

    #[test]
    fn test_sort_is_independent_of_insertion_order() {
        let mut forward = vec![
            finished(100, 0),
            pending("B.java", 5),
            finished(100, 500),
            pending("A.java", 1),
        ];
        let mut backward: Vec<_> = forward.iter().cloned().rev().collect();
        sort_breakpoints(&mut forward);
        sort_breakpoints(&mut backward);
        assert_eq!(forward, backward);
        assert_eq!(forward[0].path(), Some("A.java"));
        assert_eq!(forward[1].path(), Some("B.java"));
        assert_eq!(forward[2].final_time, Some(Timestamp::new(100, 500)));
        assert_eq!(forward[3].final_time, Some(Timestamp::new(100, 0)));
    }
}
