//! Track-selection grammar: `all | N(,N|a-b)*` with 1-based bounds.

use std::collections::BTreeSet;

use crate::error::Error;

/// Parse a selection string against `max` tracks. An empty input returns
/// `None` (caller decides between "everything" and a prompt).
pub fn parse_track_selection(input: &str, max: usize) -> Result<Option<Vec<usize>>, Error> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.eq_ignore_ascii_case("all") {
        return Ok(Some((1..=max).collect()));
    }

    let mut selection = BTreeSet::new();
    for raw in trimmed.split(',') {
        let part = raw.trim();
        if part.is_empty() {
            continue;
        }
        if part.contains('-') {
            let Some((start_raw, end_raw)) = part.split_once('-') else {
                return Err(Error::selection(format!("invalid selection: {part}")));
            };
            let (Ok(start), Ok(end)) = (
                start_raw.trim().parse::<usize>(),
                end_raw.trim().parse::<usize>(),
            ) else {
                return Err(Error::selection(format!("invalid selection: {part}")));
            };
            if start < 1 || end > max || start > end {
                return Err(Error::selection(format!("range out of bounds: {part}")));
            }
            selection.extend(start..=end);
            continue;
        }

        let Ok(num) = part.parse::<usize>() else {
            return Err(Error::selection(format!("invalid selection: {part}")));
        };
        if num < 1 || num > max {
            return Err(Error::selection(format!("selection out of bounds: {part}")));
        }
        selection.insert(num);
    }

    Ok(Some(selection.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_none() {
        assert!(parse_track_selection("", 5).unwrap().is_none());
        assert!(parse_track_selection("   ", 5).unwrap().is_none());
    }

    #[test]
    fn all_expands_to_bounds() {
        assert_eq!(
            parse_track_selection("all", 5).unwrap().unwrap(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(
            parse_track_selection("ALL", 3).unwrap().unwrap(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn lists_and_ranges_merge_sorted() {
        assert_eq!(
            parse_track_selection("1,3-5", 5).unwrap().unwrap(),
            vec![1, 3, 4, 5]
        );
        assert_eq!(
            parse_track_selection("4, 2 ,2-3", 5).unwrap().unwrap(),
            vec![2, 3, 4]
        );
    }

    #[test]
    fn junk_tokens_are_rejected() {
        let err = parse_track_selection("1,3-5,2,all-ish", 5).unwrap_err();
        assert_eq!(err.to_string(), "invalid selection: all-ish");
    }

    #[test]
    fn bounds_are_enforced() {
        assert!(parse_track_selection("0", 5).is_err());
        assert!(parse_track_selection("6", 5).is_err());
        assert!(parse_track_selection("4-2", 5).is_err());
        assert!(parse_track_selection("1-6", 5).is_err());
    }
}
