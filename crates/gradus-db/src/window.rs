use gradus_common::{Error, Result};

use crate::direction::Direction;
use crate::step::Step;

/// Compute the ordered steps one migrate call should execute.
///
/// Forward windows start just past `current` and ascend; backward windows
/// start at `current` and descend. With no position the walk starts at the
/// first step, so callers must not ask for a backward window from an empty
/// position.
pub fn select_window<'a>(
    steps: &'a [Step],
    current: Option<&str>,
    direction: Direction,
) -> Result<Vec<&'a Step>> {
    let forward = direction.is_forward();
    let mut index = match current {
        None => 0,
        Some(name) => {
            let found = steps
                .iter()
                .position(|s| s.name() == name)
                .ok_or_else(|| Error::UnknownPosition(name.to_string()))?;
            if forward { found + 1 } else { found }
        }
    };

    let mut remaining = direction.budget();
    let mut window = Vec::new();
    while remaining > 0 && index < steps.len() {
        window.push(&steps[index]);
        remaining -= 1;
        if forward {
            index += 1;
        } else if index == 0 {
            break;
        } else {
            index -= 1;
        }
    }

    Ok(window)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;
    use crate::direction::Span;

    fn steps(names: &[&str]) -> Vec<Step> {
        names
            .iter()
            .map(|n| {
                Step::new(*n)
                    .apply(|_conn: &Connection| Ok(()))
                    .revert(|_conn: &Connection| Ok(()))
            })
            .collect()
    }

    fn names(window: Vec<&Step>) -> Vec<&str> {
        window.into_iter().map(Step::name).collect()
    }

    #[test]
    fn forward_from_empty_starts_at_first_step() {
        let steps = steps(&["000", "001", "002"]);
        let window = select_window(&steps, None, Direction::UP_ALL).unwrap();
        assert_eq!(names(window), ["000", "001", "002"]);
    }

    #[test]
    fn forward_skips_the_current_step() {
        let steps = steps(&["000", "001", "002"]);
        let window = select_window(&steps, Some("000"), Direction::UP_ONE).unwrap();
        assert_eq!(names(window), ["001"]);
    }

    #[test]
    fn forward_at_last_step_is_empty() {
        let steps = steps(&["000", "001"]);
        let window = select_window(&steps, Some("001"), Direction::UP_ALL).unwrap();
        assert!(window.is_empty());
    }

    #[test]
    fn backward_starts_at_current_and_descends() {
        let steps = steps(&["000", "001", "002", "003"]);
        let window =
            select_window(&steps, Some("002"), Direction::Down(Span::Steps(2))).unwrap();
        assert_eq!(names(window), ["002", "001"]);

        let window = select_window(&steps, Some("002"), Direction::DOWN_ALL).unwrap();
        assert_eq!(names(window), ["002", "001", "000"]);
    }

    #[test]
    fn backward_stops_at_first_step() {
        let steps = steps(&["000", "001"]);
        let window = select_window(&steps, Some("000"), Direction::DOWN_ALL).unwrap();
        assert_eq!(names(window), ["000"]);
    }

    #[test]
    fn budget_bounds_the_window() {
        let steps = steps(&["000", "001", "002", "003"]);
        let window = select_window(&steps, None, Direction::Up(Span::Steps(2))).unwrap();
        assert_eq!(names(window), ["000", "001"]);
    }

    #[test]
    fn empty_step_list_yields_empty_window() {
        let window = select_window(&[], None, Direction::UP_ALL).unwrap();
        assert!(window.is_empty());
    }

    #[test]
    fn undeclared_position_is_an_error() {
        let steps = steps(&["000"]);
        let err = select_window(&steps, Some("999"), Direction::UP_ONE).unwrap_err();
        assert!(matches!(err, Error::UnknownPosition(ref n) if n == "999"));
    }
}
