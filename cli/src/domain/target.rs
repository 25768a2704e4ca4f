//! Target filtering and selection.
//!
//! Pure functions only: the interactive choice is injected by the caller.

use std::str::FromStr;

use unirun_common::{Architecture, Platform, Target};

use crate::domain::error::SelectionError;

/// Optional architecture, platform and name filters. Empty strings match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetFilters {
    pub architecture: String,
    pub platform: String,
    pub name: String,
}

impl TargetFilters {
    /// Reject `--target` combined with `--arch`/`--plat`.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::MutuallyExclusive`] when both are given.
    pub fn validate(&self) -> Result<(), SelectionError> {
        if (!self.architecture.is_empty() || !self.platform.is_empty()) && !self.name.is_empty() {
            return Err(SelectionError::MutuallyExclusive);
        }
        Ok(())
    }

    /// Whether `target` satisfies every provided filter.
    #[must_use]
    pub fn matches(&self, target: &Target) -> bool {
        matches_named::<Architecture>(&self.architecture, &target.architecture)
            && matches_named::<Platform>(&self.platform, &target.platform)
            && matches_filter(&self.name, &target.name)
    }
}

fn matches_filter(filter: &str, value: &str) -> bool {
    filter.is_empty() || filter == value
}

/// Like [`matches_filter`], but aliases (`amd64`, `kvm`) compare equal to
/// their canonical names when both sides parse.
fn matches_named<T: FromStr + PartialEq>(filter: &str, value: &str) -> bool {
    if matches_filter(filter, value) {
        return true;
    }
    match (filter.parse::<T>(), value.parse::<T>()) {
        (Ok(wanted), Ok(actual)) => wanted == actual,
        _ => false,
    }
}

/// Keep the targets matching `filters`, preserving order.
#[must_use]
pub fn filter(targets: &[Target], filters: &TargetFilters) -> Vec<Target> {
    targets
        .iter()
        .filter(|t| filters.matches(t))
        .cloned()
        .collect()
}

/// Narrow `targets` to exactly one.
///
/// With more than one match, `choose` is asked for an index when
/// `interactive` is true; otherwise the selection is ambiguous.
///
/// # Errors
///
/// Returns a [`SelectionError`] when nothing matches, when several targets
/// match without an interactive chooser, or when the chooser fails.
pub fn select<F>(
    targets: &[Target],
    filters: &TargetFilters,
    interactive: bool,
    choose: F,
) -> Result<Target, SelectionError>
where
    F: FnOnce(&[Target]) -> Result<usize, String>,
{
    filters.validate()?;

    let mut matching = filter(targets, filters);
    match matching.len() {
        0 => Err(SelectionError::NoTarget {
            arch: filters.architecture.clone(),
            plat: filters.platform.clone(),
            name: filters.name.clone(),
        }),
        1 => Ok(matching.remove(0)),
        count if !interactive => Err(SelectionError::Ambiguous { count }),
        count => {
            let index = choose(&matching).map_err(SelectionError::Prompt)?;
            if index >= count {
                return Err(SelectionError::InvalidChoice { index, count });
            }
            Ok(matching.swap_remove(index))
        }
    }
}
