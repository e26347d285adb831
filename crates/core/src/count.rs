//! Walk-driven file counting

use crate::error::{Error, Result};
use crate::traits::FileStore;
use crate::types::{Location, WalkInput};

/// Input for [`count`]
pub struct CountInput<'a> {
    /// The store that will be walked
    pub store: &'a dyn FileStore,
    /// The starting directory
    pub dir: Location,
    /// Optional regular expression; when present only matching paths count
    pub pattern: Option<String>,
}

/// Count the objects under a directory by recursively walking the store,
/// optionally restricted to paths matching a pattern.
pub async fn count(input: CountInput<'_>) -> Result<u64> {
    let matcher = match &input.pattern {
        Some(pattern) => Some(
            regex::Regex::new(pattern)
                .map_err(|e| Error::InvalidInput(format!("bad count pattern: {e}")))?,
        ),
        None => None,
    };

    let mut total: u64 = 0;
    input
        .store
        .walk(
            WalkInput {
                path: input.dir,
                ..Default::default()
            },
            &mut |entry| {
                match &matcher {
                    Some(re) if !re.is_match(&entry.path) => {}
                    _ => total += 1,
                }
                Ok(())
            },
        )
        .await?;

    Ok(total)
}
