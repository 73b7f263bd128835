use std::future::Future;

use crate::error::AppError;

use super::selection::SelectionSet;

/// Per-id result of a batch operation. Ids that succeeded stay succeeded
/// even when later ones fail; nothing is rolled back.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, AppError)>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Runs `op` for every selected id, one after the other, without retry.
pub async fn run_sequential<F, Fut>(action: &str, selection: &SelectionSet, mut op: F) -> BatchOutcome
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<(), AppError>>,
{
    let mut outcome = BatchOutcome::default();

    for id in selection.ids() {
        match op(id.clone()).await {
            Ok(()) => outcome.succeeded.push(id.clone()),
            Err(e) => {
                tracing::warn!("Batch {} failed for id={}: {}", action, id, e);
                outcome.failed.push((id.clone(), e));
            }
        }
    }

    tracing::info!(
        "Batch {} finished: {} succeeded, {} failed",
        action,
        outcome.succeeded.len(),
        outcome.failed.len()
    );
    outcome
}
