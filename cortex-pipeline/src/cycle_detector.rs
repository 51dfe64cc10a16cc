use std::collections::HashSet;

use async_trait::async_trait;
use cortex_common::CortexError;

use crate::descheduling::DeschedulingCandidate;

/// Supplies a VM's migration chain as ordered (source, dest) hops, most
/// recent last. Backed by the Decision/Reservation history kept in the
/// record store (spec §4.2 "cycle detector").
#[async_trait]
pub trait MigrationHistoryProvider: Send + Sync {
    async fn history(&self, vm_id: &str) -> Result<Vec<(String, String)>, CortexError>;
}

/// True if any host appears twice across the hop chain, i.e. some prior
/// destination reappears as a later destination. Resolved via a visited
/// set rather than substring matching on host names (spec Open Question
/// "cycle detection granularity") since host names may be prefixes of
/// one another.
pub fn has_cycle(history: &[(String, String)]) -> bool {
    if history.is_empty() {
        return false;
    }
    let mut visited: HashSet<&str> = HashSet::new();
    if let Some((source0, _)) = history.first() {
        visited.insert(source0.as_str());
    }
    for (_source, dest) in history {
        if visited.contains(dest.as_str()) {
            return true;
        }
        visited.insert(dest.as_str());
    }
    false
}

/// Drops descheduling candidates whose VM would re-enter a host it has
/// already occupied. A history lookup failure is treated as "unknown,
/// not a cycle" so a transient store outage doesn't stall descheduling.
pub async fn filter_cycles(
    provider: &dyn MigrationHistoryProvider,
    candidates: Vec<DeschedulingCandidate>,
) -> Vec<DeschedulingCandidate> {
    let mut kept = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match provider.history(&candidate.vm_id).await {
            Ok(history) => {
                if has_cycle(&history) {
                    log::info!("dropping descheduling candidate {}: migration cycle detected", candidate.vm_id);
                } else {
                    kept.push(candidate);
                }
            }
            Err(e) => {
                log::warn!("cycle detector: failed to fetch history for {}: {e}", candidate.vm_id);
                kept.push(candidate);
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hop(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn empty_history_is_not_a_cycle() {
        assert!(!has_cycle(&[]));
    }

    #[test]
    fn revisiting_origin_is_a_cycle() {
        let history = vec![hop("h1", "h2"), hop("h2", "h1")];
        assert!(has_cycle(&history));
    }

    #[test]
    fn linear_chain_is_not_a_cycle() {
        let history = vec![hop("h1", "h2"), hop("h2", "h3")];
        assert!(!has_cycle(&history));
    }

    #[test]
    fn revisiting_an_intermediate_host_is_a_cycle() {
        let history = vec![hop("h1", "h2"), hop("h2", "h3"), hop("h3", "h2")];
        assert!(has_cycle(&history));
    }
}
