//! Block merge logic
//!
//! Merge semantics per block:
//! - `Replace`: the layer's value wins entirely
//! - `Extend`: lists concatenate with lower layers first
//! - absent: lower layers pass through unchanged

use remote_patterns::PatternSet;

use super::layer::Block;
use crate::host::HostSpec;

/// Apply a layer's host block onto the hosts merged so far.
///
/// When an extending layer flags one of its own hosts as default, the default
/// flag is cleared on every inherited host so the newer default wins.
pub fn merge_hosts(base: Vec<HostSpec>, block: Option<&Block<Vec<HostSpec>>>) -> Vec<HostSpec> {
    match block {
        None => base,
        Some(Block::Replace(hosts)) => hosts.clone(),
        Some(Block::Extend(hosts)) => {
            let mut merged = base;
            if hosts.iter().any(|h| h.default) {
                for host in &mut merged {
                    host.default = false;
                }
            }
            merged.extend(hosts.iter().cloned());
            merged
        }
    }
}

/// Apply a layer's pattern block onto the rules merged so far
pub fn merge_patterns(base: PatternSet, block: Option<&Block<PatternSet>>) -> PatternSet {
    match block {
        None => base,
        Some(Block::Replace(set)) => set.clone(),
        Some(Block::Extend(set)) => base.merge(set),
    }
}
