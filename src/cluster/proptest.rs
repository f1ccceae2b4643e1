//! Property-Based Tests for Cluster Coordination
//!
//! # Test Properties
//!
//! 1. **Selection Determinism**: the first healthy node in list order is chosen
//! 2. **No Available Node**: an all-down fleet always fails selection
//! 3. **CID Extraction**: any CIDv0 is recovered from JSON and from raw text
//! 4. **Quorum Classification**: HEALTHY exactly when online >= quorum

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use super::cid::extract_cid;
use super::failover::FleetStatus;
use super::prober::HealthProber;
use super::selector::NodeSelector;
use crate::adapters::{EventJournal, MockClusterClient};
use crate::domain::nodes_from_endpoints;
use crate::error::Error;
use crate::metrics::FleetMetrics;

// =============================================================================
// Property Strategies
// =============================================================================

/// Health flags for a fleet of 1-10 nodes.
fn fleet_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 1..=10)
}

/// A CIDv0: `Qm` followed by 44 base58btc characters.
fn cid_v0_strategy() -> impl Strategy<Value = String> {
    "[1-9A-HJ-NP-Za-km-z]{44}".prop_map(|tail| format!("Qm{}", tail))
}

fn endpoints(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("http://node{}:9094", i)).collect()
}

fn selector_over(healthy: &[bool]) -> (NodeSelector, Arc<MockClusterClient>) {
    let client = Arc::new(MockClusterClient::new());
    for (endpoint, up) in endpoints(healthy.len()).iter().zip(healthy) {
        client.set_healthy(endpoint, *up);
    }
    let events = Arc::new(EventJournal::new());
    let prober = Arc::new(HealthProber::new(
        client.clone(),
        events.clone(),
        FleetMetrics::new().unwrap(),
        Duration::from_millis(100),
    ));
    (NodeSelector::new(prober, events), client)
}

// =============================================================================
// Selection Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_selects_first_healthy_node(healthy in fleet_strategy()) {
        let (selector, client) = selector_over(&healthy);
        let nodes = nodes_from_endpoints(&endpoints(healthy.len())[..]);

        let selected = tokio_test::block_on(selector.select(&nodes));

        match healthy.iter().position(|up| *up) {
            Some(first) => {
                let node = selected.unwrap();
                prop_assert_eq!(node.endpoint(), nodes[first].endpoint());
                // nodes after the chosen one are never probed
                prop_assert_eq!(client.endpoints_called("health").len(), first + 1);
            }
            None => {
                let tried = healthy.len();
                let exhausted = matches!(selected, Err(Error::NoAvailableNode { tried: t }) if t == tried);
                prop_assert!(exhausted);
            }
        }
    }

    #[test]
    fn prop_selection_is_stable(healthy in fleet_strategy()) {
        let (selector, _) = selector_over(&healthy);
        let nodes = nodes_from_endpoints(&endpoints(healthy.len())[..]);

        let first = tokio_test::block_on(selector.select(&nodes)).map(|n| n.endpoint().to_string()).ok();
        let second = tokio_test::block_on(selector.select(&nodes)).map(|n| n.endpoint().to_string()).ok();

        prop_assert_eq!(first, second);
    }
}

// =============================================================================
// CID Extraction Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_extracts_structured_hash(cid in cid_v0_strategy(), key in prop::sample::select(vec!["cid", "Cid", "hash", "Hash"])) {
        let body = format!(r#"{{"name":"file.bin","{}":"{}","size":"12"}}"#, key, cid);
        let extracted = extract_cid(&body).unwrap();
        prop_assert_eq!(extracted.as_str(), cid.as_str());
    }

    #[test]
    fn prop_extracts_from_raw_text(cid in cid_v0_strategy(), prefix in "[a-z ]{0,20}", suffix in "[ .,;]{0,10}") {
        let body = format!("{}{}{}", prefix, cid, suffix);
        let extracted = extract_cid(&body).unwrap();
        prop_assert_eq!(extracted.as_str(), cid.as_str());
    }

    #[test]
    fn prop_text_without_cid_fails(text in "[a-z ]{1,80}") {
        prop_assert!(matches!(extract_cid(&text), Err(Error::CidExtraction(_))));
    }
}

// =============================================================================
// Quorum Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_quorum_classification(online in 0usize..20, quorum in 1usize..20) {
        let status = FleetStatus::classify(online, quorum);
        prop_assert_eq!(status.is_healthy(), online >= quorum);
    }
}
