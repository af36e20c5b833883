//! Unit tests for HFP state and indicator types

use super::constants::*;
use super::types::*;

#[test]
fn test_state_order_is_protocol_order() {
    let chain = [
        HfpState::Disconnected,
        HfpState::SlcBrsfSet,
        HfpState::SlcBrsfSetOk,
        HfpState::SlcBacSetOk,
        HfpState::SlcCindTest,
        HfpState::SlcCindTestOk,
        HfpState::SlcCindGet,
        HfpState::SlcCindGetOk,
        HfpState::SlcCmerSetOk,
        HfpState::SlcConnected,
        HfpState::CcBcsSet,
        HfpState::CcBcsSetOk,
        HfpState::CcConnected,
        HfpState::Connected,
    ];

    for pair in chain.windows(2) {
        assert!(pair[0] < pair[1]);
        assert_eq!(pair[0].successor(), pair[1]);
    }
}

#[test]
fn test_connected_is_terminal() {
    assert_eq!(HfpState::Connected.successor(), HfpState::Connected);
}

#[test]
fn test_indicator_names() {
    assert_eq!(HfpIndicator::from_name("call"), Some(HfpIndicator::Call));
    assert_eq!(HfpIndicator::from_name("battchg"), Some(HfpIndicator::BattChg));
    assert_eq!(HfpIndicator::from_name("bogus"), None);
}

#[test]
fn test_indicator_map_positional_lookup() {
    let names = ["service", "call", "callsetup", "battchg"];
    let map = IndicatorMap::from_vocabulary(&names);

    // wire positions are 1-based
    assert_eq!(map.get(1), Some(HfpIndicator::Service));
    assert_eq!(map.get(2), Some(HfpIndicator::Call));
    assert_eq!(map.get(4), Some(HfpIndicator::BattChg));
    assert_eq!(map.get(0), None);
    assert_eq!(map.get(5), None);
    assert_eq!(map.get(HFP_IND_MAP_SIZE + 1), None);
}

#[test]
fn test_indicator_map_keeps_unknown_positions() {
    // an AG advertising a non-standard indicator must not shift the rest
    let names = ["call", "vendorext", "battchg"];
    let map = IndicatorMap::from_vocabulary(&names);

    assert_eq!(map.get(1), Some(HfpIndicator::Call));
    assert_eq!(map.get(2), None);
    assert_eq!(map.get(3), Some(HfpIndicator::BattChg));
}

#[test]
fn test_vocabulary_matches_indicator_count() {
    let names = crate::at::parse_cind(HFP_IND_VOCABULARY).unwrap();
    assert_eq!(names.len(), HfpIndicator::COUNT);

    let map = IndicatorMap::from_vocabulary(&names);
    for (i, _) in names.iter().enumerate() {
        assert!(map.get(i + 1).is_some());
    }
}
