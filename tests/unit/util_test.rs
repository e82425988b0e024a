//! Tests for utility functions

use session_gate::util::{now_ms, PriorityClass};

#[test]
fn test_priority_ordering() {
    assert!(PriorityClass::Premium < PriorityClass::Standard);
    let mut classes = vec![PriorityClass::Standard, PriorityClass::Premium];
    classes.sort();
    assert_eq!(classes, vec![PriorityClass::Premium, PriorityClass::Standard]);
}

#[test]
fn test_priority_from_flag_and_label() {
    assert_eq!(PriorityClass::from_premium(true), PriorityClass::Premium);
    assert_eq!(PriorityClass::from_premium(false), PriorityClass::Standard);
    assert_eq!(PriorityClass::Premium.label(), "PREMIUM");
    assert_eq!(PriorityClass::Standard.label(), "FREE");
}

#[test]
fn test_priority_serde() {
    let json = serde_json::to_string(&PriorityClass::Premium).unwrap();
    assert_eq!(json, "\"premium\"");
    let back: PriorityClass = serde_json::from_str("\"standard\"").unwrap();
    assert_eq!(back, PriorityClass::Standard);
}

#[test]
fn test_now_ms_advances() {
    let a = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_ms() > a);
}
