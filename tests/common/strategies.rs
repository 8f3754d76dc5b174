use proptest::prelude::*;

/// Tag keys that never collide with the execution time tag
pub fn tag_key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}".prop_filter("reserved tag key", |key| key != "execution_epoch_time")
}

pub fn tag_value_strategy() -> impl Strategy<Value = String> {
    "[ -~]{0,24}"
}

pub fn tags_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((tag_key_strategy(), tag_value_strategy()), 0..8)
}

/// Epoch seconds with sub-second precision
pub fn epoch_seconds_strategy() -> impl Strategy<Value = f64> {
    (0u32..2_000_000_000u32, 0u32..1000u32)
        .prop_map(|(seconds, millis)| f64::from(seconds) + f64::from(millis) / 1000.0)
}
