/// Returns the current Unix timestamp in seconds.
pub fn current_unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::current_unix_timestamp;

    #[test]
    fn unit_current_unix_timestamp_is_monotonic_enough() {
        let first = current_unix_timestamp();
        let second = current_unix_timestamp();
        assert!(second >= first);
        // Sanity bound: well past 2020, well before the heat death.
        assert!(first > 1_577_836_800);
    }
}
