/// Normalizes a user supplied percentile selection into report keys.
///
/// `["50", "99.9"]` becomes `["p50", "p99_9"]`; a single `default`, `wide` or `tail`
/// expands to its preset. No input selects `p50, p90, p99, p99_9`.
pub fn normalize_percentiles(input: &[String]) -> Vec<String> {
    if input.is_empty() {
        return keys(&["p50", "p90", "p99", "p99_9"]);
    }

    if let [preset] = input {
        match preset.as_str() {
            "default" => return keys(&["p50", "p90", "p99"]),
            "wide" => return (1..=100).map(|p| format!("p{p}")).collect(),
            "tail" => return keys(&["p90", "p95", "p99", "p99_9", "p99_99"]),
            _ => {}
        }
    }

    input
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| format!("p{}", p.trim_start_matches('p').replace('.', "_")))
        .collect()
}

fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|key| key.to_string()).collect()
}
