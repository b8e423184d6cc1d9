//! Merge resolver: combines the persisted record with a fresh extraction.

use intake_core::FieldMap;

/// Right-biased union of persisted truth and the latest extraction.
///
/// `merged[k] = extracted[k]` if `k` is present in `extracted`, else
/// `persisted[k]`; keys are the union of both maps. Last-extracted-wins is
/// absolute: there are no field-level timestamps and no specificity
/// heuristics. Pure function.
pub fn merge(persisted: &FieldMap, extracted: &FieldMap) -> FieldMap {
    let mut merged = persisted.clone();
    for (key, value) in extracted {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_right_bias() {
        let persisted = map(&[("diabetes", "no"), ("smoking", "yes")]);
        let extracted = map(&[("diabetes", "yes")]);
        let merged = merge(&persisted, &extracted);
        assert_eq!(merged.get("diabetes").unwrap(), "yes");
        assert_eq!(merged.get("smoking").unwrap(), "yes");
    }

    #[test]
    fn test_union_completeness() {
        let persisted = map(&[("a", "1"), ("b", "2")]);
        let extracted = map(&[("b", "20"), ("c", "30")]);
        let merged = merge(&persisted, &extracted);

        let keys: Vec<&str> = merged.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(merged.get("a").unwrap(), "1");
        assert_eq!(merged.get("b").unwrap(), "20");
        assert_eq!(merged.get("c").unwrap(), "30");
    }

    #[test]
    fn test_empty_extraction_preserves_persisted() {
        let persisted = map(&[("allergies", "penicillin")]);
        let merged = merge(&persisted, &FieldMap::new());
        assert_eq!(merged, persisted);
    }

    #[test]
    fn test_empty_persisted_takes_extraction() {
        let extracted = map(&[("medications", "metformin")]);
        let merged = merge(&FieldMap::new(), &extracted);
        assert_eq!(merged, extracted);
    }

    #[test]
    fn test_both_empty() {
        assert!(merge(&FieldMap::new(), &FieldMap::new()).is_empty());
    }

    #[test]
    fn test_pure_and_deterministic() {
        let persisted = map(&[("a", "1")]);
        let extracted = map(&[("a", "2"), ("b", "3")]);

        let first = merge(&persisted, &extracted);
        let second = merge(&persisted, &extracted);
        assert_eq!(first, second);
        // Inputs untouched.
        assert_eq!(persisted.get("a").unwrap(), "1");
    }

    #[test]
    fn test_correction_overwrites() {
        // A re-derived extraction may flip a previously stated fact.
        let persisted = map(&[("diabetes", "yes")]);
        let extracted = map(&[("diabetes", "no")]);
        let merged = merge(&persisted, &extracted);
        assert_eq!(merged.get("diabetes").unwrap(), "no");
    }
}
