//! Topic sequence bookkeeping.
//!
//! Topics progress through the fixed, forward-only order defined by the
//! catalog. The pipeline never decides transitions from user input; it only
//! tracks which fields are still pending so the conversational layer never
//! re-offers a field already present in the merged map.

use intake_core::catalog::{Catalog, TopicCatalog};
use intake_core::FieldMap;

/// Catalog fields of `topic` not yet present (with a non-empty value) in
/// the merged map.
pub fn pending_fields<'a>(topic: &'a TopicCatalog, merged: &FieldMap) -> Vec<&'a str> {
    topic
        .safe_fields()
        .map(|f| f.name)
        .filter(|name| merged.get(*name).map_or(true, |v| v.is_empty()))
        .collect()
}

/// Whether every catalog field of the topic is present in the merged map.
pub fn topic_complete(topic: &TopicCatalog, merged: &FieldMap) -> bool {
    pending_fields(topic, merged).is_empty()
}

/// The topic following `current` in the fixed order, if any.
pub fn next_topic(catalog: &Catalog, current: &str) -> Option<&'static str> {
    let topics = catalog.topics();
    let index = topics.iter().position(|t| t.topic == current)?;
    topics.get(index + 1).map(|t| t.topic)
}

/// Walk forward from `current`, skipping every topic whose fields are all
/// present in the merged map. Returns the new current topic and the topics
/// completed along the way. Forward-only: earlier topics are never revisited.
pub fn advance<'a>(
    catalog: &'a Catalog,
    current: &str,
    merged: &FieldMap,
) -> (&'a str, Vec<&'a str>) {
    let mut completed = Vec::new();
    let mut cursor = match catalog.topic(current) {
        Some(topic) => topic.topic,
        None => return (catalog.first_topic(), completed),
    };

    while let Some(topic) = catalog.topic(cursor) {
        if !topic_complete(topic, merged) {
            break;
        }
        completed.push(topic.topic);
        match next_topic(catalog, cursor) {
            Some(next) => cursor = next,
            // Terminal topic complete; stay on it.
            None => break,
        }
    }

    (cursor, completed)
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
    fn test_pending_fields_all_missing() {
        let catalog = Catalog::builtin();
        let terms = catalog.topic("terms").unwrap();
        assert_eq!(pending_fields(terms, &FieldMap::new()), vec!["terms_accepted"]);
    }

    #[test]
    fn test_pending_fields_excludes_present() {
        let catalog = Catalog::builtin();
        let social = catalog.topic("social_history").unwrap();
        let merged = map(&[("smoking", "no"), ("alcohol", "social")]);
        let pending = pending_fields(social, &merged);
        assert_eq!(pending, vec!["drugs", "physical_activity"]);
    }

    #[test]
    fn test_empty_value_counts_as_pending() {
        let catalog = Catalog::builtin();
        let terms = catalog.topic("terms").unwrap();
        let merged = map(&[("terms_accepted", "")]);
        assert!(!topic_complete(terms, &merged));
    }

    #[test]
    fn test_topic_complete() {
        let catalog = Catalog::builtin();
        let terms = catalog.topic("terms").unwrap();
        assert!(topic_complete(terms, &map(&[("terms_accepted", "yes")])));
    }

    #[test]
    fn test_next_topic_order() {
        let catalog = Catalog::builtin();
        assert_eq!(next_topic(&catalog, "personal"), Some("contact"));
        assert_eq!(next_topic(&catalog, "contact"), Some("surgical_interest"));
        assert_eq!(next_topic(&catalog, "terms"), None);
        assert_eq!(next_topic(&catalog, "bogus"), None);
    }

    #[test]
    fn test_advance_stays_when_incomplete() {
        let catalog = Catalog::builtin();
        let merged = map(&[("first_name", "Ana")]);
        let (current, completed) = advance(&catalog, "personal", &merged);
        assert_eq!(current, "personal");
        assert!(completed.is_empty());
    }

    #[test]
    fn test_advance_skips_completed_topics() {
        let catalog = Catalog::builtin();
        let merged = map(&[
            ("first_name", "Ana"),
            ("last_name", "Reyes"),
            ("birth_date", "1990-05-01"),
            ("gender", "female"),
            ("id_number", "X123"),
            ("occupation", "teacher"),
            ("phone", "555"),
        ]);
        let (current, completed) = advance(&catalog, "personal", &merged);
        // personal is done, contact is not (only phone present).
        assert_eq!(current, "contact");
        assert_eq!(completed, vec!["personal"]);
    }

    #[test]
    fn test_advance_terminal_topic() {
        let catalog = Catalog::builtin();
        let merged = map(&[("terms_accepted", "yes")]);
        let (current, completed) = advance(&catalog, "terms", &merged);
        assert_eq!(current, "terms");
        assert_eq!(completed, vec!["terms"]);
    }

    #[test]
    fn test_advance_unknown_topic_resets_to_first() {
        let catalog = Catalog::builtin();
        let (current, completed) = advance(&catalog, "bogus", &FieldMap::new());
        assert_eq!(current, "personal");
        assert!(completed.is_empty());
    }
}
