use crate::country::Country;
use crate::error::Result;
use crate::store::RecordStore;

/// Countries whose name contains `filter`, or every country when the filter
/// is absent or empty
///
/// Matching follows the store's `LIKE` collation, so ASCII letters compare
/// case-insensitively. Results are in storage order and fully materialized.
pub fn search(store: &dyn RecordStore, filter: Option<&str>) -> Result<Vec<Country>> {
    match filter {
        Some(needle) if !needle.is_empty() => store.filter_by_name_contains(needle),
        _ => store.all(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::country::{Attribute, NewCountry};
    use crate::store::SqliteStore;

    fn baltic_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .replace_all(&[
                NewCountry::named("Latvia").with(Attribute::AvgIncome, 1200),
                NewCountry::named("Estonia").with(Attribute::AvgIncome, 1300),
            ])
            .unwrap();
        store
    }

    #[test]
    fn empty_filter_is_no_filter() {
        let store = baltic_store();
        assert_eq!(
            search(&store, Some("")).unwrap(),
            search(&store, None).unwrap()
        );
    }

    #[test]
    fn lowercase_prefix_finds_latvia_only() {
        let store = baltic_store();
        let found = search(&store, Some("lat")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "Latvia");
        assert_eq!(found[0].id, 1);
    }

    #[test]
    fn unmatched_filter_is_empty() {
        let store = baltic_store();
        assert!(search(&store, Some("Atlantis")).unwrap().is_empty());
    }

    #[test]
    fn full_name_matches_itself() {
        let store = baltic_store();
        let found = search(&store, Some("Estonia")).unwrap();
        assert!(found.iter().any(|c| c.name() == "Estonia"));
    }
}
