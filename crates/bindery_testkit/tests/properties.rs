//! Property tests for binding rebuilds.

use bindery_core::{
    Binding, BindingDescriptor, CacheStore, Filter, InMemoryCacheStore, InMemoryRecordStore,
    Record, RecordStore,
};
use bindery_testkit::{catalogue_strategy, filter_strategy, page_size_strategy, PRODUCT};
use proptest::prelude::*;
use std::sync::Arc;

fn build(catalogue: &[bindery_core::Fields], filter: &Filter) -> (Arc<InMemoryRecordStore>, Arc<InMemoryCacheStore>, Binding) {
    let store = Arc::new(InMemoryRecordStore::new());
    for fields in catalogue {
        store.create(PRODUCT, fields.clone()).unwrap();
    }
    let cache = Arc::new(InMemoryCacheStore::new());
    let binding = Binding::new(
        BindingDescriptor::new(PRODUCT, "view").with_filter(filter.clone()),
        store.clone(),
        cache.clone(),
    );
    (store, cache, binding)
}

proptest! {
    #[test]
    fn rebuild_equals_filtered_query(
        catalogue in catalogue_strategy(40),
        filter in filter_strategy(),
        page_size in page_size_strategy(),
    ) {
        let (store, _, binding) = build(&catalogue, &filter);
        let expected: Vec<Record> = store.query(PRODUCT, &filter).unwrap();

        let mut paged = Vec::new();
        for chunk in binding.keys().unwrap().chunks(page_size) {
            paged.extend(binding.records(chunk).unwrap());
        }
        prop_assert_eq!(&paged, &expected);

        let all: Vec<Record> = binding.all().unwrap().into_values().collect();
        prop_assert_eq!(&all, &expected);
        prop_assert_eq!(binding.version(), 1);
    }

    #[test]
    fn reads_do_not_bump(
        catalogue in catalogue_strategy(20),
        filter in filter_strategy(),
    ) {
        let (_, _, binding) = build(&catalogue, &filter);
        let first = binding.all().unwrap();
        let second = binding.all().unwrap();
        prop_assert_eq!(first.keys().collect::<Vec<_>>(), second.keys().collect::<Vec<_>>());
        prop_assert_eq!(binding.version(), 1);
    }

    #[test]
    fn lost_values_are_refetched(
        catalogue in catalogue_strategy(20),
        filter in filter_strategy(),
    ) {
        let (store, cache, binding) = build(&catalogue, &filter);
        binding.ensure_loaded().unwrap();
        cache.delete_prefix(&format!("objects:{PRODUCT}:")).unwrap();

        let all: Vec<Record> = binding.all().unwrap().into_values().collect();
        prop_assert_eq!(all, store.query(PRODUCT, &filter).unwrap());
        prop_assert_eq!(binding.version(), 1);
    }
}
