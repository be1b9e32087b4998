//! Query pipeline integration tests over the sample day.

use chrono::NaiveDate;
use labdash_core::{
    AppointmentCache, AppointmentStatus, CacheConfig, MemoryGateway, QueryState, StatusFilter,
};

fn sample_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 22).unwrap()
}

async fn sample_cache() -> AppointmentCache<MemoryGateway> {
    let config = CacheConfig {
        refresh_after_mutation: false,
        ..CacheConfig::default()
    };
    let cache = AppointmentCache::new(MemoryGateway::with_sample_data(), config);
    cache.load().await.unwrap();
    cache
}

fn ids(records: &[labdash_core::AppointmentRecord]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn test_day_view_sorted_by_time() {
    let cache = sample_cache().await;
    let results = cache.query(&QueryState::for_date(sample_day()));
    assert_eq!(ids(&results), vec!["APT001", "APT002", "APT003", "APT004", "APT005"]);
}

#[tokio::test]
async fn test_search_by_name_category_and_id() {
    let cache = sample_cache().await;

    let by_name = cache.query(&QueryState::all_dates().with_search("smith"));
    assert_eq!(ids(&by_name), vec!["APT001"]);

    let by_category = cache.query(&QueryState::all_dates().with_search("follow-up"));
    assert_eq!(ids(&by_category), vec!["APT001", "APT005"]);

    let by_id = cache.query(&QueryState::all_dates().with_search("apt004"));
    assert_eq!(ids(&by_id), vec!["APT004"]);

    assert!(cache
        .query(&QueryState::all_dates().with_search("xyz"))
        .is_empty());
}

#[tokio::test]
async fn test_status_filter_and_search_combine() {
    let cache = sample_cache().await;
    let query = QueryState::for_date(sample_day())
        .with_search("follow")
        .with_status(StatusFilter::Only(AppointmentStatus::Confirmed));
    assert_eq!(ids(&cache.query(&query)), vec!["APT001"]);
}

#[tokio::test]
async fn test_other_day_is_empty() {
    let cache = sample_cache().await;
    let next_day = NaiveDate::from_ymd_opt(2025, 1, 23).unwrap();
    assert!(cache.query(&QueryState::for_date(next_day)).is_empty());
}

#[tokio::test]
async fn test_query_does_not_change_snapshot() {
    let cache = sample_cache().await;
    let before = cache.snapshot();
    let query = QueryState::all_dates().with_status("cancelled".parse().unwrap());
    assert_eq!(ids(&cache.query(&query)), vec!["APT005"]);
    assert_eq!(cache.query(&query), cache.query(&query));
    assert_eq!(cache.snapshot(), before);
}

#[tokio::test]
async fn test_counts_follow_transitions() {
    let cache = sample_cache().await;
    let counts = cache.status_counts();
    assert_eq!(counts.total, 5);
    assert_eq!(counts.scheduled, 1);

    cache.cancel("APT003", "Rebooked elsewhere").await.unwrap();
    let counts = cache.status_counts();
    assert_eq!(counts.scheduled, 0);
    assert_eq!(counts.cancelled, 2);
}
