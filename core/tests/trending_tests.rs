use pulse_core::trending::{idf, SharedTrends, TrendingTerms};
use std::time::Duration;
use time::macros::datetime;

const WINDOW: Duration = Duration::from_secs(15 * 60);

#[test]
fn weight_is_tf_times_smoothed_idf() {
    let mut t = TrendingTerms::new(WINDOW);
    let at = datetime!(2024-02-01 09:00 UTC);
    t.insert("1", &["ai", "data"], at);
    t.insert("2", &["ai"], at);
    t.insert("3", &["ai"], at);

    let top = t.top_terms(1);
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].term, "ai");
    // idf(ai) = ln(4/4) + 1 = 1, three occurrences
    assert_eq!(top[0].weight, 3.0);
    assert_eq!(top[0].doc_freq, 3);

    let both = t.top_terms(2);
    assert_eq!(both[1].term, "data");
    // idf(data) = ln(4/2) + 1
    assert!((both[1].weight - (2f64.ln() + 1.0)).abs() < 1e-12);
    assert_eq!(idf(1, 3), 2f64.ln() + 1.0);
}

#[test]
fn repeated_terms_count_towards_weight() {
    let mut t = TrendingTerms::new(WINDOW);
    let at = datetime!(2024-02-01 09:00 UTC);
    t.insert("1", &["gpu", "gpu", "gpu"], at);
    t.insert("2", &["cpu"], at);
    let top = t.top_terms(2);
    assert_eq!(top[0].term, "gpu");
    assert!((top[0].weight - 3.0 * ((3.0f64 / 2.0).ln() + 1.0)).abs() < 1e-12);
}

#[test]
fn ties_break_lexically() {
    let mut t = TrendingTerms::new(WINDOW);
    let at = datetime!(2024-02-01 09:00 UTC);
    t.insert("1", &["zeta", "alpha", "mid"], at);
    let terms: Vec<String> = t.top_terms(3).into_iter().map(|x| x.term).collect();
    assert_eq!(terms, vec!["alpha", "mid", "zeta"]);
    let first: Vec<String> = t.top_terms(1).into_iter().map(|x| x.term).collect();
    assert_eq!(first, vec!["alpha"]);
}

#[test]
fn evicted_terms_never_surface() {
    let mut t = TrendingTerms::new(WINDOW);
    let t0 = datetime!(2024-02-01 09:00 UTC);
    t.insert("old-1", &["legacy", "shared"], t0);
    t.insert("old-2", &["legacy"], t0 + Duration::from_secs(60));
    t.insert("new", &["fresh", "shared"], t0 + Duration::from_secs(10 * 60));

    let removed = t.evict_expired(t0 + WINDOW + Duration::from_secs(61));
    assert_eq!(removed, 2);
    let top = t.top_terms(10);
    assert!(top.iter().all(|x| x.term != "legacy"));
    let shared = top.iter().find(|x| x.term == "shared").unwrap();
    assert_eq!(shared.doc_freq, 1);
    assert_eq!(t.len(), 1);

    // evicting again at the same instant is a no-op
    assert_eq!(t.evict_expired(t0 + WINDOW + Duration::from_secs(61)), 0);
    assert_eq!(t.stats().evicted_total, 2);
}

#[test]
fn query_side_eviction_uses_the_given_clock() {
    let trends = SharedTrends::new(WINDOW);
    let t0 = datetime!(2024-02-01 09:00 UTC);
    let tokens = vec!["launch".to_string()];
    assert_eq!(trends.insert_many([("1", tokens.as_slice())], t0), 1);
    assert_eq!(trends.top_terms_at(5, t0 + Duration::from_secs(60))[0].term, "launch");
    assert!(trends.top_terms_at(5, t0 + WINDOW + Duration::from_secs(1)).is_empty());
    assert_eq!(trends.stats().documents, 0);
}

#[test]
fn readers_run_alongside_the_writer() {
    let trends = SharedTrends::new(WINDOW);
    let t0 = datetime!(2024-02-01 09:00 UTC);
    std::thread::scope(|s| {
        let writer = trends.clone();
        s.spawn(move || {
            for i in 0..500u32 {
                let tokens = vec![format!("term{}", i % 7), "common".to_string()];
                writer.insert(&i.to_string(), tokens.as_slice(), t0 + Duration::from_millis(u64::from(i)));
            }
        });
        for _ in 0..4 {
            let reader = trends.clone();
            s.spawn(move || {
                for _ in 0..200 {
                    let top = reader.top_terms_at(3, t0);
                    assert!(top.len() <= 3);
                }
            });
        }
    });
    let top = trends.top_terms_at(1, t0 + Duration::from_secs(1));
    assert_eq!(top[0].term, "common");
    assert_eq!(top[0].doc_freq, 500);
}
