use std::thread;
use termcanon_core::{normalize, CanonConfig, SuggestionQuery, TermCanon};

#[test]
fn concurrent_links_converge_to_one_cluster() {
    let canon = TermCanon::new(CanonConfig::default());
    canon.create_preferred_term("javascript", "javascript").unwrap();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let canon = canon.clone();
            thread::spawn(move || {
                for index in 0..25 {
                    let alias = format!("js-{worker}-{index}");
                    canon.link_synonym("javascript", &alias).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let members = canon.cluster_members("javascript").unwrap();
    assert_eq!(members.len(), 1 + 8 * 25);
    for member in &members {
        let resolved = canon.resolve(member.as_str()).resolved().unwrap();
        assert_eq!(resolved.canonical, normalize("javascript"));
    }
}

#[test]
fn readers_never_observe_partial_clusters() {
    let canon = TermCanon::new(CanonConfig::default());
    for index in 0..50 {
        canon.create_technology(&format!("lang-{index}")).unwrap();
    }

    let writer = {
        let canon = canon.clone();
        thread::spawn(move || {
            for index in 1..50 {
                canon
                    .link_synonym("lang-0", &format!("lang-{index}"))
                    .unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let canon = canon.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let members = canon.cluster_members("lang-0").unwrap();
                    for member in &members {
                        let later = canon.cluster_members(member.as_str()).unwrap();
                        assert!(members.is_subset(&later));
                    }
                    let page = canon
                        .get_skill_suggestions(&SuggestionQuery::fragment("lang", 0, 100))
                        .unwrap();
                    assert!(!page.items.is_empty());
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(canon.cluster_members("lang-49").unwrap().len(), 50);
}
