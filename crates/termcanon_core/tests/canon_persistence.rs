use termcanon_core::canon::SynonymRegistry;
use termcanon_core::{
    normalize, CanonConfig, LabelSource, SqliteTermRepository, TermCanon, TermRepository,
};

fn open(path: &std::path::Path) -> TermCanon {
    let repo = SqliteTermRepository::open(path).unwrap();
    TermCanon::open(CanonConfig::default(), repo).unwrap()
}

#[test]
fn reopened_store_rebuilds_clusters_preferred_terms_and_blocklist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("terms.db");

    let (react_id, members) = {
        let canon = open(&path);
        let react_id = canon.create_technology("React").unwrap();
        canon.link_synonym("React", "React.js").unwrap();
        canon.link_synonym("ReactJS", "react-js").unwrap();
        canon.link_synonym("react-js", "React").unwrap();
        canon.set_preferred_term("react-js", "react").unwrap();
        canon.create_blocked_terms(&["Solidity", "jQuery"]).unwrap();
        canon.unblock_terms(&["jquery"]).unwrap();
        (react_id, canon.cluster_members("react").unwrap())
    };

    let canon = open(&path);
    assert_eq!(canon.term("react").unwrap().id, react_id);
    assert_eq!(canon.cluster_members("reactjs").unwrap(), members);
    assert_eq!(canon.blocked_terms(), vec![normalize("solidity")]);

    let resolved = canon.resolve("REACT.JS").resolved().unwrap();
    assert_eq!(resolved.canonical, normalize("react"));
    assert_eq!(resolved.source, LabelSource::Preferred);
    assert_eq!(resolved.display_name, "React");
}

#[test]
fn reopened_store_keeps_conflict_resolution_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("terms.db");

    {
        let canon = open(&path);
        canon.create_preferred_term("kotlin", "kotlin").unwrap();
        canon.create_preferred_term("kt", "kt").unwrap();
    }

    let canon = open(&path);
    let outcome = canon.link_synonym("kt", "kotlin").unwrap();
    assert_eq!(outcome.preferred, Some(normalize("kotlin")));
    assert_eq!(outcome.conflict_demoted, Some(normalize("kt")));
}

#[test]
fn stored_state_matches_in_memory_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("terms.db");

    let canon = open(&path);
    for (a, b) in [("Go", "Golang"), ("Python", "py"), ("py", "python3"), ("Go", "go-lang")] {
        canon.link_synonym(a, b).unwrap();
    }
    canon.set_preferred_term("golang", "go").unwrap();
    canon.create_technology("Rust").unwrap();

    let stored = SqliteTermRepository::open(&path)
        .unwrap()
        .load_state()
        .unwrap();
    let restored = SynonymRegistry::restore(stored.registry.clone()).unwrap();
    let mut snapshot = restored.snapshot();
    snapshot
        .clusters
        .sort_by(|a, b| a.root_key.cmp(&b.root_key));
    assert_eq!(snapshot, stored.registry);
    assert_eq!(restored.len(), 7);
    assert_eq!(
        restored.preferred_term_of(&normalize("go-lang")).unwrap(),
        Some(normalize("go"))
    );
}

#[test]
fn keys_with_recomposed_marks_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("terms.db");

    let id = {
        let canon = open(&path);
        let id = canon.create_technology("Cafe.\u{301}").unwrap();
        canon.link_synonym("Café", "cafe-script").unwrap();
        id
    };

    let canon = open(&path);
    let term = canon.term("caf\u{e9}").unwrap();
    assert_eq!(term.id, id);
    assert_eq!(term.key.as_str(), "caf\u{e9}");
    assert_eq!(canon.cluster_members("cafe-script").unwrap().len(), 2);
}
