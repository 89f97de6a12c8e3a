//! Name, path, and full-text search.

mod common;

use vrepo::RepositoryObject;

fn paths(found: &[RepositoryObject]) -> Vec<String> {
    let mut paths: Vec<String> = found.iter().map(|o| o.path().to_string()).collect();
    paths.sort();
    paths
}

#[tokio::test]
async fn text_search_honours_case_flag() {
    let t = common::open().await;
    t.repo.create_resource("/docs/lower.txt", b"abc def").await.unwrap();
    t.repo.create_resource("/docs/upper.txt", b"ABC DEF").await.unwrap();
    t.repo.create_resource("/docs/blob.bin", &[0xff, b'a', b'b', b'c']).await.unwrap();

    let exact = t.repo.search_text("ABC", false).await.unwrap();
    assert_eq!(paths(&exact), vec!["/docs/upper.txt"]);

    let folded = t.repo.search_text("ABC", true).await.unwrap();
    assert_eq!(paths(&folded), vec!["/docs/lower.txt", "/docs/upper.txt"]);
}

#[tokio::test]
async fn text_search_sees_latest_content_only() {
    let t = common::open().await;
    t.repo.create_resource("/n.txt", b"needle").await.unwrap();
    t.repo.set_resource_content("/n.txt", b"hay").await.unwrap();

    assert!(t.repo.search_text("needle", false).await.unwrap().is_empty());
    assert_eq!(paths(&t.repo.search_text("hay", false).await.unwrap()), vec!["/n.txt"]);
}

#[tokio::test]
async fn name_and_path_search_scoped_to_root() {
    let t = common::open().await;
    t.repo.create_resource("/a/Report-2024.txt", b"1").await.unwrap();
    t.repo.create_resource("/a/sub/report-final.txt", b"2").await.unwrap();
    t.repo.create_resource("/b/report.txt", b"3").await.unwrap();
    t.repo.create_collection("/b/reports").await.unwrap();

    let exact = t.repo.search_name("report", false).await.unwrap();
    assert_eq!(
        paths(&exact),
        vec!["/a/sub/report-final.txt", "/b/report.txt", "/b/reports"]
    );

    let folded = t.repo.search_name_in("REPORT", true, "/a").await.unwrap();
    assert_eq!(
        paths(&folded),
        vec!["/a/Report-2024.txt", "/a/sub/report-final.txt"]
    );

    let by_path = t.repo.search_path_in("sub/", false, "/a").await.unwrap();
    assert_eq!(paths(&by_path), vec!["/a/sub/report-final.txt"]);
}

#[tokio::test]
async fn search_treats_wildcards_literally() {
    let t = common::open().await;
    t.repo.create_resource("/w/100%.txt", b"x").await.unwrap();
    t.repo.create_resource("/w/1000.txt", b"x").await.unwrap();
    t.repo.create_resource("/w/a_b.txt", b"x").await.unwrap();
    t.repo.create_resource("/w/axb.txt", b"x").await.unwrap();

    assert_eq!(paths(&t.repo.search_name("100%", false).await.unwrap()), vec!["/w/100%.txt"]);
    assert_eq!(paths(&t.repo.search_path("a_b", false).await.unwrap()), vec!["/w/a_b.txt"]);
}
