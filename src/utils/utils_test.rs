use super::net::with_scheme;
use super::net::with_scheme_all;
use super::path::*;

#[test]
fn test_clean() {
    assert_eq!(clean(""), ".");
    assert_eq!(clean("/"), "/");
    assert_eq!(clean("//app///db/"), "/app/db");
    assert_eq!(clean("/app/./db/../port"), "/app/port");
    assert_eq!(clean("/../app"), "/app");
    assert_eq!(clean("app/.."), ".");
    assert_eq!(clean("../app"), "../app");
}

#[test]
fn test_join() {
    assert_eq!(join(["/", "app/db/pass"]), "/app/db/pass");
    assert_eq!(join(["/prefix", "", "/nginx/port"]), "/prefix/nginx/port");
    assert_eq!(join(["", ""]), "");
    assert_eq!(join(["/", "/"]), "/");
}

#[test]
fn test_dir_and_base() {
    assert_eq!(dir("/app/db/pass"), "/app/db");
    assert_eq!(dir("/app"), "/");
    assert_eq!(dir("app"), ".");
    assert_eq!(base("/app/db/pass"), "pass");
    assert_eq!(base("/app/db/"), "db");
    assert_eq!(base("/"), "/");
}

#[test]
fn test_terms_and_prefix() {
    let prefix = terms("/deis/services");
    assert_eq!(prefix, vec!["", "deis", "services"]);
    assert!(same_prefix_terms(&prefix, &terms("/deis/services/srv1")));
    assert!(!same_prefix_terms(&prefix, &terms("/deis/servicesx/srv1")));
    assert!(!same_prefix_terms(&prefix, &terms("/deis")));
}

#[test]
fn test_with_scheme() {
    assert_eq!(with_scheme("127.0.0.1:2379", ""), "http://127.0.0.1:2379");
    assert_eq!(with_scheme("etcd1:2379", "https"), "https://etcd1:2379");
    assert_eq!(with_scheme("https://etcd1:2379/", "http"), "https://etcd1:2379");
    assert_eq!(
        with_scheme_all(&["a:1".to_string(), "http://b:2".to_string()], "https"),
        vec!["https://a:1".to_string(), "http://b:2".to_string()]
    );
}
