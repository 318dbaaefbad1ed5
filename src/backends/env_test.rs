use std::collections::HashMap;
use std::time::Duration;

use serial_test::serial;
use temp_env::with_vars;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::config::BackendConfig;
use crate::config::BackendKind;
use crate::test_utils::flat_map;
use crate::test_utils::keys;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

#[test]
#[serial]
fn get_values_maps_keys_to_variable_names() {
    with_vars(
        vec![
            ("CONFDTEST_DB_PASS", Some("foo")),
            ("CONFDTEST_DB_USER", Some("admin")),
            ("CONFDTEST_PORT", Some("443")),
        ],
        || {
            let client = EnvClient::new(&BackendConfig::new(BackendKind::Env));
            let values = block_on(client.get_values(&keys(&["/confdtest/db"]))).unwrap();
            assert_eq!(
                values,
                flat_map(&[("/confdtest/db/pass", "foo"), ("/confdtest/db/user", "admin")])
            );
        },
    );
}

#[test]
#[serial]
fn missing_variables_contribute_nothing() {
    with_vars(vec![("CONFDTEST_PORT", None::<&str>)], || {
        let client = EnvClient::new(&BackendConfig::new(BackendKind::Env));
        let values = block_on(client.get_values(&keys(&["/confdtest/port"]))).unwrap();
        assert!(values.is_empty());
    });
}

#[test]
#[serial]
fn configured_separator_and_prefix_are_honored() {
    with_vars(vec![("CONFDTEST__DB__HOST", Some("db.local"))], || {
        let client = EnvClient::new(&BackendConfig::new(BackendKind::Env));
        let options: HashMap<String, String> = [
            ("separator".to_string(), "__".to_string()),
            ("prefix".to_string(), "/confdtest".to_string()),
        ]
        .into_iter()
        .collect();
        block_on(client.configure(options)).unwrap();

        let values = block_on(client.get_values(&keys(&["/confdtest/db"]))).unwrap();
        assert_eq!(values, flat_map(&[("/db/host", "db.local")]));
    });
}

#[cfg(unix)]
#[test]
#[serial]
fn unrelated_non_utf8_variables_are_ignored() {
    use std::ffi::OsStr;
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStrExt;

    with_vars(
        vec![
            (OsString::from("CONFDTEST_DB_USER"), Some(OsString::from("admin"))),
            (
                OsString::from("CONFDOTHER_BLOB"),
                Some(OsStr::from_bytes(b"\xff\xfe").to_os_string()),
            ),
        ],
        || {
            let client = EnvClient::new(&BackendConfig::new(BackendKind::Env));
            let values = block_on(client.get_values(&keys(&["/confdtest/db"]))).unwrap();
            assert_eq!(values, flat_map(&[("/confdtest/db/user", "admin")]));
        },
    );
}

#[cfg(unix)]
#[test]
#[serial]
fn requested_non_utf8_value_is_a_decode_error() {
    use std::ffi::OsStr;
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStrExt;

    with_vars(
        vec![(
            OsString::from("CONFDTEST_DB_PASS"),
            Some(OsStr::from_bytes(b"\xff\xfe").to_os_string()),
        )],
        || {
            let client = EnvClient::new(&BackendConfig::new(BackendKind::Env));
            let result = block_on(client.get_values(&keys(&["/confdtest/db"])));
            assert!(matches!(
                result,
                Err(crate::Error::Backend(crate::BackendError::Decode { ref path, .. })) if path == "CONFDTEST_DB_PASS"
            ));
        },
    );
}

#[tokio::test(start_paused = true)]
async fn watch_only_returns_on_cancel() {
    let client = std::sync::Arc::new(EnvClient::new(&BackendConfig::new(BackendKind::Env)));
    let cancel = CancellationToken::new();

    // first call never blocks
    assert_eq!(client.watch_prefix("/", &[], 0, &cancel).await.unwrap(), 1);

    let handle = {
        let client = client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { client.watch_prefix("/", &[], 1, &cancel).await })
    };
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(!handle.is_finished());

    cancel.cancel();
    assert_eq!(handle.await.unwrap().unwrap(), 0);
}
