use super::*;

#[test]
fn test_default_auth_key_command() {
    assert_eq!(
        create_auth_key_command("ns1", &AuthKeyOptions::default()),
        vec![
            "headscale",
            "--namespace",
            "ns1",
            "preauthkeys",
            "create",
            "--reusable",
            "--expiration",
            "24h",
            "--output",
            "json",
        ]
    );
}

#[test]
fn test_ephemeral_single_use_key_command() {
    let options = AuthKeyOptions {
        reusable: false,
        ephemeral: true,
        expiration: Duration::from_secs(30 * 60),
    };
    let argv = create_auth_key_command("ns1", &options);

    assert!(!argv.contains(&"--reusable".to_string()));
    assert!(argv.contains(&"--ephemeral".to_string()));
    let at = argv.iter().position(|a| a == "--expiration").unwrap();
    assert_eq!(argv[at + 1], "30m");
}

#[test]
fn test_namespace_and_node_commands() {
    assert_eq!(
        create_namespace_command("ns1"),
        vec!["headscale", "namespaces", "create", "ns1"]
    );
    assert_eq!(
        list_nodes_command("ns1"),
        vec!["headscale", "--namespace", "ns1", "nodes", "list", "--output", "json"]
    );
}

#[test]
fn test_parse_key_with_rfc3339_timestamps() {
    let key = parse_pre_auth_key(
        r#"{
            "id": "1",
            "namespace": "ns1",
            "key": "5f1e2d3c",
            "reusable": true,
            "expiration": "2022-10-20T12:00:00Z",
            "created_at": "2022-10-19T12:00:00Z"
        }"#,
    )
    .unwrap();

    assert_eq!(key.id, 1);
    assert_eq!(key.namespace, "ns1");
    assert!(key.reusable);
    assert!(!key.ephemeral);
    assert!(!key.used);

    let created = key.created_at.unwrap();
    assert_eq!(key.remaining(created), Some(chrono::Duration::hours(24)));
}

#[test]
fn test_parse_key_with_seconds_nanos_timestamps() {
    let key = parse_pre_auth_key(
        r#"{
            "id": 7,
            "key": "abc",
            "expiration": {"seconds": 1666267200, "nanos": 500},
            "created_at": {"seconds": 1666180800}
        }"#,
    )
    .unwrap();

    assert_eq!(key.id, 7);
    let expiration = key.expiration.unwrap();
    assert_eq!(expiration.timestamp(), 1_666_267_200);
    assert_eq!(expiration.timestamp_subsec_nanos(), 500);
    assert_eq!(
        key.remaining(key.created_at.unwrap()),
        Some(chrono::Duration::hours(24) + chrono::Duration::nanoseconds(500))
    );
}

#[test]
fn test_parse_key_missing_fields_default() {
    let key = parse_pre_auth_key("{}").unwrap();
    assert_eq!(key, PreAuthKey::default());
    assert_eq!(key.remaining(Utc::now()), None);
}

#[test]
fn test_parse_nodes() {
    let nodes = parse_nodes(
        r#"[
            {
                "id": 1,
                "machine_key": "mkey:01",
                "node_key": "nodekey:01",
                "ip_addresses": ["100.64.0.1", "fd7a:115c:a1e0::1"],
                "name": "ts-1",
                "given_name": "ts-1",
                "namespace": {"id": "1", "name": "ns1"},
                "last_seen": {"seconds": 1666180800},
                "online": true
            },
            {"id": "2", "name": "ts-2"}
        ]"#,
    )
    .unwrap();

    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].namespace.name, "ns1");
    assert_eq!(nodes[0].ip_addresses.len(), 2);
    assert!(nodes[0].online);
    assert!(nodes[0].last_seen.is_some());
    assert_eq!(nodes[1].id, 2);
    assert!(nodes[1].forced_tags.is_empty());
    assert!(nodes[1].expiry.is_none());
}

#[test]
fn test_parse_nodes_with_null_fields() {
    let nodes = parse_nodes(
        r#"[{
            "id": 3,
            "name": null,
            "namespace": null,
            "ip_addresses": null,
            "forced_tags": null,
            "online": null
        }]"#,
    )
    .unwrap();

    assert_eq!(nodes[0].id, 3);
    assert_eq!(nodes[0].namespace, Namespace::default());
    assert!(nodes[0].name.is_empty());
    assert!(nodes[0].ip_addresses.is_empty());
    assert!(nodes[0].forced_tags.is_empty());
    assert!(!nodes[0].online);
}

#[test]
fn test_parse_empty_and_null_node_lists() {
    assert!(parse_nodes("[]").unwrap().is_empty());
    assert!(parse_nodes("null").unwrap().is_empty());
}

#[test]
fn test_garbled_output_is_a_parse_error() {
    let err = parse_nodes("Error: namespace not found").unwrap_err();

    assert!(err.is_parse());
    assert!(!err.is_exec());
    match err {
        HarnessError::Parse { what, output, .. } => {
            assert_eq!(what, "node list");
            assert_eq!(output, "Error: namespace not found");
        }
        other => panic!("expected Parse, got {:?}", other),
    }
}

#[test]
fn test_bad_id_and_timestamp_are_parse_errors() {
    assert!(parse_pre_auth_key(r#"{"id": "one"}"#).unwrap_err().is_parse());
    assert!(
        parse_pre_auth_key(r#"{"expiration": "tomorrow"}"#)
            .unwrap_err()
            .is_parse()
    );
}
