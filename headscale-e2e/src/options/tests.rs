use super::*;

fn network() -> NetworkRef {
    NetworkRef {
        id: "net-1".to_string(),
        name: "headscale-test".to_string(),
    }
}

#[test]
fn test_defaults() {
    let options = InstanceOptions::default();

    assert_eq!(options.port, 8080);
    assert_eq!(options.build_context, PathBuf::from(".."));
    assert_eq!(options.dockerfile, "Dockerfile.debug");
    assert_eq!(options.startup_delay, Duration::from_secs(3));
    assert_eq!(options.restart_policy, RestartPolicy::UnlessStopped);
    assert_eq!(options.cap_add, vec!["NET_ADMIN".to_string()]);
    assert_eq!(
        options.sysctls.get("net.ipv6.conf.all.disable_ipv6").map(String::as_str),
        Some("0")
    );
}

#[test]
fn test_entrypoint_sleeps_then_serves() {
    let options = InstanceOptions::default();
    assert_eq!(
        options.entrypoint(),
        vec!["/bin/bash", "-c", "/bin/sleep 3 ; headscale serve"]
    );

    let options = options.with_startup_delay(Duration::from_millis(250));
    assert_eq!(options.entrypoint()[2], "/bin/sleep 0.250 ; headscale serve");
}

#[test]
fn test_environment_is_sorted() {
    let options = InstanceOptions::default()
        .with_env_var("ZED", "1")
        .with_env_var("ALPHA", "2")
        .with_env_var("MID", "3");

    assert_eq!(options.environment(), vec!["ALPHA=2", "MID=3", "ZED=1"]);
}

#[test]
fn test_policy_adds_policy_path_env() {
    let without = InstanceOptions::default();
    assert!(without.environment().is_empty());

    let with = InstanceOptions::default().with_acl_policy(AclPolicy::allow_all());
    assert_eq!(
        with.environment(),
        vec!["HEADSCALE_ACL_POLICY_PATH=/etc/headscale/acl.hujson"]
    );
}

#[test]
fn test_plan_without_policy_writes_config_only() {
    let plan = InstanceOptions::default()
        .plan("hs-abc", &network())
        .unwrap();

    assert_eq!(plan.hostname, "hs-abc");
    assert_eq!(plan.build.tag, "hs-abc");
    assert_eq!(plan.container.name, "hs-abc");
    assert_eq!(plan.container.exposed_ports, vec!["8080/tcp"]);
    assert_eq!(plan.container.network, network());
    assert!(plan.policy_json.is_none());

    let files = plan.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].1, "/etc/headscale/config.yaml");

    let yaml = String::from_utf8(plan.config_yaml.clone()).unwrap();
    assert!(yaml.contains("0.0.0.0:8080"), "{}", yaml);
}

#[test]
fn test_plan_with_policy_writes_both_files() {
    let plan = InstanceOptions::default()
        .with_acl_policy(AclPolicy::allow_all())
        .plan("hs-abc", &network())
        .unwrap();

    let paths: Vec<&str> = plan.files().iter().map(|(_, path, _)| *path).collect();
    assert_eq!(
        paths,
        vec!["/etc/headscale/config.yaml", "/etc/headscale/acl.hujson"]
    );
}

#[test]
fn test_plan_uses_custom_port_and_server_config() {
    let mut config = ServerConfig::for_port(9000);
    config.log.level = "info".to_string();

    let plan = InstanceOptions::default()
        .with_port(9000)
        .with_server_config(config)
        .plan("hs-abc", &network())
        .unwrap();

    assert_eq!(plan.container.exposed_ports, vec!["9000/tcp"]);
    let yaml = String::from_utf8(plan.config_yaml).unwrap();
    assert!(yaml.contains("level: info"), "{}", yaml);
}

#[test]
fn test_from_lookup_overlays_values() {
    let options = InstanceOptions::from_lookup(|key| match key {
        ENV_BUILD_CONTEXT => Some("/src/headscale".to_string()),
        ENV_DOCKERFILE => Some("Dockerfile.tailscale".to_string()),
        ENV_STARTUP_DELAY => Some("500ms".to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(options.build_context, PathBuf::from("/src/headscale"));
    assert_eq!(options.dockerfile, "Dockerfile.tailscale");
    assert_eq!(options.startup_delay, Duration::from_millis(500));
}

#[test]
fn test_from_lookup_ignores_empty_values() {
    let options = InstanceOptions::from_lookup(|_| Some(String::new())).unwrap();
    assert_eq!(options.dockerfile, DEFAULT_DOCKERFILE);
    assert_eq!(options.startup_delay, DEFAULT_STARTUP_DELAY);
}

#[test]
fn test_from_lookup_rejects_bad_delay() {
    let err = InstanceOptions::from_lookup(|key| {
        (key == ENV_STARTUP_DELAY).then(|| "soon".to_string())
    })
    .unwrap_err();

    match err {
        HarnessError::InvalidOption { name, .. } => assert_eq!(name, ENV_STARTUP_DELAY),
        other => panic!("expected InvalidOption, got {:?}", other),
    }
}
