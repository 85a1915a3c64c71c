#[cfg(test)]
mod tests {
    use crate::cli::Cli;
    use crate::config::Config;
    use crate::paths::{common_path, reduce_dirs, split_pattern};
    use crate::utils;
    use clap::Parser;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::Path;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn is_ancestor(ancestor: &str, path: &str) -> bool {
        Path::new(path).starts_with(Path::new(ancestor))
    }

    fn as_set(paths: Vec<String>) -> BTreeSet<String> {
        paths.into_iter().collect()
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["loggie-operator"]).unwrap();
        assert_eq!(cli.config_path.to_str(), Some("config.yml"));
        assert_eq!(cli.port, 9443);
        assert_eq!(cli.webhook_addr().port(), 9443);
        assert_eq!(cli.health_probe_bind_address.port(), 9297);
        assert_eq!(cli.metrics_bind_address.port(), 9296);
        assert_eq!(
            cli.tls_dir().and_then(|p| p.to_str()),
            Some("/tmp/cert")
        );
        assert!(!cli.verbose);
        assert!(cli.daemonset_template.is_none());
    }

    #[test]
    fn test_cli_parsing_insecure() {
        let cli = Cli::try_parse_from(["loggie-operator", "--insecure", "--port", "8443"]).unwrap();
        assert!(cli.tls_dir().is_none());
        assert_eq!(cli.webhook_addr().port(), 8443);
    }

    #[test]
    fn test_cli_parsing_templates() {
        let args = [
            "loggie-operator",
            "--daemonset-template",
            "/etc/loggie/daemonset.yaml.j2",
            "--context",
            "kind-dev",
            "-v",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(
            cli.daemonset_template.as_deref().and_then(|p| p.to_str()),
            Some("/etc/loggie/daemonset.yaml.j2")
        );
        assert_eq!(cli.context.as_deref(), Some("kind-dev"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_rejects_bad_probe_address() {
        let args = ["loggie-operator", "--health-probe-bind-address", "not-an-addr"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_config_sidecar_enabled() {
        let config = Config::from_yaml(
            r#"
sidecar:
  enabled: true
  image: loggie/loggie:v1.4.0
  ignoreNamespaces: [kube-system]
  ignoreContainerNames: [istio-proxy]
  systemConfig: |
    loggie:
      http:
        enabled: true
"#,
        )
        .unwrap();
        let sidecar = config.enabled_sidecar().unwrap();
        assert_eq!(sidecar.image, "loggie/loggie:v1.4.0");
        assert_eq!(sidecar.ignore_namespaces, vec!["kube-system".to_string()]);
        assert_eq!(sidecar.ignore_container_names, vec!["istio-proxy".to_string()]);
    }

    #[test]
    fn test_config_without_sidecar_disables_injection() {
        let config = Config::from_yaml("{}").unwrap();
        assert!(config.enabled_sidecar().is_none());

        let config = Config::from_yaml("sidecar:\n  enabled: false\n").unwrap();
        assert!(config.enabled_sidecar().is_none());
    }

    #[test]
    fn test_config_requires_image_and_system_config() {
        assert!(Config::from_yaml("sidecar:\n  enabled: true\n  systemConfig: 'loggie: {}'\n").is_err());
        assert!(Config::from_yaml("sidecar:\n  enabled: true\n  image: loggie\n").is_err());
        assert!(
            Config::from_yaml("sidecar:\n  enabled: true\n  image: loggie\n  systemConfig: '- a'\n")
                .is_err()
        );
    }

    #[test]
    fn test_labels_subset_empty_selector_never_matches() {
        assert!(!utils::labels_subset(&BTreeMap::new(), &labels(&[("app", "x")])));
        assert!(!utils::labels_subset(&BTreeMap::new(), &BTreeMap::new()));
    }

    #[test]
    fn test_labels_subset() {
        let pod = labels(&[("app", "x"), ("env", "prod")]);
        assert!(utils::labels_subset(&labels(&[("app", "x")]), &pod));
        assert!(utils::labels_subset(&pod, &pod));
        assert!(!utils::labels_subset(&labels(&[("app", "x")]), &labels(&[("app", "y")])));
        assert!(!utils::labels_subset(&labels(&[("tier", "web")]), &pod));
    }

    #[test]
    fn test_labels_to_string() {
        let result = utils::labels_to_string(&labels(&[("version", "v1"), ("app", "nginx")]));
        assert_eq!(result, "app=nginx,version=v1");
    }

    #[test]
    fn test_reduce_dirs() {
        let dirs = ["/a/b/c", "/a/b/d", "/a/b", "/a/b/c/d", "/d", "/a/b/d"];
        assert_eq!(
            as_set(reduce_dirs(dirs)),
            as_set(vec!["/a/b".to_string(), "/d".to_string()])
        );
    }

    #[test]
    fn test_common_path() {
        let paths = [
            "/var/log/*.log",
            "/var/log/*.txt",
            "/data/**",
            "/usr/local/tomcat/access.log",
        ];
        assert_eq!(
            as_set(common_path(&paths)),
            as_set(vec![
                "/var/log".to_string(),
                "/data".to_string(),
                "/usr/local/tomcat".to_string()
            ])
        );
    }

    #[test]
    fn test_common_path_merges_siblings() {
        let paths = ["/var/log/nginx/*.log", "/var/log/app/**/*.log"];
        assert_eq!(common_path(&paths), vec!["/var/log".to_string()]);
    }

    #[test]
    fn test_common_path_empty() {
        assert!(common_path::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_split_pattern() {
        assert_eq!(split_pattern("/var/log/*.log"), ("/var/log", "*.log"));
        assert_eq!(split_pattern("/data/**"), ("/data", "**"));
        assert_eq!(split_pattern("/var/log/app.log"), ("/var/log", "app.log"));
        assert_eq!(split_pattern("/logs/{a,b}/*.log"), ("/logs", "{a,b}/*.log"));
        assert_eq!(split_pattern("/*.log"), ("/", "*.log"));
        assert_eq!(split_pattern("*.log"), (".", "*.log"));
        assert_eq!(split_pattern(r"/var/log/\*/x.log"), (r"/var/log/\*", "x.log"));
    }

    fn glob_paths() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("(/[abc]{1,2}){1,4}(/\\*\\.log)?", 0..8)
    }

    proptest! {
        #[test]
        fn prop_common_path_ignores_order(
            (paths, shuffled) in glob_paths().prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            prop_assert_eq!(as_set(common_path(&paths)), as_set(common_path(&shuffled)));
        }

        #[test]
        fn prop_common_path_has_no_nested_entries(paths in glob_paths()) {
            let dirs = common_path(&paths);
            for (i, a) in dirs.iter().enumerate() {
                for (j, b) in dirs.iter().enumerate() {
                    if i != j {
                        prop_assert!(!is_ancestor(a, b), "{} contains {}", a, b);
                    }
                }
            }
        }

        #[test]
        fn prop_common_path_covers_every_pattern(paths in glob_paths()) {
            let dirs = common_path(&paths);
            for path in &paths {
                let (base, _) = split_pattern(path);
                prop_assert!(dirs.iter().any(|d| is_ancestor(d, base)), "{} not covered", base);
            }
        }
    }
}
