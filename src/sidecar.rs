use crate::config::SidecarConfig;
use crate::error::{Error, Result};
use crate::paths::{common_path, split_pattern};
use crate::pipeline::PipelineConfig;
use crate::types::PATH_STDOUT;
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, Pod, PodSpec, Volume, VolumeMount,
};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

pub const SIDECAR_CONTAINER_NAME: &str = "loggie";

pub const ENV_KEY_SYSTEM: &str = "loggie_config";
pub const ENV_KEY_PIPELINE: &str = "pipeline_config";

const REGISTRY_VOLUME_NAME: &str = "registry";
const REGISTRY_MOUNT_PATH: &str = "/data";
const LOG_VOLUME_PREFIX: &str = "loggie-logs";

#[derive(Deserialize)]
struct PathsInFileSource {
    #[serde(default)]
    paths: Vec<String>,
}

/// Collect the file paths every source reads from. Sidecars only see the
/// volumes shared with the app containers, so a source asking for stdout or
/// a path that does not resolve to an absolute directory rejects the whole
/// config.
pub fn retrieve_paths_from_sources(sources: &str) -> Result<Vec<String>> {
    let sources: Vec<PathsInFileSource> =
        serde_yaml::from_str(sources).map_err(|e| Error::config_parse("sources", e))?;

    let mut result = Vec::new();
    for source in sources {
        if source.paths.iter().any(|p| p == PATH_STDOUT) {
            return Err(Error::UnsupportedConfig(
                "pod stdout logs is not supported in loggie sidecar".to_string(),
            ));
        }
        if let Some(path) = source
            .paths
            .iter()
            .find(|p| !Path::new(split_pattern(p).0).is_absolute())
        {
            return Err(Error::UnsupportedConfig(format!(
                "log path {} is not absolute, it cannot be mounted into the sidecar",
                path
            )));
        }
        result.extend(source.paths);
    }
    Ok(result)
}

pub fn has_sidecar(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .is_some_and(|spec| spec.containers.iter().any(|c| c.name == SIDECAR_CONTAINER_NAME))
}

/// Adds the loggie container and the volumes it shares with the app.
pub struct SidecarPatcher<'a> {
    config: &'a SidecarConfig,
}

impl<'a> SidecarPatcher<'a> {
    pub fn new(config: &'a SidecarConfig) -> Self {
        Self { config }
    }

    /// Append the sidecar, a registry volume and one volume per common log
    /// directory. Existing containers and volumes keep their order. On error
    /// the pod is left untouched, including when one of the injected volume
    /// names is already taken by the pod.
    pub fn patch(
        &self,
        pod: &mut Pod,
        pipelines: &PipelineConfig,
        log_paths: &[String],
    ) -> Result<()> {
        let env = self.config_envs(pipelines)?;

        let log_dirs = common_path(log_paths);
        let spec = pod.spec.get_or_insert_with(PodSpec::default);
        check_volume_names(spec, log_dirs.len())?;

        let (registry_mount, registry_volume) = registry_volumes();
        let (log_mounts, log_volumes) =
            log_volumes(spec, &log_dirs, &self.config.ignore_container_names);

        let mut mounts = vec![registry_mount];
        mounts.extend(log_mounts);

        let sidecar = Container {
            name: SIDECAR_CONTAINER_NAME.to_string(),
            image: Some(self.config.image.clone()),
            args: Some(vec![
                "-config.from=env".to_string(),
                format!("-config.system={}", ENV_KEY_SYSTEM),
                format!("-config.pipeline={}", ENV_KEY_PIPELINE),
            ]),
            env: Some(env),
            volume_mounts: Some(mounts),
            ..Default::default()
        };

        spec.containers.push(sidecar);
        let volumes = spec.volumes.get_or_insert_with(Vec::new);
        volumes.push(registry_volume);
        volumes.extend(log_volumes);

        Ok(())
    }

    fn config_envs(&self, pipelines: &PipelineConfig) -> Result<Vec<EnvVar>> {
        Ok(vec![
            EnvVar {
                name: ENV_KEY_SYSTEM.to_string(),
                value: Some(self.config.system_config.clone()),
                ..Default::default()
            },
            EnvVar {
                name: ENV_KEY_PIPELINE.to_string(),
                value: Some(pipelines.to_yaml()?),
                ..Default::default()
            },
        ])
    }
}

fn log_volume_name(i: usize) -> String {
    format!("{}-{}", LOG_VOLUME_PREFIX, i)
}

fn check_volume_names(spec: &PodSpec, log_volume_count: usize) -> Result<()> {
    let Some(existing) = spec.volumes.as_ref() else {
        return Ok(());
    };
    let injected: Vec<String> = std::iter::once(REGISTRY_VOLUME_NAME.to_string())
        .chain((0..log_volume_count).map(log_volume_name))
        .collect();
    match existing.iter().find(|v| injected.contains(&v.name)) {
        Some(clash) => Err(Error::UnsupportedConfig(format!(
            "pod already has a volume named {}",
            clash.name
        ))),
        None => Ok(()),
    }
}

fn empty_dir_volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

fn volume_mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

// registry keeps file offsets across sidecar restarts
fn registry_volumes() -> (VolumeMount, Volume) {
    (
        volume_mount(REGISTRY_VOLUME_NAME, REGISTRY_MOUNT_PATH),
        empty_dir_volume(REGISTRY_VOLUME_NAME),
    )
}

/// One shared volume per common log directory, mounted into every app
/// container that is not ignored. Returns the sidecar's mounts and the pod
/// volumes.
fn log_volumes(
    spec: &mut PodSpec,
    log_dirs: &[String],
    ignore_container_names: &[String],
) -> (Vec<VolumeMount>, Vec<Volume>) {
    let mut mounts = Vec::new();
    let mut volumes = Vec::new();

    for (i, log_path) in log_dirs.iter().enumerate() {
        let name = log_volume_name(i);

        for container in spec.containers.iter_mut() {
            if ignore_container_names.contains(&container.name) {
                debug!("skip mounting {} into container {}", log_path, container.name);
                continue;
            }
            container
                .volume_mounts
                .get_or_insert_with(Vec::new)
                .push(volume_mount(&name, log_path));
        }

        mounts.push(volume_mount(&name, log_path));
        volumes.push(empty_dir_volume(&name));
    }

    (mounts, volumes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineEntry;

    fn sidecar_config(ignored: &[&str]) -> SidecarConfig {
        SidecarConfig {
            enabled: true,
            image: "loggie/loggie:v1.4.0".to_string(),
            ignore_namespaces: vec![],
            ignore_container_names: ignored.iter().map(|s| s.to_string()).collect(),
            system_config: "loggie:\n  reload:\n    enabled: true\n".to_string(),
        }
    }

    fn pod_with_containers(names: &[&str]) -> Pod {
        Pod {
            spec: Some(PodSpec {
                containers: names
                    .iter()
                    .map(|n| Container {
                        name: n.to_string(),
                        image: Some("nginx".to_string()),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn pipelines() -> PipelineConfig {
        PipelineConfig {
            pipelines: vec![PipelineEntry {
                name: "app-logs".to_string(),
                ..Default::default()
            }],
        }
    }

    fn mount_paths(container: &Container) -> Vec<&str> {
        container
            .volume_mounts
            .iter()
            .flatten()
            .map(|m| m.mount_path.as_str())
            .collect()
    }

    #[test]
    fn nested_paths_share_one_volume() {
        let config = sidecar_config(&[]);
        let mut pod = pod_with_containers(&["app", "worker"]);
        let paths = vec![
            "/var/log/app/*.log".to_string(),
            "/var/log/app/debug/*.log".to_string(),
        ];

        SidecarPatcher::new(&config)
            .patch(&mut pod, &pipelines(), &paths)
            .unwrap();

        let spec = pod.spec.unwrap();
        assert_eq!(spec.containers.len(), 3);
        for container in &spec.containers[..2] {
            assert_eq!(mount_paths(container), vec!["/var/log/app"]);
        }
        let sidecar = &spec.containers[2];
        assert_eq!(sidecar.name, SIDECAR_CONTAINER_NAME);
        assert_eq!(mount_paths(sidecar), vec!["/data", "/var/log/app"]);

        let volumes = spec.volumes.unwrap();
        let names: Vec<_> = volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["registry", "loggie-logs-0"]);
        assert!(volumes.iter().all(|v| v.empty_dir.is_some()));
    }

    #[test]
    fn ignored_containers_get_no_log_mount() {
        let config = sidecar_config(&["istio-proxy"]);
        let mut pod = pod_with_containers(&["app", "istio-proxy"]);
        let paths = vec!["/var/log/*.log".to_string()];

        SidecarPatcher::new(&config)
            .patch(&mut pod, &pipelines(), &paths)
            .unwrap();

        let spec = pod.spec.unwrap();
        assert_eq!(mount_paths(&spec.containers[0]), vec!["/var/log"]);
        assert!(spec.containers[1].volume_mounts.is_none());
    }

    #[test]
    fn sidecar_carries_config_envs_and_args() {
        let config = sidecar_config(&[]);
        let mut pod = pod_with_containers(&["app"]);

        SidecarPatcher::new(&config)
            .patch(&mut pod, &pipelines(), &[])
            .unwrap();

        let spec = pod.spec.unwrap();
        let sidecar = spec.containers.last().unwrap();
        assert_eq!(sidecar.image.as_deref(), Some("loggie/loggie:v1.4.0"));
        assert_eq!(
            sidecar.args.as_ref().unwrap(),
            &vec![
                "-config.from=env".to_string(),
                "-config.system=loggie_config".to_string(),
                "-config.pipeline=pipeline_config".to_string(),
            ]
        );
        let env = sidecar.env.as_ref().unwrap();
        assert_eq!(env[0].name, ENV_KEY_SYSTEM);
        assert_eq!(env[0].value.as_deref(), Some(config.system_config.as_str()));
        assert_eq!(env[1].name, ENV_KEY_PIPELINE);
        assert!(env[1].value.as_ref().unwrap().contains("name: app-logs"));
    }

    #[test]
    fn existing_volumes_are_kept_in_front() {
        let config = sidecar_config(&[]);
        let mut pod = pod_with_containers(&["app"]);
        pod.spec.as_mut().unwrap().volumes = Some(vec![empty_dir_volume("cache")]);

        SidecarPatcher::new(&config)
            .patch(&mut pod, &pipelines(), &["/logs/a.log".to_string()])
            .unwrap();

        let names: Vec<_> = pod
            .spec
            .unwrap()
            .volumes
            .unwrap()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names, vec!["cache", "registry", "loggie-logs-0"]);
    }

    #[test]
    fn paths_are_collected_from_every_source() {
        let sources = r#"
- type: file
  name: access
  paths: ["/var/log/nginx/access.log"]
- type: file
  name: error
  paths: ["/var/log/nginx/error.log", "/tmp/*.log"]
"#;
        let paths = retrieve_paths_from_sources(sources).unwrap();
        assert_eq!(
            paths,
            vec![
                "/var/log/nginx/access.log",
                "/var/log/nginx/error.log",
                "/tmp/*.log"
            ]
        );
    }

    #[test]
    fn stdout_path_is_unsupported() {
        let sources = "- type: file\n  paths: [\"/var/log/a.log\", \"stdout\"]\n";
        let err = retrieve_paths_from_sources(sources).unwrap_err();
        assert!(matches!(err, Error::UnsupportedConfig(_)));
    }

    #[test]
    fn plain_file_paths_mount_their_directory() {
        let config = sidecar_config(&[]);
        let mut pod = pod_with_containers(&["app"]);
        let paths = vec![
            "/var/log/app/access.log".to_string(),
            "/var/log/app/debug/trace.log".to_string(),
        ];

        SidecarPatcher::new(&config)
            .patch(&mut pod, &pipelines(), &paths)
            .unwrap();

        let spec = pod.spec.unwrap();
        assert_eq!(mount_paths(&spec.containers[0]), vec!["/var/log/app"]);
    }

    #[test]
    fn relative_path_is_unsupported() {
        let sources = "- type: file\n  paths: [\"/var/log/a.log\", \"*.log\"]\n";
        let err = retrieve_paths_from_sources(sources).unwrap_err();
        assert!(matches!(err, Error::UnsupportedConfig(_)));

        let sources = "- type: file\n  paths: [\"logs/app/*.log\"]\n";
        assert!(retrieve_paths_from_sources(sources).is_err());
    }

    #[test]
    fn volume_name_clash_leaves_pod_untouched() {
        let config = sidecar_config(&[]);
        let mut pod = pod_with_containers(&["app"]);
        pod.spec.as_mut().unwrap().volumes = Some(vec![empty_dir_volume("loggie-logs-0")]);
        let before = pod.clone();

        let err = SidecarPatcher::new(&config)
            .patch(&mut pod, &pipelines(), &["/var/log/app/*.log".to_string()])
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedConfig(_)));
        assert_eq!(pod, before);

        let mut pod = pod_with_containers(&["app"]);
        pod.spec.as_mut().unwrap().volumes = Some(vec![empty_dir_volume("registry")]);
        assert!(SidecarPatcher::new(&config)
            .patch(&mut pod, &pipelines(), &[])
            .is_err());
    }

    #[test]
    fn detects_existing_sidecar() {
        assert!(!has_sidecar(&pod_with_containers(&["app"])));
        assert!(has_sidecar(&pod_with_containers(&["app", "loggie"])));
    }
}
