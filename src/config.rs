mod types;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use take_mut::take;
use tracing::{debug, info};

pub use self::types::*;

#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub bind_addr: String,
    pub recordings_dir: PathBuf,
    pub logo_dir: PathBuf,
    pub route_prefix: String,
    pub secret: Option<String>,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
    pub force_https: bool,
    pub feed_title: String,
    pub feed_description: String,
    pub feed_language: String,
    pub timezone: Timezone,
    pub lock_file: PathBuf,
    pub ffmpeg: PathBuf,
}

impl Config {
    pub fn update(&mut self, args: &crate::cli::Args) {
        fn set_if_some<T>(dst: &mut T, v: Option<T>) {
            if let Some(v) = v {
                *dst = v;
            }
        }

        set_if_some(&mut self.bind_addr, args.bind_addr.clone());
        set_if_some(&mut self.recordings_dir, args.recordings_dir.clone());
        set_if_some(
            &mut self.secret,
            args.secret.clone().filter(|s| !s.is_empty()).map(Some),
        );
    }

    pub fn resolve_relative_paths(&mut self, config_dir: impl AsRef<Path>) {
        let config_dir = config_dir.as_ref();

        // do the dance for safety (so that I don't forget to update this after adding new fields).
        take(self, |this| Self {
            bind_addr: this.bind_addr,
            recordings_dir: config_dir.join(this.recordings_dir),
            logo_dir: config_dir.join(this.logo_dir),
            route_prefix: this.route_prefix,
            secret: this.secret,
            cache_ttl: this.cache_ttl,
            cache_capacity: this.cache_capacity,
            force_https: this.force_https,
            feed_title: this.feed_title,
            feed_description: this.feed_description,
            feed_language: this.feed_language,
            timezone: this.timezone,
            lock_file: config_dir.join(this.lock_file),
            ffmpeg: this.ffmpeg,
        })
    }

    /// The route prefix with a leading slash and without a trailing one (`""` for the root).
    pub fn route_prefix(&self) -> String {
        let prefix = self.route_prefix.trim_matches('/');

        if prefix.is_empty() {
            String::new()
        } else {
            format!("/{prefix}")
        }
    }

    pub fn marker_path(&self) -> PathBuf {
        crate::recordings::marker_path(&self.recordings_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0:8080".into(),
            recordings_dir: "/app/recordings".into(),
            logo_dir: "/app/logo".into(),
            route_prefix: "/radio".into(),
            secret: None,
            cache_ttl: Duration::from_secs(3600),
            cache_capacity: 100,
            force_https: false,
            feed_title: "Radio Recorder".into(),
            feed_description: "Personal Radio Archive".into(),
            feed_language: "ko".into(),
            timezone: Timezone::default(),
            lock_file: "/tmp/radio-record.lock".into(),
            ffmpeg: "ffmpeg".into(),
        }
    }
}

pub fn load(search_paths: &[PathBuf]) -> Result<Config> {
    for path in search_paths {
        debug!("Trying to load {}", path.display());
        let mut contents = String::new();

        {
            let mut f = match File::open(path) {
                Ok(f) => f,

                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %path.display(), "File not found, skipping");
                    continue;
                }

                Err(e) => {
                    return Err(e)
                        .context(anyhow!("could not load a config file `{}`", path.display()));
                }
            };

            f.read_to_string(&mut contents).with_context(|| {
                anyhow!(
                    "could not read the contents of a config file `{}`",
                    path.display()
                )
            })?;
        }

        let mut cfg: Config = toml::from_str(&contents)
            .with_context(|| anyhow!("could not load the config file `{}`", path.display()))?;

        if let Some(parent) = path.parent() {
            cfg.resolve_relative_paths(parent);
        }

        info!("Loaded a config file `{}`", path.display());

        return Ok(cfg);
    }

    info!("Using the default config");

    Ok(Default::default())
}
