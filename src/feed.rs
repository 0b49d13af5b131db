mod cache;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use rss::extension::itunes::{ITunesChannelExtensionBuilder, NAMESPACE as ITUNES_NAMESPACE};
use rss::{ChannelBuilder, EnclosureBuilder, GuidBuilder, ImageBuilder, Item, ItemBuilder};
use time::format_description::well_known::Rfc2822;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::Config;
use crate::recordings::{self, RecordedFile, SCHEDULE_TOLERANCE_MINUTES};
use crate::schedule::ProgramSchedule;

pub use self::cache::{FeedCache, FeedKey};

const LOGO_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const DEFAULT_LOGO: &str = "default.png";
const AUDIO_MIME_TYPE: &str = "audio/mp4";

/// A feed to be served: either for one program or for all recordings.
#[derive(Debug, Clone, Copy)]
pub struct FeedRequest<'a> {
    pub program: Option<&'a ProgramSchedule>,

    /// `scheme://host/prefix/`, with a trailing slash.
    pub base_url: &'a str,
}

impl<'a> FeedRequest<'a> {
    pub fn all(base_url: &'a str) -> Self {
        Self {
            program: None,
            base_url,
        }
    }

    pub fn program(program: &'a ProgramSchedule, base_url: &'a str) -> Self {
        Self {
            program: Some(program),
            base_url,
        }
    }

    pub fn cache_key(&self) -> FeedKey {
        FeedKey {
            program_id: self.program.map(|program| program.id.clone()),
            schedule: self
                .program
                .map(ProgramSchedule::start_times)
                .unwrap_or_default(),
            base_url: self.base_url.into(),
        }
    }

    /// Builds the RSS document from the recordings currently on disk.
    pub fn build(&self, cfg: &Config) -> Result<String> {
        let files = recordings::list_files(&cfg.recordings_dir)?;
        let total = files.len();
        let files = match self.program {
            Some(program) => {
                let files = recordings::filter_by_schedule(
                    files,
                    &program.start_times(),
                    SCHEDULE_TOLERANCE_MINUTES,
                );
                debug!(
                    "Filtered {total} files to {} for the program `{}`",
                    files.len(),
                    program.id
                );

                files
            }

            None => files,
        };

        if files.is_empty() {
            warn!("No recordings found in `{}`", cfg.recordings_dir.display());
        }

        let (title, link) = match self.program {
            Some(program) => (program.name.clone(), format!("{}{}/", self.base_url, program.id)),
            None => (cfg.feed_title.clone(), self.base_url.to_string()),
        };
        let logo = format!(
            "{}logo/{}",
            self.base_url,
            logo_file(&cfg.logo_dir, self.program.map(|program| program.id.as_str())),
        );

        let itunes = ITunesChannelExtensionBuilder::default()
            .author(Some(cfg.feed_title.clone()))
            .explicit(Some("false".to_string()))
            .image(Some(logo.clone()))
            .summary(Some(cfg.feed_description.clone()))
            .build();

        let mut channel = ChannelBuilder::default();
        channel
            .namespaces(BTreeMap::from([(
                "itunes".to_string(),
                ITUNES_NAMESPACE.to_string(),
            )]))
            .title(title.clone())
            .link(link)
            .description(cfg.feed_description.clone())
            .language(Some(cfg.feed_language.clone()))
            .last_build_date({
                let now = cfg.timezone.now();

                now.format(&Rfc2822)
                    .inspect_err(|e| warn!("Could not format the last build date ({now}): {e}"))
                    .ok()
            })
            .generator(Some(format!("radiocast {}", env!("CARGO_PKG_VERSION"))))
            .image(Some(
                ImageBuilder::default()
                    .url(logo)
                    .title(title)
                    .link(self.base_url.to_string())
                    .build(),
            ))
            .itunes_ext(Some(itunes));

        for file in &files {
            match self.item(cfg, file) {
                Ok(item) => {
                    channel.item(item);
                }

                Err(e) => warn!("Failed to process the file `{}`: {e:#}", file.name),
            }
        }

        Ok(channel.build().to_string())
    }

    fn item(&self, cfg: &Config, file: &RecordedFile) -> Result<Item> {
        static TITLE_FORMAT: &[BorrowedFormatItem<'_>] =
            format_description!("[year]-[month]-[day] [hour]:[minute] Recording");

        let modified = cfg.timezone.convert(OffsetDateTime::from(file.modified));
        let title = modified
            .format(TITLE_FORMAT)
            .with_context(|| format!("could not format the date {modified}"))?;
        let pub_date = modified
            .format(&Rfc2822)
            .with_context(|| format!("could not format the publication date {modified}"))?;

        Ok(ItemBuilder::default()
            .title(Some(title))
            .enclosure(Some(
                EnclosureBuilder::default()
                    .url(format!("{}{}", self.base_url, urlencoding::encode(&file.name)))
                    .length(file.size.to_string())
                    .mime_type(AUDIO_MIME_TYPE.to_string())
                    .build(),
            ))
            .guid(Some(
                GuidBuilder::default()
                    .value(file.name.clone())
                    .permalink(false)
                    .build(),
            ))
            .pub_date(Some(pub_date))
            .build())
    }
}

/// Logo shown for a feed: `<program id>.{png,jpg,jpeg}` if present in `logo_dir`, otherwise the
/// default logo.
pub fn logo_file(logo_dir: &Path, program_id: Option<&str>) -> String {
    program_id
        .into_iter()
        .flat_map(|id| LOGO_EXTENSIONS.iter().map(move |ext| format!("{id}.{ext}")))
        .find(|name| logo_dir.join(name).is_file())
        .unwrap_or_else(|| DEFAULT_LOGO.into())
}
