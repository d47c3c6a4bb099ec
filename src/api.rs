use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::config::PackagerConfig;
use crate::container::{self, MediaTrack};
use crate::crypto::ContentKey;
use crate::error::{PackagerError, Result};
use crate::manifest::{build_manifest, optimize, save};
use crate::package::{AdaptationSetGrouper, RunContext};
use crate::representation::{build_representations, BuildOptions};

/// Extension every input must carry
pub const INPUT_EXTENSION: &str = "mp4";

/// One written representation file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenOutput {
    pub id: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageSummary {
    pub manifest_path: PathBuf,
    /// In identifier allocation order
    pub outputs: Vec<WrittenOutput>,
    pub period_duration_secs: f64,
    pub adaptation_set_count: usize,
}

/// Pipeline driver: inputs in, representation files and a manifest out.
#[derive(Debug, Clone, Default)]
pub struct Packager {
    config: PackagerConfig,
    key: Option<ContentKey>,
}

impl Packager {
    pub fn new(config: PackagerConfig) -> Self {
        Self { config, key: None }
    }

    /// Encrypt one layer of every layered representation with `key`.
    pub fn with_key(mut self, key: Option<ContentKey>) -> Self {
        self.key = key;
        self
    }

    pub fn config(&self) -> &PackagerConfig {
        &self.config
    }

    /// Package `inputs` into `output_dir`.
    ///
    /// Every input is checked and turned into representations before anything
    /// is written; any failure aborts the run.
    pub fn package<P: AsRef<Path>>(&self, inputs: &[P], output_dir: &Path) -> Result<PackageSummary> {
        self.config.validate()?;

        for input in inputs {
            check_extension(input.as_ref())?;
        }

        let options = BuildOptions::new(&self.config.representation)
            .with_key(self.key.as_ref(), self.config.encryption.layer);
        let mut ctx = RunContext::new();
        for input in inputs {
            let path = input.as_ref();
            info!(path = %path.display(), "processing input");
            let tracks: Vec<Box<dyn MediaTrack>> = container::open(path)?
                .into_iter()
                .map(|track| Box::new(track) as Box<dyn MediaTrack>)
                .collect();
            ctx.record(build_representations(path, tracks, &options)?);
        }

        let period_duration_secs = ctx.period_duration_secs();
        let identified = ctx.assign_identifiers()?;

        ensure_output_dir(output_dir);

        let mut grouper = AdaptationSetGrouper::new();
        let mut outputs = Vec::with_capacity(identified.len());
        for item in identified {
            let representation = item.representation;
            let path = output_dir.join(format!("{}.mp4", item.id));
            let written =
                container::write(&representation.tracks(), &representation.write_options(), &path)?;
            info!(
                id = %item.id,
                path = %path.display(),
                fragments = written.fragment_count,
                bytes = written.file_size,
                "wrote representation"
            );

            grouper.add(
                &representation.content_signature(),
                representation.describe(&item.id, &written),
            );
            outputs.push(WrittenOutput {
                id: item.id,
                path,
                size: written.file_size,
            });
        }

        let adaptation_set_count = grouper.len();
        let mut mpd = build_manifest(
            grouper.into_adaptation_sets(),
            period_duration_secs,
            &self.config.manifest,
        );
        optimize(&mut mpd);

        let manifest_path = output_dir.join(&self.config.manifest.file_name);
        save(&mpd, &manifest_path)?;
        info!(
            path = %manifest_path.display(),
            representations = outputs.len(),
            adaptation_sets = adaptation_set_count,
            duration_secs = period_duration_secs,
            "wrote manifest"
        );

        Ok(PackageSummary {
            manifest_path,
            outputs,
            period_duration_secs,
            adaptation_set_count,
        })
    }
}

fn check_extension(path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(INPUT_EXTENSION) => Ok(()),
        _ => Err(PackagerError::InputFormat(path.to_path_buf())),
    }
}

/// Create `dir` when missing. Failure is reported but not fatal; writing
/// into it will fail later if it really is unusable.
fn ensure_output_dir(dir: &Path) {
    if dir.is_dir() {
        return;
    }
    if let Err(e) = std::fs::create_dir_all(dir) {
        let err = PackagerError::OutputDirectory(dir.to_path_buf());
        warn!(error = %e, "{}", err);
    }
}

/// Parse the optional key id / key pair of a run. Both or neither must be
/// given.
pub fn parse_key(key_id: Option<&str>, key: Option<&str>) -> Result<Option<ContentKey>> {
    match (key_id, key) {
        (Some(key_id), Some(key)) => ContentKey::parse(key_id, key).map(Some),
        (None, None) => Ok(None),
        _ => Err(PackagerError::Encryption(
            "key id and key must be given together".to_string(),
        )),
    }
}

/// Run the packager with `config` and return the process exit status.
pub fn run_with_config(
    config: PackagerConfig,
    inputs: &[PathBuf],
    output_dir: &Path,
    key_id: Option<&str>,
    key: Option<&str>,
) -> i32 {
    let result = parse_key(key_id, key)
        .and_then(|key| Packager::new(config).with_key(key).package(inputs, output_dir));
    match result {
        Ok(summary) => {
            info!(
                manifest = %summary.manifest_path.display(),
                "packaging finished"
            );
            0
        }
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    }
}

/// Run the packager with the default configuration and return the process
/// exit status: 0 on success, `PackagerError::exit_code` otherwise.
pub fn run(inputs: &[PathBuf], output_dir: &Path, key_id: Option<&str>, key: Option<&str>) -> i32 {
    run_with_config(PackagerConfig::default(), inputs, output_dir, key_id, key)
}
