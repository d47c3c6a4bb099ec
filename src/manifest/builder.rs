//! Manifest document construction.

use super::model::{AdaptationSet, DurationParts, Mpd, Period, PresentationType, ProgramInformation};
use crate::config::ManifestConfig;

/// Build the single-period static document for `adaptation_sets`.
///
/// The period starts at zero and lasts `period_duration_secs`, which is also
/// the presentation duration.
pub fn build_manifest(
    adaptation_sets: Vec<AdaptationSet>,
    period_duration_secs: f64,
    config: &ManifestConfig,
) -> Mpd {
    let duration = DurationParts::from_secs(period_duration_secs);

    Mpd {
        profiles: config.profile.clone(),
        presentation_type: PresentationType::Static,
        min_buffer_time: DurationParts::from_secs(config.min_buffer_time_secs),
        media_presentation_duration: duration,
        program_information: config
            .program_information_url
            .as_ref()
            .map(|url| ProgramInformation {
                more_information_url: url.clone(),
            }),
        periods: vec![Period {
            id: "0".to_string(),
            start: DurationParts::from_secs(0.0),
            duration,
            adaptation_sets,
        }],
    }
}
