//! In-memory MPD document.

/// `MPD@type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationType {
    Static,
}

impl PresentationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresentationType::Static => "static",
        }
    }
}

/// Hours/minutes/seconds split of a duration, rounded to the millisecond;
/// `seconds` keeps the fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationParts {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: f64,
}

impl DurationParts {
    pub fn from_secs(total: f64) -> Self {
        let total = if total.is_finite() && total > 0.0 {
            total
        } else {
            0.0
        };
        // round first so a carry reaches minutes and hours
        let millis = (total * 1000.0).round() as u64;
        let whole = millis / 1000;
        let fraction = (millis % 1000) as f64 / 1000.0;
        Self {
            hours: whole / 3600,
            minutes: (whole % 3600) / 60,
            seconds: (whole % 60) as f64 + fraction,
        }
    }

    pub fn total_secs(&self) -> f64 {
        (self.hours * 3600 + self.minutes * 60) as f64 + self.seconds
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInformation {
    pub more_information_url: String,
}

/// `ContentProtection` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentProtection {
    pub scheme_id_uri: String,
    pub value: Option<String>,
    /// `cenc:default_KID`, canonical UUID form
    pub default_kid: Option<String>,
    /// `cenc:pssh`, base64 of a complete `pssh` box
    pub pssh: Option<String>,
}

/// Attributes allowed on both `AdaptationSet` and `Representation`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonAttributes {
    pub mime_type: Option<String>,
    pub codecs: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<String>,
    pub audio_sampling_rate: Option<u32>,
}

/// Byte ranges of the on-demand single-file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentBase {
    pub index_range: (u64, u64),
    pub initialization: (u64, u64),
}

/// Manifest-facing description of one representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepresentationDescriptor {
    pub id: String,
    pub base_url: String,
    pub bandwidth: u64,
    pub common: CommonAttributes,
    /// Only emitted on the adaptation set
    pub lang: Option<String>,
    pub content_protection: Vec<ContentProtection>,
    pub segment_base: Option<SegmentBase>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptationSet {
    pub content_type: Option<String>,
    pub lang: Option<String>,
    pub common: CommonAttributes,
    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_height: Option<u32>,
    pub min_bandwidth: Option<u64>,
    pub max_bandwidth: Option<u64>,
    pub subsegment_alignment: bool,
    pub subsegment_starts_with_sap: Option<u8>,
    pub content_protection: Vec<ContentProtection>,
    pub representations: Vec<RepresentationDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub id: String,
    pub start: DurationParts,
    pub duration: DurationParts,
    pub adaptation_sets: Vec<AdaptationSet>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mpd {
    pub profiles: String,
    pub presentation_type: PresentationType,
    pub min_buffer_time: DurationParts,
    pub media_presentation_duration: DurationParts,
    pub program_information: Option<ProgramInformation>,
    pub periods: Vec<Period>,
}

impl Mpd {
    pub fn adaptation_sets(&self) -> impl Iterator<Item = &AdaptationSet> {
        self.periods.iter().flat_map(|p| p.adaptation_sets.iter())
    }

    /// Whether any element carries `ContentProtection`.
    pub fn is_protected(&self) -> bool {
        self.adaptation_sets().any(|set| {
            !set.content_protection.is_empty()
                || set
                    .representations
                    .iter()
                    .any(|r| !r.content_protection.is_empty())
        })
    }
}
