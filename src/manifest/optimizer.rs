//! Structural simplification of a built manifest.

use super::model::{AdaptationSet, CommonAttributes, Mpd, RepresentationDescriptor};

/// Normalize every adaptation set of `mpd` in place.
///
/// Attributes shared by all representations of a set move to the set,
/// differing sizes and bandwidths become `min*`/`max*` bounds, `contentType`
/// is derived from the MIME type and on-demand sets get subsegment alignment.
pub fn optimize(mpd: &mut Mpd) {
    for period in &mut mpd.periods {
        for set in &mut period.adaptation_sets {
            optimize_set(set);
        }
    }
}

/// Take `field` off every representation when it is set and identical on
/// all of them.
fn hoist<T, F>(representations: &mut [RepresentationDescriptor], field: F) -> Option<T>
where
    T: Clone + PartialEq,
    F: Fn(&mut RepresentationDescriptor) -> &mut Option<T>,
{
    let (first, rest) = representations.split_first_mut()?;
    let value = field(first).clone()?;
    if !rest.iter_mut().all(|r| field(r).as_ref() == Some(&value)) {
        return None;
    }
    for representation in representations.iter_mut() {
        *field(representation) = None;
    }
    Some(value)
}

fn hoist_common(set: &mut AdaptationSet) {
    let reps = &mut set.representations;
    let common = &mut set.common;

    fn merge<T>(target: &mut Option<T>, value: Option<T>) {
        if value.is_some() {
            *target = value;
        }
    }

    merge(&mut common.mime_type, hoist(reps, |r| &mut r.common.mime_type));
    merge(&mut common.codecs, hoist(reps, |r| &mut r.common.codecs));
    merge(&mut common.width, hoist(reps, |r| &mut r.common.width));
    merge(&mut common.height, hoist(reps, |r| &mut r.common.height));
    merge(&mut common.frame_rate, hoist(reps, |r| &mut r.common.frame_rate));
    merge(
        &mut common.audio_sampling_rate,
        hoist(reps, |r| &mut r.common.audio_sampling_rate),
    );
    merge(&mut set.lang, hoist(reps, |r| &mut r.lang));
}

fn hoist_content_protection(set: &mut AdaptationSet) {
    let Some((first, rest)) = set.representations.split_first() else {
        return;
    };
    if first.content_protection.is_empty()
        || rest
            .iter()
            .any(|r| r.content_protection != first.content_protection)
    {
        return;
    }
    set.content_protection = first.content_protection.clone();
    for representation in &mut set.representations {
        representation.content_protection.clear();
    }
}

fn bounds<T: Copy + Ord>(values: impl Iterator<Item = T>) -> Option<(T, T)> {
    let values: Vec<T> = values.collect();
    let min = *values.iter().min()?;
    let max = *values.iter().max()?;
    (min != max).then_some((min, max))
}

fn set_bounds(set: &mut AdaptationSet) {
    let reps = &set.representations;
    if set.common.width.is_none() {
        if let Some((min, max)) = bounds(reps.iter().filter_map(|r| r.common.width)) {
            set.min_width = Some(min);
            set.max_width = Some(max);
        }
    }
    if set.common.height.is_none() {
        if let Some((min, max)) = bounds(reps.iter().filter_map(|r| r.common.height)) {
            set.min_height = Some(min);
            set.max_height = Some(max);
        }
    }
    if let Some((min, max)) = bounds(reps.iter().map(|r| r.bandwidth)) {
        set.min_bandwidth = Some(min);
        set.max_bandwidth = Some(max);
    }
}

fn content_type(common: &CommonAttributes, reps: &[RepresentationDescriptor]) -> Option<String> {
    let mime = common
        .mime_type
        .as_deref()
        .or_else(|| reps.iter().find_map(|r| r.common.mime_type.as_deref()))?;
    let (kind, _) = mime.split_once('/')?;
    Some(kind.to_string())
}

fn optimize_set(set: &mut AdaptationSet) {
    if set.representations.is_empty() {
        return;
    }
    hoist_common(set);
    hoist_content_protection(set);
    set_bounds(set);

    if set.content_type.is_none() {
        set.content_type = content_type(&set.common, &set.representations);
    }
    if set.representations.iter().all(|r| r.segment_base.is_some()) {
        set.subsegment_alignment = true;
        set.subsegment_starts_with_sap = Some(1);
    }
}
