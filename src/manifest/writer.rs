//! MPD serialization with quick-xml.

use std::io::Cursor;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::model::{
    AdaptationSet, CommonAttributes, ContentProtection, DurationParts, Mpd,
    RepresentationDescriptor, SegmentBase,
};
use crate::error::{PackagerError, Result};

const MPD_NAMESPACE: &str = "urn:mpeg:dash:schema:mpd:2011";
const CENC_NAMESPACE: &str = "urn:mpeg:cenc:2013";

fn xml_error<E: std::fmt::Display>(e: E) -> PackagerError {
    PackagerError::Manifest(e.to_string())
}

/// ISO-8601 duration: `PT1H2M3.5S`, `PT0S` for zero.
pub fn format_duration(parts: &DurationParts) -> String {
    if parts.total_secs() <= 0.0 {
        return "PT0S".to_string();
    }
    let mut out = String::from("PT");
    if parts.hours > 0 {
        out.push_str(&format!("{}H", parts.hours));
    }
    if parts.minutes > 0 {
        out.push_str(&format!("{}M", parts.minutes));
    }
    if parts.seconds > 0.0 {
        let seconds = format!("{:.3}", parts.seconds);
        let seconds = seconds.trim_end_matches('0').trim_end_matches('.');
        if seconds != "0" {
            out.push_str(seconds);
            out.push('S');
        }
    }
    if out == "PT" {
        out.push_str("0S");
    }
    out
}

fn push_common(elem: &mut BytesStart<'_>, common: &CommonAttributes) {
    if let Some(mime_type) = &common.mime_type {
        elem.push_attribute(("mimeType", mime_type.as_str()));
    }
    if let Some(codecs) = &common.codecs {
        elem.push_attribute(("codecs", codecs.as_str()));
    }
    if let Some(width) = common.width {
        elem.push_attribute(("width", width.to_string().as_str()));
    }
    if let Some(height) = common.height {
        elem.push_attribute(("height", height.to_string().as_str()));
    }
    if let Some(frame_rate) = &common.frame_rate {
        elem.push_attribute(("frameRate", frame_rate.as_str()));
    }
    if let Some(rate) = common.audio_sampling_rate {
        elem.push_attribute(("audioSamplingRate", rate.to_string().as_str()));
    }
}

fn push_opt<T: ToString>(elem: &mut BytesStart<'_>, name: &str, value: Option<T>) {
    if let Some(value) = value {
        elem.push_attribute((name, value.to_string().as_str()));
    }
}

struct MpdWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl MpdWriter {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(xml_error)
    }

    fn start(&mut self, elem: &BytesStart<'_>) -> Result<()> {
        self.event(Event::Start(elem.borrow()))
    }

    fn empty(&mut self, elem: &BytesStart<'_>) -> Result<()> {
        self.event(Event::Empty(elem.borrow()))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(&BytesStart::new(name))?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn content_protection(&mut self, protection: &ContentProtection) -> Result<()> {
        let mut elem = BytesStart::new("ContentProtection");
        elem.push_attribute(("schemeIdUri", protection.scheme_id_uri.as_str()));
        if let Some(value) = &protection.value {
            elem.push_attribute(("value", value.as_str()));
        }
        if let Some(kid) = &protection.default_kid {
            elem.push_attribute(("cenc:default_KID", kid.as_str()));
        }
        match &protection.pssh {
            Some(pssh) => {
                self.start(&elem)?;
                self.text_element("cenc:pssh", pssh)?;
                self.end("ContentProtection")
            }
            None => self.empty(&elem),
        }
    }

    fn segment_base(&mut self, segment_base: &SegmentBase) -> Result<()> {
        let (index_start, index_end) = segment_base.index_range;
        let (init_start, init_end) = segment_base.initialization;
        let mut elem = BytesStart::new("SegmentBase");
        elem.push_attribute(("indexRange", format!("{}-{}", index_start, index_end).as_str()));
        self.start(&elem)?;
        let mut init = BytesStart::new("Initialization");
        init.push_attribute(("range", format!("{}-{}", init_start, init_end).as_str()));
        self.empty(&init)?;
        self.end("SegmentBase")
    }

    fn representation(&mut self, rep: &RepresentationDescriptor) -> Result<()> {
        let mut elem = BytesStart::new("Representation");
        elem.push_attribute(("id", rep.id.as_str()));
        elem.push_attribute(("bandwidth", rep.bandwidth.to_string().as_str()));
        push_common(&mut elem, &rep.common);
        self.start(&elem)?;

        for protection in &rep.content_protection {
            self.content_protection(protection)?;
        }
        self.text_element("BaseURL", &rep.base_url)?;
        if let Some(segment_base) = &rep.segment_base {
            self.segment_base(segment_base)?;
        }
        self.end("Representation")
    }

    fn adaptation_set(&mut self, set: &AdaptationSet) -> Result<()> {
        let mut elem = BytesStart::new("AdaptationSet");
        push_opt(&mut elem, "contentType", set.content_type.as_deref());
        push_opt(&mut elem, "lang", set.lang.as_deref());
        push_common(&mut elem, &set.common);
        push_opt(&mut elem, "minWidth", set.min_width);
        push_opt(&mut elem, "maxWidth", set.max_width);
        push_opt(&mut elem, "minHeight", set.min_height);
        push_opt(&mut elem, "maxHeight", set.max_height);
        push_opt(&mut elem, "minBandwidth", set.min_bandwidth);
        push_opt(&mut elem, "maxBandwidth", set.max_bandwidth);
        if set.subsegment_alignment {
            elem.push_attribute(("subsegmentAlignment", "true"));
        }
        push_opt(&mut elem, "subsegmentStartsWithSAP", set.subsegment_starts_with_sap);
        self.start(&elem)?;

        for protection in &set.content_protection {
            self.content_protection(protection)?;
        }
        for rep in &set.representations {
            self.representation(rep)?;
        }
        self.end("AdaptationSet")
    }

    fn mpd(&mut self, mpd: &Mpd) -> Result<()> {
        self.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("MPD");
        root.push_attribute(("xmlns", MPD_NAMESPACE));
        if mpd.is_protected() {
            root.push_attribute(("xmlns:cenc", CENC_NAMESPACE));
        }
        root.push_attribute(("profiles", mpd.profiles.as_str()));
        root.push_attribute(("type", mpd.presentation_type.as_str()));
        root.push_attribute(("minBufferTime", format_duration(&mpd.min_buffer_time).as_str()));
        root.push_attribute((
            "mediaPresentationDuration",
            format_duration(&mpd.media_presentation_duration).as_str(),
        ));
        self.start(&root)?;

        if let Some(info) = &mpd.program_information {
            let mut elem = BytesStart::new("ProgramInformation");
            elem.push_attribute(("moreInformationURL", info.more_information_url.as_str()));
            self.empty(&elem)?;
        }

        for period in &mpd.periods {
            let mut elem = BytesStart::new("Period");
            elem.push_attribute(("id", period.id.as_str()));
            elem.push_attribute(("start", format_duration(&period.start).as_str()));
            elem.push_attribute(("duration", format_duration(&period.duration).as_str()));
            self.start(&elem)?;
            for set in &period.adaptation_sets {
                self.adaptation_set(set)?;
            }
            self.end("Period")?;
        }

        self.end("MPD")
    }

    fn finish(self) -> Result<String> {
        let mut bytes = self.writer.into_inner().into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(xml_error)
    }
}

/// Serialize `mpd` to XML text.
pub fn to_xml(mpd: &Mpd) -> Result<String> {
    let mut writer = MpdWriter::new();
    writer.mpd(mpd)?;
    writer.finish()
}

/// Serialize `mpd` and write it to `path`.
pub fn save<P: AsRef<Path>>(mpd: &Mpd, path: P) -> Result<()> {
    let xml = to_xml(mpd)?;
    std::fs::write(path.as_ref(), xml)?;
    Ok(())
}
