//! Segment splitting for generated sales scripts
//!
//! A generated script is expected to contain up to five plot stages
//! (`プロット①` .. `プロット⑤`) followed by an anticipated Q&A block
//! (`想定Q&A`). The model is not strict about the header format, so each
//! segment has an ordered list of candidate patterns; the first candidate
//! that matches anywhere in the text decides that segment's header.
//!
//! The candidate table is plain data: supporting a new header spelling means
//! adding a pattern string, not touching the splitting logic.

use regex::Regex;
use std::sync::OnceLock;

/// Named segment of a generated script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptSection {
    Plot1,
    Plot2,
    Plot3,
    Plot4,
    Plot5,
    QandA,
}

impl ScriptSection {
    pub const ALL: [ScriptSection; 6] = [
        ScriptSection::Plot1,
        ScriptSection::Plot2,
        ScriptSection::Plot3,
        ScriptSection::Plot4,
        ScriptSection::Plot5,
        ScriptSection::QandA,
    ];

    /// Key used in configuration (`[export.layout]`)
    pub fn key(&self) -> &'static str {
        match self {
            ScriptSection::Plot1 => "plot1",
            ScriptSection::Plot2 => "plot2",
            ScriptSection::Plot3 => "plot3",
            ScriptSection::Plot4 => "plot4",
            ScriptSection::Plot5 => "plot5",
            ScriptSection::QandA => "qa",
        }
    }
}

/// Header candidates per segment, highest priority first
const SECTION_CANDIDATES: &[(ScriptSection, &[&str])] = &[
    (
        ScriptSection::Plot1,
        &[r"【\s*プロット\s*①\s*】", r"プロット\s*①", r"プロット\s*[1１]"],
    ),
    (
        ScriptSection::Plot2,
        &[r"【\s*プロット\s*②\s*】", r"プロット\s*②", r"プロット\s*[2２]"],
    ),
    (
        ScriptSection::Plot3,
        &[r"【\s*プロット\s*③\s*】", r"プロット\s*③", r"プロット\s*[3３]"],
    ),
    (
        ScriptSection::Plot4,
        &[r"【\s*プロット\s*④\s*】", r"プロット\s*④", r"プロット\s*[4４]"],
    ),
    (
        ScriptSection::Plot5,
        &[r"【\s*プロット\s*⑤\s*】", r"プロット\s*⑤", r"プロット\s*[5５]"],
    ),
    (
        ScriptSection::QandA,
        &[
            r"【\s*想定\s*[QＱ]\s*[&＆]\s*[AＡ]\s*】",
            r"想定\s*[QＱ]\s*[&＆]\s*[AＡ]",
            r"[QＱ]\s*[&＆]\s*[AＡ]\s*集",
            r"[QＱ]\s*[&＆]\s*[AＡ]",
        ],
    ),
];

fn compiled_candidates() -> &'static Vec<(ScriptSection, Vec<Regex>)> {
    static COMPILED: OnceLock<Vec<(ScriptSection, Vec<Regex>)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        SECTION_CANDIDATES
            .iter()
            .map(|(section, patterns)| {
                let regexes = patterns
                    .iter()
                    .map(|p| Regex::new(p).expect("valid section pattern"))
                    .collect();
                (*section, regexes)
            })
            .collect()
    })
}

/// Script split into its named segments
///
/// Segments without a recognizable header are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptSections {
    pub plots: [String; 5],
    pub qa: String,
}

impl ScriptSections {
    pub fn get(&self, section: ScriptSection) -> &str {
        match section {
            ScriptSection::Plot1 => &self.plots[0],
            ScriptSection::Plot2 => &self.plots[1],
            ScriptSection::Plot3 => &self.plots[2],
            ScriptSection::Plot4 => &self.plots[3],
            ScriptSection::Plot5 => &self.plots[4],
            ScriptSection::QandA => &self.qa,
        }
    }

    fn set(&mut self, section: ScriptSection, body: String) {
        match section {
            ScriptSection::Plot1 => self.plots[0] = body,
            ScriptSection::Plot2 => self.plots[1] = body,
            ScriptSection::Plot3 => self.plots[2] = body,
            ScriptSection::Plot4 => self.plots[3] = body,
            ScriptSection::Plot5 => self.plots[4] = body,
            ScriptSection::QandA => self.qa = body,
        }
    }

    /// True when no segment header was found at all
    pub fn is_empty(&self) -> bool {
        self.plots.iter().all(String::is_empty) && self.qa.is_empty()
    }
}

/// Header occurrence located in the script
#[derive(Debug, Clone, Copy)]
struct HeaderMatch {
    section: ScriptSection,
    start: usize,
    end: usize,
}

fn locate_headers(text: &str) -> Vec<HeaderMatch> {
    let mut matches: Vec<HeaderMatch> = compiled_candidates()
        .iter()
        .filter_map(|(section, candidates)| {
            candidates.iter().find_map(|re| {
                re.find(text).map(|m| HeaderMatch {
                    section: *section,
                    start: m.start(),
                    end: m.end(),
                })
            })
        })
        .collect();

    matches.sort_by_key(|m| m.start);

    // Overlapping headers would produce overlapping bodies; keep the earlier one.
    let mut kept: Vec<HeaderMatch> = Vec::with_capacity(matches.len());
    for m in matches {
        if kept.last().map_or(true, |prev| m.start >= prev.end) {
            kept.push(m);
        }
    }
    kept
}

/// Split generated text into plot stages and the Q&A block
///
/// Segments are ordered by where their header appears. Each body runs from
/// just after its own header to the start of the next matched header (or the
/// end of the text) and is trimmed.
pub fn split_script_by_sections(text: &str) -> ScriptSections {
    let headers = locate_headers(text);
    let mut sections = ScriptSections::default();

    for (i, header) in headers.iter().enumerate() {
        let body_end = headers.get(i + 1).map_or(text.len(), |next| next.start);
        let body = text[header.end..body_end].trim().to_string();
        sections.set(header.section, body);
    }

    sections
}
