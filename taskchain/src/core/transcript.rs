//! Tagged-section parser for GUI-agent transcripts.
//!
//! Backends that drive a desktop or phone print their reasoning as
//! `### Thought ###`, `### Action ###` and `### Operation ###` sections. A
//! transcript without any recognizable section, or a section with no body, is an
//! explicit [`TranscriptSection::ParseFailed`] rather than an empty string.

use std::sync::LazyLock;

use regex::Regex;

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*###[ \t]*(Thought|Action|Operation)[ \t]*###[ \t]*$")
        .expect("section header regex should be valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptSection {
    Thought(String),
    Action(String),
    Operation(String),
    ParseFailed { reason: String },
}

/// Split a transcript into its tagged sections, in document order.
pub fn parse_transcript(text: &str) -> Vec<TranscriptSection> {
    let headers: Vec<_> = SECTION_RE.captures_iter(text).collect();
    if headers.is_empty() {
        return vec![TranscriptSection::ParseFailed {
            reason: "no tagged sections found".to_string(),
        }];
    }

    let mut sections = Vec::with_capacity(headers.len());
    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(tag)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        let body = text[whole.end()..end].trim().to_string();
        if body.is_empty() {
            sections.push(TranscriptSection::ParseFailed {
                reason: format!("empty {} section", tag.as_str()),
            });
            continue;
        }
        sections.push(match tag.as_str() {
            "Thought" => TranscriptSection::Thought(body),
            "Action" => TranscriptSection::Action(body),
            _ => TranscriptSection::Operation(body),
        });
    }
    sections
}

/// The last `Action` body in a transcript, if any.
pub fn last_action(sections: &[TranscriptSection]) -> Option<&str> {
    sections.iter().rev().find_map(|section| match section {
        TranscriptSection::Action(body) => Some(body.as_str()),
        _ => None,
    })
}
