//! Run log line format.
//!
//! Job events are recorded as HTML fragments so the log tail can be shown
//! as-is. Every job line embeds an instance marker `<!--JOBID:<id>:JOBID-->`
//! used to cross-reference launch and completion lines. Launch lines carry
//! running and cancel links styled `display:inline`, the running glyph and a
//! stage placeholder; completion lines end with the completion marker.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Written once at startup after the banner; rendering starts after it.
pub const READY_MARKER: &str = "--BACILLUS READY--";

/// Terminates every completion line.
pub const COMPLETION_MARKER: &str = "<!--COMPLETION-->";

/// Reserved spot in a launch line where live stage text is spliced.
pub const STAGE_PLACEHOLDER: &str = "<!--:STAGE:-->";

/// In-progress marker of a launch line.
pub const RUNNING_GLYPH: &str = "[&acd;]";

/// Style fragment of the affordances hidden once a job has completed.
pub const VISIBLE_AFFORDANCE: &str = "display:inline";
pub const HIDDEN_AFFORDANCE: &str = "display:none";

const MARKER_OPEN: &str = "<!--JOBID:";
const MARKER_CLOSE: &str = ":JOBID-->";

const THROBBER_STYLE: &str = "border:none; border-width:0px; width:0.8em; margin:0px; padding:0px;";

/// Background colours cycled through by successive launches.
pub const PALETTE: [&str; 18] = [
    "floralwhite",
    "burlywood",
    "cadetblue",
    "chocolate",
    "coral",
    "cornflowerblue",
    "cornsilk",
    "darkcyan",
    "darkgoldenrod",
    "darkgrey",
    "darkkhaki",
    "darkorange",
    "darksalmon",
    "darkseagreen",
    "darkturquoise",
    "gainsboro",
    "gold",
    "goldenrod",
];

/// How concurrent job lines are told apart in the log view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorStyle {
    None,
    Indent,
    Colour,
    #[default]
    Both,
}

impl IndicatorStyle {
    pub fn uses_colour(self) -> bool {
        matches!(self, Self::Colour | Self::Both)
    }

    pub fn uses_indent(self) -> bool {
        matches!(self, Self::Indent | Self::Both)
    }
}

impl FromStr for IndicatorStyle {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "indent" => Ok(Self::Indent),
            "colour" | "color" => Ok(Self::Colour),
            "both" => Ok(Self::Both),
            other => Err(CoreError::Validation(format!(
                "unknown indicator style '{other}' (expected none, indent, colour or both)"
            ))),
        }
    }
}

impl fmt::Display for IndicatorStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Indent => "indent",
            Self::Colour => "colour",
            Self::Both => "both",
        };
        f.write_str(s)
    }
}

/// Per-instance visual decoration, fixed at launch and reused for the
/// completion line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub colour: &'static str,
    pub indent: String,
}

impl Decoration {
    /// `launch_index` is the engine's running launch counter.
    pub fn new(style: IndicatorStyle, launch_index: u32, instance_id: &str) -> Self {
        let colour = if style.uses_colour() {
            PALETTE[launch_index as usize % PALETTE.len()]
        } else {
            PALETTE[0]
        };
        let indent = if style.uses_indent() {
            let n = instance_id.parse::<u64>().unwrap_or(0);
            "-".repeat((n % 8) as usize + 4)
        } else {
            String::new()
        };
        Self { colour, indent }
    }
}

/// The fields shared by an instance's launch and completion lines.
#[derive(Debug, Clone, Copy)]
pub struct JobLine<'a> {
    pub instance_id: &'a str,
    pub tag: &'a str,
    pub decoration: &'a Decoration,
    /// Relative URL of the live console view.
    pub console_url: &'a str,
    /// URL of the instance's artifact directory.
    pub artifacts_url: &'a str,
}

/// How an instance ended, for its completion line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success,
    Failed(u8),
    Cancelled,
}

impl Completion {
    pub fn from_status(status: u8, cancelled: bool) -> Self {
        match (status, cancelled) {
            (_, true) => Self::Cancelled,
            (0, false) => Self::Success,
            (s, false) => Self::Failed(s),
        }
    }
}

pub fn instance_marker(instance_id: &str) -> String {
    format!("{MARKER_OPEN}{instance_id}{MARKER_CLOSE}")
}

/// The instance id embedded in a log line, if any.
pub fn extract_instance_id(line: &str) -> Option<&str> {
    let start = line.find(MARKER_OPEN)? + MARKER_OPEN.len();
    let len = line[start..].find(MARKER_CLOSE)?;
    Some(&line[start..start + len])
}

pub fn is_completion(line: &str) -> bool {
    line.contains(COMPLETION_MARKER)
}

/// Whether a line is a launch line that has not been visually resolved.
pub fn is_running_launch(line: &str) -> bool {
    line.contains(STAGE_PLACEHOLDER) && line.contains(RUNNING_GLYPH)
}

pub fn launch_line(job: &JobLine<'_>) -> String {
    let JobLine {
        instance_id: id,
        tag,
        decoration,
        console_url,
        ..
    } = *job;
    format!(
        "{marker}<span style='background-color:{colour}'>\
         <a style='{VISIBLE_AFFORDANCE};' href='{console_url}' title='Running'>{RUNNING_GLYPH}</a>\
         {indent}[{tag}{{{id}}}\
         <a style='{VISIBLE_AFFORDANCE};' href='/cancel?id={id}' title='Cancel'>[&cross;]</a> triggered.]\
         {STAGE_PLACEHOLDER}</span>",
        marker = instance_marker(id),
        colour = decoration.colour,
        indent = decoration.indent,
    )
}

/// The completion line; `stage` is the already-formatted stage suffix (see
/// [`finished_stage_markup`]) or empty.
pub fn completion_line(job: &JobLine<'_>, completion: Completion, stage: &str) -> String {
    let JobLine {
        instance_id: id,
        tag,
        decoration,
        console_url,
        artifacts_url,
    } = *job;
    let marker = instance_marker(id);
    let colour = decoration.colour;
    let indent = &decoration.indent;
    match completion {
        Completion::Success => format!(
            "{marker}<span style='background-color:{colour}'>\
             <a href='{console_url}' title='Done'>[&check;]</a>\
             {indent}[{tag}{{{id}}}<a href='{artifacts_url}' title='Artifacts'>[&ccupssm;]</a> \
             completed with status 0]{stage}</span>{COMPLETION_MARKER}"
        ),
        Completion::Failed(_) | Completion::Cancelled => {
            let reason = match completion {
                Completion::Failed(status) => format!("exit status {status}"),
                _ => "signal: killed".to_string(),
            };
            format!(
                "{marker}<span style='background-color:{colour}'>\
                 <span style='background-color:red'><a href='{console_url}' title='Done With Errors'>[!]</a></span>\
                 {indent}[{tag}{{{id}}}<a href='{artifacts_url}' title='Partial Artifacts'>[&ccups;]</a> \
                 completed with error {reason}]{stage}</span>{COMPLETION_MARKER}"
            )
        }
    }
}

/// Stage suffix of a completion line: ` |<summary>|`, or `|???|` when the
/// job never reported a stage.
pub fn finished_stage_markup(summary: Option<&str>) -> String {
    match summary {
        Some(s) => format!(" |{s}|"),
        None => "|???|".to_string(),
    }
}

/// Live stage markup spliced into a running launch line.
pub fn live_stage_markup(summary: &str) -> String {
    format!(
        " |<strong>{summary}<img style='{THROBBER_STYLE} padding-left:1px;' \
         src='images/stage-throbber.gif'/></strong>|"
    )
}

/// Animated replacement for [`RUNNING_GLYPH`] on lines of running instances.
pub fn running_throbber() -> String {
    format!("<img style='{THROBBER_STYLE}' src='images/run-throbber.gif'/>")
}

pub fn workspace_error_line(tag: &str, error: impl fmt::Display) -> String {
    format!("[ERROR creating workdir ({error}) for job {tag} trigger.]")
}

pub fn launch_error_line(decoration: &Decoration, tag: &str) -> String {
    format!("{}[ERROR on job {tag} trigger.]", decoration.indent)
}
