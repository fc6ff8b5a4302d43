//! Live view of the run log tail.
//!
//! The log on disk is append-only, so a launch line keeps its running and
//! cancel links forever. [`render`] derives the current visual state of a
//! bounded tail instead, patching copies of the lines:
//!
//! - a launch line whose instance has a later completion line in the window
//!   gets its affordances hidden;
//! - a launch line whose instance is still registered gets an animated
//!   running indicator and, when known, its live stage.
//!
//! Everything else is returned untouched. The function is pure: the same
//! input lines and live set always give the same output.

use std::collections::HashMap;

use crate::types::InstanceId;

use super::line::{
    extract_instance_id, instance_marker, is_completion, is_running_launch, live_stage_markup,
    running_throbber, IndicatorStyle, HIDDEN_AFFORDANCE, RUNNING_GLYPH, STAGE_PLACEHOLDER,
    VISIBLE_AFFORDANCE,
};

/// Upper bound on the number of lines reconciled per render.
pub const MAX_RENDER_WINDOW: usize = 255;

/// Running instances and their current stage summary, if any.
pub type LiveJobs = HashMap<InstanceId, Option<String>>;

/// Render the last `requested` lines (all lines when `requested` is 0).
///
/// Only the newest `min(requested, MAX_RENDER_WINDOW)` lines (or the newest
/// [`MAX_RENDER_WINDOW`] when rendering everything) are reconciled; older
/// lines are passed through verbatim.
pub fn render(
    lines: &[String],
    requested: usize,
    live: &LiveJobs,
    style: IndicatorStyle,
) -> Vec<String> {
    let window = match requested {
        0 => MAX_RENDER_WINDOW,
        n => n.min(MAX_RENDER_WINDOW),
    };
    let window_start = lines.len().saturating_sub(window);
    let mut patched = lines[window_start..].to_vec();

    for idx in (0..patched.len()).rev() {
        if is_completion(&patched[idx]) {
            let Some(id) = extract_instance_id(&patched[idx]) else {
                continue;
            };
            let marker = instance_marker(id);
            for seek in (0..idx).rev() {
                let line = &patched[seek];
                if line.contains(&marker) && !is_completion(line) && line.contains(VISIBLE_AFFORDANCE) {
                    patched[seek] = suppress(line, style);
                }
            }
        } else if is_running_launch(&patched[idx]) && patched[idx].contains(VISIBLE_AFFORDANCE) {
            let stage = extract_instance_id(&patched[idx]).and_then(|id| live.get(id));
            if let Some(stage) = stage {
                patched[idx] = mark_running(&patched[idx], stage.as_deref());
            }
        }
    }

    let output_start = match requested {
        0 => 0,
        n => lines.len().saturating_sub(n),
    };
    let mut out = Vec::with_capacity(lines.len() - output_start);
    out.extend_from_slice(&lines[output_start..window_start.max(output_start)]);
    out.extend(patched.into_iter().skip(output_start.saturating_sub(window_start)));
    out
}

/// Hide the running and cancel links of a completed instance's launch line.
fn suppress(line: &str, style: IndicatorStyle) -> String {
    let hidden = line.replace(VISIBLE_AFFORDANCE, HIDDEN_AFFORDANCE);
    if style.uses_indent() {
        hidden.replacen("---", "------", 1)
    } else if style.uses_colour() {
        hidden.replacen("</a>[", "</a>   [", 1)
    } else {
        hidden
    }
}

fn mark_running(line: &str, stage: Option<&str>) -> String {
    let animated = line.replacen(RUNNING_GLYPH, &running_throbber(), 1);
    match stage {
        Some(summary) => animated.replacen(STAGE_PLACEHOLDER, &live_stage_markup(summary), 1),
        None => animated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runlog::line::{completion_line, launch_line, Completion, Decoration, JobLine};

    fn lines_for(id: &str, style: IndicatorStyle) -> (String, String) {
        let decoration = Decoration::new(style, 0, id);
        let console_url = format!("workdir/bacillus__t_{id}/console.out");
        let artifacts_url = format!("/artifacts/bacillus__t_{id}/");
        let job = JobLine {
            instance_id: id,
            tag: "t",
            decoration: &decoration,
            console_url: &console_url,
            artifacts_url: &artifacts_url,
        };
        (launch_line(&job), completion_line(&job, Completion::Success, ""))
    }

    #[test]
    fn completed_launch_lines_are_suppressed() {
        let (launch, done) = lines_for("12", IndicatorStyle::Both);
        let lines = vec![launch.clone(), "unrelated".to_string(), done.clone()];

        let rendered = render(&lines, 6, &LiveJobs::new(), IndicatorStyle::Both);
        assert_eq!(rendered.len(), 3);
        assert!(!rendered[0].contains(VISIBLE_AFFORDANCE));
        assert_eq!(rendered[0].matches(HIDDEN_AFFORDANCE).count(), 2);
        assert!(rendered[0].contains("------"));
        assert_eq!(rendered[1], "unrelated");
        assert_eq!(rendered[2], done);
        // Input is untouched.
        assert_eq!(lines[0], launch);
    }

    #[test]
    fn running_lines_get_throbber_and_stage() {
        let (launch, _) = lines_for("7", IndicatorStyle::None);
        let lines = vec![launch.clone()];

        let mut live = LiveJobs::new();
        live.insert("7".to_string(), Some("build &compfn; link".to_string()));
        let rendered = render(&lines, 6, &live, IndicatorStyle::None);
        assert!(rendered[0].contains("run-throbber.gif"));
        assert!(!rendered[0].contains(RUNNING_GLYPH));
        assert!(rendered[0].contains("<strong>build &compfn; link<img"));
        assert!(!rendered[0].contains(STAGE_PLACEHOLDER));

        live.insert("7".to_string(), None);
        let rendered = render(&lines, 6, &live, IndicatorStyle::None);
        assert!(rendered[0].contains("run-throbber.gif"));
        assert!(rendered[0].contains(STAGE_PLACEHOLDER));
    }

    #[test]
    fn unknown_instances_are_left_alone() {
        let (launch, _) = lines_for("99", IndicatorStyle::Both);
        let lines = vec![launch.clone()];
        let rendered = render(&lines, 6, &LiveJobs::new(), IndicatorStyle::Both);
        assert_eq!(rendered, lines);
    }

    #[test]
    fn rendering_is_idempotent() {
        let (launch_a, done_a) = lines_for("1", IndicatorStyle::Both);
        let (launch_b, _) = lines_for("2", IndicatorStyle::Both);
        let lines = vec![launch_a, launch_b, done_a];
        let mut live = LiveJobs::new();
        live.insert("2".to_string(), Some("test".to_string()));

        let first = render(&lines, 0, &live, IndicatorStyle::Both);
        let second = render(&lines, 0, &live, IndicatorStyle::Both);
        assert_eq!(first, second);
        assert_ne!(first, lines);
    }

    #[test]
    fn tail_length_and_window_are_bounded() {
        let (launch, done) = lines_for("5", IndicatorStyle::Both);
        let mut lines: Vec<String> = vec![launch.clone()];
        lines.extend((0..300).map(|i| format!("filler {i}")));
        lines.push(done);

        let tail = render(&lines, 6, &LiveJobs::new(), IndicatorStyle::Both);
        assert_eq!(tail.len(), 6);
        assert_eq!(tail[0], "filler 295");

        // The launch line is beyond the reconciliation window.
        let all = render(&lines, 0, &LiveJobs::new(), IndicatorStyle::Both);
        assert_eq!(all.len(), lines.len());
        assert_eq!(all[0], launch);

        let more_than_window = render(&lines, 280, &LiveJobs::new(), IndicatorStyle::Both);
        assert_eq!(more_than_window.len(), 280);
        assert_eq!(more_than_window[0], lines[lines.len() - 280]);
    }
}
